use clap::{Parser, Subcommand, ValueEnum};
use daokit::cli::{self as prog_cli, OutputMode, Workspace};
use daokit::utils::logger;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Human,
    Plain,
    Json,
}

impl From<Format> for OutputMode {
    fn from(f: Format) -> Self {
        match f {
            Format::Human => Self::Human,
            Format::Plain => Self::Plain,
            Format::Json => Self::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "daokit", version, about = "Run filter, paging and projection queries over JSON fixtures", long_about = None)]
struct Cli {
    #[arg(long, help = "Entity models (JSON array)")]
    models: PathBuf,
    #[arg(long, help = "Fixture data: JSON object of entity name -> array of documents")]
    data: Option<PathBuf>,
    #[arg(long, help = "Query configuration (TOML). If omitted, defaults are used.")]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "human")]
    format: Format,
    #[arg(long, default_value = "warn", help = "error|warn|info|debug|trace|off")]
    log_level: String,
    #[arg(long, help = "Write rolling log files to this directory instead of stderr")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Count matching entities")]
    Count {
        entity: String,
        #[arg(long, help = "Filter JSON")]
        filter: Option<String>,
        #[arg(long)]
        distinct: bool,
    },
    #[command(about = "List matching entities")]
    Find {
        entity: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, help = "Sort spec, e.g. name:desc,age")]
        sort: Option<String>,
    },
    #[command(about = "List matching ids in sort order")]
    Ids {
        entity: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    #[command(about = "Fetch one page with optional fetch joins")]
    Page {
        entity: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, help = "Fetch joins, e.g. orders:inner,address")]
        joins: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
    #[command(about = "Fetch one entity by id")]
    Get {
        entity: String,
        id: String,
        #[arg(long)]
        joins: Option<String>,
    },
    #[command(about = "Fetch the entity with a unique property value")]
    Unique {
        entity: String,
        property: String,
        #[arg(help = "Value as JSON, e.g. '\"ann\"' or 42")]
        value: String,
        #[arg(long)]
        ignore_case: bool,
        #[arg(long)]
        joins: Option<String>,
    },
    #[command(about = "Distinct values of a property across matching entities")]
    Distinct {
        entity: String,
        property: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
    },
    #[command(name = "collection-values", about = "Distinct values stored in an element-collection table")]
    CollectionValues {
        entity: String,
        table: String,
        #[arg(default_value = "value")]
        property: String,
    },
    #[command(about = "Stream matching entities as NDJSON in batches")]
    Export {
        entity: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        joins: Option<String>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long, help = "Output file; stdout when omitted")]
        file: Option<PathBuf>,
    },
    #[command(about = "Show the query a page request would run")]
    Explain {
        entity: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        joins: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
}

impl From<Commands> for prog_cli::Command {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Count { entity, filter, distinct } => {
                Self::Count { entity, filter_json: filter, distinct }
            }
            Commands::Find { entity, filter, sort } => Self::Find { entity, filter_json: filter, sort },
            Commands::Ids { entity, filter, sort, max_results } => {
                Self::Ids { entity, filter_json: filter, sort, max_results }
            }
            Commands::Page { entity, filter, sort, joins, page, size } => {
                Self::Page { entity, filter_json: filter, sort, joins, page, size }
            }
            Commands::Get { entity, id, joins } => Self::Get { entity, id, joins },
            Commands::Unique { entity, property, value, ignore_case, joins } => {
                Self::Unique { entity, property, value_json: value, ignore_case, joins }
            }
            Commands::Distinct { entity, property, filter, sort } => {
                Self::Distinct { entity, property, filter_json: filter, sort }
            }
            Commands::CollectionValues { entity, table, property } => {
                Self::CollectionValues { entity, table, property }
            }
            Commands::Export { entity, filter, sort, joins, batch_size, file } => {
                Self::Export { entity, filter_json: filter, sort, joins, batch_size, file }
            }
            Commands::Explain { entity, filter, sort, joins, page, size } => {
                Self::Explain { entity, filter_json: filter, sort, joins, page, size }
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let level = logger::parse_level(&cli.log_level);
    let logged = match &cli.log_dir {
        Some(dir) => logger::init_in_dir(dir, "daokit", level).map(|_| ()),
        None => logger::init_console(level),
    };
    if let Err(e) = logged {
        eprintln!("warning: logging disabled: {e}");
    }

    let r = Workspace::load(&cli.models, cli.data.as_deref(), cli.config.as_deref())
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|ws| {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            prog_cli::run_with_format(&ws, cli.command.into(), cli.format.into(), &mut out)
        });
    if let Err(e) = r {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
