use crate::backend::MemoryBackend;
use crate::config::QueryConfig;
use crate::dao::EntityDao;
use crate::errors::QueryError;
use crate::model::{ModelRegistry, PathResolver};
use crate::query::PageRequest;
use crate::types::{Entity, EntityId};
use crate::utils::json::{bson_to_json, entity_to_json, parse_json_value};
use bson::Bson;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use super::command::Command;
use super::util::{parse_filter_input, parse_id_input, parse_joins_input, parse_sort_input};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Human,
    Plain,
    Json,
}

/// Models, configuration and an in-memory store loaded from fixture files.
pub struct Workspace {
    backend: Arc<MemoryBackend>,
    resolver: Arc<PathResolver>,
}

impl Workspace {
    /// # Errors
    /// Malformed models or fixture data.
    pub fn from_parts(
        models_json: &str,
        data_json: Option<&str>,
        config: QueryConfig,
    ) -> Result<Self, QueryError> {
        config.validate()?;
        let registry = Arc::new(ModelRegistry::from_json_str(models_json)?);
        let backend = Arc::new(MemoryBackend::new(Arc::clone(&registry)));
        if let Some(data) = data_json {
            let n = backend.load_json(data)?;
            log::info!("loaded {n} fixture rows");
        }
        let resolver = Arc::new(PathResolver::new(registry, Arc::new(config)));
        Ok(Self { backend, resolver })
    }

    /// # Errors
    /// Unreadable files, and everything [`Workspace::from_parts`] rejects.
    pub fn load(models: &Path, data: Option<&Path>, config: Option<&Path>) -> Result<Self, QueryError> {
        let config = config.map_or_else(|| Ok(QueryConfig::default()), QueryConfig::from_path)?;
        let models_json = std::fs::read_to_string(models)?;
        let data_json = data.map(std::fs::read_to_string).transpose()?;
        Self::from_parts(&models_json, data_json.as_deref(), config)
    }

    #[must_use]
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    /// # Errors
    /// `UnknownEntity` when `entity` has no model.
    pub fn dao(&self, entity: &str) -> Result<EntityDao<MemoryBackend>, QueryError> {
        EntityDao::new(Arc::clone(&self.backend), Arc::clone(&self.resolver), entity)
    }
}

pub fn run(ws: &Workspace, cmd: Command) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with_format(ws, cmd, OutputMode::Human, &mut out)
}

pub fn run_with_format(
    ws: &Workspace,
    cmd: Command,
    mode: OutputMode,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Count { entity, filter_json, distinct } => {
            let dao = ws.dao(&entity)?;
            let filter = parse_filter_input(filter_json.as_deref())?;
            let n = dao.count(filter.as_ref(), distinct)?;
            match mode {
                OutputMode::Json => writeln!(out, "{}", serde_json::json!({"count": n}))?,
                _ => writeln!(out, "{n}")?,
            }
        }
        Command::Find { entity, filter_json, sort } => {
            let dao = ws.dao(&entity)?;
            let filter = parse_filter_input(filter_json.as_deref())?;
            let found = dao.find(filter.as_ref(), &parse_sort_input(sort.as_deref())?)?;
            write_entities(out, mode, &found)?;
        }
        Command::Ids { entity, filter_json, sort, max_results } => {
            let dao = ws.dao(&entity)?;
            let filter = parse_filter_input(filter_json.as_deref())?;
            let ids = dao.find_ids(filter.as_ref(), max_results, &parse_sort_input(sort.as_deref())?)?;
            write_ids(out, mode, &ids)?;
        }
        Command::Page { entity, filter_json, sort, joins, page, size } => {
            let dao = ws.dao(&entity)?;
            let filter = parse_filter_input(filter_json.as_deref())?;
            let request = PageRequest::new(page, size, parse_sort_input(sort.as_deref())?);
            let page = dao.page(filter.as_ref(), &request, &parse_joins_input(joins.as_deref())?)?;
            match mode {
                OutputMode::Json => {
                    let items: Vec<serde_json::Value> = page.items.iter().map(entity_to_json).collect();
                    let json = serde_json::json!({
                        "page": page.page_number,
                        "size": page.page_size,
                        "total": page.total,
                        "mode": page.mode,
                        "items": items,
                    });
                    writeln!(out, "{json}")?;
                }
                OutputMode::Plain => write_entities(out, mode, &page.items)?,
                OutputMode::Human => {
                    writeln!(
                        out,
                        "page={} size={} total={} mode={:?}",
                        page.page_number,
                        page.page_size,
                        page.total.map_or_else(|| "?".to_string(), |t| t.to_string()),
                        page.mode
                    )?;
                    write_entities(out, mode, &page.items)?;
                }
            }
        }
        Command::Get { entity, id, joins } => {
            let dao = ws.dao(&entity)?;
            let found = dao.fetch_by_id(&parse_id_input(&id), &parse_joins_input(joins.as_deref())?)?;
            write_optional(out, mode, found.as_ref())?;
        }
        Command::Unique { entity, property, value_json, ignore_case, joins } => {
            let dao = ws.dao(&entity)?;
            let value = parse_json_value(&value_json)?;
            let found = dao.fetch_by_unique_property(
                &property,
                value,
                !ignore_case,
                &parse_joins_input(joins.as_deref())?,
            )?;
            write_optional(out, mode, found.as_ref())?;
        }
        Command::Distinct { entity, property, filter_json, sort } => {
            let dao = ws.dao(&entity)?;
            let filter = parse_filter_input(filter_json.as_deref())?;
            let values =
                dao.find_distinct_values(filter.as_ref(), &property, &parse_sort_input(sort.as_deref())?)?;
            write_values(out, mode, values)?;
        }
        Command::CollectionValues { entity, table, property } => {
            let dao = ws.dao(&entity)?;
            write_values(out, mode, dao.find_distinct_in_collection_table(&table, &property)?)?;
        }
        Command::Export { entity, filter_json, sort, joins, batch_size, file } => {
            let dao = ws.dao(&entity)?;
            let filter = parse_filter_input(filter_json.as_deref())?;
            let sort = parse_sort_input(sort.as_deref())?;
            let joins = parse_joins_input(joins.as_deref())?;
            let cursor = dao.iterate(filter.as_ref(), &sort, &joins, batch_size)?;
            let n = match &file {
                Some(path) => {
                    let mut w = BufWriter::new(std::fs::File::create(path)?);
                    let n = write_ndjson(&mut w, cursor)?;
                    w.flush()?;
                    n
                }
                None => write_ndjson(out, cursor)?,
            };
            log::info!("exported {n} {entity} rows");
            if let Some(path) = file {
                match mode {
                    OutputMode::Json => writeln!(
                        out,
                        "{}",
                        serde_json::json!({"exported": n, "file": path.display().to_string()})
                    )?,
                    OutputMode::Plain => writeln!(out, "{n}")?,
                    OutputMode::Human => writeln!(out, "exported={n} file={}", path.display())?,
                }
            }
        }
        Command::Explain { entity, filter_json, sort, joins, page, size } => {
            let dao = ws.dao(&entity)?;
            let filter = parse_filter_input(filter_json.as_deref())?;
            let request = PageRequest::new(page, size, parse_sort_input(sort.as_deref())?);
            let rendered = dao.explain(filter.as_ref(), &request, &parse_joins_input(joins.as_deref())?)?;
            match mode {
                OutputMode::Json => {
                    let params: Vec<serde_json::Value> =
                        rendered.params.iter().cloned().map(bson_to_json).collect();
                    writeln!(out, "{}", serde_json::json!({"query": rendered.text, "params": params}))?;
                }
                _ => writeln!(out, "{rendered}")?,
            }
        }
    }
    Ok(())
}

fn write_ndjson<W: Write + ?Sized>(
    w: &mut W,
    cursor: impl Iterator<Item = Result<Entity, QueryError>>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut n = 0;
    for item in cursor {
        writeln!(w, "{}", entity_to_json(&item?))?;
        n += 1;
    }
    Ok(n)
}

fn write_entities(out: &mut dyn Write, mode: OutputMode, items: &[Entity]) -> std::io::Result<()> {
    match mode {
        OutputMode::Json => {
            let arr: Vec<serde_json::Value> = items.iter().map(entity_to_json).collect();
            writeln!(out, "{}", serde_json::Value::Array(arr))
        }
        OutputMode::Plain => {
            for e in items {
                writeln!(out, "{}", entity_to_json(e))?;
            }
            Ok(())
        }
        OutputMode::Human => {
            for e in items {
                let pretty = serde_json::to_string_pretty(&entity_to_json(e)).unwrap_or_else(|_| "{}".into());
                writeln!(out, "{pretty}")?;
            }
            Ok(())
        }
    }
}

fn write_optional(out: &mut dyn Write, mode: OutputMode, found: Option<&Entity>) -> std::io::Result<()> {
    match (found, mode) {
        (Some(e), _) => write_entities(out, mode, std::slice::from_ref(e)),
        (None, OutputMode::Json) => writeln!(out, "null"),
        (None, _) => writeln!(out, "not found"),
    }
}

fn write_ids(out: &mut dyn Write, mode: OutputMode, ids: &[EntityId]) -> std::io::Result<()> {
    match mode {
        OutputMode::Json => {
            let arr: Vec<serde_json::Value> = ids.iter().map(|id| bson_to_json(id.to_bson())).collect();
            writeln!(out, "{}", serde_json::Value::Array(arr))
        }
        _ => {
            for id in ids {
                writeln!(out, "{id}")?;
            }
            Ok(())
        }
    }
}

fn write_values(out: &mut dyn Write, mode: OutputMode, values: Vec<Bson>) -> std::io::Result<()> {
    let values: Vec<serde_json::Value> = values.into_iter().map(bson_to_json).collect();
    match mode {
        OutputMode::Json => writeln!(out, "{}", serde_json::Value::Array(values)),
        _ => {
            for v in values {
                match v {
                    serde_json::Value::String(s) => writeln!(out, "{s}")?,
                    other => writeln!(out, "{other}")?,
                }
            }
            Ok(())
        }
    }
}
