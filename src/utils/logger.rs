use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

use crate::query::telemetry::METRICS_TARGET;
use crate::utils::devlog::DEV_TARGET;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const KEEP_FILES: u32 = 7;

/// Initializes the logging system from `log4rs.yaml` in the working directory, when present.
///
/// # Errors
/// Returns an error if the file exists but cannot be loaded.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new("log4rs.yaml");
    if path.exists() {
        log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    }
    Ok(())
}

/// Parses `error|warn|info|debug|trace|off`; anything else is `info`.
#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Logs to stderr at `level`.
///
/// # Errors
/// Returns an error if a global logger is already installed.
pub fn init_console(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let stderr = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn rolling(dir: &Path, file: &str, level_pattern: &str) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let stem = file.trim_end_matches(".log");
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{stem}.{{}}.log")).display()), KEEP_FILES)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(level_pattern)))
        .build(dir.join(file), Box::new(policy))?)
}

/// Builds the file logging configuration without installing it.
///
/// Writes `{dir}/{name}.log` for application logs and `{dir}/{name}_metrics.log` for the
/// slow-query target, both rolled at 10 MiB with 7 files kept. Developer bench lines go to
/// `{dir}/{name}_dev6.log` when `level` is TRACE.
///
/// # Errors
/// Returns an error if the directory cannot be created or an appender fails to build.
pub fn build_config(
    dir: &Path,
    name: &str,
    level: LevelFilter,
) -> Result<Config, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let app = rolling(dir, &format!("{name}.log"), PATTERN)?;
    let metrics = rolling(dir, &format!("{name}_metrics.log"), "{d(%Y-%m-%d %H:%M:%S%.3f)} {m}{n}")?;

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(app)))
        .appender(Appender::builder().build("metrics", Box::new(metrics)))
        .logger(
            Logger::builder()
                .appender("metrics")
                .additive(false)
                .build(METRICS_TARGET, LevelFilter::Info),
        );
    if level == LevelFilter::Trace {
        let dev = rolling(dir, &format!("{name}_dev6.log"), "{m}{n}")?;
        builder = builder.appender(Appender::builder().build("dev6", Box::new(dev))).logger(
            Logger::builder().appender("dev6").additive(false).build(DEV_TARGET, LevelFilter::Trace),
        );
    }
    Ok(builder.build(Root::builder().appender("app").build(level))?)
}

/// Installs file logging under `dir` (see [`build_config`]). Returns the application log path.
///
/// # Errors
/// Returns an error if the configuration cannot be built or a logger is already installed.
pub fn init_in_dir(
    dir: &Path,
    name: &str,
    level: LevelFilter,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let config = build_config(dir, name, level)?;
    log4rs::init_config(config)?;
    Ok(dir.join(format!("{name}.log")))
}
