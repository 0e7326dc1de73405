use std::path::{Path, PathBuf};

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::ServerConfig;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per event instead of the human format
    pub json_format: bool,
    /// Daily rolling files are written here in addition to stdout
    pub log_dir: Option<PathBuf>,
    pub colorize: bool,
    pub file_prefix: String,
    /// Crates the level applies to; everything else stays at the
    /// subscriber default
    pub targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            log_dir: None,
            colorize: true,
            file_prefix: "edge-gate".to_string(),
            targets: vec!["edge_gate".to_string(), "actix_web".to_string()],
        }
    }
}

impl LoggingConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            level: config
                .log_level
                .as_deref()
                .map(parse_level)
                .unwrap_or(Level::INFO),
            json_format: config.json_logs,
            log_dir: config.log_dir.as_ref().map(PathBuf::from),
            ..Default::default()
        }
    }

    fn directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        self.targets
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse a level name as accepted on the command line.
pub fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Flushes buffered file output on drop. Hold it until shutdown.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn fmt_layer<S, W>(writer: W, ansi: bool, json: bool) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()));
    if json {
        layer.json().flatten_event(true).boxed()
    } else {
        layer.boxed()
    }
}

fn rolling_writer(dir: &Path, prefix: &str) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber. `RUST_LOG` overrides the configured
/// directives. Later calls are no-ops.
pub fn init_logging(config: LoggingConfig) -> LogGuard {
    let _ = LogTracer::init();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let mut layers = vec![fmt_layer(std::io::stdout, config.colorize, config.json_format)];

    let mut file_guard = None;
    if let Some(dir) = &config.log_dir {
        match rolling_writer(dir, &config.file_prefix) {
            Ok((writer, guard)) => {
                layers.push(fmt_layer(writer, false, config.json_format));
                file_guard = Some(guard);
            }
            // stdout only
            Err(e) => eprintln!("Failed to open log directory {}: {}", dir.display(), e),
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init();

    LogGuard { _file: file_guard }
}
