use crate::Args;
use anyhow::{anyhow, Context as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to emit JSON formatted logs
    pub json_format: bool,

    /// Whether to include thread names in logs
    pub include_thread_names: bool,

    /// Whether to include file and line number information
    pub include_file_info: bool,

    /// Whether to enable colored output (only for non-JSON format)
    pub enable_colors: bool,

    /// Log file path (optional, if None logs only to stderr)
    pub log_file: Option<PathBuf>,

    /// Module-specific log levels
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_levels = HashMap::new();

        // chromiumoxide reports every unhandled CDP event at warn/debug
        module_levels.insert("chromiumoxide".to_string(), "error".to_string());
        module_levels.insert("tungstenite".to_string(), "warn".to_string());
        module_levels.insert("html5ever".to_string(), "warn".to_string());

        Self {
            level: "info".to_string(),
            json_format: false,
            include_thread_names: false,
            include_file_info: false,
            enable_colors: true,
            log_file: None,
            module_levels,
        }
    }
}

impl LoggingConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            level: args.log_level.clone(),
            json_format: args.log_json,
            log_file: args.log_file.clone(),
            ..Self::default()
        }
    }

    /// `RUST_LOG` wins over the configured level when set
    pub fn filter(&self) -> anyhow::Result<EnvFilter> {
        if !levels::is_valid_level(&self.level) {
            return Err(anyhow!("Invalid log level: {}", self.level));
        }

        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for (module, level) in &self.module_levels {
            let directive = format!("{}={}", module, level);
            filter = filter.add_directive(
                directive
                    .parse()
                    .with_context(|| format!("Invalid log directive: {}", directive))?,
            );
        }
        Ok(filter)
    }
}

/// Initialize logging based on the provided configuration. The returned guard
/// must be kept alive while a log file is in use.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = config.filter()?;

    // stdout carries the run result, so console logs go to stderr
    let console = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_thread_names(config.include_thread_names)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(config.include_thread_names)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .with_ansi(config.enable_colors)
            .boxed()
    };

    let (file, guard) = match &config.log_file {
        Some(path) => {
            let appender = create_file_appender(path)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            let layer = if config.json_format {
                layer.json().boxed()
            } else {
                layer.boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init();

    match result {
        Ok(_) => tracing::debug!("Logging initialized with level: {}", config.level),
        Err(_) => tracing::debug!("Logging already initialized, skipping"),
    }

    Ok(guard)
}

fn create_file_appender(log_file: &Path) -> anyhow::Result<tracing_appender::rolling::RollingFileAppender> {
    let directory = match log_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let filename = log_file
        .file_name()
        .ok_or_else(|| anyhow!("Invalid log file name: {:?}", log_file))?;

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {:?}", directory))?;

    // One file per run; runs are short-lived so no rotation
    Ok(tracing_appender::rolling::never(directory, filename))
}

/// Log level utilities
pub mod levels {
    pub fn is_valid_level(level: &str) -> bool {
        matches!(
            level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        )
    }

    pub fn valid_levels() -> Vec<&'static str> {
        vec!["trace", "debug", "info", "warn", "error"]
    }
}
