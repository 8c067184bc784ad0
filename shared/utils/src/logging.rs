use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

fn open_log_file(path: &str) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig, service: &'static str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let file = config.file_path.as_deref().map(open_log_file).transpose()?;

    match (config.format.as_str(), file) {
        ("json", Some(file)) => registry
            .with(fmt::layer().json().with_current_span(true).with_writer(Mutex::new(file)))
            .try_init()?,
        ("json", None) => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?,
        (_, Some(file)) => registry
            .with(fmt::layer().with_target(true).with_ansi(false).with_writer(Mutex::new(file)))
            .try_init()?,
        (_, None) => registry.with(fmt::layer().with_target(true)).try_init()?,
    }

    tracing::info!(service, level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}
