use crate::utils::error::{Result, ServiceError};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("demo_service=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("demo_service=info,info"))
    }
}

pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Console output plus an append-only copy in `log_file`.
pub fn init_service_logger(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = prepare_log_file(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| ServiceError::config(format!("Logger already initialised: {}", e)))
}

/// Opens the log file for appending. An empty directory left at the log
/// path (a common bind-mount accident) is removed first.
pub fn prepare_log_file(path: &Path) -> Result<File> {
    if path.is_dir() {
        fs::remove_dir(path).map_err(|e| {
            ServiceError::config(format!(
                "Log path {} is a non-empty directory: {}",
                path.display(),
                e
            ))
        })?;
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
