use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::config::HookConfig;
use crate::error::{HookError, Result};

const DEFAULT_LOG_FILTER: &str = "info";

/// Appends log lines to a single file given by the config's `logfile`.
pub struct FileLogger {
    log_directory: PathBuf,
    file_name: String,
}

impl FileLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                HookError::ConfigError(format!("Invalid log file path '{}'", path.display()))
            })?
            .to_string();
        let log_directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            log_directory,
            file_name,
        })
    }

    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard)> {
        // Ensure log directory exists
        std::fs::create_dir_all(&self.log_directory).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to create log directory '{}': {}",
                self.log_directory.display(),
                e
            ))
        })?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(self.file_name.as_str())
            .build(&self.log_directory)
            .map_err(|e| {
                HookError::ConfigError(format!(
                    "Failed to open log file '{}': {}",
                    self.log_directory.join(&self.file_name).display(),
                    e
                ))
            })?;

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber for the configured log destination.
///
/// The returned guard flushes the file writer on drop and must be held until
/// the process exits. Logging to stdout (`"-"`) needs no guard.
pub fn setup_logging(config: &HookConfig) -> Result<Option<WorkerGuard>> {
    if config.logs_to_stdout() {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        return Ok(None);
    }

    let (writer, guard) = FileLogger::new(&config.logfile)?.setup_file_logging()?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_log_path_into_directory_and_file() {
        let logger = FileLogger::new("/var/log/hooks/webhook.log").unwrap();
        assert_eq!(logger.log_directory, PathBuf::from("/var/log/hooks"));
        assert_eq!(logger.file_name, "webhook.log");
    }

    #[test]
    fn bare_file_name_logs_to_working_directory() {
        let logger = FileLogger::new("webhook.log").unwrap();
        assert_eq!(logger.log_directory, PathBuf::from("."));
    }

    #[test]
    fn root_path_is_rejected() {
        assert!(FileLogger::new("/").is_err());
    }
}
