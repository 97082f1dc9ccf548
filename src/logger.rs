//! Debug logging support.
//!
//! An interactive editor cannot log to its own terminal, so tracing output
//! goes to a file. Logging is off unless `EDX_DEBUG` is set in the
//! environment; the log lands in `/var/log/edx.log` if writable, otherwise
//! `~/.edx/edx.log`.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

/// Initialize file logging when `EDX_DEBUG` is set.
///
/// Returns the log path, or `None` when logging is disabled. Failure to
/// open the log file falls back to no logging rather than breaking the
/// session.
pub fn init_debug_logging() -> Result<Option<PathBuf>> {
    if std::env::var_os("EDX_DEBUG").is_none() {
        return Ok(None);
    }

    let log_path = get_log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }

    let file = fs::OpenOptions::new().create(true).append(true).open(&log_path);
    match file {
        Ok(log_file) => {
            let subscriber = registry()
                .with(
                    fmt::layer()
                        .with_writer(std::sync::Mutex::new(log_file))
                        .with_ansi(false)
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .with(
                    EnvFilter::try_from_env("EDX_DEBUG")
                        .unwrap_or_else(|_| EnvFilter::new("edx=debug")),
                );

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

            Ok(Some(log_path))
        }
        Err(e) => {
            // Never let logging failures break the session.
            eprintln!("Warning: Could not create log file: {}", e);
            Ok(None)
        }
    }
}

/// Get the log file path.
///
/// Tries `/var/log/edx.log` first, falls back to `~/.edx/edx.log`.
fn get_log_path() -> Result<PathBuf> {
    if can_write_to_var_log() {
        return Ok(PathBuf::from("/var/log/edx.log"));
    }
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home_dir.join(".edx").join("edx.log"))
}

/// Check if `/var/log` is writable by creating and removing a test file.
fn can_write_to_var_log() -> bool {
    let test_file = "/var/log/.edx_test_write";
    match fs::write(test_file, b"") {
        Ok(_) => {
            let _ = fs::remove_file(test_file);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_is_var_log_or_home() {
        if dirs::home_dir().is_some() {
            let path = get_log_path().unwrap();
            let is_var_log = path == PathBuf::from("/var/log/edx.log");
            assert!(
                is_var_log || path.ends_with(".edx/edx.log"),
                "Log path should be either /var/log/edx.log or in .edx directory, got: {}",
                path.display()
            );
        }
    }

    #[test]
    fn test_can_write_to_var_log_does_not_panic() {
        // The result depends on the system running the tests.
        let _can_write = can_write_to_var_log();
    }
}
