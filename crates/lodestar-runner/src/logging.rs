use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use lodestar_config::{LoggingConfig, ProjectPaths};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Initialize logging for a component.
///
/// - `component_name`: Name of the component (e.g., "cli"), used for the log file name
/// - `config`: Whether to log to a file, and the filter used when `RUST_LOG` is unset
/// - `verbosity`: Number of `-d` flags; raises the filter to debug or trace
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(
    component_name: &str,
    config: &LoggingConfig,
    verbosity: u8,
) -> io::Result<Option<WorkerGuard>> {
    let directive = filter_directive(&config.level, verbosity);
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive))
    };

    if config.file {
        let log_dir = get_log_directory()?;
        fs::create_dir_all(&log_dir)?;

        let log_path = log_dir.join(format!("{}.log", component_name));
        truncate_if_needed(&log_path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_writer(io::stderr).with_ansi(true))
            .with(
                fmt::layer()
                    .with_writer(non_blocking_file)
                    .with_ansi(false)
                    .with_target(true),
            )
            .init();

        tracing::info!(target: "platform", "Logging to file: {}", log_path.display());

        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(env_filter())
            .init();

        Ok(None)
    }
}

/// Filter used when `RUST_LOG` is not set
fn filter_directive(level: &str, verbosity: u8) -> String {
    match verbosity {
        0 if level.trim().is_empty() => "info".to_string(),
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn get_log_directory() -> io::Result<PathBuf> {
    let proj_paths = ProjectPaths::lodestar()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))?;

    Ok(proj_paths.log_dir())
}

/// Truncate log file if it exceeds MAX_LOG_SIZE.
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() {
        let metadata = fs::metadata(log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            let file = File::create(log_path)?;
            file.set_len(0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("warn,modules=debug", 0), "warn,modules=debug");
        assert_eq!(filter_directive("", 0), "info");
        assert_eq!(filter_directive("warn", 1), "debug");
        assert_eq!(filter_directive("warn", 3), "trace");
    }

    #[test]
    fn test_oversized_log_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.log");
        let large = dir.path().join("large.log");
        fs::write(&small, "kept").unwrap();
        fs::write(&large, vec![b'x'; MAX_LOG_SIZE as usize + 1]).unwrap();

        truncate_if_needed(&small).unwrap();
        truncate_if_needed(&large).unwrap();
        truncate_if_needed(&dir.path().join("missing.log")).unwrap();

        assert_eq!(fs::read_to_string(&small).unwrap(), "kept");
        assert_eq!(fs::metadata(&large).unwrap().len(), 0);
    }
}
