//! Logging
//!
//! Console output (pretty or JSON) plus, when a log directory is set,
//! daily rotating `bridge.YYYY-MM-DD.log` files kept for 14 days.

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, prelude::*};

const LOG_PREFIX: &str = "bridge";
const LOG_SUFFIX: &str = "log";
const RETENTION_DAYS: i64 = 14;

/// Extract the date from `bridge.YYYY-MM-DD.log`
fn log_date(name: &str) -> Option<chrono::NaiveDate> {
    let date = name
        .strip_prefix(LOG_PREFIX)?
        .strip_prefix('.')?
        .strip_suffix(LOG_SUFFIX)?
        .strip_suffix('.')?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Delete rotated log files older than 14 days
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(RETENTION_DAYS);
    let mut removed = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(date) = log_date(name)
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
            removed += 1;
        }
    }

    Ok(removed)
}

/// Initialize logging
///
/// # Arguments
/// * `level` - filter used when `RUST_LOG` is unset
/// * `json_format` - JSON console output
/// * `log_dir` - directory for rotating log files
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let file_layer = match log_dir {
        Some(dir) => {
            let dir = Path::new(dir);
            fs::create_dir_all(dir)?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_PREFIX)
                .filename_suffix(LOG_SUFFIX)
                .build(dir)?;

            tokio::spawn(periodic_cleanup(dir.to_path_buf()));

            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::sync::Mutex::new(appender))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Runs every hour
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
        sleep(Duration::from_secs(3600)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_date() {
        assert_eq!(
            log_date("bridge.2026-01-31.log"),
            chrono::NaiveDate::from_ymd_opt(2026, 1, 31)
        );
        assert_eq!(log_date("bridge.log"), None);
        assert_eq!(log_date("other.2026-01-31.log"), None);
        assert_eq!(log_date("bridge.2026-13-01.log"), None);
    }

    #[test]
    fn test_cleanup_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        let today = chrono::Local::now().date_naive();
        let old = today - chrono::Duration::days(30);

        let fresh_name = format!("bridge.{}.log", today.format("%Y-%m-%d"));
        let old_name = format!("bridge.{}.log", old.format("%Y-%m-%d"));
        fs::write(dir.path().join(&fresh_name), "x").unwrap();
        fs::write(dir.path().join(&old_name), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 1);
        assert!(dir.path().join(&fresh_name).exists());
        assert!(!dir.path().join(&old_name).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("absent")).unwrap(), 0);
    }
}
