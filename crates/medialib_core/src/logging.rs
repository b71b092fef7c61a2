//! Process-wide logging bootstrap for the library server core.
//!
//! # Responsibility
//! - Start the rotating file logger once per process.
//! - Capture panics from worker threads into the same log stream.
//!
//! # Invariants
//! - A second init with the same level and directory is a no-op.
//! - A second init with a different level or directory is refused.
//! - Initialization reports failures as errors and never panics.
//!
//! Log lines emitted by core follow `event=<name> module=<module>
//! status=<status> key=value ...` so they can be grepped and parsed.

use crate::config::LoggingConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "medialib";
const ROTATE_AT_BYTES: u64 = 16 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 7;
const PANIC_SUMMARY_MAX_CHARS: usize = 200;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

struct ActiveLogger {
    level: &'static str,
    directory: PathBuf,
    _handle: LoggerHandle,
}

/// Starts file logging with `level` under the absolute directory `log_dir`.
///
/// # Errors
/// - Unknown level names.
/// - Empty or relative directories, or directories that cannot be created.
/// - Conflicting re-initialization (different level or directory).
/// - Logger backend start failures.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let level = parse_level(level)?;
    let directory = parse_log_dir(log_dir)?;

    if let Some(active) = ACTIVE_LOGGER.get() {
        return ensure_same_config(active, level, &directory);
    }

    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(level, &directory))?;
    ensure_same_config(active, level, &directory)
}

/// Starts logging from a deserialized configuration section.
pub fn init_from_config(config: &LoggingConfig) -> Result<(), String> {
    let level = config.level.as_deref().unwrap_or(default_log_level());
    let directory = config
        .directory
        .to_str()
        .ok_or_else(|| "log directory must be valid UTF-8".to_string())?;
    init_logging(level, directory)
}

/// Returns `(level, directory)` of the running logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE_LOGGER
        .get()
        .map(|active| (active.level, active.directory.clone()))
}

/// Default level: `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(level: &'static str, directory: &Path) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(directory).map_err(|err| {
        format!(
            "cannot create log directory `{}`: {err}",
            directory.display()
        )
    })?;

    let handle = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(directory)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("cannot start logger: {err}"))?;

    install_panic_hook();

    info!(
        "event=logging_start module=logging status=ok level={} log_dir={} version={}",
        level,
        directory.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        level,
        directory: directory.to_path_buf(),
        _handle: handle,
    })
}

fn ensure_same_config(
    active: &ActiveLogger,
    level: &'static str,
    directory: &Path,
) -> Result<(), String> {
    if active.directory != directory {
        return Err(format!(
            "logging already writes to `{}`; refusing to switch to `{}`",
            active.directory.display(),
            directory.display()
        ));
    }
    if active.level != level {
        return Err(format!(
            "logging already runs at level `{}`; refusing to switch to `{}`",
            active.level, level
        ));
    }
    Ok(())
}

fn parse_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn parse_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log directory must not be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log directory must be absolute, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    if PANIC_HOOK.get().is_some() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = info.payload().downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        error!(
            "event=panic module=logging status=error thread={} location={} payload={}",
            std::thread::current().name().unwrap_or("unnamed"),
            location,
            single_line(&payload, PANIC_SUMMARY_MAX_CHARS)
        );
        previous(info);
    }));

    let _ = PANIC_HOOK.set(());
}

fn single_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    let mut out: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        init_from_config, init_logging, logging_status, parse_level, parse_log_dir, single_line,
    };
    use crate::config::LoggingConfig;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "medialib-logging-{tag}-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn parse_level_normalizes_aliases() {
        assert_eq!(parse_level(" Warning ").unwrap(), "warn");
        assert_eq!(parse_level("TRACE").unwrap(), "trace");
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn parse_log_dir_requires_absolute_path() {
        let err = parse_log_dir("relative/logs").unwrap_err();
        assert!(err.contains("absolute"));
        assert!(parse_log_dir("   ").is_err());
    }

    #[test]
    fn config_without_level_uses_default_and_validates_directory() {
        let config = LoggingConfig {
            level: None,
            directory: PathBuf::from("relative/logs"),
        };
        let err = init_from_config(&config).unwrap_err();
        assert!(err.contains("absolute"));
    }

    #[test]
    fn single_line_flattens_and_truncates() {
        let flattened = single_line("a\nb\rc-long-tail", 5);
        assert_eq!(flattened, "a b c...");
    }

    #[test]
    fn second_init_is_idempotent_and_conflicts_are_refused() {
        let dir = scratch_dir("main");
        let dir_str = dir.to_str().unwrap().to_string();
        let other = scratch_dir("other");
        let other_str = other.to_str().unwrap().to_string();

        init_logging("info", &dir_str).unwrap();
        init_logging("INFO", &dir_str).unwrap();

        let err = init_logging("debug", &dir_str).unwrap_err();
        assert!(err.contains("refusing to switch"));
        let err = init_logging("info", &other_str).unwrap_err();
        assert!(err.contains("refusing to switch"));

        let (level, active_dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(active_dir, dir);
    }
}
