//! Logging initialization
//!
//! Thin wrapper over `flexi_logger` so the CLI and tests share one setup
//! path. The handle is parked in a static so the writer thread survives for
//! the life of the process.

use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger, LoggerHandle};
use log::Record;
use std::path::Path;
use std::sync::OnceLock;

static LOGGER_HANDLE: OnceLock<LoggerHandle> = OnceLock::new();

fn format_line(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    write!(
        w,
        "{}[{}][{}] {}",
        chrono::Local::now().format("%H:%M:%S"),
        record.target(),
        record.level(),
        record.args()
    )
}

/// Initialize global logging.
///
/// `level` accepts a `RUST_LOG`-style spec ("info", "workmesh=debug", ...);
/// the environment variable wins when set. When `log_file` is given, output
/// goes to the file with warnings and errors duplicated to stderr.
pub fn init_logging(
    level: Option<&str>,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = level.unwrap_or("info");
    let mut logger = Logger::try_with_env_or_str(spec)?.format(format_line);

    if let Some(path) = log_file {
        logger = logger
            .log_to_file(FileSpec::try_from(path.to_path_buf())?)
            .duplicate_to_stderr(Duplicate::Warn);
    }

    let handle = logger.start()?;
    let _ = LOGGER_HANDLE.set(handle);

    Ok(())
}
