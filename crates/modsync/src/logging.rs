use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::LevelFilter;
use modsync_platform::AppPaths;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Append-only log file that reopens itself when the file is deleted while
/// the process is running.
struct ReopeningLogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ReopeningLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    fn with_file<T>(&self, action: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() || !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            *guard = Some(open_append(&self.path)?);
        }

        match guard.as_mut() {
            Some(file) => action(file),
            None => Err(io::Error::other("log file not available")),
        }
    }
}

impl Write for ReopeningLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_mut().map_or(Ok(()), Write::flush)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Drop the older half of an oversized log file, cutting at a line boundary.
fn trim_to_recent_half(log_path: &Path, max_log_size: u64) {
    let Ok(metadata) = std::fs::metadata(log_path) else {
        return;
    };
    if metadata.len() <= max_log_size {
        return;
    }
    let Ok(contents) = std::fs::read(log_path) else {
        return;
    };

    let half = contents.len() / 2;
    let keep_from = contents[half..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(half, |position| half + position + 1);
    let _ = std::fs::write(log_path, &contents[keep_from..]);
}

fn terminal_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    }
}

/// Install the global logger: warnings (or info with `verbose`) on stderr,
/// and a debug log under the data directory when `debug_enabled` is set.
///
/// Returns the log file path when file logging is active.
pub fn init_logging(
    paths: &AppPaths,
    debug_enabled: bool,
    verbose: bool,
    max_log_size: u64,
) -> Option<PathBuf> {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("modsync")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        terminal_level(verbose),
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let log_path = paths.log_file();
    let mut file_logging = false;
    if debug_enabled && paths.ensure_dirs().is_ok() {
        trim_to_recent_half(&log_path, max_log_size);
        if let Ok(writer) = ReopeningLogFile::open(log_path.clone()) {
            loggers.push(WriteLogger::new(LevelFilter::Debug, config, writer));
            file_logging = true;
        }
    }

    let _ = CombinedLogger::init(loggers);
    set_logging_enabled(file_logging, verbose);

    if file_logging {
        log::info!("Debug logging to {}", log_path.display());
        Some(log_path)
    } else {
        None
    }
}

/// Raise the global level to debug while file logging is on; otherwise keep
/// only what the terminal shows.
pub fn set_logging_enabled(enabled: bool, verbose: bool) {
    if enabled {
        log::set_max_level(LevelFilter::Debug);
    } else {
        log::set_max_level(terminal_level(verbose));
    }
}
