use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;

use crate::storage::settings::APP_DIR_NAME;

const DEBUG_LOG_FILENAME: &str = "spendbar-debug.log";
const VISIBLE_SECRET_CHARS: usize = 4;

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static DEBUG_LOG_FILE: Lazy<Option<Arc<Mutex<std::fs::File>>>> = Lazy::new(|| {
    open_debug_log_file()
        .or_else(|_| open_fallback_log_file())
        .ok()
        .map(|file| Arc::new(Mutex::new(file)))
});

pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

/// Writer for the debug log layer. The file is opened on the first write
/// made while file logging is enabled.
pub fn file_writer() -> DebugFileWriter {
    DebugFileWriter
}

/// Shorten a secret so it can appear in logs: first few chars plus length.
pub fn redact_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len == 0 {
        return "<empty>".to_string();
    }
    if len <= VISIBLE_SECRET_CHARS * 2 {
        return format!("<redacted {} chars>", len);
    }
    let head: String = secret.chars().take(VISIBLE_SECRET_CHARS).collect();
    format!("{}…<redacted {} chars>", head, len)
}

fn open_debug_log_file() -> io::Result<std::fs::File> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))?;
    let log_dir = data_dir.join(APP_DIR_NAME);
    std::fs::create_dir_all(&log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(DEBUG_LOG_FILENAME))
}

fn open_fallback_log_file() -> io::Result<std::fs::File> {
    let mut path = PathBuf::from(std::env::temp_dir());
    path.push(DEBUG_LOG_FILENAME);
    OpenOptions::new().create(true).append(true).open(path)
}

#[derive(Clone, Copy, Default)]
pub struct DebugFileWriter;

impl<'a> MakeWriter<'a> for DebugFileWriter {
    type Writer = DebugFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        DebugFileWriterGuard
    }
}

pub struct DebugFileWriterGuard;

impl Write for DebugFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !file_logging_enabled() {
            return Ok(buf.len());
        }

        match DEBUG_LOG_FILE.as_ref().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.write(buf),
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !file_logging_enabled() {
            return Ok(());
        }
        match DEBUG_LOG_FILE.as_ref().map(|file| file.lock()) {
            Some(Ok(mut file)) => file.flush(),
            _ => Ok(()),
        }
    }
}
