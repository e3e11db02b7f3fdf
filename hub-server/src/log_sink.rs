use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Severity of one wire-level `LOG` entry, and of the `log_level` config threshold.
///
/// Distinct from the `log` crate's own levels (see crate docs): this is data carried over the
/// wire by clients via `LOG <app> <level-int> <text>`, not the hub's own operational logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Normal = 2,
    Warning = 3,
    Error = 4,
    Critical = 5,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "NORMAL" => Some(LogLevel::Normal),
            "WARNING" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            "CRITICAL" => Some(LogLevel::Critical),
            _ => None,
        }
    }

    /// Map the wire `level-int` argument of a `LOG` message to a level. Unknown values above the
    /// known range clamp to `Critical` rather than being rejected outright.
    pub fn from_wire(v: u8) -> LogLevel {
        match v {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Normal,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            _ => LogLevel::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Normal => "NORMAL",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Normal
    }
}

/// Appends client-submitted `LOG` entries to a file, with optional stdout replication and
/// level filtering. Entries below the configured threshold are dropped.
///
/// This is the wire-protocol data plane, not the hub's own `log`-crate diagnostics (bind
/// failures, client lifecycle, flush errors) which go straight to `log::*` macros regardless.
pub struct LogSink {
    file: Mutex<Option<File>>,
    threshold: LogLevel,
    replicate_stdout: bool,
}

impl LogSink {
    pub fn open(path: &Path, threshold: LogLevel, replicate_stdout: bool) -> io::Result<LogSink> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogSink {
            file: Mutex::new(Some(file)),
            threshold,
            replicate_stdout,
        })
    }

    /// Record one `LOG <app> <level-int> <text>` entry. Never fails back to the caller; a write
    /// error here is logged through the ambient `log` crate and otherwise swallowed, since a
    /// client's log message must never be able to take down its connection.
    pub fn log(&self, app: &str, level: u8, text: &str) {
        let level = LogLevel::from_wire(level);
        if level < self.threshold {
            return;
        }

        let line = format!("[{}] {}: {}\n", level.as_str(), app, text);

        if let Some(file) = self.file.lock().unwrap().as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                error!("failed to write log entry: {}", e);
            }
        }

        if self.replicate_stdout {
            print!("{}", line);
        }
    }

    /// Drop the open file handle. Idempotent.
    pub fn close(&self) {
        self.file.lock().unwrap().take();
    }
}
