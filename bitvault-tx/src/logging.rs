//! Security-aware logging for transaction construction
//!
//! This module wires the `log` facade to an `env_logger` backend and provides
//! context-tagged helpers used by the selector, the signer chain and the key
//! bag:
//! - Never logs private keys or decrypted key material
//! - Truncates values that identify wallet data (scripts, outpoints)
//! - Human-readable or JSON line output
//!
//! # Usage
//!
//! ```
//! use bitvault_tx::logging::{self, LogConfig, LogLevel};
//!
//! logging::init(&LogConfig::default()).expect("Failed to initialize logging");
//! logging::log_core(LogLevel::Info, "selection started", None);
//! ```

use chrono::Local;
use log::{debug, LevelFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::sync::Once;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Error conditions
    Error,
    /// Warning conditions
    Warn,
    /// Informational messages
    Info,
    /// Debug-level messages
    Debug,
    /// Trace level (very verbose)
    Trace,
}

/// Log context categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogContext {
    /// Key lookup, decryption
    Security,
    /// Coin selection
    Core,
    /// Transaction assembly and signing
    Transaction,
    /// Configuration files
    Storage,
}

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log level
    #[serde(default = "default_level")]
    pub level: LogLevel,
    /// Path to log file (None for console-only)
    #[serde(default)]
    pub log_file: Option<String>,
    /// Whether to include timestamps in log messages
    #[serde(default = "default_true")]
    pub include_timestamps: bool,
    /// Whether to include source location in log messages
    #[serde(default = "default_true")]
    pub include_source_location: bool,
    /// Whether to use JSON format for logs (machine-readable)
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_file: None,
            include_timestamps: true,
            include_source_location: true,
            json_format: false,
        }
    }
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

fn default_true() -> bool {
    true
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

// Ensure logging is only initialized once
static LOGGING_INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// Safe to call multiple times; only the first call configures the backend.
/// A logger installed by someone else (a test harness, the host application)
/// is left in place.
pub fn init(config: &LogConfig) -> Result<(), String> {
    let mut result = Ok(());

    let include_timestamps = config.include_timestamps;
    let include_source_location = config.include_source_location;
    let json_format = config.json_format;
    let log_file = config.log_file.clone();
    let level = config.level;

    LOGGING_INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level.into());

        builder.format(move |buf, record| {
            let timestamp = if include_timestamps {
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
            } else {
                String::new()
            };

            let source_location = if include_source_location {
                format!(" [{}:{}]", record.file().unwrap_or("unknown"), record.line().unwrap_or(0))
            } else {
                String::new()
            };

            if json_format {
                let line = json!({
                    "timestamp": timestamp,
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "location": source_location,
                    "message": record.args().to_string(),
                });
                writeln!(buf, "{}", line)
            } else {
                if include_timestamps {
                    write!(buf, "{} ", timestamp)?;
                }
                let mut style = buf.style();
                style.set_bold(true);
                writeln!(
                    buf,
                    "[{}{}] {}",
                    style.value(record.level()),
                    source_location,
                    record.args()
                )
            }
        });

        if let Some(file_path) = &log_file {
            match OpenOptions::new().create(true).append(true).open(file_path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    result = Err(format!("Failed to open log file {}: {}", file_path, e));
                    return;
                }
            }
        }

        if let Err(e) = builder.try_init() {
            // Another logger is already installed; keep it
            debug!("Logger already initialized: {}", e);
        }
    });

    result
}

/// Sanitize a potentially sensitive string for logging
///
/// Keeps the first and last four characters of longer values.
pub fn sanitize_for_logging(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let len = input.len();
    if len <= 8 || !input.is_ascii() {
        return "*****".to_string();
    }

    format!("{}...{}", &input[0..4], &input[len - 4..len])
}

/// Mask string values; numbers and flags are logged as they are
fn sanitize_params(params: serde_json::Value) -> serde_json::Value {
    match params {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => json!(sanitize_for_logging(&s)),
                        other => other,
                    };
                    (k, value)
                })
                .collect(),
        ),
        other => other,
    }
}

fn sanitize_and_log(
    level: LogLevel,
    context: LogContext,
    message: &str,
    params: Option<serde_json::Value>,
) {
    match params.map(sanitize_params) {
        Some(params) => log::log!(level.into(), "[{:?}] {} - {}", context, message, params),
        None => log::log!(level.into(), "[{:?}] {}", context, message),
    }
}

/// Log a security-related message
pub fn log_security(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    sanitize_and_log(level, LogContext::Security, message, params);
}

/// Log a core wallet event (coin selection)
pub fn log_core(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    sanitize_and_log(level, LogContext::Core, message, params);
}

/// Log a transaction event with appropriate sanitization
pub fn log_transaction(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    sanitize_and_log(level, LogContext::Transaction, message, params);
}

/// Log a storage event (configuration files)
pub fn log_storage(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    sanitize_and_log(level, LogContext::Storage, message, params);
}

/// Build a JSON parameter map for the context loggers
///
/// Values that parse as unsigned integers become JSON numbers and are never masked.
pub fn log_params(params: Vec<(&str, String)>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in params {
        let value = match value.parse::<u64>() {
            Ok(n) => json!(n),
            Err(_) => serde_json::Value::String(value),
        };
        map.insert(name.to_string(), value);
    }
    serde_json::Value::Object(map)
}
