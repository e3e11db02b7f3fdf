use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::log_sink::LogLevel;

/// Default ceiling on live clients, used when a deployment doesn't otherwise bound it. Not an
/// on-disk config key (§6 names no such key); it exists so `NetworkEngine` has a concrete
/// `MAX_CLIENTS` without depending on platform fd-set limits.
pub const DEFAULT_MAX_CLIENTS: usize = 1024;

/// Read-only configuration injected into the hub at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_address: Ipv4Addr,
    pub bind_port: u16,
    pub password: String,
    pub var_defs: PathBuf,
    pub var_db: PathBuf,
    pub log_file: PathBuf,
    pub log_level: LogLevel,
    pub log_replicate_stdout: bool,
    pub max_clients: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: Ipv4Addr::new(127, 0, 0, 1),
            bind_port: 31427,
            password: String::new(),
            var_defs: PathBuf::from("var_defs.txt"),
            var_db: PathBuf::from("var_db.txt"),
            log_file: PathBuf::from("hub.log"),
            log_level: LogLevel::default(),
            log_replicate_stdout: false,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl Config {
    /// Load a `key = value` configuration file over the built-in defaults.
    ///
    /// This is intentionally a small, literal reader in the same tolerant style as the
    /// persistent-value and schema readers (`#` comments, blank lines ignored): unrecognized
    /// keys and malformed lines are warned about and skipped rather than treated as fatal.
    pub fn load(path: &Path) -> io::Result<Config> {
        let text = fs::read_to_string(path)?;
        Ok(Config::parse(&text))
    }

    pub fn parse(text: &str) -> Config {
        let mut config = Config::default();

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some(kv) => kv,
                None => {
                    warn!("config line {}: expected `key = value`, ignoring", lineno + 1);
                    continue;
                }
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "bind_address" => match Ipv4Addr::from_str(value) {
                    Ok(addr) => config.bind_address = addr,
                    Err(_) => warn!("config line {}: bad bind_address `{}`", lineno + 1, value),
                },
                "bind_port" => match value.parse() {
                    Ok(port) => config.bind_port = port,
                    Err(_) => warn!("config line {}: bad bind_port `{}`", lineno + 1, value),
                },
                "password" => config.password = value.to_owned(),
                "var_defs" => config.var_defs = PathBuf::from(value),
                "var_db" => config.var_db = PathBuf::from(value),
                "log_file" => config.log_file = PathBuf::from(value),
                "log_level" => match LogLevel::parse(value) {
                    Some(level) => config.log_level = level,
                    None => warn!("config line {}: unknown log_level `{}`", lineno + 1, value),
                },
                "log_replicate_stdout" => match value {
                    "0" => config.log_replicate_stdout = false,
                    "1" => config.log_replicate_stdout = true,
                    _ => warn!(
                        "config line {}: expected 0 or 1 for log_replicate_stdout, found `{}`",
                        lineno + 1,
                        value
                    ),
                },
                other => warn!("config line {}: unrecognized key `{}`, ignoring", lineno + 1, other),
            }
        }

        config
    }
}
