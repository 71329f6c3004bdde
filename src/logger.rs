/*!
Logging setup for the addon library.

The [`LoggerConfig`] is part of the top-level configuration and feeds an
`env_logger` builder. All runtime diagnostics of the crate go through
the `log` macros.
*/

use std::fmt::Display;
use std::io::Write;

use colored::Colorize;
use log::warn;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Off => "Off",
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    pub log_level: LogLevel,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
        }
    }
}

/// Initialize the global logger. A second call is a no-op with a warning.
pub fn init_log(config: &LoggerConfig) {
    if env_logger::builder()
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{:5}] {}",
                match record.level() {
                    log::Level::Error => "ERROR".red(),
                    log::Level::Warn => "WARN".yellow(),
                    log::Level::Info => "INFO".green(),
                    log::Level::Debug => "DEBUG".blue(),
                    log::Level::Trace => "TRACE".black(),
                },
                record.args()
            )
        })
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .filter_level(config.log_level.clone().into())
        .try_init()
        .is_err()
    {
        warn!("Logger already initialized!");
    } else {
        println!("Logging initialized at level: {}", config.log_level);
    }
}
