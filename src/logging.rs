//! Process-wide logger configuration.
use std::io::stdout;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use slog::Drain;
use slog::IgnoreResult;
use slog::Logger;
use slog::Never;
use slog::SendSyncRefUnwindSafeDrain;
use slog::SendSyncUnwindSafeDrain;

use slog_async::Async;
use slog_json::Json;
use slog_term::CompactFormat;
use slog_term::TermDecorator;

/// Supported logging drains.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingDrain {
    /// Log JSON objects to standard output, for ingestion by a log aggregator.
    Json,
    /// Log human readable, coloured lines to a terminal.
    Term,
}

impl Default for LoggingDrain {
    fn default() -> LoggingDrain {
        LoggingDrain::Json
    }
}

/// Logging levels, mapped onto `slog::Level`.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl Default for LoggingLevel {
    fn default() -> LoggingLevel {
        LoggingLevel::Info
    }
}

impl From<LoggingLevel> for slog::Level {
    fn from(level: LoggingLevel) -> Self {
        match level {
            LoggingLevel::Critical => slog::Level::Critical,
            LoggingLevel::Error => slog::Level::Error,
            LoggingLevel::Warning => slog::Level::Warning,
            LoggingLevel::Info => slog::Level::Info,
            LoggingLevel::Debug => slog::Level::Debug,
        }
    }
}

/// Logging configuration options.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Flush logs asynchronously on a dedicated thread.
    #[serde(default = "Config::default_async")]
    pub r#async: bool,

    /// The drain to send logs to.
    #[serde(default)]
    pub drain: LoggingDrain,

    /// The minimum logging level.
    #[serde(default)]
    pub level: LoggingLevel,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            r#async: true,
            drain: LoggingDrain::default(),
            level: LoggingLevel::default(),
        }
    }
}

impl Config {
    fn default_async() -> bool {
        true
    }
}

/// `slog::LevelFilter` with `Ok == ()`, so the filtered drain can still be wrapped in a
/// `Logger` (the stock `LevelFilter` wraps `D::Ok` in an `Option`, which a `Logger` rejects).
#[derive(Debug, Clone)]
pub struct LevelFilter<D: Drain>(pub D, pub slog::Level);

impl<D: Drain> Drain for LevelFilter<D> {
    type Ok = ();
    type Err = D::Err;

    fn log(&self, record: &slog::Record, logger_values: &slog::OwnedKVList) -> Result<Self::Ok, Self::Err> {
        if record.level().is_at_least(self.1) {
            self.0.log(record, logger_values)?;
        }
        Ok(())
    }
}

fn into_logger<D>(drain: D) -> Logger
where
    D: SendSyncUnwindSafeDrain<Ok = (), Err = Never>,
    D: 'static + SendSyncRefUnwindSafeDrain<Ok = (), Err = Never>,
{
    Logger::root(drain, slog::o!("process" => "fleetcored"))
}

fn config_async<D>(config: &Config, drain: D) -> Logger
where
    D: SendSyncUnwindSafeDrain<Ok = (), Err = Never>,
    D: 'static + SendSyncRefUnwindSafeDrain<Ok = (), Err = Never>,
{
    if config.r#async {
        into_logger(Async::new(drain).build().ignore_res())
    } else {
        into_logger(drain)
    }
}

fn config_level<D>(config: &Config, drain: D) -> Logger
where
    D: SendSyncUnwindSafeDrain<Ok = (), Err = Never>,
    D: 'static + SendSyncRefUnwindSafeDrain<Ok = (), Err = Never>,
{
    let drain = LevelFilter(drain, config.level.into());
    config_async(config, drain)
}

/// Build the process [`Logger`] from its configuration.
pub fn configure(config: &Config) -> Logger {
    match config.drain {
        LoggingDrain::Json => {
            let drain = Mutex::new(Json::default(stdout())).map(IgnoreResult::new);
            config_level(config, drain)
        }
        LoggingDrain::Term => {
            let decorator = TermDecorator::new().build();
            let drain = Mutex::new(CompactFormat::new(decorator).build()).map(IgnoreResult::new);
            config_level(config, drain)
        }
    }
}

/// A fixed [`Logger`] used before configuration has been loaded.
pub fn starter() -> Logger {
    let drain = Mutex::new(Json::default(stdout())).map(IgnoreResult::new);
    into_logger(drain)
}
