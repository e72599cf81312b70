//! Process configuration, loaded from a YAML file at startup.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context as _;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::logging;

/// Tunables for the action dispatcher's worker pool.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "DispatcherConfig::default_workers")]
    pub workers: usize,
    #[serde(default = "DispatcherConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            workers: Self::default_workers(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

impl DispatcherConfig {
    fn default_workers() -> usize {
        4
    }

    fn default_queue_capacity() -> usize {
        1024
    }
}

impl From<DispatcherConfig> for fleetcore_dispatcher::DispatcherConf {
    fn from(config: DispatcherConfig) -> Self {
        fleetcore_dispatcher::DispatcherConf {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Top level process configuration.
#[derive(Clone, Default, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: logging::Config,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl Config {
    /// Load the configuration from a YAML file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Config::from_reader(file)
    }

    /// Load the configuration from any reader of YAML.
    pub fn from_reader<R: Read>(reader: R) -> Result<Config> {
        let config = serde_yaml::from_reader(reader).context("failed to parse configuration as YAML")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::Config;

    #[test]
    fn from_reader_error() {
        let cursor = Cursor::new("not: [valid, yaml for this shape");
        assert!(Config::from_reader(cursor).is_err());
    }

    #[test]
    fn from_reader_defaults_on_empty_document() {
        let cursor = Cursor::new("{}");
        let config = Config::from_reader(cursor).unwrap();
        assert_eq!(config.dispatcher.workers, 4);
    }
}
