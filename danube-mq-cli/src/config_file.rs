use anyhow::{anyhow, Context, Result};
use danube_mq_io::{ReadSettings, WriteSettings};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;

const DEFAULT_COUNT: usize = 10;
const DEFAULT_MAX_READ_TIME_MS: u64 = 2_000;

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LoadConfiguration {
    /// Credentials the in-memory broker requires, if any
    #[serde(default)]
    pub(crate) broker: Option<BrokerCredentials>,
    /// Where and how records are read back
    pub(crate) read: ReadSettings,
    /// Where records are written
    pub(crate) write: WriteSettings,
    /// Number of records to write (default 10)
    #[serde(default)]
    pub(crate) count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BrokerCredentials {
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) password: Option<String>,
}

/// validated loopback configuration
#[derive(Debug)]
pub(crate) struct LoopbackConfiguration {
    pub(crate) broker: Option<BrokerCredentials>,
    pub(crate) read: ReadSettings,
    pub(crate) write: WriteSettings,
    pub(crate) count: usize,
}

impl TryFrom<LoadConfiguration> for LoopbackConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let mut read = config.read;
        if read.desired_splits == 0 {
            return Err(anyhow!("read.desired_splits must be at least 1"));
        }
        // the read side is bounded, fall back to a time limit when the file sets none
        if read.max_num_records.is_none() && read.max_read_time_ms.is_none() {
            read.max_read_time_ms = Some(DEFAULT_MAX_READ_TIME_MS);
        }

        Ok(LoopbackConfiguration {
            broker: config.broker,
            read,
            write: config.write,
            count: config.count.unwrap_or(DEFAULT_COUNT),
        })
    }
}

pub(crate) fn load(path: &Path) -> Result<LoopbackConfiguration> {
    let content = read_to_string(path)
        .with_context(|| format!("Failed to read the configuration file {}", path.display()))?;
    let load_config: LoadConfiguration = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse the configuration file {}", path.display()))?;
    load_config.try_into()
}
