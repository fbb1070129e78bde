use serde::{Deserialize, Serialize};

use crate::errors::Result;

fn default_desired_splits() -> usize {
    1
}

/// The serializable part of a read configuration, as found in a YAML file.
///
/// Mappers and the connection factory are code, so they are supplied on the builder
/// seeded by [`crate::ReadConfigBuilder::from_settings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSettings {
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub max_num_records: Option<u64>,
    #[serde(default)]
    pub max_read_time_ms: Option<u64>,
    #[serde(default = "default_desired_splits")]
    pub desired_splits: usize,
}

impl ReadSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSettings {
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl WriteSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
