//! Server-wide configuration, loaded once at startup from TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level directory server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub partitions: Vec<PartitionConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub replica_id: u32,
}

/// One partition: the suffix DN it's authoritative for and where its
/// indexed store lives on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub suffix: String,
    pub data_dir: String,
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: u64,
    /// Attribute names/OIDs to forward-index in this partition. Empty (the
    /// default) indexes every schema attribute type.
    #[serde(default)]
    pub indexed_attributes: Vec<String>,
}

fn default_map_size_mb() -> u64 {
    1024
}

/// Default resource limits applied when a session doesn't override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub default_size_limit: Option<u64>,
    #[serde(with = "humantime_duration", default = "default_time_limit")]
    pub default_time_limit: Duration,
    pub admin_size_limit: Option<u64>,
}

fn default_time_limit() -> Duration {
    Duration::from_secs(30)
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_size_limit: Some(1000),
            default_time_limit: default_time_limit(),
            admin_size_limit: None,
        }
    }
}

impl DirectoryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn partition_for_suffix(&self, suffix: &str) -> Option<&PartitionConfig> {
        self.partitions
            .iter()
            .find(|p| p.suffix.eq_ignore_ascii_case(suffix))
    }
}

/// Serializes `Duration` as a plain integer count of seconds; the config
/// file is meant to be hand-edited, and `30` reads better than a nested
/// struct there.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let text = r#"
            replica_id = 1

            [[partitions]]
            suffix = "dc=example,dc=com"
            data_dir = "/var/lib/dirsrv/example"
        "#;
        let config = DirectoryConfig::from_toml_str(text).unwrap();
        assert_eq!(config.partitions.len(), 1);
        assert_eq!(config.limits.default_time_limit, Duration::from_secs(30));
    }

    #[test]
    fn partition_lookup_is_case_insensitive() {
        let config = DirectoryConfig {
            partitions: vec![PartitionConfig {
                suffix: "dc=example,dc=com".to_string(),
                data_dir: "/data".to_string(),
                map_size_mb: 1024,
                indexed_attributes: Vec::new(),
            }],
            limits: LimitsConfig::default(),
            replica_id: 0,
        };
        assert!(config.partition_for_suffix("DC=Example,DC=Com").is_some());
    }
}
