use std::collections::BTreeMap;

use crate::error::BackendError;

pub const CLEANUP_POLICY: &str = "cleanup.policy";
pub const COMPRESSION_TYPE: &str = "compression.type";
pub const DELETE_RETENTION_MS: &str = "delete.retention.ms";
pub const FILE_DELETE_DELAY_MS: &str = "file.delete.delay.ms";

/// Topic-level configuration sent with a creation request.
///
/// `Default` carries the retention settings every provisioned topic gets
/// unless overridden: `delete` cleanup, `lz4` compression, 100 ms delete
/// retention and 100 ms file delete delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfigMap {
    entries: BTreeMap<String, String>,
}

impl Default for TopicConfigMap {
    fn default() -> Self {
        let mut map = Self::empty();
        map.set(CLEANUP_POLICY, "delete");
        map.set(COMPRESSION_TYPE, "lz4");
        map.set(DELETE_RETENTION_MS, "100");
        map.set(FILE_DELETE_DELAY_MS, "100");
        map
    }
}

impl TopicConfigMap {
    /// A map without any of the retention defaults.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for TopicConfigMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

/// Everything needed to provision a topic: name, partitioning,
/// replication and topic-level config. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescriptor {
    name: String,
    num_partitions: u32,
    num_replicas: u32,
    config: TopicConfigMap,
}

impl TopicDescriptor {
    pub fn builder(name: impl Into<String>) -> TopicDescriptorBuilder {
        TopicDescriptorBuilder {
            name: name.into(),
            num_partitions: 1,
            num_replicas: 1,
            config: TopicConfigMap::default(),
        }
    }

    /// Descriptor with one partition, one replica and the default config.
    pub fn new(name: impl Into<String>) -> Result<Self, BackendError> {
        Self::builder(name).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn num_replicas(&self) -> u32 {
        self.num_replicas
    }

    pub fn config(&self) -> &TopicConfigMap {
        &self.config
    }

    /// The administrative creation request for this topic.
    pub fn create_request(&self) -> TopicCreateRequest {
        TopicCreateRequest {
            name: self.name.clone(),
            num_partitions: self.num_partitions,
            replication_factor: self.num_replicas,
            config: self.config.as_map().clone(),
        }
    }
}

pub struct TopicDescriptorBuilder {
    name: String,
    num_partitions: u32,
    num_replicas: u32,
    config: TopicConfigMap,
}

impl TopicDescriptorBuilder {
    pub fn partitions(mut self, n: u32) -> Self {
        self.num_partitions = n;
        self
    }

    pub fn replicas(mut self, n: u32) -> Self {
        self.num_replicas = n;
        self
    }

    /// Override or add a single topic config entry.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn configs<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config.extend(entries);
        self
    }

    /// Replace the whole config map, dropping the retention defaults.
    pub fn config_map(mut self, config: TopicConfigMap) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<TopicDescriptor, BackendError> {
        if self.name.trim().is_empty() {
            return Err(BackendError::config("topic name must not be empty"));
        }
        if self.num_partitions == 0 {
            return Err(BackendError::config(format!(
                "topic '{}': num_partitions must be positive",
                self.name
            )));
        }
        if self.num_replicas == 0 {
            return Err(BackendError::config(format!(
                "topic '{}': num_replicas must be positive",
                self.name
            )));
        }
        Ok(TopicDescriptor {
            name: self.name,
            num_partitions: self.num_partitions,
            num_replicas: self.num_replicas,
            config: self.config,
        })
    }
}

/// Administrative topic-creation request, one per topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCreateRequest {
    pub name: String,
    pub num_partitions: u32,
    pub replication_factor: u32,
    pub config: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_to_single_partition_with_retention_defaults() {
        let topic = TopicDescriptor::new("arrivals").unwrap();
        assert_eq!(topic.num_partitions(), 1);
        assert_eq!(topic.num_replicas(), 1);
        assert_eq!(topic.config().get(CLEANUP_POLICY), Some("delete"));
        assert_eq!(topic.config().get(COMPRESSION_TYPE), Some("lz4"));
        assert_eq!(topic.config().get(DELETE_RETENTION_MS), Some("100"));
        assert_eq!(topic.config().get(FILE_DELETE_DELAY_MS), Some("100"));
    }

    #[test]
    fn overrides_replace_single_entries() {
        let topic = TopicDescriptor::builder("turnstiles")
            .partitions(6)
            .replicas(3)
            .config(COMPRESSION_TYPE, "zstd")
            .config("retention.ms", "86400000")
            .build()
            .unwrap();

        let request = topic.create_request();
        assert_eq!(request.num_partitions, 6);
        assert_eq!(request.replication_factor, 3);
        assert_eq!(request.config[COMPRESSION_TYPE], "zstd");
        assert_eq!(request.config[CLEANUP_POLICY], "delete");
        assert_eq!(request.config["retention.ms"], "86400000");
        assert_eq!(request.config.len(), 5);
    }

    #[test]
    fn rejects_invalid_descriptors() {
        for builder in [
            TopicDescriptor::builder(""),
            TopicDescriptor::builder("   "),
            TopicDescriptor::builder("weather").partitions(0),
            TopicDescriptor::builder("weather").replicas(0),
        ] {
            let err = builder.build().unwrap_err();
            assert!(err.is(ErrorKind::Config), "{err}");
        }
    }

    #[test]
    fn config_map_can_drop_defaults() {
        let mut config = TopicConfigMap::empty();
        config.set(CLEANUP_POLICY, "compact");
        let topic = TopicDescriptor::builder("stations")
            .config_map(config)
            .build()
            .unwrap();
        assert_eq!(topic.config().len(), 1);
        assert_eq!(topic.config().get(COMPRESSION_TYPE), None);
    }
}
