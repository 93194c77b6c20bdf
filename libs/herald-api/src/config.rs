use std::collections::BTreeMap;
use std::time::Duration;

/// Connection properties handed to a [`BrokerConnector`](crate::admin::BrokerConnector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// One or more broker endpoints, comma separated.
    pub bootstrap_servers: String,
    /// Extra client properties passed through to the backend as-is.
    pub properties: BTreeMap<String, String>,
    /// Upper bound for a single metadata/admin request.
    pub request_timeout: Duration,
    /// Upper bound for a published record to be acknowledged.
    pub delivery_timeout: Duration,
}

impl BrokerSettings {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            properties: BTreeMap::new(),
            request_timeout: Duration::from_secs(5),
            delivery_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}
