#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use broker_memory::{MemoryBroker, MemoryBrokerConfig};
use codec_avro::AvroCodecFactory;
use herald_api::schema::SchemaPair;
use herald_api::time::ManualClock;
use herald_api::topic::TopicDescriptor;
use herald_engine::config::ClientSettings;
use herald_engine::{Backends, ProducerContext, TopicRegistry};
use registry_memory::MemorySchemaRegistry;

pub const START_MS: i64 = 1_700_000_000_000;

pub const KEY_SCHEMA: &str = r#""string""#;

pub const CLICK_SCHEMA: &str = r#"{
    "type": "record",
    "name": "Click",
    "fields": [
        {"name": "url", "type": "string"},
        {"name": "at", "type": "long"},
        {"name": "referrer", "type": ["null", "string"], "default": null}
    ]
}"#;

// ---------------------------------------------------------------------------
// Context helpers
// ---------------------------------------------------------------------------

pub struct Harness {
    pub broker: MemoryBroker,
    pub registry: MemorySchemaRegistry,
    pub clock: Arc<ManualClock>,
    pub ctx: ProducerContext,
}

pub fn settings() -> ClientSettings {
    ClientSettings::new("memory://cluster", "http://registry.test")
        .with_admin_timeout(Duration::from_secs(1))
        .with_delivery_timeout(Duration::from_secs(5))
        .with_close_timeout(Duration::from_secs(5))
}

pub fn harness() -> Harness {
    harness_with(MemoryBrokerConfig {
        broker_count: 3,
        ..Default::default()
    })
}

pub fn harness_with(config: MemoryBrokerConfig) -> Harness {
    harness_on(MemoryBroker::new(config), settings(), None)
}

/// A context over an existing broker, optionally sharing a topic registry.
pub fn harness_on(broker: MemoryBroker, settings: ClientSettings, topics: Option<Arc<TopicRegistry>>) -> Harness {
    let registry = MemorySchemaRegistry::new();
    let clock = Arc::new(ManualClock::new(START_MS));
    let backends = Backends::new(
        Arc::new(broker.clone()),
        Arc::new(registry.clone()),
        Arc::new(AvroCodecFactory),
    );
    let mut builder = ProducerContext::builder(settings, backends).clock(clock.clone());
    if let Some(topics) = topics {
        builder = builder.registry(topics);
    }
    Harness {
        broker,
        registry,
        clock,
        ctx: builder.build(),
    }
}

pub fn clicks(partitions: u32, replicas: u32) -> TopicDescriptor {
    TopicDescriptor::builder("clicks")
        .partitions(partitions)
        .replicas(replicas)
        .build()
        .unwrap()
}

pub fn click_schemas() -> SchemaPair {
    SchemaPair::new(KEY_SCHEMA).with_value(CLICK_SCHEMA)
}
