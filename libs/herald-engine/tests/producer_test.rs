mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use broker_memory::MemoryBrokerConfig;
use codec_avro::AvroCodec;
use common::*;
use herald_api::error::{BackendError, ErrorKind};
use herald_api::schema::{SchemaPair, unframe};
use herald_api::topic::TopicDescriptor;
use serde_json::json;

use herald_engine::ProducerError;

#[tokio::test]
async fn published_record_is_framed_and_confirmed() {
    let h = harness();
    let producer = h.ctx.producer(clicks(3, 2), click_schemas()).await.unwrap();

    let report = producer
        .publish(&json!("user-1"), Some(&json!({"url": "/pricing", "at": 42})))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(report.topic, "clicks");
    assert_eq!(report.offset, 0);
    assert_eq!(report.timestamp_ms, Some(START_MS));

    let records = h.broker.records("clicks").await;
    assert_eq!(records.len(), 1);
    let stored = &records[0];
    assert_eq!(stored.partition, report.partition);
    assert_eq!(stored.timestamp_ms, START_MS);

    let (key_id, key_datum) = unframe(&stored.key).unwrap();
    assert_eq!(h.registry.versions("clicks-key"), vec![key_id]);
    let key_codec = AvroCodec::parse(&KEY_SCHEMA.into()).unwrap();
    assert_eq!(key_codec.decode(key_datum).unwrap(), json!("user-1"));

    let payload = stored.payload.as_deref().unwrap();
    let (value_id, value_datum) = unframe(payload).unwrap();
    assert_eq!(h.registry.versions("clicks-value"), vec![value_id]);
    let value_codec = AvroCodec::parse(&CLICK_SCHEMA.into()).unwrap();
    assert_eq!(
        value_codec.decode(value_datum).unwrap(),
        json!({"url": "/pricing", "at": 42, "referrer": null})
    );
}

#[tokio::test]
async fn both_subjects_are_registered_once_per_schema() {
    let h = harness();
    h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();
    h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();

    assert_eq!(h.registry.subjects(), vec!["clicks-key", "clicks-value"]);
    assert_eq!(h.registry.versions("clicks-value").len(), 1);
}

#[tokio::test]
async fn timestamps_follow_the_context_clock() {
    let h = harness();
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();
    assert_eq!(producer.time_millis(), START_MS);

    h.clock.advance(1_500);
    let report = producer.publish(&json!("k"), None).unwrap().await.unwrap();
    assert_eq!(report.timestamp_ms, Some(START_MS + 1_500));
    assert_eq!(producer.time_millis(), START_MS + 1_500);
}

#[tokio::test]
async fn nonconforming_values_are_rejected_before_sending() {
    let h = harness();
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();

    let err = producer.publish(&json!(17), None).unwrap_err();
    assert!(matches!(err, ProducerError::Serialization(ref e) if e.is(ErrorKind::Serialization)), "{err}");

    let err = producer
        .publish(&json!("k"), Some(&json!({"url": "/", "at": "yesterday"})))
        .unwrap_err();
    assert!(matches!(err, ProducerError::Serialization(_)), "{err}");

    assert!(h.broker.records("clicks").await.is_empty());
    assert_eq!(producer.handle().in_flight(), 0);
}

#[tokio::test]
async fn key_only_producer_sends_tombstones_but_refuses_values() {
    let h = harness();
    let producer = h
        .ctx
        .producer(clicks(1, 1), SchemaPair::new(KEY_SCHEMA))
        .await
        .unwrap();

    producer.publish(&json!("gone"), None).unwrap().await.unwrap();
    let err = producer.publish(&json!("k"), Some(&json!({"url": "/", "at": 1}))).unwrap_err();
    assert!(matches!(err, ProducerError::Serialization(_)), "{err}");

    let records = h.broker.records("clicks").await;
    assert_eq!(records.len(), 1);
    assert!(records[0].payload.is_none());
    assert_eq!(h.registry.subjects(), vec!["clicks-key"]);
}

#[tokio::test]
async fn unparseable_schema_fails_construction() {
    let h = harness();
    let err = h
        .ctx
        .producer(clicks(1, 1), SchemaPair::new(KEY_SCHEMA).with_value(r#"{"type": "record"}"#))
        .await
        .unwrap_err();

    assert!(matches!(err, ProducerError::Schema(_)), "{err}");
    assert_eq!(h.broker.sink_connection_count(), 0);
}

#[tokio::test]
async fn unreachable_registry_is_a_connection_error() {
    let h = harness();
    h.registry.set_reachable(false);

    let err = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap_err();

    assert!(matches!(err, ProducerError::Connection(_)), "{err}");
    assert_eq!(h.broker.sink_connection_count(), 0);
    // Provisioning happens first and is unaffected.
    assert!(h.broker.topic("clicks").await.is_some());
}

#[tokio::test]
async fn missing_topic_surfaces_as_delivery_error() {
    let h = harness();
    h.broker.fail_creation("events", BackendError::admin("policy violation"));
    let producer = h
        .ctx
        .producer(TopicDescriptor::new("events").unwrap(), click_schemas())
        .await
        .unwrap();

    let err = producer.publish(&json!("k"), None).unwrap().await.unwrap_err();

    assert!(matches!(err, ProducerError::Delivery(ref e) if e.is(ErrorKind::UnknownTopic)), "{err}");
}

#[tokio::test]
async fn wait_timeout_gives_up_on_slow_delivery() {
    let h = harness_with(MemoryBrokerConfig {
        broker_count: 3,
        delivery_delay_ms: 500,
        ..Default::default()
    });
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();

    let delivery = producer.publish(&json!("k"), None).unwrap();
    assert_eq!(delivery.topic(), "clicks");
    let err = delivery.wait_timeout(Duration::from_millis(10)).await.unwrap_err();

    assert!(matches!(err, ProducerError::Timeout { operation: "delivery wait", .. }), "{err}");
}

#[tokio::test]
async fn close_twice_releases_once() {
    let h = harness();
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();

    producer.close().await.unwrap();
    producer.close().await.unwrap();

    assert!(producer.handle().is_closed());
    assert_eq!(h.broker.sink_close_count(), 1);
}

#[tokio::test]
async fn close_drops_the_sink_connection() {
    let h = harness();
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();
    assert_eq!(h.broker.open_sink_count(), 1);

    producer.close().await.unwrap();

    // The producer itself is still alive; only its client is gone.
    assert_eq!(h.broker.open_sink_count(), 0);
    let err = producer.handle().flush().await.unwrap_err();
    assert!(matches!(err, ProducerError::Closed { .. }), "{err}");
}

#[tokio::test]
async fn release_failure_is_returned_by_the_first_close_only() {
    let h = harness();
    h.broker.fail_close(BackendError::delivery("flush queue stuck"));
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();

    let err = producer.close().await.unwrap_err();
    assert!(matches!(err, ProducerError::Close(ref e) if e.message.contains("flush queue stuck")), "{err}");

    producer.close().await.unwrap();
    assert_eq!(h.broker.sink_close_count(), 1);
    assert_eq!(h.broker.open_sink_count(), 0);
}

#[tokio::test]
async fn publish_after_close_is_refused() {
    let h = harness();
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();
    producer.close().await.unwrap();

    let err = producer.publish(&json!("k"), None).unwrap_err();

    assert!(matches!(err, ProducerError::Closed { ref topic } if topic == "clicks"), "{err}");
    assert!(h.broker.records("clicks").await.is_empty());
}

#[tokio::test]
async fn close_waits_for_in_flight_deliveries() {
    let h = harness_with(MemoryBrokerConfig {
        broker_count: 3,
        delivery_delay_ms: 100,
        ..Default::default()
    });
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();

    let mut pending = Vec::new();
    for i in 0..3 {
        pending.push(producer.publish(&json!(format!("k{i}")), None).unwrap());
    }
    // One confirmation nobody waits for.
    drop(producer.publish(&json!("dropped"), None).unwrap());

    producer.close().await.unwrap();

    assert_eq!(producer.handle().in_flight(), 0);
    assert_eq!(h.broker.records("clicks").await.len(), 4);
    for delivery in pending {
        delivery.await.unwrap();
    }
}

#[tokio::test]
async fn close_stops_waiting_after_close_timeout() {
    let broker = broker_memory::MemoryBroker::new(MemoryBrokerConfig {
        broker_count: 3,
        delivery_delay_ms: 5_000,
        ..Default::default()
    });
    let h = harness_on(broker, settings().with_close_timeout(Duration::from_millis(50)), None);
    let producer = h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap();
    let _slow = producer.publish(&json!("k"), None).unwrap();

    let started = Instant::now();
    producer.close().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(h.broker.sink_close_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publishes_racing_close_are_drained_or_refused() {
    let h = harness_with(MemoryBrokerConfig {
        broker_count: 3,
        delivery_delay_ms: 20,
        ..Default::default()
    });
    let producer = Arc::new(h.ctx.producer(clicks(1, 1), click_schemas()).await.unwrap());

    let mut publishers = Vec::new();
    for p in 0..4 {
        let producer = producer.clone();
        publishers.push(tokio::spawn(async move {
            let mut accepted = Vec::new();
            for i in 0..200 {
                match producer.publish(&json!(format!("p{p}-{i}")), None) {
                    Ok(delivery) => accepted.push(delivery),
                    Err(ProducerError::Closed { .. }) => break,
                    Err(e) => panic!("unexpected publish error: {e}"),
                }
                tokio::task::yield_now().await;
            }
            accepted
        }));
    }
    tokio::time::sleep(Duration::from_millis(5)).await;

    producer.close().await.unwrap();
    // Everything accepted before close was drained by it.
    let stored = h.broker.records("clicks").await.len();
    assert_eq!(producer.handle().in_flight(), 0);

    let mut accepted = 0;
    for publisher in publishers {
        for delivery in publisher.await.unwrap() {
            delivery.await.unwrap();
            accepted += 1;
        }
    }
    assert_eq!(stored, accepted);
    assert_eq!(h.broker.open_sink_count(), 0);
}
