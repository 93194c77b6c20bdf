/// A record ready to hand to a [`RecordSink`](crate::sink::RecordSink).
/// `key` and `payload` are already encoded; sinks never interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Vec<u8>,
    /// `None` publishes a tombstone.
    pub payload: Option<Vec<u8>>,
    pub timestamp_ms: i64,
}

/// Broker acknowledgement for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp_ms: Option<i64>,
}
