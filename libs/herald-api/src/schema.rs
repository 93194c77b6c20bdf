use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BackendError;

/// Opaque schema definition (e.g. Avro JSON). Only codecs and the schema
/// registry interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaDefinition(String);

impl SchemaDefinition {
    pub fn new(definition: impl Into<String>) -> Self {
        Self(definition.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SchemaDefinition {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SchemaDefinition {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SchemaDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Schema contract of a producer: required key schema, optional value schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPair {
    key: SchemaDefinition,
    value: Option<SchemaDefinition>,
}

impl SchemaPair {
    pub fn new(key: impl Into<SchemaDefinition>) -> Self {
        Self { key: key.into(), value: None }
    }

    pub fn with_value(mut self, value: impl Into<SchemaDefinition>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn key(&self) -> &SchemaDefinition {
        &self.key
    }

    pub fn value(&self) -> Option<&SchemaDefinition> {
        self.value.as_ref()
    }
}

/// Which half of a record a schema subject describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Key,
    Value,
}

/// Registry subject under the topic-name strategy: `<topic>-key` / `<topic>-value`.
pub fn subject_name(topic: &str, kind: SubjectKind) -> String {
    match kind {
        SubjectKind::Key => format!("{topic}-key"),
        SubjectKind::Value => format!("{topic}-value"),
    }
}

/// Magic byte of the registry wire format.
pub const WIRE_MAGIC: u8 = 0;

/// Registry wire format: `[0x00][schema id, 4 bytes BE][datum]`.
pub fn frame(schema_id: u32, datum: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(datum.len() + 5);
    out.push(WIRE_MAGIC);
    out.extend_from_slice(&schema_id.to_be_bytes());
    out.extend_from_slice(datum);
    out
}

/// Splits a framed message into schema id and datum.
pub fn unframe(data: &[u8]) -> Result<(u32, &[u8]), BackendError> {
    match data {
        [WIRE_MAGIC, a, b, c, d, datum @ ..] => Ok((u32::from_be_bytes([*a, *b, *c, *d]), datum)),
        [magic, ..] if *magic != WIRE_MAGIC => {
            Err(BackendError::serialization(format!("unknown magic byte {magic:#04x}")))
        }
        _ => Err(BackendError::serialization(format!(
            "framed message too short: {} bytes",
            data.len()
        ))),
    }
}

/// Validates values against one schema and encodes them.
pub trait Codec: Send + Sync {
    /// Encode `value`. Values not conforming to the schema fail with
    /// `ErrorKind::Serialization`.
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, BackendError>;
}

/// Builds codecs from schema definitions.
pub trait CodecFactory: Send + Sync {
    /// Unparseable definitions fail with `ErrorKind::Schema`.
    fn create(&self, schema: &SchemaDefinition) -> Result<Arc<dyn Codec>, BackendError>;
}

/// Connected schema registry client.
pub trait SchemaRegistry: Send + Sync {
    /// Register `schema` under `subject` and return its id. Registering an
    /// identical schema again returns the same id.
    fn register(
        &self,
        subject: &str,
        schema: &SchemaDefinition,
    ) -> Pin<Box<dyn Future<Output = Result<u32, BackendError>> + Send + '_>>;
}

/// Opens schema registry clients.
pub trait RegistryConnector: Send + Sync {
    /// Must fail with `ErrorKind::Connection` when the registry is unreachable.
    #[allow(clippy::type_complexity)]
    fn connect(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn SchemaRegistry>, BackendError>> + Send + '_>>;
}
