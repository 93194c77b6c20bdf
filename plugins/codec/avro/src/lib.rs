mod convert;

use std::sync::Arc;

use apache_avro::Schema;
use herald_api::error::BackendError;
use herald_api::schema::{Codec, CodecFactory, SchemaDefinition};

use convert::{Converter, Names, avro_to_json, collect_names};

// ═══════════════════════════════════════════════════════════════
//  AvroCodec
// ═══════════════════════════════════════════════════════════════

/// Avro binary datum codec for one parsed schema.
pub struct AvroCodec {
    schema: Schema,
    names: Names,
}

impl std::fmt::Debug for AvroCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroCodec").field("schema", &self.schema.canonical_form()).finish()
    }
}

impl AvroCodec {
    pub fn parse(definition: &SchemaDefinition) -> Result<Self, BackendError> {
        let schema = Schema::parse_str(definition.as_str())
            .map_err(|e| BackendError::schema(format!("avro: failed to parse schema: {e}")))?;
        Ok(Self::new(schema))
    }

    pub fn new(schema: Schema) -> Self {
        let mut names = Names::new();
        collect_names(&schema, &mut names);
        Self { schema, names }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Decode an unframed datum back into JSON.
    pub fn decode(&self, data: &[u8]) -> Result<serde_json::Value, BackendError> {
        let mut reader = data;
        let value = apache_avro::from_avro_datum(&self.schema, &mut reader, None)
            .map_err(|e| BackendError::serialization(format!("avro decode: {e}")))?;
        Ok(avro_to_json(&value))
    }
}

impl Codec for AvroCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, BackendError> {
        let avro = Converter::new(&self.names).convert(value, &self.schema, "")?;
        apache_avro::to_avro_datum(&self.schema, avro)
            .map_err(|e| BackendError::serialization(format!("avro encode: {e}")))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Factory
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Copy)]
pub struct AvroCodecFactory;

impl CodecFactory for AvroCodecFactory {
    fn create(&self, schema: &SchemaDefinition) -> Result<Arc<dyn Codec>, BackendError> {
        Ok(Arc::new(AvroCodec::parse(schema)?))
    }
}
