use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use herald_api::error::{BackendError, ErrorKind};
use herald_api::schema::{RegistryConnector, SchemaDefinition, SchemaRegistry};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Confluent-compatible schema registry client over HTTP.
pub struct HttpSchemaRegistry {
    http: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
}

#[derive(serde::Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

/// Classify a non-success registry answer.
///
/// 409 (incompatible) and 422 (invalid schema) reject the schema itself;
/// anything else means the registry could not serve the request.
pub(crate) fn classify(status: u16, error_code: Option<u32>) -> ErrorKind {
    match (status, error_code) {
        (409 | 422, _) => ErrorKind::Schema,
        (_, Some(code)) if (42200..42300).contains(&code) || code == 409 => ErrorKind::Schema,
        _ => ErrorKind::Connection,
    }
}

pub(crate) fn normalize_url(url: &str) -> Result<String, BackendError> {
    let trimmed = url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(BackendError::config(format!(
            "schema registry url must be http(s), got '{url}'"
        )));
    }
    Ok(trimmed.to_string())
}

impl HttpSchemaRegistry {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_url(url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let resp = self
            .http
            .get(format!("{}/subjects", self.base_url))
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| BackendError::connection(format!("schema registry request: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::connection(format!("schema registry answered {status}")))
        }
    }

    async fn register_schema(&self, subject: &str, schema: &str) -> Result<u32, BackendError> {
        let resp = self
            .http
            .post(format!("{}/subjects/{subject}/versions", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .json(&RegisterRequest { schema })
            .send()
            .await
            .map_err(|e| BackendError::connection(format!("schema registry request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::connection(format!("schema registry read: {e}")))?;

        if status.is_success() {
            let parsed: RegisterResponse = serde_json::from_str(&body)
                .map_err(|e| BackendError::connection(format!("schema registry response: {e}: {body}")))?;
            return Ok(parsed.id);
        }

        let detail: Option<ErrorBody> = serde_json::from_str(&body).ok();
        let code = detail.as_ref().and_then(|d| d.error_code);
        let message = detail.and_then(|d| d.message).unwrap_or(body);
        Err(BackendError::new(
            classify(status.as_u16(), code),
            format!("schema registry answered {status} for subject '{subject}': {message}"),
        ))
    }
}

impl SchemaRegistry for HttpSchemaRegistry {
    fn register(
        &self,
        subject: &str,
        schema: &SchemaDefinition,
    ) -> Pin<Box<dyn Future<Output = Result<u32, BackendError>> + Send + '_>> {
        let subject = subject.to_string();
        let schema = schema.as_str().to_string();
        Box::pin(async move { self.register_schema(&subject, &schema).await })
    }
}

/// Opens [`HttpSchemaRegistry`] clients and checks the registry answers.
#[derive(Debug, Clone, Copy)]
pub struct HttpRegistryConnector {
    timeout: Duration,
}

impl HttpRegistryConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpRegistryConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl RegistryConnector for HttpRegistryConnector {
    fn connect(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn SchemaRegistry>, BackendError>> + Send + '_>> {
        let url = url.to_string();
        Box::pin(async move {
            let registry = HttpSchemaRegistry::new(&url, self.timeout)?;
            registry.ping().await?;
            tracing::debug!(url = %registry.base_url, "schema registry connected");
            Ok(Arc::new(registry) as Arc<dyn SchemaRegistry>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_schemas_are_schema_errors() {
        assert_eq!(classify(422, Some(42201)), ErrorKind::Schema);
        assert_eq!(classify(409, None), ErrorKind::Schema);
        assert_eq!(classify(400, Some(42203)), ErrorKind::Schema);
    }

    #[test]
    fn server_trouble_is_a_connection_error() {
        assert_eq!(classify(500, Some(50001)), ErrorKind::Connection);
        assert_eq!(classify(503, None), ErrorKind::Connection);
        assert_eq!(classify(404, Some(40401)), ErrorKind::Connection);
    }

    #[test]
    fn url_is_trimmed_and_checked() {
        assert_eq!(normalize_url(" http://registry:8081/ ").unwrap(), "http://registry:8081");
        assert_eq!(normalize_url("https://r.example").unwrap(), "https://r.example");
        let err = normalize_url("registry:8081").unwrap_err();
        assert!(err.is(ErrorKind::Config));
    }

    #[tokio::test]
    async fn unreachable_registry_fails_to_connect() {
        let connector = HttpRegistryConnector::new(Duration::from_millis(500));
        let err = connector.connect("http://127.0.0.1:1").await.err().unwrap();
        assert!(err.is(ErrorKind::Connection), "{err}");
    }
}
