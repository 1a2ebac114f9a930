//! HTTP client for a FHIR REST server.

use super::{ResourceStore, StoreConfig, StoreError};
use crate::fhir::Record;

const FHIR_JSON: &str = "application/fhir+json";

/// Async FHIR client.
pub struct FhirClient {
    config: StoreConfig,
    client: reqwest::Client,
}

impl FhirClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Check that the server answers its capability statement.
    pub async fn test_connection(&self) -> Result<bool, StoreError> {
        let response = self
            .authorize(self.client.get(self.config.metadata_url()))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// POST an id-less record or PUT one with an id; returns the id.
    pub async fn create(&self, record: &Record) -> Result<String, StoreError> {
        let resource_type = record.resource_type();
        if let Some(id) = record.id() {
            let url = self.config.instance_url(resource_type, id);
            self.send(self.client.put(url), record).await?;
            tracing::debug!(resource_type, id, "Created");
            return Ok(id.to_string());
        }

        let body = self
            .send(self.client.post(self.config.type_url(resource_type)), record)
            .await?;
        let created: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let id = created
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or(StoreError::MissingId { resource_type })?
            .to_string();
        tracing::debug!(resource_type, id = %id, "Created");
        Ok(id)
    }

    /// PUT a record at its id.
    pub async fn update(&self, record: &Record) -> Result<(), StoreError> {
        let resource_type = record.resource_type();
        let id = record.id().ok_or(StoreError::MissingId { resource_type })?;
        let url = self.config.instance_url(resource_type, id);
        self.send(self.client.put(url), record).await?;
        tracing::debug!(resource_type, id, "Updated");
        Ok(())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, record: &Record) -> Result<String, StoreError> {
        let body = serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let response = self
            .authorize(request)
            .header("Content-Type", FHIR_JSON)
            .header("Accept", FHIR_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if !status.is_success() {
            return Err(StoreError::Server {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

/// Blocking FHIR client for the synchronous pipeline.
pub struct BlockingFhirClient {
    inner: FhirClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingFhirClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: FhirClient::new(config)?,
            runtime,
        })
    }

    pub fn test_connection(&self) -> Result<bool, StoreError> {
        self.runtime.block_on(self.inner.test_connection())
    }
}

impl ResourceStore for BlockingFhirClient {
    fn base_url(&self) -> &str {
        &self.inner.config().base_url
    }

    fn create(&mut self, record: &Record) -> Result<String, StoreError> {
        self.runtime.block_on(self.inner.create(record))
    }

    fn update(&mut self, record: &Record) -> Result<(), StoreError> {
        self.runtime.block_on(self.inner.update(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhir::{Observation, Resource};

    #[test]
    fn test_blocking_client_builds_offline() {
        let client = BlockingFhirClient::new(StoreConfig::default()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/fhir");
    }

    #[test]
    fn test_update_without_id_fails_before_sending() {
        // nothing listens on this port; the id check must fail first
        let mut client = BlockingFhirClient::new(StoreConfig::new("http://127.0.0.1:9")).unwrap();
        let record = Observation::default().into_record();
        assert!(matches!(
            client.update(&record),
            Err(StoreError::MissingId {
                resource_type: "Observation"
            })
        ));
    }
}
