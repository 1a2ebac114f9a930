//! Record stores the pipeline uploads to.
//!
//! The pipeline depends only on [`ResourceStore`]: create a record (adopting
//! the id the store assigns when the record has none) and update a record
//! that already has an id.

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

#[cfg(feature = "http")]
pub use http::{BlockingFhirClient, FhirClient};
pub use memory::MemoryStore;

use crate::fhir::Record;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default FHIR base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/fhir";

/// Connection settings for a FHIR server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Server base URL, e.g. `http://localhost:8080/fhir`
    pub base_url: String,
    /// Bearer token, sent only when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout
    #[serde(with = "crate::config::duration_serde")]
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Endpoint for creating resources of a type.
    pub fn type_url(&self, resource_type: &str) -> String {
        format!("{}/{resource_type}", self.base())
    }

    /// Endpoint of one resource instance.
    pub fn instance_url(&self, resource_type: &str, id: &str) -> String {
        format!("{}/{resource_type}/{id}", self.base())
    }

    /// Capability statement endpoint, used as a health check.
    pub fn metadata_url(&self) -> String {
        format!("{}/metadata", self.base())
    }
}

/// Store error types.
#[derive(Debug)]
pub enum StoreError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server rejected the request
    Server { status: u16, body: String },
    /// JSON serialization error
    Serialization(String),
    /// Update of a record without an id, or a create response without one
    MissingId { resource_type: &'static str },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Config(msg) => write!(f, "Store config error: {msg}"),
            StoreError::Network(msg) => write!(f, "Store network error: {msg}"),
            StoreError::Server { status, body } => {
                write!(f, "Store server error ({status}): {body}")
            }
            StoreError::Serialization(msg) => write!(f, "Store serialization error: {msg}"),
            StoreError::MissingId { resource_type } => {
                write!(f, "{resource_type} needs an id")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// The two operations the pipeline needs from a FHIR server.
pub trait ResourceStore {
    fn base_url(&self) -> &str;

    /// Create a record and return its id.
    ///
    /// A record without an id is posted and the id assigned by the store is
    /// returned. A record with an id is written at that id, replacing any
    /// existing version.
    fn create(&mut self, record: &Record) -> Result<String, StoreError>;

    /// Replace a record at its id. Fails with [`StoreError::MissingId`] when
    /// the record has none.
    fn update(&mut self, record: &Record) -> Result<(), StoreError>;
}

impl<S: ResourceStore + ?Sized> ResourceStore for Box<S> {
    fn base_url(&self) -> &str {
        (**self).base_url()
    }

    fn create(&mut self, record: &Record) -> Result<String, StoreError> {
        (**self).create(record)
    }

    fn update(&mut self, record: &Record) -> Result<(), StoreError> {
        (**self).update(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_urls() {
        let config = StoreConfig::new("http://localhost:8080/fhir/");
        assert_eq!(config.type_url("Patient"), "http://localhost:8080/fhir/Patient");
        assert_eq!(
            config.instance_url("Patient", "WESAD-S2"),
            "http://localhost:8080/fhir/Patient/WESAD-S2"
        );
        assert_eq!(config.metadata_url(), "http://localhost:8080/fhir/metadata");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Server {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Store server error (404): not found");
        let err = StoreError::MissingId {
            resource_type: "Observation",
        };
        assert!(err.to_string().contains("Observation"));
    }
}
