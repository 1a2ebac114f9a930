//! Error types for the ingestion pipeline.

use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while reading, aligning, encoding or uploading a dataset.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot reference {resource_type} without an id")]
    UnresolvedReference { resource_type: &'static str },

    #[error("Derived observation {observation} has no source observation for modality {modality}")]
    MissingDerivationSource {
        observation: String,
        modality: String,
    },

    #[error("Invalid series {modality}: {message}")]
    InvalidSeries { modality: String, message: String },

    #[error("Upload of {resource_type}/{id} failed: {source}")]
    Upload {
        resource_type: &'static str,
        id: String,
        source: StoreError,
    },

    #[error("Participant {participant} aborted: {source}")]
    Participant {
        participant: String,
        source: Box<IngestError>,
    },

    #[error("Dataset error: {0}")]
    Dataset(String),
}

impl IngestError {
    pub(crate) fn parse(path: impl std::fmt::Display, message: impl Into<String>) -> Self {
        IngestError::Parse {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_carries_record_context() {
        let err = IngestError::Upload {
            resource_type: "Observation",
            id: "WESAD-S2-00004".to_string(),
            source: StoreError::Server {
                status: 422,
                body: "unknown reference".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("Observation/WESAD-S2-00004"));
        assert!(text.contains("422"));
        assert!(text.contains("unknown reference"));
    }
}
