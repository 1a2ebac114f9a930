//! Uploads records one at a time, adopting store-assigned ids.

use crate::error::{IngestError, Result};
use crate::fhir::{Record, Reference, Resource};
use crate::ledger::RunLedger;
use crate::store::ResourceStore;

/// Thin layer over a [`ResourceStore`] that adds record context to errors
/// and counts writes. Failures are returned immediately; nothing is retried
/// or rolled back.
pub struct UploadSequencer<'a> {
    store: &'a mut dyn ResourceStore,
    ledger: Option<&'a RunLedger>,
}

impl<'a> UploadSequencer<'a> {
    pub fn new(store: &'a mut dyn ResourceStore, ledger: Option<&'a RunLedger>) -> Self {
        Self { store, ledger }
    }

    pub fn base_url(&self) -> &str {
        self.store.base_url()
    }

    /// Create a resource, store the id it ends up with, and return a link to it.
    pub fn create<R: Resource>(&mut self, resource: &mut R) -> Result<Reference> {
        let record = resource.clone().into_record();
        let id = self.create_record(&record)?;
        resource.set_id(id);
        Reference::to(resource)
    }

    /// Create an already-wrapped record, returning its id.
    pub fn create_record(&mut self, record: &Record) -> Result<String> {
        match self.store.create(record) {
            Ok(id) => {
                if let Some(ledger) = self.ledger {
                    ledger.record_created(record.resource_type());
                }
                tracing::debug!(resource_type = record.resource_type(), id = %id, "Created");
                Ok(id)
            }
            Err(source) => Err(self.failure(record, source)),
        }
    }

    /// Replace a resource at its id.
    pub fn update<R: Resource>(&mut self, resource: &R) -> Result<()> {
        let record = resource.clone().into_record();
        match self.store.update(&record) {
            Ok(()) => {
                if let Some(ledger) = self.ledger {
                    ledger.record_updated();
                }
                tracing::debug!(resource_type = R::TYPE, id = ?resource.id(), "Updated");
                Ok(())
            }
            Err(source) => Err(self.failure(&record, source)),
        }
    }

    fn failure(&self, record: &Record, source: crate::store::StoreError) -> IngestError {
        if let Some(ledger) = self.ledger {
            ledger.record_upload_failure();
        }
        IngestError::Upload {
            resource_type: record.resource_type(),
            id: record.id().unwrap_or("(new)").to_string(),
            source,
        }
    }
}
