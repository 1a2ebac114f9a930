//! Biosignal FHIR Ingest - republish wearable stress-research datasets as a
//! FHIR record graph.
//!
//! Four public datasets are supported: WESAD, SDN, SRAD and WSPCP. Each is
//! read from its native layout, cut into labelled chunks, enriched with
//! windowed features and uploaded in dependency order so that every
//! reference points at a record the server already holds.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Biosignal FHIR Ingest                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐      │
//! │  │  Reader  │──▶│ Aligner  │──▶│ Features │──▶│ Encoder  │      │
//! │  │ (files)  │   │ (chunks) │   │ (window) │   │  (FHIR)  │      │
//! │  └──────────┘   └──────────┘   └──────────┘   └──────────┘      │
//! │                                                     │           │
//! │                                                     ▼           │
//! │  ┌──────────┐                               ┌──────────────┐    │
//! │  │  Ledger  │◀──────────────────────────────│  Sequencer   │──▶ store
//! │  └──────────┘                               └──────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use biosignal_fhir_ingest::{run_study, Dataset, MemoryStore, RunOptions};
//! use std::path::Path;
//!
//! let mut loader = Dataset::Wspcp.loader(Path::new("/data/wspcp"))?;
//! let mut store = MemoryStore::new();
//! let outcome = run_study(loader.as_mut(), &mut store, RunOptions::default())?;
//! println!("{} participants uploaded", outcome.completed.len());
//! # Ok::<(), biosignal_fhir_ingest::IngestError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod datasets;
pub mod error;
pub mod fhir;
pub mod ledger;
pub mod pipeline;
pub mod reader;
pub mod store;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use datasets::Dataset;
pub use error::{IngestError, Result};
pub use ledger::{RunLedger, SharedRunLedger};
pub use pipeline::{run_study, DatasetLoader, RunOptions, StudyOutcome};
pub use store::{MemoryStore, ResourceStore, StoreConfig, StoreError};

#[cfg(feature = "http")]
pub use store::{BlockingFhirClient, FhirClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
