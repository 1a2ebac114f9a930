//! Run ledger: what each ingestion run uploaded, and cumulative totals.

pub mod run;

// Re-export commonly used types
pub use run::{read_totals, PersistedTotals, RunLedger, RunStats, SharedRunLedger};
