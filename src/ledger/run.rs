//! Counters for one ingestion run, with cumulative totals persisted across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// What was uploaded during a run.
#[derive(Debug)]
pub struct RunLedger {
    /// Participants whose records were all uploaded
    participants_completed: AtomicU64,
    /// Participants aborted by an encoding or upload error
    participants_failed: AtomicU64,
    /// Successful create calls
    records_created: AtomicU64,
    /// Successful update calls
    records_updated: AtomicU64,
    /// Observations created, a subset of records_created
    observations: AtomicU64,
    /// Questionnaire responses created, a subset of records_created
    questionnaire_responses: AtomicU64,
    /// Rejected create or update calls
    upload_failures: AtomicU64,
    run_id: Uuid,
    host: String,
    started: DateTime<Utc>,
    /// Path for persisting totals
    persist_path: Option<PathBuf>,
    /// Totals from earlier runs
    previous: PersistedTotals,
}

impl RunLedger {
    pub fn new() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            participants_completed: AtomicU64::new(0),
            participants_failed: AtomicU64::new(0),
            records_created: AtomicU64::new(0),
            records_updated: AtomicU64::new(0),
            observations: AtomicU64::new(0),
            questionnaire_responses: AtomicU64::new(0),
            upload_failures: AtomicU64::new(0),
            run_id: Uuid::new_v4(),
            host,
            started: Utc::now(),
            persist_path: None,
            previous: PersistedTotals::default(),
        }
    }

    /// Create a ledger that adds its counts to the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut ledger = Self::new();
        ledger.persist_path = Some(path);

        if let Err(e) = ledger.load() {
            tracing::warn!("Could not load previous run totals: {e}");
        }

        ledger
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_created(&self, resource_type: &str) {
        self.records_created.fetch_add(1, Ordering::Relaxed);
        match resource_type {
            "Observation" => {
                self.observations.fetch_add(1, Ordering::Relaxed);
            }
            "QuestionnaireResponse" => {
                self.questionnaire_responses.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_updated(&self) {
        self.records_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_failure(&self) {
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_participant_completed(&self) {
        self.participants_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_participant_failed(&self) {
        self.participants_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counters of this run.
    pub fn stats(&self) -> RunStats {
        RunStats {
            run_id: self.run_id,
            host: self.host.clone(),
            participants_completed: self.participants_completed.load(Ordering::Relaxed),
            participants_failed: self.participants_failed.load(Ordering::Relaxed),
            records_created: self.records_created.load(Ordering::Relaxed),
            records_updated: self.records_updated.load(Ordering::Relaxed),
            observations: self.observations.load(Ordering::Relaxed),
            questionnaire_responses: self.questionnaire_responses.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            started: self.started,
            duration_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    /// Totals over every persisted run, this one included.
    pub fn totals(&self) -> PersistedTotals {
        let stats = self.stats();
        PersistedTotals {
            runs: self.previous.runs + 1,
            participants_completed: self.previous.participants_completed + stats.participants_completed,
            participants_failed: self.previous.participants_failed + stats.participants_failed,
            records_created: self.previous.records_created + stats.records_created,
            records_updated: self.previous.records_updated + stats.records_updated,
            upload_failures: self.previous.upload_failures + stats.upload_failures,
            last_run_id: Some(self.run_id),
            last_host: Some(self.host.clone()),
            last_updated: Some(Utc::now()),
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run {} on {}:\n\
             - Participants completed: {}\n\
             - Participants failed: {}\n\
             - Records created: {} ({} observations, {} questionnaire responses)\n\
             - Records updated: {}\n\
             - Upload failures: {}\n\
             - Duration: {} seconds",
            stats.run_id,
            stats.host,
            stats.participants_completed,
            stats.participants_failed,
            stats.records_created,
            stats.observations,
            stats.questionnaire_responses,
            stats.records_updated,
            stats.upload_failures,
            stats.duration_secs
        )
    }

    /// Write the cumulative totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&self.totals()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                self.previous = read_totals(path)?;
            }
        }
        Ok(())
    }

    /// Reset the counters of this run.
    pub fn reset(&self) {
        self.participants_completed.store(0, Ordering::Relaxed);
        self.participants_failed.store(0, Ordering::Relaxed);
        self.records_created.store(0, Ordering::Relaxed);
        self.records_updated.store(0, Ordering::Relaxed);
        self.observations.store(0, Ordering::Relaxed);
        self.questionnaire_responses.store(0, Ordering::Relaxed);
        self.upload_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one run's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub host: String,
    pub participants_completed: u64,
    pub participants_failed: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub observations: u64,
    pub questionnaire_responses: u64,
    pub upload_failures: u64,
    pub started: DateTime<Utc>,
    pub duration_secs: u64,
}

/// Totals format for persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedTotals {
    pub runs: u64,
    pub participants_completed: u64,
    pub participants_failed: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub upload_failures: u64,
    pub last_run_id: Option<Uuid>,
    pub last_host: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Read persisted totals, e.g. for a status report.
pub fn read_totals(path: &std::path::Path) -> Result<PersistedTotals, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared run ledger.
pub type SharedRunLedger = Arc<RunLedger>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_counting() {
        let ledger = RunLedger::new();
        ledger.record_created("Patient");
        ledger.record_created("Observation");
        ledger.record_created("QuestionnaireResponse");
        ledger.record_updated();
        ledger.record_participant_completed();

        let stats = ledger.stats();
        assert_eq!(stats.records_created, 3);
        assert_eq!(stats.observations, 1);
        assert_eq!(stats.questionnaire_responses, 1);
        assert_eq!(stats.records_updated, 1);
        assert_eq!(stats.participants_completed, 1);
    }

    #[test]
    fn test_ledger_reset() {
        let ledger = RunLedger::new();
        ledger.record_created("Observation");
        ledger.record_upload_failure();
        ledger.reset();

        let stats = ledger.stats();
        assert_eq!(stats.records_created, 0);
        assert_eq!(stats.upload_failures, 0);
    }

    #[test]
    fn test_totals_accumulate_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let first = RunLedger::with_persistence(path.clone());
        first.record_created("Observation");
        first.record_created("Observation");
        first.save().unwrap();

        let second = RunLedger::with_persistence(path.clone());
        second.record_created("Patient");
        second.record_participant_failed();
        second.save().unwrap();

        let totals = read_totals(&path).unwrap();
        assert_eq!(totals.runs, 2);
        assert_eq!(totals.records_created, 3);
        assert_eq!(totals.participants_failed, 1);
        assert_eq!(totals.last_run_id, Some(second.run_id()));
    }

    #[test]
    fn test_summary_format() {
        let summary = RunLedger::new().summary();
        assert!(summary.contains("Participants completed"));
        assert!(summary.contains("Records created"));
        assert!(summary.contains("Upload failures"));
    }
}
