//! Pre-merged per-participant archives.
//!
//! One JSON document per participant combines a wrist device, a chest device
//! and a dense label column:
//!
//! ```text
//! { "signal": { "wrist": { "ACC": [[x, y, z], ...], "EDA": [v, ...], ... },
//!               "chest": { "ECG": [v, ...], ... } },
//!   "label": [0, 0, 1, ...] }
//! ```
//!
//! Modalities carry no timestamps; each device's rate table gives them one.

use super::types::{ModalitySet, SignalSeries};
use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Wrist sensor rates in Hz.
pub const WRIST_RATES: &[(&str, f64)] = &[("ACC", 32.0), ("BVP", 64.0), ("EDA", 4.0), ("TEMP", 4.0)];
/// Every chest channel is sampled at this rate.
pub const CHEST_RATE: f64 = 700.0;
/// Rate of the dense label column.
pub const LABEL_RATE: f64 = 700.0;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRow {
    Scalar(f64),
    Channels(Vec<f64>),
}

impl RawRow {
    fn into_values(self) -> Vec<f64> {
        match self {
            RawRow::Scalar(v) => vec![v],
            RawRow::Channels(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSignals {
    #[serde(default)]
    wrist: BTreeMap<String, Vec<RawRow>>,
    #[serde(default)]
    chest: BTreeMap<String, Vec<RawRow>>,
}

#[derive(Debug, Deserialize)]
struct RawArchive {
    signal: RawSignals,
    label: Vec<i64>,
}

/// Decoded archive for one participant.
#[derive(Debug, Clone)]
pub struct ParticipantArchive {
    pub wrist: ModalitySet,
    pub chest: ModalitySet,
    pub labels: Vec<i64>,
    pub label_rate: f64,
}

pub fn wrist_rate(modality: &str) -> Option<f64> {
    WRIST_RATES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(modality))
        .map(|(_, hz)| *hz)
}

/// Read an archive from disk. All devices share `start` as their time origin.
pub fn read_archive(path: &Path, start: DateTime<Utc>) -> Result<ParticipantArchive> {
    let content = std::fs::read_to_string(path)?;
    parse_archive(&content, start).map_err(|e| match e {
        IngestError::Json(inner) => IngestError::parse(path.display(), inner.to_string()),
        other => other,
    })
}

pub fn parse_archive(content: &str, start: DateTime<Utc>) -> Result<ParticipantArchive> {
    let raw: RawArchive = serde_json::from_str(content)?;

    let mut wrist = ModalitySet::new();
    for (name, rows) in raw.signal.wrist {
        let Some(hz) = wrist_rate(&name) else {
            tracing::warn!(modality = %name, "no known rate for wrist modality, skipping");
            continue;
        };
        wrist.insert(name.clone(), to_series(&name, start, hz, rows));
    }

    let mut chest = ModalitySet::new();
    for (name, rows) in raw.signal.chest {
        chest.insert(name.clone(), to_series(&name, start, CHEST_RATE, rows));
    }

    Ok(ParticipantArchive {
        wrist,
        chest,
        labels: raw.label,
        label_rate: LABEL_RATE,
    })
}

fn to_series(name: &str, start: DateTime<Utc>, hz: f64, rows: Vec<RawRow>) -> SignalSeries {
    let values = rows.into_iter().map(RawRow::into_values).collect();
    match SignalSeries::from_rate(name, start, hz, values) {
        Ok(series) => series,
        Err(e) => {
            tracing::warn!(modality = name, "skipping modality: {e}");
            SignalSeries::empty(name)
        }
    }
}
