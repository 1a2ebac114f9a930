//! Empatica E4 session exports.
//!
//! An export is a set of CSV files, one per modality, shipped either as a zip
//! bundle or as a plain directory. Fixed-rate files start with a row of start
//! timestamps (epoch seconds) followed by a row of sample rates. `IBI.csv`
//! holds `(offset, interval)` pairs relative to its start timestamp and
//! `tags.csv` is a bare list of event timestamps.

use super::types::{epoch_seconds, ModalitySet, Sample, SampleRate, SignalSeries};
use crate::error::{IngestError, Result};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Modality name of the inter-beat interval file.
pub const IBI: &str = "IBI";
/// Modality name of the event tag file.
pub const TAGS: &str = "tags";

/// Read every `*.csv` in a zip bundle.
pub fn read_zip(path: &Path) -> Result<ModalitySet> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut modalities = ModalitySet::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = csv_stem(entry.name()) else {
            continue;
        };
        let mut content = String::new();
        if let Err(e) = entry.read_to_string(&mut content) {
            tracing::warn!(bundle = %path.display(), modality = %name, "unreadable entry: {e}");
            modalities.insert(name.clone(), SignalSeries::empty(name));
            continue;
        }
        let series = parse_modality(&name, &content);
        modalities.insert(name, series);
    }

    Ok(modalities)
}

/// Read every `*.csv` in a directory of exported files.
pub fn read_dir(dir: &Path) -> Result<ModalitySet> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut modalities = ModalitySet::new();
    for path in paths {
        let Some(name) = path.to_str().and_then(csv_stem) else {
            continue;
        };
        let series = match std::fs::read_to_string(&path) {
            Ok(content) => parse_modality(&name, &content),
            Err(e) => {
                tracing::warn!(path = %path.display(), "unreadable modality file: {e}");
                SignalSeries::empty(name.clone())
            }
        };
        modalities.insert(name, series);
    }
    Ok(modalities)
}

/// Parse one modality file. Malformed or empty input yields an empty series.
pub fn parse_modality(name: &str, content: &str) -> SignalSeries {
    let parsed = match name {
        IBI => parse_ibi(content),
        TAGS => parse_tags(content),
        _ => parse_fixed_rate(name, content),
    };
    match parsed {
        Ok(series) => series,
        Err(e) => {
            tracing::warn!(modality = name, "skipping modality: {e}");
            SignalSeries::empty(name)
        }
    }
}

fn csv_stem(entry: &str) -> Option<String> {
    let file_name = entry.rsplit(|c: char| c == '/' || c == '\\').next()?;
    let stem = file_name.strip_suffix(".csv")?;
    if stem.is_empty() || file_name.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}

fn read_rows(content: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn number(field: &str, what: &str) -> Result<f64> {
    field
        .parse::<f64>()
        .map_err(|_| IngestError::parse(what, format!("'{field}' is not a number")))
}

fn timestamp(field: &str, what: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    let secs = number(field, what)?;
    epoch_seconds(secs).ok_or_else(|| IngestError::parse(what, format!("bad timestamp {secs}")))
}

fn parse_fixed_rate(name: &str, content: &str) -> Result<SignalSeries> {
    let rows = read_rows(content)?;
    if rows.len() < 2 {
        return Err(IngestError::parse(name, "missing start or rate row"));
    }
    let start = timestamp(&rows[0][0], name)?;
    let hz = number(&rows[1][0], name)?;

    let values = rows[2..]
        .iter()
        .map(|row| row.iter().map(|f| number(f, name)).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;

    SignalSeries::from_rate(name, start, hz, values)
}

fn parse_ibi(content: &str) -> Result<SignalSeries> {
    let mut rows = read_rows(content)?;

    // A known export fault repeats the header block inside the file; keep
    // only what follows the last repeated header.
    if let Some(pos) = rows
        .iter()
        .skip(1)
        .rposition(|row| row.get(1).map(|c| c == IBI).unwrap_or(false))
    {
        tracing::warn!(rows_dropped = pos + 1, "IBI file contains a repeated header block");
        rows.drain(..=pos);
    }

    let Some(header) = rows.first() else {
        return Err(IngestError::parse(IBI, "empty file"));
    };
    let start = timestamp(&header[0], IBI)?;

    let mut seen = HashSet::new();
    let mut samples = Vec::with_capacity(rows.len().saturating_sub(1));
    for row in &rows[1..] {
        if row.len() < 2 {
            return Err(IngestError::parse(IBI, "expected offset and interval"));
        }
        let offset = number(&row[0], IBI)?;
        let interval = number(&row[1], IBI)?;
        if !offset.is_finite() {
            return Err(IngestError::parse(IBI, format!("bad offset {offset}")));
        }
        let ts = start + chrono::Duration::nanoseconds((offset * 1e9).round() as i64);
        // Duplicate timestamps keep the first interval.
        if seen.insert(ts) {
            samples.push(Sample {
                timestamp: ts,
                values: vec![interval],
            });
        }
    }

    SignalSeries::new(IBI, SampleRate::Irregular, samples)
}

fn parse_tags(content: &str) -> Result<SignalSeries> {
    let rows = read_rows(content)?;
    let samples = rows
        .iter()
        .filter(|row| !row.is_empty() && !row[0].is_empty())
        .map(|row| {
            timestamp(&row[0], TAGS).map(|ts| Sample {
                timestamp: ts,
                values: Vec::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    SignalSeries::new(TAGS, SampleRate::Irregular, samples)
}
