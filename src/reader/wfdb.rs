//! WFDB multi-channel waveform records.
//!
//! A record is a text header (`<name>.hea`) describing the channels plus one
//! or more binary signal files holding interleaved samples. A `RECORDS` file
//! in the database root lists the record names, one per line.

use super::types::{ModalitySet, SignalSeries};
use crate::error::{IngestError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

/// Gain used when a header leaves it unspecified or zero.
pub const DEFAULT_GAIN: f64 = 200.0;

/// Parsed `.hea` header.
#[derive(Debug, Clone, PartialEq)]
pub struct WfdbHeader {
    pub record: String,
    pub frequency: f64,
    pub samples_per_signal: Option<usize>,
    pub base_time: Option<DateTime<Utc>>,
    pub signals: Vec<SignalSpec>,
}

/// One signal line of a header.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub file: String,
    pub format: u16,
    pub gain: f64,
    pub baseline: i64,
    pub units: String,
    pub description: String,
}

/// Read the record names listed in `RECORDS`.
pub fn read_records_index(dir: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(dir.join("RECORDS"))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Parse the text of a `.hea` header.
pub fn parse_header(content: &str) -> Result<WfdbHeader> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let record_line = lines
        .next()
        .ok_or_else(|| IngestError::parse("header", "missing record line"))?;
    let fields: Vec<&str> = record_line.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(IngestError::parse("header", "record line needs a name and signal count"));
    }

    let record = fields[0].split('/').next().unwrap_or(fields[0]).to_string();
    let n_signals: usize = fields[1]
        .parse()
        .map_err(|_| IngestError::parse(&record, format!("bad signal count '{}'", fields[1])))?;
    // "fs/counter(base)" keeps only the sampling frequency
    let frequency = match fields.get(2) {
        Some(f) => leading_number(f)
            .ok_or_else(|| IngestError::parse(&record, format!("bad frequency '{f}'")))?,
        None => 250.0,
    };
    let samples_per_signal = fields.get(3).and_then(|f| f.parse().ok());
    let base_time = match (fields.get(4), fields.get(5)) {
        (Some(time), Some(date)) => {
            NaiveDateTime::parse_from_str(&format!("{time} {date}"), "%H:%M:%S%.f %d/%m/%Y")
                .ok()
                .map(|naive| naive.and_utc())
        }
        _ => None,
    };

    let signals = lines
        .take(n_signals)
        .map(|line| parse_signal_line(&record, line))
        .collect::<Result<Vec<_>>>()?;
    if signals.len() != n_signals {
        return Err(IngestError::parse(
            &record,
            format!("expected {n_signals} signal lines, found {}", signals.len()),
        ));
    }

    Ok(WfdbHeader {
        record,
        frequency,
        samples_per_signal,
        base_time,
        signals,
    })
}

fn leading_number(field: &str) -> Option<f64> {
    let end = field
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(field.len());
    field[..end].parse().ok()
}

fn parse_signal_line(record: &str, line: &str) -> Result<SignalSpec> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(IngestError::parse(record, format!("bad signal line '{line}'")));
    }

    let format_digits: String = fields[1].chars().take_while(|c| c.is_ascii_digit()).collect();
    let format: u16 = format_digits
        .parse()
        .map_err(|_| IngestError::parse(record, format!("bad format '{}'", fields[1])))?;

    // gain(baseline)/units, every part optional
    let (gain_part, units) = match fields.get(2) {
        Some(spec) => match spec.split_once('/') {
            Some((g, u)) => (g, u.to_string()),
            None => (*spec, String::new()),
        },
        None => ("", String::new()),
    };
    let (gain_text, baseline_text) = match gain_part.split_once('(') {
        Some((g, b)) => (g, Some(b.trim_end_matches(')'))),
        None => (gain_part, None),
    };
    let gain = gain_text
        .parse::<f64>()
        .ok()
        .filter(|g| *g != 0.0)
        .unwrap_or(DEFAULT_GAIN);
    let adc_zero: i64 = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);
    let baseline = baseline_text
        .and_then(|b| b.parse().ok())
        .unwrap_or(adc_zero);
    let description = if fields.len() > 8 {
        fields[8..].join(" ")
    } else {
        format!("signal {}", fields[0])
    };

    Ok(SignalSpec {
        file: fields[0].to_string(),
        format,
        gain,
        baseline,
        units,
        description,
    })
}

/// Decode a sample stream of the given storage format.
pub fn decode_samples(format: u16, bytes: &[u8]) -> Result<Vec<i64>> {
    match format {
        16 => Ok(bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as i64)
            .collect()),
        80 => Ok(bytes.iter().map(|b| *b as i64 - 128).collect()),
        212 => {
            let mut out = Vec::with_capacity(bytes.len() * 2 / 3);
            for triple in bytes.chunks_exact(3) {
                let first = triple[0] as i64 | ((triple[1] as i64 & 0x0f) << 8);
                let second = triple[2] as i64 | ((triple[1] as i64 & 0xf0) << 4);
                out.push(sign_extend_12(first));
                out.push(sign_extend_12(second));
            }
            Ok(out)
        }
        other => Err(IngestError::parse(
            "signal file",
            format!("unsupported storage format {other}"),
        )),
    }
}

fn sign_extend_12(value: i64) -> i64 {
    if value & 0x800 != 0 {
        value - 0x1000
    } else {
        value
    }
}

/// Read one record into one series per channel, named by channel description.
pub fn read_record(dir: &Path, record: &str) -> Result<ModalitySet> {
    let header = parse_header(&std::fs::read_to_string(dir.join(format!("{record}.hea")))?)?;
    let start = header.base_time.unwrap_or(DateTime::UNIX_EPOCH);

    let mut rows: Vec<Vec<f64>> = vec![Vec::new(); header.signals.len()];

    // Signals sharing a file are interleaved frame by frame in header order.
    let mut files: Vec<&str> = Vec::new();
    for spec in &header.signals {
        if !files.contains(&spec.file.as_str()) {
            files.push(&spec.file);
        }
    }
    for file in files {
        let members: Vec<usize> = header
            .signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.file == file)
            .map(|(i, _)| i)
            .collect();
        let format = header.signals[members[0]].format;
        let stream = decode_samples(format, &std::fs::read(dir.join(file))?)?;
        for frame in stream.chunks_exact(members.len()) {
            for (slot, adc) in members.iter().zip(frame) {
                let spec = &header.signals[*slot];
                rows[*slot].push((adc - spec.baseline) as f64 / spec.gain);
            }
        }
    }

    let mut modalities = ModalitySet::new();
    for (spec, mut values) in header.signals.iter().zip(rows) {
        if let Some(n) = header.samples_per_signal {
            values.truncate(n);
        }
        let series = SignalSeries::from_rate(
            spec.description.clone(),
            start,
            header.frequency,
            values.into_iter().map(|v| vec![v]).collect(),
        )?;
        modalities.insert(spec.description.clone(), series);
    }
    Ok(modalities)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "drive01 3 15.5 4\n\
        drive01.dat 16 1000(0)/mV 16 0 -12 0 0 ECG\n\
        drive01.dat 16 0/mV 16 0 0 0 0 foot GSR\n\
        drive01.dat 16 1(5)/mV 16 0 0 0 0 marker\n";

    #[test]
    fn test_parse_header() {
        let header = parse_header(HEADER).unwrap();
        assert_eq!(header.record, "drive01");
        assert_eq!(header.frequency, 15.5);
        assert_eq!(header.samples_per_signal, Some(4));
        assert_eq!(header.signals.len(), 3);
        assert_eq!(header.signals[0].gain, 1000.0);
        assert_eq!(header.signals[1].gain, DEFAULT_GAIN);
        assert_eq!(header.signals[1].description, "foot GSR");
        assert_eq!(header.signals[2].baseline, 5);
        assert_eq!(header.signals[2].units, "mV");
    }

    #[test]
    fn test_signal_line_gain_spec_variants() {
        let full = parse_signal_line("r", "r.dat 212 200(-3)/uS 12 7 0 0 0 hand GSR").unwrap();
        assert_eq!(full.format, 212);
        assert_eq!(full.gain, 200.0);
        assert_eq!(full.baseline, -3);
        assert_eq!(full.units, "uS");
        assert_eq!(full.description, "hand GSR");

        // no units: baseline falls back to the adc zero
        let bare = parse_signal_line("r", "r.dat 16 50 16 9").unwrap();
        assert_eq!(bare.gain, 50.0);
        assert_eq!(bare.baseline, 9);
        assert_eq!(bare.units, "");
        assert_eq!(bare.description, "signal r.dat");

        let missing = parse_signal_line("r", "r.dat 16").unwrap();
        assert_eq!(missing.gain, DEFAULT_GAIN);
        assert_eq!(missing.units, "");
    }

    #[test]
    fn test_decode_212_pairs() {
        // 0x123 and 0x800 (-2048) packed into three bytes
        let bytes = [0x23, 0x81, 0x00];
        assert_eq!(decode_samples(212, &bytes).unwrap(), vec![0x123, -2048]);
        assert_eq!(decode_samples(80, &[128, 130]).unwrap(), vec![0, 2]);
        assert!(decode_samples(311, &[]).is_err());
    }

    #[test]
    fn test_read_record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("RECORDS"), "drive01\n\n").unwrap();
        std::fs::write(dir.path().join("drive01.hea"), HEADER).unwrap();
        let frames: [[i16; 3]; 4] = [[1000, 200, 5], [2000, 400, 5], [-1000, 600, 6], [0, 800, 6]];
        let bytes: Vec<u8> = frames
            .iter()
            .flat_map(|f| f.iter().flat_map(|v| v.to_le_bytes()))
            .collect();
        std::fs::write(dir.path().join("drive01.dat"), bytes).unwrap();

        assert_eq!(read_records_index(dir.path()).unwrap(), vec!["drive01"]);
        let record = read_record(dir.path(), "drive01").unwrap();
        let ecg: Vec<f64> = record["ECG"].first_channel().map(|(_, v)| v).collect();
        assert_eq!(ecg, vec![1.0, 2.0, -1.0, 0.0]);
        let gsr: Vec<f64> = record["foot GSR"].first_channel().map(|(_, v)| v).collect();
        assert_eq!(gsr, vec![1.0, 2.0, 3.0, 4.0]);
        let marker: Vec<f64> = record["marker"].first_channel().map(|(_, v)| v).collect();
        assert_eq!(marker, vec![0.0, 0.0, 1.0, 1.0]);
    }
}
