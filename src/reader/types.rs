//! Time-indexed signal types shared by every reader.

use crate::error::{IngestError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::ops::Range;

/// All modalities read for one participant session, keyed by modality name.
pub type ModalitySet = BTreeMap<String, SignalSeries>;

/// How samples of a series are spaced in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleRate {
    /// Fixed sampling frequency in Hz.
    Fixed(f64),
    /// Explicit per-sample timestamps (inter-beat intervals, event tags, derived rows).
    Irregular,
}

impl SampleRate {
    pub fn hz(&self) -> Option<f64> {
        match self {
            SampleRate::Fixed(hz) => Some(*hz),
            SampleRate::Irregular => None,
        }
    }
}

/// A single timestamped sample with one value per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub values: Vec<f64>,
}

/// One modality's ordered samples.
///
/// Timestamps are strictly increasing. Series are never edited in place:
/// slicing returns a new series.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSeries {
    modality: String,
    rate: SampleRate,
    samples: Vec<Sample>,
}

impl SignalSeries {
    /// Build a series, rejecting timestamps that are not strictly increasing.
    pub fn new(modality: impl Into<String>, rate: SampleRate, samples: Vec<Sample>) -> Result<Self> {
        let modality = modality.into();
        if let Some(pos) = samples
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(IngestError::InvalidSeries {
                modality,
                message: format!("timestamp at sample {} does not increase", pos + 1),
            });
        }
        Ok(Self {
            modality,
            rate,
            samples,
        })
    }

    /// Build a fixed-rate series from value rows, placing row `i` at `start + i / hz`.
    pub fn from_rate(
        modality: impl Into<String>,
        start: DateTime<Utc>,
        hz: f64,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let modality = modality.into();
        if !(hz.is_finite() && hz > 0.0) {
            return Err(IngestError::InvalidSeries {
                modality,
                message: format!("sample rate {hz} is not positive"),
            });
        }
        let step_nanos = 1e9 / hz;
        let samples = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| Sample {
                timestamp: start + Duration::nanoseconds((i as f64 * step_nanos).round() as i64),
                values,
            })
            .collect();
        Self::new(modality, SampleRate::Fixed(hz), samples)
    }

    /// An empty series, used when a modality file is missing or unreadable.
    pub fn empty(modality: impl Into<String>) -> Self {
        Self {
            modality: modality.into(),
            rate: SampleRate::Irregular,
            samples: Vec::new(),
        }
    }

    pub fn modality(&self) -> &str {
        &self.modality
    }

    pub fn rate(&self) -> SampleRate {
        self.rate
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of channels per sample (0 for event series).
    pub fn channels(&self) -> usize {
        self.samples.first().map(|s| s.values.len()).unwrap_or(0)
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.first().map(|s| s.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Copy out a sub-range of samples. The range is clamped to the series length.
    pub fn slice(&self, range: Range<usize>) -> SignalSeries {
        let end = range.end.min(self.samples.len());
        let start = range.start.min(end);
        SignalSeries {
            modality: self.modality.clone(),
            rate: self.rate,
            samples: self.samples[start..end].to_vec(),
        }
    }

    /// Copy out the samples at the given positions, which must be ascending.
    pub fn select(&self, positions: &[usize]) -> SignalSeries {
        SignalSeries {
            modality: self.modality.clone(),
            rate: self.rate,
            samples: positions
                .iter()
                .filter_map(|&i| self.samples.get(i).cloned())
                .collect(),
        }
    }

    /// First channel of every sample.
    pub fn first_channel(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.samples
            .iter()
            .filter_map(|s| s.values.first().map(|v| (s.timestamp, *v)))
    }

    /// Same samples under another modality name.
    pub fn renamed(mut self, modality: impl Into<String>) -> Self {
        self.modality = modality.into();
        self
    }
}

/// Convert fractional epoch seconds to a UTC timestamp.
pub fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let samples = vec![
            Sample {
                timestamp: at(10),
                values: vec![1.0],
            },
            Sample {
                timestamp: at(10),
                values: vec![2.0],
            },
        ];
        let err = SignalSeries::new("EDA", SampleRate::Irregular, samples).unwrap_err();
        assert!(matches!(err, IngestError::InvalidSeries { .. }));
    }

    #[test]
    fn test_from_rate_spacing() {
        let rows = vec![vec![0.0]; 8];
        let series = SignalSeries::from_rate("EDA", at(0), 4.0, rows).unwrap();
        assert_eq!(series.len(), 8);
        assert_eq!(series.rate(), SampleRate::Fixed(4.0));
        assert_eq!(series.samples()[4].timestamp, at(1));
        assert_eq!(series.last_timestamp().unwrap() - at(0), Duration::milliseconds(1750));
    }

    #[test]
    fn test_slice_is_clamped_and_copies() {
        let rows = (0..5).map(|i| vec![i as f64]).collect();
        let series = SignalSeries::from_rate("TEMP", at(0), 1.0, rows).unwrap();
        let tail = series.slice(3..99);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.samples()[0].values, vec![3.0]);
        assert_eq!(series.len(), 5);
        assert!(series.slice(7..9).is_empty());
    }

    #[test]
    fn test_epoch_seconds_fraction() {
        let ts = epoch_seconds(1.25).unwrap();
        assert_eq!(ts.timestamp(), 1);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!(epoch_seconds(f64::NAN).is_none());
    }
}
