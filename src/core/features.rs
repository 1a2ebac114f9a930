//! Rolling-window feature derivation.
//!
//! Features are computed over the complete-case join of the feature
//! modalities: a row exists only where every modality has a sample at the
//! same timestamp. Each statistic is evaluated over a trailing window and
//! rows lost to window warm-up are dropped. Mean columns are then expanded
//! into lagged copies.

use crate::core::peaks::{summarize, PeakSummary};
use crate::reader::ModalitySet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet};

/// A per-window aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Statistic {
    Mean,
    Min,
    Max,
    Std,
    Kurtosis,
    Skew,
    PeakCount,
    PeakAmplitude,
    PeakDuration,
    Rms,
}

impl Statistic {
    pub fn label(&self) -> &'static str {
        match self {
            Statistic::Mean => "Mean",
            Statistic::Min => "Min",
            Statistic::Max => "Max",
            Statistic::Std => "Std",
            Statistic::Kurtosis => "Kurtosis",
            Statistic::Skew => "Skew",
            Statistic::PeakCount => "Num_Peaks",
            Statistic::PeakAmplitude => "Amplitude",
            Statistic::PeakDuration => "Duration",
            Statistic::Rms => "RMS",
        }
    }

    fn uses_peaks(&self) -> bool {
        matches!(
            self,
            Statistic::PeakCount | Statistic::PeakAmplitude | Statistic::PeakDuration
        )
    }
}

/// Modalities that take part in derivation and the statistics computed for each.
pub const FEATURE_MODALITIES: &[(&str, &[Statistic])] = &[
    (
        "EDA",
        &[
            Statistic::Mean,
            Statistic::Min,
            Statistic::Max,
            Statistic::Std,
            Statistic::Kurtosis,
            Statistic::Skew,
            Statistic::PeakCount,
            Statistic::PeakAmplitude,
            Statistic::PeakDuration,
        ],
    ),
    (
        "HR",
        &[
            Statistic::Mean,
            Statistic::Min,
            Statistic::Max,
            Statistic::Std,
            Statistic::Rms,
        ],
    ),
    (
        "TEMP",
        &[Statistic::Mean, Statistic::Min, Statistic::Max, Statistic::Std],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKind {
    Stat(Statistic),
    /// Mean column shifted down by this many rows.
    ShiftedMean(usize),
}

/// Column key of a [`DerivedFeatureSet`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureColumn {
    pub modality: String,
    pub kind: FeatureKind,
}

impl FeatureColumn {
    pub fn new(modality: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            modality: modality.into(),
            kind,
        }
    }

    /// Column name, e.g. `EDA_Num_Peaks` or `HR_shifted_mean_02`.
    ///
    /// Lag columns are numbered from zero, so lag 1 is `shifted_mean_00`.
    pub fn tag(&self) -> String {
        match self.kind {
            FeatureKind::Stat(stat) => format!("{}_{}", self.modality, stat.label()),
            FeatureKind::ShiftedMean(lag) => {
                format!("{}_shifted_mean_{:02}", self.modality, lag.saturating_sub(1))
            }
        }
    }
}

/// Parameters for derivation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureConfig {
    /// Rolling window length in rows.
    pub window: usize,
    /// Number of lagged mean copies.
    pub lags: usize,
    /// Minimum peak width in samples.
    pub min_peak_width: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window: 40,
            lags: 10,
            min_peak_width: 5.0,
        }
    }
}

/// Feature table for one chunk. Every column has one entry per timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFeatureSet {
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<FeatureColumn, Vec<Option<f64>>>,
}

impl DerivedFeatureSet {
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn columns(&self) -> &BTreeMap<FeatureColumn, Vec<Option<f64>>> {
        &self.columns
    }

    pub fn column(&self, column: &FeatureColumn) -> Option<&[Option<f64>]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Computes [`DerivedFeatureSet`]s from aligned chunk slices.
#[derive(Debug, Clone, Default)]
pub struct FeatureDeriver {
    config: FeatureConfig,
}

impl FeatureDeriver {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Derive features from one chunk's slices.
    ///
    /// Returns an empty set when a feature modality is absent or the
    /// complete-case rows do not fill a single window.
    pub fn derive(&self, slices: &ModalitySet) -> DerivedFeatureSet {
        let window = self.config.window.max(1);
        let Some((timestamps, rows)) = complete_cases(slices) else {
            return DerivedFeatureSet::default();
        };
        if timestamps.len() < window {
            return DerivedFeatureSet::default();
        }

        let mut columns = BTreeMap::new();
        for (position, (modality, statistics)) in FEATURE_MODALITIES.iter().enumerate() {
            let values: Vec<f64> = rows.iter().map(|row| row[position]).collect();
            let mut stat_columns: BTreeMap<Statistic, Vec<Option<f64>>> = BTreeMap::new();

            for end in window..=values.len() {
                let frame = &values[end - window..end];
                // one detection pass feeds all three peak statistics
                let peaks = statistics
                    .iter()
                    .any(Statistic::uses_peaks)
                    .then(|| summarize(frame, self.config.min_peak_width));
                for stat in statistics.iter() {
                    stat_columns
                        .entry(*stat)
                        .or_default()
                        .push(evaluate(*stat, frame, peaks.as_ref()));
                }
            }

            if let Some(mean) = stat_columns.get(&Statistic::Mean) {
                for lag in 1..=self.config.lags {
                    let shifted = (0..mean.len())
                        .map(|row| row.checked_sub(lag).and_then(|src| mean[src]))
                        .collect();
                    columns.insert(
                        FeatureColumn::new(*modality, FeatureKind::ShiftedMean(lag)),
                        shifted,
                    );
                }
            }
            for (stat, column) in stat_columns {
                columns.insert(FeatureColumn::new(*modality, FeatureKind::Stat(stat)), column);
            }
        }

        DerivedFeatureSet {
            timestamps: timestamps[window - 1..].to_vec(),
            columns,
        }
    }
}

/// Join the feature modalities on exact timestamps, dropping incomplete rows.
fn complete_cases(slices: &ModalitySet) -> Option<(Vec<DateTime<Utc>>, Vec<Vec<f64>>)> {
    let mut lookups = Vec::with_capacity(FEATURE_MODALITIES.len());
    for (modality, _) in FEATURE_MODALITIES {
        let series = slices.get(*modality)?;
        let lookup: BTreeMap<DateTime<Utc>, f64> = series
            .first_channel()
            .filter(|(_, v)| v.is_finite())
            .collect();
        lookups.push(lookup);
    }

    let mut timestamps: BTreeSet<DateTime<Utc>> = lookups.first()?.keys().copied().collect();
    for lookup in &lookups[1..] {
        timestamps.retain(|ts| lookup.contains_key(ts));
    }

    let rows = timestamps
        .iter()
        .map(|ts| lookups.iter().map(|lookup| lookup[ts]).collect())
        .collect();
    Some((timestamps.into_iter().collect(), rows))
}

fn evaluate(stat: Statistic, frame: &[f64], peaks: Option<&PeakSummary>) -> Option<f64> {
    let value = match stat {
        Statistic::Mean => frame.iter().mean(),
        Statistic::Min => frame.iter().copied().fold(f64::INFINITY, f64::min),
        Statistic::Max => frame.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Std => frame.iter().std_dev(),
        Statistic::Rms => frame.iter().quadratic_mean(),
        Statistic::Skew => {
            let (m2, m3, _) = central_moments(frame);
            if m2 == 0.0 {
                return None;
            }
            m3 / m2.powf(1.5)
        }
        Statistic::Kurtosis => {
            let (m2, _, m4) = central_moments(frame);
            if m2 == 0.0 {
                return None;
            }
            m4 / (m2 * m2) - 3.0
        }
        Statistic::PeakCount => peaks?.count as f64,
        Statistic::PeakAmplitude => peaks?.amplitude,
        Statistic::PeakDuration => peaks?.duration,
    };
    value.is_finite().then_some(value)
}

/// Biased second, third and fourth central moments.
fn central_moments(frame: &[f64]) -> (f64, f64, f64) {
    let n = frame.len() as f64;
    let mean = frame.iter().sum::<f64>() / n;
    let (m2, m3, m4) = frame.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), x| {
        let d = x - mean;
        (m2 + d * d, m3 + d * d * d, m4 + d * d * d * d)
    });
    (m2 / n, m3 / n, m4 / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SignalSeries;
    use chrono::Duration;

    fn series(name: &str, values: &[f64]) -> SignalSeries {
        SignalSeries::from_rate(
            name,
            DateTime::UNIX_EPOCH,
            1.0,
            values.iter().map(|v| vec![*v]).collect(),
        )
        .unwrap()
    }

    fn slices(eda: &[f64], hr: &[f64], temp: &[f64]) -> ModalitySet {
        let mut set = ModalitySet::new();
        set.insert("EDA".into(), series("EDA", eda));
        set.insert("HR".into(), series("HR", hr));
        set.insert("TEMP".into(), series("TEMP", temp));
        set
    }

    fn deriver(window: usize, lags: usize) -> FeatureDeriver {
        FeatureDeriver::new(FeatureConfig {
            window,
            lags,
            min_peak_width: 5.0,
        })
    }

    fn stat(modality: &str, stat: Statistic) -> FeatureColumn {
        FeatureColumn::new(modality, FeatureKind::Stat(stat))
    }

    #[test]
    fn test_row_count_after_warm_up() {
        let values: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let set = deriver(40, 10).derive(&slices(&values, &values, &values));
        assert_eq!(set.len(), 11);
        assert_eq!(set.timestamps()[0], DateTime::UNIX_EPOCH + Duration::seconds(39));
        for column in set.columns().values() {
            assert_eq!(column.len(), 11);
        }
        // 9 EDA + 5 HR + 4 TEMP statistics and 10 lags for each mean
        assert_eq!(set.columns().len(), 18 + 30);
    }

    #[test]
    fn test_short_chunk_is_empty() {
        let values = [1.0; 39];
        assert!(deriver(40, 10).derive(&slices(&values, &values, &values)).is_empty());
    }

    #[test]
    fn test_missing_modality_is_empty() {
        let values = [1.0; 50];
        let mut set = slices(&values, &values, &values);
        set.remove("TEMP");
        assert!(deriver(40, 10).derive(&set).is_empty());
    }

    #[test]
    fn test_complete_case_filter_drops_rows() {
        let eda = [1.0, 2.0, 3.0, 4.0, 5.0];
        let hr = [1.0, f64::NAN, 3.0, 4.0, 5.0];
        let temp = [1.0, 2.0, 3.0, 4.0, 5.0];
        let set = deriver(2, 0).derive(&slices(&eda, &hr, &temp));
        // rows 0, 2, 3, 4 survive; windows end at 2, 3, 4
        assert_eq!(set.len(), 3);
        let means = set.column(&stat("EDA", Statistic::Mean)).unwrap();
        assert_eq!(means, &[Some(2.0), Some(3.5), Some(4.5)]);
    }

    #[test]
    fn test_window_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let set = deriver(8, 0).derive(&slices(&values, &values, &values));
        assert_eq!(set.len(), 1);
        let get = |s| set.column(&stat("HR", s)).unwrap()[0].unwrap();
        assert_eq!(get(Statistic::Mean), 5.0);
        assert_eq!(get(Statistic::Min), 2.0);
        assert_eq!(get(Statistic::Max), 9.0);
        // sample standard deviation, n - 1 denominator
        assert!((get(Statistic::Std) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!((get(Statistic::Rms) - (232.0f64 / 8.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_window_has_no_shape_moments() {
        let values = [3.0; 6];
        let set = deriver(6, 0).derive(&slices(&values, &values, &values));
        assert_eq!(set.column(&stat("EDA", Statistic::Skew)).unwrap(), &[None]);
        assert_eq!(set.column(&stat("EDA", Statistic::Kurtosis)).unwrap(), &[None]);
    }

    #[test]
    fn test_skew_and_kurtosis_are_biased() {
        let eda = [0.0, 0.0, 0.0, 4.0];
        let set = deriver(4, 0).derive(&slices(&eda, &eda, &eda));
        let skew = set.column(&stat("EDA", Statistic::Skew)).unwrap()[0].unwrap();
        let kurtosis = set.column(&stat("EDA", Statistic::Kurtosis)).unwrap()[0].unwrap();
        // m2 = 3, m3 = 6, m4 = 21
        assert!((skew - 6.0 / 3.0f64.powf(1.5)).abs() < 1e-12);
        assert!((kurtosis - (21.0 / 9.0 - 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_peak_statistics_share_one_pass() {
        let mut eda: Vec<f64> = (0..=5).chain((0..5).rev()).map(|v| v as f64).collect();
        let second = eda.clone();
        eda.extend(second.into_iter().skip(1));
        eda.extend([0.0, 3.0, 0.0, 0.0]);
        let flat = vec![1.0; eda.len()];

        let window = eda.len();
        let set = deriver(window, 0).derive(&slices(&eda, &flat, &flat));
        let expected = summarize(&eda, 5.0);
        let get = |s| set.column(&stat("EDA", s)).unwrap()[0].unwrap();
        assert_eq!(get(Statistic::PeakCount), expected.count as f64);
        assert_eq!(get(Statistic::PeakCount), 2.0);
        assert!((get(Statistic::PeakAmplitude) - 10.0).abs() < 1e-12);
        assert!((get(Statistic::PeakDuration) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_lagged_means() {
        let values: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let set = deriver(2, 2).derive(&slices(&values, &values, &values));
        let means = set.column(&stat("TEMP", Statistic::Mean)).unwrap();
        assert_eq!(means, &[Some(0.5), Some(1.5), Some(2.5), Some(3.5), Some(4.5)]);
        let lag2 = set
            .column(&FeatureColumn::new("TEMP", FeatureKind::ShiftedMean(2)))
            .unwrap();
        assert_eq!(lag2, &[None, None, Some(0.5), Some(1.5), Some(2.5)]);
    }

    #[test]
    fn test_column_tags() {
        assert_eq!(stat("EDA", Statistic::PeakCount).tag(), "EDA_Num_Peaks");
        assert_eq!(stat("HR", Statistic::Rms).tag(), "HR_RMS");
        assert_eq!(
            FeatureColumn::new("HR", FeatureKind::ShiftedMean(3)).tag(),
            "HR_shifted_mean_02"
        );
        let tags: Vec<String> = (1..=10)
            .map(|lag| FeatureColumn::new("EDA", FeatureKind::ShiftedMean(lag)).tag())
            .collect();
        assert_eq!(tags.first().map(String::as_str), Some("EDA_shifted_mean_00"));
        assert_eq!(tags.last().map(String::as_str), Some("EDA_shifted_mean_09"));
    }
}
