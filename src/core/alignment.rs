//! Label and session alignment.
//!
//! Turns one participant's modality series plus a label source into a lazy
//! sequence of [`Chunk`]s: maximal runs of constant label, sliced out of every
//! modality in that modality's own index space.
//!
//! Three label sources are supported:
//!
//! - a dense label column or a [`LabelTimeline`] at a reference rate
//!   ([`IndexAligner`]), optionally restricted to session blocks produced by
//!   [`partition_sessions`];
//! - derived event markers ([`LabelTimeline::from_markers`]);
//! - wall-clock label windows ([`TimestampAligner`]).
//!
//! Reference indices map onto a modality by nearest sample,
//! `round(reference_index * modality_rate / reference_rate)`, so chunk
//! boundaries may jitter by one sample.

use crate::error::{IngestError, Result};
use crate::reader::{ModalitySet, SignalSeries};
use chrono::{DateTime, Utc};
use std::collections::{btree_set, BTreeSet};
use std::ops::Range;

/// Label of samples not covered by any interval.
pub const UNLABELED: i64 = -1;

/// Half-open `[start, end)` interval of reference samples carrying one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelInterval {
    pub start: usize,
    pub end: usize,
    pub label: i64,
}

/// Ordered, non-overlapping label intervals defined at a reference rate.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTimeline {
    rate: f64,
    len: usize,
    intervals: Vec<LabelInterval>,
}

impl LabelTimeline {
    pub fn new(rate: f64, len: usize, intervals: Vec<LabelInterval>) -> Result<Self> {
        let invalid = |message: String| IngestError::InvalidSeries {
            modality: "label timeline".to_string(),
            message,
        };
        let mut cursor = 0;
        for iv in &intervals {
            if iv.start >= iv.end || iv.end > len {
                return Err(invalid(format!(
                    "interval [{}, {}) is empty or outside 0..{len}",
                    iv.start, iv.end
                )));
            }
            if iv.start < cursor {
                return Err(invalid(format!(
                    "interval [{}, {}) overlaps or precedes the previous one",
                    iv.start, iv.end
                )));
            }
            cursor = iv.end;
        }
        Ok(Self {
            rate,
            len,
            intervals,
        })
    }

    /// Run-length compress a dense per-sample label column.
    /// Runs of [`UNLABELED`] are left uncovered.
    pub fn from_dense(rate: f64, labels: &[i64]) -> Self {
        let intervals = runs(labels)
            .into_iter()
            .filter(|run| run.label != UNLABELED)
            .map(|run| LabelInterval {
                start: run.start,
                end: run.end,
                label: run.label,
            })
            .collect();
        Self {
            rate,
            len: labels.len(),
            intervals,
        }
    }

    /// Segment a marker channel: every rising edge through the midpoint of
    /// the channel's range starts a new segment, labelled by its ordinal.
    pub fn from_markers(rate: f64, marker: &[f64]) -> Self {
        let (lo, hi) = marker
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let threshold = (lo + hi) / 2.0;

        let mut intervals = Vec::new();
        let mut segment = 0;
        let mut segment_start = 0;
        for i in 1..marker.len() {
            if marker[i - 1] <= threshold && marker[i] > threshold {
                intervals.push(LabelInterval {
                    start: segment_start,
                    end: i,
                    label: segment,
                });
                segment += 1;
                segment_start = i;
            }
        }
        if segment_start < marker.len() {
            intervals.push(LabelInterval {
                start: segment_start,
                end: marker.len(),
                label: segment,
            });
        }

        Self {
            rate,
            len: marker.len(),
            intervals,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn intervals(&self) -> &[LabelInterval] {
        &self.intervals
    }

    /// Point-in-interval lookup, [`UNLABELED`] when nothing covers `index`.
    pub fn label_at(&self, index: usize) -> i64 {
        let pos = self.intervals.partition_point(|iv| iv.end <= index);
        match self.intervals.get(pos) {
            Some(iv) if iv.start <= index => iv.label,
            _ => UNLABELED,
        }
    }

    /// One label per reference sample.
    pub fn dense_labels(&self) -> Vec<i64> {
        let mut labels = vec![UNLABELED; self.len];
        for iv in &self.intervals {
            labels[iv.start..iv.end].fill(iv.label);
        }
        labels
    }
}

/// A run of constant label on the reference axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceChunk {
    pub id: usize,
    pub label: i64,
    pub start: usize,
    pub end: usize,
}

/// Split a label column into runs. A boundary is any non-zero first
/// difference and the chunk id is the running count of boundaries.
pub fn reference_chunks(labels: &[i64], offset: usize) -> Vec<ReferenceChunk> {
    runs(labels)
        .into_iter()
        .map(|run| ReferenceChunk {
            start: run.start + offset,
            end: run.end + offset,
            ..run
        })
        .collect()
}

fn runs(labels: &[i64]) -> Vec<ReferenceChunk> {
    let mut chunks: Vec<ReferenceChunk> = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        if i > 0 && labels[i - 1] == *label {
            if let Some(current) = chunks.last_mut() {
                current.end = i + 1;
            }
            continue;
        }
        chunks.push(ReferenceChunk {
            id: chunks.len(),
            label: *label,
            start: i,
            end: i + 1,
        });
    }
    chunks
}

/// Nearest modality sample for a reference index.
pub fn translate_index(reference_index: usize, modality_rate: f64, reference_rate: f64) -> usize {
    (reference_index as f64 * modality_rate / reference_rate).round() as usize
}

/// One labelled run sliced out of every modality that has samples in it.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub participant: String,
    pub label: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub slices: ModalitySet,
}

impl Chunk {
    fn assemble(participant: &str, label: i64, slices: ModalitySet) -> Option<Self> {
        let start = slices.values().filter_map(SignalSeries::first_timestamp).min()?;
        let end = slices.values().filter_map(SignalSeries::last_timestamp).max()?;
        Some(Self {
            participant: participant.to_string(),
            label,
            start,
            end,
            slices,
        })
    }
}

/// Aligns fixed-rate modalities against a reference-rate label column.
pub struct IndexAligner<'a> {
    modalities: &'a ModalitySet,
    reference_rate: f64,
}

impl<'a> IndexAligner<'a> {
    pub fn new(modalities: &'a ModalitySet, reference_rate: f64) -> Self {
        for series in modalities.values() {
            if series.rate().hz().is_none() && !series.is_empty() {
                tracing::warn!(
                    modality = series.modality(),
                    "irregular series cannot be index-aligned and will be left out"
                );
            }
        }
        Self {
            modalities,
            reference_rate,
        }
    }

    /// Chunks over the whole label column.
    pub fn chunks(&self, participant: &str, labels: &[i64]) -> ChunkIter<'a> {
        self.chunks_in(participant, labels, 0..labels.len())
    }

    /// Chunks over a timeline, labelling each reference sample by interval lookup.
    pub fn timeline_chunks(&self, participant: &str, timeline: &LabelTimeline) -> ChunkIter<'a> {
        self.chunks(participant, &timeline.dense_labels())
    }

    /// Chunks restricted to one block of the label column.
    pub fn chunks_in(&self, participant: &str, labels: &[i64], block: Range<usize>) -> ChunkIter<'a> {
        let end = block.end.min(labels.len());
        let start = block.start.min(end);
        ChunkIter {
            participant: participant.to_string(),
            modalities: self.modalities,
            reference_rate: self.reference_rate,
            reference_len: labels.len(),
            chunks: reference_chunks(&labels[start..end], start).into_iter(),
        }
    }
}

/// Lazy chunk sequence produced by [`IndexAligner`].
pub struct ChunkIter<'a> {
    participant: String,
    modalities: &'a ModalitySet,
    reference_rate: f64,
    reference_len: usize,
    chunks: std::vec::IntoIter<ReferenceChunk>,
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            let chunk = self.chunks.next()?;
            let mut slices = ModalitySet::new();
            for (name, series) in self.modalities {
                let Some(hz) = series.rate().hz() else {
                    continue;
                };
                let start = translate_index(chunk.start, hz, self.reference_rate);
                // The final run owns whatever the modality has left.
                let end = if chunk.end >= self.reference_len {
                    series.len()
                } else {
                    translate_index(chunk.end, hz, self.reference_rate)
                };
                let slice = series.slice(start..end);
                if !slice.is_empty() {
                    slices.insert(name.clone(), slice);
                }
            }
            if let Some(aligned) = Chunk::assemble(&self.participant, chunk.label, slices) {
                return Some(aligned);
            }
        }
    }
}

/// A named session on the reference axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Samples between sessions, before the first or after the last.
    Transient,
    /// Index into the session list.
    Session(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBlock {
    pub kind: BlockKind,
    pub range: Range<usize>,
}

/// Partition `0..len` into alternating transient and session blocks.
///
/// The blocks tile `0..len` without overlap. A session starting before the
/// previous one ends is clamped to start where that one stopped. Blocks of
/// zero or negative duration are logged and dropped. The region after the
/// last session is always a transient block.
pub fn partition_sessions(sessions: &[Session], len: usize) -> Vec<SessionBlock> {
    let mut candidates = Vec::with_capacity(sessions.len() * 2 + 1);
    let mut cursor = 0;
    for (i, session) in sessions.iter().enumerate() {
        let start = if session.start < cursor {
            tracing::warn!(
                session = %session.name,
                start = session.start,
                previous_end = cursor,
                "session overlaps the previous one, clamping its start"
            );
            cursor
        } else {
            session.start
        };
        candidates.push((BlockKind::Transient, cursor, start));
        candidates.push((BlockKind::Session(i), start, session.end));
        cursor = cursor.max(session.end);
    }
    candidates.push((BlockKind::Transient, cursor, len));

    candidates
        .into_iter()
        .filter_map(|(kind, start, end)| {
            if end <= start {
                if end < start || matches!(kind, BlockKind::Session(_)) {
                    tracing::warn!(?kind, start, end, "dropping block with non-positive duration");
                }
                return None;
            }
            let (start, end) = (start.min(len), end.min(len));
            if start == end {
                tracing::warn!(?kind, start, len, "block starts past the end of the labels");
                return None;
            }
            Some(SessionBlock {
                kind,
                range: start..end,
            })
        })
        .collect()
}

/// A label window on the wall clock, inclusive at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedLabel {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: i64,
}

/// Aligns modalities against wall-clock label windows.
///
/// Each modality is labelled and chunked on its own; chunks with the same id
/// are then grouped across modalities. A window only applies to a modality
/// when it starts strictly inside that modality's time span.
pub struct TimestampAligner<'a> {
    modalities: &'a ModalitySet,
    labels: &'a [TimedLabel],
}

struct ModalityPlan<'a> {
    series: &'a SignalSeries,
    labels: Vec<i64>,
    chunk_ids: Vec<usize>,
}

impl<'a> TimestampAligner<'a> {
    pub fn new(modalities: &'a ModalitySet, labels: &'a [TimedLabel]) -> Self {
        Self { modalities, labels }
    }

    /// Label every sample of one series.
    pub fn label_series(&self, series: &SignalSeries) -> Vec<i64> {
        let mut labels = vec![UNLABELED; series.len()];
        let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
            return labels;
        };
        let samples = series.samples();
        for window in self.labels {
            if !(first < window.start && window.start < last) {
                continue;
            }
            let lo = samples.partition_point(|s| s.timestamp < window.start);
            let hi = samples.partition_point(|s| s.timestamp <= window.end);
            labels[lo..hi].fill(window.label);
        }
        labels
    }

    pub fn chunks(&self, participant: &str) -> TimedChunkIter<'a> {
        let mut ids = BTreeSet::new();
        let mut plans = Vec::new();
        for series in self.modalities.values() {
            if series.is_empty() {
                continue;
            }
            let labels = self.label_series(series);
            let mut chunk_ids = Vec::with_capacity(labels.len());
            let mut id = 0;
            for (i, label) in labels.iter().enumerate() {
                if i > 0 && *label != labels[i - 1] {
                    id += 1;
                }
                chunk_ids.push(id);
            }
            ids.extend(chunk_ids.iter().copied());
            plans.push(ModalityPlan {
                series,
                labels,
                chunk_ids,
            });
        }

        TimedChunkIter {
            participant: participant.to_string(),
            plans,
            ids: ids.into_iter(),
        }
    }
}

/// Lazy chunk sequence produced by [`TimestampAligner`].
pub struct TimedChunkIter<'a> {
    participant: String,
    plans: Vec<ModalityPlan<'a>>,
    ids: btree_set::IntoIter<usize>,
}

impl Iterator for TimedChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            let id = self.ids.next()?;
            let mut slices = ModalitySet::new();
            let mut labels = BTreeSet::new();
            for plan in &self.plans {
                // chunk ids are non-decreasing along each series
                let lo = plan.chunk_ids.partition_point(|c| *c < id);
                let hi = plan.chunk_ids.partition_point(|c| *c <= id);
                if lo == hi {
                    continue;
                }
                labels.extend(plan.labels[lo..hi].iter().copied());
                slices.insert(plan.series.modality().to_string(), plan.series.slice(lo..hi));
            }

            let Some(label) = labels.first().copied() else {
                continue;
            };
            if labels.len() > 1 {
                tracing::warn!(
                    participant = %self.participant,
                    chunk = id,
                    ?labels,
                    chosen = label,
                    "chunk spans more than one label"
                );
            }
            if let Some(chunk) = Chunk::assemble(&self.participant, label, slices) {
                return Some(chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn series(name: &str, hz: f64, len: usize) -> SignalSeries {
        let rows = (0..len).map(|i| vec![i as f64]).collect();
        SignalSeries::from_rate(name, at(0), hz, rows).unwrap()
    }

    fn values(series: &SignalSeries) -> Vec<f64> {
        series.first_channel().map(|(_, v)| v).collect()
    }

    #[test]
    fn test_ten_sample_scenario() {
        let labels = [-1, -1, 1, 1, 1, -1, -1, 2, 2, 2];
        let mut modalities = ModalitySet::new();
        modalities.insert("EDA".to_string(), series("EDA", 4.0, labels.len()));

        let chunks: Vec<Chunk> = IndexAligner::new(&modalities, 4.0).chunks("S2", &labels).collect();
        let found: Vec<i64> = chunks.iter().map(|c| c.label).collect();
        let lengths: Vec<usize> = chunks.iter().map(|c| c.slices["EDA"].len()).collect();
        assert_eq!(found, vec![-1, 1, -1, 2]);
        assert_eq!(lengths, vec![2, 3, 2, 3]);
    }

    #[test]
    fn test_one_second_run_maps_to_four_samples() {
        let mut labels = vec![1; 700];
        labels.extend(vec![2; 700]);
        let mut modalities = ModalitySet::new();
        modalities.insert("EDA".to_string(), series("EDA", 4.0, 8));

        let first = IndexAligner::new(&modalities, 700.0)
            .chunks("S2", &labels)
            .next()
            .unwrap();
        assert_eq!(first.label, 1);
        assert_eq!(values(&first.slices["EDA"]), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(translate_index(0, 4.0, 700.0), 0);
        assert_eq!(translate_index(700, 4.0, 700.0), 4);
    }

    fn mixed_labels() -> Vec<i64> {
        // runs of uneven length, including very short ones
        let pattern = [(0, 1000), (1, 2337), (0, 3), (2, 5000), (3, 1), (4, 1659)];
        pattern
            .iter()
            .flat_map(|(label, n)| std::iter::repeat(*label).take(*n))
            .collect()
    }

    #[test]
    fn test_chunks_cover_every_sample_once_in_order() {
        let labels = mixed_labels();
        let seconds = labels.len() as f64 / 700.0;
        let mut modalities = ModalitySet::new();
        for (name, hz) in [("ACC", 32.0), ("BVP", 64.0), ("EDA", 4.0), ("ECG", 700.0)] {
            let len = (seconds * hz).ceil() as usize;
            modalities.insert(name.to_string(), series(name, hz, len));
        }

        let chunks: Vec<Chunk> = IndexAligner::new(&modalities, 700.0).chunks("S3", &labels).collect();
        for (name, original) in &modalities {
            let mut rebuilt = Vec::new();
            let mut last_end: Option<DateTime<Utc>> = None;
            for chunk in &chunks {
                if let Some(slice) = chunk.slices.get(name) {
                    if let Some(prev) = last_end {
                        assert!(slice.first_timestamp().unwrap() > prev, "{name} overlaps");
                    }
                    last_end = slice.last_timestamp();
                    rebuilt.extend(values(slice));
                }
            }
            assert_eq!(rebuilt, values(original), "{name} not covered exactly once");
        }
    }

    #[test]
    fn test_rate_translation_within_one_sample() {
        let labels = mixed_labels();
        let reference = reference_chunks(&labels, 0);
        let mut modalities = ModalitySet::new();
        modalities.insert("BVP".to_string(), series("BVP", 64.0, labels.len() * 64 / 700 + 1));
        // a reference-rate channel keeps every run non-empty so chunks pair up
        modalities.insert("ECG".to_string(), series("ECG", 700.0, labels.len()));

        let chunks: Vec<Chunk> = IndexAligner::new(&modalities, 700.0).chunks("S3", &labels).collect();
        assert_eq!(chunks.len(), reference.len());
        for (reference_chunk, chunk) in reference.iter().zip(&chunks) {
            if reference_chunk.end == labels.len() {
                continue;
            }
            let expected = (reference_chunk.end - reference_chunk.start) as f64 * 64.0 / 700.0;
            let got = chunk.slices.get("BVP").map(|s| s.len()).unwrap_or(0) as f64;
            assert!((got - expected).abs() <= 1.0, "{got} vs {expected}");
        }
    }

    #[test]
    fn test_chunks_without_samples_are_skipped() {
        // the 1-sample run at 700 Hz rounds to nothing at 4 Hz
        let labels = [vec![0; 700], vec![5; 1], vec![0; 699]].concat();
        let mut modalities = ModalitySet::new();
        modalities.insert("EDA".to_string(), series("EDA", 4.0, 8));
        let labels_seen: Vec<i64> = IndexAligner::new(&modalities, 700.0)
            .chunks("S4", &labels)
            .map(|c| c.label)
            .collect();
        assert_eq!(labels_seen, vec![0, 0]);
    }

    #[test]
    fn test_timeline_lookup_and_dense_labels() {
        let timeline = LabelTimeline::new(
            10.0,
            10,
            vec![
                LabelInterval {
                    start: 2,
                    end: 5,
                    label: 1,
                },
                LabelInterval {
                    start: 7,
                    end: 10,
                    label: 2,
                },
            ],
        )
        .unwrap();
        assert_eq!(timeline.label_at(0), UNLABELED);
        assert_eq!(timeline.label_at(4), 1);
        assert_eq!(timeline.label_at(5), UNLABELED);
        assert_eq!(timeline.dense_labels(), vec![-1, -1, 1, 1, 1, -1, -1, 2, 2, 2]);
        assert_eq!(LabelTimeline::from_dense(10.0, &timeline.dense_labels()), timeline);
    }

    #[test]
    fn test_timeline_rejects_overlap() {
        let overlapping = vec![
            LabelInterval {
                start: 0,
                end: 5,
                label: 1,
            },
            LabelInterval {
                start: 4,
                end: 8,
                label: 2,
            },
        ];
        assert!(LabelTimeline::new(1.0, 10, overlapping).is_err());
    }

    #[test]
    fn test_marker_segments() {
        let marker = [0.0, 0.0, 5.0, 5.0, 0.0, 0.0, 5.0, 0.0];
        let timeline = LabelTimeline::from_markers(15.5, &marker);
        assert_eq!(timeline.dense_labels(), vec![0, 0, 1, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_session_partition() {
        let sessions = vec![
            Session {
                name: "Base".to_string(),
                start: 10,
                end: 20,
            },
            Session {
                name: "TSST".to_string(),
                start: 30,
                end: 40,
            },
        ];
        let blocks = partition_sessions(&sessions, 50);
        let expected = vec![
            (BlockKind::Transient, 0..10),
            (BlockKind::Session(0), 10..20),
            (BlockKind::Transient, 20..30),
            (BlockKind::Session(1), 30..40),
            (BlockKind::Transient, 40..50),
        ];
        let got: Vec<_> = blocks.into_iter().map(|b| (b.kind, b.range)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_overlapping_sessions_are_clamped() {
        let sessions = vec![
            Session {
                name: "a".to_string(),
                start: 0,
                end: 30,
            },
            Session {
                name: "b".to_string(),
                start: 25,
                end: 40,
            },
            Session {
                name: "c".to_string(),
                start: 32,
                end: 36,
            },
        ];
        let blocks = partition_sessions(&sessions, 40);
        assert_eq!(
            blocks,
            vec![
                SessionBlock {
                    kind: BlockKind::Session(0),
                    range: 0..30,
                },
                SessionBlock {
                    kind: BlockKind::Session(1),
                    range: 30..40,
                },
            ]
        );
    }

    #[test]
    fn test_session_chunks_cover_every_sample_once() {
        let labels = [1; 40];
        let mut modalities = ModalitySet::new();
        modalities.insert("ECG".to_string(), series("ECG", 10.0, 40));
        let aligner = IndexAligner::new(&modalities, 10.0);
        let sessions = vec![
            Session {
                name: "a".to_string(),
                start: 0,
                end: 30,
            },
            Session {
                name: "b".to_string(),
                start: 25,
                end: 40,
            },
        ];

        let mut emitted: Vec<f64> = Vec::new();
        for block in partition_sessions(&sessions, labels.len()) {
            for chunk in aligner.chunks_in("S5", &labels, block.range.clone()) {
                emitted.extend(values(&chunk.slices["ECG"]));
            }
        }
        let expected: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert_eq!(emitted, expected);
    }

    #[test]
    fn test_session_blocks_chunk_independently() {
        let labels = [1, 1, 1, 1, 2, 2, 2, 2, 2, 2];
        let mut modalities = ModalitySet::new();
        modalities.insert("ECG".to_string(), series("ECG", 10.0, 10));
        let aligner = IndexAligner::new(&modalities, 10.0);

        let sessions = vec![Session {
            name: "TSST".to_string(),
            start: 2,
            end: 6,
        }];
        let mut lengths = Vec::new();
        for block in partition_sessions(&sessions, labels.len()) {
            for chunk in aligner.chunks_in("S5", &labels, block.range.clone()) {
                lengths.push((block.kind, chunk.label, chunk.slices["ECG"].len()));
            }
        }
        assert_eq!(
            lengths,
            vec![
                (BlockKind::Transient, 1, 2),
                (BlockKind::Session(0), 1, 2),
                (BlockKind::Session(0), 2, 2),
                (BlockKind::Transient, 2, 4),
            ]
        );
    }

    fn irregular(name: &str, secs: &[i64]) -> SignalSeries {
        let samples = secs
            .iter()
            .map(|s| crate::reader::Sample {
                timestamp: at(*s),
                values: vec![*s as f64],
            })
            .collect();
        SignalSeries::new(name, crate::reader::SampleRate::Irregular, samples).unwrap()
    }

    #[test]
    fn test_timestamp_windows_apply_inclusively() {
        let mut modalities = ModalitySet::new();
        modalities.insert("HR".to_string(), irregular("HR", &[0, 10, 20, 30, 40]));
        let windows = vec![TimedLabel {
            start: at(10),
            end: at(30),
            label: 7,
        }];
        let aligner = TimestampAligner::new(&modalities, &windows);
        assert_eq!(aligner.label_series(&modalities["HR"]), vec![-1, 7, 7, 7, -1]);

        let chunks: Vec<Chunk> = aligner.chunks("5C").collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].label, 7);
        assert_eq!(chunks[1].start, at(10));
        assert_eq!(chunks[1].end, at(30));
    }

    #[test]
    fn test_timestamp_window_must_start_inside_span() {
        let mut modalities = ModalitySet::new();
        modalities.insert("EDA".to_string(), irregular("EDA", &[100, 110, 120]));
        let windows = vec![TimedLabel {
            start: at(100),
            end: at(200),
            label: 3,
        }];
        let aligner = TimestampAligner::new(&modalities, &windows);
        assert_eq!(aligner.label_series(&modalities["EDA"]), vec![-1, -1, -1]);
    }

    #[test]
    fn test_conflicting_labels_pick_smallest() {
        let mut modalities = ModalitySet::new();
        modalities.insert("EDA".to_string(), irregular("EDA", &[0, 10]));
        modalities.insert("TEMP".to_string(), irregular("TEMP", &[12, 20, 30]));
        let windows = vec![
            TimedLabel {
                start: at(5),
                end: at(25),
                label: 4,
            },
            TimedLabel {
                start: at(15),
                end: at(35),
                label: 3,
            },
        ];
        let chunks: Vec<Chunk> = TimestampAligner::new(&modalities, &windows).chunks("5C").collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].label, UNLABELED);
        assert_eq!(chunks[1].label, 3);
        assert_eq!(chunks[1].slices["EDA"].len(), 1);
        assert_eq!(chunks[1].slices["TEMP"].len(), 2);
        assert_eq!(chunks[1].end - chunks[1].start, Duration::seconds(20));
    }
}
