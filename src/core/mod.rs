//! Core processing shared by every dataset.
//!
//! This module contains:
//! - Label and session alignment of multi-rate signals into chunks
//! - Rolling-window feature derivation and peak detection
//! - Record identity and observation encoding

pub mod alignment;
pub mod encoder;
pub mod features;
pub mod peaks;

// Re-export commonly used types
pub use alignment::{
    partition_sessions, BlockKind, Chunk, IndexAligner, LabelTimeline, Session, SessionBlock,
    TimedLabel, TimestampAligner, UNLABELED,
};
pub use encoder::{IdSequence, Participant, RecordEncoder};
pub use features::{DerivedFeatureSet, FeatureColumn, FeatureConfig, FeatureDeriver, FeatureKind, Statistic};
pub use peaks::{detect_peaks, summarize, PeakSummary};
