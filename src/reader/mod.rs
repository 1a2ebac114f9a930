//! Signal readers for the supported dataset layouts.
//!
//! Every reader produces a [`ModalitySet`]: modality name to [`SignalSeries`].
//! A missing or malformed modality file becomes an empty series and a warning,
//! never an error, so the rest of a session can still be processed.

pub mod archive;
pub mod empatica;
pub mod types;
pub mod wfdb;

pub use archive::{read_archive, ParticipantArchive};
pub use types::{epoch_seconds, ModalitySet, Sample, SampleRate, SignalSeries};
