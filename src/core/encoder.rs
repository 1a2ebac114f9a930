//! Record identity and signal encoding.
//!
//! Ids follow `{study}-{participant}-{seq:05}[-{tag}]` with one counter per
//! encoder, so ids stay unique across every participant of a run. Signal
//! slices become observations carrying either sampled data (fixed rate) or a
//! CSV attachment (irregular series and derived feature columns).

use crate::core::features::{DerivedFeatureSet, FeatureColumn};
use crate::error::{IngestError, Result};
use crate::fhir::{
    Attachment, CodeableConcept, Observation, ObservationValue, Patient, Period, Quantity,
    Reference, SampledData,
};
use crate::reader::{SampleRate, SignalSeries};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Longest id a FHIR server accepts.
const MAX_ID_LEN: usize = 64;

/// Replace characters FHIR ids do not allow and cap the length.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .take(MAX_ID_LEN)
        .collect()
}

/// Lowercased, sanitized id suffix.
pub fn sanitize_tag(tag: &str) -> String {
    sanitize_id(&tag.trim().to_lowercase())
}

/// `{study}-{participant}`.
pub fn patient_id(study: &str, participant: &str) -> String {
    sanitize_id(&format!("{study}-{participant}"))
}

/// Monotonic id source for one dataset run.
#[derive(Debug, Clone)]
pub struct IdSequence {
    study: String,
    next: u64,
}

impl IdSequence {
    pub fn new(study: impl Into<String>) -> Self {
        Self {
            study: study.into(),
            next: 1,
        }
    }

    /// Take the next id. Every call consumes a sequence number.
    pub fn next_id(&mut self, participant: &str, tag: Option<&str>) -> String {
        let seq = self.next;
        self.next += 1;
        let id = match tag {
            Some(tag) => format!("{}-{participant}-{seq:05}-{}", self.study, sanitize_tag(tag)),
            None => format!("{}-{participant}-{seq:05}", self.study),
        };
        sanitize_id(&id)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

/// A study participant and the patient record that stands for them.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Id as it appears in the dataset (`S2`, `drive01`, ...)
    pub raw_id: String,
    pub patient: Patient,
    pub reference: Reference,
}

impl Participant {
    pub fn new(study: &str, raw_id: impl Into<String>) -> Self {
        let raw_id = raw_id.into();
        let id = patient_id(study, &raw_id);
        Self {
            reference: Reference::new("Patient", &id),
            patient: Patient { id: Some(id) },
            raw_id,
        }
    }

    pub fn patient_id(&self) -> &str {
        self.reference.id()
    }
}

/// Builds observations for one dataset run.
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    study: String,
    tz: Tz,
    ids: IdSequence,
}

impl RecordEncoder {
    pub fn new(study: impl Into<String>, tz: Tz) -> Self {
        let study = study.into();
        Self {
            ids: IdSequence::new(study.clone()),
            study,
            tz,
        }
    }

    pub fn study(&self) -> &str {
        &self.study
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn ids(&self) -> &IdSequence {
        &self.ids
    }

    pub fn next_id(&mut self, participant: &Participant, tag: Option<&str>) -> String {
        self.ids.next_id(&participant.raw_id, tag)
    }

    /// A timestamp on the dataset's wall clock.
    pub fn instant(&self, ts: DateTime<Utc>) -> DateTime<FixedOffset> {
        ts.with_timezone(&self.tz).fixed_offset()
    }

    pub fn period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Period {
        Period {
            start: Some(self.instant(start)),
            end: Some(self.instant(end)),
        }
    }

    /// An observation with a fresh id, the participant as subject and the given period.
    pub fn observation(
        &mut self,
        participant: &Participant,
        tag: Option<&str>,
        code: CodeableConcept,
        span: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Observation {
        let mut obs = Observation::new(code);
        obs.id = Some(self.next_id(participant, tag));
        obs.subject = Some(participant.reference.clone());
        obs.effective_period = span.map(|(start, end)| self.period(start, end));
        obs
    }

    /// Encode one modality slice. `tag` defaults to the modality name.
    pub fn signal_observation(
        &mut self,
        participant: &Participant,
        code: CodeableConcept,
        series: &SignalSeries,
        device: Option<Reference>,
        tag: Option<&str>,
    ) -> Observation {
        let span = series.first_timestamp().zip(series.last_timestamp());
        let tag = tag.unwrap_or(series.modality()).to_string();
        let mut obs = self.observation(participant, Some(&tag), code, span);
        obs.device = device;
        obs.value = Some(match series.rate() {
            SampleRate::Fixed(hz) => ObservationValue::ValueSampledData(sampled_data(series, hz)),
            SampleRate::Irregular => ObservationValue::ValueAttachment(self.series_attachment(series)),
        });
        obs
    }

    /// One estimated observation per feature column, each derived from the
    /// raw observation of its modality.
    ///
    /// `sources` is keyed by lowercase modality name. A column whose
    /// modality has no source is a [`IngestError::MissingDerivationSource`].
    pub fn feature_observations(
        &mut self,
        participant: &Participant,
        features: &DerivedFeatureSet,
        sources: &BTreeMap<String, Reference>,
    ) -> Result<Vec<Observation>> {
        let (Some(start), Some(end)) = (
            features.timestamps().first().copied(),
            features.timestamps().last().copied(),
        ) else {
            return Ok(Vec::new());
        };

        let mut observations = Vec::with_capacity(features.columns().len());
        for (column, values) in features.columns() {
            let tag = column.tag();
            let mut obs = self.observation(
                participant,
                Some(&tag),
                CodeableConcept::code(&tag),
                Some((start, end)),
            );
            let source = sources.get(&column.modality.to_lowercase()).ok_or_else(|| {
                IngestError::MissingDerivationSource {
                    observation: obs.id.clone().unwrap_or_default(),
                    modality: column.modality.clone(),
                }
            })?;
            obs.derived_from = vec![source.clone()];
            obs.value = Some(ObservationValue::ValueAttachment(
                self.feature_attachment(column, features.timestamps(), values),
            ));
            observations.push(obs);
        }
        Ok(observations)
    }

    fn series_attachment(&self, series: &SignalSeries) -> Attachment {
        let mut csv = String::from("timestamp");
        for channel in 0..series.channels() {
            let _ = write!(csv, ",{}_{channel}", series.modality());
        }
        csv.push('\n');
        for sample in series.samples() {
            csv.push_str(&self.stamp(sample.timestamp));
            for value in &sample.values {
                let _ = write!(csv, ",{value}");
            }
            csv.push('\n');
        }
        attachment(csv, series.modality())
    }

    fn feature_attachment(
        &self,
        column: &FeatureColumn,
        timestamps: &[DateTime<Utc>],
        values: &[Option<f64>],
    ) -> Attachment {
        let tag = column.tag();
        let mut csv = format!("timestamp,{tag}\n");
        for (ts, value) in timestamps.iter().zip(values) {
            csv.push_str(&self.stamp(*ts));
            csv.push(',');
            if let Some(v) = value {
                let _ = write!(csv, "{v}");
            }
            csv.push('\n');
        }
        attachment(csv, &tag)
    }

    fn stamp(&self, ts: DateTime<Utc>) -> String {
        self.instant(ts).to_rfc3339_opts(SecondsFormat::Millis, false)
    }
}

fn attachment(csv: String, title: &str) -> Attachment {
    Attachment {
        content_type: "text/csv".to_string(),
        data: BASE64.encode(csv.as_bytes()),
        title: Some(title.to_string()),
    }
}

/// Fixed-rate samples, channels interleaved per sample. Non-finite values are `E`.
pub fn sampled_data(series: &SignalSeries, hz: f64) -> SampledData {
    let mut data = String::new();
    for value in series.samples().iter().flat_map(|s| s.values.iter()) {
        if !data.is_empty() {
            data.push(' ');
        }
        if value.is_finite() {
            let _ = write!(data, "{value}");
        } else {
            data.push('E');
        }
    }
    SampledData {
        origin: Quantity {
            value: 0.0,
            unit: None,
        },
        interval: 1000.0 / hz,
        interval_unit: "ms".to_string(),
        dimensions: series.channels().max(1),
        data,
    }
}
