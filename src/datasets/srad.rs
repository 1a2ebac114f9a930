//! SRAD: multi-channel recordings of drivers on a stress-inducing route.
//!
//! Layout: `<dir>/RECORDS` lists the drives; each drive is a WFDB record
//! `<dir>/<record>.hea` + `.dat`. The marker channel segments a drive into
//! route stages; each stage gets a `drive exercise` reference observation.
//! Heart rate is derived by the recorder from the ECG and is uploaded as an
//! estimated observation.

use super::{body_structure, structure_reference, upload_catalog, upload_device_slice};
use crate::catalog::{instantiate, DeviceModel};
use crate::core::{IndexAligner, LabelTimeline, Participant};
use crate::error::{IngestError, Result};
use crate::fhir::{BodyStructure, CodeableConcept, ObservationValue};
use crate::pipeline::{device_association, DatasetLoader, DeviceRegistration, StudyContext, StudyInfo};
use crate::reader::{wfdb, ModalitySet};
use std::path::{Path, PathBuf};

const STUDY: &str = "SRAD";
const MARKER: &str = "marker";
const HEART_RATE: &str = "hr";

/// Body sites, keyed by the id suffix of their body structure.
const BODY_SITES: &[(&str, &str, &str)] = &[
    ("chest", "chest", "Chest"),
    ("left-shoulder", "left shoulder", "Left Shoulder"),
    ("diaphragm", "diaphragm", "Chest around the diaphragm"),
    ("left-foot", "left foot", "Left Foot"),
    ("left-hand", "left hand", "Left Hand"),
];

/// Recorder channel worn at each body site.
const CHANNEL_SITES: &[(&str, &str)] = &[
    ("ecg", "chest"),
    ("emg", "left-shoulder"),
    ("resp", "diaphragm"),
    ("sc-1", "left-foot"),
    ("sc-2", "left-hand"),
];

/// Recorder channel key of a header signal description.
pub fn channel_key(description: &str) -> Option<&'static str> {
    let d = description.to_lowercase();
    if d.contains("foot") {
        Some("sc-1")
    } else if d.contains("hand") {
        Some("sc-2")
    } else if d.contains("marker") {
        Some(MARKER)
    } else if d.contains("ecg") || d.contains("ekg") {
        Some("ecg")
    } else if d.contains("emg") {
        Some("emg")
    } else if d.contains("resp") {
        Some("resp")
    } else if d == "hr" || d.contains("heart") {
        Some(HEART_RATE)
    } else {
        None
    }
}

pub struct SradLoader {
    dir: PathBuf,
    study: StudyInfo,
}

impl SradLoader {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            study: StudyInfo {
                id: STUDY.to_string(),
                title: "Detecting Stress During Real-World Driving Tasks Using Physiological Sensors"
                    .to_string(),
                author: "Healey and Picard".to_string(),
                date: "2005-06-16".to_string(),
                tz: chrono_tz::UTC,
            },
        }
    }
}

/// Rename a record's channels to recorder keys and split off the marker.
fn split_record(record: ModalitySet) -> (ModalitySet, Option<Vec<f64>>) {
    let mut channels = ModalitySet::new();
    let mut marker = None;
    for (description, series) in record {
        match channel_key(&description) {
            Some(MARKER) => marker = Some(series.first_channel().map(|(_, v)| v).collect()),
            Some(key) => {
                if channels.contains_key(key) {
                    tracing::warn!(channel = %description, key, "duplicate channel, keeping the first");
                    continue;
                }
                channels.insert(key.to_string(), series.renamed(key));
            }
            None => tracing::warn!(channel = %description, "unknown channel, skipping"),
        }
    }
    (channels, marker)
}

impl DatasetLoader for SradLoader {
    fn study(&self) -> &StudyInfo {
        &self.study
    }

    fn participants(&self) -> Result<Vec<Participant>> {
        Ok(wfdb::read_records_index(&self.dir)?
            .into_iter()
            .map(|record| Participant::new(STUDY, record))
            .collect())
    }

    fn body_structures(&self, participant: &Participant) -> Vec<BodyStructure> {
        BODY_SITES
            .iter()
            .map(|(key, code, description)| body_structure(STUDY, participant, key, code, description))
            .collect()
    }

    /// One association per channel, linking the channel's sub-device to
    /// where its electrode sat.
    fn register_devices(
        &self,
        participant: &Participant,
        body_structures: &[BodyStructure],
    ) -> Result<DeviceRegistration> {
        let model = DeviceModel::SradRecorder;
        let instance = instantiate(model, &model.device_id(STUDY, &participant.raw_id))?;
        let mut associations = Vec::with_capacity(CHANNEL_SITES.len());
        for (channel, site) in CHANNEL_SITES {
            let device = instance.part_reference(channel).ok_or_else(|| {
                IngestError::Dataset(format!("recorder has no channel {channel}"))
            })?;
            associations.push(device_association(
                participant,
                device,
                Some(structure_reference(body_structures, site)?),
            ));
        }
        Ok(DeviceRegistration {
            instances: vec![instance],
            associations,
        })
    }

    fn prepare(&mut self, ctx: &mut StudyContext<'_>) -> Result<()> {
        upload_catalog(ctx, &[DeviceModel::SradRecorder], &[])
    }

    fn read_participant(&mut self, participant: &Participant, ctx: &mut StudyContext<'_>) -> Result<()> {
        let record = wfdb::read_record(&self.dir, &participant.raw_id)?;
        let (channels, marker) = split_record(record);
        let Some(rate) = channels.values().find_map(|s| s.rate().hz()) else {
            tracing::warn!(record = %participant.raw_id, "record has no fixed-rate channels");
            return Ok(());
        };
        let length = channels.values().map(|s| s.len()).max().unwrap_or(0);
        let timeline = match marker {
            Some(marker) => LabelTimeline::from_markers(rate, &marker),
            None => {
                tracing::warn!(record = %participant.raw_id, "no marker channel, one segment per drive");
                LabelTimeline::from_dense(rate, &vec![0; length])
            }
        };
        tracing::debug!(record = %participant.raw_id, segments = timeline.intervals().len(), "Drive segmented");

        let recorder = ctx.device(participant, DeviceModel::SradRecorder)?;
        let code = CodeableConcept::code("drive exercise");
        for chunk in IndexAligner::new(&channels, rate).timeline_chunks(&participant.raw_id, &timeline) {
            let mut members = Vec::new();
            let mut ecg = None;
            for (key, slice) in &chunk.slices {
                if key == HEART_RATE {
                    continue;
                }
                let reference = upload_device_slice(ctx, participant, &recorder, key, slice, code.clone())?;
                if key == "ecg" {
                    ecg = Some(reference.clone());
                }
                members.push(reference);
            }

            if let Some(hr) = chunk.slices.get(HEART_RATE) {
                let mut estimated = ctx.encoder.signal_observation(
                    participant,
                    CodeableConcept::code("heart rate"),
                    hr,
                    None,
                    Some(HEART_RATE),
                );
                let Some(ecg) = ecg.clone() else {
                    return Err(IngestError::MissingDerivationSource {
                        observation: estimated.id.unwrap_or_default(),
                        modality: "ECG".to_string(),
                    });
                };
                estimated.derived_from = vec![ecg];
                let reference = ctx.create(&mut estimated)?;
                ctx.registry
                    .entry(&participant.raw_id)
                    .add_estimated_observation(reference);
            }

            let mut stage = ctx.encoder.observation(
                participant,
                None,
                code.clone(),
                Some((chunk.start, chunk.end)),
            );
            stage.value = Some(ObservationValue::ValueInteger(chunk.label));
            stage.has_member = members;
            let reference = ctx.create(&mut stage)?;
            ctx.registry
                .entry(&participant.raw_id)
                .add_reference_observation(reference);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::{run_study, RunOptions};
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    const HEADER: &str = "drive01 7 15.5 8\n\
        drive01.dat 16 1000/mV 16 0 0 0 0 ECG\n\
        drive01.dat 16 100/mV 16 0 0 0 0 EMG\n\
        drive01.dat 16 100/mV 16 0 0 0 0 foot GSR\n\
        drive01.dat 16 100/mV 16 0 0 0 0 hand GSR\n\
        drive01.dat 16 1/bpm 16 0 0 0 0 HR\n\
        drive01.dat 16 10/mV 16 0 0 0 0 RESP\n\
        drive01.dat 16 1/mV 16 0 0 0 0 marker\n";

    /// Eight frames; the marker rises at frame 4.
    pub(crate) fn write_record(root: &Path) {
        std::fs::write(root.join("RECORDS"), "drive01\n").unwrap();
        std::fs::write(root.join("drive01.hea"), HEADER).unwrap();
        let mut bytes = Vec::new();
        for frame in 0..8i16 {
            let marker = if frame == 4 { 5 } else { 0 };
            for value in [frame * 10, frame, 200, 300, 70, 50, marker] {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        std::fs::write(root.join("drive01.dat"), bytes).unwrap();
    }

    #[test]
    fn test_channel_keys() {
        assert_eq!(channel_key("foot GSR"), Some("sc-1"));
        assert_eq!(channel_key("hand GSR"), Some("sc-2"));
        assert_eq!(channel_key("ECG"), Some("ecg"));
        assert_eq!(channel_key("RESP"), Some("resp"));
        assert_eq!(channel_key("HR"), Some("hr"));
        assert_eq!(channel_key("marker"), Some(MARKER));
        assert_eq!(channel_key("SpO2"), None);
    }

    #[test]
    fn test_associations_per_channel_site() {
        let loader = SradLoader::new(Path::new("/data/srad"));
        let participant = Participant::new(STUDY, "drive01");
        let structures = loader.body_structures(&participant);
        assert_eq!(structures.len(), 5);
        let registration = loader.register_devices(&participant, &structures).unwrap();
        assert_eq!(registration.associations.len(), 5);
        let foot = &registration.associations[3];
        assert_eq!(foot.device.reference, "Device/SRAD-Recorder-drive01-sc-1");
        assert_eq!(foot.id.as_deref(), Some("SRAD-Recorder-drive01-sc-1-association"));
        assert_eq!(
            foot.body_structure.as_ref().unwrap().reference,
            "BodyStructure/SRAD-drive01-left-foot"
        );
        let hand = &registration.associations[4];
        assert_eq!(hand.device.reference, "Device/SRAD-Recorder-drive01-sc-2");
        let ids: std::collections::BTreeSet<_> =
            registration.associations.iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_drive_segments_and_derived_heart_rate() {
        let dir = TempDir::new().unwrap();
        write_record(dir.path());

        let mut loader = SradLoader::new(dir.path());
        let mut store = MemoryStore::strict();
        let outcome = run_study(&mut loader, &mut store, RunOptions::default()).unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.failed);

        let observations: Vec<_> = store
            .ids("Observation")
            .into_iter()
            .filter_map(|id| store.get("Observation", id))
            .collect();
        let stages: Vec<_> = observations
            .iter()
            .filter(|o| o.get("valueInteger").is_some())
            .collect();
        assert_eq!(stages.len(), 2);
        // ECG, EMG, RESP and both skin conductance channels
        assert_eq!(stages[0]["hasMember"].as_array().unwrap().len(), 5);

        let hr: Vec<_> = observations
            .iter()
            .filter(|o| o["id"].as_str().unwrap().ends_with("-hr"))
            .collect();
        assert_eq!(hr.len(), 2);
        let source = hr[0]["derivedFrom"][0]["reference"].as_str().unwrap();
        assert!(source.ends_with("-recorder-ecg"), "{source}");
        assert!(hr[0].get("device").is_none());
    }
}
