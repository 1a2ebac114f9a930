//! WSPCP: Empatica E4 recordings of students sitting three exams.
//!
//! Layout: `<dir>/Data/<S>/<exam>/<modality>.csv`, one E4 export per exam.
//! Each exam becomes a reference observation carrying the student's grade
//! and linking the exam's device observations.

use super::{body_structure, subdirectories, upload_catalog, upload_device_slice, worn_devices};
use crate::catalog::DeviceModel;
use crate::core::Participant;
use crate::error::Result;
use crate::fhir::{BodyStructure, CodeableConcept, Coding, ObservationValue, Quantity};
use crate::pipeline::{DatasetLoader, DeviceRegistration, StudyContext, StudyInfo};
use crate::reader::empatica;
use std::path::{Path, PathBuf};

const STUDY: &str = "WSPCP";
const DATA_DIR: &str = "Data";

pub const EXAMS: [&str; 3] = ["Final", "Midterm 1", "Midterm 2"];

// S1..S10, as a fraction of the maximum score.
const MIDTERM_1: [f64; 10] = [0.78, 0.82, 0.77, 0.75, 0.67, 0.71, 0.64, 0.92, 0.80, 0.89];
const MIDTERM_2: [f64; 10] = [0.82, 0.85, 0.90, 0.77, 0.77, 0.64, 0.33, 0.88, 0.39, 0.64];
// out of 200
const FINAL: [f64; 10] = [182.0, 180.0, 188.0, 149.0, 157.0, 175.0, 110.0, 184.0, 126.0, 116.0];

/// A student's exam grade in percent.
pub fn grade(exam: &str, participant: &str) -> Option<f64> {
    let index = participant
        .strip_prefix('S')?
        .parse::<usize>()
        .ok()?
        .checked_sub(1)?;
    let fraction = match exam {
        "Midterm 1" => *MIDTERM_1.get(index)?,
        "Midterm 2" => *MIDTERM_2.get(index)?,
        "Final" => *FINAL.get(index)? / 200.0,
        _ => return None,
    };
    Some((fraction * 1000.0).round() / 10.0)
}

pub struct WspcpLoader {
    dir: PathBuf,
    study: StudyInfo,
}

impl WspcpLoader {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            study: StudyInfo {
                id: STUDY.to_string(),
                title: "Wearable Stress and Affect Detection During Exams".to_string(),
                author: "Rafiul et al.".to_string(),
                date: "2022-03-10".to_string(),
                tz: chrono_tz::UTC,
            },
        }
    }

    fn upload_exam(
        &self,
        participant: &Participant,
        exam: &str,
        ctx: &mut StudyContext<'_>,
    ) -> Result<()> {
        let exam_dir = self.dir.join(DATA_DIR).join(&participant.raw_id).join(exam);
        if !exam_dir.is_dir() {
            tracing::warn!(participant = %participant.raw_id, exam, "no recording for exam");
            return Ok(());
        }
        let grade = grade(exam, &participant.raw_id);
        if grade.is_none() {
            tracing::warn!(participant = %participant.raw_id, exam, "no grade on record");
        }

        let device = ctx.device(participant, DeviceModel::EmpaticaE4)?;
        let mut graded = CodeableConcept::code(exam);
        if let Some(grade) = grade {
            graded.coding.push(Coding::code(grade.to_string()));
        }

        let mut members = Vec::new();
        for (name, series) in empatica::read_dir(&exam_dir)? {
            if series.is_empty() {
                continue;
            }
            if name == empatica::TAGS {
                let metric = device.metric_reference(empatica::TAGS);
                for sample in series.samples() {
                    let mut press = ctx.encoder.observation(
                        participant,
                        Some("E4-tags"),
                        CodeableConcept::code(exam),
                        None,
                    );
                    press.effective_date_time = Some(ctx.encoder.instant(sample.timestamp));
                    press.value = Some(ObservationValue::ValueBoolean(true));
                    press.device = metric.clone();
                    let reference = ctx.create(&mut press)?;
                    ctx.registry
                        .entry(&participant.raw_id)
                        .add_device_observation(device.id(), reference.clone());
                    members.push(reference);
                }
                continue;
            }
            let key = name.to_lowercase();
            members.push(upload_device_slice(ctx, participant, &device, &key, &series, graded.clone())?);
        }

        let mut outcome = ctx.encoder.observation(participant, None, CodeableConcept::code(exam), None);
        outcome.value = grade.map(|g| ObservationValue::ValueQuantity(Quantity::new(g, "%")));
        outcome.has_member = members;
        let reference = ctx.create(&mut outcome)?;
        ctx.registry
            .entry(&participant.raw_id)
            .add_reference_observation(reference);
        Ok(())
    }
}

impl DatasetLoader for WspcpLoader {
    fn study(&self) -> &StudyInfo {
        &self.study
    }

    fn participants(&self) -> Result<Vec<Participant>> {
        Ok(subdirectories(&self.dir.join(DATA_DIR))?
            .into_iter()
            .map(|raw| Participant::new(STUDY, raw))
            .collect())
    }

    fn body_structures(&self, participant: &Participant) -> Vec<BodyStructure> {
        vec![body_structure(STUDY, participant, "dominant-wrist", "Dominant Wrist", "Dominant wrist")]
    }

    fn register_devices(
        &self,
        participant: &Participant,
        body_structures: &[BodyStructure],
    ) -> Result<DeviceRegistration> {
        worn_devices(STUDY, participant, body_structures, &[(DeviceModel::EmpaticaE4, "dominant-wrist")])
    }

    fn prepare(&mut self, ctx: &mut StudyContext<'_>) -> Result<()> {
        upload_catalog(ctx, &[DeviceModel::EmpaticaE4], &[])
    }

    fn read_participant(&mut self, participant: &Participant, ctx: &mut StudyContext<'_>) -> Result<()> {
        for exam in EXAMS {
            self.upload_exam(participant, exam, ctx)?;
        }
        Ok(())
    }
}
