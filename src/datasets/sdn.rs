//! SDN: Empatica E4 shifts of hospital nurses with self-reported stress events.
//!
//! Layout:
//!
//! ```text
//! <dir>/SurveyResults.csv                     one row per reported stress event
//! <dir>/Stress_dataset/<ID>/<ID>_<epoch>.zip  one E4 export per recording session
//! ```
//!
//! Survey rows are wall-clock windows on the nurses' local time. Every chunk
//! yields device observations, one questionnaire response per survey answer,
//! derived feature observations and a `stress` reference observation that
//! holds the device observations and responses.

use super::{body_structure, subdirectories, upload_catalog, upload_device_slice, worn_devices};
use crate::catalog::{display_item, DeviceInstance, DeviceModel};
use crate::core::{Chunk, Participant, TimedLabel, TimestampAligner, UNLABELED};
use crate::error::{IngestError, Result};
use crate::fhir::{
    AnswerOption, AnswerValue, BodyStructure, CodeableConcept, ObservationValue, Questionnaire,
    QuestionnaireResponse, ResponseAnswer, ResponseItem,
};
use crate::pipeline::{DatasetLoader, DeviceRegistration, StudyContext, StudyInfo};
use crate::reader::empatica;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const STUDY: &str = "SDN";
const SURVEY_FILE: &str = "SurveyResults.csv";
const SENSOR_DIR: &str = "Stress_dataset";
const QUESTIONNAIRE_ID: &str = "SDN-stress-entry-qualifier";
/// First survey column holding a questionnaire answer.
const FIRST_QUESTION: &str = "COVID related";

/// One reported stress event.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyEntry {
    pub participant: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stress_level: String,
    pub answers: Vec<String>,
}

/// Parsed survey: question texts and events in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Survey {
    pub questions: Vec<String>,
    pub entries: Vec<SurveyEntry>,
}

impl Survey {
    /// Label windows of one participant. A window's label is the index of
    /// its survey entry.
    pub fn labels_for(&self, participant: &str) -> Vec<TimedLabel> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.participant == participant)
            .map(|(i, e)| TimedLabel {
                start: e.start,
                end: e.end,
                label: i as i64,
            })
            .collect()
    }

    pub fn entry(&self, label: i64) -> Option<&SurveyEntry> {
        usize::try_from(label).ok().and_then(|i| self.entries.get(i))
    }
}

pub fn read_survey(path: &Path, tz: Tz) -> Result<Survey> {
    let content = std::fs::read_to_string(path)?;
    parse_survey(&content, tz).map_err(|e| match e {
        IngestError::Parse { message, .. } => IngestError::parse(path.display(), message),
        other => other,
    })
}

/// Parse the survey export. Rows whose times cannot be read are logged and skipped.
pub fn parse_survey(content: &str, tz: Tz) -> Result<Survey> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| IngestError::parse(SURVEY_FILE, format!("missing column '{name}'")))
    };
    let id = column("ID")?;
    let start_col = column("Start time")?;
    let end_col = column("End time")?;
    let date = column("date")?;
    let stress = column("Stress level")?;
    let first_question = column(FIRST_QUESTION).unwrap_or(stress + 1);

    let mut survey = Survey {
        questions: headers[first_question.min(headers.len())..].to_vec(),
        entries: Vec::new(),
    };

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let window = local_time(&field(date), &field(start_col), tz)
            .zip(local_time(&field(date), &field(end_col), tz));
        let Some((start, mut end)) = window else {
            tracing::warn!(row = row + 1, "survey row has unreadable times, skipping");
            continue;
        };
        // windows crossing midnight end on the next day
        if end < start {
            end += Duration::days(1);
        }
        survey.entries.push(SurveyEntry {
            participant: field(id),
            start,
            end,
            stress_level: field(stress),
            answers: (first_question..headers.len()).map(field).collect(),
        });
    }
    Ok(survey)
}

/// Local `date` + `time` on the study clock, as UTC.
fn local_time(date: &str, time: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()?;
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn question_link_id(index: usize) -> String {
    format!("{STUDY}-questionnaire-{:02}", index + 1)
}

/// Stress-entry questionnaire built from the survey's question columns.
pub fn survey_questionnaire(survey: &Survey) -> Questionnaire {
    let options = vec![
        AnswerOption {
            value: AnswerValue::ValueInteger(0),
        },
        AnswerOption {
            value: AnswerValue::ValueInteger(1),
        },
        AnswerOption {
            value: AnswerValue::ValueString("na.".to_string()),
        },
    ];
    Questionnaire {
        id: Some(QUESTIONNAIRE_ID.to_string()),
        title: Some("Stress entry qualifier".to_string()),
        status: "active".to_string(),
        item: survey
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| display_item(question_link_id(i), q, options.clone()))
            .collect(),
    }
}

pub struct SdnLoader {
    dir: PathBuf,
    study: StudyInfo,
    survey: Survey,
}

impl SdnLoader {
    pub fn new(dir: &Path) -> Result<Self> {
        let tz = chrono_tz::US::Central;
        let survey = read_survey(&dir.join(SURVEY_FILE), tz)?;
        tracing::info!(entries = survey.entries.len(), questions = survey.questions.len(), "Survey loaded");
        Ok(Self {
            dir: dir.to_path_buf(),
            study: StudyInfo {
                id: STUDY.to_string(),
                title: "Stress Detection in Nurses".to_string(),
                author: "Hosseini et al.".to_string(),
                date: "2022-06".to_string(),
                tz,
            },
            survey,
        })
    }

    /// Session bundles of a participant in recording order.
    fn bundles(&self, participant: &Participant) -> Result<Vec<PathBuf>> {
        let dir = self.dir.join(SENSOR_DIR).join(&participant.raw_id);
        let mut bundles: Vec<(i64, PathBuf)> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "zip"))
            .map(|p| (bundle_epoch(&p).unwrap_or(i64::MAX), p))
            .collect();
        bundles.sort();
        Ok(bundles.into_iter().map(|(_, p)| p).collect())
    }

    fn upload_chunk(
        &self,
        participant: &Participant,
        device: &DeviceInstance,
        chunk: &Chunk,
        ctx: &mut StudyContext<'_>,
    ) -> Result<()> {
        let mut members = Vec::new();
        let mut sources = BTreeMap::new();
        for (name, slice) in &chunk.slices {
            let key = name.to_lowercase();
            let reference = upload_device_slice(
                ctx,
                participant,
                device,
                &key,
                slice,
                CodeableConcept::code(name),
            )?;
            sources.insert(key, reference.clone());
            members.push(reference);
        }

        let entry = self.survey.entry(chunk.label);
        let mut responses = Vec::new();
        for (i, answer) in entry.map(|e| e.answers.as_slice()).unwrap_or_default().iter().enumerate() {
            if answer.is_empty() {
                continue;
            }
            let mut response = QuestionnaireResponse::completed(ctx.questionnaire_url(QUESTIONNAIRE_ID));
            response.id = Some(ctx.encoder.next_id(participant, Some("qr")));
            response.source = Some(participant.reference.clone());
            response.item = vec![ResponseItem {
                link_id: question_link_id(i),
                text: None,
                answer: vec![ResponseAnswer {
                    value: AnswerValue::ValueString(answer.clone()),
                }],
            }];
            let reference = ctx.create(&mut response)?;
            ctx.registry
                .entry(&participant.raw_id)
                .add_questionnaire_response(reference.clone());
            members.push(reference);
            responses.push(response);
        }

        let features = ctx.deriver.derive(&chunk.slices);
        for mut estimated in ctx.encoder.feature_observations(participant, &features, &sources)? {
            let reference = ctx.create(&mut estimated)?;
            ctx.registry
                .entry(&participant.raw_id)
                .add_estimated_observation(reference);
        }

        let mut label = ctx.encoder.observation(
            participant,
            None,
            CodeableConcept::code("stress"),
            Some((chunk.start, chunk.end)),
        );
        let level = entry
            .map(|e| e.stress_level.clone())
            .unwrap_or_else(|| UNLABELED.to_string());
        label.value = Some(ObservationValue::ValueString(level));
        label.has_member = members;
        let label_ref = ctx.create(&mut label)?;
        ctx.registry
            .entry(&participant.raw_id)
            .add_reference_observation(label_ref.clone());

        for response in &mut responses {
            response.part_of = vec![label_ref.clone()];
            ctx.update(response)?;
        }
        Ok(())
    }
}

/// Epoch seconds in a bundle name such as `5C_1586949022.zip`.
fn bundle_epoch(path: &Path) -> Option<i64> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('_').next()?.parse().ok()
}

impl DatasetLoader for SdnLoader {
    fn study(&self) -> &StudyInfo {
        &self.study
    }

    fn participants(&self) -> Result<Vec<Participant>> {
        Ok(subdirectories(&self.dir.join(SENSOR_DIR))?
            .into_iter()
            .map(|raw| Participant::new(STUDY, raw))
            .collect())
    }

    fn body_structures(&self, participant: &Participant) -> Vec<BodyStructure> {
        vec![body_structure(
            STUDY,
            participant,
            "dominant-wrist",
            "Dominant Wrist",
            "Dominant wrist",
        )]
    }

    fn register_devices(
        &self,
        participant: &Participant,
        body_structures: &[BodyStructure],
    ) -> Result<DeviceRegistration> {
        worn_devices(
            STUDY,
            participant,
            body_structures,
            &[(DeviceModel::EmpaticaE4, "dominant-wrist")],
        )
    }

    fn prepare(&mut self, ctx: &mut StudyContext<'_>) -> Result<()> {
        upload_catalog(ctx, &[DeviceModel::EmpaticaE4], &[])?;
        ctx.create(&mut survey_questionnaire(&self.survey))?;
        Ok(())
    }

    fn read_participant(&mut self, participant: &Participant, ctx: &mut StudyContext<'_>) -> Result<()> {
        let labels = self.survey.labels_for(&participant.raw_id);
        if labels.is_empty() {
            tracing::warn!(participant = %participant.raw_id, "no survey entries for participant");
        }
        let device = ctx.device(participant, DeviceModel::EmpaticaE4)?;

        for bundle in self.bundles(participant)? {
            let modalities = match empatica::read_zip(&bundle) {
                Ok(modalities) => modalities,
                Err(e) => {
                    tracing::warn!(bundle = %bundle.display(), "skipping unreadable bundle: {e}");
                    continue;
                }
            };
            tracing::debug!(bundle = %bundle.display(), modalities = modalities.len(), "Bundle read");
            for chunk in TimestampAligner::new(&modalities, &labels).chunks(&participant.raw_id) {
                self.upload_chunk(participant, &device, &chunk, ctx)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::FeatureConfig;
    use crate::pipeline::{run_study, RunOptions};
    use crate::store::MemoryStore;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// 2020-04-15 12:00:00 UTC, 07:00 in Houston.
    const START: i64 = 1_586_952_000;

    pub(crate) const SURVEY: &str = "ID,Start time,End time,date,Stress level,COVID related,Treating a covid patient,Patient in Crisis\n\
        5C,07:00:10,07:00:40,2020-04-15,2,1,0,na.\n\
        5C,09:00:00,09:10:00,2020-04-15,na,,,\n\
        7A,23:50:00,00:10:00,2020-04-15,1,0,0,0\n";

    fn fixed_rate(start: i64, hz: f64, rows: usize, value: impl Fn(usize) -> f64) -> String {
        let mut csv = format!("{start}.000000\n{hz:.6}\n");
        for i in 0..rows {
            csv.push_str(&format!("{}\n", value(i)));
        }
        csv
    }

    /// One minute of EDA, TEMP and HR plus two tags.
    pub(crate) fn write_dataset(root: &Path) {
        std::fs::write(root.join(SURVEY_FILE), SURVEY).unwrap();
        let dir = root.join(SENSOR_DIR).join("5C");
        std::fs::create_dir_all(&dir).unwrap();

        let file = std::fs::File::create(dir.join(format!("5C_{START}.zip"))).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        let files = [
            ("EDA.csv", fixed_rate(START, 4.0, 240, |i| 0.2 + ((i % 20) as f64 - 10.0).abs() * 0.01)),
            ("TEMP.csv", fixed_rate(START, 4.0, 240, |i| 33.0 + i as f64 * 0.001)),
            ("HR.csv", fixed_rate(START, 1.0, 60, |i| 70.0 + (i % 5) as f64)),
            ("tags.csv", format!("{}.250000\n{}.250000\n", START + 5, START + 20)),
        ];
        for (name, content) in files {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_parse_survey_on_local_clock() {
        let survey = parse_survey(SURVEY, chrono_tz::US::Central).unwrap();
        assert_eq!(
            survey.questions,
            vec!["COVID related", "Treating a covid patient", "Patient in Crisis"]
        );
        assert_eq!(survey.entries.len(), 3);
        let first = &survey.entries[0];
        assert_eq!(first.participant, "5C");
        assert_eq!(first.start.timestamp(), START + 10);
        assert_eq!(first.end.timestamp(), START + 40);
        assert_eq!(first.stress_level, "2");
        assert_eq!(first.answers, vec!["1", "0", "na."]);

        // crosses midnight
        let late = &survey.entries[2];
        assert_eq!((late.end - late.start).num_minutes(), 20);

        let labels = survey.labels_for("5C");
        assert_eq!(labels.iter().map(|l| l.label).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_survey_requires_columns() {
        let err = parse_survey("ID,date\n5C,2020-04-15\n", chrono_tz::US::Central).unwrap_err();
        assert!(err.to_string().contains("Start time"));
    }

    #[test]
    fn test_questionnaire_from_header() {
        let survey = parse_survey(SURVEY, chrono_tz::US::Central).unwrap();
        let questionnaire = survey_questionnaire(&survey);
        assert_eq!(questionnaire.item.len(), 3);
        assert_eq!(questionnaire.item[2].link_id, "SDN-questionnaire-03");
        assert_eq!(questionnaire.item[0].answer_option.len(), 3);
    }

    #[test]
    fn test_bundle_epoch() {
        assert_eq!(bundle_epoch(Path::new("x/5C_1586949022.zip")), Some(1_586_949_022));
        assert_eq!(bundle_epoch(Path::new("x/notes.zip")), None);
    }

    #[test]
    fn test_chunks_link_responses_features_and_labels() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());

        let mut loader = SdnLoader::new(dir.path()).unwrap();
        let mut store = MemoryStore::strict();
        let options = RunOptions {
            features: FeatureConfig {
                window: 5,
                lags: 2,
                min_peak_width: 1.0,
            },
            ..Default::default()
        };
        let outcome = run_study(&mut loader, &mut store, options).unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.failed);

        // before, during and after the survey window
        let labels: Vec<_> = store
            .ids("Observation")
            .into_iter()
            .filter_map(|id| store.get("Observation", id))
            .filter(|o| o["code"]["coding"][0]["code"] == "stress")
            .collect();
        assert_eq!(labels.len(), 3);
        let labelled = labels
            .iter()
            .find(|o| o["valueString"] == "2")
            .expect("labelled chunk");
        let members = labelled["hasMember"].as_array().unwrap();
        // EDA, TEMP, HR, tags and three answers
        assert_eq!(members.len(), 7);

        let responses = store.ids("QuestionnaireResponse");
        assert_eq!(responses.len(), 3);
        for id in responses {
            let response = store.get("QuestionnaireResponse", id).unwrap();
            assert_eq!(response["partOf"][0]["reference"], labelled_reference(labelled));
        }

        let estimated = store
            .ids("Observation")
            .into_iter()
            .filter(|id| id.contains("eda-mean"))
            .count();
        assert!(estimated >= 1);
    }

    fn labelled_reference(observation: &serde_json::Value) -> String {
        format!("Observation/{}", observation["id"].as_str().unwrap())
    }
}
