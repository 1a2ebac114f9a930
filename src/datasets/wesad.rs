//! WESAD: wrist and chest recordings of a laboratory stress protocol.
//!
//! Layout per participant `S`:
//!
//! ```text
//! <dir>/S/S.json         signal archive with a 700 Hz label column
//! <dir>/S/S_quest.csv    session schedule and self-report answers
//! <dir>/S/S_readme.txt   personal information and study prerequisites
//! ```
//!
//! Sessions become reference observations; every labelled run inside a
//! session (or between sessions) becomes a parent observation holding one
//! observation per device channel. Self reports are linked to the session
//! they were answered in.

use super::{body_structure, subdirectories, upload_catalog, upload_device_slice, worn_devices};
use crate::catalog::{display_item, DeviceInstance, DeviceModel, Instrument};
use crate::core::encoder::sanitize_id;
use crate::core::{partition_sessions, BlockKind, IndexAligner, Participant, Session};
use crate::error::{IngestError, Result};
use crate::fhir::{
    AnswerOption, AnswerValue, CodeableConcept, Coding, Narrative, Observation, ObservationValue,
    Quantity, Questionnaire, QuestionnaireResponse, Range, Reference, ResponseAnswer, ResponseItem,
};
use crate::pipeline::{DatasetLoader, DeviceRegistration, StudyContext, StudyInfo};
use crate::reader::{read_archive, ModalitySet};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};

const STUDY: &str = "WESAD";

/// Rate of the label column and of the session schedule indices.
const SCHEDULE_RATE: usize = 700;

/// Session whose questionnaires include the SSSQ.
pub const STRESS_SESSION: &str = "TSST";

const PREREQUISITES_ID: &str = "WESAD-study-prerequisites";

const PREREQUISITE_QUESTIONS: [&str; 6] = [
    "Did you drink coffee today?",
    "Did you drink coffee within the last hour?",
    "Did you do any sports today?",
    "Are you a smoker?",
    "Did you smoke within the last hour?",
    "Do you feel ill today?",
];

const LABEL_NAMES: [&str; 8] = [
    "not defined / transient",
    "baseline",
    "stress",
    "amusement",
    "meditation",
    "ignore-1",
    "ignore-2",
    "ignore-3",
];

/// Archives carry no wall clock; times count from the recording start.
const RECORDING_ORIGIN: DateTime<Utc> = DateTime::UNIX_EPOCH;

const WRIST: &str = "wrist";
const CHEST: &str = "chest";

/// Protocol condition of a label code.
pub fn label_name(label: i64) -> &'static str {
    usize::try_from(label)
        .ok()
        .and_then(|i| LABEL_NAMES.get(i))
        .copied()
        .unwrap_or("unlabeled")
}

pub struct WesadLoader {
    dir: PathBuf,
    study: StudyInfo,
}

impl WesadLoader {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            study: StudyInfo {
                id: STUDY.to_string(),
                title: "Wearable Stress and Affect Detection".to_string(),
                author: "Schmidt et al.".to_string(),
                date: "2018-10-16".to_string(),
                tz: chrono_tz::UTC,
            },
        }
    }

    fn participant_file(&self, participant: &Participant, suffix: &str) -> PathBuf {
        self.dir
            .join(&participant.raw_id)
            .join(format!("{}{suffix}", participant.raw_id))
    }

    fn read_readme(&self, participant: &Participant, ctx: &mut StudyContext<'_>) -> Result<()> {
        let path = self.participant_file(participant, "_readme.txt");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), "no readme for participant: {e}");
                return Ok(());
            }
        };
        let readme = parse_readme(&content);

        let personal = personal_line_pattern()?;
        for line in &readme.personal {
            let Some((coding, value)) = personal_value(&personal, line) else {
                tracing::warn!(participant = %participant.raw_id, line = %line.trim(), "unrecognised personal information");
                continue;
            };
            let mut obs = ctx.encoder.observation(participant, None, coding.into(), None);
            obs.value = Some(value);
            let reference = ctx.create(&mut obs)?;
            ctx.registry.entry(&participant.raw_id).add_observation(reference);
        }

        let prerequisite = prerequisite_line_pattern()?;
        for line in &readme.prerequisites {
            let Some((question, answer)) = prerequisite_answer(&prerequisite, line) else {
                tracing::warn!(participant = %participant.raw_id, line = %line.trim(), "unrecognised study prerequisite");
                continue;
            };
            let mut response =
                QuestionnaireResponse::completed(ctx.questionnaire_url(PREREQUISITES_ID));
            response.id = Some(ctx.encoder.next_id(participant, Some("study-prerequisite")));
            response.source = Some(participant.reference.clone());
            response.item = vec![ResponseItem {
                link_id: prerequisite_link_id(question),
                text: None,
                answer: vec![ResponseAnswer {
                    value: AnswerValue::ValueString(answer),
                }],
            }];
            let reference = ctx.create(&mut response)?;
            ctx.registry
                .entry(&participant.raw_id)
                .add_questionnaire_response(reference);
        }

        if !readme.notes.is_empty() {
            let mut obs = ctx.encoder.observation(
                participant,
                None,
                Coding::loinc("48767-8", "Annotation").into(),
                None,
            );
            obs.value = Some(ObservationValue::ValueString(readme.notes.join("\n")));
            let reference = ctx.create(&mut obs)?;
            ctx.registry.entry(&participant.raw_id).add_observation(reference);
        }
        Ok(())
    }

    fn upload_answers(
        &self,
        participant: &Participant,
        quest: &str,
        sessions: &mut SessionRecords,
        ctx: &mut StudyContext<'_>,
    ) -> Result<()> {
        for instrument in Instrument::ALL {
            let lines = questionnaire_lines(quest, instrument);
            let targets: Vec<usize> = if instrument == Instrument::Sssq {
                match sessions.position(STRESS_SESSION) {
                    Some(stress) => vec![stress; lines.len()],
                    None => {
                        tracing::warn!(participant = %participant.raw_id, "no stress session for SSSQ answers");
                        continue;
                    }
                }
            } else {
                (0..sessions.sessions.len()).collect()
            };

            for (fields, target) in lines.iter().zip(targets) {
                let session = &sessions.schedule[target].name;
                let session_ref = Reference::to(&sessions.sessions[target])?;
                for (item, value) in answers(instrument, session, fields) {
                    let Some(link_id) = instrument.link_id(item) else {
                        tracing::warn!(questionnaire = instrument.id(), item, "answer past the last item");
                        continue;
                    };
                    let mut response =
                        QuestionnaireResponse::completed(ctx.questionnaire_url(instrument.id()));
                    response.id = Some(ctx.encoder.next_id(participant, Some("questionnaire-response")));
                    response.source = Some(participant.reference.clone());
                    response.part_of = vec![session_ref.clone()];
                    response.item = vec![ResponseItem {
                        link_id,
                        text: None,
                        answer: vec![ResponseAnswer {
                            value: AnswerValue::ValueCoding(Coding::code(value.to_string())),
                        }],
                    }];
                    let reference = ctx.create(&mut response)?;
                    sessions.sessions[target].has_member.push(reference.clone());
                    ctx.registry
                        .entry(&participant.raw_id)
                        .add_questionnaire_response(reference);
                }
            }
        }
        Ok(())
    }

    fn upload_chunks(
        &self,
        participant: &Participant,
        sessions: &mut SessionRecords,
        ctx: &mut StudyContext<'_>,
    ) -> Result<()> {
        let archive = read_archive(&self.participant_file(participant, ".json"), RECORDING_ORIGIN)?;
        let wrist = ctx.device(participant, DeviceModel::EmpaticaE4)?;
        let chest = ctx.device(participant, DeviceModel::RespiBan)?;

        let mut signals = ModalitySet::new();
        for (site, set) in [(WRIST, archive.wrist), (CHEST, archive.chest)] {
            for (name, series) in set {
                signals.insert(format!("{site}:{name}"), series);
            }
        }

        let aligner = IndexAligner::new(&signals, archive.label_rate);
        for block in partition_sessions(&sessions.schedule, archive.labels.len()) {
            for chunk in aligner.chunks_in(&participant.raw_id, &archive.labels, block.range.clone()) {
                let code = CodeableConcept::code(label_name(chunk.label));
                let mut members = Vec::with_capacity(chunk.slices.len());
                for (key, slice) in &chunk.slices {
                    let (site, modality) = key.split_once(':').unwrap_or((CHEST, key.as_str()));
                    let device: &DeviceInstance = if site == WRIST { &wrist } else { &chest };
                    members.push(upload_device_slice(
                        ctx,
                        participant,
                        device,
                        &modality.to_lowercase(),
                        slice,
                        code.clone(),
                    )?);
                }

                let mut parent =
                    ctx.encoder
                        .observation(participant, None, code, Some((chunk.start, chunk.end)));
                parent.value = Some(ObservationValue::ValueInteger(chunk.label));
                parent.has_member = members;
                let reference = ctx.create(&mut parent)?;
                ctx.registry
                    .entry(&participant.raw_id)
                    .add_reference_observation(reference.clone());
                sessions.owner(block.kind).has_member.push(reference);
            }
        }
        Ok(())
    }
}

impl DatasetLoader for WesadLoader {
    fn study(&self) -> &StudyInfo {
        &self.study
    }

    fn participants(&self) -> Result<Vec<Participant>> {
        Ok(subdirectories(&self.dir)?
            .into_iter()
            .map(|raw| Participant::new(STUDY, raw))
            .collect())
    }

    fn body_structures(&self, participant: &Participant) -> Vec<crate::fhir::BodyStructure> {
        vec![
            body_structure(STUDY, participant, "dominant-wrist", "Dominant Wrist", "Dominant wrist"),
            body_structure(STUDY, participant, "chest", "chest", "Chest"),
        ]
    }

    fn register_devices(
        &self,
        participant: &Participant,
        body_structures: &[crate::fhir::BodyStructure],
    ) -> Result<DeviceRegistration> {
        worn_devices(
            STUDY,
            participant,
            body_structures,
            &[
                (DeviceModel::EmpaticaE4, "dominant-wrist"),
                (DeviceModel::RespiBan, "chest"),
            ],
        )
    }

    fn prepare(&mut self, ctx: &mut StudyContext<'_>) -> Result<()> {
        upload_catalog(
            ctx,
            &[DeviceModel::EmpaticaE4, DeviceModel::RespiBan],
            &Instrument::ALL,
        )?;
        ctx.create(&mut prerequisites_questionnaire())?;
        Ok(())
    }

    fn read_participant(&mut self, participant: &Participant, ctx: &mut StudyContext<'_>) -> Result<()> {
        self.read_readme(participant, ctx)?;

        let quest_path = self.participant_file(participant, "_quest.csv");
        let quest = std::fs::read_to_string(&quest_path)?;
        let schedule = parse_schedule(&quest)
            .map_err(|message| IngestError::parse(quest_path.display(), message))?;

        // Sessions are created empty so answers can point at them, then
        // updated once their members exist.
        let mut sessions = SessionRecords::new(participant, schedule);
        let transient_ref = ctx.create(&mut sessions.transient)?;
        ctx.registry
            .entry(&participant.raw_id)
            .add_reference_observation(transient_ref);
        for session in &mut sessions.sessions {
            let reference = ctx.create(session)?;
            ctx.registry
                .entry(&participant.raw_id)
                .add_reference_observation(reference);
        }

        self.upload_answers(participant, &quest, &mut sessions, ctx)?;
        self.upload_chunks(participant, &mut sessions, ctx)?;

        ctx.update(&sessions.transient)?;
        for session in &sessions.sessions {
            ctx.update(session)?;
        }
        Ok(())
    }
}

/// Session observations of one participant, parallel to the schedule.
struct SessionRecords {
    schedule: Vec<Session>,
    transient: Observation,
    sessions: Vec<Observation>,
}

impl SessionRecords {
    fn new(participant: &Participant, schedule: Vec<Session>) -> Self {
        let mut transient = Observation::new(CodeableConcept {
            coding: vec![Coding::code("transient").with_display("transient")],
            text: Some("Session name: Transient".to_string()),
        });
        transient.id = Some(format!("{STUDY}-{}-TRANSIENT", participant.raw_id));
        transient.subject = Some(participant.reference.clone());
        transient.text = Some(Narrative::generated(
            "Catches all observations recorded between the protocol sessions.",
        ));

        let sessions = schedule
            .iter()
            .map(|session| session_observation(participant, session))
            .collect();
        Self {
            schedule,
            transient,
            sessions,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.schedule.iter().position(|s| s.name == name)
    }

    fn owner(&mut self, kind: BlockKind) -> &mut Observation {
        match kind {
            BlockKind::Session(i) if i < self.sessions.len() => &mut self.sessions[i],
            _ => &mut self.transient,
        }
    }
}

fn session_observation(participant: &Participant, session: &Session) -> Observation {
    let mut obs = Observation::new(CodeableConcept {
        coding: vec![Coding::code(&session.name).with_display(&session.name)],
        text: Some(format!("Session name: {}", session.name)),
    });
    obs.id = Some(sanitize_id(&format!(
        "{STUDY}-{}-{}",
        participant.raw_id,
        session.name.replace(' ', "-").to_uppercase()
    )));
    obs.subject = Some(participant.reference.clone());
    obs.text = Some(Narrative::generated(
        "Session start and end are sample indices of the 700 Hz recording, counted from its beginning.",
    ));
    obs.value = Some(ObservationValue::ValueRange(Range {
        low: Some(Quantity::new(session.start as f64, "1/700 s")),
        high: Some(Quantity::new(session.end as f64, "1/700 s")),
    }));
    obs
}

fn fields(line: &str) -> Vec<&str> {
    line.split(';').map(str::trim).collect()
}

/// `min.sec` schedule time as a 700 Hz sample index.
fn schedule_index(field: &str) -> Option<usize> {
    let field = field.trim();
    let (minutes, seconds) = field.split_once('.').unwrap_or((field, "0"));
    let seconds = minutes.parse::<usize>().ok()? * 60 + seconds.parse::<usize>().ok()?;
    Some(seconds * SCHEDULE_RATE)
}

/// Sessions from the `ORDER`, `START` and `END` lines of a quest file.
pub fn parse_schedule(quest: &str) -> std::result::Result<Vec<Session>, String> {
    let lines: Vec<&str> = quest.lines().take(4).collect();
    if lines.len() < 4 {
        return Err("schedule needs ORDER, START and END lines".to_string());
    }
    let names = fields(lines[1]);
    let starts = fields(lines[2]);
    let ends = fields(lines[3]);

    let mut sessions = Vec::new();
    for i in 1..names.len().min(6) {
        let name = names[i];
        if name.is_empty() {
            continue;
        }
        let start = starts.get(i).and_then(|f| schedule_index(f));
        let end = ends.get(i).and_then(|f| schedule_index(f));
        let (Some(start), Some(end)) = (start, end) else {
            return Err(format!("session {name} has no valid start and end"));
        };
        sessions.push(Session {
            name: name.to_string(),
            start,
            end,
        });
    }
    Ok(sessions)
}

/// Answer fields of every line of an instrument, in file order.
pub fn questionnaire_lines(quest: &str, instrument: Instrument) -> Vec<Vec<String>> {
    quest
        .lines()
        .filter_map(|line| {
            let fields = fields(line);
            let tag = fields.first()?.trim_start_matches('#');
            (Instrument::from_tag(tag) == Some(instrument))
                .then(|| fields[1..].iter().map(|f| f.to_string()).collect())
        })
        .collect()
}

/// `(item index, value)` pairs of one answer line.
///
/// Empty answers are skipped and non-numeric ones logged and skipped. PANAS
/// items 24 and 25 are only asked after the stress session, so elsewhere the
/// 24th answer belongs to item 26.
pub fn answers(instrument: Instrument, session: &str, fields: &[String]) -> Vec<(usize, i64)> {
    let mut out = Vec::new();
    for (mut item, field) in fields.iter().enumerate() {
        if field.is_empty() {
            continue;
        }
        let Ok(value) = field.parse::<i64>() else {
            tracing::warn!(questionnaire = instrument.id(), item, answer = %field, "inconsistent answer");
            continue;
        };
        if instrument == Instrument::Panas && session != STRESS_SESSION && item == 23 {
            item += 2;
        }
        out.push((item, value));
    }
    out
}

/// Sections of a participant readme.
#[derive(Debug, Default, PartialEq)]
pub struct Readme {
    pub personal: Vec<String>,
    pub prerequisites: Vec<String>,
    pub notes: Vec<String>,
}

pub fn parse_readme(content: &str) -> Readme {
    let mut readme = Readme::default();
    let mut current = &mut readme.personal;
    for line in content.lines() {
        if line.contains("Personal") {
            current = &mut readme.personal;
        } else if line.contains("Study") {
            current = &mut readme.prerequisites;
        } else if line.contains("Additional") {
            current = &mut readme.notes;
        } else if !line.trim().is_empty() {
            current.push(line.trim().to_string());
        }
    }
    readme
}

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| IngestError::Dataset(format!("bad pattern {source}: {e}")))
}

fn personal_line_pattern() -> Result<Regex> {
    pattern(r"^([a-zA-Z ]*)(|[()a-z]*): ([a-zA-Z\d.]*)")
}

fn prerequisite_line_pattern() -> Result<Regex> {
    pattern(r"^([a-zA-Z\s]*\?)\s*([a-zA-Z]*)")
}

/// LOINC coding and value of a personal information line such as `Height (cm): 175`.
fn personal_value(pattern: &Regex, line: &str) -> Option<(Coding, ObservationValue)> {
    let caps = pattern.captures(line.trim())?;
    let key = caps.get(1)?.as_str().trim();
    let unit = caps.get(2)?.as_str().trim_matches(|c| c == '(' || c == ')');
    let value = caps.get(3)?.as_str();

    let quantity = |unit: &str| -> Option<ObservationValue> {
        let value = value.parse::<f64>().ok()?;
        Some(ObservationValue::ValueQuantity(Quantity::new(value, unit)))
    };
    let text = || Some(ObservationValue::ValueString(value.to_string()));

    match key {
        "Age" => Some((Coding::loinc("30525", "Age"), quantity("years")?)),
        "Height" => Some((Coding::loinc("8303-0", "Body height"), quantity(unit)?)),
        "Weight" => Some((Coding::loinc("3142-7-0", "Body weight stated"), quantity(unit)?)),
        "Gender" => Some((Coding::loinc("72143-1", "Sex"), text()?)),
        "Dominant hand" => Some((Coding::loinc("66042-3", "Dominant hand"), text()?)),
        _ => None,
    }
}

/// Question index and answer of a prerequisite line.
fn prerequisite_answer(pattern: &Regex, line: &str) -> Option<(usize, String)> {
    let caps = pattern.captures(line.trim())?;
    let question = caps.get(1)?.as_str().trim();
    let answer = caps.get(2)?.as_str().to_string();
    let index = PREREQUISITE_QUESTIONS.iter().position(|q| *q == question)?;
    Some((index, answer))
}

fn prerequisite_link_id(index: usize) -> String {
    format!("{STUDY}-study-prerequisite-question-{:02}", index + 1)
}

/// Yes/no questions answered before the protocol.
pub fn prerequisites_questionnaire() -> Questionnaire {
    let options = vec![
        AnswerOption {
            value: AnswerValue::ValueString("YES".to_string()),
        },
        AnswerOption {
            value: AnswerValue::ValueString("NO".to_string()),
        },
    ];
    Questionnaire {
        id: Some(PREREQUISITES_ID.to_string()),
        title: Some("Study prerequisites".to_string()),
        status: "active".to_string(),
        item: PREREQUISITE_QUESTIONS
            .iter()
            .enumerate()
            .map(|(i, q)| display_item(prerequisite_link_id(i), q, options.clone()))
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::{run_study, RunOptions};
    use crate::store::MemoryStore;
    use serde_json::json;
    use tempfile::TempDir;

    const QUEST: &str = "# Subj;S2;;;;;\n\
        # ORDER;Base;TSST;;;;\n\
        # START;0.01;0.02;;;;\n\
        # END;0.02;0.03;;;;\n\
        ;;;;;;\n\
        # PANAS;1;2;3;4;5;1;2;3;4;5;1;2;3;4;5;1;2;3;4;5;1;2;3;4;;\n\
        # PANAS;1;2;3;4;5;1;2;3;4;5;1;2;3;4;5;1;2;3;4;5;1;2;3;4;5;1;\n\
        # STAI;1;2;x;4;;;\n\
        # STAI;4;3;2;1;4;3;\n\
        # DIM;5;3;;;\n\
        # DIM;8;7;;;\n\
        # SSSQ;1;2;3;4;5;;\n";

    const README: &str = "### Personal information ###\n\
        Age: 27\n\
        Height (cm): 175\n\
        Weight (kg): 80\n\
        Gender: male\n\
        Dominant hand: right\n\
        \n\
        ### Study pre-requisites ###\n\
        Did you drink coffee today? YES\n\
        Did you drink coffee within the last hour? NO\n\
        Did you do any sports today? NO\n\
        Are you a smoker? NO\n\
        Did you smoke within the last hour? NO\n\
        Do you feel ill today? NO\n\
        \n\
        ### Additional notes ###\n\
        Felt slightly cold during the baseline.\n";

    /// Four seconds of recording: label 0, 1, 2, 0 for one second each.
    pub(crate) fn write_participant(root: &Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        let mut labels = Vec::new();
        for label in [0, 1, 2, 0] {
            labels.extend(std::iter::repeat(label).take(700));
        }
        let archive = json!({
            "signal": {
                "wrist": {
                    "ACC": (0..128).map(|i| [i, i, i]).collect::<Vec<_>>(),
                    "EDA": (0..16).map(|i| i as f64 * 0.1).collect::<Vec<_>>(),
                    "TEMP": (0..16).map(|_| 33.5).collect::<Vec<_>>()
                },
                "chest": {
                    "ECG": (0..2800).map(|i| (i % 7) as f64).collect::<Vec<_>>()
                }
            },
            "label": labels
        });
        std::fs::write(dir.join(format!("{id}.json")), archive.to_string()).unwrap();
        std::fs::write(dir.join(format!("{id}_quest.csv")), QUEST).unwrap();
        std::fs::write(dir.join(format!("{id}_readme.txt")), README).unwrap();
    }

    #[test]
    fn test_parse_schedule() {
        let schedule = parse_schedule(QUEST).unwrap();
        assert_eq!(
            schedule,
            vec![
                Session {
                    name: "Base".into(),
                    start: 700,
                    end: 1400
                },
                Session {
                    name: "TSST".into(),
                    start: 1400,
                    end: 2100
                },
            ]
        );
        assert_eq!(schedule_index("7.08"), Some((7 * 60 + 8) * 700));
        assert_eq!(schedule_index("12"), Some(12 * 60 * 700));
        assert!(parse_schedule("# Subj;S2\n").is_err());
    }

    #[test]
    fn test_questionnaire_lines_and_answers() {
        let sam = questionnaire_lines(QUEST, Instrument::Sam);
        assert_eq!(sam.len(), 2);
        assert_eq!(answers(Instrument::Sam, "Base", &sam[0]), vec![(0, 5), (1, 3)]);

        let stai = questionnaire_lines(QUEST, Instrument::Stai);
        // the non-numeric third answer is skipped
        assert_eq!(
            answers(Instrument::Stai, "Base", &stai[0]),
            vec![(0, 1), (1, 2), (3, 4)]
        );
    }

    #[test]
    fn test_panas_item_correction_outside_stress_session() {
        let panas = questionnaire_lines(QUEST, Instrument::Panas);
        let base = answers(Instrument::Panas, "Base", &panas[0]);
        assert_eq!(base.len(), 24);
        assert_eq!(base.last(), Some(&(25, 4)));

        let stress = answers(Instrument::Panas, STRESS_SESSION, &panas[1]);
        assert_eq!(stress.len(), 26);
        assert_eq!(stress[23], (23, 4));
    }

    #[test]
    fn test_readme_sections_and_values() {
        let readme = parse_readme(README);
        assert_eq!(readme.personal.len(), 5);
        assert_eq!(readme.prerequisites.len(), 6);
        assert_eq!(readme.notes, vec!["Felt slightly cold during the baseline."]);

        let personal = personal_line_pattern().unwrap();
        let (coding, value) = personal_value(&personal, "Height (cm): 175").unwrap();
        assert_eq!(coding.code.as_deref(), Some("8303-0"));
        assert_eq!(value, ObservationValue::ValueQuantity(Quantity::new(175.0, "cm")));
        let (_, age) = personal_value(&personal, "Age: 27").unwrap();
        assert_eq!(age, ObservationValue::ValueQuantity(Quantity::new(27.0, "years")));
        let (_, hand) = personal_value(&personal, "Dominant hand: right").unwrap();
        assert_eq!(hand, ObservationValue::ValueString("right".into()));
        assert!(personal_value(&personal, "Shoe size: 44").is_none());

        let prerequisite = prerequisite_line_pattern().unwrap();
        assert_eq!(
            prerequisite_answer(&prerequisite, "Are you a smoker? NO"),
            Some((3, "NO".to_string()))
        );
        assert_eq!(prerequisite_link_id(3), "WESAD-study-prerequisite-question-04");
    }

    #[test]
    fn test_label_names() {
        assert_eq!(label_name(2), "stress");
        assert_eq!(label_name(7), "ignore-3");
        assert_eq!(label_name(-1), "unlabeled");
    }

    #[test]
    fn test_participant_records_link_sessions() {
        let dir = TempDir::new().unwrap();
        write_participant(dir.path(), "S2");

        let mut loader = WesadLoader::new(dir.path());
        let mut store = MemoryStore::strict();
        let outcome = run_study(&mut loader, &mut store, RunOptions::default()).unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.failed);

        let base = store.get("Observation", "WESAD-S2-BASE").unwrap();
        assert_eq!(base["valueRange"]["low"]["value"], json!(700.0));
        let members = base["hasMember"].as_array().unwrap();
        // PANAS (24), STAI (3), SAM (2) answers and one labelled run
        assert_eq!(members.len(), 24 + 3 + 2 + 1);

        let stress = store.get("Observation", "WESAD-S2-TSST").unwrap();
        let stress_members = stress["hasMember"].as_array().unwrap().len();
        // PANAS (26), STAI (6), SAM (2), SSSQ (5) and one labelled run
        assert_eq!(stress_members, 26 + 6 + 2 + 5 + 1);

        let transient = store.get("Observation", "WESAD-S2-TRANSIENT").unwrap();
        assert_eq!(transient["hasMember"].as_array().unwrap().len(), 2);

        let records = store.ids("QuestionnaireResponse");
        assert_eq!(records.len(), 6 + 24 + 26 + 3 + 6 + 2 + 2 + 5);
        assert!(store.get("Questionnaire", "WESAD-study-prerequisites").is_some());
        assert!(store.get("DeviceMetric", "WESAD-RespiBAN-S2-ecg-dm").is_some());
    }
}
