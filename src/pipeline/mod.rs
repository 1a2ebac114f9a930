//! Study lifecycle: the order in which a dataset's records reach the store.
//!
//! author → catalog → patients → body structures → devices, metrics and
//! associations → group → participant data → evidence report → research study
//!
//! Each step only links to records uploaded by an earlier step, so a store
//! enforcing referential integrity accepts every write.

pub mod registry;
pub mod report;
pub mod sequencer;

pub use registry::{ParticipantRecords, StudyRegistry};
pub use report::build_evidence_report;
pub use sequencer::UploadSequencer;

use crate::catalog::{questionnaire_url, DeviceInstance, DeviceModel};
use crate::core::encoder::sanitize_id;
use crate::core::{FeatureConfig, FeatureDeriver, Participant, RecordEncoder};
use crate::error::{IngestError, Result};
use crate::fhir::{
    BodyStructure, CodeableConcept, DeviceAssociation, Group, GroupMember, HumanName,
    Practitioner, Record, Reference, Resource, ResearchStudy,
};
use crate::ledger::RunLedger;
use crate::store::ResourceStore;
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bibliographic facts about a dataset.
#[derive(Debug, Clone)]
pub struct StudyInfo {
    /// Study id, used as the prefix of every record id
    pub id: String,
    pub title: String,
    pub author: String,
    pub date: String,
    /// Wall clock of the recordings
    pub tz: Tz,
}

/// Devices worn by one participant and where they were worn.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistration {
    pub instances: Vec<DeviceInstance>,
    /// Associations keyed by the device they link, see [`device_association`].
    pub associations: Vec<DeviceAssociation>,
}

/// An association between a participant, a device and a body site.
///
/// The id derives from the device id, which already names the study and the
/// participant, so a rerun overwrites the association instead of adding one.
pub fn device_association(
    participant: &Participant,
    device: Reference,
    body_structure: Option<Reference>,
) -> DeviceAssociation {
    DeviceAssociation {
        id: Some(association_id(device.id())),
        status: CodeableConcept::code("completed"),
        subject: participant.reference.clone(),
        device,
        body_structure,
    }
}

pub fn association_id(device_id: &str) -> String {
    sanitize_id(&format!("{device_id}-association"))
}

/// Dataset-specific reading and encoding. The pipeline drives the lifecycle.
pub trait DatasetLoader {
    fn study(&self) -> &StudyInfo;

    /// Participants found in the dataset, in processing order.
    fn participants(&self) -> Result<Vec<Participant>>;

    fn body_structures(&self, participant: &Participant) -> Vec<BodyStructure>;

    /// Device instances and associations. `body_structures` have ids.
    fn register_devices(
        &self,
        participant: &Participant,
        body_structures: &[BodyStructure],
    ) -> Result<DeviceRegistration>;

    /// Upload catalog resources the dataset's records link to.
    fn prepare(&mut self, ctx: &mut StudyContext<'_>) -> Result<()>;

    /// Read, align, encode and upload one participant's data.
    fn read_participant(&mut self, participant: &Participant, ctx: &mut StudyContext<'_>) -> Result<()>;
}

/// State shared by the loader and the pipeline during one run.
pub struct StudyContext<'a> {
    pub encoder: RecordEncoder,
    pub registry: StudyRegistry,
    pub deriver: FeatureDeriver,
    sequencer: UploadSequencer<'a>,
}

impl<'a> StudyContext<'a> {
    pub fn new(
        study: &StudyInfo,
        store: &'a mut dyn ResourceStore,
        features: FeatureConfig,
        ledger: Option<&'a RunLedger>,
    ) -> Self {
        Self {
            encoder: RecordEncoder::new(study.id.clone(), study.tz),
            registry: StudyRegistry::default(),
            deriver: FeatureDeriver::new(features),
            sequencer: UploadSequencer::new(store, ledger),
        }
    }

    pub fn create<R: Resource>(&mut self, resource: &mut R) -> Result<Reference> {
        self.sequencer.create(resource)
    }

    pub fn create_record(&mut self, record: &Record) -> Result<String> {
        self.sequencer.create_record(record)
    }

    pub fn update<R: Resource>(&mut self, resource: &R) -> Result<()> {
        self.sequencer.update(resource)
    }

    pub fn base_url(&self) -> &str {
        self.sequencer.base_url()
    }

    pub fn questionnaire_url(&self, id: &str) -> String {
        questionnaire_url(self.base_url(), id)
    }

    /// The participant's instance of a device model, once registered.
    pub fn device(&self, participant: &Participant, model: DeviceModel) -> Result<DeviceInstance> {
        self.registry
            .get(&participant.raw_id)
            .and_then(|records| records.device(model))
            .cloned()
            .ok_or_else(|| {
                IngestError::Dataset(format!(
                    "{model:?} is not registered for participant {}",
                    participant.raw_id
                ))
            })
    }
}

/// Knobs for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    pub features: FeatureConfig,
    pub ledger: Option<&'a RunLedger>,
    /// Cleared by a Ctrl+C handler; checked between participants.
    pub running: Option<Arc<AtomicBool>>,
    /// Only process these raw participant ids.
    pub only: Option<Vec<String>>,
}

/// Result of a study run.
#[derive(Debug)]
pub struct StudyOutcome {
    pub study: String,
    pub completed: Vec<String>,
    pub failed: Vec<IngestError>,
    pub interrupted: bool,
    /// Record ids handed out by the encoder
    pub ids_issued: u64,
}

impl StudyOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}

/// Ingest one dataset into a store.
///
/// Study-level uploads (author, catalog, patients, devices, group, report)
/// abort the run on failure. A failing participant is logged and skipped so
/// the others still land; rerunning is safe because ids are deterministic
/// and writes are upserts.
pub fn run_study(
    loader: &mut dyn DatasetLoader,
    store: &mut dyn ResourceStore,
    options: RunOptions<'_>,
) -> Result<StudyOutcome> {
    let study = loader.study().clone();
    let mut ctx = StudyContext::new(&study, store, options.features.clone(), options.ledger);
    tracing::info!(study = %study.id, title = %study.title, "Starting study run");

    let mut author = Practitioner {
        id: Some(format!("{}-author", study.id)),
        name: vec![HumanName {
            use_: Some("usual".to_string()),
            text: Some(study.author.clone()),
        }],
    };
    ctx.create(&mut author)?;

    loader.prepare(&mut ctx)?;

    let mut participants = loader.participants()?;
    if let Some(only) = &options.only {
        participants.retain(|p| only.iter().any(|id| id == &p.raw_id));
    }
    tracing::info!(count = participants.len(), "Participants found");

    for participant in &mut participants {
        ctx.create(&mut participant.patient)?;
        ctx.registry.entry(&participant.raw_id);
    }

    for participant in &participants {
        let mut structures = loader.body_structures(participant);
        for structure in &mut structures {
            ctx.create(structure)?;
        }

        let registration = loader.register_devices(participant, &structures)?;
        for mut instance in registration.instances {
            ctx.create(&mut instance.device)?;
            for part in &mut instance.parts {
                ctx.create(part)?;
            }
            for metric in &mut instance.metrics {
                ctx.create(metric)?;
            }
            ctx.registry.entry(&participant.raw_id).add_device(instance);
        }
        for mut association in registration.associations {
            let reference = ctx.create(&mut association)?;
            ctx.registry
                .entry(&participant.raw_id)
                .add_device_association(reference);
        }
    }

    let mut group = Group {
        id: Some(format!("{}-group", study.id)),
        membership: "definitional".to_string(),
        type_: "person".to_string(),
        member: participants
            .iter()
            .map(|p| GroupMember {
                entity: p.reference.clone(),
            })
            .collect(),
    };
    ctx.create(&mut group)?;

    let mut outcome = StudyOutcome {
        study: study.id.clone(),
        completed: Vec::new(),
        failed: Vec::new(),
        interrupted: false,
        ids_issued: 0,
    };

    for participant in &participants {
        if let Some(running) = &options.running {
            if !running.load(Ordering::SeqCst) {
                tracing::warn!("Stop requested, skipping remaining participants");
                outcome.interrupted = true;
                break;
            }
        }

        tracing::info!(participant = %participant.raw_id, "Processing participant");
        match loader.read_participant(participant, &mut ctx) {
            Ok(()) => {
                if let Some(ledger) = options.ledger {
                    ledger.record_participant_completed();
                }
                outcome.completed.push(participant.raw_id.clone());
            }
            Err(e) => {
                tracing::error!(participant = %participant.raw_id, "Participant aborted: {e}");
                if let Some(ledger) = options.ledger {
                    ledger.record_participant_failed();
                }
                outcome.failed.push(IngestError::Participant {
                    participant: participant.raw_id.clone(),
                    source: Box::new(e),
                });
            }
        }
    }

    let mut report = build_evidence_report(&study.id, &ctx.registry);
    let report_reference = ctx.create(&mut report)?;

    let mut research_study = ResearchStudy {
        id: Some(study.id.clone()),
        title: Some(study.title.clone()),
        status: "active".to_string(),
        date: Some(study.date.clone()),
        result: vec![report_reference],
    };
    ctx.create(&mut research_study)?;

    outcome.ids_issued = ctx.encoder.ids().issued();
    tracing::info!(
        study = %study.id,
        completed = outcome.completed.len(),
        failed = outcome.failed.len(),
        "Study run finished"
    );
    Ok(outcome)
}
