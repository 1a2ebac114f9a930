//! Per-participant index of uploaded records, read when building the
//! evidence report.

use crate::catalog::{DeviceInstance, DeviceModel};
use crate::fhir::Reference;

/// Everything uploaded for one participant, in upload order.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRecords {
    questionnaire_responses: Vec<Reference>,
    observations: Vec<Reference>,
    reference_observations: Vec<Reference>,
    device_observations: Vec<(String, Vec<Reference>)>,
    estimated_observations: Vec<Reference>,
    device_associations: Vec<Reference>,
    devices: Vec<DeviceInstance>,
}

impl ParticipantRecords {
    pub fn add_questionnaire_response(&mut self, reference: Reference) {
        self.questionnaire_responses.push(reference);
    }

    /// Participant-level observations (personal information, notes).
    pub fn add_observation(&mut self, reference: Reference) {
        self.observations.push(reference);
    }

    /// Top-level session, label or exam observations.
    pub fn add_reference_observation(&mut self, reference: Reference) {
        self.reference_observations.push(reference);
    }

    pub fn add_device_observation(&mut self, device_id: &str, reference: Reference) {
        match self.device_observations.iter_mut().find(|(id, _)| id == device_id) {
            Some((_, refs)) => refs.push(reference),
            None => self
                .device_observations
                .push((device_id.to_string(), vec![reference])),
        }
    }

    pub fn add_estimated_observation(&mut self, reference: Reference) {
        self.estimated_observations.push(reference);
    }

    pub fn add_device_association(&mut self, reference: Reference) {
        self.device_associations.push(reference);
    }

    pub fn add_device(&mut self, device: DeviceInstance) {
        self.devices.push(device);
    }

    pub fn questionnaire_responses(&self) -> &[Reference] {
        &self.questionnaire_responses
    }

    pub fn observations(&self) -> &[Reference] {
        &self.observations
    }

    pub fn reference_observations(&self) -> &[Reference] {
        &self.reference_observations
    }

    pub fn device_observations(&self) -> &[(String, Vec<Reference>)] {
        &self.device_observations
    }

    pub fn estimated_observations(&self) -> &[Reference] {
        &self.estimated_observations
    }

    pub fn device_associations(&self) -> &[Reference] {
        &self.device_associations
    }

    pub fn devices(&self) -> &[DeviceInstance] {
        &self.devices
    }

    /// The participant's instance of a device model.
    pub fn device(&self, model: DeviceModel) -> Option<&DeviceInstance> {
        self.devices.iter().find(|d| d.model == model)
    }
}

/// Records of every participant of one study run, in registration order.
#[derive(Debug, Clone, Default)]
pub struct StudyRegistry {
    participants: Vec<(String, ParticipantRecords)>,
}

impl StudyRegistry {
    /// Records of a participant, created empty on first use.
    pub fn entry(&mut self, participant: &str) -> &mut ParticipantRecords {
        let position = match self.participants.iter().position(|(id, _)| id == participant) {
            Some(position) => position,
            None => {
                self.participants
                    .push((participant.to_string(), ParticipantRecords::default()));
                self.participants.len() - 1
            }
        };
        &mut self.participants[position].1
    }

    pub fn get(&self, participant: &str) -> Option<&ParticipantRecords> {
        self.participants
            .iter()
            .find(|(id, _)| id == participant)
            .map(|(_, records)| records)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParticipantRecords)> {
        self.participants.iter().map(|(id, records)| (id.as_str(), records))
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
