//! Evidence report summarising a study run.

use super::registry::{ParticipantRecords, StudyRegistry};
use crate::fhir::{Annotation, EvidenceReport, EvidenceReportSubject, Reference, ReportSection};

fn section(title: impl Into<String>, entries: &[Reference]) -> ReportSection {
    ReportSection {
        title: title.into(),
        entry_reference: entries.to_vec(),
        section: Vec::new(),
    }
}

fn participant_section(participant: &str, records: &ParticipantRecords) -> ReportSection {
    let mut subsections = vec![
        section("Questionnaires", records.questionnaire_responses()),
        section("Reference Data", records.reference_observations()),
        section("Estimated Data", records.estimated_observations()),
    ];
    subsections.extend(
        records
            .device_observations()
            .iter()
            .map(|(device, refs)| section(format!("Device {device}"), refs)),
    );

    ReportSection {
        title: format!("Participant {participant}"),
        entry_reference: records.observations().to_vec(),
        section: subsections,
    }
}

/// `{study}-results`: the devices each participant wore and the data
/// uploaded for them.
pub fn build_evidence_report(study: &str, registry: &StudyRegistry) -> EvidenceReport {
    let devices = ReportSection {
        title: "Study devices".to_string(),
        entry_reference: Vec::new(),
        section: registry
            .iter()
            .map(|(participant, records)| {
                section(format!("Participant {participant}"), records.device_associations())
            })
            .collect(),
    };
    let data = ReportSection {
        title: "Study Data".to_string(),
        entry_reference: Vec::new(),
        section: registry
            .iter()
            .map(|(participant, records)| participant_section(participant, records))
            .collect(),
    };

    EvidenceReport {
        id: Some(format!("{study}-results")),
        status: "active".to_string(),
        subject: EvidenceReportSubject {
            note: vec![Annotation {
                text: "Stress Detection".to_string(),
            }],
        },
        section: vec![devices, data],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_sections() {
        let mut registry = StudyRegistry::default();
        let s2 = registry.entry("S2");
        s2.add_device_association(Reference::new("DeviceAssociation", "da-1"));
        s2.add_questionnaire_response(Reference::new("QuestionnaireResponse", "q-1"));
        s2.add_reference_observation(Reference::new("Observation", "WESAD-S2-BASE"));
        s2.add_observation(Reference::new("Observation", "age"));
        s2.add_device_observation("WESAD-E4-S2", Reference::new("Observation", "eda"));

        let report = build_evidence_report("WESAD", &registry);
        assert_eq!(report.id.as_deref(), Some("WESAD-results"));
        assert_eq!(report.section[0].title, "Study devices");
        assert_eq!(report.section[0].section[0].entry_reference.len(), 1);

        let participant = &report.section[1].section[0];
        assert_eq!(participant.title, "Participant S2");
        assert_eq!(participant.entry_reference[0].reference, "Observation/age");
        let titles: Vec<_> = participant.section.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Questionnaires", "Reference Data", "Estimated Data", "Device WESAD-E4-S2"]
        );
    }
}
