//! Typed FHIR resources and the [`Record`] envelope handed to stores.
//!
//! Resources link to each other by literal `{Type}/{id}` references. A
//! reference can only be built from a resource that already has an id.

pub mod datatypes;
pub mod resources;

pub use datatypes::*;
pub use resources::*;

use serde::Serialize;

/// A resource type the pipeline can create.
pub trait Resource: Serialize + Clone {
    /// FHIR resource type name.
    const TYPE: &'static str;

    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: String);

    fn into_record(self) -> Record;
}

macro_rules! records {
    ($($name:ident),* $(,)?) => {
        /// Any resource, serialized with its `resourceType`.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(tag = "resourceType")]
        pub enum Record {
            $($name($name),)*
        }

        impl Record {
            pub fn resource_type(&self) -> &'static str {
                match self {
                    $(Record::$name(_) => <$name as Resource>::TYPE,)*
                }
            }

            pub fn id(&self) -> Option<&str> {
                match self {
                    $(Record::$name(r) => r.id.as_deref(),)*
                }
            }
        }

        $(
            impl Resource for $name {
                const TYPE: &'static str = stringify!($name);

                fn id(&self) -> Option<&str> {
                    self.id.as_deref()
                }

                fn set_id(&mut self, id: String) {
                    self.id = Some(id);
                }

                fn into_record(self) -> Record {
                    Record::$name(self)
                }
            }
        )*
    };
}

records!(
    Patient,
    Practitioner,
    Group,
    BodyStructure,
    Device,
    DeviceMetric,
    DeviceDefinition,
    DeviceAssociation,
    Observation,
    Questionnaire,
    QuestionnaireResponse,
    EvidenceReport,
    ResearchStudy,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_reference_requires_id() {
        let mut patient = Patient::default();
        assert!(matches!(
            Reference::to(&patient),
            Err(IngestError::UnresolvedReference {
                resource_type: "Patient"
            })
        ));
        patient.set_id("WESAD-S2".into());
        let reference = Reference::to(&patient).unwrap();
        assert_eq!(reference.reference, "Patient/WESAD-S2");
        assert_eq!(reference.resource_type(), "Patient");
        assert_eq!(reference.id(), "WESAD-S2");
    }

    #[test]
    fn test_observation_json_shape() {
        let mut obs = Observation::new(CodeableConcept::code("stress"));
        obs.id = Some("SDN-5C-00001".into());
        obs.subject = Some(Reference::new("Patient", "SDN-5C"));
        obs.value = Some(ObservationValue::ValueString("2.0".into()));
        obs.has_member = vec![Reference::new("Observation", "SDN-5C-00002-eda")];

        let value = serde_json::to_value(obs.into_record()).unwrap();
        assert_eq!(
            value,
            json!({
                "resourceType": "Observation",
                "id": "SDN-5C-00001",
                "status": "final",
                "code": { "coding": [{ "code": "stress" }] },
                "subject": { "reference": "Patient/SDN-5C" },
                "valueString": "2.0",
                "hasMember": [{ "reference": "Observation/SDN-5C-00002-eda" }]
            })
        );
    }

    #[test]
    fn test_answer_values_flatten() {
        let option = AnswerOption {
            value: AnswerValue::ValueCoding(Coding::code("0").with_display("Not at all")),
        };
        assert_eq!(
            serde_json::to_value(option).unwrap(),
            json!({ "valueCoding": { "code": "0", "display": "Not at all" } })
        );
    }

    #[test]
    fn test_record_type_and_id() {
        let record = Group {
            id: Some("SRAD-group".into()),
            membership: "definitional".into(),
            type_: "person".into(),
            member: vec![],
        }
        .into_record();
        assert_eq!(record.resource_type(), "Group");
        assert_eq!(record.id(), Some("SRAD-group"));
    }
}
