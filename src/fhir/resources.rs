//! The FHIR R5 resources written by the pipeline.
//!
//! Only the elements the pipeline populates are modelled. Empty elements are
//! omitted from the JSON form.

use super::datatypes::*;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Patient {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Practitioner {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupMember {
    pub entity: Reference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Group {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub membership: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub member: Vec<GroupMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncludedStructure {
    pub structure: CodeableConcept,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyStructure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub patient: Reference,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included_structure: Vec<IncludedStructure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProperty {
    #[serde(rename = "type")]
    pub type_: CodeableConcept,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<CodeableReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub property: Vec<DeviceProperty>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceMetric {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub device: Reference,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<CodeableConcept>,
    #[serde(rename = "type")]
    pub type_: CodeableConcept,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceName {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DevicePart {
    pub reference: Reference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub device_name: Vec<DeviceName>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub has_part: Vec<DevicePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAssociation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: CodeableConcept,
    pub subject: Reference,
    pub device: Reference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_structure: Option<Reference>,
}

/// `Observation.value[x]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ObservationValue {
    ValueQuantity(Quantity),
    ValueRange(Range),
    ValueInteger(i64),
    ValueString(String),
    ValueBoolean(bool),
    ValueSampledData(SampledData),
    ValueAttachment(Attachment),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Narrative>,
    pub status: String,
    pub code: CodeableConcept,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_period: Option<Period>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<DateTime<FixedOffset>>,
    #[serde(flatten)]
    pub value: Option<ObservationValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub note: Vec<Annotation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub has_member: Vec<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<Reference>,
}

impl Observation {
    /// A final observation with the given code.
    pub fn new(code: CodeableConcept) -> Self {
        Self {
            status: "final".to_string(),
            code,
            ..Default::default()
        }
    }
}

/// `answerOption.value[x]` and `answer.value[x]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerValue {
    ValueCoding(Coding),
    ValueInteger(i64),
    ValueString(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOption {
    #[serde(flatten)]
    pub value: AnswerValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireItem {
    pub link_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answer_option: Vec<AnswerOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Questionnaire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseAnswer {
    #[serde(flatten)]
    pub value: AnswerValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    pub link_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answer: Vec<ResponseAnswer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: String,
    pub questionnaire: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub part_of: Vec<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<ResponseItem>,
}

impl QuestionnaireResponse {
    /// A completed response to the questionnaire at `questionnaire`.
    pub fn completed(questionnaire: impl Into<String>) -> Self {
        Self {
            status: "completed".to_string(),
            questionnaire: questionnaire.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvidenceReportSubject {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub note: Vec<Annotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entry_reference: Vec<Reference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub section: Vec<ReportSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvidenceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: String,
    pub subject: EvidenceReportSubject,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub section: Vec<ReportSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResearchStudy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub result: Vec<Reference>,
}
