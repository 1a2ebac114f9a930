//! FHIR R5 general-purpose datatypes.

use super::Resource;
use crate::error::{IngestError, Result};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// A literal `{ResourceType}/{id}` link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub reference: String,
}

impl Reference {
    /// Link to a resource that already has an id.
    ///
    /// Linking to a resource without one is an ordering bug upstream and
    /// fails with [`IngestError::UnresolvedReference`].
    pub fn to<R: Resource>(resource: &R) -> Result<Self> {
        match resource.id() {
            Some(id) if !id.is_empty() => Ok(Self::new(R::TYPE, id)),
            _ => Err(IngestError::UnresolvedReference {
                resource_type: R::TYPE,
            }),
        }
    }

    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            reference: format!("{resource_type}/{id}"),
        }
    }

    pub fn resource_type(&self) -> &str {
        self.reference.split_once('/').map_or("", |(t, _)| t)
    }

    pub fn id(&self) -> &str {
        self.reference.split_once('/').map_or("", |(_, id)| id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

pub const LOINC: &str = "https://loinc.org";

impl Coding {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn loinc(code: &str, display: &str) -> Self {
        Self {
            system: Some(LOINC.to_string()),
            code: Some(code.to_string()),
            display: Some(display.to_string()),
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeableConcept {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    /// Concept with a single bare code.
    pub fn code(code: impl Into<String>) -> Self {
        Self::from(Coding::code(code))
    }
}

impl From<Coding> for CodeableConcept {
    fn from(coding: Coding) -> Self {
        Self {
            coding: vec![coding],
            text: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeableReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<CodeableConcept>,
}

impl From<Reference> for CodeableReference {
    fn from(reference: Reference) -> Self {
        Self {
            reference: Some(reference),
            concept: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quantity {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: Some(unit.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Range {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Quantity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Period {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<FixedOffset>>,
}

/// Fixed-interval samples as a space-separated list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledData {
    pub origin: Quantity,
    pub interval: f64,
    pub interval_unit: String,
    pub dimensions: usize,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    /// Base64 payload.
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Narrative {
    pub status: String,
    pub div: String,
}

impl Narrative {
    pub fn generated(text: &str) -> Self {
        Self {
            status: "generated".to_string(),
            div: format!("<div xmlns=\"http://www.w3.org/1999/xhtml\">{text}</div>"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HumanName {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}
