//! Self-report instruments shared by the datasets.

use crate::fhir::{AnswerOption, AnswerValue, Coding, Questionnaire, QuestionnaireItem};

const FIVE_POINT: &[&str] = &["Not at all", "A little bit", "Somewhat", "Very much", "Extremely"];

const PANAS_ITEMS: &[&str] = &[
    "Active", "Distressed", "Interested", "Inspired", "Annoyed", "Strong", "Guilty", "Scared",
    "Hostile", "Excited", "Proud", "Irritable", "Enthusiastic", "Ashamed", "Alert", "Nervous",
    "Determined", "Attentive", "Jittery", "Afraid", "Stressed", "Frustrated", "Happy", "(Angry)",
    "(Irritated)", "Sad",
];

const STAI_ITEMS: &[&str] = &[
    "I feel at ease",
    "I feel nervous",
    "I am jittery",
    "I am relaxed",
    "I am worried",
    "I feel pleasant",
];

const SSSQ_ITEMS: &[&str] = &[
    "I was committed to attaining my performance goals",
    "I wanted to succeed on the task",
    "I was motivated to do the task",
    "I reflected about myself",
    "I was worried about what other people think of me",
    "I felt concerned about the impression I was making",
];

const SAM_ITEMS: &[&str] = &["Valence", "Arousal"];
const SAM_SCALE: &[&str] = &["low", " ", " ", " ", "med", " ", " ", " ", "high"];

/// Questionnaires answered during the WESAD protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Panas,
    Stai,
    Sssq,
    Sam,
}

impl Instrument {
    pub const ALL: [Instrument; 4] = [
        Instrument::Panas,
        Instrument::Stai,
        Instrument::Sssq,
        Instrument::Sam,
    ];

    /// Questionnaire resource id.
    pub fn id(&self) -> &'static str {
        match self {
            Instrument::Panas => "PANAS",
            Instrument::Stai => "STAI",
            Instrument::Sssq => "SSSQ",
            Instrument::Sam => "SAM",
        }
    }

    /// Match the tag that opens a questionnaire line. `DIM` is the SAM grid.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "PANAS" => Some(Instrument::Panas),
            "STAI" => Some(Instrument::Stai),
            "SSSQ" => Some(Instrument::Sssq),
            "DIM" | "SAM" => Some(Instrument::Sam),
            _ => None,
        }
    }

    pub fn items(&self) -> &'static [&'static str] {
        match self {
            Instrument::Panas => PANAS_ITEMS,
            Instrument::Stai => STAI_ITEMS,
            Instrument::Sssq => SSSQ_ITEMS,
            Instrument::Sam => SAM_ITEMS,
        }
    }

    pub fn answers(&self) -> &'static [&'static str] {
        match self {
            Instrument::Sam => SAM_SCALE,
            _ => FIVE_POINT,
        }
    }

    /// `panas_q01_Active` style link id, `None` past the last item.
    pub fn link_id(&self, index: usize) -> Option<String> {
        let item = self.items().get(index)?;
        let prefix = self.id().to_ascii_lowercase();
        Some(format!("{prefix}_q{:02}_{item}", index + 1))
    }

    pub fn questionnaire(&self) -> Questionnaire {
        let options: Vec<AnswerOption> = self
            .answers()
            .iter()
            .enumerate()
            .map(|(code, display)| AnswerOption {
                value: AnswerValue::ValueCoding(Coding::code(code.to_string()).with_display(*display)),
            })
            .collect();
        Questionnaire {
            id: Some(self.id().to_string()),
            title: None,
            status: "active".to_string(),
            item: self
                .items()
                .iter()
                .enumerate()
                .filter_map(|(i, text)| {
                    Some(display_item(self.link_id(i)?, text, options.clone()))
                })
                .collect(),
        }
    }
}

/// A display item with the given answer options.
pub fn display_item(link_id: String, text: &str, answer_option: Vec<AnswerOption>) -> QuestionnaireItem {
    QuestionnaireItem {
        link_id,
        text: Some(text.to_string()),
        type_: "display".to_string(),
        answer_option,
    }
}

/// Canonical URL of a questionnaire on the store.
pub fn questionnaire_url(base_url: &str, id: &str) -> String {
    format!("{}/Questionnaire/{id}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_and_link_ids() {
        assert_eq!(Instrument::from_tag("DIM"), Some(Instrument::Sam));
        assert_eq!(Instrument::from_tag(" panas "), Some(Instrument::Panas));
        assert_eq!(Instrument::from_tag("START"), None);
        assert_eq!(Instrument::Panas.link_id(0).as_deref(), Some("panas_q01_Active"));
        assert_eq!(Instrument::Panas.link_id(25).as_deref(), Some("panas_q26_Sad"));
        assert_eq!(Instrument::Sam.link_id(1).as_deref(), Some("sam_q02_Arousal"));
        assert_eq!(Instrument::Stai.link_id(6), None);
    }

    #[test]
    fn test_questionnaire_items_and_options() {
        let panas = Instrument::Panas.questionnaire();
        assert_eq!(panas.id.as_deref(), Some("PANAS"));
        assert_eq!(panas.item.len(), 26);
        assert_eq!(panas.item[0].answer_option.len(), 5);
        assert_eq!(
            panas.item[0].answer_option[4].value,
            AnswerValue::ValueCoding(Coding::code("4").with_display("Extremely"))
        );
        let sam = Instrument::Sam.questionnaire();
        assert_eq!(sam.item[0].answer_option.len(), 9);
    }

    #[test]
    fn test_questionnaire_url() {
        assert_eq!(
            questionnaire_url("http://localhost:8080/fhir/", "STAI"),
            "http://localhost:8080/fhir/Questionnaire/STAI"
        );
    }
}
