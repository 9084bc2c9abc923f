use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

/// One entry of the visible transcript. `text` grows in place while the
/// assistant reply is still streaming and is frozen once the turn completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: next_message_id(),
            text: text.into(),
            sender: Sender::User,
        }
    }

    pub fn assistant_placeholder() -> Self {
        Self {
            id: next_message_id(),
            text: String::new(),
            sender: Sender::Assistant,
        }
    }
}

// Ids are epoch-millis strings. Two messages created within the same
// millisecond (a send and its reply placeholder) get a counter suffix so the
// ids stay distinct.
fn next_message_id() -> String {
    static DISAMBIGUATOR: AtomicU64 = AtomicU64::new(0);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let nonce = DISAMBIGUATOR.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{nonce}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigorLevel {
    MiddleSchool,
    HighSchool,
    Undergraduate,
}

impl RigorLevel {
    pub const ALL: [RigorLevel; 3] = [
        RigorLevel::MiddleSchool,
        RigorLevel::HighSchool,
        RigorLevel::Undergraduate,
    ];

    /// The exact wording embedded in prompts sent to the model.
    pub fn label(&self) -> &'static str {
        match self {
            RigorLevel::MiddleSchool => "Middle School",
            RigorLevel::HighSchool => "High School",
            RigorLevel::Undergraduate => "Undergraduate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Native-script name shown on the selection screen.
    pub name: &'static str,
    /// English name embedded in prompts.
    pub code: &'static str,
}

pub const LANGUAGES: [Language; 12] = [
    Language { name: "English", code: "English" },
    Language { name: "Español", code: "Spanish" },
    Language { name: "Français", code: "French" },
    Language { name: "Deutsch", code: "German" },
    Language { name: "中文 (简体)", code: "Simplified Chinese" },
    Language { name: "日本語", code: "Japanese" },
    Language { name: "한국어", code: "Korean" },
    Language { name: "Português", code: "Portuguese" },
    Language { name: "Русский", code: "Russian" },
    Language { name: "العربية", code: "Arabic" },
    Language { name: "हिन्दी", code: "Hindi" },
    Language { name: "Italiano", code: "Italian" },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksheetQuestion {
    #[serde(rename = "questionNumber")]
    pub question_number: u32,
    #[serde(rename = "questionText")]
    pub question_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksheetAnswer {
    #[serde(rename = "questionNumber")]
    pub question_number: u32,
    #[serde(rename = "answerText")]
    pub answer_text: String,
}

/// A generated practice worksheet. Question numbering is produced by the
/// model and trusted as-is; only the answer key display order is normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub title: String,
    pub questions: Vec<WorksheetQuestion>,
    #[serde(rename = "answerKey")]
    pub answer_key: Vec<WorksheetAnswer>,
}

/// Outcome of the credential probe. Not an error type: the probe never
/// propagates a failure, it reports one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub error: Option<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types for the generative-language REST API.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiContent {
    pub role: String,
    pub parts: Vec<ApiPart>,
}

impl ApiContent {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![ApiPart { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![ApiPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPart {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<ApiContent>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate. Empty when the
    /// response carried no candidate content.
    pub fn text(&self) -> String {
        let Some(content) = self.candidates.first().and_then(|c| c.content.as_ref()) else {
            return String::new();
        };
        content
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .collect()
    }
}
