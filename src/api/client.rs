use super::error::ApiFailure;
use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{
    ApiContent, GenerateContentResponse, Language, Message, RigorLevel, Sender, Validation,
    Worksheet,
};
use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Transcript window handed to the topic-extraction prompt is capped so an
/// unbounded conversation cannot produce an oversized request.
pub const MAX_HISTORY_CHARS: usize = 10_000;

/// The hidden first turn that makes the tutor open the conversation.
pub const GREETING_TRIGGER: &str = "Introduce yourself.";

fn system_instruction(level: RigorLevel, language: &Language) -> String {
    let level = level.label();
    let language = language.code;
    format!(
        "You MUST conduct the entire conversation, including your introduction, in {language}. \
         All of your responses and questions must be in {language}.\n\
         \n\
         You are an expert physics tutor named Physicus Aurelius Maximus (PAM). Your goal is to \
         help students study for their physics tests at the {level} level using the Socratic \
         method. Do not give direct answers. Instead, ask probing and guiding questions to help \
         the student arrive at the answer themselves. Tailor the complexity of your questions and \
         explanations to a {level} audience. Break down complex topics like Newtonian mechanics, \
         electromagnetism, or quantum physics into smaller, manageable steps appropriate for this \
         level. If the student is wrong, gently guide them to recognize their mistake without \
         directly pointing it out. Keep your tone encouraging and inquisitive. Start the \
         conversation by introducing yourself and asking what topic the student wants to study. \
         Your responses should be concise and focused on guiding the student.\n\
         \n\
         IMPORTANT: When presenting mathematical equations or formulas, you MUST enclose them in \
         LaTeX format for them to render correctly.\n\
         - For block content (on its own line), use double dollar signs: $$...$$. Example: $$F = ma$$\n\
         - For inline content, use single dollar signs: $...$. Example: The equation for energy is $E = mc^2$.\n\
         This is critical. Do not use markdown code fences (like ```) around the LaTeX."
    )
}

/// A stateful tutoring exchange: the persona directive plus every completed
/// turn so far. Owned by exactly one caller and rebuilt from scratch on
/// session reset.
#[derive(Debug, Clone)]
pub struct ChatSession {
    system_instruction: String,
    contents: Vec<ApiContent>,
}

impl ChatSession {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.contents.push(ApiContent::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.contents.push(ApiContent::model(text));
    }

    /// Drops the trailing user turn after a failed exchange so the history
    /// never carries a question the model was not able to answer.
    pub fn pop_unanswered_user(&mut self) {
        if self.contents.last().is_some_and(|c| c.role == "user") {
            self.contents.pop();
        }
    }

    pub fn turn_count(&self) -> usize {
        self.contents.len()
    }
}

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, session: &ChatSession) -> Result<ByteStream>;
}

#[cfg(test)]
pub trait MockContentProducer: Send + Sync {
    fn produce(&self, payload: &Value) -> Result<String>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
    #[cfg(test)]
    mock_content_producer: Option<Arc<dyn MockContentProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_base: config.api_base.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
            #[cfg(test)]
            mock_content_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(
        stream_producer: Option<Arc<dyn MockStreamProducer>>,
        content_producer: Option<Arc<dyn MockContentProducer>>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: "mock-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_base: "http://localhost:9/v1beta".to_string(),
            mock_stream_producer: stream_producer,
            mock_content_producer: content_producer,
        }
    }

    /// Cheap connectivity and key probe: one token out, thinking disabled.
    /// Reports failure instead of propagating it.
    pub async fn validate_credentials(&self) -> Validation {
        let payload = json!({
            "contents": [ApiContent::user("hello")],
            "generationConfig": {
                "maxOutputTokens": 1,
                "thinkingConfig": { "thinkingBudget": 0 }
            }
        });

        match self.generate_content(&payload).await {
            Ok(_) => Validation::ok(),
            Err(error) => Validation::failed(error.to_string()),
        }
    }

    /// Builds the session value. No request is made here; the caller sends
    /// the greeting trigger as the first turn.
    pub fn open_tutoring_session(&self, level: RigorLevel, language: &Language) -> ChatSession {
        ChatSession {
            system_instruction: system_instruction(level, language),
            contents: Vec::new(),
        }
    }

    /// Streams the reply to the session's pending user turn as raw SSE bytes.
    /// The caller drains the stream through a `StreamParser` and records the
    /// completed reply on the session.
    pub async fn stream_reply(&self, session: &ChatSession) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(session);
            }
        }

        let request_url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        );
        let payload = json!({
            "contents": session.contents,
            "systemInstruction": { "parts": [{ "text": session.system_instruction }] }
        });

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &payload);
        }

        let response = self
            .http
            .post(&request_url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|error| ApiFailure::from_reqwest(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiFailure::from_status(status, &body).into());
        }

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| ApiFailure::from_reqwest(error, &request_url_for_stream).into())
        });
        Ok(Box::pin(stream))
    }

    /// Derives the topic list for worksheet generation from the transcript.
    /// A malformed structured response is an error; an empty topic list is
    /// a valid outcome the caller must handle.
    pub async fn extract_topics(
        &self,
        history: &[Message],
        level: RigorLevel,
        language: &Language,
    ) -> Result<Vec<String>> {
        let formatted_history = format_history_window(history);
        let prompt = format!(
            "Analyze the following conversation between a {level} level physics student and a \
             tutor. Your task is to identify and extract the main physics topics, concepts, and \
             formulas discussed.\n\
             \n\
             Please respond ONLY with a JSON object containing a single key \"topics\", which is \
             an array of strings. Each string should be a distinct topic. The topics must be in \
             {language}.\n\
             \n\
             Conversation History:\n{formatted_history}",
            level = level.label(),
            language = language.code,
        );

        let payload = json!({
            "contents": [ApiContent::user(prompt)],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": topics_schema()
            }
        });

        let response = self.generate_content(&payload).await?;
        let parsed: TopicsPayload = parse_structured(&response.text())?;
        Ok(parsed.topics)
    }

    /// Generates the worksheet for an already-extracted topic list. Item
    /// numbering is trusted as produced by the model.
    pub async fn generate_worksheet(
        &self,
        topics: &[String],
        level: RigorLevel,
        language: &Language,
    ) -> Result<Worksheet> {
        let formatted_topics = topics.join(", ");
        let prompt = format!(
            "You are a helpful assistant that creates practice worksheets for students based on a \
             list of physics topics. Your task is to generate a worksheet in {language} that \
             covers the key concepts from the following list: {formatted_topics}.\n\
             \n\
             The difficulty should be appropriate for a {level} student.\n\
             \n\
             The worksheet should have a clear title, a set of 5-7 questions (a mix of \
             multiple-choice, short-answer, and problems), and a separate answer key at the end.\n\
             \n\
             Please respond ONLY with a JSON object that matches the provided schema. Ensure all \
             text, including the title, questions, and answers, is in {language}. If the concepts \
             involve formulas, include them in the questions and answers using LaTeX format \
             (e.g., $v = v_0 + at$ or $$F_{{net}} = ma$$).",
            level = level.label(),
            language = language.code,
        );

        let payload = json!({
            "contents": [ApiContent::user(prompt)],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": worksheet_schema()
            }
        });

        let response = self.generate_content(&payload).await?;
        parse_structured(&response.text())
    }

    async fn generate_content(&self, payload: &Value) -> Result<GenerateContentResponse> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_content_producer {
                let text = producer.produce(payload)?;
                return Ok(mock_response(text));
            }
        }

        let request_url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, payload);
        }

        let response = self
            .http
            .post(&request_url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|error| ApiFailure::from_reqwest(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiFailure::from_status(status, &body).into());
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|error| ApiFailure::from_reqwest(error, &request_url).into())
    }
}

#[derive(Debug, Deserialize)]
struct TopicsPayload {
    topics: Vec<String>,
}

fn parse_structured<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text.trim())
        .map_err(|error| ApiFailure::malformed(format!("structured response: {error}")).into())
}

#[cfg(test)]
fn mock_response(text: String) -> GenerateContentResponse {
    serde_json::from_value(json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    }))
    .expect("mock response must deserialize")
}

/// Formats the transcript for the extraction prompt, keeping the maximal
/// chronologically-ordered tail that fits in `MAX_HISTORY_CHARS`. Scans from
/// the newest message backward so recent context always survives truncation.
pub fn format_history_window(history: &[Message]) -> String {
    let mut window: Vec<String> = Vec::new();
    let mut current_chars = 0usize;

    for message in history.iter().rev() {
        let speaker = match message.sender {
            Sender::User => "Student",
            Sender::Assistant => "Tutor",
        };
        let line = format!("{speaker}: {}\n", message.text);
        let line_chars = line.chars().count();

        if current_chars + line_chars > MAX_HISTORY_CHARS {
            break;
        }

        window.push(line);
        current_chars += line_chars;
    }

    window.reverse();
    window.concat()
}

fn topics_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "topics": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }
        },
        "required": ["topics"]
    })
}

fn worksheet_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "questions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "questionNumber": { "type": "INTEGER" },
                        "questionText": { "type": "STRING" }
                    },
                    "required": ["questionNumber", "questionText"]
                }
            },
            "answerKey": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "questionNumber": { "type": "INTEGER" },
                        "answerText": { "type": "STRING" }
                    },
                    "required": ["questionNumber", "answerText"]
                }
            }
        },
        "required": ["title", "questions", "answerKey"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CannedContent;
    use crate::types::LANGUAGES;

    fn message(sender: Sender, text: &str) -> Message {
        match sender {
            Sender::User => Message::user(text),
            Sender::Assistant => {
                let mut m = Message::assistant_placeholder();
                m.text = text.to_string();
                m
            }
        }
    }

    #[test]
    fn test_system_instruction_carries_level_language_and_latex_rules() {
        let spanish = LANGUAGES[1];
        let instruction = system_instruction(RigorLevel::HighSchool, &spanish);
        assert!(instruction.starts_with("You MUST conduct the entire conversation"));
        assert!(instruction.contains("in Spanish"));
        assert!(instruction.contains("High School level"));
        assert!(instruction.contains("Physicus Aurelius Maximus (PAM)"));
        assert!(instruction.contains("$$...$$"));
        assert!(instruction.contains("Do not use markdown code fences"));
    }

    #[test]
    fn test_history_window_keeps_everything_under_budget() {
        let history = vec![
            message(Sender::User, "What is velocity?"),
            message(Sender::Assistant, "What do you think distinguishes it from speed?"),
        ];
        let window = format_history_window(&history);
        assert_eq!(
            window,
            "Student: What is velocity?\n\
             Tutor: What do you think distinguishes it from speed?\n"
        );
    }

    #[test]
    fn test_history_window_drops_oldest_first() {
        let filler = "x".repeat(6_000);
        let history = vec![
            message(Sender::User, &filler),
            message(Sender::Assistant, &filler),
            message(Sender::User, "newest"),
        ];
        let window = format_history_window(&history);

        // Only the last two lines fit in the budget; the oldest is dropped
        // and chronological order is preserved.
        assert!(window.chars().count() <= MAX_HISTORY_CHARS);
        assert!(window.starts_with("Tutor: "));
        assert!(window.ends_with("Student: newest\n"));
    }

    #[test]
    fn test_history_window_always_keeps_newest_when_it_fits() {
        let oversized = "y".repeat(MAX_HISTORY_CHARS);
        let history = vec![
            message(Sender::Assistant, &oversized),
            message(Sender::User, "short question"),
        ];
        let window = format_history_window(&history);
        assert_eq!(window, "Student: short question\n");
    }

    #[test]
    fn test_history_window_empty_when_single_message_exceeds_budget() {
        let oversized = "z".repeat(MAX_HISTORY_CHARS + 1);
        let history = vec![message(Sender::User, &oversized)];
        assert_eq!(format_history_window(&history), "");
    }

    #[test]
    fn test_schemas_require_their_top_level_keys() {
        assert_eq!(topics_schema()["required"], json!(["topics"]));
        assert_eq!(
            worksheet_schema()["required"],
            json!(["title", "questions", "answerKey"])
        );
    }

    #[tokio::test]
    async fn test_validate_credentials_reports_failure_instead_of_erroring() {
        let content = CannedContent::new(vec![Err(ApiFailure::from_status(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"API key not valid"}}"#,
        )
        .into())]);
        let client = ApiClient::new_mock(None, Some(content));

        let validation = client.validate_credentials().await;
        assert!(!validation.valid);
        assert!(validation.error.unwrap().contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_validate_credentials_probe_is_minimal() {
        let content = CannedContent::new(vec![Ok("ok".to_string())]);
        let producer: Arc<dyn crate::api::client::MockContentProducer> = content.clone();
        let client = ApiClient::new_mock(None, Some(producer));

        let validation = client.validate_credentials().await;
        assert!(validation.valid);

        let payloads = content.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["generationConfig"]["maxOutputTokens"], json!(1));
        assert_eq!(
            payloads[0]["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            json!(0)
        );
    }

    #[tokio::test]
    async fn test_extract_topics_parses_structured_response() {
        let content =
            CannedContent::new(vec![Ok(r#"{"topics":["Kinematics","Newton's laws"]}"#.to_string())]);
        let client = ApiClient::new_mock(None, Some(content));

        let topics = client
            .extract_topics(
                &[message(Sender::User, "velocity?")],
                RigorLevel::HighSchool,
                &LANGUAGES[0],
            )
            .await
            .expect("extraction should succeed");
        assert_eq!(topics, vec!["Kinematics", "Newton's laws"]);
    }

    #[tokio::test]
    async fn test_extract_topics_parse_failure_propagates() {
        let content = CannedContent::new(vec![Ok("not json at all".to_string())]);
        let client = ApiClient::new_mock(None, Some(content));

        let error = client
            .extract_topics(&[], RigorLevel::MiddleSchool, &LANGUAGES[0])
            .await
            .expect_err("malformed structured response must propagate");
        let failure = error
            .downcast_ref::<ApiFailure>()
            .expect("error should be an ApiFailure");
        assert_eq!(failure.kind, crate::api::error::ApiErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_generate_worksheet_round_trips_schema_shape() {
        let content = CannedContent::new(vec![Ok(r#"{
            "title": "Práctica de cinemática",
            "questions": [{"questionNumber": 1, "questionText": "Define $v$"}],
            "answerKey": [{"questionNumber": 1, "answerText": "$v = d/t$"}]
        }"#
        .to_string())]);
        let client = ApiClient::new_mock(None, Some(content));

        let worksheet = client
            .generate_worksheet(
                &["Kinematics".to_string()],
                RigorLevel::Undergraduate,
                &LANGUAGES[1],
            )
            .await
            .expect("generation should succeed");
        assert_eq!(worksheet.title, "Práctica de cinemática");
        assert_eq!(worksheet.questions.len(), 1);
    }

    #[test]
    fn test_session_pops_only_unanswered_user_turn() {
        let config = Config {
            api_key: "k".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_base: "http://localhost:9".to_string(),
        };
        let client = ApiClient::new(&config);
        let mut session = client.open_tutoring_session(RigorLevel::HighSchool, &LANGUAGES[0]);

        session.push_user(GREETING_TRIGGER);
        session.pop_unanswered_user();
        assert_eq!(session.turn_count(), 0);

        session.push_user("q");
        session.push_assistant("a");
        session.pop_unanswered_user();
        assert_eq!(session.turn_count(), 2);
    }
}
