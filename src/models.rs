/// Wire types for the gateway's routes.
///
/// Inbound bodies are first deserialized into loosely-typed `*Payload` structs (every field
/// optional, so that a missing field becomes a readable `InvalidInput` rather than a serde
/// rejection), then converted into validated request types with `TryFrom`. Only validated
/// types are ever handed to the upstream clients.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    documents::{Attachment, DocumentError},
    errors::GatewayError,
};

/// Upper bound on the number of quiz questions a client may request.
pub const MAX_QUESTIONS: u32 = 20;

/// Question count used when a quiz request does not specify one.
pub const DEFAULT_QUESTION_COUNT: u32 = 5;

/// Longest text accepted for synthesis, in UTF-8 bytes (the provider's input limit).
pub const MAX_TTS_BYTES: usize = 5000;

/// The only audio format text-to-speech produces.
pub const TTS_FORMAT: &str = "mp3";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub talk_mode: Option<bool>,
    /// An attached document as a `data:` URL with a base64 payload.
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    /// Short conversational replies suited to being read aloud.
    pub talk_mode: bool,
}

/// A validated chat body: either a plain message or a document with an optional question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(ChatRequest),
    Document {
        attachment: Attachment,
        question: Option<String>,
    },
}

impl TryFrom<ChatPayload> for ChatInput {
    type Error = GatewayError;

    fn try_from(payload: ChatPayload) -> Result<Self, Self::Error> {
        let message = payload.message.unwrap_or_default().trim().to_string();
        let file_data = payload.file_data.filter(|data| !data.trim().is_empty());

        if let Some(file_data) = file_data {
            let filename = payload.filename.ok_or(DocumentError::MissingFilename)?;
            let attachment = Attachment::from_data_url(&file_data, &filename)?;
            return Ok(Self::Document {
                attachment,
                question: Some(message).filter(|m| !m.is_empty()),
            });
        }

        if message.is_empty() {
            return Err(GatewayError::invalid_input(
                "No message or file was provided.",
            ));
        }
        Ok(Self::Message(ChatRequest {
            message,
            talk_mode: payload.talk_mode.unwrap_or(false),
        }))
    }
}

/// Text extracted from an uploaded document, ready to be sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    pub filename: String,
    pub text: String,
    /// What the user asked about the document, if anything.
    pub question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuizPayload {
    #[serde(default)]
    pub topic: Option<Value>,
    /// Accepted as a number or a numeric string.
    #[serde(default)]
    pub count: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRequest {
    pub topic: String,
    pub count: u32,
}

impl TryFrom<QuizPayload> for QuizRequest {
    type Error = GatewayError;

    fn try_from(payload: QuizPayload) -> Result<Self, Self::Error> {
        let topic = match payload.topic {
            Some(Value::String(topic)) if !topic.trim().is_empty() => topic.trim().to_string(),
            _ => {
                return Err(GatewayError::invalid_input(
                    "Please provide a valid topic for the quiz",
                ));
            }
        };

        let count = match payload.count {
            None | Some(Value::Null) => DEFAULT_QUESTION_COUNT as i64,
            Some(value) => parse_count(&value).ok_or_else(count_out_of_range)?,
        };
        if !(1..=MAX_QUESTIONS as i64).contains(&count) {
            return Err(count_out_of_range());
        }

        Ok(Self {
            topic,
            count: count as u32,
        })
    }
}

fn parse_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn count_out_of_range() -> GatewayError {
    GatewayError::invalid_input(format!(
        "Please request between 1 and {MAX_QUESTIONS} questions"
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResponse {
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextToSpeechPayload {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextToSpeechRequest {
    pub text: String,
}

impl TryFrom<TextToSpeechPayload> for TextToSpeechRequest {
    type Error = GatewayError;

    fn try_from(payload: TextToSpeechPayload) -> Result<Self, Self::Error> {
        let text = payload.text.unwrap_or_default().trim().to_string();
        if text.is_empty() {
            return Err(GatewayError::invalid_input("No text was provided."));
        }
        if text.len() > MAX_TTS_BYTES {
            return Err(GatewayError::invalid_input(format!(
                "Text must be at most {MAX_TTS_BYTES} bytes"
            )));
        }
        Ok(Self { text })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextToSpeechResponse {
    /// Base64 (standard alphabet, padded) encoded audio.
    pub audio: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechToTextResponse {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub ai: bool,
    pub speech: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub document_processing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// True when every upstream provider has credentials.
    pub configured: bool,
    pub version: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub services: ServiceStatus,
    pub features: FeatureStatus,
}
