//! Upstream generative-AI client
//!
//! Chat, document and quiz requests are turned into Gemini `generateContent` calls carrying an
//! educational system instruction. Replies are reduced to plain text, or for quizzes handed
//! to [`crate::quiz::parse_questions`].
use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    client::{HttpClient, post_json},
    errors::UpstreamError,
    models::{ChatRequest, DocumentRequest, QuizQuestion, QuizRequest},
    quiz,
    secret::{ApiKey, redact},
};

const SERVICE: &str = "Gemini";

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

const GENERAL_CHAT_PROMPT: &str = "You are EduGen AI, a helpful and knowledgeable assistant. \
Your goal is to provide concise, informative answers (2-4 sentences). \
Use markdown for emphasis (e.g., **bolding**). \
When providing links, YOU MUST use Markdown format: [Link Text](URL). \
Your tone should be helpful and encouraging.";

const TALK_MODE_PROMPT: &str = "You are EduGen AI, speaking out loud with a student. \
Answer in one or two short, natural sentences as you would in conversation. \
Do not use markdown, lists, links or emojis, since your reply will be read aloud.";

const DOCUMENT_PROMPT: &str = "You are EduGen AI. A user has uploaded a document, given \
between the DOCUMENT markers. First decide whether it is a resume or CV.\n\
If it is a resume and the user asked nothing, or asked for a review or analysis, act as an \
expert ATS (Applicant Tracking System) and professional career coach and follow this structure \
strictly:\n\
1. **📊 ATS Compatibility Score:** A score out of 100, briefly justified by clarity, keyword \
optimization and standard formatting.\n\
2. **👍 Strengths:** 2-3 of the strongest aspects of the resume.\n\
3. **💡 Areas for Improvement:** 2-3 specific, actionable and constructive suggestions.\n\
4. **💬 Summary:** A brief summary of the candidate's professional profile.\n\
Otherwise answer the user's question accurately based *only* on the document text. If the \
answer cannot be found in the text, clearly state that the information is not in the provided \
document. If no question was asked, summarize the document.";

const QUIZ_PROMPT: &str = "You are a quiz generator. Generate engaging multiple choice quiz \
questions using subject-relevant emojis in the question text. \
Each question must have: \"text\", \"options\" (an array of 4 strings), and \"correctAnswer\" \
(the full string of the correct option). \
Return ONLY a valid JSON array. Do not include any introductory text, explanations, or markdown \
fences. Example: [{\"text\": \"What is the capital of France?\", \"options\": [\"A) London\", \
\"B) Paris\", \"C) Berlin\", \"D) Madrid\"], \"correctAnswer\": \"B) Paris\"}]";

/// The generative-AI operations the gateway needs.
#[async_trait]
pub trait AiClient: fmt::Debug + Send + Sync {
    /// Whether credentials are present. Unconfigured clients are never called.
    fn is_configured(&self) -> bool;

    async fn chat(&self, request: &ChatRequest) -> Result<String, UpstreamError>;

    /// Reviews a resume or answers a question about any other document, in a single call.
    async fn analyze_document(&self, request: &DocumentRequest) -> Result<String, UpstreamError>;

    /// Returns at most `request.count` questions; fewer is not an error.
    async fn generate_quiz(
        &self,
        request: &QuizRequest,
    ) -> Result<Vec<QuizQuestion>, UpstreamError>;
}

#[derive(Debug, Clone, Builder)]
pub struct GeminiSettings {
    pub api_key: Option<ApiKey>,
    #[builder(default = default_gemini_url())]
    pub base_url: Url,
    #[builder(default = DEFAULT_GEMINI_MODEL.to_string(), into)]
    pub model: String,
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,
}

pub fn default_gemini_url() -> Url {
    Url::parse(DEFAULT_GEMINI_URL).expect("default Gemini URL is valid")
}

#[derive(Debug, Clone)]
pub struct GeminiClient<T: HttpClient> {
    settings: GeminiSettings,
    http_client: T,
}

impl<T: HttpClient + Send + Sync> GeminiClient<T> {
    pub fn new(settings: GeminiSettings, http_client: T) -> Self {
        Self {
            settings,
            http_client,
        }
    }

    fn endpoint(&self) -> Result<Url, UpstreamError> {
        self.settings
            .base_url
            .join(&format!(
                "v1beta/models/{}:generateContent",
                self.settings.model
            ))
            .map_err(|e| UpstreamError::Transport {
                service: SERVICE,
                message: format!("invalid endpoint: {e}"),
            })
    }

    /// Sends one `generateContent` call and returns the concatenated candidate text.
    async fn generate(
        &self,
        request: &GenerateContentRequest<'_>,
    ) -> Result<String, UpstreamError> {
        let key = self
            .settings
            .api_key
            .as_ref()
            .ok_or(UpstreamError::NotConfigured(SERVICE))?;
        let url = self.endpoint()?;

        let response = post_json(
            &self.http_client,
            SERVICE,
            &url,
            &[("x-goog-api-key", key.expose())],
            request,
            self.settings.timeout,
        )
        .await?;

        if !response.status.is_success() {
            let message = serde_json::from_slice::<ProviderErrorBody>(&response.body)
                .ok()
                .and_then(|body| body.error)
                .and_then(|error| error.message)
                .unwrap_or_else(|| "request failed".to_string());
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: response.status,
                message: redact(&message, Some(key)),
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_slice(&response.body).map_err(|e| UpstreamError::InvalidResponse {
                service: SERVICE,
                message: format!("malformed body: {e}"),
            })?;
        parsed.into_text()
    }
}

#[async_trait]
impl<T: HttpClient + Send + Sync> AiClient for GeminiClient<T> {
    fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    #[instrument(skip(self, request), fields(talk_mode = request.talk_mode))]
    async fn chat(&self, request: &ChatRequest) -> Result<String, UpstreamError> {
        let (instruction, max_tokens) = if request.talk_mode {
            (TALK_MODE_PROMPT, 150)
        } else {
            (GENERAL_CHAT_PROMPT, 1024)
        };
        let body = GenerateContentRequest::new(
            instruction,
            format!("User's question: {}", request.message),
            GenerationConfig {
                temperature: 0.7,
                max_output_tokens: max_tokens,
                response_mime_type: None,
            },
        );
        let text = self.generate(&body).await?;
        debug!(chars = text.len(), "Chat reply received");
        Ok(text)
    }

    #[instrument(
        skip(self, request),
        fields(filename = %request.filename, has_question = request.question.is_some())
    )]
    async fn analyze_document(&self, request: &DocumentRequest) -> Result<String, UpstreamError> {
        let question = request
            .question
            .as_deref()
            .unwrap_or("(none, review or summarize the document)");
        let body = GenerateContentRequest::new(
            DOCUMENT_PROMPT,
            format!(
                "--- DOCUMENT ({}) ---\n{}\n--- END DOCUMENT ---\n\n**User's Question:** {}",
                request.filename, request.text, question
            ),
            GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 2048,
                response_mime_type: None,
            },
        );
        let text = self.generate(&body).await?;
        debug!(chars = text.len(), "Document reply received");
        Ok(text)
    }

    #[instrument(skip(self), fields(topic = %request.topic, count = request.count))]
    async fn generate_quiz(
        &self,
        request: &QuizRequest,
    ) -> Result<Vec<QuizQuestion>, UpstreamError> {
        let body = GenerateContentRequest::new(
            QUIZ_PROMPT,
            format!(
                "Generate exactly {} multiple choice quiz questions on the topic \"{}\".",
                request.count, request.topic
            ),
            GenerationConfig {
                temperature: 0.8,
                max_output_tokens: 8192,
                response_mime_type: Some("application/json"),
            },
        );
        let text = self.generate(&body).await?;
        let questions = quiz::parse_questions(&text, request.count as usize)?;
        if questions.len() < request.count as usize {
            debug!(
                requested = request.count,
                received = questions.len(),
                "Model returned fewer questions than requested"
            );
        }
        Ok(questions)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(instruction: &'a str, user_text: String, generation_config: GenerationConfig) -> Self {
        Self {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: instruction.into(),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: user_text.into(),
                }],
            }],
            generation_config,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, UpstreamError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                message: format!("prompt was blocked ({reason})"),
            });
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                message: "no candidates".into(),
            });
        };
        let finish_reason = candidate.finish_reason;
        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                message: format!(
                    "empty reply (finish reason: {})",
                    finish_reason.as_deref().unwrap_or("unknown")
                ),
            });
        }
        Ok(text.trim().to_string())
    }
}

/// Google APIs report failures as `{"error": {"code": ..., "message": ..., "status": ...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderErrorBody {
    pub(crate) error: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProviderErrorDetail {
    pub(crate) message: Option<String>,
}
