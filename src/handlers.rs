/// Axum handlers for the gateway routes
///
/// Every handler follows the same order: validate the payload, charge the caller's quota,
/// check the upstream is configured, then make at most one upstream call. Invalid requests
/// therefore never consume quota or reach a provider.
use crate::{
    AppState,
    documents::{self, Attachment},
    errors::{GatewayError, UpstreamError},
    models::{
        ChatInput, ChatPayload, ChatResponse, DocumentRequest, FeatureStatus, HealthResponse,
        QuizPayload, QuizRequest, QuizResponse, ServiceStatus, SpeechToTextResponse, TTS_FORMAT,
        TextToSpeechPayload, TextToSpeechRequest, TextToSpeechResponse,
    },
    rate_limit::{Admission, RateLimitKey, RouteCategory},
    speech::{AudioError, AudioInput},
};
use axum::{
    Json,
    extract::{
        ConnectInfo, FromRequestParts, Multipart, State, multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::request::Parts,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::{convert::Infallible, net::SocketAddr};
use tracing::{debug, info, instrument};

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Multipart field names accepted as the audio upload.
const AUDIO_FIELDS: &[&str] = &["audio", "file", "audio_file"];

const NO_DOCUMENT_TEXT: &str = "Sorry, I could not extract any text from the document. \
    It might be empty or an image-based file.";

/// Who a request is charged to for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    /// Uses the last `X-Forwarded-For` hop when the deployment sits behind a trusted proxy,
    /// otherwise the peer address. The last hop is the one the proxy appended; anything before
    /// it came from the client and can be forged.
    pub fn resolve(parts: &Parts, trust_forwarded_for: bool) -> Self {
        if trust_forwarded_for
            && let Some(forwarded) = parts
                .headers
                .get(FORWARDED_FOR_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| {
                    value
                        .rsplit(',')
                        .map(str::trim)
                        .find(|hop| !hop.is_empty())
                })
        {
            return Self(forwarded.to_string());
        }

        match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Self(addr.ip().to_string()),
            None => Self("unknown".to_string()),
        }
    }
}

impl FromRequestParts<AppState> for ClientIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(parts, state.settings.trust_forwarded_for))
    }
}

async fn enforce_quota(
    state: &AppState,
    client: &ClientIdentity,
    category: RouteCategory,
) -> Result<(), GatewayError> {
    let key = RateLimitKey::new(client.0.clone(), category);
    match state.limiter.admit(&key).await {
        Admission::Admitted => Ok(()),
        Admission::Rejected { retry_after } => {
            info!(client = %client.0, %category, "Rejecting rate limited request");
            Err(GatewayError::RateLimitExceeded { retry_after })
        }
    }
}

fn ensure_configured(configured: bool, service: &'static str) -> Result<(), GatewayError> {
    if configured {
        Ok(())
    } else {
        Err(UpstreamError::NotConfigured(service).into())
    }
}

#[instrument(skip(state))]
pub async fn health(
    State(state): State<AppState>,
    client: ClientIdentity,
) -> Result<Json<HealthResponse>, GatewayError> {
    enforce_quota(&state, &client, RouteCategory::Standard).await?;

    let services = ServiceStatus {
        ai: state.ai.is_configured(),
        speech: state.speech.is_configured(),
    };
    Ok(Json(HealthResponse {
        status: "ok".into(),
        configured: services.ai && services.speech,
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        services,
        features: FeatureStatus {
            document_processing: true,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn chat(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Json<ChatResponse>, GatewayError> {
    let Json(payload) = payload?;
    let document = match ChatInput::try_from(payload)? {
        ChatInput::Message(request) => {
            enforce_quota(&state, &client, RouteCategory::Expensive).await?;
            ensure_configured(state.ai.is_configured(), "AI service")?;
            let response = state.ai.chat(&request).await?;
            return Ok(Json(ChatResponse { response }));
        }
        ChatInput::Document {
            attachment,
            question,
        } => read_document(&attachment, question).await?,
    };

    enforce_quota(&state, &client, RouteCategory::Expensive).await?;
    if document.text.is_empty() {
        info!(filename = %document.filename, "Document has no extractable text");
        return Ok(Json(ChatResponse {
            response: NO_DOCUMENT_TEXT.into(),
        }));
    }
    ensure_configured(state.ai.is_configured(), "AI service")?;

    let response = state.ai.analyze_document(&document).await?;
    Ok(Json(ChatResponse { response }))
}

/// Extraction failures are the caller's fault (a corrupt or unsupported file) and are reported
/// before any quota is spent.
async fn read_document(
    attachment: &Attachment,
    question: Option<String>,
) -> Result<DocumentRequest, GatewayError> {
    let text = documents::extract_text(attachment).await?;
    Ok(DocumentRequest {
        filename: attachment.filename.clone(),
        text,
        question,
    })
}

#[instrument(skip(state, payload))]
pub async fn generate_quiz(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<QuizPayload>, JsonRejection>,
) -> Result<Json<QuizResponse>, GatewayError> {
    let Json(payload) = payload?;
    let request = QuizRequest::try_from(payload)?;

    enforce_quota(&state, &client, RouteCategory::Expensive).await?;
    ensure_configured(state.ai.is_configured(), "AI service")?;

    let mut questions = state.ai.generate_quiz(&request).await?;
    questions.truncate(request.count as usize);
    info!(
        topic = %request.topic,
        requested = request.count,
        generated = questions.len(),
        "Quiz generated"
    );
    Ok(Json(QuizResponse { questions }))
}

/// Pulls the audio part (and optional `format` field) out of a multipart upload.
async fn read_audio_upload(mut multipart: Multipart) -> Result<AudioInput, GatewayError> {
    let mut audio = None;
    let mut declared_format = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "format" {
            declared_format = Some(field.text().await?);
        } else if AUDIO_FIELDS.contains(&name.as_str())
            || (audio.is_none() && field.file_name().is_some())
        {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            debug!(field = %name, bytes = bytes.len(), "Received audio part");
            audio = Some((bytes, content_type));
        }
    }

    let (bytes, content_type) = audio.ok_or(AudioError::Empty)?;
    let declared = declared_format
        .filter(|format| !format.trim().is_empty())
        .or(content_type.filter(|ct| ct != "application/octet-stream"));
    Ok(AudioInput::new(bytes, declared.as_deref())?)
}

#[instrument(skip(state, multipart))]
pub async fn speech_to_text(
    State(state): State<AppState>,
    client: ClientIdentity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SpeechToTextResponse>, GatewayError> {
    let audio = read_audio_upload(multipart?).await?;

    enforce_quota(&state, &client, RouteCategory::Standard).await?;
    ensure_configured(state.speech.is_configured(), "Speech service")?;

    let text = state.speech.transcribe(&audio).await?;
    Ok(Json(SpeechToTextResponse { text }))
}

#[instrument(skip(state, payload))]
pub async fn text_to_speech(
    State(state): State<AppState>,
    client: ClientIdentity,
    payload: Result<Json<TextToSpeechPayload>, JsonRejection>,
) -> Result<Json<TextToSpeechResponse>, GatewayError> {
    let Json(payload) = payload?;
    let request = TextToSpeechRequest::try_from(payload)?;

    enforce_quota(&state, &client, RouteCategory::Standard).await?;
    ensure_configured(state.speech.is_configured(), "Speech service")?;

    let audio = state.speech.synthesize(&request).await?;
    if audio.is_empty() {
        return Err(UpstreamError::InvalidResponse {
            service: "Text-to-speech",
            message: "no audio returned".into(),
        }
        .into());
    }
    Ok(Json(TextToSpeechResponse {
        audio: STANDARD.encode(&audio),
        format: TTS_FORMAT.into(),
    }))
}

/// Unknown paths still answer with the uniform envelope.
pub async fn not_found() -> GatewayError {
    GatewayError::NotFound
}
