//! EduGen gateway - a rate-limited facade over generative-AI and speech providers
//!
//! This library provides the HTTP surface the EduGen frontend talks to: chat (optionally about
//! an attached PDF or DOCX), quiz generation, speech-to-text and text-to-speech. Each route
//! validates its input, charges a per-client quota, and forwards at most one request to the
//! upstream provider, translating every failure into a uniform JSON error envelope.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use bon::Builder;
use std::{borrow::Cow, sync::Arc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, instrument, warn};

pub mod ai;
pub mod client;
pub mod documents;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod quiz;
pub mod rate_limit;
pub mod secret;
pub mod speech;

use ai::{AiClient, GeminiClient, GeminiSettings};
use client::HttpClient;
use rate_limit::{FixedWindowLimiter, QuotaPolicy, RateLimiter};
use speech::{GoogleSpeechClient, SpeechClient, SpeechSettings};

/// Frontends allowed to call the gateway when nothing else is configured.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] =
    &["https://edugen-ai-zeta.vercel.app", "http://localhost:3000"];

/// Settings for the HTTP surface itself, independent of any upstream provider.
#[derive(Debug, Clone, Builder)]
pub struct GatewaySettings {
    /// Origins permitted by CORS. A single `*` allows any origin.
    #[builder(default = DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect())]
    pub allowed_origins: Vec<String>,
    /// Identify clients by `X-Forwarded-For` rather than the peer address.
    #[builder(default)]
    pub trust_forwarded_for: bool,
    /// Largest accepted speech-to-text upload, in bytes.
    #[builder(default = 10 * 1024 * 1024)]
    pub max_audio_bytes: usize,
    /// Largest accepted chat body, in bytes, including any base64 document.
    #[builder(default = 16 * 1024 * 1024)]
    pub max_chat_body_bytes: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The main application state: the upstream clients, the rate limiter and gateway settings
#[derive(Clone, Debug, Builder)]
pub struct AppState {
    pub ai: Arc<dyn AiClient>,
    pub speech: Arc<dyn SpeechClient>,
    #[builder(default = default_limiter())]
    pub limiter: Arc<dyn RateLimiter>,
    #[builder(default)]
    pub settings: GatewaySettings,
}

fn default_limiter() -> Arc<dyn RateLimiter> {
    Arc::new(FixedWindowLimiter::new(QuotaPolicy::default()))
}

impl AppState {
    /// Create a new AppState talking to Google's APIs over the default Hyper client
    pub fn new(ai: GeminiSettings, speech: SpeechSettings, settings: GatewaySettings) -> Self {
        let http_client = client::create_hyper_client(std::time::Duration::from_secs(90), 100);
        Self::with_client(ai, speech, settings, http_client)
    }

    /// Create a new AppState with a custom HTTP client (useful for testing)
    pub fn with_client<T>(
        ai: GeminiSettings,
        speech: SpeechSettings,
        settings: GatewaySettings,
        http_client: T,
    ) -> Self
    where
        T: HttpClient + Clone + Send + Sync + 'static,
    {
        Self::builder()
            .ai(Arc::new(GeminiClient::new(ai, http_client.clone())))
            .speech(Arc::new(GoogleSpeechClient::new(speech, http_client)))
            .settings(settings)
            .build()
    }

    /// Replace the rate limiter, e.g. to disable limiting or share state across instances.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the main router for the gateway
/// This creates routes for:
/// - `/api/health` - Liveness plus whether upstream credentials are present
/// - `/api/chat` and `/api/generate-quiz` - Generative-AI calls (expensive quota)
/// - `/api/speech-to-text` and `/api/text-to-speech` - Speech calls (standard quota)
#[instrument(skip(state))]
pub fn build_router(state: AppState) -> Router {
    info!("Building router");
    let cors = cors_layer(&state.settings.allowed_origins);
    let audio_limit = DefaultBodyLimit::max(state.settings.max_audio_bytes);
    let chat_limit = DefaultBodyLimit::max(state.settings.max_chat_body_bytes);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/chat", post(handlers::chat).layer(chat_limit))
        .route("/api/generate-quiz", post(handlers::generate_quiz))
        .route(
            "/api/speech-to-text",
            post(handlers::speech_to_text).layer(audio_limit),
        )
        .route("/api/text-to-speech", post(handlers::text_to_speech))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection.
///
/// # Parameters
/// - `prefix`: A string prefix for the metrics, which can be either a string literal or an owned
///   string. The `'static` lifetime is required by the Prometheus metrics layer.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use std::time::Duration;

    pub struct MockHttpClient {
        pub requests: Arc<Mutex<Vec<MockRequest>>>,
        response_builder: Arc<dyn Fn() -> axum::response::Response + Send + Sync>,
        delay: Option<Duration>,
    }

    #[derive(Debug, Clone)]
    pub struct MockRequest {
        pub method: String,
        pub uri: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl MockHttpClient {
        pub fn new(status: StatusCode, body: &str) -> Self {
            let body = body.to_string();
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                response_builder: Arc::new(move || {
                    axum::response::Response::builder()
                        .status(status)
                        .header("content-type", "application/json")
                        .body(axum::body::Body::from(body.clone()))
                        .unwrap()
                }),
                delay: None,
            }
        }

        /// Makes every request take this long before answering.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn get_requests(&self) -> Vec<MockRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl std::fmt::Debug for MockHttpClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockHttpClient")
                .field("requests", &self.requests)
                .field("response_builder", &"<closure>")
                .field("delay", &self.delay)
                .finish()
        }
    }

    impl Clone for MockHttpClient {
        fn clone(&self) -> Self {
            Self {
                requests: Arc::clone(&self.requests),
                response_builder: Arc::clone(&self.response_builder),
                delay: self.delay,
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(
            &self,
            req: axum::extract::Request,
        ) -> Result<axum::response::Response, Box<dyn std::error::Error + Send + Sync>> {
            // Extract request details
            let method = req.method().to_string();
            let uri = req.uri().to_string();
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            // Read body
            let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?
                .to_vec();

            // Store the request
            let mock_request = MockRequest {
                method,
                uri,
                headers,
                body,
            };
            self.requests.lock().unwrap().push(mock_request);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            // Return the configured response
            Ok((self.response_builder)())
        }
    }
}
