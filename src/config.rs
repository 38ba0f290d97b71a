//! Configuration parsing and validation for the gateway server
//!
//! This module handles command-line argument parsing and validation using clap.
//! Every flag can also be supplied through the environment, which is how the gateway is
//! configured when deployed.
use anyhow::anyhow;
use clap::Parser;
use edugen_gateway::{
    DEFAULT_ALLOWED_ORIGINS, GatewaySettings,
    ai::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL, GeminiSettings},
    secret::ApiKey,
    speech::{DEFAULT_STT_URL, DEFAULT_TTS_URL, SpeechSettings},
};
use std::time::Duration;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port on which the gateway will listen.
    #[arg(short = 'p', long, env = "PORT", default_value_t = 10000)]
    pub port: u16,

    /// The port on which the metrics server will listen.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Whether to enable the metrics endpoint.
    #[arg(short = 'm', long, env = "METRICS", default_value_t = false)]
    pub metrics: bool,

    /// The prefix to use for metrics.
    #[arg(long, default_value = "edugen")]
    pub metrics_prefix: String,

    /// API key for the generative-AI provider.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<ApiKey>,

    /// API key for the speech provider. Falls back to the generative-AI key.
    #[arg(long, env = "GOOGLE_SPEECH_API_KEY", hide_env_values = true)]
    pub speech_api_key: Option<ApiKey>,

    /// Model used for chat and quiz generation.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,

    /// Base URL of the generative-AI API.
    #[arg(long, env = "GEMINI_URL", default_value = DEFAULT_GEMINI_URL)]
    pub gemini_url: Url,

    /// Speech recognition endpoint.
    #[arg(long, env = "STT_URL", default_value = DEFAULT_STT_URL)]
    pub stt_url: Url,

    /// Speech synthesis endpoint.
    #[arg(long, env = "TTS_URL", default_value = DEFAULT_TTS_URL)]
    pub tts_url: Url,

    /// Language used for both recognition and synthesis.
    #[arg(long, env = "SPEECH_LANGUAGE", default_value = "en-US")]
    pub speech_language: String,

    /// Specific synthesis voice. The provider picks one for the language when unset.
    #[arg(long, env = "TTS_VOICE")]
    pub tts_voice: Option<String>,

    /// How long (in seconds) to wait for any single upstream call.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    /// Origins allowed by CORS, comma separated. `*` allows any origin.
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string())
    )]
    pub allowed_origins: Vec<String>,

    /// Identify clients by the first `X-Forwarded-For` hop. Only enable behind a proxy
    /// that sets the header.
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value_t = false)]
    pub trust_forwarded_for: bool,

    /// Turn off per-client quotas entirely.
    #[arg(long, env = "DISABLE_RATE_LIMIT", default_value_t = false)]
    pub disable_rate_limit: bool,

    /// Largest accepted audio upload, in bytes.
    #[arg(long, env = "MAX_AUDIO_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_audio_bytes: usize,

    /// Largest accepted chat body, in bytes. Attached documents travel base64-encoded inside it.
    #[arg(long, env = "MAX_CHAT_BODY_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_chat_body_bytes: usize,

    /// Maximum number of idle HTTP connections to keep alive per upstream host.
    #[arg(long, default_value_t = 100)]
    pub pool_max_idle_per_host: usize,

    /// How long (in seconds) to keep idle HTTP connections alive.
    #[arg(long, default_value_t = 90)]
    pub pool_idle_timeout_secs: u64,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if self.upstream_timeout_secs == 0 {
            return Err(anyhow!("Upstream timeout must be at least one second"));
        }
        if self.allowed_origins.iter().all(|o| o.trim().is_empty()) {
            return Err(anyhow!("At least one allowed origin is required"));
        }
        // Relative joins drop the last path segment unless the base ends with a slash.
        if !self.gemini_url.path().ends_with('/') {
            return Err(anyhow!(
                "Gemini URL '{}' must end with '/'",
                self.gemini_url
            ));
        }
        if self.google_api_key.is_none() {
            warn!("GOOGLE_API_KEY is not set; AI routes will report the service as unconfigured");
        }
        if self.speech_key().is_none() {
            warn!(
                "No speech API key is set; speech routes will report the service as unconfigured"
            );
        }
        Ok(self)
    }

    fn speech_key(&self) -> Option<ApiKey> {
        self.speech_api_key
            .clone()
            .or_else(|| self.google_api_key.clone())
    }

    fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings::builder()
            .maybe_api_key(self.google_api_key.clone())
            .base_url(self.gemini_url.clone())
            .model(self.gemini_model.clone())
            .timeout(self.upstream_timeout())
            .build()
    }

    pub fn speech_settings(&self) -> SpeechSettings {
        SpeechSettings::builder()
            .maybe_api_key(self.speech_key())
            .recognize_url(self.stt_url.clone())
            .synthesize_url(self.tts_url.clone())
            .language_code(self.speech_language.clone())
            .maybe_voice_name(self.tts_voice.clone())
            .timeout(self.upstream_timeout())
            .build()
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings::builder()
            .allowed_origins(
                self.allowed_origins
                    .iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
            )
            .trust_forwarded_for(self.trust_forwarded_for)
            .max_audio_bytes(self.max_audio_bytes)
            .max_chat_body_bytes(self.max_chat_body_bytes)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["edugen-gateway"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn origins_are_comma_separated() {
        let config = parse(&[
            "--allowed-origins",
            "https://a.example, https://b.example",
        ]);
        assert_eq!(
            config.gateway_settings().allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn speech_key_falls_back_to_the_ai_key() {
        let config = parse(&["--google-api-key", "shared"]);
        let speech = config.speech_settings();
        assert_eq!(speech.api_key.unwrap().expose(), "shared");

        let config = parse(&["--google-api-key", "shared", "--speech-api-key", "own"]);
        assert_eq!(config.speech_settings().api_key.unwrap().expose(), "own");
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(parse(&["--upstream-timeout-secs", "0"]).validate().is_err());
        assert!(
            parse(&["--gemini-url", "https://proxy.example/v1"])
                .validate()
                .is_err()
        );
        assert!(parse(&[]).validate().is_ok());
    }
}
