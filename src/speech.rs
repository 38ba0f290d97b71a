//! Upstream speech-to-text and text-to-speech client
//!
//! Browser recordings arrive in whatever container the client produced (usually WebM/Opus).
//! Before recognition the container is identified from its magic bytes and mapped onto an
//! encoding the recognizer accepts natively, reading sample rates out of the headers where
//! the recognizer needs them. Synthesis always produces MP3.
use async_trait::async_trait;
use axum::body::Bytes;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    ai::ProviderErrorBody,
    client::{HttpClient, UpstreamResponse, post_json},
    errors::{GatewayError, UpstreamError},
    models::TextToSpeechRequest,
    secret::{ApiKey, redact},
};

const STT_SERVICE: &str = "Speech-to-text";
const TTS_SERVICE: &str = "Text-to-speech";
const SETTINGS_SERVICE: &str = "Speech services";

pub const DEFAULT_STT_URL: &str = "https://speech.googleapis.com/v1p1beta1/speech:recognize";
pub const DEFAULT_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Opus in WebM/Ogg is always decoded at 48 kHz.
const OPUS_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    #[error("No audio file provided.")]
    Empty,
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("Malformed WAV file: {0}")]
    MalformedWav(&'static str),
}

impl From<AudioError> for GatewayError {
    fn from(e: AudioError) -> Self {
        GatewayError::InvalidInput(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Webm,
    Ogg,
    Wav,
    Flac,
    Mp3,
}

impl AudioFormat {
    /// The container browsers' MediaRecorder produces by default.
    pub const DEFAULT: AudioFormat = AudioFormat::Webm;

    /// Interprets a declared format, either a bare name ("wav") or a MIME type
    /// ("audio/webm;codecs=opus").
    pub fn from_declared(declared: &str) -> Option<Self> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let name = essence.rsplit('/').next().unwrap_or_default();
        match name {
            "webm" => Some(Self::Webm),
            "ogg" | "opus" => Some(Self::Ogg),
            "wav" | "wave" | "x-wav" | "vnd.wave" => Some(Self::Wav),
            "flac" | "x-flac" => Some(Self::Flac),
            "mp3" | "mpeg" | "mpeg3" | "x-mpeg-3" => Some(Self::Mp3),
            _ => None,
        }
    }

    /// Identifies a container from its leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(Self::Webm),
            [b'O', b'g', b'g', b'S', ..] => Some(Self::Ogg),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(Self::Wav),
            [b'f', b'L', b'a', b'C', ..] => Some(Self::Flac),
            [b'I', b'D', b'3', ..] => Some(Self::Mp3),
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(Self::Mp3),
            _ => None,
        }
    }

    /// The recognizer's name for audio in this container.
    pub fn recognizer_encoding(&self) -> &'static str {
        match self {
            Self::Webm => "WEBM_OPUS",
            Self::Ogg => "OGG_OPUS",
            Self::Wav => "LINEAR16",
            Self::Flac => "FLAC",
            Self::Mp3 => "MP3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
        };
        f.write_str(name)
    }
}

/// Validated audio ready for recognition.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub bytes: Bytes,
    pub format: AudioFormat,
    pub sample_rate_hertz: Option<u32>,
}

impl AudioInput {
    /// Validates uploaded audio against its declared format.
    ///
    /// The bytes win over the declaration: a recording labelled `webm` that is actually WAV is
    /// sent as WAV. Bytes that cannot be identified fall back to the declared (or default)
    /// format, which must then be one the recognizer supports.
    pub fn new(bytes: Bytes, declared: Option<&str>) -> Result<Self, AudioError> {
        if bytes.is_empty() {
            return Err(AudioError::Empty);
        }

        let declared_format = match declared.map(str::trim).filter(|d| !d.is_empty()) {
            Some(declared) => Some(
                AudioFormat::from_declared(declared)
                    .ok_or_else(|| AudioError::UnsupportedFormat(declared.to_string())),
            ),
            None => None,
        };

        let format = match (AudioFormat::sniff(&bytes), declared_format) {
            (Some(sniffed), Some(Ok(declared))) if sniffed != declared => {
                debug!(%declared, %sniffed, "Declared audio format does not match contents");
                sniffed
            }
            (Some(sniffed), _) => sniffed,
            (None, Some(declared)) => declared?,
            (None, None) => AudioFormat::DEFAULT,
        };

        let sample_rate_hertz = match format {
            AudioFormat::Webm | AudioFormat::Ogg => Some(OPUS_SAMPLE_RATE),
            AudioFormat::Wav => Some(wav_sample_rate(&bytes)?),
            AudioFormat::Mp3 => mp3_sample_rate(&bytes),
            AudioFormat::Flac => None,
        };

        Ok(Self {
            bytes,
            format,
            sample_rate_hertz,
        })
    }
}

/// Reads the sample rate from a RIFF/WAVE `fmt ` chunk.
fn wav_sample_rate(bytes: &[u8]) -> Result<u32, AudioError> {
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body = offset + 8;
        if id == b"fmt " {
            if size < 16 || body + 16 > bytes.len() {
                return Err(AudioError::MalformedWav("truncated fmt chunk"));
            }
            let audio_format = u16::from_le_bytes([bytes[body], bytes[body + 1]]);
            // 1 = integer PCM, 0xFFFE = WAVE_FORMAT_EXTENSIBLE
            if audio_format != 1 && audio_format != 0xFFFE {
                return Err(AudioError::MalformedWav("only linear PCM is supported"));
            }
            let rate = u32::from_le_bytes([
                bytes[body + 4],
                bytes[body + 5],
                bytes[body + 6],
                bytes[body + 7],
            ]);
            if rate == 0 {
                return Err(AudioError::MalformedWav("zero sample rate"));
            }
            return Ok(rate);
        }
        // Chunks are padded to even sizes
        offset = body.saturating_add(size).saturating_add(size & 1);
    }
    Err(AudioError::MalformedWav("missing fmt chunk"))
}

/// Best-effort sample rate from the first MPEG audio frame header, skipping any ID3v2 tag.
fn mp3_sample_rate(bytes: &[u8]) -> Option<u32> {
    let mut offset = 0;
    if bytes.len() >= 10 && &bytes[..3] == b"ID3" {
        // Tag size is a 28-bit synchsafe integer
        let size = bytes[6..10]
            .iter()
            .fold(0usize, |acc, b| (acc << 7) | (*b as usize & 0x7F));
        offset = 10 + size;
    }
    let header = bytes.get(offset..offset + 4)?;
    if header[0] != 0xFF || header[1] & 0xE0 != 0xE0 {
        return None;
    }
    let version = (header[1] >> 3) & 0b11;
    let rate_index = (header[2] >> 2) & 0b11;
    let base = match rate_index {
        0 => 44_100,
        1 => 48_000,
        2 => 32_000,
        _ => return None,
    };
    match version {
        0b11 => Some(base),     // MPEG 1
        0b10 => Some(base / 2), // MPEG 2
        0b00 => Some(base / 4), // MPEG 2.5
        _ => None,
    }
}

/// The speech operations the gateway needs.
#[async_trait]
pub trait SpeechClient: fmt::Debug + Send + Sync {
    fn is_configured(&self) -> bool;

    /// Returns the recognized text, or an empty string when no speech was detected.
    async fn transcribe(&self, audio: &AudioInput) -> Result<String, UpstreamError>;

    /// Returns raw MP3 bytes.
    async fn synthesize(&self, request: &TextToSpeechRequest) -> Result<Vec<u8>, UpstreamError>;
}

#[derive(Debug, Clone, Builder)]
pub struct SpeechSettings {
    pub api_key: Option<ApiKey>,
    #[builder(default = parse_default(DEFAULT_STT_URL))]
    pub recognize_url: Url,
    #[builder(default = parse_default(DEFAULT_TTS_URL))]
    pub synthesize_url: Url,
    #[builder(default = "en-US".to_string(), into)]
    pub language_code: String,
    #[builder(into)]
    pub voice_name: Option<String>,
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,
}

fn parse_default(url: &str) -> Url {
    Url::parse(url).expect("default speech URLs are valid")
}

#[derive(Debug, Clone)]
pub struct GoogleSpeechClient<T: HttpClient> {
    settings: SpeechSettings,
    http_client: T,
}

impl<T: HttpClient + Send + Sync> GoogleSpeechClient<T> {
    pub fn new(settings: SpeechSettings, http_client: T) -> Self {
        Self {
            settings,
            http_client,
        }
    }

    fn key(&self) -> Result<&ApiKey, UpstreamError> {
        self.settings
            .api_key
            .as_ref()
            .ok_or(UpstreamError::NotConfigured(SETTINGS_SERVICE))
    }

    async fn call<P: Serialize + Sync>(
        &self,
        service: &'static str,
        url: &Url,
        payload: &P,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let key = self.key()?;
        let response = post_json(
            &self.http_client,
            service,
            url,
            &[("x-goog-api-key", key.expose())],
            payload,
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
                service,
                status: response.status,
                message: redact(&message, Some(key)),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl<T: HttpClient + Send + Sync> SpeechClient for GoogleSpeechClient<T> {
    fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    #[instrument(skip(self, audio), fields(format = %audio.format, bytes = audio.bytes.len()))]
    async fn transcribe(&self, audio: &AudioInput) -> Result<String, UpstreamError> {
        let payload = RecognizeRequest {
            config: RecognitionConfig {
                encoding: audio.format.recognizer_encoding(),
                sample_rate_hertz: audio.sample_rate_hertz,
                language_code: &self.settings.language_code,
                enable_automatic_punctuation: true,
            },
            audio: RecognitionAudio {
                content: STANDARD.encode(&audio.bytes),
            },
        };
        let response = self
            .call(STT_SERVICE, &self.settings.recognize_url, &payload)
            .await?;

        let parsed: RecognizeResponse =
            serde_json::from_slice(&response.body).map_err(|e| UpstreamError::InvalidResponse {
                service: STT_SERVICE,
                message: format!("malformed body: {e}"),
            })?;

        let text = parsed
            .results
            .into_iter()
            .filter_map(|result| result.alternatives.into_iter().next())
            .map(|alternative| alternative.transcript.trim().to_string())
            .filter(|transcript| !transcript.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            debug!("No speech detected");
        }
        Ok(text)
    }

    #[instrument(skip(self, request), fields(chars = request.text.len()))]
    async fn synthesize(&self, request: &TextToSpeechRequest) -> Result<Vec<u8>, UpstreamError> {
        let payload = SynthesizeRequest {
            input: SynthesisInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: &self.settings.language_code,
                name: self.settings.voice_name.as_deref(),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
            },
        };
        let response = self
            .call(TTS_SERVICE, &self.settings.synthesize_url, &payload)
            .await?;

        let parsed: SynthesizeResponse =
            serde_json::from_slice(&response.body).map_err(|e| UpstreamError::InvalidResponse {
                service: TTS_SERVICE,
                message: format!("malformed body: {e}"),
            })?;
        let audio = parsed
            .audio_content
            .as_deref()
            .map(|content| STANDARD.decode(content))
            .transpose()
            .map_err(|e| UpstreamError::InvalidResponse {
                service: TTS_SERVICE,
                message: format!("audio is not valid base64: {e}"),
            })?
            .unwrap_or_default();
        if audio.is_empty() {
            return Err(UpstreamError::InvalidResponse {
                service: TTS_SERVICE,
                message: "no audio returned".into(),
            });
        }
        Ok(audio)
    }
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate_hertz: Option<u32>,
    language_code: &'a str,
    enable_automatic_punctuation: bool,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_utils::MockHttpClient;
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    const WEBM_HEADER: [u8; 8] = [0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81];

    /// A minimal 16-bit mono PCM WAV with a handful of silent samples.
    pub(crate) fn wav_bytes(sample_rate: u32) -> Vec<u8> {
        let data = [0u8; 32];
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
        wav.extend_from_slice(&data);
        wav
    }

    fn client(mock: MockHttpClient) -> GoogleSpeechClient<MockHttpClient> {
        GoogleSpeechClient::new(
            SpeechSettings::builder()
                .api_key(ApiKey::new("speech-key").unwrap())
                .build(),
            mock,
        )
    }

    #[test]
    fn declared_formats_accept_names_and_mime_types() {
        assert_eq!(AudioFormat::from_declared("webm"), Some(AudioFormat::Webm));
        assert_eq!(
            AudioFormat::from_declared("audio/webm;codecs=opus"),
            Some(AudioFormat::Webm)
        );
        assert_eq!(AudioFormat::from_declared("audio/x-wav"), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::from_declared("audio/mpeg"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_declared("OGG"), Some(AudioFormat::Ogg));
        assert_eq!(AudioFormat::from_declared("video/mp4"), None);
    }

    #[test]
    fn sniffing_recognizes_common_containers() {
        assert_eq!(AudioFormat::sniff(&WEBM_HEADER), Some(AudioFormat::Webm));
        assert_eq!(AudioFormat::sniff(b"OggS\0\x02"), Some(AudioFormat::Ogg));
        assert_eq!(AudioFormat::sniff(&wav_bytes(16_000)), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::sniff(b"fLaC\0\0\0\x22"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::sniff(b"ID3\x04\0\0"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::sniff(&[0xFF, 0xFB, 0x90, 0x64]), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::sniff(b"hello world"), None);
    }

    #[test]
    fn contents_override_a_wrong_declaration() {
        let input = AudioInput::new(Bytes::from(wav_bytes(16_000)), Some("webm")).unwrap();
        assert_eq!(input.format, AudioFormat::Wav);
        assert_eq!(input.sample_rate_hertz, Some(16_000));
    }

    #[test]
    fn unidentifiable_bytes_fall_back_to_declared_or_default() {
        let input = AudioInput::new(Bytes::from_static(b"opaque"), Some("flac")).unwrap();
        assert_eq!(input.format, AudioFormat::Flac);
        assert_eq!(input.sample_rate_hertz, None);

        let input = AudioInput::new(Bytes::from_static(b"opaque"), None).unwrap();
        assert_eq!(input.format, AudioFormat::Webm);
        assert_eq!(input.sample_rate_hertz, Some(48_000));

        assert_eq!(
            AudioInput::new(Bytes::from_static(b"opaque"), Some("video/mp4")).unwrap_err(),
            AudioError::UnsupportedFormat("video/mp4".into())
        );
    }

    #[test]
    fn empty_audio_is_rejected() {
        assert_eq!(
            AudioInput::new(Bytes::new(), Some("webm")).unwrap_err(),
            AudioError::Empty
        );
    }

    #[test]
    fn wav_header_problems_are_reported() {
        let mut truncated = wav_bytes(16_000);
        truncated.truncate(30);
        assert!(matches!(
            AudioInput::new(Bytes::from(truncated), None),
            Err(AudioError::MalformedWav(_))
        ));

        let mut float = wav_bytes(16_000);
        float[20] = 3; // IEEE float
        assert_eq!(
            wav_sample_rate(&float),
            Err(AudioError::MalformedWav("only linear PCM is supported"))
        );
    }

    #[test]
    fn mp3_sample_rate_reads_frame_header() {
        // MPEG-1 Layer III, 44.1 kHz
        assert_eq!(mp3_sample_rate(&[0xFF, 0xFB, 0x90, 0x64]), Some(44_100));
        // Same frame behind an empty ID3v2 tag
        let mut tagged = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
        tagged.extend_from_slice(&[0xFF, 0xFB, 0x94, 0x64]);
        assert_eq!(mp3_sample_rate(&tagged), Some(48_000));
        assert_eq!(mp3_sample_rate(b"ID3"), None);
    }

    #[tokio::test]
    async fn transcribe_sends_native_encoding_and_joins_results() {
        let mock = MockHttpClient::new(
            StatusCode::OK,
            r#"{"results": [
                {"alternatives": [{"transcript": "hello there", "confidence": 0.9}]},
                {"alternatives": [{"transcript": " general kenobi "}]}
            ]}"#,
        );
        let audio = AudioInput::new(Bytes::from_static(&WEBM_HEADER), None).unwrap();

        let text = client(mock.clone()).transcribe(&audio).await.unwrap();
        assert_eq!(text, "hello there general kenobi");

        let requests = mock.get_requests();
        assert_eq!(requests[0].uri, DEFAULT_STT_URL);
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["config"]["encoding"], "WEBM_OPUS");
        assert_eq!(body["config"]["sampleRateHertz"], 48_000);
        assert_eq!(body["config"]["languageCode"], "en-US");
        assert_eq!(body["audio"]["content"], STANDARD.encode(WEBM_HEADER));
    }

    #[tokio::test]
    async fn no_speech_detected_is_empty_text() {
        let mock = MockHttpClient::new(StatusCode::OK, r#"{"totalBilledTime": "1s"}"#);
        let audio = AudioInput::new(Bytes::from(wav_bytes(8_000)), Some("wav")).unwrap();
        assert_eq!(client(mock).transcribe(&audio).await.unwrap(), "");
    }

    #[tokio::test]
    async fn recognizer_failure_is_an_upstream_error() {
        let mock = MockHttpClient::new(
            StatusCode::FORBIDDEN,
            r#"{"error": {"code": 403, "message": "key speech-key has no access"}}"#,
        );
        let audio = AudioInput::new(Bytes::from_static(&WEBM_HEADER), None).unwrap();
        let err = client(mock).transcribe(&audio).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Speech-to-text returned 403 Forbidden: key [REDACTED] has no access"
        );
    }

    #[tokio::test]
    async fn synthesize_decodes_provider_audio() {
        let mp3 = vec![0xFF, 0xFB, 0x90, 0x64, 1, 2, 3];
        let mock = MockHttpClient::new(
            StatusCode::OK,
            &json!({"audioContent": STANDARD.encode(&mp3)}).to_string(),
        );
        let audio = client(mock.clone())
            .synthesize(&TextToSpeechRequest {
                text: "Hello".into(),
            })
            .await
            .unwrap();
        assert_eq!(audio, mp3);

        let body: Value = serde_json::from_slice(&mock.get_requests()[0].body).unwrap();
        assert_eq!(
            body,
            json!({
                "input": {"text": "Hello"},
                "voice": {"languageCode": "en-US"},
                "audioConfig": {"audioEncoding": "MP3"}
            })
        );
    }

    #[tokio::test]
    async fn synthesize_without_audio_is_an_upstream_error() {
        let mock = MockHttpClient::new(StatusCode::OK, r#"{"audioContent": ""}"#);
        let err = client(mock)
            .synthesize(&TextToSpeechRequest {
                text: "Hello".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn unconfigured_speech_client_never_calls_upstream() {
        let mock = MockHttpClient::new(StatusCode::OK, "{}");
        let client = GoogleSpeechClient::new(SpeechSettings::builder().build(), mock.clone());
        assert!(!client.is_configured());
        let err = client
            .synthesize(&TextToSpeechRequest { text: "Hi".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotConfigured(_)));
        assert!(mock.get_requests().is_empty());
    }
}
