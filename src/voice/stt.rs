//! Speech-to-text (STT) processing

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};

use crate::config::SttConfig;
use crate::{Error, Result};

/// Response from the ASR endpoint
#[derive(serde::Deserialize)]
struct AsrResponse {
    #[serde(default)]
    err_no: i64,
    #[serde(default)]
    err_msg: String,
    #[serde(default)]
    result: Vec<String>,
}

/// Transcribes an utterance to text
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe raw PCM16LE mono audio, returning the best candidate
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, a service error, or an empty result
    async fn transcribe(&self, pcm: &[u8]) -> Result<String>;
}

/// Remote ASR service reached over a streaming HTTP upload
pub struct HttpSpeechToText {
    client: reqwest::Client,
    url: String,
    token: String,
    dev_pid: u32,
    cuid: String,
    sample_rate: u32,
    upload_chunk_bytes: usize,
}

impl HttpSpeechToText {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if the token is missing or the HTTP client cannot be built
    pub fn new(config: &SttConfig, sample_rate: u32) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("STT token required (SPARKBOT_STT_TOKEN)".to_string()))?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            token,
            dev_pid: config.dev_pid,
            cuid: config.cuid.clone(),
            sample_rate,
            upload_chunk_bytes: config.upload_chunk_bytes.max(1),
        })
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(&self, pcm: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = pcm.len(), "starting transcription");

        let url = format!(
            "{}?dev_pid={}&cuid={}&token={}",
            self.url,
            self.dev_pid,
            urlencoding::encode(&self.cuid),
            urlencoding::encode(&self.token)
        );

        // Upload in fixed pieces against the declared total length
        let chunks: Vec<std::io::Result<Vec<u8>>> = pcm
            .chunks(self.upload_chunk_bytes)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let body = reqwest::Body::wrap_stream(futures::stream::iter(chunks));

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, format!("audio/pcm;rate={}", self.sample_rate))
            .header(CONTENT_LENGTH, pcm.len())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "STT request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::Stt(format!("STT API error {status}: {body}")));
        }

        let body = response.text().await?;
        let transcript = parse_asr_response(&body)?;

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

/// Extract the first transcription candidate from an ASR response body
///
/// # Errors
///
/// Returns error if the body is not JSON, reports a service error, or has no
/// non-empty first candidate
pub fn parse_asr_response(body: &str) -> Result<String> {
    let parsed: AsrResponse = serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, body, "failed to parse STT response");
        Error::Stt(format!("malformed response: {e}"))
    })?;

    if parsed.err_no != 0 {
        return Err(Error::Stt(format!(
            "service error {}: {}",
            parsed.err_no, parsed.err_msg
        )));
    }

    match parsed.result.into_iter().next() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => {
            tracing::warn!(body, "STT response has no transcription");
            Err(Error::Stt("empty transcription".to_string()))
        }
    }
}
