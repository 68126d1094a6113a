//! Text-to-speech (TTS) processing
//!
//! Synthesized audio is pulled as fixed-duration PCM chunks so playback can
//! start before the whole reply has been downloaded.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;

use crate::config::TtsConfig;
use crate::voice::codec::bytes_for_ms;
use crate::{Error, Result};

/// Stream of synthesized audio for one reply
#[async_trait]
pub trait SpeechStream: Send {
    /// Pull the next chunk; `Ok(None)` once the stream is exhausted
    ///
    /// # Errors
    ///
    /// Returns error if the remote stream fails mid-flight
    async fn recv(&mut self) -> Result<Option<Vec<u8>>>;

    /// Release the remote connection early
    fn close(&mut self) {}
}

/// Synthesizes speech from text
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Issue a synthesis request and return its audio stream
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the service rejects it
    async fn synthesize(&self, text: &str) -> Result<Box<dyn SpeechStream>>;
}

/// Remote TTS service returning a raw PCM body
pub struct HttpTextToSpeech {
    client: reqwest::Client,
    config: TtsConfig,
    token: String,
    chunk_bytes: usize,
}

impl HttpTextToSpeech {
    /// Create a new TTS client
    ///
    /// # Errors
    ///
    /// Returns error if the token is missing or the HTTP client cannot be built
    pub fn new(config: &TtsConfig, sample_rate: u32) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("TTS token required (SPARKBOT_TTS_TOKEN)".to_string()))?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config: config.clone(),
            token,
            chunk_bytes: bytes_for_ms(sample_rate, config.chunk_duration).max(2),
        })
    }

    /// Form-encoded request body
    fn form_body(&self, text: &str) -> String {
        let c = &self.config;
        format!(
            "tex={}&tok={}&cuid={}&ctp=1&lan={}&spd={}&pit={}&vol={}&per={}&aue={}",
            urlencoding::encode(text),
            urlencoding::encode(&self.token),
            urlencoding::encode(&c.cuid),
            urlencoding::encode(&c.lang),
            c.speed,
            c.pitch,
            c.volume,
            c.person,
            c.aue
        )
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Box<dyn SpeechStream>> {
        tracing::debug!(chars = text.len(), "sending TTS request");

        let response = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(self.form_body(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS API error {status}: {body}")));
        }

        // Errors come back as JSON with a 200 status
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(body = %body, "TTS service rejected request");
            return Err(Error::Tts(format!("TTS service error: {body}")));
        }

        tracing::debug!(
            content_length = ?response.content_length(),
            "TTS audio stream opened"
        );

        Ok(Box::new(ChunkedSpeech::new(
            response.bytes_stream().boxed(),
            self.chunk_bytes,
        )))
    }
}

/// Re-slices an HTTP body into fixed-size PCM chunks
pub struct ChunkedSpeech<S> {
    inner: Option<S>,
    pending: Vec<u8>,
    chunk_bytes: usize,
}

impl<S> ChunkedSpeech<S> {
    /// Wrap a byte stream, emitting `chunk_bytes` slices (the last may be shorter)
    pub fn new(inner: S, chunk_bytes: usize) -> Self {
        Self {
            inner: Some(inner),
            pending: Vec::with_capacity(chunk_bytes),
            chunk_bytes: chunk_bytes.max(1),
        }
    }
}

#[async_trait]
impl<S, B, E> SpeechStream for ChunkedSpeech<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Into<Error> + Send,
{
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        while self.pending.len() < self.chunk_bytes {
            let Some(inner) = self.inner.as_mut() else {
                break;
            };
            match inner.next().await {
                Some(Ok(bytes)) => self.pending.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    self.inner = None;
                    self.pending.clear();
                    return Err(e.into());
                }
                None => {
                    tracing::debug!("end of audio response");
                    self.inner = None;
                }
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }

        let take = self.chunk_bytes.min(self.pending.len());
        let rest = self.pending.split_off(take);
        Ok(Some(std::mem::replace(&mut self.pending, rest)))
    }

    fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!("closing TTS stream early");
        }
        self.pending.clear();
    }
}
