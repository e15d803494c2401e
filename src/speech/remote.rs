//! Remote speech: audio synthesized by the proxy's `/api/tts`, played with rodio.
//!
//! Pipeline:
//! 1. POST {text} → audio/mpeg bytes (401 is reported as `Unauthorized`)
//! 2. Ticket check: drop the audio if a newer utterance took over meanwhile
//! 3. Decode + rodio Sink playback, polled from a blocking task until the
//!    sink drains or the utterance is cancelled

use std::io::Cursor;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rodio::{Decoder, OutputStreamBuilder, Sink};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{BackendKind, SpeechBackend, SpeechError, SpeechOutcome};
use crate::coordinator::UtteranceTicket;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct RemoteSpeech {
    client: Client,
    endpoint: String,
    /// Token of the utterance currently holding the audio slot.
    active: Mutex<CancellationToken>,
}

impl RemoteSpeech {
    pub fn new(api_base: &str, client: Client) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/tts", api_base.trim_end_matches('/')),
            active: Mutex::new(CancellationToken::new()),
        }
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// Ask the proxy to synthesize `text`.
    pub async fn fetch_audio(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(SpeechError::Unauthorized),
            status if !status.is_success() => {
                Err(SpeechError::Network(format!("TTS endpoint returned {status}")))
            }
            _ => {
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| SpeechError::Network(e.to_string()))?;
                if bytes.is_empty() {
                    return Err(SpeechError::Network("TTS endpoint returned no audio".into()));
                }
                Ok(bytes.to_vec())
            }
        }
    }
}

#[async_trait]
impl SpeechBackend for RemoteSpeech {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn speak(
        &self,
        text: &str,
        ticket: &UtteranceTicket,
    ) -> Result<SpeechOutcome, SpeechError> {
        if !ticket.is_current() {
            return Ok(SpeechOutcome::Interrupted);
        }
        let token = self.arm();

        let t_fetch = Instant::now();
        let audio = tokio::select! {
            _ = token.cancelled() => return Ok(SpeechOutcome::Interrupted),
            audio = self.fetch_audio(text) => audio?,
        };
        debug!(
            "Fetched {} bytes of audio in {:.0}ms",
            audio.len(),
            t_fetch.elapsed().as_secs_f64() * 1000.0
        );

        if token.is_cancelled() || !ticket.begin_playback() {
            debug!("Discarding late audio for utterance #{}", ticket.generation());
            return Ok(SpeechOutcome::Interrupted);
        }

        let t_play = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || play_blocking(audio, &token))
            .await
            .map_err(|e| SpeechError::Playback(format!("playback task failed: {e}")))??;
        info!(
            "Remote utterance #{} {:?} after {:.1}s",
            ticket.generation(),
            outcome,
            t_play.elapsed().as_secs_f64()
        );
        Ok(outcome)
    }

    fn cancel(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// Decode and play `audio` on the default output device until it drains or
/// `token` is cancelled.
fn play_blocking(audio: Vec<u8>, token: &CancellationToken) -> Result<SpeechOutcome, SpeechError> {
    let stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| SpeechError::Playback(format!("failed to open audio output: {e}")))?;
    let source = Decoder::new(Cursor::new(audio))
        .map_err(|e| SpeechError::Playback(format!("failed to decode audio: {e}")))?;

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);

    loop {
        if token.is_cancelled() {
            sink.stop();
            return Ok(SpeechOutcome::Interrupted);
        }
        if sink.empty() {
            return Ok(SpeechOutcome::Finished);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
