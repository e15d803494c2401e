//! Speech backends: the capability the playback coordinator speaks through.
//!
//! - `remote`: fetches synthesized audio from the proxy's `/api/tts` and plays it with rodio
//! - `local`: drives the machine's own synthesizer command (espeak-ng or say)
//!
//! Both variants honour the same contract: `speak` resolves once the utterance has
//! finished or been interrupted, and `cancel` silences whatever is in flight.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::coordinator::UtteranceTicket;

pub use local::LocalSpeech;
pub use remote::RemoteSpeech;

/// Which speech backend a `speak` call goes to first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

impl BackendKind {
    /// The backend tried when this one fails.
    pub fn other(self) -> Self {
        match self {
            Self::Remote => Self::Local,
            Self::Local => Self::Remote,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "remote" | "elevenlabs" => Some(Self::Remote),
            "local" | "system" => Some(Self::Local),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// How an utterance ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Audio played to the end.
    Finished,
    /// Cancelled, or superseded before any audio was produced.
    Interrupted,
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech endpoint unreachable or failed: {0}")]
    Network(String),

    #[error("speech endpoint rejected the request as unauthorized")]
    Unauthorized,

    #[error("no usable voice available from the local synthesizer")]
    NoVoiceAvailable,

    #[error("playback failed: {0}")]
    Playback(String),
}

/// One interchangeable way of turning text into audible speech.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Speak `text`. Implementations must call [`UtteranceTicket::begin_playback`]
    /// immediately before producing audio and drop the utterance if it returns false.
    async fn speak(&self, text: &str, ticket: &UtteranceTicket)
        -> Result<SpeechOutcome, SpeechError>;

    /// Silence any in-flight utterance. Safe to call when idle.
    fn cancel(&self);
}
