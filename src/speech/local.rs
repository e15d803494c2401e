//! Local speech: the machine's own synthesizer command.
//!
//! Supports espeak-ng/espeak (`--voices`, `-v -s -p`) and macOS `say`
//! (`-v ?`, `-v -r`). The voice list is loaded once, on first use, and cached;
//! an empty list is not cached so a later utterance retries the lookup.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BackendKind, SpeechBackend, SpeechError, SpeechOutcome};
use crate::config::LocalVoiceConfig;
use crate::coordinator::UtteranceTicket;

const ESPEAK_DEFAULT_WPM: f32 = 175.0;
const SAY_DEFAULT_WPM: f32 = 175.0;
const ESPEAK_DEFAULT_PITCH: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Espeak,
    Say,
}

impl Flavor {
    fn detect(command: &str) -> Self {
        let name = Path::new(command)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name == "say" {
            Self::Say
        } else {
            Self::Espeak
        }
    }
}

/// A synthesizer voice: display name plus the identifier passed to `-v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub id: String,
}

pub struct LocalSpeech {
    config: LocalVoiceConfig,
    flavor: Flavor,
    voices: OnceCell<Vec<Voice>>,
    active: Mutex<CancellationToken>,
}

impl LocalSpeech {
    pub fn new(config: LocalVoiceConfig) -> Self {
        let flavor = Flavor::detect(&config.command);
        Self {
            config,
            flavor,
            voices: OnceCell::new(),
            active: Mutex::new(CancellationToken::new()),
        }
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// Available voices, loaded on first call.
    pub async fn voices(&self) -> Result<&[Voice], SpeechError> {
        let voices = self
            .voices
            .get_or_try_init(|| async {
                let voices = self.load_voices().await?;
                if voices.is_empty() {
                    return Err(SpeechError::NoVoiceAvailable);
                }
                info!("Local synthesizer reports {} voices", voices.len());
                Ok(voices)
            })
            .await?;
        Ok(voices.as_slice())
    }

    async fn load_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        let args: &[&str] = match self.flavor {
            Flavor::Espeak => &["--voices"],
            Flavor::Say => &["-v", "?"],
        };
        let output = Command::new(&self.config.command)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                SpeechError::Playback(format!("failed to run {}: {e}", self.config.command))
            })?;

        if !output.status.success() {
            warn!("{} voice listing exited with {}", self.config.command, output.status);
            return Err(SpeechError::NoVoiceAvailable);
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(match self.flavor {
            Flavor::Espeak => parse_espeak_voices(&listing),
            Flavor::Say => parse_say_voices(&listing),
        })
    }

    fn synth_args(&self, voice: &Voice, text: &str) -> Vec<String> {
        match self.flavor {
            Flavor::Espeak => vec![
                "-v".into(),
                voice.id.clone(),
                "-s".into(),
                format!("{:.0}", ESPEAK_DEFAULT_WPM * self.config.rate),
                "-p".into(),
                format!("{:.0}", (ESPEAK_DEFAULT_PITCH * self.config.pitch).clamp(0.0, 99.0)),
                "--".into(),
                text.to_string(),
            ],
            Flavor::Say => vec![
                "-v".into(),
                voice.id.clone(),
                "-r".into(),
                format!("{:.0}", SAY_DEFAULT_WPM * self.config.rate),
                "--".into(),
                text.to_string(),
            ],
        }
    }
}

#[async_trait]
impl SpeechBackend for LocalSpeech {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
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

        let voices = tokio::select! {
            _ = token.cancelled() => return Ok(SpeechOutcome::Interrupted),
            voices = self.voices() => voices?,
        };
        let voice = choose_voice(voices, &self.config.preferred_voices)
            .ok_or(SpeechError::NoVoiceAvailable)?;

        if token.is_cancelled() || !ticket.begin_playback() {
            return Ok(SpeechOutcome::Interrupted);
        }

        debug!("Local utterance #{} with voice {}", ticket.generation(), voice.name);
        let mut child = Command::new(&self.config.command)
            .args(self.synth_args(voice, text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpeechError::Playback(format!("failed to start {}: {e}", self.config.command))
            })?;

        tokio::select! {
            _ = token.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to stop synthesizer: {e}");
                }
                Ok(SpeechOutcome::Interrupted)
            }
            status = child.wait() => {
                let status = status
                    .map_err(|e| SpeechError::Playback(format!("synthesizer wait failed: {e}")))?;
                if status.success() {
                    Ok(SpeechOutcome::Finished)
                } else {
                    Err(SpeechError::Playback(format!("synthesizer exited with {status}")))
                }
            }
        }
    }

    fn cancel(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// First voice whose name or id contains any preferred substring, else the first voice.
pub fn choose_voice<'a>(voices: &'a [Voice], preferred: &[String]) -> Option<&'a Voice> {
    voices
        .iter()
        .find(|v| {
            preferred
                .iter()
                .any(|p| v.name.contains(p.as_str()) || v.id.contains(p.as_str()))
        })
        .or_else(|| voices.first())
}

/// Parse `espeak-ng --voices`:
/// `Pty Language       Age/Gender VoiceName          File          Other Languages`
fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            Some(Voice {
                name: cols[3].to_string(),
                id: cols[1].to_string(),
            })
        })
        .collect()
}

/// Parse `say -v ?`: `Daniel              en_GB    # Hello! My name is Daniel.`
fn parse_say_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim();
            let (name, _locale) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Voice {
                name: name.to_string(),
                id: name.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, id: &str) -> Voice {
        Voice {
            name: name.into(),
            id: id.into(),
        }
    }

    #[test]
    fn parses_espeak_listing() {
        let listing = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
            5  af              --/M      Afrikaans          gmw/af\n \
            2  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)\n";
        let voices = parse_espeak_voices(listing);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1], voice("English_(Great_Britain)", "en-gb"));
    }

    #[test]
    fn parses_say_listing_with_spaced_names() {
        let listing = "Daniel              en_GB    # Hello! My name is Daniel.\n\
            Bad News            en_US    # The light you see at the end of the tunnel\n";
        let voices = parse_say_voices(listing);
        assert_eq!(voices, vec![voice("Daniel", "Daniel"), voice("Bad News", "Bad News")]);
    }

    #[test]
    fn prefers_configured_voice_names() {
        let voices = vec![voice("Alex", "Alex"), voice("Daniel", "Daniel")];
        let preferred = vec!["Google UK English".to_string(), "Daniel".to_string()];
        assert_eq!(choose_voice(&voices, &preferred).unwrap().name, "Daniel");
    }

    #[test]
    fn falls_back_to_first_voice() {
        let voices = vec![voice("Alex", "Alex"), voice("Fred", "Fred")];
        let preferred = vec!["Daniel".to_string()];
        assert_eq!(choose_voice(&voices, &preferred).unwrap().name, "Alex");
        assert!(choose_voice(&[], &preferred).is_none());
    }

    #[test]
    fn maps_rate_and_pitch_onto_espeak_flags() {
        let local = LocalSpeech::new(LocalVoiceConfig {
            rate: 0.8,
            pitch: 1.2,
            ..LocalVoiceConfig::default()
        });
        let args = local.synth_args(&voice("English", "en-gb"), "hello");
        assert_eq!(args, vec!["-v", "en-gb", "-s", "140", "-p", "60", "--", "hello"]);
    }

    #[test]
    fn detects_say_by_file_name() {
        assert_eq!(Flavor::detect("/usr/bin/say"), Flavor::Say);
        assert_eq!(Flavor::detect("espeak-ng"), Flavor::Espeak);
    }

    #[tokio::test]
    async fn missing_synthesizer_fails_voice_lookup() {
        let local = LocalSpeech::new(LocalVoiceConfig {
            command: "/nonexistent/granny-synth".into(),
            ..LocalVoiceConfig::default()
        });
        assert!(local.voices().await.is_err());
        // Not cached: a second lookup retries and fails again
        assert!(local.voices().await.is_err());
    }
}
