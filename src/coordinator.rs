//! Playback coordinator: the single owner of "what is being spoken right now".
//!
//! Session state machine: STOPPED ↔ PLAYING
//! Per utterance:         IDLE → REQUESTING → PLAYING → COMPLETED
//!                                 ↘ FAILED → REQUESTING (other backend, once) → IDLE
//!
//! Every `speak` call takes a fresh generation number. Backends receive an
//! [`UtteranceTicket`] carrying that generation and must check it before
//! producing audio, so an utterance that has been superseded never plays and
//! its completion never touches the session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::speech::{BackendKind, SpeechBackend, SpeechOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceState {
    Idle,
    Requesting,
    Playing,
    Completed,
    Failed,
}

impl std::fmt::Display for UtteranceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Requesting => write!(f, "REQUESTING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Reader-lifetime playback state. Only the coordinator mutates it; everyone
/// else sees copies from [`PlaybackCoordinator::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSession {
    pub current_index: usize,
    pub is_playing: bool,
    pub should_stop: bool,
    pub active_backend: BackendKind,
    pub generation: u64,
    pub speaking: bool,
    pub utterance: UtteranceState,
    /// Bumped whenever a playlist run starts; older runs exit at their next item.
    playlist_run: u64,
}

impl PlaybackSession {
    fn new(backend: BackendKind) -> Self {
        Self {
            current_index: 0,
            is_playing: false,
            should_stop: false,
            active_backend: backend,
            generation: 0,
            speaking: false,
            utterance: UtteranceState::Idle,
            playlist_run: 0,
        }
    }

    /// Enter `Playing` under a fresh run number. Loops of earlier runs exit
    /// before their next article and never reach the end-of-list reset.
    fn start_run(&mut self) -> u64 {
        self.is_playing = true;
        self.should_stop = false;
        self.playlist_run += 1;
        self.playlist_run
    }
}

fn lock(session: &Mutex<PlaybackSession>) -> MutexGuard<'_, PlaybackSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Proof that an utterance was issued at a given generation.
pub struct UtteranceTicket {
    generation: u64,
    session: Arc<Mutex<PlaybackSession>>,
}

impl UtteranceTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        lock(&self.session).generation == self.generation
    }

    /// Claim the audio slot. Returns false (and changes nothing) if a newer
    /// utterance or a cancel has superseded this one.
    pub fn begin_playback(&self) -> bool {
        let mut s = lock(&self.session);
        if s.generation != self.generation {
            return false;
        }
        s.utterance = UtteranceState::Playing;
        s.speaking = true;
        true
    }

    /// Apply `f` to the session only while this ticket is still current.
    fn settle(&self, f: impl FnOnce(&mut PlaybackSession)) -> bool {
        let mut s = lock(&self.session);
        if s.generation != self.generation {
            return false;
        }
        f(&mut s);
        true
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Status(String),
    Reading { index: usize, title: String },
    ListFinished,
}

struct Inner {
    session: Arc<Mutex<PlaybackSession>>,
    articles: Mutex<Arc<Vec<Article>>>,
    remote: Arc<dyn SpeechBackend>,
    local: Arc<dyn SpeechBackend>,
    events: broadcast::Sender<PlayerEvent>,
}

#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<Inner>,
}

impl PlaybackCoordinator {
    pub fn new(
        remote: Arc<dyn SpeechBackend>,
        local: Arc<dyn SpeechBackend>,
        initial: BackendKind,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                session: Arc::new(Mutex::new(PlaybackSession::new(initial))),
                articles: Mutex::new(Arc::new(Vec::new())),
                remote,
                local,
                events,
            }),
        }
    }

    pub fn snapshot(&self) -> PlaybackSession {
        *lock(&self.inner.session)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.events.subscribe()
    }

    pub fn articles(&self) -> Arc<Vec<Article>> {
        self.inner
            .articles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the article list wholesale. Any playlist in progress is stopped
    /// and the position rewinds to the first article.
    pub fn set_articles(&self, articles: Vec<Article>) {
        self.pause();
        *self
            .inner
            .articles
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(articles);
        lock(&self.inner.session).current_index = 0;
    }

    pub fn select_backend(&self, backend: BackendKind) {
        let mut s = lock(&self.inner.session);
        if s.active_backend != backend {
            info!("Speech backend: {} → {}", s.active_backend, backend);
            s.active_backend = backend;
        }
    }

    fn backend(&self, kind: BackendKind) -> &Arc<dyn SpeechBackend> {
        match kind {
            BackendKind::Remote => &self.inner.remote,
            BackendKind::Local => &self.inner.local,
        }
    }

    fn emit(&self, event: PlayerEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Invalidate the current generation and hand out a ticket for the next one.
    fn issue_ticket(&self) -> UtteranceTicket {
        let mut s = lock(&self.inner.session);
        s.generation += 1;
        s.utterance = UtteranceState::Requesting;
        s.speaking = false;
        UtteranceTicket {
            generation: s.generation,
            session: self.inner.session.clone(),
        }
    }

    fn silence_backends(&self) {
        self.inner.remote.cancel();
        self.inner.local.cancel();
    }

    /// Speak `text`, superseding anything in flight.
    ///
    /// Resolves once this utterance finishes, is superseded, or has failed on
    /// both backends. Failures never surface to the caller.
    pub async fn speak(&self, text: &str) {
        let ticket = self.issue_ticket();
        self.silence_backends();

        let primary = lock(&self.inner.session).active_backend;
        let backend = self.backend(primary);
        debug!("Utterance #{} via {}", ticket.generation(), backend.kind());

        let err = match backend.speak(text, &ticket).await {
            Ok(outcome) => return self.finish(&ticket, outcome),
            Err(e) => e,
        };

        let fallback = primary.other();
        if !ticket.settle(|s| s.utterance = UtteranceState::Failed) {
            debug!("Utterance #{} failed after being superseded", ticket.generation());
            return;
        }
        warn!("{primary} speech failed: {err}; falling back to {fallback}");
        ticket.settle(|s| s.utterance = UtteranceState::Requesting);

        match self.backend(fallback).speak(text, &ticket).await {
            Ok(outcome) => self.finish(&ticket, outcome),
            Err(e) => {
                let current = ticket.settle(|s| {
                    s.utterance = UtteranceState::Idle;
                    s.speaking = false;
                });
                if current {
                    warn!("{fallback} speech also failed: {e}; skipping utterance");
                    self.emit(PlayerEvent::Status("Granny lost her voice for that one.".into()));
                }
            }
        }
    }

    fn finish(&self, ticket: &UtteranceTicket, outcome: SpeechOutcome) {
        let applied = ticket.settle(|s| {
            s.speaking = false;
            s.utterance = match outcome {
                SpeechOutcome::Finished => UtteranceState::Completed,
                SpeechOutcome::Interrupted => UtteranceState::Idle,
            };
        });
        if !applied {
            debug!("Discarding stale completion of utterance #{}", ticket.generation());
        }
    }

    /// Silence both backends and invalidate the in-flight utterance. Idempotent.
    pub fn cancel(&self) {
        {
            let mut s = lock(&self.inner.session);
            s.generation += 1;
            s.speaking = false;
            s.utterance = UtteranceState::Idle;
        }
        self.silence_backends();
    }

    /// Read the article list aloud starting at `start`, one utterance at a time.
    ///
    /// Starts a new run, so a stop latched by an earlier pause or refresh does
    /// not apply. The stop flag is checked before each article, never mid-utterance.
    pub async fn play_from(&self, start: usize) {
        let run = lock(&self.inner.session).start_run();
        self.run_playlist(start, run).await;
    }

    async fn run_playlist(&self, start: usize, run: u64) {
        let articles = self.articles();

        for (index, article) in articles.iter().enumerate().skip(start) {
            {
                let mut s = lock(&self.inner.session);
                if s.should_stop || s.playlist_run != run {
                    debug!("Playlist run {run} stopping before article {index}");
                    return;
                }
                s.current_index = index;
            }

            self.emit(PlayerEvent::Reading {
                index,
                title: article.title.clone(),
            });
            self.speak(&article.utterance_text()).await;
        }

        {
            let mut s = lock(&self.inner.session);
            if s.should_stop || s.playlist_run != run {
                return;
            }
            s.current_index = 0;
            s.is_playing = false;
        }
        info!("Finished reading {} articles", articles.len());
        self.emit(PlayerEvent::ListFinished);
    }

    /// Start playback from the current position, or pause it.
    ///
    /// Returns the handle of the playlist task when playback starts. Callers
    /// may drop it; progress is visible through [`snapshot`](Self::snapshot).
    pub fn toggle_play_pause(&self) -> Option<JoinHandle<()>> {
        if self.articles().is_empty() {
            self.emit(PlayerEvent::Status("No articles to read, dear.".into()));
            return None;
        }

        let start = {
            let mut s = lock(&self.inner.session);
            if s.is_playing {
                None
            } else {
                let start = s.current_index;
                Some((start, s.start_run()))
            }
        };

        match start {
            Some((start, run)) => {
                info!("Playback: STOPPED → PLAYING at article {start} (run {run})");
                self.emit(PlayerEvent::Status(format!("Playing from article {}", start + 1)));
                let this = self.clone();
                Some(tokio::spawn(async move { this.run_playlist(start, run).await }))
            }
            None => {
                self.pause();
                None
            }
        }
    }

    /// Stop the playlist immediately, cutting off the current utterance.
    pub fn pause(&self) {
        let was_playing = {
            let mut s = lock(&self.inner.session);
            let was = s.is_playing;
            s.should_stop = true;
            s.is_playing = false;
            was
        };
        self.cancel();
        if was_playing {
            info!("Playback: PLAYING → STOPPED");
            self.emit(PlayerEvent::Status("Paused".into()));
        }
    }

    /// Read every article from the top.
    pub fn read_all(&self) -> Option<JoinHandle<()>> {
        self.pause();
        lock(&self.inner.session).current_index = 0;
        self.toggle_play_pause()
    }

    /// Speak a single headline, stopping any playlist in progress.
    pub async fn speak_article(&self, index: usize) -> bool {
        let articles = self.articles();
        let Some(article) = articles.get(index) else {
            self.emit(PlayerEvent::Status(format!("No article number {}", index + 1)));
            return false;
        };
        self.pause();
        self.emit(PlayerEvent::Reading {
            index,
            title: article.title.clone(),
        });
        self.speak(&article.utterance_text()).await;
        true
    }
}
