//! Terminal news reader: the presentation layer over the playback coordinator.
//!
//! Reads one command per line from stdin and prints headlines and status
//! lines. All speech goes through [`PlaybackCoordinator`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::article::Article;
use crate::client::{ClientError, NewsClient};
use crate::config::ReaderConfig;
use crate::coordinator::{PlaybackCoordinator, PlayerEvent};
use crate::speech::BackendKind;

const INTRO_QUESTION: &str = "What's happening in XR and AI today?";

const HELP: &str = "\
Commands:
  refresh            fetch today's headlines
  list               show the headlines again
  say N              read headline N
  full N             read the full article N
  p | play | pause   toggle reading the list
  all                read every headline from the top
  stop               hush right now
  backend remote|local
  ask QUESTION       ask granny about the news
  credits            speech credits left
  status             playback state
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    List,
    Say(usize),
    Full(usize),
    TogglePlay,
    ReadAll,
    Stop,
    Backend(BackendKind),
    Ask(String),
    Credits,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parse a command line. Article numbers are 1-based on input, 0-based here.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        let article_number = |rest: &str| -> Result<usize, String> {
            match rest.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n - 1),
                _ => Err(format!("'{rest}' is not an article number")),
            }
        };

        match word.to_lowercase().as_str() {
            "refresh" | "r" => Ok(Self::Refresh),
            "list" | "l" => Ok(Self::List),
            "say" | "s" => article_number(rest).map(Self::Say),
            "full" | "f" => article_number(rest).map(Self::Full),
            "p" | "play" | "pause" => Ok(Self::TogglePlay),
            "all" => Ok(Self::ReadAll),
            "stop" => Ok(Self::Stop),
            "backend" | "b" => BackendKind::from_str(rest)
                .map(Self::Backend)
                .ok_or_else(|| format!("unknown backend '{rest}', use remote or local")),
            "ask" | "a" if !rest.is_empty() => Ok(Self::Ask(rest.to_string())),
            "ask" | "a" => Err("ask granny something, dear".into()),
            "credits" => Ok(Self::Credits),
            "status" => Ok(Self::Status),
            "help" | "h" | "?" => Ok(Self::Help),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command '{other}', try 'help'")),
        }
    }
}

/// Prompt sent to the chat endpoint: numbered headlines followed by the question.
pub fn granny_prompt(articles: &[Article], question: &str) -> String {
    let headlines: Vec<String> = articles
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a.title))
        .collect();
    format!(
        "Here's today's tech news:\n{}\n\nBased on the above, respond to the user's question in a funny, grandmotherly way.\nQuestion: {}",
        headlines.join("\n"),
        question
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum GateState {
    #[default]
    Open,
    Waiting,
    CoolingUntil(Instant),
}

/// One question to granny at a time, then a cooldown once her answer is in.
#[derive(Debug, Default)]
pub struct AskGate {
    state: Mutex<GateState>,
}

impl AskGate {
    /// Claim the gate for a new question. False while one is in flight or cooling down.
    pub fn try_begin(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            GateState::Waiting => false,
            GateState::CoolingUntil(until) if now < until => false,
            _ => {
                *state = GateState::Waiting;
                true
            }
        }
    }

    /// The answer (or the failure) is in; questions reopen after `cooldown`.
    pub fn finish(&self, now: Instant, cooldown: Duration) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            GateState::CoolingUntil(now + cooldown);
    }
}

async fn speak_answer(player: &PlaybackCoordinator, answer: Result<String, ClientError>) {
    match answer {
        Ok(text) => {
            println!("Granny: {text}");
            player.pause();
            player.speak(&text).await;
        }
        Err(e) => {
            warn!("Granny chat failed: {e}");
            println!("Granny dozed off, try again later.");
        }
    }
}

pub struct NewsReader {
    config: ReaderConfig,
    client: Arc<NewsClient>,
    player: PlaybackCoordinator,
    ask_gate: Arc<AskGate>,
}

impl NewsReader {
    pub fn new(config: ReaderConfig, client: Arc<NewsClient>, player: PlaybackCoordinator) -> Self {
        Self {
            config,
            client,
            player,
            ask_gate: Arc::new(AskGate::default()),
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut events = self.player.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Granny is fetching the latest XR and AI gossip...");
        self.refresh().await;
        if !self.player.articles().is_empty() {
            self.greet();
        }
        println!("Type 'help' for commands.");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("stdin closed");
                        break;
                    };
                    match Command::parse(&line) {
                        Ok(Command::Quit) => break,
                        Ok(command) => self.handle(command).await,
                        Err(msg) if msg.is_empty() => {}
                        Err(msg) => println!("{msg}"),
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => Self::show(&event),
                    Err(RecvError::Lagged(n)) => warn!("Missed {n} player events"),
                    Err(RecvError::Closed) => break,
                }
            }
        }

        self.player.pause();
        Ok(())
    }

    fn show(event: &PlayerEvent) {
        match event {
            PlayerEvent::Status(text) => println!("[{text}]"),
            PlayerEvent::Reading { index, title } => println!("▶ {}. {title}", index + 1),
            PlayerEvent::ListFinished => println!("[That's all the news, sweetie.]"),
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Refresh => self.refresh().await,
            Command::List => self.list(),
            Command::Say(index) => {
                let player = self.player.clone();
                tokio::spawn(async move {
                    player.speak_article(index).await;
                });
            }
            Command::Full(index) => self.read_full(index),
            Command::TogglePlay => {
                self.player.toggle_play_pause();
            }
            Command::ReadAll => {
                self.player.read_all();
            }
            Command::Stop => self.player.pause(),
            Command::Backend(kind) => {
                self.player.select_backend(kind);
                println!("[Voice: {kind}]");
            }
            Command::Ask(question) => self.ask(question),
            Command::Credits => match self.client.credits().await {
                Ok(credits) => println!("{credits:#}"),
                Err(e) => println!("Couldn't check credits: {e}"),
            },
            Command::Status => {
                let s = self.player.snapshot();
                println!(
                    "[{} | article {} | voice {} | utterance #{} {}]",
                    if s.is_playing { "playing" } else { "stopped" },
                    s.current_index + 1,
                    s.active_backend,
                    s.generation,
                    s.utterance,
                );
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    async fn refresh(&mut self) {
        let articles = match self.client.articles().await {
            Ok(articles) => articles,
            Err(e) => {
                warn!("Failed to fetch articles: {e}");
                println!("Granny couldn't reach the newsstand: {e}");
                return;
            }
        };

        let empty = articles.is_empty();
        self.player.set_articles(articles);

        if empty {
            println!("No articles today, dear.");
            let player = self.player.clone();
            tokio::spawn(async move {
                player.speak("Sorry honey, no XR or AI news today.").await;
            });
            return;
        }

        self.list();
        println!("Type 'say N' to hear a headline.");
    }

    fn list(&self) {
        let articles = self.player.articles();
        if articles.is_empty() {
            println!("No articles today, dear.");
            return;
        }
        for (i, article) in articles.iter().enumerate() {
            println!(
                "{:>2}. {}\n    {} · {}",
                i + 1,
                article.title,
                article.source,
                article.published_date
            );
        }
    }

    fn read_full(&self, index: usize) {
        let articles = self.player.articles();
        let Some(article) = articles.get(index).cloned() else {
            println!("No article number {}", index + 1);
            return;
        };

        let client = self.client.clone();
        let player = self.player.clone();
        tokio::spawn(async move {
            match client.full_article(&article.url).await {
                Ok(content) => {
                    player.pause();
                    println!("▶ {} (full text, {} chars)", article.title, content.chars().count());
                    player.speak(&content).await;
                }
                Err(e) => {
                    warn!("Full text unavailable for {}: {e}", article.url);
                    println!("Couldn't open that one, dear. Here's the summary instead.");
                    player.speak_article(index).await;
                }
            }
        });
    }

    /// Opening remarks: granny's take on today's headlines.
    fn greet(&self) {
        let prompt = granny_prompt(&self.player.articles(), INTRO_QUESTION);
        let client = self.client.clone();
        let player = self.player.clone();
        tokio::spawn(async move {
            speak_answer(&player, client.ask_granny(&prompt).await).await;
        });
    }

    fn ask(&self, question: String) {
        if !self.ask_gate.try_begin(Instant::now()) {
            println!("Hang on, dear... I'm still thinking.");
            return;
        }

        let prompt = granny_prompt(&self.player.articles(), &question);
        let cooldown = Duration::from_secs(self.config.ask_cooldown);
        let gate = self.ask_gate.clone();
        let client = self.client.clone();
        let player = self.player.clone();
        tokio::spawn(async move {
            let answer = client.ask_granny(&prompt).await;
            gate.finish(Instant::now(), cooldown);
            speak_answer(&player, answer).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::UtteranceTicket;
    use crate::proxy::testing::spawn_upstream;
    use crate::speech::{SpeechBackend, SpeechError, SpeechOutcome};
    use async_trait::async_trait;
    use axum::routing::post;
    use axum::Router;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Recorder {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechBackend for Recorder {
        fn kind(&self) -> BackendKind {
            BackendKind::Remote
        }

        async fn speak(
            &self,
            text: &str,
            ticket: &UtteranceTicket,
        ) -> Result<SpeechOutcome, SpeechError> {
            if ticket.begin_playback() {
                self.spoken.lock().unwrap().push(text.to_string());
            }
            Ok(SpeechOutcome::Finished)
        }

        fn cancel(&self) {}
    }

    fn article(title: &str) -> Article {
        Article {
            title: title.into(),
            source: "S".into(),
            url: "u".into(),
            published_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            summary: "x".into(),
        }
    }

    #[tokio::test]
    async fn greeting_speaks_granny_take_on_headlines() {
        let app = Router::new().route(
            "/api/granny",
            post(|axum::Json(body): axum::Json<Value>| async move {
                let prompt = body["prompt"].as_str().unwrap();
                assert!(prompt.contains("1. VR is back"));
                assert!(prompt.ends_with("Question: What's happening in XR and AI today?"));
                axum::Json(json!({ "response": "Oh honey, goggles again." }))
            }),
        );
        let base = spawn_upstream(app).await;
        let client = NewsClient::with_client(&base, reqwest::Client::builder().no_proxy().build().unwrap());

        let voice = Arc::new(Recorder::default());
        let player = PlaybackCoordinator::new(voice.clone(), voice.clone(), BackendKind::Remote);
        player.set_articles(vec![article("VR is back")]);
        let reader = NewsReader::new(ReaderConfig::default(), Arc::new(client), player);

        reader.greet();

        for _ in 0..400 {
            if !voice.spoken.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*voice.spoken.lock().unwrap(), vec!["Oh honey, goggles again."]);
    }

    #[test]
    fn parses_article_commands_as_zero_based() {
        assert_eq!(Command::parse("say 3"), Ok(Command::Say(2)));
        assert_eq!(Command::parse("  full 1 "), Ok(Command::Full(0)));
        assert!(Command::parse("say 0").is_err());
        assert!(Command::parse("say three").is_err());
    }

    #[test]
    fn parses_toggles_and_backends() {
        assert_eq!(Command::parse("p"), Ok(Command::TogglePlay));
        assert_eq!(Command::parse("PAUSE"), Ok(Command::TogglePlay));
        assert_eq!(
            Command::parse("backend local"),
            Ok(Command::Backend(BackendKind::Local))
        );
        assert!(Command::parse("backend robot").is_err());
    }

    #[test]
    fn ask_keeps_the_whole_question() {
        assert_eq!(
            Command::parse("ask is VR  back?"),
            Ok(Command::Ask("is VR  back?".into()))
        );
        assert!(Command::parse("ask").is_err());
    }

    #[test]
    fn blank_line_is_silently_ignored() {
        assert_eq!(Command::parse("   "), Err(String::new()));
    }

    #[test]
    fn ask_gate_holds_while_answer_is_pending() {
        let gate = AskGate::default();
        let t0 = Instant::now();

        assert!(gate.try_begin(t0));
        // A slow answer keeps the gate shut however long it takes
        assert!(!gate.try_begin(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn ask_gate_cooldown_starts_when_answer_arrives() {
        let gate = AskGate::default();
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(5);

        assert!(gate.try_begin(t0));
        let answered = t0 + Duration::from_secs(8);
        gate.finish(answered, cooldown);

        assert!(!gate.try_begin(answered + Duration::from_secs(4)));
        assert!(gate.try_begin(answered + cooldown));
        assert!(!gate.try_begin(answered + Duration::from_secs(6)));
    }

    #[test]
    fn granny_prompt_numbers_headlines() {
        let prompt = granny_prompt(&[article("VR is back"), article("AI glasses")], "so what?");
        assert!(prompt.starts_with("Here's today's tech news:\n1. VR is back\n2. AI glasses\n"));
        assert!(prompt.ends_with("Question: so what?"));
    }
}
