//! granny-news: XR/AI headlines read aloud by a grandmotherly voice.

mod article;
mod client;
mod config;
mod coordinator;
mod proxy;
mod reader;
mod speech;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::speech::{BackendKind, LocalSpeech, RemoteSpeech, SpeechBackend};

#[derive(Parser, Debug)]
#[command(name = "granny-news", about = "Tech news read aloud by granny")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the API proxy (holds the upstream keys)
    Serve,
    /// Interactive reader talking to a running proxy (default)
    Read {
        /// Speech backend to start with: remote or local
        #[arg(short, long)]
        backend: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,hyper_util=info,reqwest=info,html5ever=info")
    } else {
        EnvFilter::new("info,hyper=warn,hyper_util=warn,reqwest=warn,html5ever=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::Config::load(args.config.as_deref());

    match args.command.unwrap_or(Command::Read { backend: None }) {
        Command::Serve => {
            info!("granny-news proxy starting");
            let keys = config::ApiKeys::from_env();
            let state = proxy::ProxyState::new(config, keys)?;
            proxy::serve(state).await?;
        }
        Command::Read { backend } => {
            if let Some(name) = backend {
                config.reader.backend = BackendKind::from_str(&name)
                    .ok_or_else(|| format!("unknown backend '{name}', use remote or local"))?;
            }
            info!(
                "Reader using {} via {}",
                config.reader.backend, config.reader.api_base
            );

            let client = Arc::new(client::NewsClient::new(&config.reader.api_base)?);
            let remote: Arc<dyn SpeechBackend> =
                Arc::new(RemoteSpeech::new(client.api_base(), client.http()));
            let local: Arc<dyn SpeechBackend> =
                Arc::new(LocalSpeech::new(config.reader.local.clone()));
            let player =
                coordinator::PlaybackCoordinator::new(remote, local, config.reader.backend);

            reader::NewsReader::new(config.reader, client, player)
                .run()
                .await?;
        }
    }

    Ok(())
}
