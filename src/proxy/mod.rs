//! HTTP proxy in front of the news, chat and speech APIs.
//!
//! Keeps upstream API keys on the server side. Routes:
//! - `GET  /api/articles`     this week's XR/AI headlines
//! - `POST /api/full-article` scraped article body for `{url}`
//! - `POST /api/tts`          synthesized audio for `{text}`
//! - `POST /api/granny`       grandma chat reply for `{prompt}`
//! - `GET  /api/credits`      speech provider subscription info
//! - `GET  /status`           which upstreams are configured

mod articles;
mod chat;
mod credits;
mod error;
mod full_article;
mod tts;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::{ApiKeys, Config};

pub use error::ProxyError;

#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<Config>,
    pub keys: Arc<ApiKeys>,
    pub client: Client,
}

impl ProxyState {
    pub fn new(config: Config, keys: ApiKeys) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.server.upstream_timeout))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            keys: Arc::new(keys),
            client,
        })
    }
}

#[derive(Serialize)]
struct StatusResponse {
    news: bool,
    chat: bool,
    tts: bool,
    credits: bool,
}

/// Build the axum router.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/api/articles", get(articles::handle_articles))
        .route("/api/full-article", post(full_article::handle_full_article))
        .route("/api/tts", post(tts::handle_tts))
        .route("/api/granny", post(chat::handle_granny))
        .route("/api/credits", get(credits::handle_credits))
        .with_state(state)
}

/// Bind and serve the proxy until the process exits.
pub async fn serve(state: ProxyState) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Proxy listening on http://{addr}");
    axum::serve(listener, router(state)).await
}

async fn handle_status(State(state): State<ProxyState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        news: state.keys.news.is_some(),
        chat: state.keys.openai.is_some(),
        tts: state.keys.elevenlabs.is_some(),
        credits: state.keys.elevenlabs_user.is_some(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use http_body_util::BodyExt;
    use secrecy::SecretString;
    use tower::ServiceExt;

    /// Serve `app` on an ephemeral port and return its base URL.
    pub async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub fn all_keys() -> ApiKeys {
        ApiKeys {
            news: Some(SecretString::from("news-key")),
            openai: Some(SecretString::from("openai-key")),
            elevenlabs: Some(SecretString::from("eleven-key")),
            elevenlabs_user: Some(SecretString::from("eleven-user-key")),
        }
    }

    /// Proxy state whose upstreams all point at `upstream`.
    pub fn state_for(upstream: &str, keys: ApiKeys) -> ProxyState {
        let mut config = Config::default();
        config.news.base_url = upstream.to_string();
        config.chat.base_url = upstream.to_string();
        config.tts.base_url = upstream.to_string();
        ProxyState {
            config: Arc::new(config),
            keys: Arc::new(keys),
            client: Client::builder().no_proxy().build().unwrap(),
        }
    }

    pub async fn call(state: ProxyState, request: Request<Body>) -> Response {
        router(state).oneshot(request).await.unwrap()
    }

    pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_bytes(response: Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }
}
