//! `POST /api/granny`: one-shot chat completion in the grandma persona.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{ProxyError, ProxyState};

#[derive(Deserialize, Default)]
struct GrannyRequest {
    prompt: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct GrannyResponse {
    pub response: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

pub async fn handle_granny(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Json<GrannyResponse>, ProxyError> {
    let key = state
        .keys
        .openai
        .as_ref()
        .ok_or(ProxyError::MissingKey("OPENAI_API_KEY"))?;
    let chat = &state.config.chat;

    let req: GrannyRequest = if body.is_empty() {
        GrannyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ProxyError::BadRequest(format!("Invalid request body: {e}")))?
    };
    let prompt = req
        .prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| chat.default_prompt.clone());

    let preview: String = prompt.chars().take(80).collect();
    info!("Granny asked: \"{}\" ({} chars)", preview.replace('\n', " "), prompt.len());

    let resp = state
        .client
        .post(format!("{}/chat/completions", chat.base_url))
        .bearer_auth(key.expose_secret())
        .json(&json!({
            "model": chat.model,
            "messages": [
                { "role": "system", "content": chat.system_prompt },
                { "role": "user", "content": prompt }
            ],
            "temperature": chat.temperature
        }))
        .send()
        .await
        .map_err(|e| ProxyError::internal("Chat request failed", e))?;

    if !resp.status().is_success() {
        return Err(ProxyError::upstream(resp.status(), "Chat API error"));
    }

    let completion: ChatCompletion = resp
        .json()
        .await
        .map_err(|e| ProxyError::internal("Chat request failed", e))?;
    let response = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| ProxyError::internal("Chat request failed", "no choices returned"))?;

    Ok(Json(GrannyResponse { response }))
}

#[cfg(test)]
mod tests {
    use crate::proxy::testing::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::{json, Value};

    fn fake_openai() -> Router {
        Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer openai-key");
                assert_eq!(body["model"], "gpt-4o");
                assert_eq!(body["messages"][0]["role"], "system");
                let question = body["messages"][1]["content"].as_str().unwrap().to_string();
                axum::Json(json!({
                    "choices": [{ "message": { "role": "assistant", "content": format!("Oh honey, {question}") } }]
                }))
            }),
        )
    }

    #[tokio::test]
    async fn answers_in_persona() {
        let base = spawn_upstream(fake_openai()).await;
        let state = state_for(&base, all_keys());

        let response = call(state, post_json("/api/granny", json!({ "prompt": "what is XR?" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["response"], "Oh honey, what is XR?");
    }

    #[tokio::test]
    async fn empty_prompt_uses_default_question() {
        let base = spawn_upstream(fake_openai()).await;
        let state = state_for(&base, all_keys());

        let response = call(state, post_json("/api/granny", json!({}))).await;
        assert_eq!(
            body_json(response).await["response"],
            "Oh honey, What's new in AI and XR today?"
        );
    }

    #[tokio::test]
    async fn upstream_status_passes_through() {
        let upstream = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = spawn_upstream(upstream).await;
        let state = state_for(&base, all_keys());

        let response = call(state, post_json("/api/granny", json!({ "prompt": "hi" }))).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
