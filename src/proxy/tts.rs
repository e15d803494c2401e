//! `POST /api/tts`: text → mp3 via the speech provider.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{ProxyError, ProxyState};

#[derive(Deserialize)]
struct TtsRequest {
    #[serde(default)]
    text: String,
}

pub async fn handle_tts(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let key = state
        .keys
        .elevenlabs
        .as_ref()
        .ok_or(ProxyError::MissingKey("ELEVENLABS_API_KEY"))?;
    let tts = &state.config.tts;

    let req: TtsRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::BadRequest(format!("Invalid request body: {e}")))?;
    if req.text.trim().is_empty() {
        return Err(ProxyError::BadRequest("Missing text".into()));
    }
    info!("Synthesizing {} chars with voice {}", req.text.len(), tts.voice_id);

    let resp = state
        .client
        .post(format!("{}/text-to-speech/{}", tts.base_url, tts.voice_id))
        .header("xi-api-key", key.expose_secret())
        .json(&json!({
            "text": req.text,
            "model_id": tts.model_id,
            "voice_settings": {
                "stability": tts.stability,
                "similarity_boost": tts.similarity_boost
            }
        }))
        .send()
        .await
        .map_err(|e| ProxyError::internal("Speech request failed", e))?;

    if !resp.status().is_success() {
        warn!("Speech provider returned {}", resp.status());
        return Err(ProxyError::upstream(resp.status(), "ElevenLabs API error"));
    }

    let audio = resp
        .bytes()
        .await
        .map_err(|e| ProxyError::internal("Speech request failed", e))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        audio,
    )
        .into_response())
}
