//! `GET /api/credits`: speech provider subscription, passed through.

use axum::extract::State;
use axum::Json;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use super::{ProxyError, ProxyState};

pub async fn handle_credits(
    State(state): State<ProxyState>,
) -> Result<Json<serde_json::Value>, ProxyError> {
    let key = state
        .keys
        .elevenlabs_user
        .as_ref()
        .ok_or(ProxyError::MissingKey("ELEVENLABS_USER_API_KEY"))?;

    let resp = state
        .client
        .get(format!("{}/user/subscription", state.config.tts.base_url))
        .header("xi-api-key", key.expose_secret())
        .send()
        .await
        .map_err(|e| ProxyError::internal("Unable to fetch credits", e))?;
    debug!("Subscription lookup returned {}", resp.status());

    if !resp.status().is_success() {
        let status = resp.status();
        let details = resp.text().await.unwrap_or_default();
        warn!("Failed to fetch subscription: {details}");
        return Err(ProxyError::upstream(status, "Unable to fetch credits"));
    }

    resp.json()
        .await
        .map(Json)
        .map_err(|e| ProxyError::internal("Unable to fetch credits", e))
}
