//! `POST /api/full-article`: scrape the body text of an article page.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ProxyError, ProxyState};

/// Containers that commonly hold the article body, tried in order.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    r#"[itemprop="articleBody"]"#,
    ".article-content",
    ".post-content",
    ".entry-content",
    "#article",
];

const MIN_CONTENT_CHARS: usize = 200;
const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Deserialize, Default)]
struct FullArticleRequest {
    url: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct FullArticleResponse {
    pub content: String,
}

/// Text of the first content container with more than 200 characters,
/// trimmed and capped at 5000 characters.
pub fn extract_article_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for raw in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let text: String = document.select(&selector).flat_map(|el| el.text()).collect();
        if text.chars().count() > MIN_CONTENT_CHARS {
            debug!("Article body found via {raw}");
            return Some(text.trim().chars().take(MAX_CONTENT_CHARS).collect());
        }
    }

    None
}

pub async fn handle_full_article(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Json<FullArticleResponse>, ProxyError> {
    let req: FullArticleRequest = if body.is_empty() {
        FullArticleRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ProxyError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let url = req
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ProxyError::BadRequest("Missing article URL".into()))?;
    info!("Scraping {url}");

    let html = state
        .client
        .get(&url)
        .send()
        .await
        .map_err(|e| ProxyError::internal("Scraping failed", e))?
        .text()
        .await
        .map_err(|e| ProxyError::internal("Scraping failed", e))?;

    let content = extract_article_text(&html)
        .ok_or_else(|| ProxyError::NotFound("Could not extract article content".into()))?;
    Ok(Json(FullArticleResponse { content }))
}
