//! `GET /api/articles`: this week's headlines from the news search API.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ProxyError, ProxyState};
use crate::article::{Article, NO_SUMMARY};

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default)]
    articles: Vec<NewsItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsItem {
    title: Option<String>,
    #[serde(default)]
    source: NewsSource,
    url: Option<String>,
    published_at: Option<String>,
    description: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct NewsSource {
    name: Option<String>,
}

impl NewsItem {
    fn into_article(self) -> Option<Article> {
        let published_at = self.published_at?;
        let published_date = DateTime::parse_from_rfc3339(&published_at)
            .map(|dt| dt.with_timezone(&Utc).date_naive())
            .ok()
            .or_else(|| {
                published_at
                    .get(..10)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            })?;

        let summary = [self.description, self.content]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_else(|| NO_SUMMARY.to_string());

        Some(Article {
            title: self.title.unwrap_or_else(|| "No title".into()),
            source: self.source.name.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            published_date,
            summary,
        })
    }
}

/// Monday of the week containing `today`, through `today`.
pub fn week_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let since_monday = today.weekday().num_days_from_monday();
    (today - Duration::days(since_monday as i64), today)
}

pub async fn fetch_articles(
    state: &ProxyState,
    today: NaiveDate,
) -> Result<Vec<Article>, ProxyError> {
    let key = state
        .keys
        .news
        .as_ref()
        .ok_or(ProxyError::MissingKey("NEWS_API_KEY"))?;
    let news = &state.config.news;
    let (from, to) = week_window(today);
    debug!("Searching news from {from} to {to}");

    let page_size = news.page_size.to_string();
    let (from, to) = (from.to_string(), to.to_string());
    let resp = state
        .client
        .get(format!("{}/everything", news.base_url))
        .query(&[
            ("q", news.query.as_str()),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("sortBy", "publishedAt"),
            ("language", news.language.as_str()),
            ("pageSize", page_size.as_str()),
            ("apiKey", key.expose_secret()),
        ])
        .send()
        .await
        .map_err(|e| ProxyError::internal("Failed to fetch articles", e))?;

    let status = resp.status();
    if !status.is_success() {
        let details = resp.text().await.unwrap_or_default();
        return Err(ProxyError::internal(
            "Failed to fetch articles",
            format!("news API returned {status}: {details}"),
        ));
    }

    let data: NewsResponse = resp
        .json()
        .await
        .map_err(|e| ProxyError::internal("Failed to fetch articles", e))?;

    let total = data.articles.len();
    let articles: Vec<Article> = data
        .articles
        .into_iter()
        .filter_map(NewsItem::into_article)
        .collect();
    if articles.len() < total {
        warn!("Dropped {} articles without a usable date", total - articles.len());
    }
    info!("Fetched {} articles", articles.len());
    Ok(articles)
}

pub async fn handle_articles(
    State(state): State<ProxyState>,
) -> Result<Json<Vec<Article>>, ProxyError> {
    let today = Utc::now().date_naive();
    fetch_articles(&state, today).await.map(Json)
}
