//! Reader-side client for the proxy endpoints.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::article::Article;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {message}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },
}

pub struct NewsClient {
    client: Client,
    api_base: String,
}

#[derive(serde::Deserialize)]
struct ContentResponse {
    content: String,
}

#[derive(serde::Deserialize)]
struct GrannyResponse {
    response: String,
}

impl NewsClient {
    pub fn new(api_base: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(api_base, client))
    }

    pub fn with_client(api_base: &str, client: Client) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Shared HTTP client, reused by the remote speech backend.
    pub fn http(&self) -> Client {
        self.client.clone()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn check(
        endpoint: &'static str,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let message = body["error"].as_str().unwrap_or("no details").to_string();
        Err(ClientError::Status {
            endpoint,
            status,
            message,
        })
    }

    pub async fn articles(&self) -> Result<Vec<Article>, ClientError> {
        const ENDPOINT: &str = "articles";
        let http = |source| ClientError::Http {
            endpoint: ENDPOINT,
            source,
        };
        let resp = self
            .client
            .get(format!("{}/api/articles", self.api_base))
            .send()
            .await
            .map_err(http)?;
        let articles: Vec<Article> = Self::check(ENDPOINT, resp).await?.json().await.map_err(http)?;
        debug!("Received {} articles", articles.len());
        Ok(articles)
    }

    pub async fn full_article(&self, url: &str) -> Result<String, ClientError> {
        const ENDPOINT: &str = "full-article";
        let http = |source| ClientError::Http {
            endpoint: ENDPOINT,
            source,
        };
        let resp = self
            .client
            .post(format!("{}/api/full-article", self.api_base))
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(http)?;
        let body: ContentResponse = Self::check(ENDPOINT, resp).await?.json().await.map_err(http)?;
        Ok(body.content)
    }

    pub async fn ask_granny(&self, prompt: &str) -> Result<String, ClientError> {
        const ENDPOINT: &str = "granny";
        let http = |source| ClientError::Http {
            endpoint: ENDPOINT,
            source,
        };
        let resp = self
            .client
            .post(format!("{}/api/granny", self.api_base))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(http)?;
        let body: GrannyResponse = Self::check(ENDPOINT, resp).await?.json().await.map_err(http)?;
        Ok(body.response)
    }

    pub async fn credits(&self) -> Result<serde_json::Value, ClientError> {
        const ENDPOINT: &str = "credits";
        let http = |source| ClientError::Http {
            endpoint: ENDPOINT,
            source,
        };
        let resp = self
            .client
            .get(format!("{}/api/credits", self.api_base))
            .send()
            .await
            .map_err(http)?;
        Self::check(ENDPOINT, resp).await?.json().await.map_err(http)
    }
}
