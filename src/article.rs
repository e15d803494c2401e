//! News article summaries shared by the proxy and the reader.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const NO_SUMMARY: &str = "No summary available";

/// One article summary as served by `GET /api/articles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub url: String,
    #[serde(rename = "date")]
    pub published_date: NaiveDate,
    #[serde(rename = "content")]
    pub summary: String,
}

impl Article {
    /// Text handed to a speech backend when this article is read aloud.
    pub fn utterance_text(&self) -> String {
        format!("Headline: {}. {}", self.title, self.summary)
    }
}
