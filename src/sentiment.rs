//! Sentiment analysis collaborator.
//!
//! Final transcript segments are posted to an external analysis service.
//! The exchange is advisory: every failure maps to a non-fatal
//! [`AuravoxError::Analysis`] and the capture pipeline never waits on it.
//! [`SentimentTracker`] accumulates results across a session so the UI can
//! show a running picture instead of only the last utterance.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::defaults;
use crate::error::{AuravoxError, Result};

/// Per-emotion scores from the analysis service, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionScores {
    #[serde(default)]
    pub joy: f32,
    #[serde(default)]
    pub sadness: f32,
    #[serde(default)]
    pub anger: f32,
    #[serde(default)]
    pub fear: f32,
    #[serde(default)]
    pub surprise: f32,
    #[serde(default)]
    pub disgust: f32,
}

/// One analysis result for one piece of text.
///
/// Every field defaults so a partial response still parses; the service
/// omits sections it could not compute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentReport {
    /// Overall polarity in [-1, 1].
    #[serde(default)]
    pub sentiment: f32,
    /// Human-readable polarity class, e.g. "positive".
    #[serde(default)]
    pub sentiment_label: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub emotion_scores: EmotionScores,
}

/// Merged view over everything a session has been told so far: the most
/// recent scalars plus the accumulated keyword set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSnapshot {
    pub sentiment: f32,
    pub sentiment_label: String,
    pub confidence: f32,
    pub emotion_scores: EmotionScores,
    pub keywords: Vec<String>,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

fn process_text_url(base: &str) -> String {
    format!("{}/process_text", base.trim_end_matches('/'))
}

/// HTTP client for the analysis service.
pub struct SentimentClient {
    client: reqwest::Client,
    base_url: String,
}

impl SentimentClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AuravoxError::Analysis {
                message: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    /// Submit one text for analysis.
    pub async fn analyze(&self, text: &str) -> Result<SentimentReport> {
        let url = process_text_url(&self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&AnalyzeRequest { text })
            .send()
            .await
            .map_err(|err| AuravoxError::Analysis {
                message: format!("request to {url} failed: {err}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuravoxError::Analysis {
                message: format!("service returned {status}: {body}"),
            });
        }

        response
            .json::<SentimentReport>()
            .await
            .map_err(|err| AuravoxError::Analysis {
                message: format!("invalid response body: {err}"),
            })
    }
}

/// Accumulates analysis results over a session.
///
/// Scalars (polarity, label, confidence, emotions) always reflect the most
/// recent report. Keywords accumulate as a set union in first-seen order:
/// a keyword already present keeps its original position, and the set is
/// capped at [`defaults::MAX_TRACKED_KEYWORDS`].
#[derive(Debug, Default)]
pub struct SentimentTracker {
    latest: Option<SentimentReport>,
    keywords: Vec<String>,
}

impl SentimentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one report in and return the merged view.
    pub fn absorb(&mut self, report: SentimentReport) -> SentimentSnapshot {
        for keyword in &report.keywords {
            let keyword = keyword.trim();
            if keyword.is_empty() || self.keywords.iter().any(|known| known == keyword) {
                continue;
            }
            if self.keywords.len() >= defaults::MAX_TRACKED_KEYWORDS {
                debug!(keyword, "keyword set full, ignoring");
                continue;
            }
            self.keywords.push(keyword.to_string());
        }
        self.latest = Some(report);
        self.merged()
    }

    /// Merged view, or `None` before the first report.
    pub fn snapshot(&self) -> Option<SentimentSnapshot> {
        self.latest.as_ref().map(|_| self.merged())
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Forget everything; the next report starts a fresh session picture.
    pub fn clear(&mut self) {
        self.latest = None;
        self.keywords.clear();
    }

    fn merged(&self) -> SentimentSnapshot {
        let latest = self.latest.clone().unwrap_or_default();
        SentimentSnapshot {
            sentiment: latest.sentiment,
            sentiment_label: latest.sentiment_label,
            confidence: latest.confidence,
            emotion_scores: latest.emotion_scores,
            keywords: self.keywords.clone(),
        }
    }
}
