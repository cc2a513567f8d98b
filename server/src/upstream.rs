//! Upstream work source and solution submission over HTTP.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    hash,
    interaction::SolutionSubmission,
    types::{NonceRange, WorkUnit},
};
use thiserror::Error;
use tracing::*;

/// Used when the work source omits `nonce_range_start`.
pub const DEFAULT_NONCE_RANGE_START: u64 = 0;
/// Used when the work source omits `nonce_range_end`. Exclusive, like every
/// `nonce_range_end` the work source sends.
pub const DEFAULT_NONCE_RANGE_END: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no work available")]
    NoWorkAvailable,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed work: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn fetch_work(&self) -> Result<WorkUnit, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, solution: &SolutionSubmission) -> Result<SubmitOutcome, SubmitError>;
}

/// Work as the upstream serves it.
#[derive(Debug, Default, Deserialize)]
pub struct RawWork {
    pub block: Option<String>,
    pub target: Option<String>,
    pub request_id: Option<String>,
    /// unix seconds, as a number or a string
    pub timestamp: Option<Value>,
    pub nonce_range_start: Option<u64>,
    /// exclusive
    pub nonce_range_end: Option<u64>,
}

impl RawWork {
    pub fn into_work_unit(self) -> Result<WorkUnit, FetchError> {
        let block = match self.block {
            Some(block) if !block.is_empty() => block,
            _ => return Err(FetchError::Malformed("missing block".to_string())),
        };
        let target = self
            .target
            .ok_or_else(|| FetchError::Malformed("missing target".to_string()))
            .and_then(|t| {
                hash::parse_hex(&t).map_err(|err| FetchError::Malformed(format!("target: {err}")))
            })?;

        let start = self.nonce_range_start.unwrap_or(DEFAULT_NONCE_RANGE_START);
        let end = self.nonce_range_end.unwrap_or(DEFAULT_NONCE_RANGE_END);
        if end <= start {
            return Err(FetchError::Malformed(format!("empty nonce range [{start}, {end})")));
        }

        let issued_at = self
            .timestamp
            .as_ref()
            .and_then(|ts| match ts {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse::<i64>().ok(),
                _ => None,
            })
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or_else(shared::timestamp);

        let request_id = self
            .request_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));

        Ok(WorkUnit {
            block,
            target,
            request_id,
            issued_at,
            range: NonceRange::new(start, end - 1),
        })
    }
}

pub struct HttpWorkSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpWorkSource {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl WorkSource for HttpWorkSource {
    async fn fetch_work(&self) -> Result<WorkUnit, FetchError> {
        trace!("fetch work from {}", self.url);
        let response = match self.client.get(self.url.clone()).send().await {
            Ok(response) => response,
            Err(err) => return Err(FetchError::Transport(format!("fail to send request: {err}"))),
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Err(FetchError::NoWorkAvailable);
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return Err(FetchError::Transport(format!("fail to read response content: {err:#}")))
            }
        };

        if !status.is_success() {
            return Err(FetchError::Transport(format!("status code: {status}, response: {text}")));
        }

        let body = text.trim();
        if body.is_empty() || body == "null" {
            return Err(FetchError::NoWorkAvailable);
        }

        let raw: RawWork = serde_json::from_str(body).map_err(|err| {
            FetchError::Malformed(format!("fail to deserialize response: {err:#}, response: {text}"))
        })?;

        raw.into_work_unit()
    }
}

pub struct HttpSubmission {
    client: reqwest::Client,
    url: Url,
}

impl HttpSubmission {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl SubmissionSink for HttpSubmission {
    async fn submit(&self, solution: &SolutionSubmission) -> Result<SubmitOutcome, SubmitError> {
        trace!("submit solution to {}", self.url);
        let response = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .json(solution)
            .send()
            .await
            .map_err(|err| SubmitError::Transport(format!("fail to send request: {err}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            Ok(SubmitOutcome::Accepted)
        } else if status.is_client_error() {
            Ok(SubmitOutcome::Rejected(format!("status code: {status}, response: {text}")))
        } else {
            Err(SubmitError::Transport(format!("status code: {status}, response: {text}")))
        }
    }
}

/// Log whether an endpoint answers at all. Never fails.
pub async fn probe(client: &reqwest::Client, name: &str, url: &Url) {
    match client.get(url.clone()).send().await {
        Ok(response) => info!("{name} endpoint {url} status: {}", response.status()),
        Err(err) => error!("failed to connect to {name} endpoint {url}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared::U256;

    use super::*;

    fn raw(value: Value) -> RawWork {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn full_work_unit() {
        let work = raw(json!({
            "block": "abc",
            "target": "00ff",
            "request_id": "r-9",
            "timestamp": "1700000000",
            "nonce_range_start": 100,
            "nonce_range_end": 200,
        }))
        .into_work_unit()
        .unwrap();

        assert_eq!(work.block, "abc");
        assert_eq!(work.target, U256::from(255u64));
        assert_eq!(work.request_id, "r-9");
        assert_eq!(work.issued_at, 1_700_000_000_000);
        assert_eq!(work.range, NonceRange::new(100, 199));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let work = raw(json!({"block": "abc", "target": "ff"})).into_work_unit().unwrap();
        assert_eq!(work.range, NonceRange::new(0, 999_999));
        assert_eq!(work.range.len(), 1_000_000);
        assert_eq!(work.request_id.len(), 16);
        assert!(work.issued_at > 0);
    }

    #[test]
    fn request_ids_are_fresh() {
        let a = raw(json!({"block": "abc", "target": "ff"})).into_work_unit().unwrap();
        let b = raw(json!({"block": "abc", "target": "ff"})).into_work_unit().unwrap();
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn numeric_timestamp() {
        let work = raw(json!({"block": "abc", "target": "ff", "timestamp": 12}))
            .into_work_unit()
            .unwrap();
        assert_eq!(work.issued_at, 12_000);
    }

    #[test]
    fn rejects_incomplete_work() {
        let cases = [
            json!({"target": "ff"}),
            json!({"block": "", "target": "ff"}),
            json!({"block": "abc"}),
            json!({"block": "abc", "target": "not hex"}),
            json!({"block": "abc", "target": "ff", "nonce_range_start": 5, "nonce_range_end": 5}),
        ];
        for value in cases {
            assert!(
                matches!(raw(value.clone()).into_work_unit(), Err(FetchError::Malformed(_))),
                "{value} should be rejected"
            );
        }
    }
}
