//! Shared HTTP client and payload normalization for feed adapters

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::traits::SyncBatch;
use crate::application::errors::{ApiError, SyncError};
use crate::domain::{ExternalSource, SourceId, resolve_path, stringify};

/// Per-source fixed-window request counter.
///
/// Expired windows are dropped on every acquire, so sources that stop
/// syncing (or are deleted) do not keep an entry.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<SourceId, RateWindow>>,
}

struct RateWindow {
    started: Instant,
    period: Duration,
    used: u32,
}

impl RateWindow {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.period
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one request from the source's current window
    pub async fn acquire(&self, source: &ExternalSource) -> Result<(), SyncError> {
        let now = Instant::now();
        let window = source.rate_limit.period.window();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, tracked| !tracked.expired(now));

        let entry = windows.entry(source.id.clone()).or_insert(RateWindow {
            started: now,
            period: window,
            used: 0,
        });

        if entry.used >= source.rate_limit.requests {
            return Err(SyncError::RateLimit {
                source_id: source.id.to_string(),
            });
        }
        entry.used += 1;
        Ok(())
    }
}

/// HTTP client shared by every feed adapter
pub struct FeedClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl FeedClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(),
        })
    }

    /// GET the source endpoint and decode the JSON body.
    ///
    /// The credential is sent as a bearer token and the `query` object of
    /// the source config is appended as query parameters.
    pub async fn fetch_json(&self, source: &ExternalSource) -> Result<Value, SyncError> {
        let response = self.send(source).await?;
        Ok(response.json::<Value>().await?)
    }

    /// Fetch the feed and normalize it into a [`SyncBatch`].
    ///
    /// `record_paths` are tried in order unless the source config names a
    /// `records_path`. Entries rejected by `validate` become partial errors.
    pub async fn fetch_records<V>(
        &self,
        source: &ExternalSource,
        record_paths: &[&str],
        validate: V,
    ) -> Result<SyncBatch, SyncError>
    where
        V: Fn(&Map<String, Value>) -> Result<(), String> + Send,
    {
        let payload = self.fetch_json(source).await?;
        extract_records(source, &payload, record_paths, validate)
    }

    /// Check that the endpoint answers with a success status
    pub async fn ping(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.send(source).await.map(|_| ())
    }

    async fn send(&self, source: &ExternalSource) -> Result<reqwest::Response, SyncError> {
        self.rate_limiter.acquire(source).await?;

        let mut request = self.client.get(&source.endpoint);
        if let Some(credential) = &source.credential {
            request = request.bearer_auth(credential.expose());
        }
        if let Some(Value::Object(query)) = source.config.get("query") {
            let pairs: Vec<(String, String)> = query
                .iter()
                .map(|(key, value)| (key.clone(), stringify(value)))
                .collect();
            request = request.query(&pairs);
        }

        debug!(source = %source.id, endpoint = %source.endpoint, "Requesting feed");
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Api(ApiError::Authentication));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SyncError::Api(ApiError::Http {
                status: status.as_u16(),
                message: format!("{} API error: {}", source.name, error_text),
            }));
        }

        Ok(response)
    }
}

/// Locate the record array in a payload and count the valid records
pub fn extract_records<V>(
    source: &ExternalSource,
    payload: &Value,
    record_paths: &[&str],
    validate: V,
) -> Result<SyncBatch, SyncError>
where
    V: Fn(&Map<String, Value>) -> Result<(), String>,
{
    let configured = source.config.get("records_path").and_then(Value::as_str);
    let items = match (configured, payload) {
        (Some(path), _) => records_at(payload, path).ok_or_else(|| SyncError::InvalidPayload {
            source_id: source.id.to_string(),
            message: format!("no record array at configured path '{}'", path),
        })?,
        (None, Value::Array(items)) => items,
        (None, _) => record_paths
            .iter()
            .find_map(|path| records_at(payload, path))
            .ok_or_else(|| SyncError::InvalidPayload {
                source_id: source.id.to_string(),
                message: format!("no record array at any of [{}]", record_paths.join(", ")),
            })?,
    };

    let mut batch = SyncBatch::default();
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::Object(record) => match validate(record) {
                Ok(()) => batch.record_count += 1,
                Err(reason) => batch.partial_errors.push(format!("record {}: {}", index, reason)),
            },
            _ => batch
                .partial_errors
                .push(format!("record {}: not a JSON object", index)),
        }
    }

    Ok(batch)
}

fn records_at<'a>(payload: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    match payload {
        Value::Object(map) => resolve_path(map, path).and_then(Value::as_array),
        _ => None,
    }
}

/// Validator accepting records that carry at least one of `fields`
pub fn require_any(record: &Map<String, Value>, fields: &[&str]) -> Result<(), String> {
    let present = fields
        .iter()
        .any(|field| resolve_path(record, field).is_some_and(|v| !v.is_null()));
    if present {
        Ok(())
    } else {
        Err(format!("missing one of [{}]", fields.join(", ")))
    }
}
