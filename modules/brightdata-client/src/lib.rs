pub mod error;
pub mod types;

pub use error::{Result, SnapshotError};
pub use types::{JobStatus, ProgressResponse, RetryPolicy, TriggerConfig, TriggerResponse};

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use types::map_status;

const BASE_URL: &str = "https://api.brightdata.com/datasets/v3";

/// The three provider operations the snapshot lifecycle needs. Any bulk-scrape
/// provider with a submit/poll/fetch shape can stand in for BrightData here;
/// tests use a scripted mock.
#[async_trait]
pub trait SnapshotApi: Send + Sync {
    /// Submit a batch of entity descriptors. Returns the assigned snapshot id.
    async fn trigger(&self, config: &TriggerConfig, entities: &[Value]) -> Result<String>;

    /// Single status check for a snapshot. Non-success HTTP statuses are a
    /// transient outcome (`Running`), never a terminal one.
    async fn poll(&self, snapshot_id: &str) -> Result<JobStatus>;

    /// Fetch the completed dataset. `NotReady` and malformed-JSON responses
    /// are retryable; callers go through [`download_with_retry`].
    async fn download(&self, snapshot_id: &str) -> Result<Vec<Value>>;
}

pub struct BrightDataClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl BrightDataClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }
}

#[async_trait]
impl SnapshotApi for BrightDataClient {
    async fn trigger(&self, config: &TriggerConfig, entities: &[Value]) -> Result<String> {
        let url = format!("{}/trigger", self.base_url);
        let mut query: Vec<(String, String)> = vec![
            ("dataset_id".to_string(), config.dataset_id.clone()),
            ("include_errors".to_string(), "true".to_string()),
        ];
        query.extend(config.params.iter().cloned());

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .query(&query)
            .json(entities)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SnapshotError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: TriggerResponse = resp.json().await?;
        match body.snapshot_id {
            Some(id) if !id.is_empty() => {
                tracing::info!(snapshot_id = %id, dataset_id = %config.dataset_id, "Snapshot triggered");
                Ok(id)
            }
            _ => Err(SnapshotError::MissingSnapshotId(config.dataset_id.clone())),
        }
    }

    async fn poll(&self, snapshot_id: &str) -> Result<JobStatus> {
        let url = format!("{}/progress/{}", self.base_url, snapshot_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(
                snapshot_id,
                http_status = status.as_u16(),
                "Progress check returned non-success, treating as still running"
            );
            return Ok(JobStatus::Running);
        }

        let body: ProgressResponse = resp.json().await?;
        Ok(map_status(body.status.as_deref().unwrap_or("unknown")))
    }

    async fn download(&self, snapshot_id: &str) -> Result<Vec<Value>> {
        let url = format!("{}/snapshot/{}", self.base_url, snapshot_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("format", "json")])
            .send()
            .await?;

        let status = resp.status();
        // 202 means the snapshot file is still being built.
        if status.as_u16() == 202 {
            return Err(SnapshotError::NotReady);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SnapshotError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let text = resp.text().await?;
        parse_payload(&text)
    }
}

/// Parse a snapshot body. Most datasets deliver a single JSON document, but
/// some deliver NDJSON (one record per line); try the document form first and
/// fall back to line-wise parsing.
pub fn parse_payload(text: &str) -> Result<Vec<Value>> {
    let first_err = match serde_json::from_str::<Value>(text) {
        Ok(value) => return records_from_value(value),
        Err(e) => e,
    };
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => records.push(value),
            Err(_) => return Err(SnapshotError::Parse(first_err.to_string())),
        }
    }
    if records.is_empty() {
        return Err(SnapshotError::Parse(first_err.to_string()));
    }
    Ok(records)
}

/// Normalize the snapshot payload into a flat record list. The provider
/// returns a JSON array for most datasets, but some deliver `{"items": [..]}`
/// or `{"data": [..]}` wrappers, and tiny results arrive as a bare object.
/// A body that is itself a progress sentinel (`{"status": "building"}`) is
/// still a not-ready outcome.
pub fn records_from_value(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut obj) => {
            if let Some(status) = obj.get("status").and_then(Value::as_str) {
                if map_status(status) == JobStatus::Running {
                    return Err(SnapshotError::NotReady);
                }
            }
            for key in ["items", "data"] {
                if let Some(Value::Array(records)) = obj.remove(key) {
                    return Ok(records);
                }
            }
            Ok(vec![Value::Object(obj)])
        }
        other => Err(SnapshotError::Parse(format!(
            "expected array or object payload, got {other}"
        ))),
    }
}

/// Download a ready snapshot with bounded retries. NotReady, network, and
/// parse outcomes all wait the same fixed delay before the next attempt;
/// hard API errors also get retried since the provider occasionally 500s
/// while the file is still materializing. An operator cancel is observed
/// between attempts, never mid-request.
pub async fn download_with_retry(
    api: &dyn SnapshotApi,
    snapshot_id: &str,
    policy: &RetryPolicy,
    cancel: &AtomicBool,
) -> Result<Vec<Value>> {
    let mut last_err = SnapshotError::NotReady;
    for attempt in 1..=policy.download_attempts {
        if cancel.load(Ordering::SeqCst) {
            return Err(SnapshotError::Cancelled);
        }
        match api.download(snapshot_id).await {
            Ok(records) => {
                tracing::info!(snapshot_id, attempt, count = records.len(), "Snapshot downloaded");
                return Ok(records);
            }
            Err(SnapshotError::NotReady) => {
                tracing::debug!(snapshot_id, attempt, "Snapshot data not ready yet");
                last_err = SnapshotError::NotReady;
            }
            Err(e) => {
                tracing::warn!(snapshot_id, attempt, error = %e, "Snapshot download failed");
                last_err = e;
            }
        }
        if attempt < policy.download_attempts {
            tokio::time::sleep(policy.download_delay).await;
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_payload_passes_through() {
        let records = records_from_value(json!([{"a": 1}, {"b": 2}])).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn wrapped_payloads_are_unwrapped() {
        let records = records_from_value(json!({"items": [{"a": 1}]})).unwrap();
        assert_eq!(records.len(), 1);
        let records = records_from_value(json!({"data": [{"a": 1}, {"b": 2}]})).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn single_object_is_wrapped_in_a_list() {
        let records = records_from_value(json!({"profile_handle": "alice"})).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["profile_handle"], "alice");
    }

    #[test]
    fn building_sentinel_body_is_not_ready() {
        let err = records_from_value(json!({"status": "building"})).unwrap_err();
        assert!(matches!(err, SnapshotError::NotReady));
    }

    #[test]
    fn scalar_payload_is_a_parse_error() {
        let err = records_from_value(json!("nope")).unwrap_err();
        assert!(matches!(err, SnapshotError::Parse(_)));
    }

    #[test]
    fn ndjson_payload_parses_line_by_line() {
        let body = "{\"a\": 1}\n{\"b\": 2}\n\n{\"c\": 3}\n";
        let records = parse_payload(body).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1]["b"], 2);
    }

    #[test]
    fn garbage_body_is_a_parse_error() {
        assert!(matches!(parse_payload("<html>"), Err(SnapshotError::Parse(_))));
        assert!(matches!(parse_payload(""), Err(SnapshotError::Parse(_))));
    }

    #[test]
    fn ready_status_object_without_records_is_kept_as_record() {
        // A record that happens to carry a "status" field of its own must not
        // be mistaken for a progress sentinel.
        let records = records_from_value(json!({"status": "ready", "handle": "bob"})).unwrap();
        assert_eq!(records.len(), 1);
    }

    struct FlakyDownload {
        fail_first: u32,
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl SnapshotApi for FlakyDownload {
        async fn trigger(&self, _: &TriggerConfig, _: &[Value]) -> Result<String> {
            Ok("snap".to_string())
        }

        async fn poll(&self, _: &str) -> Result<JobStatus> {
            Ok(JobStatus::Ready)
        }

        async fn download(&self, _: &str) -> Result<Vec<Value>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err(SnapshotError::NotReady)
            } else {
                Ok(vec![json!({"n": n})])
            }
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            poll_interval: std::time::Duration::from_millis(1),
            max_wait: std::time::Duration::from_millis(10),
            download_attempts: attempts,
            download_delay: std::time::Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn download_retry_recovers_within_budget() {
        let api = FlakyDownload { fail_first: 2, calls: Default::default() };
        let cancel = AtomicBool::new(false);
        let records = download_with_retry(&api, "snap", &fast_policy(3), &cancel)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(api.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn download_retry_surfaces_last_error_when_exhausted() {
        let api = FlakyDownload { fail_first: 10, calls: Default::default() };
        let cancel = AtomicBool::new(false);
        let err = download_with_retry(&api, "snap", &fast_policy(3), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::NotReady));
        assert_eq!(api.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn download_retry_observes_cancel_between_attempts() {
        let api = FlakyDownload { fail_first: 10, calls: Default::default() };
        let cancel = AtomicBool::new(true);
        let err = download_with_retry(&api, "snap", &fast_policy(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Cancelled));
        assert_eq!(api.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
