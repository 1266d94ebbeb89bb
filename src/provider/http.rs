//! Shared HTTP client, auth headers and status mapping.

use std::sync::OnceLock;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::ParleyError;
use crate::util::retry::RetryPolicy;
use crate::wire::{SseBuffer, SseFrame};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Build Anthropic-style headers (x-api-key).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// POST a streaming request, retrying retryable failures until a success
/// status arrives. Nothing is retried once the body starts streaming.
pub async fn open_stream(
    url: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
    retry: &RetryPolicy,
) -> Result<reqwest::Response, ParleyError> {
    retry
        .execute(move || {
            let headers = headers.clone();
            async move {
                let resp = shared_client()
                    .post(url)
                    .headers(headers)
                    .json(body)
                    .send()
                    .await?;
                let status = resp.status().as_u16();
                if !(200..300).contains(&status) {
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(status_to_error(status, &body_text));
                }
                Ok(resp)
            }
        })
        .await
}

/// Adapt a response body into SSE frames.
pub fn sse_frames(resp: reqwest::Response) -> BoxStream<'static, Result<SseFrame, ParleyError>> {
    let byte_stream = resp.bytes_stream();
    let stream = async_stream::stream! {
        let mut buffer = SseBuffer::new();
        futures::pin_mut!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            match chunk_result {
                Ok(chunk) => {
                    for frame in buffer.push(&chunk) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(ParleyError::Network(e));
                    return;
                }
            }
        }
        if let Some(frame) = buffer.finish() {
            yield Ok(frame);
        }
    };
    Box::pin(stream)
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> ParleyError {
    match status {
        401 | 403 => ParleyError::Authentication(body.to_string()),
        429 => ParleyError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => ParleyError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

/// Parse a tool-argument JSON string into an argument map.
///
/// Empty input is an empty map; anything that is not a JSON object is kept
/// under `"input"` so the tool still sees it.
pub fn parse_tool_args(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            let mut map = serde_json::Map::new();
            map.insert("input".into(), other);
            map
        }
        Err(e) => {
            tracing::warn!(error = %e, "unparseable tool arguments");
            let mut map = serde_json::Map::new();
            map.insert("input".into(), serde_json::Value::String(raw.to_string()));
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(status_to_error(401, "no"), ParleyError::Authentication(_)));
        assert!(matches!(
            status_to_error(429, r#"{"error":{"retry_after":1.5}}"#),
            ParleyError::RateLimited {
                retry_after_ms: Some(1500)
            }
        ));
        assert!(status_to_error(502, "bad gateway").is_retryable());
        assert!(!status_to_error(400, "bad request").is_retryable());
    }

    #[test]
    fn tool_args_parsing() {
        assert!(parse_tool_args("").is_empty());
        assert_eq!(parse_tool_args(r#"{"a":1}"#)["a"], 1);
        assert_eq!(parse_tool_args("[1]")["input"], serde_json::json!([1]));
        assert_eq!(parse_tool_args("{oops")["input"], "{oops");
    }
}
