//! HTTP client for executing configured request tasks against the scaled
//! service.
//!
//! Every call ends in a [`CallOutcome`], which keeps a failed call apart from a
//! successful call whose body was empty or not JSON.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::task::HttpTask;

/// Timeout applied to every request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a call produced no result.
#[derive(Debug, Error)]
pub enum CallFailure {
    /// The request could not be sent or the response could not be read.
    #[error("{method} {endpoint} request failed: {source}")]
    Transport {
        method: Method,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a 4xx or 5xx status.
    #[error("{method} {endpoint} returned HTTP {status}")]
    Status {
        method: Method,
        endpoint: String,
        status: StatusCode,
    },
}

/// Result of executing a task.
#[derive(Debug)]
pub enum CallOutcome {
    /// Successful call with a JSON body.
    Json(Value),

    /// Successful call whose body was empty, `null`, or not JSON.
    Empty,

    /// Transport failure or HTTP error status.
    Failed(CallFailure),
}

impl CallOutcome {
    /// The response body, with an empty body mapped to `{}`. `None` if the
    /// call failed.
    pub fn into_body(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Empty => Some(Value::Object(Map::new())),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Executes tasks relative to a base URL.
#[derive(Debug, Clone)]
pub struct TaskClient {
    client: reqwest::Client,
    base_url: String,
}

impl TaskClient {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Build the URL for an endpoint.
    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), endpoint)
        } else {
            format!("{}{}", self.base_url, endpoint)
        }
    }

    /// Execute a task, sending `payload` as a JSON body when given.
    pub async fn execute(&self, task: &HttpTask, payload: Option<&Value>) -> CallOutcome {
        let mut request = self
            .client
            .request(task.method.clone(), self.url(&task.endpoint))
            .headers(task.headers.clone());
        if let Some(body) = payload {
            request = request.json(body);
        }

        let transport_failure = |source: reqwest::Error| {
            let failure = CallFailure::Transport {
                method: task.method.clone(),
                endpoint: task.endpoint.clone(),
                source,
            };
            error!(task = %task.name, error = %failure, "Request failed");
            CallOutcome::Failed(failure)
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(e),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(e) => return transport_failure(e),
        };

        let body = parse_body(&raw);
        let payload_repr = payload.map(render_compact);
        let body_repr = body
            .as_ref()
            .map(render_compact)
            .unwrap_or_else(|| "{}".to_string());
        info!(
            method = %task.method,
            endpoint = %task.endpoint,
            payload = payload_repr.as_deref(),
            status = status.as_u16(),
            body = %body_repr,
            "Request completed"
        );
        debug!(method = %task.method, headers = ?headers, "Response headers");
        if body.is_none() && !raw.is_empty() {
            debug!(method = %task.method, raw_body = %raw, "Response body is not JSON");
        }

        if status.is_client_error() || status.is_server_error() {
            let failure = CallFailure::Status {
                method: task.method.clone(),
                endpoint: task.endpoint.clone(),
                status,
            };
            error!(task = %task.name, error = %failure, "Request returned an error status");
            return CallOutcome::Failed(failure);
        }

        match body {
            Some(value) => CallOutcome::Json(value),
            None => CallOutcome::Empty,
        }
    }
}

/// Parse a response body. Empty, `null`, and non-JSON bodies yield `None`.
fn parse_body(raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) | Err(_) => None,
        Ok(value) => Some(value),
    }
}

/// Single-line JSON rendering for logs.
fn render_compact(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_url_building() {
        let client = TaskClient::new("http://localhost:9000/").unwrap();
        assert_eq!(client.url("/status"), "http://localhost:9000/status");

        let client = TaskClient::new("http://localhost:9000/api/").unwrap();
        assert_eq!(client.url("status"), "http://localhost:9000/api/status");
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(r#"{"key": "value"}"#), Some(json!({"key": "value"})));
        assert_eq!(parse_body("[1, 2]"), Some(json!([1, 2])));
        assert_eq!(parse_body("not-json"), None);
        assert_eq!(parse_body(""), None);
        assert_eq!(parse_body("null"), None);
    }

    #[test]
    fn test_render_compact_is_single_line() {
        let rendered = render_compact(&json!({"cpu": {"highPriority": 0.5}, "replicas": 2}));
        assert!(!rendered.contains('\n'));
        assert!(rendered.contains(r#""replicas":2"#));
    }

    #[test]
    fn test_into_body() {
        assert_eq!(CallOutcome::Json(json!({"ok": true})).into_body(), Some(json!({"ok": true})));
        assert_eq!(CallOutcome::Empty.into_body(), Some(json!({})));
        assert!(!CallOutcome::Empty.is_failure());
    }
}
