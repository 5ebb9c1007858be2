//! HTTP utilities for Azure Resource Manager REST calls

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Errors returned by the management API transport.
#[derive(Debug, Error)]
pub enum ApimError {
    /// The control plane answered with a non-success status.
    #[error("{method} {path} failed with status {status}: {message}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
        message: String,
    },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// A resource URL could not be built.
    #[error("invalid resource URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApimError {
    /// HTTP status of the failure, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

pub type ApimResult<T> = Result<T, ApimError>;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Pull the human readable message out of an ARM error envelope
/// (`{"error": {"code": "...", "message": "..."}}`), falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let err = v.get("error")?;
            let code = err.get("code").and_then(Value::as_str).unwrap_or("Error");
            let message = err.get("message").and_then(Value::as_str)?;
            Some(format!("{code}: {message}"))
        })
        .unwrap_or_else(|| sanitize_for_log(body))
}

/// HTTP client wrapper for management API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> ApimResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("apimprov/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, token: &str) -> ApimResult<Value> {
        self.send(Method::GET, url, token, None).await
    }

    pub async fn put(&self, url: &str, token: &str, body: Option<&Value>) -> ApimResult<Value> {
        self.send(Method::PUT, url, token, body).await
    }

    pub async fn patch(&self, url: &str, token: &str, body: &Value) -> ApimResult<Value> {
        self.send(Method::PATCH, url, token, Some(body)).await
    }

    pub async fn delete(&self, url: &str, token: &str) -> ApimResult<Value> {
        self.send(Method::DELETE, url, token, None).await
    }

    /// Send one request and decode the JSON answer.
    /// Empty bodies (204, bodiless 200/201) decode to `Value::Null`.
    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> ApimResult<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(ApimError::Status {
                method,
                path: strip_query(url).to_string(),
                status,
                message: error_message(&response_body),
            });
        }

        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&response_body)?)
    }
}

/// Drop the query string so error messages stay short.
fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_arm_envelope() {
        let body = r#"{"error":{"code":"ValidationError","message":"path is invalid"}}"#;
        assert_eq!(error_message(body), "ValidationError: path is invalid");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let body = "é".repeat(150);
        let out = sanitize_for_log(&body);
        assert!(out.contains("truncated, 300 bytes total"));
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(
            strip_query("https://x/apis/a?api-version=2022-08-01"),
            "https://x/apis/a"
        );
    }
}
