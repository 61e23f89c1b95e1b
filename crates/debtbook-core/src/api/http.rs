//! Default `Transport` implementation over HTTP.
//!
//! Maps HTTP statuses and response bodies into the `TransportReply`
//! envelope. Backends that already answer in envelope form (`{"success":
//! ..., "data": ..., "message": ...}`) are passed through; bare payloads
//! are wrapped. Network-level failures surface as `Err` and are treated
//! by the repository exactly like a `success: false` reply.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;

use super::{Method, Transport, TransportReply};

/// Maximum length of a response body quoted in a failure message.
const MAX_MESSAGE_BODY_LEN: usize = 500;

/// HTTP transport for the debtbook backend.
/// Clone is cheap - `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Same transport with a bearer token attached, sharing the
    /// connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<TransportReply> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        }
        .headers(self.auth_headers()?);

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(%method, path, status = %status, "backend reply received");

        Ok(reply_from_response(status, &text))
    }
}

/// Turn a status plus body text into the reply envelope.
fn reply_from_response(status: StatusCode, body: &str) -> TransportReply {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    // Envelope-shaped bodies carry their own verdict
    if let Some(ref value) = parsed {
        if value.get("success").and_then(Value::as_bool).is_some() {
            if let Ok(reply) = serde_json::from_value::<TransportReply>(value.clone()) {
                return reply;
            }
        }
    }

    if status.is_success() {
        TransportReply {
            success: true,
            data: parsed,
            message: None,
        }
    } else {
        TransportReply {
            success: false,
            data: None,
            message: Some(failure_message(status, parsed.as_ref(), body)),
        }
    }
}

fn failure_message(status: StatusCode, parsed: Option<&Value>, body: &str) -> String {
    // Prefer a message field from the body when the backend sent one
    let from_body = parsed
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(Value::as_str)
        .map(str::to_string);

    match from_body {
        Some(message) if !message.is_empty() => format!("{}: {}", status, message),
        _ => {
            let truncated = if body.len() <= MAX_MESSAGE_BODY_LEN {
                body.to_string()
            } else {
                format!("{}... (truncated)", &body[..MAX_MESSAGE_BODY_LEN])
            };
            if truncated.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, truncated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_payload_is_wrapped() {
        let reply = reply_from_response(StatusCode::OK, r#"[{"id": "c1"}]"#);
        assert!(reply.success);
        assert_eq!(reply.data, Some(json!([{"id": "c1"}])));
    }

    #[test]
    fn test_envelope_body_passes_through() {
        let reply = reply_from_response(
            StatusCode::OK,
            r#"{"success": false, "message": "record not found"}"#,
        );
        assert!(!reply.success);
        assert_eq!(reply.message.as_deref(), Some("record not found"));
    }

    #[test]
    fn test_error_status_carries_body_message() {
        let reply = reply_from_response(
            StatusCode::NOT_FOUND,
            r#"{"message": "no such contact"}"#,
        );
        assert!(!reply.success);
        assert!(reply.message.unwrap().contains("no such contact"));
    }

    #[test]
    fn test_error_status_with_empty_body() {
        let reply = reply_from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(!reply.success);
        assert!(reply.message.unwrap().contains("500"));
    }

    #[test]
    fn test_non_json_success_body() {
        let reply = reply_from_response(StatusCode::OK, "");
        assert!(reply.success);
        assert_eq!(reply.data, None);
    }
}
