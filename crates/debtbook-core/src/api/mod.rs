//! Transport port and response envelope.
//!
//! The core never talks HTTP directly; it goes through the `Transport`
//! trait so the presentation layer (and the tests) can inject their own
//! implementation. `HttpTransport` is the bundled default over `reqwest`.
//!
//! A transport-level rejection (DNS, timeout, connection reset) and a
//! `success: false` reply are treated identically by the repository.

pub mod decode;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpTransport;

/// HTTP-ish verbs the backend contract uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// What every backend call resolves to, success or not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportReply {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TransportReply {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Port to the backend. Async, object-safe, injectable.
///
/// `Err` means the request never produced an answer (network-level
/// failure); a reply with `success: false` means the backend answered
/// and refused.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<TransportReply>;
}
