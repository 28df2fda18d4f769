//! Outbound HTTP transport.
//!
//! # Data Flow
//! ```text
//! dispatcher / notifier
//!     → OutboundRequest (method, url, headers, body)
//!     → resilience pipeline
//!     → Transport::send (one attempt)
//!     → TransportResponse | TransportError
//! ```
//!
//! # Design Decisions
//! - The transport performs exactly one attempt; deadlines and retries are
//!   owned by the pipeline
//! - Non-2xx statuses are responses, not errors

pub mod client;
#[cfg(test)]
pub(crate) mod scripted;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::HttpMethod;

pub use client::ReqwestTransport;

/// A fully built outbound request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutboundRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Set a header, replacing any existing value under the same name
    /// (case-insensitive).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Append an already-encoded `name=value` pair to the query string.
    pub fn append_query(&mut self, name: &str, encoded_value: &str) {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        self.url = format!("{}{}{}={}", self.url, separator, name, encoded_value);
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    /// Canonical reason phrase, when the status has one.
    pub reason: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// `"<code> <reason>"`, or just the code.
    pub fn status_line(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} {}", self.status, reason),
            None => self.status.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Sends one HTTP attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError>;
}
