//! Connector definitions and per-user secrets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authentication scheme a connector expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthType {
    #[default]
    None,
    ApiKeyHeader,
    ApiKeyQuery,
    BearerToken,
    BasicAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectorStatus {
    #[default]
    Active,
    Inactive,
}

/// An external REST API the hub can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,

    /// Base URL, e.g. `https://api.example.com/v1`.
    pub base_url: String,

    #[serde(default)]
    pub auth_type: AuthType,

    /// Header carrying the API key for `ApiKeyHeader`.
    #[serde(default)]
    pub api_key_header_name: Option<String>,

    /// Query parameter carrying the API key for `ApiKeyQuery`.
    #[serde(default)]
    pub api_key_query_param_name: Option<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub status: ConnectorStatus,

    /// Declared in configuration; gets its own resilience pipeline instead
    /// of sharing the dynamic one.
    #[serde(default)]
    pub dedicated_pipeline: bool,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Connector {
    /// Create an active connector with no authentication.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_url: base_url.into(),
            auth_type: AuthType::None,
            api_key_header_name: None,
            api_key_query_param_name: None,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            status: ConnectorStatus::Active,
            dedicated_pipeline: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ConnectorStatus::Active
    }
}

/// Encrypted credentials a user holds for a connector.
///
/// Plaintext never lives here; the vault decrypts on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSecret {
    pub user_id: String,
    pub connector_id: Uuid,
    pub encrypted_api_key: Option<String>,
    pub encrypted_token: Option<String>,
    /// Informational only; expired secrets are still applied.
    pub expires_at: Option<DateTime<Utc>>,
}

/// HTTP verbs supported for outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Only POST, PUT and PATCH carry a request body.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_body_methods() {
        assert!(HttpMethod::Post.carries_body());
        assert!(HttpMethod::Patch.carries_body());
        assert!(!HttpMethod::Get.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
    }

    #[test]
    fn test_connector_defaults_from_toml() {
        let connector: Connector = toml::from_str(
            r#"
            id = "6f1c5d9e-8a7b-4c3d-9e2f-1a2b3c4d5e6f"
            name = "weather"
            base_url = "https://api.weather.test"
            "#,
        )
        .unwrap();

        assert_eq!(connector.auth_type, AuthType::None);
        assert_eq!(connector.timeout_seconds, 30);
        assert_eq!(connector.max_retries, 3);
        assert!(connector.is_active());
    }
}
