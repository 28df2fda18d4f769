//! Authentication strategy selection.
//!
//! Maps a connector's auth type plus decrypted credentials to header or
//! query mutations on an outbound request. Applying a strategy never fails:
//! when credentials or parameter names are missing the request goes out
//! unauthenticated and the upstream decides.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::model::{AuthType, Connector};
use crate::transport::OutboundRequest;
use crate::vault::Credentials;

/// Authentication scheme resolved from a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    None,
    ApiKeyHeader { header_name: Option<String> },
    ApiKeyQuery { param_name: Option<String> },
    BearerToken,
    BasicAuth,
}

/// What `apply` did to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Applied,
    NotRequired,
    /// No stored secret, or the secret lacks the needed part.
    MissingSecret,
    /// Header or query parameter name not configured on the connector.
    MissingParameterName,
}

impl AuthStrategy {
    pub fn for_connector(connector: &Connector) -> Self {
        match connector.auth_type {
            AuthType::None => AuthStrategy::None,
            AuthType::ApiKeyHeader => AuthStrategy::ApiKeyHeader {
                header_name: non_empty(connector.api_key_header_name.as_deref()),
            },
            AuthType::ApiKeyQuery => AuthStrategy::ApiKeyQuery {
                param_name: non_empty(connector.api_key_query_param_name.as_deref()),
            },
            AuthType::BearerToken => AuthStrategy::BearerToken,
            AuthType::BasicAuth => AuthStrategy::BasicAuth,
        }
    }

    pub fn apply(&self, credentials: Option<&Credentials>, request: &mut OutboundRequest) -> AuthOutcome {
        if *self == AuthStrategy::None {
            return AuthOutcome::NotRequired;
        }
        let Some(creds) = credentials else {
            return AuthOutcome::MissingSecret;
        };

        match self {
            AuthStrategy::None => AuthOutcome::NotRequired,
            AuthStrategy::ApiKeyHeader { header_name } => {
                let Some(name) = header_name else {
                    return AuthOutcome::MissingParameterName;
                };
                let Some(key) = creds.api_key.as_deref() else {
                    return AuthOutcome::MissingSecret;
                };
                request.set_header(name.as_str(), key);
                AuthOutcome::Applied
            }
            AuthStrategy::ApiKeyQuery { param_name } => {
                let Some(name) = param_name else {
                    return AuthOutcome::MissingParameterName;
                };
                let Some(key) = creds.api_key.as_deref() else {
                    return AuthOutcome::MissingSecret;
                };
                request.append_query(name, &urlencoding::encode(key));
                AuthOutcome::Applied
            }
            AuthStrategy::BearerToken => {
                let Some(token) = creds.token.as_deref().or(creds.api_key.as_deref()) else {
                    return AuthOutcome::MissingSecret;
                };
                request.set_header("Authorization", format!("Bearer {}", token));
                AuthOutcome::Applied
            }
            AuthStrategy::BasicAuth => {
                if creds.api_key.is_none() && creds.token.is_none() {
                    return AuthOutcome::MissingSecret;
                }
                let pair = format!(
                    "{}:{}",
                    creds.api_key.as_deref().unwrap_or_default(),
                    creds.token.as_deref().unwrap_or_default()
                );
                request.set_header("Authorization", format!("Basic {}", STANDARD.encode(pair)));
                AuthOutcome::Applied
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).map(str::to_string)
}
