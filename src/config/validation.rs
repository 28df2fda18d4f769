//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HubConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::HubConfig;
use crate::model::Connector;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &HubConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("server.bind_address", "not a socket address"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }

    let r = &config.resilience;
    if r.max_concurrency == 0 {
        errors.push(ValidationError::new("resilience.max_concurrency", "must be > 0"));
    }
    if !(r.failure_ratio > 0.0 && r.failure_ratio <= 1.0) {
        errors.push(ValidationError::new("resilience.failure_ratio", "must be in (0, 1]"));
    }
    if r.sampling_duration_secs == 0 {
        errors.push(ValidationError::new("resilience.sampling_duration_secs", "must be > 0"));
    }
    if r.break_duration_secs == 0 {
        errors.push(ValidationError::new("resilience.break_duration_secs", "must be > 0"));
    }
    if r.minimum_throughput == 0 {
        errors.push(ValidationError::new("resilience.minimum_throughput", "must be > 0"));
    }
    if r.base_delay_ms > r.max_delay_ms {
        errors.push(ValidationError::new("resilience.base_delay_ms", "exceeds max_delay_ms"));
    }

    if config.webhooks.timeout_secs == 0 {
        errors.push(ValidationError::new("webhooks.timeout_secs", "must be > 0"));
    }
    if config.webhooks.max_concurrency == 0 {
        errors.push(ValidationError::new("webhooks.max_concurrency", "must be > 0"));
    }
    if config.webhooks.failure_threshold == 0 {
        errors.push(ValidationError::new("webhooks.failure_threshold", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    let mut names = HashSet::new();
    for (i, connector) in config.connectors.iter().enumerate() {
        let field = format!("connectors[{}]", i);
        if !connector.name.trim().is_empty() && !names.insert(connector.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate connector name '{}'", connector.name),
            ));
        }
        errors.extend(connector_errors(connector, &field));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks a connector must pass whether it is declared in configuration or
/// registered at runtime.
pub fn validate_connector(connector: &Connector) -> Result<(), Vec<ValidationError>> {
    let errors = connector_errors(connector, "connector");
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn connector_errors(connector: &Connector, field: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if connector.name.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
    }
    match Url::parse(&connector.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(_) => errors.push(ValidationError::new(
            format!("{}.base_url", field),
            "scheme must be http or https",
        )),
        Err(e) => errors.push(ValidationError::new(format!("{}.base_url", field), e.to_string())),
    }
    if connector.timeout_seconds == 0 {
        errors.push(ValidationError::new(format!("{}.timeout_seconds", field), "must be > 0"));
    }
    errors
}
