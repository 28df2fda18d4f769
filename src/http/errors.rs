//! Mapping engine errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{ConfigurationError, DispatchError};

/// Handler error. Internal failures are logged and reported without detail.
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl<E> From<E> for ApiError
where
    E: Into<DispatchError>,
{
    fn from(error: E) -> Self {
        Self(error.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DispatchError::Configuration(e) => match e {
                ConfigurationError::ConnectorNotFound(_)
                | ConfigurationError::JobNotFound(_)
                | ConfigurationError::WebhookNotFound(_)
                | ConfigurationError::DeliveryNotFound(_) => StatusCode::NOT_FOUND,
                ConfigurationError::ConnectorInactive(_)
                | ConfigurationError::InvalidCron { .. }
                | ConfigurationError::InvalidConnector(_) => StatusCode::BAD_REQUEST,
            },
            DispatchError::Vault(_) | DispatchError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::from(ConfigurationError::JobNotFound(Uuid::nil()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let bad_cron = ApiError::from(ConfigurationError::InvalidCron {
            expression: "x".into(),
            reason: "bad".into(),
        });
        assert_eq!(bad_cron.status(), StatusCode::BAD_REQUEST);

        let store = ApiError::from(StoreError::Backend("disk full".into()));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
