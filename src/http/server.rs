//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Attach the caller context to every `/api` request
//! - Serve until the shutdown coordinator fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::handlers;
use crate::http::middleware::caller_context_middleware;
use crate::lifecycle::{Engine, Shutdown};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// HTTP front end for the engine.
pub struct ApiServer {
    router: Router,
    shutdown: Shutdown,
}

impl ApiServer {
    pub fn new(engine: Arc<Engine>, config: &ServerConfig) -> Self {
        let shutdown = engine.shutdown.clone();
        let router = Self::build_router(config, AppState { engine });
        Self { router, shutdown }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let api = Router::new()
            .route("/api/connectors", get(handlers::list_connectors).post(handlers::register_connector))
            .route("/api/connectors/{id}/credentials", put(handlers::put_credentials))
            .route("/api/requests", get(handlers::list_call_records).post(handlers::send_request))
            .route("/api/jobs", get(handlers::list_jobs).post(handlers::create_job))
            .route(
                "/api/jobs/{id}",
                get(handlers::get_job)
                    .put(handlers::update_job)
                    .delete(handlers::delete_job),
            )
            .route("/api/jobs/{id}/toggle", post(handlers::toggle_job))
            .route("/api/jobs/{id}/run", post(handlers::run_job))
            .route("/api/jobs/{id}/executions", get(handlers::list_executions))
            .route("/api/webhooks", get(handlers::list_webhooks).post(handlers::register_webhook))
            .route("/api/webhooks/{id}/test", post(handlers::test_webhook))
            .route("/api/webhooks/{id}/deliveries", get(handlers::list_deliveries))
            .route("/api/deliveries/{id}/retry", post(handlers::retry_delivery))
            .route("/api/events", post(handlers::trigger_event))
            .route("/api/pipelines", get(handlers::get_pipelines))
            .route("/api/pipelines/reset", post(handlers::reset_pipelines))
            .route_layer(middleware::from_fn(caller_context_middleware));

        Router::new()
            .route("/health", get(handlers::get_status))
            .merge(api)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving through something other than `run`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = self.shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Draining HTTP connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn server() -> ApiServer {
        let config = HubConfig::default();
        let engine = Engine::build(&config, Shutdown::new()).await.unwrap();
        ApiServer::new(Arc::new(engine), &config.server)
    }

    async fn status_of(router: Router, request: Request<Body>) -> StatusCode {
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_health_needs_no_user() {
        let server = server().await;
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let response = server.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_api_requires_user_id() {
        let server = server().await;
        let request = Request::get("/api/jobs").body(Body::empty()).unwrap();
        assert_eq!(status_of(server.router(), request).await, StatusCode::UNAUTHORIZED);

        let request = Request::get("/api/jobs")
            .header("X-User-Id", "u1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(server.router(), request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = server().await;

        let request = Request::post(format!("/api/jobs/{}/run", uuid::Uuid::new_v4()))
            .header("X-User-Id", "u1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(server.router(), request).await, StatusCode::NOT_FOUND);

        let connector = server
            .router()
            .oneshot(
                Request::post("/api/connectors")
                    .header("X-User-Id", "u1")
                    .header("Content-Type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"id":"{}","name":"crm","base_url":"https://crm.test"}}"#,
                        uuid::Uuid::new_v4()
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(connector.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(connector.into_body(), 1 << 16).await.unwrap();
        let connector: serde_json::Value = serde_json::from_slice(&body).unwrap();

        let request = Request::post("/api/jobs")
            .header("X-User-Id", "u1")
            .header("Content-Type", "application/json")
            .body(Body::from(format!(
                r#"{{"connectorId":{},"name":"n","endpoint":"/x","cronExpression":"every day"}}"#,
                connector["id"]
            )))
            .unwrap();
        assert_eq!(status_of(server.router(), request).await, StatusCode::BAD_REQUEST);
    }
}
