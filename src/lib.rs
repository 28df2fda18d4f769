//! Connector Dispatch & Resilience Engine Library

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod resilience;
pub mod scheduler;
pub mod store;
pub mod transport;
pub mod vault;
pub mod webhook;

pub use config::HubConfig;
pub use dispatch::Dispatcher;
pub use error::{ConfigurationError, DispatchError, DispatchResult};
pub use http::ApiServer;
pub use lifecycle::{Engine, Shutdown};
pub use scheduler::Scheduler;
pub use webhook::WebhookNotifier;
