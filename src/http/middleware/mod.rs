pub mod caller;

pub use caller::{caller_context_middleware, X_USER_ID};
