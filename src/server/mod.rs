//! HTTP server for playing through a web UI.
//!
//! Exposes one [`Game`](crate::orchestrator::Game) over HTTP; runs are
//! streamed back to the client as server-sent events.

pub mod error;
pub mod routes;

pub use error::ServerError;
pub use routes::{app_router, AppState};
