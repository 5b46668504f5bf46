//! Thin axum control plane (spec.md §6, SPEC_FULL.md §A.5) running inside
//! the Pool Manager process. Internals are deliberately minimal — the spec
//! places the HTTP/WebSocket surface's own implementation out of scope and
//! only requires the shape and its dispatch into the pool.

pub mod routes;
pub mod state;
pub mod ws;

pub use routes::router;
pub use state::AppState;
