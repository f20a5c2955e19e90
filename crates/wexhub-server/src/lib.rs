//! WexHub Server - HTTP front and process wiring
//!
//! The only layer that knows about HTTP: request parsing, routing,
//! JSON/form encoding, correlation ids, rate-limit admission, and the
//! single error-to-status translation. Everything below it speaks the
//! domain types of `wexhub-core`.

pub mod http;
pub mod state;

pub use state::{build_state, build_state_with, build_state_with_translators, AppState};
