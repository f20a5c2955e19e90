//! WexHub Audit - append-only security event trail
//!
//! Provides:
//! - [`AuditRecorder`] - the query surface over the audit repository plus
//!   non-fatal appends for best-effort events
//! - Client IP derivation from forwarding headers
//!
//! Lifecycle events that must commit atomically with their domain action
//! do not pass through here; they ride the repository methods that take
//! the entry into the transaction.

mod ip;
mod recorder;

pub use ip::client_ip;
pub use recorder::AuditRecorder;
