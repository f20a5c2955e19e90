//! WexHub Pipeline - Asynchronous IFC processing
//!
//! The components between "version created" and "version Ready":
//! - [`InMemoryJobQueue`] - bounded channel queue with non-blocking
//!   enqueue
//! - [`ProcessedJobs`] - the shared at-most-once dispatch tracker
//! - [`HandlerRegistry`] - job handlers keyed by job type
//! - [`Worker`] - the dequeue/dispatch/project loop
//! - The two processing handlers (geometry translation, property
//!   extraction) and stub translators for tests and local runs

pub mod handlers;
pub mod queue;
pub mod registry;
pub mod stubs;
pub mod tracker;
pub mod worker;

pub use handlers::{PropertyExtractionHandler, WexBimConversionHandler};
pub use queue::InMemoryJobQueue;
pub use registry::HandlerRegistry;
pub use stubs::{StubGeometryTranslator, StubPropertyExtractor};
pub use tracker::ProcessedJobs;
pub use worker::Worker;
