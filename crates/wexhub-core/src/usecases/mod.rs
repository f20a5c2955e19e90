//! Use cases orchestrating domain entities through port interfaces
//!
//! Every use case takes the authenticated [`Principal`] first and runs the
//! access gate (scope, workspace binding, role) before touching state.
//!
//! [`Principal`]: crate::domain::scope::Principal

pub mod access;
pub mod files;
pub mod models;
pub mod projects;
pub mod properties;
pub mod uploads;
pub mod workspaces;

#[cfg(test)]
pub mod testing;

pub use access::AccessGate;
pub use files::{FileCatalogService, FileDownload};
pub use models::{ModelService, WexBimDownload};
pub use projects::ProjectService;
pub use properties::PropertiesService;
pub use uploads::{CommitOutcome, ReserveOutcome, ReserveRequest, UploadService};
pub use workspaces::WorkspaceService;
