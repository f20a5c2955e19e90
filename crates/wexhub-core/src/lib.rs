//! WexHub Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Workspace`, `Project`, `File`, `UploadSession`,
//!   `Model`, `ModelVersion`, `OAuthApp`, `RefreshTokenRecord`,
//!   `PersonalAccessToken`, audit events
//! - **Use cases** - upload machine, artifact catalog, model versions,
//!   workspace/project membership management, access gating
//! - **Port definitions** - Traits for adapters: `BlobStore`, repositories,
//!   `JobQueue`, processing handlers
//! - **State machines** - upload session, model version, refresh token
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external
//! dependencies. Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
