//! WexHub Blob - Filesystem blob storage
//!
//! Reference implementation of the blob store port on a local directory.
//! Keys map to paths under the configured root; writes stream through a
//! hidden part-file and only become visible on the final rename, so an
//! aborted upload never leaves a partial blob under its key. Pre-signed
//! uploads are not supported (`presign_put` returns `None`), which makes
//! every session fall back to server-proxied mode.

mod fs;

pub use fs::FsBlobStore;
