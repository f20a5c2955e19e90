//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for identifiers and validated values. Each
//! newtype ensures data validity at construction time, so the rest of the
//! domain can take them at face value.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// A generic unique identifier wrapper around UUID
///
/// Used for rows that do not warrant a dedicated id type (memberships,
/// invites, audit entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(Uuid);

impl UniqueId {
    /// Create a new random UniqueId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a UniqueId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UniqueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UniqueId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid UUID: {e}")))
    }
}

impl From<Uuid> for UniqueId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier for User entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Identifier for Workspace entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(Uuid);

/// Identifier for Project entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

/// Identifier for File entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

/// Identifier for UploadSession entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

/// Identifier for Model entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(Uuid);

/// Identifier for ModelVersion entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(Uuid);

/// Identifier for OAuthApp entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(Uuid);

/// Identifier for PersonalAccessToken entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatId(Uuid);

/// Identifier for processing job envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

/// Implements the shared constructor/conversion surface for a UUID id type.
///
/// Every id type gets: `new`, `from_uuid`, `as_uuid`, `Default`, `Display`,
/// `FromStr` (with a type-specific parse error), and `From<Uuid>`.
macro_rules! impl_uuid_id {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl $ty {
                /// Create a new random identifier
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Create an identifier from an existing UUID
                #[must_use]
                pub const fn from_uuid(uuid: Uuid) -> Self {
                    Self(uuid)
                }

                /// Get the inner UUID value
                #[must_use]
                pub const fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $ty {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl Display for $ty {
                fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $ty {
                type Err = DomainError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self).map_err(|e| {
                        DomainError::InvalidId(format!(
                            concat!("Invalid ", stringify!($ty), ": {}"),
                            e
                        ))
                    })
                }
            }

            impl From<Uuid> for $ty {
                fn from(uuid: Uuid) -> Self {
                    Self(uuid)
                }
            }
        )+
    };
}

impl_uuid_id!(
    UserId,
    WorkspaceId,
    ProjectId,
    FileId,
    UploadId,
    ModelId,
    VersionId,
    AppId,
    PatId,
    JobId,
);

// ============================================================================
// Email
// ============================================================================

/// A validated, lower-cased email address
///
/// Validation is intentionally shallow (one `@` with non-empty local part
/// and domain); the authority on deliverability is whoever sends mail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Creates a validated email, lower-casing the input
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_lowercase();
        let mut parts = value.splitn(2, '@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();
        if local.is_empty() || domain.is_empty() || !domain.contains('.') {
            return Err(DomainError::Validation(format!(
                "Invalid email address: {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Returns the email as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// StorageKey
// ============================================================================

/// A deterministic blob storage key
///
/// Keys follow the layout `<workspaceId>/<projectId>/uploads/<sessionId><ext>`
/// for upload temporaries and
/// `<workspaceId>/<projectId>/artifacts/<versionId><suffix>` for processing
/// artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Wraps an already-formed key (used when reloading from the store)
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() || value.starts_with('/') || value.contains("..") {
            return Err(DomainError::Validation(format!(
                "Invalid storage key: {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Derives the temporary key for an upload session
    ///
    /// `ext` is the lowercased extension of the reserved file name including
    /// the leading dot, or empty when the name has none.
    pub fn for_upload(workspace: WorkspaceId, project: ProjectId, upload: UploadId, ext: &str) -> Self {
        Self(format!("{workspace}/{project}/uploads/{upload}{ext}"))
    }

    /// Derives the artifact key for a processed model version
    pub fn for_artifact(
        workspace: WorkspaceId,
        project: ProjectId,
        version: VersionId,
        suffix: &str,
    ) -> Self {
        Self(format!("{workspace}/{project}/artifacts/{version}{suffix}"))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod id_tests {
        use super::*;

        #[test]
        fn test_new_ids_are_unique() {
            assert_ne!(WorkspaceId::new(), WorkspaceId::new());
            assert_ne!(FileId::new(), FileId::new());
        }

        #[test]
        fn test_display_roundtrip() {
            let id = ProjectId::new();
            let parsed: ProjectId = id.to_string().parse().unwrap();
            assert_eq!(id, parsed);
        }

        #[test]
        fn test_from_str_rejects_garbage() {
            assert!("not-a-uuid".parse::<UserId>().is_err());
            assert!("".parse::<VersionId>().is_err());
        }

        #[test]
        fn test_serde_transparent() {
            let id = UploadId::new();
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{id}\""));
        }
    }

    mod email_tests {
        use super::*;

        #[test]
        fn test_lowercases_and_trims() {
            let email = Email::new("  Alice@Example.COM ").unwrap();
            assert_eq!(email.as_str(), "alice@example.com");
        }

        #[test]
        fn test_rejects_invalid() {
            assert!(Email::new("no-at-sign").is_err());
            assert!(Email::new("@example.com").is_err());
            assert!(Email::new("user@").is_err());
            assert!(Email::new("user@nodot").is_err());
        }
    }

    mod storage_key_tests {
        use super::*;

        #[test]
        fn test_upload_key_layout() {
            let ws = WorkspaceId::new();
            let proj = ProjectId::new();
            let upload = UploadId::new();
            let key = StorageKey::for_upload(ws, proj, upload, ".ifc");
            assert_eq!(key.as_str(), format!("{ws}/{proj}/uploads/{upload}.ifc"));
        }

        #[test]
        fn test_artifact_key_layout() {
            let ws = WorkspaceId::new();
            let proj = ProjectId::new();
            let version = VersionId::new();
            let key = StorageKey::for_artifact(ws, proj, version, ".wexbim");
            assert_eq!(
                key.as_str(),
                format!("{ws}/{proj}/artifacts/{version}.wexbim")
            );
        }

        #[test]
        fn test_rejects_traversal() {
            assert!(StorageKey::new("../etc/passwd").is_err());
            assert!(StorageKey::new("/absolute").is_err());
            assert!(StorageKey::new("").is_err());
        }
    }
}
