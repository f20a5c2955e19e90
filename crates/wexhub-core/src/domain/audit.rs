//! Audit log entities
//!
//! Append-only events for OAuth-app and PAT lifecycles. Event types are a
//! closed enum per subject; `details` is a structured map serialized to a
//! stable JSON form. Lifecycle audit writes ride the same transaction as
//! the domain action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{AppId, PatId, UniqueId, UserId};

/// Events recorded against an OAuth application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthAppEvent {
    Created,
    Updated,
    Enabled,
    Disabled,
    Deleted,
    SecretRotated,
    RefreshTokenIssued,
}

impl std::fmt::Display for OAuthAppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OAuthAppEvent::Created => "created",
            OAuthAppEvent::Updated => "updated",
            OAuthAppEvent::Enabled => "enabled",
            OAuthAppEvent::Disabled => "disabled",
            OAuthAppEvent::Deleted => "deleted",
            OAuthAppEvent::SecretRotated => "secret_rotated",
            OAuthAppEvent::RefreshTokenIssued => "refresh_token_issued",
        };
        write!(f, "{s}")
    }
}

/// Events recorded against a personal access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatEvent {
    Created,
    Updated,
    RevokedByUser,
    RevokedByAdmin,
    Used,
}

impl std::fmt::Display for PatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PatEvent::Created => "created",
            PatEvent::Updated => "updated",
            PatEvent::RevokedByUser => "revoked_by_user",
            PatEvent::RevokedByAdmin => "revoked_by_admin",
            PatEvent::Used => "used",
        };
        write!(f, "{s}")
    }
}

/// The audited subject and its typed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum AuditSubject {
    OAuthApp { app_id: AppId, event: OAuthAppEvent },
    Pat { pat_id: PatId, event: PatEvent },
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    id: UniqueId,
    subject: AuditSubject,
    /// The user whose action produced the event, when known
    actor_user_id: Option<UserId>,
    timestamp: DateTime<Utc>,
    details: Value,
    /// First token of X-Forwarded-For, else the connection remote
    ip_address: Option<String>,
}

impl AuditEntry {
    /// Creates a new entry stamped with the current instant
    pub fn new(subject: AuditSubject) -> Self {
        Self {
            id: UniqueId::new(),
            subject,
            actor_user_id: None,
            timestamp: Utc::now(),
            details: Value::Null,
            ip_address: None,
        }
    }

    /// Reconstitutes an entry from stored fields
    pub fn from_parts(
        id: UniqueId,
        subject: AuditSubject,
        actor_user_id: Option<UserId>,
        timestamp: DateTime<Utc>,
        details: Value,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            id,
            subject,
            actor_user_id,
            timestamp,
            details,
            ip_address,
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn subject(&self) -> &AuditSubject {
        &self.subject
    }

    pub fn actor_user_id(&self) -> Option<UserId> {
        self.actor_user_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn details(&self) -> &Value {
        &self.details
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Sets the acting user
    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor_user_id = Some(actor);
        self
    }

    /// Attaches structured details
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Attaches the client IP
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}
