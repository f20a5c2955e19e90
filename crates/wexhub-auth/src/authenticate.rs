//! Bearer authentication
//!
//! Turns an `Authorization: Bearer …` credential into a [`Principal`].
//! Two credential shapes exist: `ocpat_…` personal access tokens and
//! signed JWT access tokens; everything else is rejected uniformly.

use std::sync::Arc;

use tracing::debug;

use wexhub_core::domain::errors::{DomainError, OAuthErrorCode};
use wexhub_core::domain::identity::User;
use wexhub_core::domain::newtypes::Email;
use wexhub_core::domain::pat::PAT_WIRE_PREFIX;
use wexhub_core::domain::scope::Principal;
use wexhub_core::ports::IdentityRepository;

use crate::jwt::TokenIssuer;
use crate::pat::PatService;

fn transient(e: anyhow::Error) -> DomainError {
    DomainError::Transient(e.to_string())
}

/// Authenticates bearer credentials into principals
pub struct BearerAuthenticator {
    issuer: Arc<TokenIssuer>,
    pats: Arc<PatService>,
    identity: Arc<dyn IdentityRepository>,
}

impl BearerAuthenticator {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        pats: Arc<PatService>,
        identity: Arc<dyn IdentityRepository>,
    ) -> Self {
        Self {
            issuer,
            pats,
            identity,
        }
    }

    /// Authenticates a bearer credential
    pub async fn authenticate(
        &self,
        bearer: &str,
        client_ip: Option<&str>,
    ) -> Result<Principal, DomainError> {
        if bearer.starts_with(PAT_WIRE_PREFIX) {
            return self.pats.authenticate(bearer, client_ip).await;
        }

        let claims = self.issuer.verify(bearer)?;
        let user = self
            .identity
            .get_user_by_subject(&claims.sub)
            .await
            .map_err(transient)?
            .ok_or_else(|| {
                DomainError::oauth(OAuthErrorCode::InvalidRequest, "Unknown token subject")
            })?;

        debug!(user_id = %user.id(), client_id = %claims.client_id, "Bearer authenticated");
        Ok(Principal {
            user_id: user.id(),
            subject: claims.sub.clone(),
            workspace: claims.workspace()?,
            scopes: claims.scopes()?,
        })
    }

    /// Resolves a user by external subject, creating the row on first
    /// sight and stamping the login instant
    ///
    /// This is the session-establishment path: the upstream identity
    /// layer hands over a verified subject, and WexHub keeps its own user
    /// record for it.
    pub async fn get_or_create_user(
        &self,
        subject: &str,
        display_name: &str,
        email: Option<&str>,
    ) -> Result<User, DomainError> {
        if subject.trim().is_empty() {
            return Err(DomainError::Validation(
                "subject must not be empty".to_string(),
            ));
        }
        let existing = self
            .identity
            .get_user_by_subject(subject)
            .await
            .map_err(transient)?;
        let mut user = match existing {
            Some(user) => user,
            None => {
                let mut user = User::new(subject, display_name);
                if let Some(raw) = email {
                    user.set_email(Email::new(raw)?);
                }
                self.identity.create_user(&user).await.map_err(transient)?;
                user
            }
        };
        user.record_login();
        self.identity.update_user(&user).await.map_err(transient)?;
        Ok(user)
    }
}
