//! WexHub Auth - OAuth authorization server and PAT service
//!
//! Implements the credential-issuing side of the system:
//! - The OAuth 2.1 authorization-code flow with mandatory PKCE for public
//!   clients, refresh-token rotation with family-wide reuse revocation,
//!   and confidential-client secret verification
//! - Personal Access Tokens: issue, validate, update, revoke
//! - JWT access-token minting and verification
//! - Bearer authentication producing the [`Principal`] the scope gate
//!   consumes
//!
//! Secret material never persists in the clear: client secrets and PAT
//! secrets are PBKDF2-SHA256 hashed with per-secret salts, refresh tokens
//! are stored as SHA-256 digests.
//!
//! [`Principal`]: wexhub_core::domain::scope::Principal

pub mod apps;
pub mod authenticate;
pub mod jwt;
pub mod oauth;
pub mod pat;
pub mod secrets;

pub use authenticate::BearerAuthenticator;
pub use jwt::{AccessTokenClaims, TokenIssuer};
pub use oauth::{AuthorizeRejection, AuthorizeRequest, OAuthService, TokenGrant, TokenRequest};
pub use pat::PatService;
