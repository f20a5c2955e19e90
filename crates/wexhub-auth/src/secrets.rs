//! Secret generation and hashing
//!
//! Random token material comes from the OS RNG. Long-lived secrets
//! (client secrets, PAT secrets) are stored as PBKDF2-SHA256 with a
//! per-secret 16-byte salt, 100,000 iterations, 32-byte output, and are
//! verified by re-deriving and constant-time comparing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use wexhub_core::domain::pat::{PAT_PREFIX_BYTES, PAT_SECRET_BYTES, PAT_WIRE_PREFIX};

/// PBKDF2 iteration count
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Derived hash length in bytes
pub const HASH_LEN: usize = 32;

/// Identifier prefix on stored hashes, keeping the format self-describing
const HASH_SCHEME: &str = "pbkdf2-sha256";

/// Entropy of authorization codes and refresh-token secrets
const TOKEN_SECRET_BYTES: usize = 32;

/// Wire prefix of refresh tokens
pub const REFRESH_TOKEN_PREFIX: &str = "octr_";

/// Fills and returns `n` bytes from the OS RNG
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// URL-safe base64 without padding
pub fn encode_b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derives the PBKDF2 hash of `secret` under `salt`
fn derive(secret: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, PBKDF2_ITERATIONS, &mut out);
    out
}

/// Hashes a secret for storage
///
/// Format: `pbkdf2-sha256$<iterations>$<b64 salt>$<b64 hash>`.
pub fn hash_secret(secret: &str) -> String {
    let salt = random_bytes(SALT_LEN);
    let hash = derive(secret, &salt);
    format!(
        "{HASH_SCHEME}${PBKDF2_ITERATIONS}${}${}",
        encode_b64url(&salt),
        encode_b64url(&hash)
    )
}

/// Verifies a presented secret against a stored hash string
///
/// Returns false on any parse failure; verification never reveals which
/// part mismatched.
pub fn verify_secret(secret: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (scheme, iterations, salt, hash) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(scheme), Some(iters), Some(salt), Some(hash), None) => {
            (scheme, iters, salt, hash)
        }
        _ => return false,
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (
        URL_SAFE_NO_PAD.decode(salt),
        URL_SAFE_NO_PAD.decode(hash),
    ) else {
        return false;
    };

    let mut derived = vec![0u8; expected.len().max(1)];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), &salt, iterations, &mut derived);
    derived.ct_eq(expected.as_slice()).into()
}

/// A freshly generated authorization code (≥128-bit entropy)
pub fn new_authorization_code() -> String {
    encode_b64url(&random_bytes(TOKEN_SECRET_BYTES))
}

/// A freshly generated refresh token for the wire: `octr_<secret>`
pub fn new_refresh_token() -> String {
    format!(
        "{REFRESH_TOKEN_PREFIX}{}",
        encode_b64url(&random_bytes(TOKEN_SECRET_BYTES))
    )
}

/// A freshly generated public client identifier
pub fn new_client_id() -> String {
    format!("wexc_{}", encode_b64url(&random_bytes(12)))
}

/// A freshly generated confidential client secret
pub fn new_client_secret() -> String {
    format!("wexcs_{}", encode_b64url(&random_bytes(TOKEN_SECRET_BYTES)))
}

/// A freshly generated PAT: the wire token plus its stored parts
pub struct GeneratedPat {
    /// The full `ocpat_…` token, shown to the user exactly once
    pub wire_token: String,
    /// Clear lookup prefix (base64url of 8 random bytes)
    pub prefix: String,
    /// PBKDF2 hash of the secret part
    pub secret_hash: String,
}

/// Generates PAT material
pub fn new_pat() -> GeneratedPat {
    let prefix = encode_b64url(&random_bytes(PAT_PREFIX_BYTES));
    let secret = encode_b64url(&random_bytes(PAT_SECRET_BYTES));
    GeneratedPat {
        wire_token: format!("{PAT_WIRE_PREFIX}{prefix}{secret}"),
        secret_hash: hash_secret(&secret),
        prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wexhub_core::domain::pat::split_pat;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let stored = hash_secret("correct horse battery staple");
        assert!(verify_secret("correct horse battery staple", &stored));
        assert!(!verify_secret("incorrect horse", &stored));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_secret("same-secret");
        let b = hash_secret("same-secret");
        assert_ne!(a, b);
        assert!(verify_secret("same-secret", &a));
        assert!(verify_secret("same-secret", &b));
    }

    #[test]
    fn test_verify_rejects_malformed_stored_value() {
        assert!(!verify_secret("secret", ""));
        assert!(!verify_secret("secret", "not-a-hash"));
        assert!(!verify_secret("secret", "md5$1$abc$def"));
        assert!(!verify_secret("secret", "pbkdf2-sha256$x$salt$hash"));
    }

    #[test]
    fn test_stored_format_fields() {
        let stored = hash_secret("s");
        let parts: Vec<&str> = stored.split('$').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "pbkdf2-sha256");
        assert_eq!(parts[1], "100000");
    }

    #[test]
    fn test_authorization_code_entropy_and_uniqueness() {
        let code = new_authorization_code();
        // 32 bytes -> 43 base64url chars, comfortably above 128 bits
        assert_eq!(code.len(), 43);
        assert_ne!(new_authorization_code(), new_authorization_code());
    }

    #[test]
    fn test_refresh_token_prefix() {
        assert!(new_refresh_token().starts_with("octr_"));
    }

    #[test]
    fn test_generated_pat_splits_back() {
        let pat = new_pat();
        let (prefix, secret) = split_pat(&pat.wire_token).unwrap();
        assert_eq!(prefix, pat.prefix);
        assert!(verify_secret(secret, &pat.secret_hash));
    }
}
