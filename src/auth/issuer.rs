/// Token issuance.
///
/// Produces the full credential tuple for a user in one shot: a signed
/// access token, a fresh opaque refresh token, and the refresh token's
/// storage hash. Any step failing aborts the whole call; no partial tuple
/// is ever returned.

use crate::auth::{codec, hasher, secret};
use crate::error::AppError;

/// The tuple produced by a single issuance.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    /// Signed access token, ready for client delivery.
    pub access_token: String,
    /// Raw refresh token. Handed to the caller exactly once for transport
    /// encoding; never persisted in this form.
    pub refresh_token: String,
    /// bcrypt digest of the refresh token, the only form that is stored.
    pub refresh_token_hash: String,
}

/// Issue a fresh credential tuple for `email` originating from `ip`,
/// signed under `signing_secret`. `refresh_token_length` is independent of
/// the signing-secret length.
pub fn issue(
    ip: &str,
    email: &str,
    signing_secret: &str,
    refresh_token_length: usize,
) -> Result<IssuedCredentials, AppError> {
    let refresh_token = secret::new_secret(refresh_token_length)?;
    let access_token = codec::sign(ip, email, signing_secret)?;
    let refresh_token_hash = hasher::hash_credential(&refresh_token)?;

    Ok(IssuedCredentials {
        access_token,
        refresh_token,
        refresh_token_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{codec, hasher};

    #[test]
    fn issues_a_consistent_tuple() {
        let issued = issue("10.0.0.1", "user@example.com", "per-user-secret", 48).unwrap();

        let claims = codec::verify(&issued.access_token, "per-user-secret").unwrap();
        assert_eq!(claims.ip, "10.0.0.1");
        assert_eq!(claims.email, "user@example.com");

        assert_eq!(issued.refresh_token.len(), 48);
        assert!(hasher::verify_credential(
            &issued.refresh_token,
            &issued.refresh_token_hash
        ));
    }

    #[test]
    fn empty_secret_aborts_without_partial_tuple() {
        assert!(issue("10.0.0.1", "user@example.com", "", 48).is_err());
    }

    #[test]
    fn zero_refresh_length_aborts() {
        assert!(issue("10.0.0.1", "user@example.com", "per-user-secret", 0).is_err());
    }

    #[test]
    fn consecutive_issues_differ() {
        let a = issue("10.0.0.1", "user@example.com", "per-user-secret", 48).unwrap();
        let b = issue("10.0.0.1", "user@example.com", "per-user-secret", 48).unwrap();

        assert_ne!(a.refresh_token, b.refresh_token);
        assert_ne!(a.refresh_token_hash, b.refresh_token_hash);
    }
}
