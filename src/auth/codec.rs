/// Access-token codec.
///
/// Signs and verifies the compact, stateless access token carrying exactly
/// two claims, `ip` and `email`, under a per-user HS512 secret. No expiry
/// claim is embedded; the blast radius of a leaked token is bounded by
/// secret rotation instead.
///
/// The codec exposes a two-phase read on purpose: the verifying secret is
/// per-user and stored server-side keyed by email, so the email has to be
/// read from the unverified token (`peek_claims`) before the real secret can
/// be fetched and `verify` performed. Callers must never stop at the peek.

use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// Claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Network origin at issuance time.
    pub ip: String,
    /// The user's natural key.
    pub email: String,
}

/// Sign an access token binding `ip` and `email` under `secret`.
pub fn sign(ip: &str, email: &str, secret: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::EmptySecret);
    }

    let claims = AccessClaims {
        ip: ip.to_string(),
        email: email.to_string(),
    };

    encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| TokenError::Malformed(e.to_string()))
}

/// Extract claims without verifying the signature.
///
/// Only used to discover which user's secret to fetch; the claims are
/// untrusted until `verify` has run with that secret.
pub fn peek_claims(token: &str) -> Result<AccessClaims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Malformed(
            "expected three dot-separated segments".to_string(),
        ));
    }

    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|e| TokenError::Malformed(e.to_string()))?;

    let value: serde_json::Value =
        serde_json::from_slice(&decoded).map_err(|e| TokenError::Malformed(e.to_string()))?;

    claims_from_value(&value)
}

/// Fully verify signature and algorithm, then extract claims.
///
/// Any token whose header declares a non-HS512 algorithm is rejected with
/// `AlgorithmMismatch` regardless of whether its signature would verify
/// under some other scheme.
pub fn verify(token: &str, secret: &str) -> Result<AccessClaims, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::EmptySecret);
    }

    let mut validation = Validation::new(Algorithm::HS512);
    // No exp claim is embedded; revocation happens via secret rotation.
    validation.validate_exp = false;
    validation.required_spec_claims = std::collections::HashSet::new();

    let data = decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::AlgorithmMismatch
        }
        _ => TokenError::Malformed(e.to_string()),
    })?;

    claims_from_value(&data.claims)
}

/// Shared claim extraction. A claim that is absent, not a string, or an
/// empty string is treated the same way.
fn claims_from_value(value: &serde_json::Value) -> Result<AccessClaims, TokenError> {
    let ip = match value.get("ip").and_then(|v| v.as_str()) {
        Some(ip) if !ip.is_empty() => ip.to_string(),
        _ => return Err(TokenError::MissingClaim("ip")),
    };

    let email = match value.get("email").and_then(|v| v.as_str()) {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => return Err(TokenError::MissingClaim("email")),
    };

    Ok(AccessClaims { ip, email })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-with-plenty-of-length";

    #[test]
    fn sign_then_verify_round_trips() {
        let token = sign("10.0.0.1", "user@example.com", SECRET).unwrap();
        let claims = verify(&token, SECRET).unwrap();

        assert_eq!(claims.ip, "10.0.0.1");
        assert_eq!(claims.email, "user@example.com");
    }

    #[test]
    fn peek_extracts_claims_without_secret() {
        let token = sign("10.0.0.1", "user@example.com", SECRET).unwrap();
        let claims = peek_claims(&token).unwrap();

        assert_eq!(claims.email, "user@example.com");
    }

    #[test]
    fn verify_with_wrong_secret_fails_on_signature() {
        let token = sign("10.0.0.1", "user@example.com", SECRET).unwrap();

        assert_eq!(
            verify(&token, "a-different-secret"),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn empty_secret_is_rejected_at_signing() {
        assert_eq!(
            sign("10.0.0.1", "user@example.com", ""),
            Err(TokenError::EmptySecret)
        );
    }

    #[test]
    fn tampered_token_fails_verification() {
        let token = sign("10.0.0.1", "user@example.com", SECRET).unwrap();
        let tampered = format!("{}x", token);

        assert!(verify(&tampered, SECRET).is_err());
    }

    #[test]
    fn garbage_is_malformed_for_peek() {
        assert!(matches!(
            peek_claims("not-a-token"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(peek_claims(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn missing_claims_are_reported() {
        // Token with an email claim but no ip claim.
        let claims = serde_json::json!({ "email": "user@example.com" });
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(peek_claims(&token), Err(TokenError::MissingClaim("ip")));
        assert_eq!(verify(&token, SECRET), Err(TokenError::MissingClaim("ip")));
    }

    #[test]
    fn non_string_claims_are_treated_as_missing() {
        let claims = serde_json::json!({ "ip": 42, "email": "user@example.com" });
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(peek_claims(&token), Err(TokenError::MissingClaim("ip")));
    }

    #[test]
    fn foreign_algorithm_peeks_but_does_not_verify() {
        let claims = AccessClaims {
            ip: "10.0.0.1".to_string(),
            email: "user@example.com".to_string(),
        };
        let hs256_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        // Unverified peek still reads the claims.
        assert_eq!(peek_claims(&hs256_token).unwrap(), claims);
        // Full verification refuses the algorithm outright.
        assert_eq!(
            verify(&hs256_token, SECRET),
            Err(TokenError::AlgorithmMismatch)
        );
    }
}
