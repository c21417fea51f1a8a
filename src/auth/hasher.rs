/// Credential hashing and verification.
///
/// One primitive for both login passwords and refresh-token material:
/// bcrypt with its built-in per-hash salt and adjustable cost. The two uses
/// are never interchanged; only the inputs differ.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::HashError;

/// Hash a plaintext credential for at-rest storage.
///
/// # Errors
/// `HashError::EmptyInput` for an empty plaintext; `HashError::Backend` if
/// bcrypt itself fails.
pub fn hash_credential(plaintext: &str) -> Result<String, HashError> {
    if plaintext.is_empty() {
        return Err(HashError::EmptyInput);
    }

    hash(plaintext, DEFAULT_COST).map_err(|e| HashError::Backend(e.to_string()))
}

/// Verify a candidate against a stored digest.
///
/// Returns false on mismatch, on an empty candidate, and on a malformed
/// digest; never errors. bcrypt's comparison is constant-time.
pub fn verify_credential(candidate: &str, digest: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }

    verify(candidate, digest).unwrap_or(false)
}
