/// Random secret generation.
///
/// Produces opaque strings used both as per-user signing secrets and as
/// refresh-token material. Output is pure entropy from the OS CSPRNG; no
/// timestamp or counter is embedded, so two outputs are independent.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::GenerationError;

/// URL-safe base64 alphabet. Exactly 64 characters, so masking a random
/// byte to 6 bits indexes it without modulo bias.
const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generate `length` characters drawn from the URL-safe alphabet.
///
/// Fails only on a zero length or when the OS entropy source fails; the
/// latter is treated as fatal for the request and never retried.
pub fn new_secret(length: usize) -> Result<String, GenerationError> {
    if length == 0 {
        return Err(GenerationError::InvalidLength(length));
    }

    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| GenerationError::Entropy(e.to_string()))?;

    Ok(bytes
        .iter()
        .map(|b| ALPHABET[(b & 0x3f) as usize] as char)
        .collect())
}
