/// Credential core: secret generation, credential hashing, the access-token
/// codec, token issuance, and the issuance/refresh protocol itself.

pub mod codec;
pub mod hasher;
pub mod issuer;
pub mod protocol;
pub mod secret;

pub use codec::AccessClaims;
pub use issuer::IssuedCredentials;
pub use protocol::{AuthService, TokenPair};
