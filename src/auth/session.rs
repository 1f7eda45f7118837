//! Session token generation.

use base64::{Engine as _, engine::general_purpose};
use rand::Rng;

/// Generate a cryptographically random session token.
///
/// Returns a base64-encoded string (44 characters) from 32 random bytes.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}
