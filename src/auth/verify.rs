//! secp256k1 personal-message signature verification.

use super::error::AuthError;
use alloy_primitives::{hex, Address, Signature};

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// The account that produced a verified signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredIdentity {
    pub address: Address,
}

/// Decode a hex signature as submitted by wallets (`0x`-prefixed or bare).
pub fn decode_signature_hex(signature_hex: &str) -> Result<Vec<u8>, AuthError> {
    hex::decode(signature_hex).map_err(|_| AuthError::MalformedSignature)
}

/// Verify that `signature` over `message` was produced by `claimed`.
///
/// The message is hashed with the EIP-191 personal-message prefix, the signer
/// is recovered from the signature, and the recovered address is compared to
/// the claim byte-for-byte (so letter case of the claim never matters).
///
/// # Returns
/// * `Ok(RecoveredIdentity)` if the recovered signer is `claimed`
/// * `Err(MalformedSignature)` if the bytes are not a 65-byte signature with
///   a valid recovery byte
/// * `Err(RecoveryFailed)` if no public key can be recovered
/// * `Err(SignatureMismatch)` if a different account signed
pub fn verify_signature(
    message: &str,
    signature: &[u8],
    claimed: &Address,
) -> Result<RecoveredIdentity, AuthError> {
    if signature.len() != SIGNATURE_LEN || !matches!(signature[64], 0 | 1 | 27 | 28) {
        return Err(AuthError::MalformedSignature);
    }

    let signature = Signature::from_raw(signature).map_err(|_| AuthError::MalformedSignature)?;

    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|_| AuthError::RecoveryFailed)?;

    if recovered != *claimed {
        return Err(AuthError::SignatureMismatch);
    }

    Ok(RecoveredIdentity { address: recovered })
}
