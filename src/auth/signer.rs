//! Client side of the handshake.
//!
//! The wallet is an external, user-controlled agent. It is modelled as the
//! [`MessageSigner`] capability and never trusted by the verifying side: the
//! server only ever sees the signature bytes it returns.

use super::error::AuthError;
use super::handshake::AuthenticatedIdentity;
use super::message;
use alloy_primitives::{eip191_hash_message, hex, Address};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use url::Url;
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Failed(String),
}

/// Something that can sign challenge text on behalf of an account.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign `message` as an EIP-191 personal message, returning `r || s || v`.
    async fn sign(&self, message: &str) -> Result<Vec<u8>, SignerError>;
}

/// In-process secp256k1 key. For tests and local tooling only.
pub struct LocalKeySigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("key", &"[REDACTED]")
            .field("address", &self.address)
            .finish()
    }
}

impl LocalKeySigner {
    /// Generate a fresh key from the thread CSPRNG.
    pub fn random() -> Self {
        loop {
            let mut seed = Zeroizing::new([0u8; 32]);
            rand::fill(&mut *seed);
            // Rejects the (negligible) zero and out-of-range scalars.
            if let Ok(signer) = Self::from_bytes(seed.as_slice()) {
                return signer;
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let address = Address::from_private_key(&key);
        Ok(Self { key, address })
    }

    /// Parse a 32-byte key from hex, with or without `0x`.
    pub fn from_hex(key_hex: &str) -> Result<Self, SignerError> {
        let bytes = Zeroizing::new(
            hex::decode(key_hex.trim()).map_err(|e| SignerError::InvalidKey(e.to_string()))?,
        );
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode_prefixed(self.key.to_bytes()))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign without going through the async capability.
    ///
    /// The recovery byte is emitted as 27/28, matching what wallets return for
    /// `personal_sign`.
    pub fn sign_sync(&self, message: &str) -> Result<Vec<u8>, SignerError> {
        let hash = eip191_hash_message(message);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| SignerError::Failed(e.to_string()))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(27 + recovery_id.to_byte());
        Ok(bytes)
    }
}

#[async_trait]
impl MessageSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, message: &str) -> Result<Vec<u8>, SignerError> {
        self.sign_sync(message)
    }
}

/// The server endpoints as seen by a client.
#[async_trait]
pub trait RelyingParty: Send + Sync {
    /// Request a challenge for `address`, returning the text to sign.
    async fn challenge(&self, address: Address, origin: &str) -> Result<String, AuthError>;

    /// Submit a signed challenge.
    async fn verify(
        &self,
        message: &str,
        signature: &[u8],
    ) -> Result<AuthenticatedIdentity, AuthError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("Refusing to sign challenge: {0}")]
    UnexpectedChallenge(String),
}

/// Run the full handshake from the client side.
///
/// The challenge is inspected before it is handed to the signer: it must name
/// the signer's account and must be addressed to the origin the client is on.
pub async fn sign_in(
    relying_party: &dyn RelyingParty,
    signer: &dyn MessageSigner,
    origin: &str,
) -> Result<AuthenticatedIdentity, SignInError> {
    let address = signer.address();
    let text = relying_party.challenge(address, origin).await?;

    let challenge = message::parse(&text)
        .map_err(|e| SignInError::UnexpectedChallenge(e.to_string()))?;
    if challenge.address() != address {
        return Err(SignInError::UnexpectedChallenge(
            "challenge names a different account".to_string(),
        ));
    }
    let origin_url =
        Url::parse(origin).map_err(|e| SignInError::UnexpectedChallenge(e.to_string()))?;
    let uri_url = Url::parse(challenge.uri())
        .map_err(|e| SignInError::UnexpectedChallenge(e.to_string()))?;
    if uri_url.origin() != origin_url.origin() {
        return Err(SignInError::UnexpectedChallenge(
            "challenge uri is not on this origin".to_string(),
        ));
    }

    let signature = signer.sign(&text).await?;
    Ok(relying_party.verify(&text, &signature).await?)
}
