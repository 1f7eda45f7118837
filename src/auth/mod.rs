//! Sign-in with Ethereum: challenge issuance, signature verification and the
//! handshake state machine tying them together.

pub mod challenge;
pub mod clock;
pub mod error;
pub mod handshake;
pub mod message;
pub mod middleware;
pub mod nonce;
pub mod session;
pub mod signer;
pub mod verify;

pub use challenge::{ChallengeBuilder, ChallengeOptions, ChallengePolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use handshake::{
    AttemptState, AuthAttempt, AuthenticatedIdentity, ChallengeRequest, Handshake, SignedResponse,
};
pub use message::{AuthChallenge, MessageError, Timestamp};
pub use middleware::{check_rate_limit, AppState, AuthSession};
pub use nonce::{EntropySource, MemoryNonceStore, NonceRegistry, NonceStore, OsEntropy};
pub use session::generate_session_token;
pub use signer::{sign_in, LocalKeySigner, MessageSigner, RelyingParty};
pub use verify::verify_signature;
