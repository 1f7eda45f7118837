//! Authentication handshake state machine.
//!
//! ```text
//! Idle --request_challenge--> ChallengeIssued --submit_signed--> Verifying --> Authenticated
//!   \                              |                                 |
//!    `------------------------> Rejected <---------------------------'
//! ```
//!
//! Every attempt is a fresh [`AuthAttempt`]. HTTP deployments are stateless
//! between round-trips, so [`Handshake::verify_signed`] resumes an attempt
//! from the submitted message itself and lets the nonce registry supply the
//! expectation.

use super::challenge::{ChallengeBuilder, ChallengeOptions, ChallengePolicy};
use super::clock::Clock;
use super::error::AuthError;
use super::message::{self, serialize_checksummed, AuthChallenge};
use super::nonce::{EntropySource, NonceError, NonceRegistry, NonceStore};
use super::signer::RelyingParty;
use super::verify::verify_signature;
use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// The verified result of a handshake, handed to the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedIdentity {
    #[serde(serialize_with = "serialize_checksummed")]
    pub address: Address,
    pub chain_id: u64,
    pub verified_at: DateTime<Utc>,
}

/// What the client sends back: the exact text it signed and the signature.
#[derive(Debug, Clone)]
pub struct SignedResponse {
    pub message: String,
    pub signature: Vec<u8>,
}

/// A challenge request as received at the boundary.
#[derive(Debug, Clone)]
pub struct ChallengeRequest {
    pub address: String,
    pub origin: String,
    pub options: ChallengeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    ChallengeIssued,
    Verifying,
    Authenticated,
    Rejected(AuthError),
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptState::Idle => "idle",
            AttemptState::ChallengeIssued => "challenge_issued",
            AttemptState::Verifying => "verifying",
            AttemptState::Authenticated => "authenticated",
            AttemptState::Rejected(_) => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Authenticated | AttemptState::Rejected(_))
    }
}

/// One authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    state: AttemptState,
    challenge: Option<AuthChallenge>,
    deadline: Option<DateTime<Utc>>,
    identity: Option<AuthenticatedIdentity>,
}

impl Default for AuthAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthAttempt {
    pub fn new() -> Self {
        Self {
            state: AttemptState::Idle,
            challenge: None,
            deadline: None,
            identity: None,
        }
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn challenge(&self) -> Option<&AuthChallenge> {
        self.challenge.as_ref()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        self.identity.as_ref()
    }

    fn address(&self) -> Option<Address> {
        self.challenge.as_ref().map(AuthChallenge::address)
    }
}

/// Orchestrates challenge issuance and verification.
#[derive(Clone)]
pub struct Handshake {
    builder: ChallengeBuilder,
    registry: NonceRegistry,
    clock: Arc<dyn Clock>,
}

impl Handshake {
    pub fn new(
        policy: ChallengePolicy,
        store: Arc<dyn NonceStore>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
        nonce_ttl: Duration,
    ) -> Self {
        let registry = NonceRegistry::new(store, clock.clone(), entropy, nonce_ttl);
        let builder = ChallengeBuilder::new(Arc::new(policy), registry.clone(), clock.clone());
        Self {
            builder,
            registry,
            clock,
        }
    }

    pub fn registry(&self) -> &NonceRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &ChallengePolicy {
        self.builder.policy()
    }

    /// `Idle -> ChallengeIssued`.
    pub async fn request_challenge(
        &self,
        attempt: &mut AuthAttempt,
        request: ChallengeRequest,
    ) -> Result<AuthChallenge, AuthError> {
        if attempt.state != AttemptState::Idle {
            return Err(AuthError::InvalidState(attempt.state.name()));
        }

        match self
            .builder
            .build(&request.address, &request.origin, request.options)
            .await
        {
            Ok((challenge, record)) => {
                tracing::info!(
                    action = "challenge_issued",
                    address = %challenge.address(),
                    chain_id = challenge.chain_id(),
                    "Challenge issued"
                );
                attempt.deadline = Some(record.expires_at);
                attempt.challenge = Some(challenge.clone());
                attempt.state = AttemptState::ChallengeIssued;
                Ok(challenge)
            }
            Err(e) => Err(self.reject(attempt, e)),
        }
    }

    /// `ChallengeIssued -> Verifying -> Authenticated`, or `Rejected`.
    ///
    /// The whole verification is bounded by the attempt deadline; running past
    /// it rejects the attempt instead of leaving it pending.
    pub async fn submit_signed(
        &self,
        attempt: &mut AuthAttempt,
        signed: SignedResponse,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        if attempt.state != AttemptState::ChallengeIssued {
            return Err(AuthError::InvalidState(attempt.state.name()));
        }

        let remaining = match attempt.deadline {
            Some(deadline) => deadline - self.clock.now(),
            None => self.registry.ttl(),
        };
        let remaining = match remaining.to_std() {
            Ok(d) if !d.is_zero() => d,
            _ => return Err(self.reject(attempt, AuthError::ChallengeExpired)),
        };

        let outcome = tokio::time::timeout(remaining, self.run_checks(attempt, &signed)).await;
        match outcome {
            Ok(Ok(identity)) => {
                tracing::info!(
                    action = "auth_success",
                    address = %identity.address,
                    chain_id = identity.chain_id,
                    "Account authenticated"
                );
                attempt.identity = Some(identity.clone());
                attempt.state = AttemptState::Authenticated;
                Ok(identity)
            }
            Ok(Err(e)) => Err(self.reject(attempt, e)),
            Err(_) => Err(self.reject(attempt, AuthError::ChallengeExpired)),
        }
    }

    /// Verify a signed message without a prior in-process attempt.
    ///
    /// The attempt is resumed from the message; its nonce must still be
    /// outstanding in the registry for the named account.
    pub async fn verify_signed(
        &self,
        signed: SignedResponse,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let mut attempt = AuthAttempt::new();
        let challenge = match message::parse(&signed.message) {
            Ok(challenge) => challenge,
            Err(e) => {
                return Err(self.reject(&mut attempt, AuthError::MalformedMessage(e.to_string())))
            }
        };

        attempt.challenge = Some(challenge);
        attempt.deadline = Some(self.clock.now() + self.registry.ttl());
        attempt.state = AttemptState::ChallengeIssued;
        self.submit_signed(&mut attempt, signed).await
    }

    /// Reject a non-terminal attempt whose deadline has passed.
    ///
    /// Returns true if the attempt was expired by this call.
    pub fn expire(&self, attempt: &mut AuthAttempt) -> bool {
        if attempt.state.is_terminal() {
            return false;
        }
        match attempt.deadline {
            Some(deadline) if deadline <= self.clock.now() => {
                self.reject(attempt, AuthError::ChallengeExpired);
                true
            }
            _ => false,
        }
    }

    async fn run_checks(
        &self,
        attempt: &mut AuthAttempt,
        signed: &SignedResponse,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let challenge = message::parse(&signed.message)
            .map_err(|e| AuthError::MalformedMessage(e.to_string()))?;

        let expected = attempt
            .challenge
            .as_ref()
            .ok_or(AuthError::InvalidState("challenge_issued"))?;
        if challenge.nonce() != expected.nonce() || challenge.address() != expected.address() {
            return Err(AuthError::NonceNotFound);
        }

        let now = self.clock.now();
        if let Some(exp) = challenge.expiration_time() {
            if exp.as_datetime() <= now {
                return Err(AuthError::ChallengeExpired);
            }
        }
        if let Some(nbf) = challenge.not_before() {
            if nbf.as_datetime() > now {
                return Err(AuthError::ChallengeNotYetValid);
            }
        }

        let policy = self.builder.policy();
        if !challenge.domain().eq_ignore_ascii_case(&policy.domain) {
            return Err(AuthError::DomainMismatch);
        }
        if let (Some(theirs), Some(ours)) = (challenge.scheme(), policy.scheme.as_deref()) {
            if !theirs.eq_ignore_ascii_case(ours) {
                return Err(AuthError::DomainMismatch);
            }
        }
        if !policy.allowed_chain_ids.contains(&challenge.chain_id()) {
            return Err(AuthError::UnsupportedChain);
        }

        let address = challenge.address();
        self.registry
            .lookup(&address, challenge.nonce())
            .await
            .map_err(|e| match e {
                NonceError::NotFound => AuthError::NonceNotFound,
                NonceError::Expired => AuthError::NonceExpired,
                NonceError::AlreadyUsed => AuthError::NonceAlreadyUsed,
                NonceError::Store(err) => AuthError::Store(err.to_string()),
            })?;

        attempt.state = AttemptState::Verifying;

        verify_signature(&signed.message, &signed.signature, &address)?;

        // The signature only counts once this attempt owns the nonce.
        self.registry
            .consume(&address, challenge.nonce())
            .await
            .map_err(|e| match e {
                NonceError::Expired => AuthError::NonceExpired,
                NonceError::Store(err) => AuthError::Store(err.to_string()),
                NonceError::NotFound | NonceError::AlreadyUsed => AuthError::NonceReuse,
            })?;

        Ok(AuthenticatedIdentity {
            address,
            chain_id: challenge.chain_id(),
            verified_at: self.clock.now(),
        })
    }

    fn reject(&self, attempt: &mut AuthAttempt, error: AuthError) -> AuthError {
        let address = attempt
            .address()
            .map(|a| a.to_checksum(None))
            .unwrap_or_default();
        tracing::warn!(
            action = "auth_rejected",
            kind = error.kind(),
            from = attempt.state.name(),
            address = %address,
            "Authentication attempt rejected"
        );
        attempt.state = AttemptState::Rejected(error.clone());
        error
    }
}

#[async_trait]
impl RelyingParty for Handshake {
    async fn challenge(&self, address: Address, origin: &str) -> Result<String, AuthError> {
        let mut attempt = AuthAttempt::new();
        let challenge = self
            .request_challenge(
                &mut attempt,
                ChallengeRequest {
                    address: address.to_checksum(None),
                    origin: origin.to_string(),
                    options: ChallengeOptions::default(),
                },
            )
            .await?;
        Ok(message::render(&challenge))
    }

    async fn verify(
        &self,
        message: &str,
        signature: &[u8],
    ) -> Result<AuthenticatedIdentity, AuthError> {
        self.verify_signed(SignedResponse {
            message: message.to_string(),
            signature: signature.to_vec(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::message::Timestamp;
    use crate::auth::nonce::{MemoryNonceStore, NonceRecord, NonceState, OsEntropy, StoreError};
    use crate::auth::signer::LocalKeySigner;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Store where every claim loses to some other claimant.
    #[derive(Default)]
    struct LosingClaimStore {
        records: Mutex<Vec<NonceRecord>>,
    }

    impl LosingClaimStore {
        fn find(&self, address: &Address, nonce: &str) -> Option<NonceRecord> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| &r.address == address && r.nonce == nonce)
                .cloned()
        }
    }

    #[async_trait]
    impl NonceStore for LosingClaimStore {
        async fn insert(
            &self,
            record: &NonceRecord,
            _retain_until: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn get(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError> {
            Ok(self
                .find(address, nonce)
                .map_or(NonceState::Missing, NonceState::Pending))
        }

        async fn claim(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError> {
            Ok(self
                .find(address, nonce)
                .map_or(NonceState::Missing, NonceState::Consumed))
        }

        async fn remove(&self, _address: &Address, _nonce: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    const ORIGIN: &str = "https://app.example.com";

    fn policy() -> ChallengePolicy {
        ChallengePolicy {
            domain: "app.example.com".to_string(),
            scheme: Some("https".to_string()),
            statement: Some("Sign in with Ethereum".to_string()),
            allowed_origins: Vec::new(),
            default_chain_id: 1,
            allowed_chain_ids: vec![1],
        }
    }

    fn setup_with(policy: ChallengePolicy) -> (Handshake, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let handshake = Handshake::new(
            policy,
            Arc::new(MemoryNonceStore::new()),
            clock.clone(),
            Arc::new(OsEntropy),
            Duration::seconds(300),
        );
        (handshake, clock)
    }

    fn setup() -> (Handshake, Arc<ManualClock>) {
        setup_with(policy())
    }

    fn request(signer: &LocalKeySigner) -> ChallengeRequest {
        ChallengeRequest {
            address: signer.address().to_checksum(None),
            origin: ORIGIN.to_string(),
            options: ChallengeOptions::default(),
        }
    }

    fn signed(signer: &LocalKeySigner, text: String) -> SignedResponse {
        let signature = signer.sign_sync(&text).unwrap();
        SignedResponse {
            message: text,
            signature,
        }
    }

    async fn issued(handshake: &Handshake, signer: &LocalKeySigner) -> (AuthAttempt, String) {
        let mut attempt = AuthAttempt::new();
        let challenge = handshake
            .request_challenge(&mut attempt, request(signer))
            .await
            .unwrap();
        (attempt, message::render(&challenge))
    }

    #[tokio::test]
    async fn test_full_state_machine() {
        let (handshake, clock) = setup();
        let signer = LocalKeySigner::random();

        let mut attempt = AuthAttempt::new();
        assert_eq!(attempt.state(), &AttemptState::Idle);

        let challenge = handshake
            .request_challenge(&mut attempt, request(&signer))
            .await
            .unwrap();
        assert_eq!(attempt.state(), &AttemptState::ChallengeIssued);
        assert_eq!(challenge.domain(), "app.example.com");
        assert_eq!(
            attempt.deadline(),
            Some(clock.now() + Duration::seconds(300))
        );

        let identity = handshake
            .submit_signed(&mut attempt, signed(&signer, message::render(&challenge)))
            .await
            .unwrap();
        assert_eq!(attempt.state(), &AttemptState::Authenticated);
        assert_eq!(identity.address, signer.address());
        assert_eq!(identity.chain_id, 1);
        assert_eq!(identity.verified_at, clock.now());
        assert_eq!(attempt.identity(), Some(&identity));
    }

    #[tokio::test]
    async fn test_builder_error_rejects_attempt() {
        let (handshake, _) = setup();
        let mut attempt = AuthAttempt::new();
        let err = handshake
            .request_challenge(
                &mut attempt,
                ChallengeRequest {
                    address: "0x1234".to_string(),
                    origin: ORIGIN.to_string(),
                    options: ChallengeOptions::default(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidAddress);
        assert_eq!(
            attempt.state(),
            &AttemptState::Rejected(AuthError::InvalidAddress)
        );

        let mut attempt = AuthAttempt::new();
        let signer = LocalKeySigner::random();
        let err = handshake
            .request_challenge(
                &mut attempt,
                ChallengeRequest {
                    origin: "https://phish.example.org".to_string(),
                    ..request(&signer)
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidOrigin);

        // No Origin at all is rejected through the same transition.
        let mut attempt = AuthAttempt::new();
        let err = handshake
            .request_challenge(
                &mut attempt,
                ChallengeRequest {
                    origin: String::new(),
                    ..request(&signer)
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidOrigin);
        assert_eq!(
            attempt.state(),
            &AttemptState::Rejected(AuthError::InvalidOrigin)
        );
    }

    #[tokio::test]
    async fn test_wrong_state_is_refused() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();

        let mut idle = AuthAttempt::new();
        let err = handshake
            .submit_signed(&mut idle, signed(&signer, "x".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidState("idle"));
        assert_eq!(idle.state(), &AttemptState::Idle);

        let (mut attempt, text) = issued(&handshake, &signer).await;
        let err = handshake
            .request_challenge(&mut attempt, request(&signer))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidState("challenge_issued"));

        handshake
            .submit_signed(&mut attempt, signed(&signer, text.clone()))
            .await
            .unwrap();
        let err = handshake
            .submit_signed(&mut attempt, signed(&signer, text))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidState("authenticated"));
        assert_eq!(attempt.state(), &AttemptState::Authenticated);
    }

    #[tokio::test]
    async fn test_signature_from_other_account() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();
        let impostor = LocalKeySigner::random();

        let (mut attempt, text) = issued(&handshake, &signer).await;
        let err = handshake
            .submit_signed(&mut attempt, signed(&impostor, text))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);
        assert_eq!(
            attempt.state(),
            &AttemptState::Rejected(AuthError::SignatureMismatch)
        );
    }

    #[tokio::test]
    async fn test_signature_mismatch_leaves_nonce_unconsumed() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();
        let impostor = LocalKeySigner::random();

        let (_attempt, text) = issued(&handshake, &signer).await;
        let err = handshake
            .verify_signed(signed(&impostor, text.clone()))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);

        // The rightful owner can still complete the challenge.
        assert!(handshake.verify_signed(signed(&signer, text)).await.is_ok());
    }

    #[tokio::test]
    async fn test_tampered_message() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();

        let (mut attempt, text) = issued(&handshake, &signer).await;
        let signature = signer.sign_sync(&text).unwrap();
        let tampered = text.replace("Sign in with Ethereum", "Sign in with Ethereum!");
        let err = handshake
            .submit_signed(
                &mut attempt,
                SignedResponse {
                    message: tampered,
                    signature,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);
    }

    #[tokio::test]
    async fn test_nonce_must_match_attempt() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();

        let (mut first, _) = issued(&handshake, &signer).await;
        let (_second, other_text) = issued(&handshake, &signer).await;
        let err = handshake
            .submit_signed(&mut first, signed(&signer, other_text))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceNotFound);
    }

    #[tokio::test]
    async fn test_malformed_message() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();
        let err = handshake
            .verify_signed(signed(&signer, "hello".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedMessage(_)));
    }

    #[tokio::test]
    async fn test_unknown_nonce() {
        let (handshake, clock) = setup();
        let signer = LocalKeySigner::random();
        let challenge = AuthChallenge::builder(
            "app.example.com",
            signer.address(),
            ORIGIN,
            1,
            "neverissued123",
            Timestamp::from_datetime(clock.now()),
        )
        .build()
        .unwrap();

        let err = handshake
            .verify_signed(signed(&signer, message::render(&challenge)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceNotFound);
    }

    #[tokio::test]
    async fn test_domain_mismatch() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();

        // Same registry, but the message is re-targeted at another domain.
        let (_attempt, text) = issued(&handshake, &signer).await;
        let foreign = text.replacen("app.example.com", "evil.example.com", 1);
        let err = handshake
            .verify_signed(signed(&signer, foreign))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::DomainMismatch);
    }

    #[tokio::test]
    async fn test_expired_challenge_with_valid_signature() {
        let (handshake, clock) = setup();
        let signer = LocalKeySigner::random();

        let mut attempt = AuthAttempt::new();
        let challenge = handshake
            .request_challenge(
                &mut attempt,
                ChallengeRequest {
                    options: ChallengeOptions {
                        expiration_time: Some(clock.now() + Duration::seconds(30)),
                        ..Default::default()
                    },
                    ..request(&signer)
                },
            )
            .await
            .unwrap();

        clock.advance(Duration::seconds(31));
        let err = handshake
            .submit_signed(&mut attempt, signed(&signer, message::render(&challenge)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::ChallengeExpired);
    }

    #[tokio::test]
    async fn test_not_yet_valid() {
        let (handshake, clock) = setup();
        let signer = LocalKeySigner::random();

        let mut attempt = AuthAttempt::new();
        let challenge = handshake
            .request_challenge(
                &mut attempt,
                ChallengeRequest {
                    options: ChallengeOptions {
                        not_before: Some(clock.now() + Duration::seconds(60)),
                        ..Default::default()
                    },
                    ..request(&signer)
                },
            )
            .await
            .unwrap();
        let text = message::render(&challenge);

        let err = handshake
            .verify_signed(signed(&signer, text.clone()))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::ChallengeNotYetValid);

        clock.advance(Duration::seconds(60));
        assert!(handshake
            .submit_signed(&mut attempt, signed(&signer, text))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_deadline_expires_attempt() {
        let (handshake, clock) = setup();
        let signer = LocalKeySigner::random();
        let (mut attempt, text) = issued(&handshake, &signer).await;

        clock.advance(Duration::seconds(299));
        assert!(!handshake.expire(&mut attempt));

        clock.advance(Duration::seconds(1));
        assert!(handshake.expire(&mut attempt));
        assert_eq!(
            attempt.state(),
            &AttemptState::Rejected(AuthError::ChallengeExpired)
        );

        let err = handshake
            .submit_signed(&mut attempt, signed(&signer, text))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidState("rejected"));
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let (handshake, _) = setup();
        let signer = LocalKeySigner::random();
        let (_attempt, text) = issued(&handshake, &signer).await;
        let response = signed(&signer, text);

        assert!(handshake.verify_signed(response.clone()).await.is_ok());
        let err = handshake.verify_signed(response).await.unwrap_err();
        assert_eq!(err, AuthError::NonceAlreadyUsed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_single_success() {
        let (handshake, _) = setup();
        let handshake = Arc::new(handshake);
        let signer = LocalKeySigner::random();
        let (_attempt, text) = issued(&handshake, &signer).await;
        let response = signed(&signer, text);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let handshake = handshake.clone();
            let response = response.clone();
            handles.push(tokio::spawn(async move {
                handshake.verify_signed(response).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AuthError::NonceAlreadyUsed) | Err(AuthError::NonceReuse) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_lost_consume_race_is_nonce_reuse() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let handshake = Handshake::new(
            policy(),
            Arc::new(LosingClaimStore::default()),
            clock,
            Arc::new(OsEntropy),
            Duration::seconds(300),
        );
        let signer = LocalKeySigner::random();
        let (mut attempt, text) = issued(&handshake, &signer).await;

        let err = handshake
            .submit_signed(&mut attempt, signed(&signer, text))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceReuse);
        assert_eq!(
            attempt.state(),
            &AttemptState::Rejected(AuthError::NonceReuse)
        );
        assert!(attempt.identity().is_none());
    }

    #[tokio::test]
    async fn test_nonce_expired_without_expiration_time() {
        let (handshake, clock) = setup();
        let signer = LocalKeySigner::random();

        let record = handshake.registry().issue(signer.address()).await.unwrap();
        let challenge = AuthChallenge::builder(
            "app.example.com",
            signer.address(),
            ORIGIN,
            1,
            record.nonce.clone(),
            Timestamp::from_datetime(record.issued_at),
        )
        .build()
        .unwrap();
        assert!(challenge.expiration_time().is_none());

        clock.advance(Duration::seconds(301));
        let err = handshake
            .verify_signed(signed(&signer, message::render(&challenge)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NonceExpired);
    }
}
