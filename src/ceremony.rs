// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verification Ceremony Controller
//!
//! Runs one challenge → user presence → assertion verification sequence
//! for a transaction intent and hands back a [`MintedToken`]. The controller
//! never touches the token store; the flow decides what to do with the token.
//!
//! ```text
//! Idle → RequestingChallenge → AwaitingUserPresence → SubmittingAssertion → Verified
//!                 └──────────────────┴────────────────────────┴──────────→ Failed
//! ```
//!
//! There is no automatic retry. The only suspension point the user controls
//! is the authenticator wait, which is bounded by the challenge timeout and
//! by an external [`CancellationToken`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{
    AssertionVerifyRequest, AssertionVerifyResponse, BackendError, ChallengeResponse,
    TransactionData, WalletBackend,
};
use crate::authenticator::{AssertionOptions, Authenticator, AuthenticatorError, UserVerification};
use crate::error::PasskeyError;
use crate::models::{MintedToken, TransactionIntent};

/// Progress of the current (or last) ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyState {
    Idle,
    RequestingChallenge,
    AwaitingUserPresence,
    SubmittingAssertion,
    Verified,
    Failed,
}

pub struct CeremonyController<A, B> {
    authenticator: Arc<A>,
    backend: Arc<B>,
    default_timeout: Duration,
    state: Mutex<CeremonyState>,
}

impl<A: Authenticator, B: WalletBackend> CeremonyController<A, B> {
    /// `default_timeout` bounds the authenticator wait when the challenge
    /// does not carry its own timeout.
    pub fn new(authenticator: Arc<A>, backend: Arc<B>, default_timeout: Duration) -> Self {
        Self {
            authenticator,
            backend,
            default_timeout,
            state: Mutex::new(CeremonyState::Idle),
        }
    }

    pub fn state(&self) -> CeremonyState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn authenticator(&self) -> &Arc<A> {
        &self.authenticator
    }

    /// Prove user presence for `intent`.
    ///
    /// `reference` is the prepared bank withdrawal reference, bound into the
    /// challenge request and the verification payload.
    pub async fn verify(
        &self,
        intent: &TransactionIntent,
        reference: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<MintedToken, PasskeyError> {
        self.transition(CeremonyState::Idle);
        let result = self.run(intent, reference, cancel).await;
        match &result {
            Ok(_) => {
                self.transition(CeremonyState::Verified);
                info!(intent = %intent.fingerprint(), "Passkey verification successful");
            }
            Err(error) if error.is_benign() => {
                self.transition(CeremonyState::Failed);
                info!(error = %error, "Passkey verification cancelled");
            }
            Err(error) => {
                self.transition(CeremonyState::Failed);
                warn!(error = %error, code = error.error_code(), "Passkey verification failed");
            }
        }
        result
    }

    async fn run(
        &self,
        intent: &TransactionIntent,
        reference: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<MintedToken, PasskeyError> {
        if !self.authenticator.is_supported() {
            return Err(PasskeyError::UnsupportedPlatform);
        }

        let transaction_data = TransactionData::for_intent(intent, reference);

        // 1. Challenge
        self.transition(CeremonyState::RequestingChallenge);
        let challenge = match self.backend.request_challenge(&transaction_data).await {
            Ok(ChallengeResponse::Issued(challenge)) => challenge,
            Ok(ChallengeResponse::Rejected(failure)) => {
                return Err(PasskeyError::ChallengeRequestFailed(failure.message));
            }
            Err(BackendError::Network(message)) => return Err(PasskeyError::NetworkError(message)),
            Err(BackendError::MissingSession) => return Err(PasskeyError::NotAuthenticated),
            Err(other) => return Err(PasskeyError::ChallengeRequestFailed(other.to_string())),
        };
        debug!(
            transaction_id = %challenge.transaction_id,
            rp_id = %challenge.relying_party_id,
            "Verification challenge received"
        );

        // 2. User presence
        self.transition(CeremonyState::AwaitingUserPresence);
        let timeout = challenge.timeout.unwrap_or(self.default_timeout);
        let options = AssertionOptions {
            challenge: challenge.challenge.clone(),
            relying_party_id: challenge.relying_party_id.clone(),
            timeout,
            allow_credentials: challenge.allow_credentials.clone(),
            user_verification: UserVerification::Required,
        };
        let wait = tokio::time::timeout(timeout, self.authenticator.get_assertion(options));
        let assertion = tokio::select! {
            _ = cancel.cancelled() => return Err(PasskeyError::cancelled()),
            outcome = wait => match outcome {
                Ok(Ok(assertion)) => assertion,
                Ok(Err(e)) => return Err(map_authenticator_error(e)),
                Err(_) => {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Authenticator wait timed out");
                    return Err(PasskeyError::cancelled());
                }
            },
        };

        // 3. Assertion verification
        self.transition(CeremonyState::SubmittingAssertion);
        let request = AssertionVerifyRequest::new(&challenge, &assertion, transaction_data);
        match self.backend.verify_assertion(&request).await {
            Ok(AssertionVerifyResponse::Verified { token }) => Ok(MintedToken {
                value: token,
                intent: intent.fingerprint(),
            }),
            Ok(AssertionVerifyResponse::Rejected(failure)) => {
                Err(PasskeyError::BackendRejectedAssertion(failure.message))
            }
            Err(BackendError::Network(message)) => Err(PasskeyError::NetworkError(message)),
            Err(BackendError::MissingSession) => Err(PasskeyError::NotAuthenticated),
            Err(other) => Err(PasskeyError::BackendRejectedAssertion(other.to_string())),
        }
    }

    fn transition(&self, next: CeremonyState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state != next {
            debug!(from = ?*state, to = ?next, "Ceremony state");
            *state = next;
        }
    }
}

fn map_authenticator_error(error: AuthenticatorError) -> PasskeyError {
    match error {
        AuthenticatorError::Cancelled | AuthenticatorError::TimedOut => PasskeyError::cancelled(),
        AuthenticatorError::NoCredential => PasskeyError::NoCredentialEnrolled,
        AuthenticatorError::NotSupported => PasskeyError::UnsupportedPlatform,
        AuthenticatorError::Platform(message) => {
            PasskeyError::CeremonyCancelled(format!("Biometric authentication failed: {message}"))
        }
    }
}
