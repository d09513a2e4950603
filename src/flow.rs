// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Flow State Machine
//!
//! Drives one user-visible transaction from review to settlement:
//!
//! ```text
//! Review ──complete()──▶ Verifying ──▶ Submitting ──▶ Success
//!   ▲                        │              │
//!   └────── error ───────────┴──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Nothing is submitted without a valid token minted for the current intent.
//! - A token is used for at most one submission; it is cleared whatever the
//!   submission outcome.
//! - While a `complete()` or `verify()` call is in flight further calls are
//!   no-ops, so a double tap never issues a second backend request.
//! - Every failure lands back in `Review` with a typed error; nothing panics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{
    BackendError, SubmissionResponse, TransactionSubmission, WalletBackend, WithdrawalResponse,
};
use crate::authenticator::Authenticator;
use crate::ceremony::CeremonyController;
use crate::config::PasskeyConfig;
use crate::error::PasskeyError;
use crate::models::{
    SettlementReceipt, TransactionIntent, TransactionKind, TransactionOutcome, VerificationToken,
};
use crate::store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Review,
    Verifying,
    Submitting,
    Success,
}

/// Result of a [`TransactionFlow::complete`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Another call is still running; nothing was done.
    AlreadyInFlight,
    /// The transaction already settled; nothing was done.
    AlreadySettled,
    Finished(TransactionOutcome),
}

/// Result of a [`TransactionFlow::verify`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    AlreadyInFlight,
    AlreadySettled,
    Verified,
    Failed(PasskeyError),
}

/// Refusals of [`TransactionFlow::set_intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("A verification or submission is in progress")]
    InFlight,

    #[error("The transaction has already been submitted")]
    Settled,
}

/// Timing knobs of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSettings {
    pub token_lifetime: Duration,
    /// Warn when attaching a token with less than this left.
    pub expiry_warning: Duration,
    /// Tighter warning window for bank confirmations.
    pub submit_warning: Duration,
}

impl FlowSettings {
    pub fn from_config(config: &PasskeyConfig) -> Self {
        Self {
            token_lifetime: config.token_lifetime,
            expiry_warning: config.expiry_warning,
            submit_warning: config.submit_warning,
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self::from_config(&PasskeyConfig::default())
    }
}

struct FlowInner {
    intent: TransactionIntent,
    state: FlowState,
    last_error: Option<PasskeyError>,
    outcome: Option<TransactionOutcome>,
    /// Reference from `initiate_withdrawal`; bank intents only.
    prepared_reference: Option<String>,
}

pub struct TransactionFlow<A, B> {
    ceremony: Arc<CeremonyController<A, B>>,
    tokens: Arc<TokenStore>,
    settings: FlowSettings,
    inner: Mutex<FlowInner>,
    busy: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

/// Holds the re-entrancy flag for one call. If the call's future is dropped
/// before finishing, the flow goes back to `Review`, and a token that may
/// already have been sent is discarded.
struct InFlight<'a, A, B> {
    flow: &'a TransactionFlow<A, B>,
    submitting: bool,
    finished: bool,
}

impl<A, B> Drop for InFlight<'_, A, B> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(submitting = self.submitting, "Transaction flow abandoned mid-flight");
            if self.submitting {
                self.flow.tokens.clear();
            }
            self.flow.lock_inner().state = FlowState::Review;
        }
        self.flow.busy.store(false, Ordering::Release);
    }
}

impl<A, B> TransactionFlow<A, B> {
    fn lock_inner(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self) -> Option<InFlight<'_, A, B>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(InFlight {
            flow: self,
            submitting: false,
            finished: false,
        })
    }

    fn transition(&self, next: FlowState) {
        let mut inner = self.lock_inner();
        if inner.state != next {
            info!(from = ?inner.state, to = ?next, "Transaction flow state");
            inner.state = next;
        }
    }

    pub fn state(&self) -> FlowState {
        self.lock_inner().state
    }

    pub fn intent(&self) -> TransactionIntent {
        self.lock_inner().intent.clone()
    }

    pub fn last_error(&self) -> Option<PasskeyError> {
        self.lock_inner().last_error.clone()
    }

    pub fn last_outcome(&self) -> Option<TransactionOutcome> {
        self.lock_inner().outcome.clone()
    }

    pub fn prepared_reference(&self) -> Option<String> {
        self.lock_inner().prepared_reference.clone()
    }

    /// Whether a `complete()` or `verify()` call is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether a valid token for the current intent is stored.
    pub fn is_verified(&self) -> bool {
        let fingerprint = self.lock_inner().intent.fingerprint();
        self.tokens.get_for(&fingerprint).is_some()
    }

    /// Abort an in-progress authenticator wait. The ceremony then fails as
    /// cancelled. No effect outside a ceremony.
    pub fn cancel_verification(&self) {
        let cancel = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
        cancel.cancel();
    }

    /// Replace the intent under review.
    ///
    /// A changed intent invalidates any stored token and any prepared bank
    /// withdrawal.
    pub fn set_intent(&self, intent: TransactionIntent) -> Result<(), FlowError> {
        let mut guard = self.begin().ok_or(FlowError::InFlight)?;
        guard.finished = true;

        let mut inner = self.lock_inner();
        if inner.state == FlowState::Success {
            return Err(FlowError::Settled);
        }
        if inner.intent.fingerprint() != intent.fingerprint() {
            debug!(intent = %intent.fingerprint(), "Intent changed, discarding verification");
            self.tokens.clear();
            inner.prepared_reference = None;
        }
        inner.intent = intent;
        inner.last_error = None;
        Ok(())
    }
}

impl<A: Authenticator, B: WalletBackend> TransactionFlow<A, B> {
    pub fn new(
        intent: TransactionIntent,
        ceremony: Arc<CeremonyController<A, B>>,
        tokens: Arc<TokenStore>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            ceremony,
            tokens,
            settings,
            inner: Mutex::new(FlowInner {
                intent,
                state: FlowState::Review,
                last_error: None,
                outcome: None,
                prepared_reference: None,
            }),
            busy: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Verify if needed, then submit the transaction.
    pub async fn complete(&self) -> Completion {
        let Some(mut guard) = self.begin() else {
            debug!("complete() ignored, flow already in flight");
            return Completion::AlreadyInFlight;
        };
        if self.state() == FlowState::Success {
            guard.finished = true;
            return Completion::AlreadySettled;
        }

        let result = self.run_complete(&mut guard).await;
        guard.finished = true;
        Completion::Finished(self.settle(result))
    }

    /// Run the ceremony for the current intent without submitting.
    pub async fn verify(&self) -> Verification {
        let Some(mut guard) = self.begin() else {
            return Verification::AlreadyInFlight;
        };
        if self.state() == FlowState::Success {
            guard.finished = true;
            return Verification::AlreadySettled;
        }

        let result = self.ensure_token(&self.intent()).await;
        guard.finished = true;

        let mut inner = self.lock_inner();
        inner.state = FlowState::Review;
        match result {
            Ok(_) => {
                inner.last_error = None;
                Verification::Verified
            }
            Err(error) => {
                inner.last_error = Some(error.clone());
                Verification::Failed(error)
            }
        }
    }

    async fn run_complete(
        &self,
        guard: &mut InFlight<'_, A, B>,
    ) -> Result<SettlementReceipt, PasskeyError> {
        let intent = self.intent();
        self.ensure_token(&intent).await?;

        self.transition(FlowState::Submitting);
        guard.submitting = true;

        let fingerprint = intent.fingerprint();
        let Some(token) = self.tokens.get_for(&fingerprint) else {
            return Err(PasskeyError::VerificationExpired);
        };
        self.warn_if_expiring(&intent);

        let reference = self.prepared_reference();
        let Some(submission) = TransactionSubmission::for_intent(&intent, reference.as_deref())
        else {
            // Bank intent whose reference vanished; the token is bound to it.
            self.tokens.clear();
            return Err(PasskeyError::VerificationExpired);
        };

        self.submit(&submission, &token).await
    }

    /// Make sure a valid token for `intent` is stored, running the ceremony
    /// when it is not.
    async fn ensure_token(&self, intent: &TransactionIntent) -> Result<(), PasskeyError> {
        if !self.ceremony.backend().has_session() {
            return Err(PasskeyError::NotAuthenticated);
        }

        let fingerprint = intent.fingerprint();
        let is_bank = intent.kind() == TransactionKind::WithdrawToBank;
        let needs_reference = is_bank && self.prepared_reference().is_none();
        if self.tokens.get_for(&fingerprint).is_some() {
            if !needs_reference {
                debug!(intent = %fingerprint, "Reusing stored passkey token");
                return Ok(());
            }
            // Minted for a reference this flow never saw; a new one is coming.
            debug!(intent = %fingerprint, "Discarding token without a prepared reference");
            self.tokens.clear();
        }

        let cancel = {
            let mut slot = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
            *slot = CancellationToken::new();
            slot.clone()
        };
        self.transition(FlowState::Verifying);

        let reference = if is_bank {
            let prepared = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PasskeyError::cancelled()),
                prepared = self.prepare_withdrawal(intent) => prepared,
            };
            Some(prepared?)
        } else {
            None
        };

        match self
            .ceremony
            .verify(intent, reference.as_deref(), &cancel)
            .await
        {
            Ok(minted) => {
                self.tokens
                    .set(minted.value, minted.intent, self.settings.token_lifetime);
                Ok(())
            }
            Err(error) => {
                if error.clears_token() {
                    self.tokens.clear();
                }
                Err(error)
            }
        }
    }

    async fn prepare_withdrawal(&self, intent: &TransactionIntent) -> Result<String, PasskeyError> {
        if let Some(reference) = self.prepared_reference() {
            return Ok(reference);
        }

        match self.ceremony.backend().initiate_withdrawal(intent).await {
            Ok(WithdrawalResponse::Initiated {
                transaction_reference,
                status,
            }) => {
                debug!(
                    transaction_reference = %transaction_reference,
                    status = status.as_deref().unwrap_or("unknown"),
                    "Withdrawal prepared"
                );
                self.lock_inner().prepared_reference = Some(transaction_reference.clone());
                Ok(transaction_reference)
            }
            Ok(WithdrawalResponse::Rejected(failure)) => Err(PasskeyError::SubmissionRejected {
                kind: failure.kind,
                message: failure.message,
            }),
            Err(error) => Err(transport_error(error)),
        }
    }

    async fn submit(
        &self,
        submission: &TransactionSubmission,
        token: &VerificationToken,
    ) -> Result<SettlementReceipt, PasskeyError> {
        let result = self
            .ceremony
            .backend()
            .submit_transaction(submission, token)
            .await;
        // One submission per token, whatever happened.
        self.tokens.clear();

        match result {
            Ok(SubmissionResponse::Settled(receipt)) => Ok(receipt),
            Ok(SubmissionResponse::Rejected(failure)) if failure.kind.requires_reverification() => {
                warn!(kind = ?failure.kind, "Passkey token refused by backend");
                Err(PasskeyError::VerificationExpired)
            }
            Ok(SubmissionResponse::Rejected(failure)) => Err(PasskeyError::SubmissionRejected {
                kind: failure.kind,
                message: failure.message,
            }),
            Err(error) => Err(transport_error(error)),
        }
    }

    fn warn_if_expiring(&self, intent: &TransactionIntent) {
        let threshold = match intent.kind() {
            TransactionKind::WithdrawToBank => self.settings.submit_warning,
            _ => self.settings.expiry_warning,
        };
        if self.tokens.is_expiring_soon(threshold) {
            warn!(
                remaining_secs = self.tokens.time_remaining().as_secs(),
                "Passkey token expiring soon"
            );
        }
    }

    fn settle(&self, result: Result<SettlementReceipt, PasskeyError>) -> TransactionOutcome {
        let mut inner = self.lock_inner();
        let outcome = match result {
            Ok(receipt) => {
                info!(
                    transaction_reference = %receipt.transaction_reference,
                    "Transaction completed"
                );
                inner.state = FlowState::Success;
                inner.last_error = None;
                TransactionOutcome::Success(receipt)
            }
            Err(error) => {
                if error.is_benign() {
                    info!(error = %error, "Transaction not completed");
                } else {
                    warn!(error = %error, code = error.error_code(), "Transaction failed");
                }
                inner.state = FlowState::Review;
                inner.last_error = Some(error.clone());
                TransactionOutcome::Failure(error)
            }
        };
        inner.outcome = Some(outcome.clone());
        outcome
    }
}

fn transport_error(error: BackendError) -> PasskeyError {
    match error {
        BackendError::MissingSession => PasskeyError::NotAuthenticated,
        other => PasskeyError::NetworkError(other.to_string()),
    }
}
