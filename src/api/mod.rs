// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Backend API
//!
//! The four backend calls the authorization flow depends on, behind the
//! [`WalletBackend`] trait so the ceremony and flow can be driven against
//! a scripted backend in tests. [`ApiClient`] is the HTTP implementation.
//!
//! Every call resolves to either a transport error ([`BackendError`]) or a
//! per-endpoint tagged response whose `Rejected` arm carries a classified
//! [`ApiFailure`].

pub mod client;
pub mod types;

pub use client::{ApiClient, IDEMPOTENCY_KEY_HEADER, PASSKEY_TOKEN_HEADER};
pub use types::{
    ApiFailure, AssertionVerifyRequest, AssertionVerifyResponse, ChallengeResponse,
    RejectionKind, SubmissionResponse, TransactionData, TransactionSubmission,
    WithdrawalResponse,
};

use crate::models::{TransactionIntent, VerificationToken};

/// Transport-level failures. Structured refusals are not errors here; they
/// arrive as the `Rejected` arm of each response enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("No session credential; log in first")]
    MissingSession,

    #[error("{0}")]
    Network(String),

    #[error("Backend response was invalid: {0}")]
    InvalidResponse(String),

    #[error("Request could not be built: {0}")]
    InvalidRequest(String),
}

/// Backend endpoints used by the ceremony and the transaction flow.
#[allow(async_fn_in_trait)]
pub trait WalletBackend: Send + Sync {
    /// Whether a primary session credential is available.
    fn has_session(&self) -> bool;

    /// `POST /api/auth/passkey/transaction-verify-options`
    async fn request_challenge(
        &self,
        data: &TransactionData,
    ) -> Result<ChallengeResponse, BackendError>;

    /// `POST /api/auth/passkey/transaction-verify`
    async fn verify_assertion(
        &self,
        request: &AssertionVerifyRequest,
    ) -> Result<AssertionVerifyResponse, BackendError>;

    /// `POST /api/offramp/initiate`; prepares a bank cash-out and returns
    /// the reference the confirmation step needs.
    async fn initiate_withdrawal(
        &self,
        intent: &TransactionIntent,
    ) -> Result<WithdrawalResponse, BackendError>;

    /// Submit the money-moving request with the verification token attached.
    async fn submit_transaction(
        &self,
        submission: &TransactionSubmission,
        token: &VerificationToken,
    ) -> Result<SubmissionResponse, BackendError>;
}
