// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scripted authenticator, backend and clock used by the store, ceremony
//! and flow tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use tokio::sync::Notify;

use crate::api::{
    ApiFailure, AssertionVerifyRequest, AssertionVerifyResponse, BackendError,
    ChallengeResponse, RejectionKind, SubmissionResponse, TransactionData,
    TransactionSubmission, WalletBackend, WithdrawalResponse,
};
use crate::authenticator::{AssertionOptions, Authenticator, AuthenticatorError, SignedAssertion};
use crate::clock::Clock;
use crate::models::{SettlementReceipt, TransactionIntent, VerificationChallenge, VerificationToken};

#[derive(Debug, Clone)]
pub(crate) enum AuthBehavior {
    Sign,
    Fail(AuthenticatorError),
    /// Never resolves; only a timeout or cancellation ends the wait.
    Hang,
}

pub(crate) struct MockAuthenticator {
    supported: bool,
    behavior: Mutex<AuthBehavior>,
    calls: AtomicUsize,
    last_options: Mutex<Option<AssertionOptions>>,
}

impl MockAuthenticator {
    pub fn with(behavior: AuthBehavior) -> Self {
        Self {
            supported: true,
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    pub fn signing() -> Self {
        Self::with(AuthBehavior::Sign)
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::signing()
        }
    }

    pub fn set_behavior(&self, behavior: AuthBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<AssertionOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

impl Authenticator for MockAuthenticator {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn get_assertion(
        &self,
        options: AssertionOptions,
    ) -> Result<SignedAssertion, AuthenticatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            AuthBehavior::Sign => Ok(SignedAssertion {
                credential_id: vec![7, 7, 7],
                authenticator_data: vec![1, 2],
                client_data_json: br#"{"type":"webauthn.get"}"#.to_vec(),
                signature: vec![3, 4],
                user_handle: Some(b"user-1".to_vec()),
            }),
            AuthBehavior::Fail(error) => Err(error),
            AuthBehavior::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum BackendCall {
    Challenge(TransactionData),
    Verify(AssertionVerifyRequest),
    InitiateWithdrawal,
    Submit { path: &'static str, token: String },
}

/// Holds a backend call until released, so tests can act while the call is
/// in flight.
#[derive(Default)]
pub(crate) struct CallGate {
    pub started: Notify,
    pub release: Notify,
}

pub(crate) struct MockBackend {
    session: AtomicBool,
    challenge: Mutex<Option<Result<ChallengeResponse, BackendError>>>,
    verification: Mutex<Option<Result<AssertionVerifyResponse, BackendError>>>,
    withdrawal: Mutex<Option<Result<WithdrawalResponse, BackendError>>>,
    submissions: Mutex<VecDeque<Result<SubmissionResponse, BackendError>>>,
    gate: Mutex<Option<Arc<CallGate>>>,
    withdrawal_gate: Mutex<Option<Arc<CallGate>>>,
    minted: AtomicUsize,
    calls: Mutex<Vec<BackendCall>>,
}

impl MockBackend {
    /// Logged-in backend that accepts everything.
    pub fn new() -> Self {
        Self {
            session: AtomicBool::new(true),
            challenge: Mutex::new(None),
            verification: Mutex::new(None),
            withdrawal: Mutex::new(None),
            submissions: Mutex::new(VecDeque::new()),
            gate: Mutex::new(None),
            withdrawal_gate: Mutex::new(None),
            minted: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_session(&self, present: bool) {
        self.session.store(present, Ordering::SeqCst);
    }

    pub fn set_challenge(&self, response: Result<ChallengeResponse, BackendError>) {
        *self.challenge.lock().unwrap() = Some(response);
    }

    pub fn set_verification(&self, response: Result<AssertionVerifyResponse, BackendError>) {
        *self.verification.lock().unwrap() = Some(response);
    }

    pub fn set_withdrawal(&self, response: Result<WithdrawalResponse, BackendError>) {
        *self.withdrawal.lock().unwrap() = Some(response);
    }

    /// Queue the next submission result; an empty queue settles.
    pub fn push_submission(&self, response: Result<SubmissionResponse, BackendError>) {
        self.submissions.lock().unwrap().push_back(response);
    }

    pub fn reject_next_submission(&self, kind: RejectionKind, message: &str) {
        self.push_submission(Ok(SubmissionResponse::Rejected(ApiFailure {
            kind,
            status: 400,
            message: message.to_string(),
        })));
    }

    /// Hold `submit_transaction` until released.
    pub fn install_gate(&self) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold `initiate_withdrawal` until released.
    pub fn hold_withdrawal(&self) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        *self.withdrawal_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn submissions(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Submit { .. }))
    }

    pub fn challenges(&self) -> usize {
        self.count(|c| matches!(c, BackendCall::Challenge(_)))
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WalletBackend for MockBackend {
    fn has_session(&self) -> bool {
        self.session.load(Ordering::SeqCst)
    }

    async fn request_challenge(
        &self,
        data: &TransactionData,
    ) -> Result<ChallengeResponse, BackendError> {
        self.record(BackendCall::Challenge(data.clone()));
        if let Some(scripted) = self.challenge.lock().unwrap().clone() {
            return scripted;
        }
        Ok(ChallengeResponse::Issued(VerificationChallenge {
            challenge: vec![1, 2, 3],
            relying_party_id: "aboki.xyz".to_string(),
            timeout: None,
            transaction_id: "txn-1".to_string(),
            allow_credentials: vec![vec![7, 7, 7]],
        }))
    }

    async fn verify_assertion(
        &self,
        request: &AssertionVerifyRequest,
    ) -> Result<AssertionVerifyResponse, BackendError> {
        self.record(BackendCall::Verify(request.clone()));
        if let Some(scripted) = self.verification.lock().unwrap().clone() {
            return scripted;
        }
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AssertionVerifyResponse::Verified {
            token: format!("vt-{n}"),
        })
    }

    async fn initiate_withdrawal(
        &self,
        _intent: &TransactionIntent,
    ) -> Result<WithdrawalResponse, BackendError> {
        self.record(BackendCall::InitiateWithdrawal);
        let gate = self.withdrawal_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        if let Some(scripted) = self.withdrawal.lock().unwrap().clone() {
            return scripted;
        }
        Ok(WithdrawalResponse::Initiated {
            transaction_reference: "ref-9".to_string(),
            status: Some("pending".to_string()),
        })
    }

    async fn submit_transaction(
        &self,
        submission: &TransactionSubmission,
        token: &VerificationToken,
    ) -> Result<SubmissionResponse, BackendError> {
        self.record(BackendCall::Submit {
            path: submission.path(),
            token: token.value.clone(),
        });
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        let scripted = self.submissions.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SubmissionResponse::Settled(SettlementReceipt {
                transaction_reference: "tr-1".to_string(),
                settlement_hash: Some("0xabc".to_string()),
                explorer_url: None,
                status: Some("completed".to_string()),
            }))
        })
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap();
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
