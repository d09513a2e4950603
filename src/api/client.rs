// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP implementation of [`WalletBackend`].

use std::sync::RwLock;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::types::{
    withdrawal_body, ApiFailure, AssertionVerifyRequest, AssertionVerifyResponse,
    ChallengeResponse, Envelope, RawChallenge, RawSettlement, RawVerification, RawWithdrawal,
    RejectionKind, SubmissionResponse, TransactionData, TransactionSubmission,
    WithdrawalResponse,
};
use super::{BackendError, WalletBackend};
use crate::config::PasskeyConfig;
use crate::models::{TransactionIntent, VerificationToken};

/// Header carrying the passkey verification token on gated requests.
pub const PASSKEY_TOKEN_HEADER: &str = "X-Passkey-Verified-Token";

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const CHALLENGE_PATH: &str = "/api/auth/passkey/transaction-verify-options";
const VERIFY_PATH: &str = "/api/auth/passkey/transaction-verify";
const WITHDRAWAL_PATH: &str = "/api/offramp/initiate";

pub struct ApiClient {
    base_url: String,
    relying_party_id: String,
    http: Client,
    session_token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            relying_party_id: base_url.host_str().unwrap_or("localhost").to_string(),
            http,
            session_token: RwLock::new(None),
        })
    }

    pub fn from_config(config: &PasskeyConfig) -> Result<Self, BackendError> {
        Self::new(&config.api_base_url, config.http_timeout)
    }

    /// Relying party used when a challenge does not name one.
    pub fn with_relying_party_id(mut self, rp_id: impl Into<String>) -> Self {
        self.relying_party_id = rp_id.into();
        self
    }

    /// Install the primary session credential (bearer token).
    pub fn set_session_token(&self, token: impl Into<String>) {
        let mut slot = self
            .session_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(token.into());
    }

    pub fn clear_session_token(&self) {
        let mut slot = self
            .session_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    pub fn session_token(&self) -> Option<String> {
        self.session_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// POST `payload` to `path` and unwrap the response envelope.
    ///
    /// Non-2xx statuses and `success: false` bodies become `Ok(Err(_))`.
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &Value,
        passkey: Option<&VerificationToken>,
    ) -> Result<Result<T, ApiFailure>, BackendError> {
        let session = self.session_token().ok_or(BackendError::MissingSession)?;

        let mut request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(session)
            .json(payload);
        if let Some(token) = passkey {
            debug!(endpoint = path, intent = %token.intent, "Attaching passkey token");
            request = request
                .header(PASSKEY_TOKEN_HEADER, token.value.as_str())
                .header(IDEMPOTENCY_KEY_HEADER, Uuid::new_v4().to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Network(format!("POST {path} failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(format!("POST {path} body read failed: {e}")))?;

        let envelope: Envelope<Value> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(BackendError::InvalidResponse(format!(
                    "POST {path} invalid JSON: {e}"
                )));
            }
            Err(_) => {
                let message = if body.trim().is_empty() {
                    format!("Request failed with status {status}")
                } else {
                    body
                };
                return Ok(Err(ApiFailure {
                    kind: RejectionKind::from_code(None, status.as_u16()),
                    status: status.as_u16(),
                    message,
                }));
            }
        };

        if !status.is_success() || !envelope.success {
            let failure = envelope.failure(status.as_u16());
            warn!(
                endpoint = path,
                status = failure.status,
                kind = ?failure.kind,
                "Backend rejected request"
            );
            return Ok(Err(failure));
        }

        let data = envelope.data.ok_or_else(|| {
            BackendError::InvalidResponse(format!("POST {path} returned no data"))
        })?;
        serde_json::from_value(data)
            .map(Ok)
            .map_err(|e| BackendError::InvalidResponse(format!("POST {path} unexpected data: {e}")))
    }
}

impl WalletBackend for ApiClient {
    fn has_session(&self) -> bool {
        self.session_token().is_some()
    }

    async fn request_challenge(
        &self,
        data: &TransactionData,
    ) -> Result<ChallengeResponse, BackendError> {
        let payload = serde_json::to_value(data)
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;
        match self.post_json::<RawChallenge>(CHALLENGE_PATH, &payload, None).await? {
            Ok(raw) => raw
                .into_challenge(&self.relying_party_id)
                .map(ChallengeResponse::Issued)
                .map_err(BackendError::InvalidResponse),
            Err(failure) => Ok(ChallengeResponse::Rejected(failure)),
        }
    }

    async fn verify_assertion(
        &self,
        request: &AssertionVerifyRequest,
    ) -> Result<AssertionVerifyResponse, BackendError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;
        match self.post_json::<RawVerification>(VERIFY_PATH, &payload, None).await? {
            Ok(RawVerification {
                verified: Some(false),
                ..
            }) => Ok(AssertionVerifyResponse::Rejected(ApiFailure {
                kind: RejectionKind::Other,
                status: 200,
                message: "Assertion was not verified".to_string(),
            })),
            Ok(RawVerification {
                token: Some(token), ..
            }) if !token.trim().is_empty() => Ok(AssertionVerifyResponse::Verified { token }),
            Ok(_) => Err(BackendError::InvalidResponse(
                "verification response carried no token".to_string(),
            )),
            Err(failure) => Ok(AssertionVerifyResponse::Rejected(failure)),
        }
    }

    async fn initiate_withdrawal(
        &self,
        intent: &TransactionIntent,
    ) -> Result<WithdrawalResponse, BackendError> {
        let payload = withdrawal_body(intent).ok_or_else(|| {
            BackendError::InvalidRequest("intent has no bank beneficiary".to_string())
        })?;
        match self.post_json::<RawWithdrawal>(WITHDRAWAL_PATH, &payload, None).await? {
            Ok(raw) => {
                info!(
                    transaction_reference = %raw.transaction_reference,
                    "Bank withdrawal prepared"
                );
                Ok(WithdrawalResponse::Initiated {
                    transaction_reference: raw.transaction_reference,
                    status: raw.status,
                })
            }
            Err(failure) => Ok(WithdrawalResponse::Rejected(failure)),
        }
    }

    async fn submit_transaction(
        &self,
        submission: &TransactionSubmission,
        token: &VerificationToken,
    ) -> Result<SubmissionResponse, BackendError> {
        let path = submission.path();
        match self
            .post_json::<RawSettlement>(path, &submission.body(), Some(token))
            .await?
        {
            Ok(raw) => {
                let receipt = raw.into_receipt().ok_or_else(|| {
                    BackendError::InvalidResponse(format!("POST {path} returned no reference"))
                })?;
                info!(
                    endpoint = path,
                    transaction_reference = %receipt.transaction_reference,
                    "Transaction submitted"
                );
                Ok(SubmissionResponse::Settled(receipt))
            }
            Err(failure) => Ok(SubmissionResponse::Rejected(failure)),
        }
    }
}
