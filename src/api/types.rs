// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request and response types for the passkey and transfer endpoints.
//!
//! Each endpoint has a tagged response enum so call sites handle the success
//! and rejection variants exhaustively instead of probing optional fields.

use base64ct::{Base64, Base64Unpadded, Base64Url, Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::authenticator::SignedAssertion;
use crate::models::{
    Amount, SettlementReceipt, TransactionIntent, TransactionKind, VerificationChallenge,
};

// =============================================================================
// Binary field encoding
// =============================================================================

/// Encode binary WebAuthn fields as unpadded base64url.
pub fn encode_binary(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

/// Decode a challenge or credential id sent as base64url or standard base64,
/// with or without padding.
pub fn decode_binary(raw: &str) -> Option<Vec<u8>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Base64UrlUnpadded::decode_vec(raw)
        .or_else(|_| Base64Url::decode_vec(raw))
        .or_else(|_| Base64::decode_vec(raw))
        .or_else(|_| Base64Unpadded::decode_vec(raw))
        .ok()
}

// =============================================================================
// Rejections
// =============================================================================

/// Machine-readable rejection kinds from the backend `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    /// The endpoint needs a (fresh) passkey verification token.
    PasskeyVerificationRequired,
    TokenExpired,
    TokenInvalid,
    /// The primary session credential was refused.
    Unauthorized,
    InsufficientBalance,
    RecipientNotFound,
    InvalidAmount,
    LimitExceeded,
    Other,
}

impl RejectionKind {
    /// Classify a structured error code. Unknown codes become `Other`; a bare
    /// 401 without a code is a session problem, not a passkey one.
    pub fn from_code(code: Option<&str>, status: u16) -> Self {
        let Some(code) = code.map(|c| c.trim().to_ascii_uppercase()) else {
            return if status == 401 {
                RejectionKind::Unauthorized
            } else {
                RejectionKind::Other
            };
        };
        match code.as_str() {
            "PASSKEY_VERIFICATION_REQUIRED" => RejectionKind::PasskeyVerificationRequired,
            "TOKEN_EXPIRED" | "PASSKEY_TOKEN_EXPIRED" => RejectionKind::TokenExpired,
            "TOKEN_INVALID" | "INVALID_PASSKEY_TOKEN" | "PASSKEY_TOKEN_INVALID" => {
                RejectionKind::TokenInvalid
            }
            "UNAUTHORIZED" => RejectionKind::Unauthorized,
            "INSUFFICIENT_BALANCE" | "INSUFFICIENT_FUNDS" => RejectionKind::InsufficientBalance,
            "RECIPIENT_NOT_FOUND" | "USER_NOT_FOUND" => RejectionKind::RecipientNotFound,
            "INVALID_AMOUNT" => RejectionKind::InvalidAmount,
            "LIMIT_EXCEEDED" => RejectionKind::LimitExceeded,
            _ => RejectionKind::Other,
        }
    }

    /// Kinds that mean the passkey proof itself is gone or bad.
    pub fn requires_reverification(&self) -> bool {
        matches!(
            self,
            RejectionKind::PasskeyVerificationRequired
                | RejectionKind::TokenExpired
                | RejectionKind::TokenInvalid
        )
    }
}

/// A structured backend refusal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub kind: RejectionKind,
    pub status: u16,
    pub message: String,
}

// =============================================================================
// Requests
// =============================================================================

/// Intent description sent with the challenge request and echoed inside the
/// assertion verification payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub transaction_type: &'static str,
    pub amount: Amount,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,
}

impl TransactionData {
    pub fn for_intent(intent: &TransactionIntent, reference: Option<&str>) -> Self {
        Self {
            transaction_type: intent.kind().wire_type(),
            amount: intent.amount(),
            recipient: intent.recipient().to_string(),
            message: intent.memo().map(str::to_string),
            transaction_reference: reference.map(str::to_string),
        }
    }
}

/// Signed assertion plus the correlation handle and intent it answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionVerifyRequest {
    pub transaction_id: String,
    pub credential_id: String,
    pub authenticator_data: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub signature: String,
    pub user_handle: Option<String>,
    pub transaction_data: TransactionData,
}

impl AssertionVerifyRequest {
    pub fn new(
        challenge: &VerificationChallenge,
        assertion: &SignedAssertion,
        transaction_data: TransactionData,
    ) -> Self {
        Self {
            transaction_id: challenge.transaction_id.clone(),
            credential_id: encode_binary(&assertion.credential_id),
            authenticator_data: encode_binary(&assertion.authenticator_data),
            client_data_json: encode_binary(&assertion.client_data_json),
            signature: encode_binary(&assertion.signature),
            user_handle: assertion.user_handle.as_deref().map(encode_binary),
            transaction_data,
        }
    }
}

/// The money-moving request gated by the verification token.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionSubmission {
    ToUser {
        username: String,
        amount: Amount,
        message: Option<String>,
    },
    ToAddress {
        address: String,
        amount: Amount,
        message: Option<String>,
    },
    ConfirmWithdrawal {
        transaction_reference: String,
        account_number: String,
        bank_code: String,
    },
}

impl TransactionSubmission {
    /// Build the submission for `intent`. Bank withdrawals need the
    /// reference returned by [`initiate_withdrawal`](super::WalletBackend::initiate_withdrawal).
    pub fn for_intent(intent: &TransactionIntent, reference: Option<&str>) -> Option<Self> {
        let message = intent.memo().map(str::to_string);
        match intent.kind() {
            TransactionKind::TransferToUser => Some(TransactionSubmission::ToUser {
                username: intent.recipient().to_string(),
                amount: intent.amount(),
                message,
            }),
            TransactionKind::TransferToExternalAddress => Some(TransactionSubmission::ToAddress {
                address: intent.recipient().to_string(),
                amount: intent.amount(),
                message,
            }),
            TransactionKind::WithdrawToBank => {
                let beneficiary = intent.beneficiary()?;
                Some(TransactionSubmission::ConfirmWithdrawal {
                    transaction_reference: reference?.to_string(),
                    account_number: beneficiary.account_number.clone(),
                    bank_code: beneficiary.bank_code.clone(),
                })
            }
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            TransactionSubmission::ToUser { .. } => "/api/transfer/send/username",
            TransactionSubmission::ToAddress { .. } => "/api/transfer/send/external",
            TransactionSubmission::ConfirmWithdrawal { .. } => {
                "/api/offramp/confirm-account-and-sign"
            }
        }
    }

    pub fn body(&self) -> Value {
        match self {
            TransactionSubmission::ToUser {
                username,
                amount,
                message,
            } => without_nulls(json!({
                "username": username,
                "amount": amount,
                "message": message,
            })),
            TransactionSubmission::ToAddress {
                address,
                amount,
                message,
            } => without_nulls(json!({
                "address": address,
                "amount": amount,
                "message": message,
            })),
            TransactionSubmission::ConfirmWithdrawal {
                transaction_reference,
                account_number,
                bank_code,
            } => json!({
                "transactionReference": transaction_reference,
                "accountNumber": account_number,
                "bankCode": bank_code,
            }),
        }
    }
}

/// Body of the cash-out preparation request.
pub fn withdrawal_body(intent: &TransactionIntent) -> Option<Value> {
    let beneficiary = intent.beneficiary()?;
    Some(json!({
        "amountUSDC": intent.amount(),
        "beneficiary": {
            "name": beneficiary.account_name,
            "accountNumber": beneficiary.account_number,
            "bankCode": beneficiary.bank_code,
        }
    }))
}

fn without_nulls(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    value
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeResponse {
    Issued(VerificationChallenge),
    Rejected(ApiFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssertionVerifyResponse {
    Verified { token: String },
    Rejected(ApiFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalResponse {
    Initiated {
        transaction_reference: String,
        status: Option<String>,
    },
    Rejected(ApiFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionResponse {
    Settled(SettlementReceipt),
    Rejected(ApiFailure),
}

// =============================================================================
// Raw payloads
// =============================================================================

/// `{success, data, error, message, code}` wrapper used by every endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default = "default_true")]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub code: Option<String>,
}

fn default_true() -> bool {
    true
}

impl<T> Envelope<T> {
    pub fn failure(&self, status: u16) -> ApiFailure {
        ApiFailure {
            kind: RejectionKind::from_code(self.code.as_deref(), status),
            status,
            message: self
                .error
                .clone()
                .or_else(|| self.message.clone())
                .unwrap_or_else(|| "Request failed".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCredentialDescriptor {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChallengeOptions {
    pub challenge: Option<String>,
    pub timeout: Option<u64>,
    pub rp_id: Option<String>,
    #[serde(default)]
    pub allow_credentials: Vec<RawCredentialDescriptor>,
}

/// Challenge data, flat or nested under `options`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawChallenge {
    pub transaction_id: Option<String>,
    #[serde(flatten)]
    pub flat: RawChallengeOptions,
    pub options: Option<RawChallengeOptions>,
}

impl RawChallenge {
    pub fn into_challenge(self, default_rp_id: &str) -> Result<VerificationChallenge, String> {
        let nested = self.options.unwrap_or_default();
        let encoded = self
            .flat
            .challenge
            .or(nested.challenge)
            .ok_or_else(|| "missing challenge".to_string())?;
        let challenge =
            decode_binary(&encoded).ok_or_else(|| "challenge is not valid base64".to_string())?;
        let transaction_id = self
            .transaction_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| "missing transactionId".to_string())?;

        let descriptors = if self.flat.allow_credentials.is_empty() {
            nested.allow_credentials
        } else {
            self.flat.allow_credentials
        };
        let allow_credentials = descriptors
            .iter()
            .map(|d| {
                decode_binary(&d.id).ok_or_else(|| format!("credential id `{}` is not base64", d.id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(VerificationChallenge {
            challenge,
            relying_party_id: self
                .flat
                .rp_id
                .or(nested.rp_id)
                .filter(|rp| !rp.trim().is_empty())
                .unwrap_or_else(|| default_rp_id.to_string()),
            timeout: self
                .flat
                .timeout
                .or(nested.timeout)
                .filter(|ms| *ms > 0)
                .map(std::time::Duration::from_millis),
            transaction_id,
            allow_credentials,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawVerification {
    pub verified: Option<bool>,
    #[serde(alias = "verificationToken")]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawWithdrawal {
    pub transaction_reference: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSettlement {
    pub transfer_id: Option<String>,
    pub transaction_reference: Option<String>,
    pub transaction_hash: Option<String>,
    pub explorer_url: Option<String>,
    pub status: Option<String>,
}

impl RawSettlement {
    pub fn into_receipt(self) -> Option<SettlementReceipt> {
        let transaction_reference = self
            .transaction_reference
            .or(self.transfer_id)
            .or_else(|| self.transaction_hash.clone())?;
        Some(SettlementReceipt {
            transaction_reference,
            settlement_hash: self.transaction_hash,
            explorer_url: self.explorer_url,
            status: self.status,
        })
    }
}
