// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Data Models
//!
//! Core values moved between the token store, the verification ceremony and
//! the transaction flow.
//!
//! ## Intent Binding
//!
//! A [`TransactionIntent`] has no setters. Its [`IntentFingerprint`] is a
//! SHA-256 digest over every security-relevant field; verification tokens are
//! stored and looked up by fingerprint, so a token minted for one amount or
//! recipient can never be attached to another.

use std::fmt;
use std::str::FromStr;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::PasskeyError;

// =============================================================================
// Amount
// =============================================================================

/// Decimal places of the settlement stable-coin (USDC).
pub const SETTLEMENT_DECIMALS: u32 = 6;

const MINOR_PER_UNIT: u64 = 10u64.pow(SETTLEMENT_DECIMALS);

/// Positive amount of the settlement asset, held in minor units.
///
/// Serialized on the wire as a JSON number in whole units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub fn from_minor(minor: u64) -> Result<Self, IntentError> {
        if minor == 0 {
            return Err(IntentError::NonPositiveAmount);
        }
        Ok(Self(minor))
    }

    pub fn minor_units(&self) -> u64 {
        self.0
    }

    /// Whole units as a float, for JSON payloads.
    pub fn as_units_f64(&self) -> f64 {
        self.0 as f64 / MINOR_PER_UNIT as f64
    }
}

impl FromStr for Amount {
    type Err = IntentError;

    /// Parse a plain decimal such as `"10"`, `"10.5"` or `"0.000001"`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || IntentError::InvalidAmount(raw.to_string());
        let trimmed = raw.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (trimmed, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > SETTLEMENT_DECIMALS as usize {
            return Err(IntentError::TooPrecise(raw.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut frac_minor: u64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        frac_minor *= 10u64.pow(SETTLEMENT_DECIMALS - frac.len() as u32);

        let minor = whole
            .checked_mul(MINOR_PER_UNIT)
            .and_then(|w| w.checked_add(frac_minor))
            .ok_or_else(invalid)?;

        Amount::from_minor(minor)
    }
}

impl fmt::Display for Amount {
    /// Formats with at least two decimals: `10.00`, `0.125`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MINOR_PER_UNIT;
        let frac = format!("{:06}", self.0 % MINOR_PER_UNIT);
        let trimmed = frac.trim_end_matches('0');
        let frac = if trimmed.len() < 2 { &frac[..2] } else { trimmed };
        write!(f, "{whole}.{frac}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_units_f64())
    }
}

// =============================================================================
// Transaction Intent
// =============================================================================

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum IntentError {
    #[error("`{0}` is not a valid amount")]
    InvalidAmount(String),

    #[error("`{0}` has more than six decimal places")]
    TooPrecise(String),

    #[error("Amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Recipient must not be empty")]
    EmptyRecipient,

    #[error("Bank beneficiary is incomplete: {0} is missing")]
    IncompleteBeneficiary(&'static str),
}

/// What a transaction will do with the funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    /// Internal transfer to another wallet user by username.
    TransferToUser,
    /// On-chain transfer to an external address.
    TransferToExternalAddress,
    /// Cash-out to a bank account.
    WithdrawToBank,
}

impl TransactionKind {
    /// Value of `transactionType` in challenge requests.
    pub fn wire_type(&self) -> &'static str {
        match self {
            TransactionKind::TransferToUser => "send",
            TransactionKind::TransferToExternalAddress | TransactionKind::WithdrawToBank => {
                "withdraw"
            }
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            TransactionKind::TransferToUser => "transfer-to-user",
            TransactionKind::TransferToExternalAddress => "transfer-to-external-address",
            TransactionKind::WithdrawToBank => "withdraw-to-bank",
        }
    }
}

/// Destination bank account for a cash-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankBeneficiary {
    pub account_name: String,
    pub account_number: String,
    pub bank_code: String,
}

impl BankBeneficiary {
    pub fn new(
        account_name: impl Into<String>,
        account_number: impl Into<String>,
        bank_code: impl Into<String>,
    ) -> Result<Self, IntentError> {
        let beneficiary = Self {
            account_name: account_name.into().trim().to_string(),
            account_number: account_number.into().trim().to_string(),
            bank_code: bank_code.into().trim().to_string(),
        };
        if beneficiary.account_number.is_empty() {
            return Err(IntentError::IncompleteBeneficiary("account number"));
        }
        if beneficiary.bank_code.is_empty() {
            return Err(IntentError::IncompleteBeneficiary("bank code"));
        }
        Ok(beneficiary)
    }
}

/// The money movement a passkey ceremony approves.
///
/// Built once through one of the constructors; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionIntent {
    kind: TransactionKind,
    amount: Amount,
    recipient: String,
    memo: Option<String>,
    beneficiary: Option<BankBeneficiary>,
}

impl TransactionIntent {
    /// Transfer to a wallet user. A leading `@` on the username is dropped.
    pub fn to_user(username: &str, amount: Amount) -> Result<Self, IntentError> {
        let username = username.trim().trim_start_matches('@');
        Self::build(TransactionKind::TransferToUser, amount, username, None)
    }

    pub fn to_address(address: &str, amount: Amount) -> Result<Self, IntentError> {
        Self::build(
            TransactionKind::TransferToExternalAddress,
            amount,
            address.trim(),
            None,
        )
    }

    /// Cash-out; the account number is the approval anchor.
    pub fn to_bank(beneficiary: BankBeneficiary, amount: Amount) -> Result<Self, IntentError> {
        let recipient = beneficiary.account_number.clone();
        Self::build(
            TransactionKind::WithdrawToBank,
            amount,
            &recipient,
            Some(beneficiary),
        )
    }

    fn build(
        kind: TransactionKind,
        amount: Amount,
        recipient: &str,
        beneficiary: Option<BankBeneficiary>,
    ) -> Result<Self, IntentError> {
        if recipient.is_empty() {
            return Err(IntentError::EmptyRecipient);
        }
        Ok(Self {
            kind,
            amount,
            recipient: recipient.to_string(),
            memo: None,
            beneficiary,
        })
    }

    /// Attach a free-text note. Blank notes are dropped.
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        let memo = memo.into();
        let memo = memo.trim();
        self.memo = (!memo.is_empty()).then(|| memo.to_string());
        self
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn beneficiary(&self) -> Option<&BankBeneficiary> {
        self.beneficiary.as_ref()
    }

    /// Digest binding a token to this exact intent.
    pub fn fingerprint(&self) -> IntentFingerprint {
        let mut hasher = Sha256::new();
        // Length-prefix every field so no two intents share an encoding.
        let mut field = |value: &str| {
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        };
        field(self.kind.tag());
        field(&self.amount.minor_units().to_string());
        field(&self.recipient);
        field(self.memo.as_deref().unwrap_or(""));
        if let Some(b) = &self.beneficiary {
            field(&b.account_name);
            field(&b.account_number);
            field(&b.bank_code);
        }
        IntentFingerprint(Base64UrlUnpadded::encode_string(&hasher.finalize()))
    }
}

/// Base64url SHA-256 digest of a [`TransactionIntent`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentFingerprint(String);

impl IntentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Challenge & Tokens
// =============================================================================

/// Single-use challenge issued for one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationChallenge {
    pub challenge: Vec<u8>,
    pub relying_party_id: String,
    /// Backend-suggested ceremony deadline, if any.
    pub timeout: Option<std::time::Duration>,
    /// Correlation handle carried through to assertion verification.
    pub transaction_id: String,
    pub allow_credentials: Vec<Vec<u8>>,
}

/// Token returned by a successful ceremony, not yet stored.
#[derive(Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub value: String,
    pub intent: IntentFingerprint,
}

impl fmt::Debug for MintedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MintedToken")
            .field("value", &"<redacted>")
            .field("intent", &self.intent)
            .finish()
    }
}

/// Stored capability proving one intent was approved.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationToken {
    #[serde(rename = "token")]
    pub value: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub intent: IntentFingerprint,
}

impl VerificationToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn authorizes(&self, intent: &IntentFingerprint) -> bool {
        &self.intent == intent
    }
}

impl fmt::Debug for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("intent", &self.intent)
            .finish()
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Backend confirmation of a settled (or accepted) transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub transaction_reference: String,
    pub settlement_hash: Option<String>,
    pub explorer_url: Option<String>,
    pub status: Option<String>,
}

/// Result of one completion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    Success(SettlementReceipt),
    Failure(PasskeyError),
}

impl TransactionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransactionOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&PasskeyError> {
        match self {
            TransactionOutcome::Success(_) => None,
            TransactionOutcome::Failure(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(raw: &str) -> Amount {
        raw.parse().unwrap()
    }

    #[test]
    fn amount_parses_plain_decimals() {
        assert_eq!(amount("10").minor_units(), 10_000_000);
        assert_eq!(amount("10.00").minor_units(), 10_000_000);
        assert_eq!(amount("0.5").minor_units(), 500_000);
        assert_eq!(amount(".25").minor_units(), 250_000);
        assert_eq!(amount("0.000001").minor_units(), 1);
    }

    #[test]
    fn amount_rejects_bad_input() {
        assert_eq!("0".parse::<Amount>(), Err(IntentError::NonPositiveAmount));
        assert_eq!("0.00".parse::<Amount>(), Err(IntentError::NonPositiveAmount));
        assert!(matches!("-1".parse::<Amount>(), Err(IntentError::InvalidAmount(_))));
        assert!(matches!("1e3".parse::<Amount>(), Err(IntentError::InvalidAmount(_))));
        assert!(matches!(".".parse::<Amount>(), Err(IntentError::InvalidAmount(_))));
        assert!(matches!("".parse::<Amount>(), Err(IntentError::InvalidAmount(_))));
        assert!(matches!(
            "1.0000001".parse::<Amount>(),
            Err(IntentError::TooPrecise(_))
        ));
    }

    #[test]
    fn amount_display_keeps_two_decimals() {
        assert_eq!(amount("10").to_string(), "10.00");
        assert_eq!(amount("0.125").to_string(), "0.125");
        assert_eq!(amount("5000.5").to_string(), "5000.50");
    }

    #[test]
    fn amount_serializes_as_json_number() {
        assert_eq!(serde_json::to_string(&amount("10.5")).unwrap(), "10.5");
    }

    #[test]
    fn username_loses_leading_at_sign() {
        let intent = TransactionIntent::to_user("@alice", amount("10")).unwrap();
        assert_eq!(intent.recipient(), "alice");
        assert_eq!(intent.kind().wire_type(), "send");
    }

    #[test]
    fn empty_recipient_is_rejected() {
        assert_eq!(
            TransactionIntent::to_address("  ", amount("1")),
            Err(IntentError::EmptyRecipient)
        );
        assert_eq!(
            TransactionIntent::to_user("@", amount("1")),
            Err(IntentError::EmptyRecipient)
        );
    }

    #[test]
    fn bank_intent_anchors_on_account_number() {
        let beneficiary = BankBeneficiary::new("Ada Obi", "0123456789", "058").unwrap();
        let intent = TransactionIntent::to_bank(beneficiary, amount("25")).unwrap();
        assert_eq!(intent.recipient(), "0123456789");
        assert_eq!(intent.kind().wire_type(), "withdraw");
        assert!(intent.beneficiary().is_some());
    }

    #[test]
    fn incomplete_beneficiary_is_rejected() {
        assert_eq!(
            BankBeneficiary::new("Ada", "", "058"),
            Err(IntentError::IncompleteBeneficiary("account number"))
        );
    }

    #[test]
    fn fingerprint_is_stable_for_equal_intents() {
        let a = TransactionIntent::to_user("alice", amount("10")).unwrap();
        let b = TransactionIntent::to_user("@alice", amount("10.000")).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_any_bound_field() {
        let base = TransactionIntent::to_user("alice", amount("5")).unwrap();
        let more = TransactionIntent::to_user("alice", amount("5000")).unwrap();
        let other = TransactionIntent::to_user("bob", amount("5")).unwrap();
        let external = TransactionIntent::to_address("alice", amount("5")).unwrap();
        let memo = base.clone().with_memo("lunch");

        let fp = base.fingerprint();
        assert_ne!(fp, more.fingerprint());
        assert_ne!(fp, other.fingerprint());
        assert_ne!(fp, external.fingerprint());
        assert_ne!(fp, memo.fingerprint());
    }

    #[test]
    fn blank_memo_is_dropped() {
        let intent = TransactionIntent::to_user("alice", amount("1"))
            .unwrap()
            .with_memo("   ");
        assert_eq!(intent.memo(), None);
    }

    #[test]
    fn token_debug_redacts_value() {
        let token = VerificationToken {
            value: "secret-bearer".to_string(),
            expires_at: Utc::now(),
            intent: IntentFingerprint("fp".to_string()),
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-bearer"));
        assert!(rendered.contains("<redacted>"));
    }
}
