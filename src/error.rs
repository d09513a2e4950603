// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification and submission errors surfaced to the UI layer.

use crate::api::RejectionKind;

/// Closed set of failure kinds a flow can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedPlatform,
    NoCredentialEnrolled,
    CeremonyCancelled,
    ChallengeRequestFailed,
    BackendRejectedAssertion,
    VerificationExpired,
    SubmissionRejected,
    NetworkError,
    NotAuthenticated,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedPlatform => "unsupported-platform",
            ErrorKind::NoCredentialEnrolled => "no-credential-enrolled",
            ErrorKind::CeremonyCancelled => "ceremony-cancelled",
            ErrorKind::ChallengeRequestFailed => "challenge-request-failed",
            ErrorKind::BackendRejectedAssertion => "backend-rejected-assertion",
            ErrorKind::VerificationExpired => "verification-expired",
            ErrorKind::SubmissionRejected => "submission-rejected",
            ErrorKind::NetworkError => "network-error",
            ErrorKind::NotAuthenticated => "not-authenticated",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for the passkey ceremony and the transaction flow.
///
/// Every variant renders a specific, user-displayable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasskeyError {
    #[error("Passkey authentication is not supported on this device")]
    UnsupportedPlatform,

    #[error("No passkey found for this account. Please register a passkey first.")]
    NoCredentialEnrolled,

    #[error("{0}")]
    CeremonyCancelled(String),

    #[error("Failed to get verification challenge: {0}")]
    ChallengeRequestFailed(String),

    #[error("Passkey verification failed: {0}")]
    BackendRejectedAssertion(String),

    #[error("Verification expired. Please verify again.")]
    VerificationExpired,

    #[error("Transaction failed: {message}")]
    SubmissionRejected { kind: RejectionKind, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Please log in to send payments")]
    NotAuthenticated,
}

impl PasskeyError {
    /// Cancellation raised by the user or by the authenticator timeout.
    pub fn cancelled() -> Self {
        PasskeyError::CeremonyCancelled("Authentication was cancelled or timed out".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PasskeyError::UnsupportedPlatform => ErrorKind::UnsupportedPlatform,
            PasskeyError::NoCredentialEnrolled => ErrorKind::NoCredentialEnrolled,
            PasskeyError::CeremonyCancelled(_) => ErrorKind::CeremonyCancelled,
            PasskeyError::ChallengeRequestFailed(_) => ErrorKind::ChallengeRequestFailed,
            PasskeyError::BackendRejectedAssertion(_) => ErrorKind::BackendRejectedAssertion,
            PasskeyError::VerificationExpired => ErrorKind::VerificationExpired,
            PasskeyError::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
            PasskeyError::NetworkError(_) => ErrorKind::NetworkError,
            PasskeyError::NotAuthenticated => ErrorKind::NotAuthenticated,
        }
    }

    /// Get the machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// A user backing out of the biometric prompt is not an alarm.
    pub fn is_benign(&self) -> bool {
        matches!(self, PasskeyError::CeremonyCancelled(_))
    }

    /// Money-relevant failures after which no stored token may survive.
    pub fn clears_token(&self) -> bool {
        matches!(
            self,
            PasskeyError::BackendRejectedAssertion(_)
                | PasskeyError::SubmissionRejected { .. }
                | PasskeyError::VerificationExpired
        )
    }

    /// Whether the next attempt has to run a fresh ceremony.
    pub fn requires_reverification(&self) -> bool {
        match self {
            PasskeyError::VerificationExpired | PasskeyError::BackendRejectedAssertion(_) => true,
            PasskeyError::SubmissionRejected { kind, .. } => kind.requires_reverification(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all() -> Vec<PasskeyError> {
        vec![
            PasskeyError::UnsupportedPlatform,
            PasskeyError::NoCredentialEnrolled,
            PasskeyError::cancelled(),
            PasskeyError::ChallengeRequestFailed("rate limited".to_string()),
            PasskeyError::BackendRejectedAssertion("signature mismatch".to_string()),
            PasskeyError::VerificationExpired,
            PasskeyError::SubmissionRejected {
                kind: RejectionKind::InsufficientBalance,
                message: "Insufficient balance".to_string(),
            },
            PasskeyError::NetworkError("connection reset".to_string()),
            PasskeyError::NotAuthenticated,
        ]
    }

    #[test]
    fn every_kind_has_a_distinct_code_and_message() {
        let errors = all();
        let codes: HashSet<_> = errors.iter().map(|e| e.error_code()).collect();
        let messages: HashSet<_> = errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn only_cancellation_is_benign() {
        let benign: Vec<_> = all().into_iter().filter(|e| e.is_benign()).collect();
        assert_eq!(benign, vec![PasskeyError::cancelled()]);
    }

    #[test]
    fn money_relevant_failures_clear_the_token() {
        assert!(PasskeyError::BackendRejectedAssertion("x".into()).clears_token());
        assert!(PasskeyError::VerificationExpired.clears_token());
        assert!(PasskeyError::SubmissionRejected {
            kind: RejectionKind::Other,
            message: "x".into()
        }
        .clears_token());
        assert!(!PasskeyError::cancelled().clears_token());
        assert!(!PasskeyError::NetworkError("x".into()).clears_token());
    }

    #[test]
    fn token_rejections_require_reverification() {
        let expired = PasskeyError::SubmissionRejected {
            kind: RejectionKind::TokenExpired,
            message: "expired".into(),
        };
        let broke = PasskeyError::SubmissionRejected {
            kind: RejectionKind::InsufficientBalance,
            message: "broke".into(),
        };
        assert!(expired.requires_reverification());
        assert!(!broke.requires_reverification());
    }

    #[test]
    fn codes_match_taxonomy_names() {
        assert_eq!(PasskeyError::cancelled().error_code(), "ceremony-cancelled");
        assert_eq!(
            PasskeyError::VerificationExpired.error_code(),
            "verification-expired"
        );
    }
}
