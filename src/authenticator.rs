// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Platform authenticator boundary.
//!
//! The WebAuthn `get` ceremony is modelled as one awaitable returning a
//! tagged result. Implementations wrap whatever the host platform offers
//! (browser bridge, OS passkey API, hardware key).

use std::time::Duration;

/// User verification policy requested from the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserVerification {
    /// Biometric or PIN; device possession alone is not enough.
    Required,
    Preferred,
    Discouraged,
}

impl UserVerification {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserVerification::Required => "required",
            UserVerification::Preferred => "preferred",
            UserVerification::Discouraged => "discouraged",
        }
    }
}

/// Parameters for one assertion ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionOptions {
    pub challenge: Vec<u8>,
    pub relying_party_id: String,
    pub timeout: Duration,
    /// Empty means any discoverable credential for the relying party.
    pub allow_credentials: Vec<Vec<u8>>,
    pub user_verification: UserVerification,
}

/// Signed proof produced by the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAssertion {
    pub credential_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticatorError {
    #[error("the user dismissed the authenticator prompt")]
    Cancelled,

    #[error("the authenticator prompt timed out")]
    TimedOut,

    #[error("no credential is enrolled for this relying party")]
    NoCredential,

    #[error("the platform does not support passkeys")]
    NotSupported,

    #[error("{0}")]
    Platform(String),
}

impl AuthenticatorError {
    /// Map a WebAuthn exception name (`NotAllowedError`, ...) to a variant.
    pub fn from_platform_name(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "AbortError" => AuthenticatorError::Cancelled,
            "TimeoutError" => AuthenticatorError::TimedOut,
            "InvalidStateError" => AuthenticatorError::NoCredential,
            "NotSupportedError" => AuthenticatorError::NotSupported,
            _ => AuthenticatorError::Platform(format!("{name}: {message}")),
        }
    }
}

/// A platform authenticator able to produce passkey assertions.
#[allow(async_fn_in_trait)]
pub trait Authenticator: Send + Sync {
    /// Whether the platform can run a passkey ceremony at all.
    fn is_supported(&self) -> bool;

    /// Run the assertion ceremony. Suspends until the user completes or
    /// cancels, or the platform times out.
    async fn get_assertion(
        &self,
        options: AssertionOptions,
    ) -> Result<SignedAssertion, AuthenticatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_names_map_to_variants() {
        assert_eq!(
            AuthenticatorError::from_platform_name("NotAllowedError", "timed out or not allowed"),
            AuthenticatorError::Cancelled
        );
        assert_eq!(
            AuthenticatorError::from_platform_name("InvalidStateError", ""),
            AuthenticatorError::NoCredential
        );
        assert_eq!(
            AuthenticatorError::from_platform_name("NotSupportedError", ""),
            AuthenticatorError::NotSupported
        );
        assert_eq!(
            AuthenticatorError::from_platform_name("SecurityError", "rp id mismatch"),
            AuthenticatorError::Platform("SecurityError: rp id mismatch".to_string())
        );
    }
}
