// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verification Token Store
//!
//! Single-slot, time-boxed holder of the passkey verification token.
//!
//! - Expiry is lazy: reads past `expires_at` clear the slot and return `None`.
//! - The slot is mirrored into [`SessionStorage`] under
//!   [`TOKEN_STORAGE_KEY`] so a reload within the session keeps the token.
//! - Unreadable persisted data is treated as absent and removed.
//! - No network calls; storage writes are the only side effect.
//!
//! One store exists per application session and is shared by reference. Two
//! flows running at once would race on the slot; callers run one flow at a
//! time.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::models::{IntentFingerprint, VerificationToken};
use crate::storage::{MemorySessionStorage, SessionStorage};

/// Session storage key of the persisted token.
pub const TOKEN_STORAGE_KEY: &str = "passkey_verification_token";

pub struct TokenStore {
    slot: Mutex<Option<VerificationToken>>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    /// Create a store over `storage`, picking up a still-valid persisted token.
    pub fn new(storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
        let store = Self {
            slot: Mutex::new(None),
            storage,
            clock,
        };
        {
            let mut slot = store.lock_slot();
            *slot = store.load_persisted();
        }
        store
    }

    /// Memory-only store on the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStorage::new()), Arc::new(SystemClock))
    }

    /// Store a freshly minted token, replacing any previous one.
    pub fn set(
        &self,
        value: impl Into<String>,
        intent: IntentFingerprint,
        lifetime: Duration,
    ) -> VerificationToken {
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();
        let token = VerificationToken {
            value: value.into(),
            expires_at: now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
            intent,
        };

        match serde_json::to_string(&token) {
            Ok(json) => {
                if let Err(e) = self.storage.set_item(TOKEN_STORAGE_KEY, &json) {
                    warn!(error = %e, "Failed to persist passkey token; keeping it in memory only");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize passkey token"),
        }

        debug!(
            expires_at = %token.expires_at,
            intent = %token.intent,
            "Passkey token stored"
        );
        *self.lock_slot() = Some(token.clone());
        token
    }

    /// The current token, if one exists and has not expired.
    pub fn get(&self) -> Option<VerificationToken> {
        let mut slot = self.lock_slot();
        if slot.is_none() {
            *slot = self.load_persisted();
        }

        let now = self.clock.now();
        match slot.as_ref().map(|token| token.is_valid_at(now)) {
            Some(true) => slot.clone(),
            Some(false) => {
                warn!("Passkey token expired");
                *slot = None;
                drop(slot);
                self.remove_persisted();
                None
            }
            None => None,
        }
    }

    /// The current token, only if it was minted for `intent`.
    pub fn get_for(&self, intent: &IntentFingerprint) -> Option<VerificationToken> {
        self.get().filter(|token| token.authorizes(intent))
    }

    /// Drop the token from memory and session storage. Idempotent.
    pub fn clear(&self) {
        let had_token = self.lock_slot().take().is_some();
        self.remove_persisted();
        if had_token {
            debug!("Passkey token cleared");
        }
    }

    /// True when less than `threshold` of lifetime remains, or no token exists.
    ///
    /// Informational only; callers must not refuse a valid token because of it.
    pub fn is_expiring_soon(&self, threshold: Duration) -> bool {
        self.time_remaining() < threshold
    }

    /// Remaining lifetime; zero when absent or expired.
    pub fn time_remaining(&self) -> Duration {
        let slot = self.lock_slot();
        let Some(token) = slot.as_ref() else {
            return Duration::ZERO;
        };
        (token.expires_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<VerificationToken>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_persisted(&self) -> Option<VerificationToken> {
        let raw = match self.storage.get_item(TOKEN_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted passkey token");
                return None;
            }
        };

        let token: VerificationToken = match serde_json::from_str(&raw) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Persisted passkey token is malformed, clearing");
                self.remove_persisted();
                return None;
            }
        };

        if token.is_valid_at(self.clock.now()) {
            debug!(expires_at = %token.expires_at, "Valid passkey token loaded from storage");
            Some(token)
        } else {
            debug!("Stored passkey token expired, clearing");
            self.remove_persisted();
            None
        }
    }

    fn remove_persisted(&self) {
        if let Err(e) = self.storage.remove_item(TOKEN_STORAGE_KEY) {
            warn!(error = %e, "Failed to remove persisted passkey token");
        }
    }
}
