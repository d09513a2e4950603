// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::info;

use crate::api::{ApiClient, BackendError, WalletBackend};
use crate::authenticator::Authenticator;
use crate::ceremony::CeremonyController;
use crate::clock::{Clock, SystemClock};
use crate::config::PasskeyConfig;
use crate::flow::{FlowSettings, TransactionFlow};
use crate::models::TransactionIntent;
use crate::storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
use crate::store::TokenStore;

/// Components shared by every flow of one application session.
pub struct AppState<A, B = ApiClient> {
    pub config: Arc<PasskeyConfig>,
    pub tokens: Arc<TokenStore>,
    pub backend: Arc<B>,
    pub ceremony: Arc<CeremonyController<A, B>>,
}

impl<A, B> Clone for AppState<A, B> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            tokens: self.tokens.clone(),
            backend: self.backend.clone(),
            ceremony: self.ceremony.clone(),
        }
    }
}

impl<A: Authenticator> AppState<A, ApiClient> {
    /// Production wiring: HTTP backend, system clock, and file-backed session
    /// storage when `session_dir` is configured.
    pub fn from_config(config: PasskeyConfig, authenticator: Arc<A>) -> Result<Self, BackendError> {
        let backend = Arc::new(ApiClient::from_config(&config)?);
        let storage: Arc<dyn SessionStorage> = match &config.session_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "Using file-backed session storage");
                Arc::new(FileSessionStorage::new(dir))
            }
            None => Arc::new(MemorySessionStorage::new()),
        };
        Ok(Self::new(config, authenticator, backend, storage, Arc::new(SystemClock)))
    }
}

impl<A: Authenticator, B: WalletBackend> AppState<A, B> {
    pub fn new(
        config: PasskeyConfig,
        authenticator: Arc<A>,
        backend: Arc<B>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(storage, clock));
        let ceremony = Arc::new(CeremonyController::new(
            authenticator,
            backend.clone(),
            config.ceremony_timeout,
        ));
        Self {
            config: Arc::new(config),
            tokens,
            backend,
            ceremony,
        }
    }

    /// Start a flow for `intent` in the `Review` state.
    pub fn begin(&self, intent: TransactionIntent) -> TransactionFlow<A, B> {
        TransactionFlow::new(
            intent,
            self.ceremony.clone(),
            self.tokens.clone(),
            FlowSettings::from_config(&self.config),
        )
    }

    /// Drop any stored verification, e.g. on sign-out.
    pub fn clear_verification(&self) {
        self.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::flow::{Completion, FlowState};
    use crate::models::TransactionOutcome;
    use crate::store::TOKEN_STORAGE_KEY;
    use crate::testing::{MockAuthenticator, MockBackend};

    fn intent(amount: &str) -> TransactionIntent {
        TransactionIntent::to_user("alice", amount.parse().unwrap()).unwrap()
    }

    fn test_state() -> (Arc<MemorySessionStorage>, AppState<MockAuthenticator, MockBackend>) {
        let storage = Arc::new(MemorySessionStorage::new());
        let state = AppState::new(
            PasskeyConfig::default(),
            Arc::new(MockAuthenticator::signing()),
            Arc::new(MockBackend::new()),
            storage.clone(),
            Arc::new(SystemClock),
        );
        (storage, state)
    }

    #[tokio::test]
    async fn flows_share_one_token_store() {
        let (storage, state) = test_state();
        let first = state.begin(intent("10"));
        assert!(matches!(
            first.verify().await,
            crate::flow::Verification::Verified
        ));
        assert!(storage.get_item(TOKEN_STORAGE_KEY).unwrap().is_some());

        // A second flow for the same intent sees the stored token.
        let second = state.begin(intent("10"));
        assert!(second.is_verified());
        let completion = second.complete().await;
        assert!(matches!(
            completion,
            Completion::Finished(TransactionOutcome::Success(_))
        ));
        assert_eq!(second.state(), FlowState::Success);
        assert_eq!(state.backend.challenges(), 1);
        assert!(storage.get_item(TOKEN_STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn clear_verification_empties_the_store() {
        let (storage, state) = test_state();
        state
            .tokens
            .set("tok", intent("1").fingerprint(), Duration::from_secs(60));
        state.clear_verification();
        assert!(state.tokens.get().is_none());
        assert!(storage.get_item(TOKEN_STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn from_config_builds_http_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = PasskeyConfig {
            session_dir: Some(dir.path().to_path_buf()),
            ..PasskeyConfig::default()
        };
        let state = AppState::from_config(config, Arc::new(MockAuthenticator::signing())).unwrap();
        assert!(!state.backend.has_session());
        assert_eq!(state.ceremony.state(), crate::ceremony::CeremonyState::Idle);
    }
}
