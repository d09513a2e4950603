// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Wallet - Passkey Transaction Authorization
//!
//! Client-side gate that requires a fresh passkey (WebAuthn) assertion
//! before any money-moving request is sent to the wallet backend.
//!
//! ## Modules
//!
//! - `store` - single-slot, time-boxed verification token store
//! - `ceremony` - challenge / user presence / assertion verification sequence
//! - `flow` - review → verify → submit state machine per transaction
//! - `api` - wallet backend endpoints (reqwest)
//! - `authenticator` - platform authenticator boundary
//! - `storage` - session-scoped persistence (memory or file)
//! - `state` - per-session wiring of the above

pub mod api;
pub mod authenticator;
pub mod ceremony;
pub mod clock;
pub mod config;
pub mod error;
pub mod flow;
pub mod logging;
pub mod models;
pub mod state;
pub mod storage;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, PasskeyError};
pub use flow::{Completion, FlowState, TransactionFlow, Verification};
pub use state::AppState;
pub use store::TokenStore;
