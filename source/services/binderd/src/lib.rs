// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: binderd — the context manager for the binder driver
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module + `tests/dispatch.rs` + registry
//!   property tests
//!
//! PUBLIC API:
//!   - ServiceRegistry / ServiceBinding: ordered name-to-handle bindings
//!   - DeathTable / DeathKey: death-notification arena
//!   - Dispatcher: the dispatch loop state machine
//!   - Config: daemon configuration
//!
//! Every other process resolves names through this daemon at handle 0. The
//! design is deliberately single-threaded: one channel, one staging buffer,
//! one loop (see the concurrency notes in `dispatch`).

#![deny(clippy::all)]

pub mod config;
pub mod death;
pub mod dispatch;
pub mod provision;
pub mod registry;

pub use config::Config;
pub use death::{DeathKey, DeathRecord, DeathTable};
pub use dispatch::Dispatcher;
pub use registry::{ServiceBinding, ServiceRegistry};

/// Fatal startup errors; per-transaction failures and mid-loop channel
/// conditions never surface here, they end the loop in order instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Startup failure from the IPC runtime (role claim, thread cap).
    #[error("ipc: {0}")]
    Ipc(#[from] binder_ipc::IpcError),
    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] config::ConfigError),
}
