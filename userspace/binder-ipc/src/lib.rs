// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: IPC runtime for the binder kernel driver
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//!
//! PUBLIC API:
//!   - DriverChannel: device ownership, ioctl exchange, context-manager claim
//!   - CommandStream / Command: typed view over the driver's return stream
//!   - CommandWriter: outbound command emission (refcounts, death, replies)
//!   - Message / MessageReader: typed payload codec with offset bookkeeping
//!   - ThreadContext: one thread's staging buffers plus its channel
//!   - svcmgr: client half of the registry wire protocol
//!
//! DEPENDENCIES:
//!   - binder-abi: tags, ioctl codes, record codecs
//!   - libc: open/mmap/ioctl on the character device
//!
//! INVARIANTS:
//!   - All unsafe is confined to the device boundary (`driver`) and the
//!     zero-copy reader over kernel-lent buffers (`codec`).
//!   - Decode failures are per-transaction errors, never process-fatal.

#![deny(clippy::all)]

pub mod buf;
pub mod cmds;
pub mod codec;
pub mod driver;
pub mod out;
pub mod svcmgr;
pub mod thread;

pub use buf::StagingBuf;
pub use cmds::{Command, CommandStream, ParseError};
pub use codec::{CodecError, Message, MessageReader};
pub use driver::{DriverChannel, ExchangeStatus, DEFAULT_MAP_SIZE};
pub use out::CommandWriter;
pub use thread::ThreadContext;

/// Result alias for IPC runtime operations.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Errors produced by the IPC runtime.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// The device could not be opened or an ioctl failed outright.
    #[error("driver io: {0}")]
    Io(#[from] std::io::Error),
    /// The kernel speaks a different binder protocol version.
    #[error("driver protocol version {driver}, compiled for {compiled}")]
    VersionMismatch {
        /// Version reported by the driver.
        driver: i32,
        /// Version this crate was built against.
        compiled: i32,
    },
    /// Another process already holds the context-manager role.
    #[error("context manager role unavailable: {0}")]
    ContextManagerClaim(std::io::Error),
    /// The remote end of a synchronous call died before replying.
    #[error("target died before replying")]
    DeadReply,
    /// The driver could not deliver a transaction or reply.
    #[error("transaction delivery failed")]
    FailedReply,
    /// A synchronous call returned a negative status word.
    #[error("remote returned status {0}")]
    RemoteStatus(i32),
    /// Payload decode failed.
    #[error("payload: {0}")]
    Codec(#[from] CodecError),
    /// The driver return stream carried an unknown tag.
    #[error("command stream: {0}")]
    Parse(#[from] ParseError),
}
