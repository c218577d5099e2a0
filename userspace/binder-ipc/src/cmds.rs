// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Typed parser over the driver's concatenated return stream
//!
//! The driver delivers `(tag: u32, payload: fixed-by-tag)` records back to
//! back in one read buffer. Decoding happens once, here, into a closed
//! variant type so the dispatcher's state machine is an exhaustive match.
//!
//! INVARIANTS:
//!   - A record is consumed only when its full payload is present; trailing
//!     partial bytes stay unconsumed and are reported via `consumed()`.
//!   - Unknown tags surface as a typed error, never a silent skip.

use binder_abi::{
    PtrCookie, TransactionData, BR_ACQUIRE, BR_ACQUIRE_RESULT, BR_CLEAR_DEATH_NOTIFICATION_DONE,
    BR_DEAD_BINDER, BR_DEAD_REPLY, BR_DECREFS, BR_ERROR, BR_FAILED_REPLY, BR_FINISHED, BR_INCREFS,
    BR_NOOP, BR_OK, BR_RELEASE, BR_REPLY, BR_SPAWN_LOOPER, BR_TRANSACTION,
    BR_TRANSACTION_COMPLETE,
};

/// One decoded driver return command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Padding; carries nothing.
    Noop,
    /// No-payload success marker.
    Ok,
    /// Driver-reported error status.
    Error(i32),
    /// An outbound transaction or reply was accepted.
    TransactionComplete,
    /// Weak increment request for a local object.
    IncRefs(PtrCookie),
    /// Strong increment request for a local object.
    Acquire(PtrCookie),
    /// Strong decrement request for a local object.
    Release(PtrCookie),
    /// Weak decrement request for a local object.
    DecRefs(PtrCookie),
    /// Result of an attempted acquire.
    AcquireResult(i32),
    /// Inbound transaction addressed to this process.
    Transaction(TransactionData),
    /// Reply to a transaction this process sent.
    Reply(TransactionData),
    /// A watched remote object died; carries the registration cookie.
    DeadBinder(u64),
    /// A death-notification registration was withdrawn.
    ClearDeathNotificationDone(u64),
    /// The driver wants another looper thread.
    SpawnLooper,
    /// Looper teardown marker.
    Finished,
    /// The target of an outbound transaction died before replying.
    DeadReply,
    /// An outbound transaction or reply could not be delivered.
    FailedReply,
}

/// Error for a tag this process does not understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown driver command {0:#010x}")]
pub struct ParseError(pub u32);

/// Lazy, finite, non-restartable walk over one received buffer.
pub struct CommandStream<'buf> {
    buf: &'buf [u8],
    pos: usize,
}

impl<'buf> CommandStream<'buf> {
    /// Starts a walk over `buf`.
    pub fn new(buf: &'buf [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed by fully-parsed records so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn take_arr<const N: usize>(&self, at: usize) -> Option<[u8; N]> {
        let end = at.checked_add(N)?;
        if end > self.buf.len() {
            return None;
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[at..end]);
        Some(out)
    }
}

impl Iterator for CommandStream<'_> {
    type Item = Result<Command, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = u32::from_ne_bytes(self.take_arr::<4>(self.pos)?);
        if !is_return_tag(tag) {
            // Report before the completeness check: a garbage tag must not
            // masquerade as a partial record and stall the stream.
            return Some(Err(ParseError(tag)));
        }
        let payload_len = binder_abi::ioc_size(tag);
        let body = self.pos + 4;
        if body + payload_len > self.buf.len() {
            // Partial record: leave it for the next exchange.
            return None;
        }

        let cmd = match tag {
            t if t == BR_NOOP => Command::Noop,
            t if t == BR_OK => Command::Ok,
            t if t == BR_ERROR => {
                Command::Error(i32::from_ne_bytes(self.take_arr::<4>(body)?))
            }
            t if t == BR_TRANSACTION_COMPLETE => Command::TransactionComplete,
            t if t == BR_INCREFS => Command::IncRefs(PtrCookie::from_bytes(&self.take_arr(body)?)),
            t if t == BR_ACQUIRE => Command::Acquire(PtrCookie::from_bytes(&self.take_arr(body)?)),
            t if t == BR_RELEASE => Command::Release(PtrCookie::from_bytes(&self.take_arr(body)?)),
            t if t == BR_DECREFS => Command::DecRefs(PtrCookie::from_bytes(&self.take_arr(body)?)),
            t if t == BR_ACQUIRE_RESULT => {
                Command::AcquireResult(i32::from_ne_bytes(self.take_arr::<4>(body)?))
            }
            t if t == BR_TRANSACTION => {
                Command::Transaction(TransactionData::from_bytes(&self.take_arr(body)?))
            }
            t if t == BR_REPLY => Command::Reply(TransactionData::from_bytes(&self.take_arr(body)?)),
            t if t == BR_DEAD_BINDER => {
                Command::DeadBinder(u64::from_ne_bytes(self.take_arr::<8>(body)?))
            }
            t if t == BR_CLEAR_DEATH_NOTIFICATION_DONE => {
                Command::ClearDeathNotificationDone(u64::from_ne_bytes(self.take_arr::<8>(body)?))
            }
            t if t == BR_SPAWN_LOOPER => Command::SpawnLooper,
            t if t == BR_FINISHED => Command::Finished,
            t if t == BR_DEAD_REPLY => Command::DeadReply,
            t if t == BR_FAILED_REPLY => Command::FailedReply,
            unknown => return Some(Err(ParseError(unknown))),
        };

        self.pos = body + payload_len;
        Some(Ok(cmd))
    }
}

fn is_return_tag(tag: u32) -> bool {
    tag == BR_NOOP
        || tag == BR_OK
        || tag == BR_ERROR
        || tag == BR_TRANSACTION_COMPLETE
        || tag == BR_INCREFS
        || tag == BR_ACQUIRE
        || tag == BR_RELEASE
        || tag == BR_DECREFS
        || tag == BR_ACQUIRE_RESULT
        || tag == BR_TRANSACTION
        || tag == BR_REPLY
        || tag == BR_DEAD_BINDER
        || tag == BR_CLEAR_DEATH_NOTIFICATION_DONE
        || tag == BR_SPAWN_LOOPER
        || tag == BR_FINISHED
        || tag == BR_DEAD_REPLY
        || tag == BR_FAILED_REPLY
}

#[cfg(test)]
mod tests {
    use super::*;
    use binder_abi::BC_ENTER_LOOPER;

    fn push_tag(buf: &mut Vec<u8>, tag: u32) {
        buf.extend_from_slice(&tag.to_ne_bytes());
    }

    #[test]
    fn drains_multiple_commands_in_order() {
        let mut buf = Vec::new();
        push_tag(&mut buf, BR_NOOP);
        push_tag(&mut buf, BR_TRANSACTION_COMPLETE);
        push_tag(&mut buf, BR_DEAD_BINDER);
        buf.extend_from_slice(&0x55u64.to_ne_bytes());

        let mut stream = CommandStream::new(&buf);
        assert_eq!(stream.next(), Some(Ok(Command::Noop)));
        assert_eq!(stream.next(), Some(Ok(Command::TransactionComplete)));
        assert_eq!(stream.next(), Some(Ok(Command::DeadBinder(0x55))));
        assert_eq!(stream.next(), None);
        assert_eq!(stream.consumed(), buf.len());
    }

    #[test]
    fn partial_record_is_left_unconsumed() {
        let mut buf = Vec::new();
        push_tag(&mut buf, BR_NOOP);
        push_tag(&mut buf, BR_TRANSACTION);
        buf.extend_from_slice(&[0u8; 10]); // 10 of 64 payload bytes

        let mut stream = CommandStream::new(&buf);
        assert_eq!(stream.next(), Some(Ok(Command::Noop)));
        assert_eq!(stream.next(), None);
        assert_eq!(stream.consumed(), 4);
    }

    #[test]
    fn bare_partial_tag_is_not_consumed() {
        let buf = [0x0cu8, 0x72]; // two bytes of a tag
        let mut stream = CommandStream::new(&buf);
        assert_eq!(stream.next(), None);
        assert_eq!(stream.consumed(), 0);
    }

    #[test]
    fn transaction_payload_is_decoded() {
        let txn = TransactionData {
            target: 0,
            code: 3,
            flags: 0x10,
            data_size: 32,
            ..Default::default()
        };
        let mut buf = Vec::new();
        push_tag(&mut buf, BR_TRANSACTION);
        buf.extend_from_slice(&txn.to_bytes());

        let mut stream = CommandStream::new(&buf);
        assert_eq!(stream.next(), Some(Ok(Command::Transaction(txn))));
        assert_eq!(stream.consumed(), 4 + TransactionData::SIZE);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        // A BC tag is not valid in the return direction.
        let mut buf = Vec::new();
        push_tag(&mut buf, BC_ENTER_LOOPER);
        let mut stream = CommandStream::new(&buf);
        assert_eq!(stream.next(), Some(Err(ParseError(BC_ENTER_LOOPER))));
    }

    #[test]
    fn garbage_tag_with_large_size_bits_still_errors() {
        let mut buf = Vec::new();
        push_tag(&mut buf, 0xffff_ffff);
        let mut stream = CommandStream::new(&buf);
        assert_eq!(stream.next(), Some(Err(ParseError(0xffff_ffff))));
    }

    #[test]
    fn error_command_carries_status() {
        let mut buf = Vec::new();
        push_tag(&mut buf, BR_ERROR);
        buf.extend_from_slice(&(-11i32).to_ne_bytes());
        let mut stream = CommandStream::new(&buf);
        assert_eq!(stream.next(), Some(Ok(Command::Error(-11))));
    }
}
