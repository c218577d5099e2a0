// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Outbound command emission toward the driver
//!
//! All driver commands this process sends go through one typed writer, so
//! the refcount and buffer-lifecycle contracts (one acquire per ADD, one
//! release per teardown, one free per transaction buffer) have a single
//! emission point each.

use binder_abi::{
    HandleCookie, TransactionData, BC_ACQUIRE, BC_CLEAR_DEATH_NOTIFICATION, BC_DEAD_BINDER_DONE,
    BC_ENTER_LOOPER, BC_EXIT_LOOPER, BC_FREE_BUFFER, BC_RELEASE, BC_REPLY,
    BC_REQUEST_DEATH_NOTIFICATION, BC_TRANSACTION,
};

/// Builder for the write half of a driver exchange.
#[derive(Default)]
pub struct CommandWriter {
    buf: Vec<u8>,
}

impl CommandWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of pending bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops `n` bytes the driver consumed from the front.
    pub fn drain(&mut self, n: usize) {
        self.buf.drain(..n.min(self.buf.len()));
    }

    fn tag(&mut self, tag: u32) {
        self.buf.extend_from_slice(&tag.to_ne_bytes());
    }

    /// Marks the calling thread as the looper.
    pub fn enter_looper(&mut self) {
        self.tag(BC_ENTER_LOOPER);
    }

    /// Removes the calling thread from the looper pool.
    pub fn exit_looper(&mut self) {
        self.tag(BC_EXIT_LOOPER);
    }

    /// Takes a strong reference on a remote handle.
    pub fn acquire(&mut self, handle: u32) {
        self.tag(BC_ACQUIRE);
        self.buf.extend_from_slice(&handle.to_ne_bytes());
    }

    /// Drops a strong reference on a remote handle.
    pub fn release(&mut self, handle: u32) {
        self.tag(BC_RELEASE);
        self.buf.extend_from_slice(&handle.to_ne_bytes());
    }

    /// Returns a kernel-lent transaction buffer.
    pub fn free_buffer(&mut self, buffer: u64) {
        self.tag(BC_FREE_BUFFER);
        self.buf.extend_from_slice(&buffer.to_ne_bytes());
    }

    /// Registers for a death notification keyed by `cookie`.
    pub fn request_death_notification(&mut self, handle: u32, cookie: u64) {
        self.tag(BC_REQUEST_DEATH_NOTIFICATION);
        self.buf.extend_from_slice(&HandleCookie { handle, cookie }.to_bytes());
    }

    /// Withdraws a death-notification registration.
    pub fn clear_death_notification(&mut self, handle: u32, cookie: u64) {
        self.tag(BC_CLEAR_DEATH_NOTIFICATION);
        self.buf.extend_from_slice(&HandleCookie { handle, cookie }.to_bytes());
    }

    /// Acknowledges a delivered death notification.
    pub fn dead_binder_done(&mut self, cookie: u64) {
        self.tag(BC_DEAD_BINDER_DONE);
        self.buf.extend_from_slice(&cookie.to_ne_bytes());
    }

    /// Queues an outbound transaction.
    ///
    /// The data and offsets regions `txn` points at must stay alive and
    /// unmoved until the writer has been flushed to the driver.
    pub fn transaction(&mut self, txn: &TransactionData) {
        self.tag(BC_TRANSACTION);
        self.buf.extend_from_slice(&txn.to_bytes());
    }

    /// Queues the reply for the transaction currently being handled.
    ///
    /// Same aliveness requirement as [`CommandWriter::transaction`].
    pub fn reply(&mut self, txn: &TransactionData) {
        self.tag(BC_REPLY);
        self.buf.extend_from_slice(&txn.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitted_layout_is_tag_then_payload() {
        let mut writer = CommandWriter::new();
        writer.enter_looper();
        writer.acquire(7);
        writer.free_buffer(0x1000);

        let bytes = writer.as_bytes();
        assert_eq!(&bytes[0..4], &BC_ENTER_LOOPER.to_ne_bytes());
        assert_eq!(&bytes[4..8], &BC_ACQUIRE.to_ne_bytes());
        assert_eq!(&bytes[8..12], &7u32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &BC_FREE_BUFFER.to_ne_bytes());
        assert_eq!(&bytes[16..24], &0x1000u64.to_ne_bytes());
    }

    #[test]
    fn death_registration_is_packed() {
        let mut writer = CommandWriter::new();
        writer.request_death_notification(3, 0x99);
        // 4 tag + 12 packed handle/cookie record.
        assert_eq!(writer.len(), 16);
        assert_eq!(&writer.as_bytes()[4..8], &3u32.to_ne_bytes());
        assert_eq!(&writer.as_bytes()[8..16], &0x99u64.to_ne_bytes());
    }

    #[test]
    fn drain_drops_consumed_prefix() {
        let mut writer = CommandWriter::new();
        writer.enter_looper();
        writer.release(2);
        writer.drain(4);
        assert_eq!(&writer.as_bytes()[0..4], &BC_RELEASE.to_ne_bytes());
        writer.drain(100);
        assert!(writer.is_empty());
    }
}
