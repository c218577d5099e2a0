// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-thread driver state: channel plus staging buffers
//!
//! Dispatch is single-threaded by design, so one context is created by the
//! owning binary and passed down explicitly; there is no process global.

use binder_abi::WriteRead;

use crate::buf::StagingBuf;
use crate::driver::{DriverChannel, ExchangeStatus};
use crate::out::CommandWriter;
use crate::Result;

/// Default capacity of the inbound staging buffer.
pub const DEFAULT_STAGING_CAPACITY: usize = 256;

/// One thread's view of the driver: the channel, an inbound staging buffer
/// and the outbound command writer.
pub struct ThreadContext {
    channel: DriverChannel,
    in_buf: StagingBuf,
    out: CommandWriter,
}

impl ThreadContext {
    /// Wraps `channel` with default-sized staging.
    pub fn new(channel: DriverChannel) -> Self {
        Self::with_staging_capacity(channel, DEFAULT_STAGING_CAPACITY)
    }

    /// Wraps `channel` with an explicit staging capacity.
    pub fn with_staging_capacity(channel: DriverChannel, capacity: usize) -> Self {
        Self {
            channel,
            in_buf: StagingBuf::with_capacity(capacity),
            out: CommandWriter::new(),
        }
    }

    /// The owned channel.
    pub fn channel(&self) -> &DriverChannel {
        &self.channel
    }

    /// The outbound command writer.
    pub fn writer(&mut self) -> &mut CommandWriter {
        &mut self.out
    }

    /// Received bytes not yet consumed.
    pub fn in_filled(&self) -> &[u8] {
        self.in_buf.filled()
    }

    /// Simultaneous access to the received bytes and the writer, for
    /// callers that emit commands while walking the stream.
    pub fn io_parts(&mut self) -> (&[u8], &mut CommandWriter) {
        (self.in_buf.filled(), &mut self.out)
    }

    /// Drops `n` consumed bytes from the staging buffer, sliding any
    /// trailing partial record to the front.
    pub fn consume_in(&mut self, n: usize) {
        self.in_buf.consume(n);
    }

    /// One exchange with the driver: flushes the pending write buffer and,
    /// when `read` is set, blocks until the driver delivers work.
    pub fn talk(&mut self, read: bool) -> Result<ExchangeStatus> {
        let (read_buffer, read_size) = if read {
            let spare = self.in_buf.spare();
            (spare.as_mut_ptr() as u64, spare.len() as u64)
        } else {
            (0, 0)
        };
        let mut wr = WriteRead {
            write_size: self.out.len() as u64,
            write_consumed: 0,
            write_buffer: self.out.as_bytes().as_ptr() as u64,
            read_size,
            read_consumed: 0,
            read_buffer,
        };
        let status = self.channel.exchange(&mut wr)?;
        if status == ExchangeStatus::Ok {
            self.out.drain(wr.write_consumed as usize);
            self.in_buf.mark_filled(wr.read_consumed as usize);
        }
        Ok(status)
    }

    /// Pushes every queued command to the driver without reading.
    pub fn flush(&mut self) -> Result<()> {
        while !self.out.is_empty() {
            match self.talk(false)? {
                ExchangeStatus::Ok => {}
                ExchangeStatus::Again | ExchangeStatus::Timeout => continue,
                ExchangeStatus::DeadObject => break,
            }
        }
        Ok(())
    }

    /// Leaves the looper pool and flushes the farewell.
    pub fn shutdown(mut self) -> Result<()> {
        self.out.exit_looper();
        self.flush()
    }
}
