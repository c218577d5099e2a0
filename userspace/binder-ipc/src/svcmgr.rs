// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Client half of the registry wire protocol
//!
//! Every process resolves names through the context manager at handle 0.
//! Requests open with a strict-mode word (must be 0) and the well-known
//! manager name; the request code selects the operation. Replies carry an
//! object reference (GET/CHECK), a zero word (ADD), a name string (LIST) or
//! a single negative status word on failure.

use binder_abi::{TransactionData, TransactionFlags, CONTEXT_MANAGER_HANDLE};

use crate::cmds::{Command, CommandStream};
use crate::codec::{Message, MessageReader};
use crate::driver::ExchangeStatus;
use crate::thread::ThreadContext;
use crate::{IpcError, Result};

/// Well-known name the context manager answers to.
pub const SERVICE_MANAGER_NAME: &str = "binder.servicemanager";

/// Resolve a name to a handle, waiting for the service if needed.
pub const SVC_MGR_GET_SERVICE: u32 = 1;
/// Resolve a name to a handle without waiting.
pub const SVC_MGR_CHECK_SERVICE: u32 = 2;
/// Bind a name to the caller's object.
pub const SVC_MGR_ADD_SERVICE: u32 = 3;
/// Fetch the bound name at a zero-based index.
pub const SVC_MGR_LIST_SERVICES: u32 = 4;

/// Success status word.
pub const STATUS_OK: i32 = 0;
/// Generic failure status word carried in rejection replies.
pub const STATUS_FAILED: i32 = -1;

/// Payload capacity for client-side request/reply messages.
pub const DEFAULT_CALL_CAPACITY: usize = 512;
/// Object capacity for client-side request messages.
pub const DEFAULT_CALL_OBJECTS: usize = 8;

/// A received reply holding a kernel-lent buffer.
///
/// Must be returned with [`release_reply`] exactly once.
pub struct Reply {
    txn: TransactionData,
}

impl Reply {
    /// The raw reply transaction.
    pub fn transaction(&self) -> &TransactionData {
        &self.txn
    }

    /// The negative status word, when the sender failed the transaction.
    pub fn status(&self) -> Option<i32> {
        if !self.txn.transaction_flags().contains(TransactionFlags::STATUS_CODE)
            || self.txn.data_size < 4
        {
            return None;
        }
        let mut word = [0u8; 4];
        // The buffer stays kernel-lent until release_reply; four bytes at its
        // start are present whenever STATUS_CODE is set.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.txn.data_buffer as *const u8,
                word.as_mut_ptr(),
                4,
            );
        }
        Some(i32::from_ne_bytes(word))
    }

    /// Typed reader over the reply payload.
    pub fn reader(&self) -> MessageReader<'_> {
        unsafe { MessageReader::from_transaction(&self.txn) }
    }
}

/// Sends `msg` to `target` and blocks until the matching reply arrives.
///
/// Retryable exchange statuses are retried internally; `DEAD_REPLY` and
/// `FAILED_REPLY` surface as errors. Stray inbound buffers observed while
/// waiting are freed so nothing leaks.
pub fn sync_call(
    ctx: &mut ThreadContext,
    target: u32,
    code: u32,
    msg: &Message,
) -> Result<Reply> {
    let txn = TransactionData {
        target: target as u64,
        code,
        flags: TransactionFlags::ACCEPT_FDS.bits(),
        data_size: msg.data().len() as u64,
        offsets_size: msg.offsets().len() as u64,
        data_buffer: msg.data().as_ptr() as u64,
        data_offsets: msg.offsets().as_ptr() as u64,
        ..Default::default()
    };
    ctx.writer().transaction(&txn);

    loop {
        match ctx.talk(true)? {
            ExchangeStatus::Ok => {}
            ExchangeStatus::Again | ExchangeStatus::Timeout => continue,
            ExchangeStatus::DeadObject => return Err(IpcError::DeadReply),
        }

        let mut outcome: Option<Result<Reply>> = None;
        let mut stray_buffers: Vec<u64> = Vec::new();
        let consumed;
        {
            let mut stream = CommandStream::new(ctx.in_filled());
            for item in stream.by_ref() {
                match item {
                    Err(err) => {
                        outcome = Some(Err(err.into()));
                        break;
                    }
                    Ok(Command::Reply(reply_txn)) => {
                        outcome = Some(Ok(Reply { txn: reply_txn }));
                        break;
                    }
                    Ok(Command::DeadReply) => {
                        outcome = Some(Err(IpcError::DeadReply));
                        break;
                    }
                    Ok(Command::FailedReply) => {
                        outcome = Some(Err(IpcError::FailedReply));
                        break;
                    }
                    Ok(Command::Transaction(stray)) => {
                        // Clients are not transaction targets; return the
                        // buffer rather than leak it.
                        log::warn!("unexpected inbound transaction on client thread");
                        stray_buffers.push(stray.data_buffer);
                    }
                    Ok(_) => {}
                }
            }
            consumed = stream.consumed();
        }
        ctx.consume_in(consumed);
        for buffer in stray_buffers {
            ctx.writer().free_buffer(buffer);
        }
        if let Some(outcome) = outcome {
            return outcome;
        }
    }
}

/// Returns a reply's kernel buffer and flushes the command.
pub fn release_reply(ctx: &mut ThreadContext, reply: Reply) -> Result<()> {
    ctx.writer().free_buffer(reply.txn.data_buffer);
    ctx.flush()
}

fn request(name: &str) -> Result<Message> {
    let mut msg = Message::with_capacity(DEFAULT_CALL_CAPACITY, DEFAULT_CALL_OBJECTS);
    msg.put_u32(0)?; // strict-mode off
    msg.put_string(SERVICE_MANAGER_NAME)?;
    msg.put_string(name)?;
    Ok(msg)
}

fn resolve(ctx: &mut ThreadContext, code: u32, name: &str) -> Result<u32> {
    let msg = request(name)?;
    let reply = sync_call(ctx, CONTEXT_MANAGER_HANDLE, code, &msg)?;
    let handle = match reply.status() {
        Some(status) if status < 0 => Err(IpcError::RemoteStatus(status)),
        _ => {
            let mut reader = reply.reader();
            reader.get_object_handle().map_err(IpcError::from)
        }
    };
    release_reply(ctx, reply)?;
    handle
}

/// Resolves `name` to a handle.
pub fn get_service(ctx: &mut ThreadContext, name: &str) -> Result<u32> {
    resolve(ctx, SVC_MGR_GET_SERVICE, name)
}

/// Resolves `name` to a handle without waiting for registration.
pub fn check_service(ctx: &mut ThreadContext, name: &str) -> Result<u32> {
    resolve(ctx, SVC_MGR_CHECK_SERVICE, name)
}

/// Binds `name` to the caller's local object.
pub fn add_service(ctx: &mut ThreadContext, name: &str, object: u64, cookie: u64) -> Result<()> {
    let mut msg = request(name)?;
    msg.put_binder(object, cookie)?;
    let reply = sync_call(ctx, CONTEXT_MANAGER_HANDLE, SVC_MGR_ADD_SERVICE, &msg)?;
    let status = reply.status();
    release_reply(ctx, reply)?;
    match status {
        Some(code) if code < 0 => Err(IpcError::RemoteStatus(code)),
        _ => Ok(()),
    }
}

/// Fetches the bound name at `index`; `None` once past the end.
pub fn list_service(ctx: &mut ThreadContext, index: u32) -> Result<Option<String>> {
    let mut msg = Message::with_capacity(DEFAULT_CALL_CAPACITY, 0);
    msg.put_u32(0)?;
    msg.put_string(SERVICE_MANAGER_NAME)?;
    msg.put_u32(index)?;
    let reply = sync_call(ctx, CONTEXT_MANAGER_HANDLE, SVC_MGR_LIST_SERVICES, &msg)?;
    let name = match reply.status() {
        Some(status) if status < 0 => Ok(None),
        _ => {
            let mut reader = reply.reader();
            reader.get_string().map(|s| Some(s.to_owned())).map_err(IpcError::from)
        }
    };
    release_reply(ctx, reply)?;
    name
}
