// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: The context manager's dispatch loop
//!
//! One thread drains the driver's return stream and reacts to each command:
//! registry transactions are decoded, handled and answered; death events
//! tear down bindings; terminal commands end the loop. The next exchange is
//! not issued until every complete command from the previous one has been
//! handled, and trailing partial bytes survive in the staging buffer.
//!
//! INVARIANTS:
//!   - Every inbound transaction or reply buffer is freed exactly once, on
//!     success, rejection and one-way paths alike.
//!   - A transaction is answered only when it is not one-way, with either
//!     the reply payload or a single negative status word, never both.
//!   - Decode failures reject one transaction; only channel failures and
//!     terminal commands end the loop.

use binder_abi::{TransactionData, TransactionFlags};
use binder_ipc::svcmgr::{
    SERVICE_MANAGER_NAME, STATUS_FAILED, SVC_MGR_ADD_SERVICE, SVC_MGR_CHECK_SERVICE,
    SVC_MGR_GET_SERVICE, SVC_MGR_LIST_SERVICES,
};
use binder_ipc::{
    CodecError, Command, CommandStream, CommandWriter, ExchangeStatus, Message, MessageReader,
    ThreadContext,
};

use crate::config::Config;
use crate::death::{DeathKey, DeathTable};
use crate::registry::{name_matches, ServiceRegistry};
use crate::Error;

/// Why a single transaction was rejected. The caller always sees
/// [`STATUS_FAILED`]; the distinction is for the log.
#[derive(Debug)]
enum Reject {
    Malformed(CodecError),
    StrictMode(u32),
    BadTarget,
    NotFound,
    OutOfRange(u32),
    UnknownCode(u32),
}

impl std::fmt::Display for Reject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed payload: {err}"),
            Self::StrictMode(word) => write!(f, "strict-mode word {word:#x} is not off"),
            Self::BadTarget => write!(f, "target is not the service manager"),
            Self::NotFound => write!(f, "no such service"),
            Self::OutOfRange(index) => write!(f, "index {index} out of range"),
            Self::UnknownCode(code) => write!(f, "unknown request code {code}"),
        }
    }
}

/// The dispatch state machine and the state it routes to.
pub struct Dispatcher {
    registry: ServiceRegistry,
    deaths: DeathTable,
    reply: Message,
    done: bool,
}

impl Dispatcher {
    /// Creates a dispatcher sized by `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            deaths: DeathTable::new(),
            reply: Message::with_capacity(config.reply_capacity, config.reply_objects),
            done: false,
        }
    }

    /// The registry, for inspection.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// True once a terminal command has been observed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Claims the context-manager role and runs the loop to completion.
    ///
    /// Startup failures (the role claim, the thread cap) are errors and map
    /// to a non-zero exit. Once the loop is entered, channel failures and
    /// terminal commands end it in order and the run still returns `Ok`.
    pub fn run(&mut self, ctx: &mut ThreadContext) -> Result<(), Error> {
        ctx.channel().request_context_manager()?;
        // Zero keeps the driver from ever asking for extra looper threads.
        ctx.channel().set_max_threads(0)?;
        ctx.writer().enter_looper();
        log::info!("entering dispatch loop as context manager");

        while !self.done {
            match ctx.talk(true) {
                Ok(ExchangeStatus::Ok) => {}
                Ok(ExchangeStatus::Again) | Ok(ExchangeStatus::Timeout) => continue,
                Ok(ExchangeStatus::DeadObject) => {
                    log::error!("driver channel is dead");
                    break;
                }
                Err(err) => {
                    log::error!("exchange failed: {err}");
                    break;
                }
            }
            let consumed = {
                let (received, out) = ctx.io_parts();
                self.drain(received, out)
            };
            ctx.consume_in(consumed);
        }
        log::info!("dispatch loop finished");
        Ok(())
    }

    /// Handles every complete command in `received`, in delivery order.
    /// Returns the bytes consumed so the staging buffer can slide.
    ///
    /// An unknown tag is terminal: the stream offset can no longer be
    /// trusted, so the loop winds down instead of guessing.
    pub fn drain(&mut self, received: &[u8], out: &mut CommandWriter) -> usize {
        let mut stream = CommandStream::new(received);
        for item in stream.by_ref() {
            match item {
                Ok(cmd) => self.handle(cmd, out),
                Err(err) => {
                    log::error!("{err}");
                    self.done = true;
                }
            }
            if self.done {
                break;
            }
        }
        stream.consumed()
    }

    fn handle(&mut self, cmd: Command, out: &mut CommandWriter) {
        match cmd {
            Command::Noop | Command::Ok | Command::TransactionComplete => {}
            Command::Finished => {}
            Command::SpawnLooper => {
                // Should be suppressed by set_max_threads(0).
                log::warn!("driver requested a looper thread; ignoring");
            }
            Command::IncRefs(pc)
            | Command::Acquire(pc)
            | Command::Release(pc)
            | Command::DecRefs(pc) => {
                log::trace!("refcount command for local object {:#x}", pc.ptr);
            }
            Command::AcquireResult(status) => {
                log::trace!("acquire result {status}");
            }
            Command::Transaction(txn) => self.on_transaction(txn, out),
            Command::Reply(txn) => {
                // Stray reply on the dispatch thread: just return the buffer.
                out.free_buffer(txn.data_buffer);
            }
            Command::DeadBinder(cookie) => self.on_dead_binder(cookie, out),
            Command::ClearDeathNotificationDone(cookie) => {
                log::debug!("death registration {cookie:#x} cleared");
            }
            Command::Error(status) => {
                log::error!("driver reported error {status}");
                self.done = true;
            }
            Command::FailedReply => {
                log::error!("reply delivery failed, shutting down");
                self.done = true;
            }
            Command::DeadReply => {
                log::error!("reply target died, shutting down");
                self.done = true;
            }
        }
    }

    fn on_transaction(&mut self, txn: TransactionData, out: &mut CommandWriter) {
        let verdict = self.handle_registry_request(&txn, out);
        if !txn.is_one_way() {
            match verdict {
                Ok(()) => self.send_reply(out),
                Err(ref reject) => {
                    log::warn!("rejecting transaction code {}: {reject}", txn.code);
                    self.send_status(STATUS_FAILED, out);
                }
            }
        } else if let Err(reject) = verdict {
            log::warn!("dropping failed one-way transaction: {reject}");
        }
        // Single free site for the inbound buffer, on every path above.
        out.free_buffer(txn.data_buffer);
    }

    fn handle_registry_request(
        &mut self,
        txn: &TransactionData,
        out: &mut CommandWriter,
    ) -> Result<(), Reject> {
        self.reply.clear();
        // The buffer stays kernel-lent until the free below; the reader
        // never outlives this call.
        let mut msg = unsafe { MessageReader::from_transaction(txn) };

        let strict = msg.get_u32().map_err(Reject::Malformed)?;
        if strict != 0 {
            return Err(Reject::StrictMode(strict));
        }
        let target = msg.get_string().map_err(Reject::Malformed)?;
        if !name_matches(SERVICE_MANAGER_NAME, target) {
            return Err(Reject::BadTarget);
        }

        match txn.code {
            SVC_MGR_GET_SERVICE | SVC_MGR_CHECK_SERVICE => {
                let name = msg.get_string().map_err(Reject::Malformed)?;
                let binding = self.registry.find(name).ok_or(Reject::NotFound)?;
                if binding.handle() == 0 {
                    // Tombstone: the remote object died.
                    return Err(Reject::NotFound);
                }
                self.reply.put_object_handle(binding.handle()).map_err(Reject::Malformed)?;
            }
            SVC_MGR_ADD_SERVICE => {
                let name = msg.get_string().map_err(Reject::Malformed)?;
                let handle = msg.get_object_handle().map_err(Reject::Malformed)?;
                log::info!("binding {name:?} to handle {handle:#x}");
                self.registry.add_or_replace(name, handle, &mut self.deaths, out);
                self.reply.put_u32(0).map_err(Reject::Malformed)?;
            }
            SVC_MGR_LIST_SERVICES => {
                let index = msg.get_u32().map_err(Reject::Malformed)?;
                let binding = self
                    .registry
                    .get_by_index(index as usize)
                    .ok_or(Reject::OutOfRange(index))?;
                self.reply.put_string(binding.name()).map_err(Reject::Malformed)?;
            }
            code => return Err(Reject::UnknownCode(code)),
        }
        Ok(())
    }

    fn on_dead_binder(&mut self, cookie: u64, out: &mut CommandWriter) {
        match self.deaths.take(cookie) {
            Some(record) => {
                if !self.registry.tear_down_by_key(DeathKey::from_cookie(cookie), out) {
                    // Armed but unowned should be impossible; the arena and
                    // the registry are only ever updated together.
                    log::error!("death record for handle {:#x} has no binding", record.handle);
                }
            }
            None => log::warn!("stale death cookie {cookie:#x}"),
        }
        // The driver holds the notification pending until acked, stale or not.
        out.dead_binder_done(cookie);
    }

    fn send_reply(&mut self, out: &mut CommandWriter) {
        let txn = TransactionData {
            data_size: self.reply.data().len() as u64,
            offsets_size: self.reply.offsets().len() as u64,
            data_buffer: self.reply.data().as_ptr() as u64,
            data_offsets: self.reply.offsets().as_ptr() as u64,
            ..Default::default()
        };
        out.reply(&txn);
    }

    fn send_status(&mut self, status: i32, out: &mut CommandWriter) {
        self.reply.clear();
        if self.reply.put_u32(status as u32).is_err() {
            // Capacity of at least one word is guaranteed by construction.
            log::error!("reply buffer cannot hold a status word");
            return;
        }
        let txn = TransactionData {
            flags: TransactionFlags::STATUS_CODE.bits(),
            data_size: 4,
            data_buffer: self.reply.data().as_ptr() as u64,
            ..Default::default()
        };
        out.reply(&txn);
    }
}
