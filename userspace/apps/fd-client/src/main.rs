// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Sample client: resolves a service and hands it an open file
//!
//! Exercises the registry end to end — name resolution through the context
//! manager, then one synchronous transaction carrying a tag string, the
//! file descriptor and its length. The receiving service reads from the
//! duplicated descriptor; nothing is copied through the payload.

use std::error::Error;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::process::ExitCode;

use binder_ipc::{svcmgr, DriverChannel, Message, ThreadContext, DEFAULT_MAP_SIZE};

const FD_SERVICE_NAME: &str = "fd.service";
const DEFAULT_DEVICE: &str = "/dev/binderfs/cbinder";
const PAYLOAD_TAG: &str = "fd-payload";

fn main() -> ExitCode {
    env_logger::init();
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: fd-client <file>");
        return ExitCode::FAILURE;
    };
    match run(Path::new(&path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fd-client: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &Path) -> Result<(), Box<dyn Error>> {
    let file = File::open(path)?;
    let length = file.metadata()?.len();

    let channel = DriverChannel::open(Path::new(DEFAULT_DEVICE), DEFAULT_MAP_SIZE)?;
    let mut ctx = ThreadContext::new(channel);

    let handle = svcmgr::get_service(&mut ctx, FD_SERVICE_NAME)?;
    log::info!("resolved {FD_SERVICE_NAME} to handle {handle:#x}");

    let mut msg = Message::with_capacity(svcmgr::DEFAULT_CALL_CAPACITY, svcmgr::DEFAULT_CALL_OBJECTS);
    msg.put_string(PAYLOAD_TAG)?;
    msg.put_fd(file.as_raw_fd())?;
    msg.put_u32(u32::try_from(length)?)?;

    let reply = svcmgr::sync_call(&mut ctx, handle, 0, &msg)?;
    if let Some(status) = reply.status() {
        if status < 0 {
            log::warn!("service answered with status {status}");
        }
    }
    svcmgr::release_reply(&mut ctx, reply)?;

    ctx.writer().release(handle);
    ctx.shutdown()?;
    Ok(())
}
