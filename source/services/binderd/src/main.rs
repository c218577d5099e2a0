// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: binderd entrypoint wiring config, provisioning and the loop

use std::process::ExitCode;

use binder_ipc::{DriverChannel, ThreadContext};
use binderd::{provision, Config, Dispatcher};

fn main() -> ExitCode {
    env_logger::init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("binderd: {err}");
            return ExitCode::FAILURE;
        }
    };

    provision::ensure_device(&config);

    let channel = match DriverChannel::open(&config.device, config.map_size) {
        Ok(channel) => channel,
        Err(err) => {
            log::error!("binderd: open {}: {err}", config.device.display());
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = ThreadContext::new(channel);
    let mut dispatcher = Dispatcher::new(&config);
    let outcome = dispatcher.run(&mut ctx);
    if let Err(err) = ctx.shutdown() {
        log::warn!("binderd: shutdown: {err}");
    }
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("binderd: {err}");
            ExitCode::FAILURE
        }
    }
}
