// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Property tests for registry replace semantics and refcount
//! symmetry over arbitrary ADD sequences

mod common;

use binder_abi::{BC_ACQUIRE, BC_RELEASE};
use binder_ipc::CommandWriter;
use binderd::{DeathTable, ServiceRegistry};
use proptest::prelude::*;

use common::{handle_payloads, walk_bc};

// Names chosen so none is a prefix of another; the stored-length-bounded
// lookup would otherwise conflate them.
const NAMES: [&str; 3] = ["svc.alpha", "svc.beta", "svc.gamma"];

proptest! {
    #[test]
    fn find_returns_last_added_handle(
        sequence in proptest::collection::vec((0usize..3, 1u32..64), 1..24)
    ) {
        let mut registry = ServiceRegistry::new();
        let mut deaths = DeathTable::new();
        let mut out = CommandWriter::new();

        let mut expected: [Option<u32>; 3] = [None; 3];
        for &(which, handle) in &sequence {
            registry.add_or_replace(NAMES[which], handle, &mut deaths, &mut out);
            expected[which] = Some(handle);
        }

        for (which, name) in NAMES.iter().enumerate() {
            match expected[which] {
                Some(handle) => {
                    prop_assert_eq!(registry.find(name).unwrap().handle(), handle);
                }
                None => prop_assert!(registry.find(name).is_none()),
            }
        }
        // One binding per distinct name ever added.
        let distinct = expected.iter().filter(|e| e.is_some()).count();
        prop_assert_eq!(registry.len(), distinct);
    }

    #[test]
    fn acquires_and_releases_balance_over_full_lifetimes(
        sequence in proptest::collection::vec((0usize..3, 1u32..64), 1..24)
    ) {
        let mut registry = ServiceRegistry::new();
        let mut deaths = DeathTable::new();
        let mut out = CommandWriter::new();

        for &(which, handle) in &sequence {
            registry.add_or_replace(NAMES[which], handle, &mut deaths, &mut out);
        }

        // End every remaining lifetime with a death event.
        let mut keys = Vec::new();
        for index in 0..registry.len() {
            let binding = registry.get_by_index(index).unwrap();
            if binding.handle() != 0 {
                keys.push(binding.death_key());
            }
        }
        for key in keys {
            prop_assert!(deaths.take(key.cookie()).is_some());
            prop_assert!(registry.tear_down_by_key(key, &mut out));
        }

        let records = walk_bc(out.as_bytes());
        let mut acquired = handle_payloads(&records, BC_ACQUIRE);
        let mut released = handle_payloads(&records, BC_RELEASE);
        acquired.sort_unstable();
        released.sort_unstable();
        prop_assert_eq!(acquired, released);
        prop_assert!(deaths.is_empty());
    }
}
