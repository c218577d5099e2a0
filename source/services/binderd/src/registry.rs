// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Ordered name-to-handle bindings held by the context manager
//!
//! Bindings are prepended on creation, so enumeration order is
//! newest-first. A binding is never removed: a death event zeros its handle
//! and leaves the name in place as a tombstone until a re-registration
//! replaces it.
//!
//! INVARIANTS:
//!   - Exactly one acquire per successful add, exactly one release per
//!     teardown (replace or death) of a live handle.
//!   - Every live binding has exactly one armed death registration.

use binder_ipc::CommandWriter;

use crate::death::{DeathKey, DeathTable};

/// One name-to-handle binding.
pub struct ServiceBinding {
    name: String,
    handle: u32,
    death: DeathKey,
}

impl ServiceBinding {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound handle; 0 marks a tombstone whose remote object died.
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Key of the outstanding death registration.
    pub fn death_key(&self) -> DeathKey {
        self.death
    }
}

/// The registry: an ordered list of bindings.
#[derive(Default)]
pub struct ServiceRegistry {
    bindings: Vec<ServiceBinding>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bindings, tombstones included.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True when nothing was ever registered.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Looks up `query`, first match in insertion order wins.
    ///
    /// Compares only the first `len(stored)` bytes of the query, so a query
    /// that starts with a stored name matches it. Kept byte-for-byte for
    /// wire compatibility; see DESIGN.md.
    pub fn find(&self, query: &str) -> Option<&ServiceBinding> {
        self.bindings.iter().find(|binding| name_matches(&binding.name, query))
    }

    /// Zero-based positional access in newest-first order.
    pub fn get_by_index(&self, index: usize) -> Option<&ServiceBinding> {
        self.bindings.get(index)
    }

    /// Binds `name` to `handle`, replacing any existing binding.
    ///
    /// A replaced binding's old handle gets exactly one teardown (release,
    /// death unlink, arena disarm) before the new handle takes effect. The
    /// new handle is acquired and armed either way.
    pub fn add_or_replace(
        &mut self,
        name: &str,
        handle: u32,
        deaths: &mut DeathTable,
        out: &mut CommandWriter,
    ) {
        if let Some(binding) = self.bindings.iter_mut().find(|b| name_matches(&b.name, name)) {
            log::warn!("service {:?} already bound, replacing handle {:#x}", binding.name, binding.handle);
            tear_down(binding, deaths, out);
            binding.handle = handle;
            arm(binding, deaths, out);
        } else {
            let mut binding = ServiceBinding {
                name: name.to_owned(),
                handle,
                death: DeathKey::UNARMED,
            };
            arm(&mut binding, deaths, out);
            self.bindings.insert(0, binding);
        }
    }

    /// Applies a death event already taken out of the arena: releases the
    /// bound handle if still live and tombstones the binding.
    ///
    /// Returns false when no binding holds `key` (stale event).
    pub fn tear_down_by_key(&mut self, key: DeathKey, out: &mut CommandWriter) -> bool {
        let Some(binding) = self.bindings.iter_mut().find(|b| b.death == key) else {
            return false;
        };
        if binding.handle != 0 {
            log::info!("service {:?} died, dropping handle {:#x}", binding.name, binding.handle);
            out.release(binding.handle);
            binding.handle = 0;
        }
        binding.death = DeathKey::UNARMED;
        true
    }
}

// Stored-length-bounded comparison shared by lookup and the dispatcher's
// target-name check.
pub(crate) fn name_matches(stored: &str, query: &str) -> bool {
    query.as_bytes().len() >= stored.len() && &query.as_bytes()[..stored.len()] == stored.as_bytes()
}

fn tear_down(binding: &mut ServiceBinding, deaths: &mut DeathTable, out: &mut CommandWriter) {
    if binding.handle != 0 {
        out.release(binding.handle);
        out.clear_death_notification(binding.handle, binding.death.cookie());
    }
    deaths.take(binding.death.cookie());
    binding.death = DeathKey::UNARMED;
}

fn arm(binding: &mut ServiceBinding, deaths: &mut DeathTable, out: &mut CommandWriter) {
    out.acquire(binding.handle);
    let key = deaths.arm(binding.handle);
    binding.death = key;
    out.request_death_notification(binding.handle, key.cookie());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (ServiceRegistry, DeathTable, CommandWriter) {
        (ServiceRegistry::new(), DeathTable::new(), CommandWriter::new())
    }

    #[test]
    fn add_then_find_returns_handle() {
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("fd.service", 7, &mut deaths, &mut out);
        assert_eq!(registry.find("fd.service").unwrap().handle(), 7);
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn replace_keeps_one_binding_with_new_handle() {
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("fd.service", 7, &mut deaths, &mut out);
        registry.add_or_replace("fd.service", 9, &mut deaths, &mut out);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("fd.service").unwrap().handle(), 9);
        // The replaced registration is gone; only the new one is armed.
        assert_eq!(deaths.len(), 1);
    }

    #[test]
    fn enumeration_is_newest_first() {
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("first", 1, &mut deaths, &mut out);
        registry.add_or_replace("second", 2, &mut deaths, &mut out);
        assert_eq!(registry.get_by_index(0).unwrap().name(), "second");
        assert_eq!(registry.get_by_index(1).unwrap().name(), "first");
        assert!(registry.get_by_index(2).is_none());
    }

    #[test]
    fn find_matches_on_stored_prefix() {
        // Documented compatibility hazard: the stored name's length bounds
        // the comparison, so a longer query still matches.
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("fd", 3, &mut deaths, &mut out);
        assert_eq!(registry.find("fd.service").unwrap().handle(), 3);
        // A query shorter than the stored name does not match.
        assert!(registry.find("f").is_none());
    }

    #[test]
    fn first_match_wins_in_insertion_order() {
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("net", 1, &mut deaths, &mut out);
        registry.add_or_replace("net.wifi", 2, &mut deaths, &mut out);
        // "net.wifi" is newer and scanned first; the query matches it on
        // the stored-prefix rule before ever reaching "net".
        assert_eq!(registry.find("net.wifi").unwrap().handle(), 2);
        // A bare "net" query cannot match "net.wifi" and falls through.
        assert_eq!(registry.find("net").unwrap().handle(), 1);
    }

    #[test]
    fn death_tombstones_but_keeps_name_enumerable() {
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("fd.service", 7, &mut deaths, &mut out);
        let key = registry.find("fd.service").unwrap().death_key();

        assert!(deaths.take(key.cookie()).is_some());
        assert!(registry.tear_down_by_key(key, &mut out));

        let binding = registry.get_by_index(0).unwrap();
        assert_eq!(binding.name(), "fd.service");
        assert_eq!(binding.handle(), 0);
    }

    #[test]
    fn stale_key_tears_down_nothing() {
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("fd.service", 7, &mut deaths, &mut out);
        let before = out.len();
        assert!(!registry.tear_down_by_key(DeathKey::from_cookie(0xdead), &mut out));
        assert_eq!(out.len(), before);
        let _ = deaths;
    }

    #[test]
    fn readd_after_death_rearms() {
        let (mut registry, mut deaths, mut out) = fixture();
        registry.add_or_replace("fd.service", 7, &mut deaths, &mut out);
        let key = registry.find("fd.service").unwrap().death_key();
        deaths.take(key.cookie());
        registry.tear_down_by_key(key, &mut out);

        registry.add_or_replace("fd.service", 11, &mut deaths, &mut out);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("fd.service").unwrap().handle(), 11);
        assert_eq!(deaths.len(), 1);
        assert_ne!(registry.find("fd.service").unwrap().death_key(), key);
    }
}
