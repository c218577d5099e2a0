// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Arena of outstanding death-notification registrations
//!
//! The kernel echoes back whatever cookie was supplied at registration
//! time. Cookies here are opaque monotonically-allocated keys into this
//! table — never addresses — so relocating a binding can't invalidate an
//! outstanding registration, and a stale echo resolves to nothing instead
//! of a dangling pointer. Keys are not reused within a process lifetime.

use std::collections::BTreeMap;

/// Opaque key identifying one death registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeathKey(u64);

impl DeathKey {
    /// Marker for a binding with no outstanding registration.
    pub const UNARMED: DeathKey = DeathKey(0);

    /// Raw cookie value handed to the kernel.
    pub fn cookie(self) -> u64 {
        self.0
    }

    /// Reconstructs a key from an echoed cookie.
    pub fn from_cookie(raw: u64) -> Self {
        Self(raw)
    }
}

/// One armed registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeathRecord {
    /// Handle the registration guards.
    pub handle: u32,
}

/// Table of armed registrations keyed by cookie.
#[derive(Default)]
pub struct DeathTable {
    next: u64,
    records: BTreeMap<u64, DeathRecord>,
}

impl DeathTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self { next: 0, records: BTreeMap::new() }
    }

    /// Arms a registration for `handle` and returns its key.
    pub fn arm(&mut self, handle: u32) -> DeathKey {
        self.next += 1;
        self.records.insert(self.next, DeathRecord { handle });
        DeathKey(self.next)
    }

    /// Disarms and returns the registration for `cookie`, if armed.
    ///
    /// Each key can be taken at most once; a second take (a replayed or
    /// stale death event) yields `None`.
    pub fn take(&mut self, cookie: u64) -> Option<DeathRecord> {
        self.records.remove(&cookie)
    }

    /// True when `cookie` is armed.
    pub fn is_armed(&self, cookie: u64) -> bool {
        self.records.contains_key(&cookie)
    }

    /// Number of armed registrations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no registration is armed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
