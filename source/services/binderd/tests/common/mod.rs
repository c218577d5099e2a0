// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for daemon tests: building driver return streams and
//! walking the emitted command stream.

// Each integration test pulls in a different subset.
#![allow(dead_code)]

use binder_abi::TransactionData;
use binder_ipc::Message;

/// Splits an outbound command buffer into `(tag, payload)` records using
/// the size encoded in each tag, the same rule the driver applies.
pub fn walk_bc(buf: &[u8]) -> Vec<(u32, Vec<u8>)> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos + 4 <= buf.len() {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&buf[pos..pos + 4]);
        let tag = u32::from_ne_bytes(tag);
        let len = binder_abi::ioc_size(tag);
        pos += 4;
        assert!(pos + len <= buf.len(), "truncated outbound command {tag:#x}");
        records.push((tag, buf[pos..pos + len].to_vec()));
        pos += len;
    }
    records
}

/// Number of records carrying `tag`.
pub fn count(records: &[(u32, Vec<u8>)], tag: u32) -> usize {
    records.iter().filter(|(t, _)| *t == tag).count()
}

/// Payloads of every record carrying `tag`.
pub fn payloads<'r>(records: &'r [(u32, Vec<u8>)], tag: u32) -> Vec<&'r [u8]> {
    records.iter().filter(|(t, _)| *t == tag).map(|(_, p)| p.as_slice()).collect()
}

/// u32 payloads of every record carrying `tag` (acquire/release).
pub fn handle_payloads(records: &[(u32, Vec<u8>)], tag: u32) -> Vec<u32> {
    payloads(records, tag)
        .into_iter()
        .map(|p| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&p[..4]);
            u32::from_ne_bytes(word)
        })
        .collect()
}

/// Encodes one inbound transaction record pointing at `msg`.
///
/// The message must outlive the drain that parses the stream.
pub fn br_transaction(msg: &Message, code: u32, flags: u32) -> Vec<u8> {
    let txn = TransactionData {
        target: 0,
        code,
        flags,
        data_size: msg.data().len() as u64,
        offsets_size: msg.offsets().len() as u64,
        data_buffer: msg.data().as_ptr() as u64,
        data_offsets: msg.offsets().as_ptr() as u64,
        ..Default::default()
    };
    let mut stream = Vec::with_capacity(4 + TransactionData::SIZE);
    stream.extend_from_slice(&binder_abi::BR_TRANSACTION.to_ne_bytes());
    stream.extend_from_slice(&txn.to_bytes());
    stream
}

/// Encodes a death event for `cookie`.
pub fn br_dead_binder(cookie: u64) -> Vec<u8> {
    let mut stream = Vec::with_capacity(12);
    stream.extend_from_slice(&binder_abi::BR_DEAD_BINDER.to_ne_bytes());
    stream.extend_from_slice(&cookie.to_ne_bytes());
    stream
}

/// Reads the payload a reply transaction points at.
pub fn reply_payload(txn: &TransactionData) -> Vec<u8> {
    unsafe {
        std::slice::from_raw_parts(txn.data_buffer as *const u8, txn.data_size as usize).to_vec()
    }
}

/// Decodes the single BC_REPLY record in `records`.
pub fn single_reply(records: &[(u32, Vec<u8>)]) -> TransactionData {
    let replies = payloads(records, binder_abi::BC_REPLY);
    assert_eq!(replies.len(), 1, "expected exactly one reply");
    let mut raw = [0u8; TransactionData::SIZE];
    raw.copy_from_slice(replies[0]);
    TransactionData::from_bytes(&raw)
}
