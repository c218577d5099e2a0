// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: State-machine tests for the dispatch loop, driven over
//! synthetic driver return streams with no device
//!
//! TEST_SCOPE:
//!   - Registry request handling end to end (scenarios from the protocol)
//!   - Buffer lifecycle: one free per inbound transaction on every path
//!   - Death events, stale cookies, terminal commands
//!   - Draining order and partial-record preservation

mod common;

use binder_abi::{
    FlatObject, HandleCookie, TransactionData, TransactionFlags, BC_ACQUIRE,
    BC_CLEAR_DEATH_NOTIFICATION, BC_DEAD_BINDER_DONE, BC_FREE_BUFFER, BC_RELEASE, BC_REPLY,
    BC_REQUEST_DEATH_NOTIFICATION, BINDER_TYPE_HANDLE, BR_FAILED_REPLY, BR_NOOP, BR_REPLY,
};
use binder_ipc::svcmgr::{
    SERVICE_MANAGER_NAME, SVC_MGR_ADD_SERVICE, SVC_MGR_CHECK_SERVICE, SVC_MGR_GET_SERVICE,
    SVC_MGR_LIST_SERVICES,
};
use binder_ipc::{CommandWriter, Message};
use binderd::{Config, Dispatcher};

use common::{
    br_dead_binder, br_transaction, count, handle_payloads, payloads, reply_payload, single_reply,
    walk_bc,
};

fn dispatcher() -> Dispatcher {
    Dispatcher::new(&Config::default())
}

fn request_prefix(target: &str) -> Message {
    let mut msg = Message::with_capacity(512, 4);
    msg.put_u32(0).unwrap();
    msg.put_string(target).unwrap();
    msg
}

fn add_request(name: &str, handle: u32) -> Message {
    let mut msg = request_prefix(SERVICE_MANAGER_NAME);
    msg.put_string(name).unwrap();
    msg.put_object_handle(handle).unwrap();
    msg
}

fn lookup_request(name: &str) -> Message {
    let mut msg = request_prefix(SERVICE_MANAGER_NAME);
    msg.put_string(name).unwrap();
    msg
}

fn list_request(index: u32) -> Message {
    let mut msg = request_prefix(SERVICE_MANAGER_NAME);
    msg.put_u32(index).unwrap();
    msg
}

fn drain_all(dispatcher: &mut Dispatcher, stream: &[u8]) -> Vec<(u32, Vec<u8>)> {
    let mut out = CommandWriter::new();
    let consumed = dispatcher.drain(stream, &mut out);
    assert_eq!(consumed, stream.len());
    walk_bc(out.as_bytes())
}

fn assert_status_reply(records: &[(u32, Vec<u8>)], expected: i32) {
    let reply = single_reply(records);
    assert!(reply.transaction_flags().contains(TransactionFlags::STATUS_CODE));
    assert_eq!(reply.data_size, 4);
    assert_eq!(reply.offsets_size, 0);
    let payload = reply_payload(&reply);
    assert_eq!(i32::from_ne_bytes(payload[..4].try_into().unwrap()), expected);
}

#[test]
fn add_then_get_returns_handle() {
    let mut d = dispatcher();

    let add = add_request("fd.service", 7);
    let records = drain_all(&mut d, &br_transaction(&add, SVC_MGR_ADD_SERVICE, 0));
    assert_eq!(count(&records, BC_ACQUIRE), 1);
    assert_eq!(count(&records, BC_REQUEST_DEATH_NOTIFICATION), 1);
    assert_eq!(count(&records, BC_FREE_BUFFER), 1);
    let reply = single_reply(&records);
    assert!(!reply.transaction_flags().contains(TransactionFlags::STATUS_CODE));
    let payload = reply_payload(&reply);
    assert_eq!(u32::from_ne_bytes(payload[..4].try_into().unwrap()), 0);

    let get = lookup_request("fd.service");
    let records = drain_all(&mut d, &br_transaction(&get, SVC_MGR_GET_SERVICE, 0));
    let reply = single_reply(&records);
    assert_eq!(reply.offsets_size, 8);
    let payload = reply_payload(&reply);
    let object = FlatObject::from_bytes(&payload[..24].try_into().unwrap());
    assert_eq!(object.object_type, BINDER_TYPE_HANDLE);
    assert_eq!(object.handle(), 7);
    assert_eq!(count(&records, BC_FREE_BUFFER), 1);
}

#[test]
fn get_on_empty_registry_fails_with_status_word() {
    let mut d = dispatcher();
    let get = lookup_request("missing");
    let records = drain_all(&mut d, &br_transaction(&get, SVC_MGR_GET_SERVICE, 0));
    assert_status_reply(&records, -1);
    assert_eq!(count(&records, BC_FREE_BUFFER), 1);
    assert_eq!(count(&records, BC_ACQUIRE), 0);
}

#[test]
fn replace_tears_down_old_handle_exactly_once() {
    let mut d = dispatcher();

    let first = add_request("fd.service", 7);
    drain_all(&mut d, &br_transaction(&first, SVC_MGR_ADD_SERVICE, 0));

    let second = add_request("fd.service", 9);
    let records = drain_all(&mut d, &br_transaction(&second, SVC_MGR_ADD_SERVICE, 0));
    assert_eq!(handle_payloads(&records, BC_RELEASE), vec![7]);
    assert_eq!(count(&records, BC_CLEAR_DEATH_NOTIFICATION), 1);
    assert_eq!(handle_payloads(&records, BC_ACQUIRE), vec![9]);

    let get = lookup_request("fd.service");
    let records = drain_all(&mut d, &br_transaction(&get, SVC_MGR_CHECK_SERVICE, 0));
    let reply = single_reply(&records);
    let payload = reply_payload(&reply);
    let object = FlatObject::from_bytes(&payload[..24].try_into().unwrap());
    assert_eq!(object.handle(), 9);
}

#[test]
fn list_returns_most_recent_name_first() {
    let mut d = dispatcher();
    let alpha = add_request("svc.alpha", 1);
    drain_all(&mut d, &br_transaction(&alpha, SVC_MGR_ADD_SERVICE, 0));
    let beta = add_request("svc.beta", 2);
    drain_all(&mut d, &br_transaction(&beta, SVC_MGR_ADD_SERVICE, 0));

    let list = list_request(0);
    let records = drain_all(&mut d, &br_transaction(&list, SVC_MGR_LIST_SERVICES, 0));
    let reply = single_reply(&records);
    let payload = reply_payload(&reply);
    let len = u32::from_ne_bytes(payload[..4].try_into().unwrap()) as usize;
    assert_eq!(&payload[4..4 + len], b"svc.beta");

    let past_end = list_request(2);
    let records = drain_all(&mut d, &br_transaction(&past_end, SVC_MGR_LIST_SERVICES, 0));
    assert_status_reply(&records, -1);
}

#[test]
fn strict_mode_word_rejects_any_request() {
    let mut d = dispatcher();
    let mut msg = Message::with_capacity(512, 4);
    msg.put_u32(1).unwrap(); // strict mode on
    msg.put_string(SERVICE_MANAGER_NAME).unwrap();
    msg.put_string("fd.service").unwrap();
    msg.put_object_handle(7).unwrap();

    let records = drain_all(&mut d, &br_transaction(&msg, SVC_MGR_ADD_SERVICE, 0));
    assert_status_reply(&records, -1);
    assert_eq!(count(&records, BC_ACQUIRE), 0);
    assert_eq!(count(&records, BC_FREE_BUFFER), 1);
}

#[test]
fn wrong_target_name_rejects() {
    let mut d = dispatcher();
    let mut msg = request_prefix("not.the.manager");
    msg.put_string("fd.service").unwrap();
    let records = drain_all(&mut d, &br_transaction(&msg, SVC_MGR_GET_SERVICE, 0));
    assert_status_reply(&records, -1);
}

#[test]
fn target_name_comparison_is_length_bounded() {
    // The stored-length-bounded policy applies to the manager name too: a
    // query that extends the well-known name still addresses the registry.
    let mut d = dispatcher();
    let extended = format!("{SERVICE_MANAGER_NAME}.v2");
    let mut msg = request_prefix(&extended);
    msg.put_string("fd.service").unwrap();
    msg.put_object_handle(3).unwrap();
    let records = drain_all(&mut d, &br_transaction(&msg, SVC_MGR_ADD_SERVICE, 0));
    let reply = single_reply(&records);
    assert!(!reply.transaction_flags().contains(TransactionFlags::STATUS_CODE));
}

#[test]
fn unknown_request_code_rejects() {
    let mut d = dispatcher();
    let msg = lookup_request("fd.service");
    let records = drain_all(&mut d, &br_transaction(&msg, 99, 0));
    assert_status_reply(&records, -1);
}

#[test]
fn truncated_payload_rejects_without_killing_loop() {
    let mut d = dispatcher();
    let msg = Message::with_capacity(16, 0); // empty payload
    let records = drain_all(&mut d, &br_transaction(&msg, SVC_MGR_GET_SERVICE, 0));
    assert_status_reply(&records, -1);
    assert!(!d.is_done());
}

#[test]
fn one_way_transaction_gets_no_reply_but_is_freed() {
    let mut d = dispatcher();
    let msg = lookup_request("missing");
    let records = drain_all(
        &mut d,
        &br_transaction(&msg, SVC_MGR_GET_SERVICE, TransactionFlags::ONE_WAY.bits()),
    );
    assert_eq!(count(&records, BC_REPLY), 0);
    assert_eq!(count(&records, BC_FREE_BUFFER), 1);
}

#[test]
fn inbound_buffer_pointer_is_freed_verbatim() {
    let mut d = dispatcher();
    let msg = lookup_request("missing");
    let stream = br_transaction(&msg, SVC_MGR_GET_SERVICE, 0);
    let mut out = CommandWriter::new();
    d.drain(&stream, &mut out);
    let records = walk_bc(out.as_bytes());
    let freed = payloads(&records, BC_FREE_BUFFER);
    assert_eq!(freed.len(), 1);
    let ptr = u64::from_ne_bytes(freed[0][..8].try_into().unwrap());
    assert_eq!(ptr, msg.data().as_ptr() as u64);
}

#[test]
fn dead_binder_tombstones_binding_and_acks() {
    let mut d = dispatcher();
    let add = add_request("fd.service", 7);
    let records = drain_all(&mut d, &br_transaction(&add, SVC_MGR_ADD_SERVICE, 0));
    let registration = payloads(&records, BC_REQUEST_DEATH_NOTIFICATION)[0];
    let cookie = HandleCookie::from_bytes(&registration[..12].try_into().unwrap()).cookie;

    let records = drain_all(&mut d, &br_dead_binder(cookie));
    assert_eq!(handle_payloads(&records, BC_RELEASE), vec![7]);
    let acks = payloads(&records, BC_DEAD_BINDER_DONE);
    assert_eq!(acks.len(), 1);
    assert_eq!(u64::from_ne_bytes(acks[0][..8].try_into().unwrap()), cookie);

    // The name stays enumerable as a tombstone...
    let list = list_request(0);
    let records = drain_all(&mut d, &br_transaction(&list, SVC_MGR_LIST_SERVICES, 0));
    let reply = single_reply(&records);
    let payload = reply_payload(&reply);
    let len = u32::from_ne_bytes(payload[..4].try_into().unwrap()) as usize;
    assert_eq!(&payload[4..4 + len], b"fd.service");

    // ...but resolution fails.
    let get = lookup_request("fd.service");
    let records = drain_all(&mut d, &br_transaction(&get, SVC_MGR_GET_SERVICE, 0));
    assert_status_reply(&records, -1);
}

#[test]
fn replayed_death_cookie_releases_nothing_but_still_acks() {
    let mut d = dispatcher();
    let add = add_request("fd.service", 7);
    let records = drain_all(&mut d, &br_transaction(&add, SVC_MGR_ADD_SERVICE, 0));
    let registration = payloads(&records, BC_REQUEST_DEATH_NOTIFICATION)[0];
    let cookie = HandleCookie::from_bytes(&registration[..12].try_into().unwrap()).cookie;

    drain_all(&mut d, &br_dead_binder(cookie));
    let records = drain_all(&mut d, &br_dead_binder(cookie));
    assert_eq!(count(&records, BC_RELEASE), 0);
    assert_eq!(count(&records, BC_DEAD_BINDER_DONE), 1);
}

#[test]
fn stray_reply_buffer_is_returned() {
    let mut d = dispatcher();
    let payload = vec![0u8; 8];
    let txn = TransactionData {
        data_size: payload.len() as u64,
        data_buffer: payload.as_ptr() as u64,
        ..Default::default()
    };
    let mut stream = Vec::new();
    stream.extend_from_slice(&BR_REPLY.to_ne_bytes());
    stream.extend_from_slice(&txn.to_bytes());

    let records = drain_all(&mut d, &stream);
    let freed = payloads(&records, BC_FREE_BUFFER);
    assert_eq!(freed.len(), 1);
    assert_eq!(u64::from_ne_bytes(freed[0][..8].try_into().unwrap()), payload.as_ptr() as u64);
}

#[test]
fn failed_reply_is_terminal() {
    let mut d = dispatcher();
    let records = drain_all(&mut d, &BR_FAILED_REPLY.to_ne_bytes());
    assert!(d.is_done());
    assert!(records.is_empty());
}

#[test]
fn commands_after_terminal_are_left_for_no_one() {
    // The loop stops handling once a terminal command is seen; the drain
    // still reports how far it got so the caller can account for bytes.
    let mut d = dispatcher();
    let mut stream = Vec::new();
    stream.extend_from_slice(&BR_NOOP.to_ne_bytes());
    stream.extend_from_slice(&BR_FAILED_REPLY.to_ne_bytes());
    stream.extend_from_slice(&BR_NOOP.to_ne_bytes());

    let mut out = CommandWriter::new();
    let consumed = d.drain(&stream, &mut out);
    assert!(d.is_done());
    assert_eq!(consumed, 8);
}

#[test]
fn partial_trailing_record_is_not_consumed() {
    let mut d = dispatcher();
    let msg = lookup_request("missing");
    let mut stream = br_transaction(&msg, SVC_MGR_GET_SERVICE, 0);
    let full = stream.len();
    stream.extend_from_slice(&binder_abi::BR_TRANSACTION.to_ne_bytes());
    stream.extend_from_slice(&[0u8; 12]); // 12 of 64 payload bytes

    let mut out = CommandWriter::new();
    let consumed = d.drain(&stream, &mut out);
    assert_eq!(consumed, full);
}

#[test]
fn unknown_driver_tag_winds_the_loop_down() {
    let mut d = dispatcher();
    let mut out = CommandWriter::new();
    let stream = 0xdead_beefu32.to_ne_bytes();
    let consumed = d.drain(&stream, &mut out);
    assert!(d.is_done());
    // The bad record itself is not consumed; nothing after it is trusted.
    assert_eq!(consumed, 0);
}
