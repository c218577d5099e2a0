// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Binder kernel ABI shared by the IPC runtime and the registry daemon
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests + `tests/abi_roundtrip.rs`
//!
//! PUBLIC API:
//!   - ioctl request codes (BINDER_WRITE_READ, BINDER_SET_CONTEXT_MGR, ...)
//!   - driver command / return tags (BC_*, BR_*)
//!   - payload records: WriteRead, TransactionData, FlatObject, PtrCookie,
//!     HandleCookie, VersionRecord, FsDevice
//!
//! INVARIANTS:
//!   - Every record encodes/decodes bit-for-bit to the kernel's struct layout
//!     in native endianness (driver and daemon share one machine).
//!   - Tag and ioctl values are computed with the kernel's _IOC encoding and
//!     pinned by compile-time asserts; they must never drift.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Binder wire protocol version this crate is compiled against.
pub const PROTOCOL_VERSION: i32 = 8;

/// Reserved handle addressing the context manager.
pub const CONTEXT_MANAGER_HANDLE: u32 = 0;

// _IOC direction bits.
const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | ((ty as u32) << 8) | nr as u32
}

const fn io(ty: u8, nr: u8) -> u32 {
    ioc(IOC_NONE, ty, nr, 0)
}

const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_WRITE, ty, nr, size)
}

const fn ior(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_READ, ty, nr, size)
}

const fn iowr(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_READ | IOC_WRITE, ty, nr, size)
}

/// Extracts the payload size encoded in a command or return tag.
///
/// The driver advances its read/write cursors by exactly this amount, so the
/// command stream parser uses the same rule.
pub const fn ioc_size(tag: u32) -> usize {
    ((tag >> 16) & 0x3fff) as usize
}

const IOCTL_CHAR: u8 = b'b';

/// One write-then-read exchange with the driver.
pub const BINDER_WRITE_READ: u32 = iowr(IOCTL_CHAR, 1, WriteRead::SIZE);
/// Caps the number of looper threads the driver may request.
pub const BINDER_SET_MAX_THREADS: u32 = iow(IOCTL_CHAR, 5, 4);
/// One-time claim of the context-manager role.
pub const BINDER_SET_CONTEXT_MGR: u32 = iow(IOCTL_CHAR, 7, 4);
/// Reads the driver's wire protocol version.
pub const BINDER_VERSION: u32 = iowr(IOCTL_CHAR, 9, VersionRecord::SIZE);
/// Allocates a new binderfs device node (issued on binder-control).
pub const BINDER_CTL_ADD: u32 = iowr(IOCTL_CHAR, 1, FsDevice::SIZE);

const_assert_eq!(BINDER_WRITE_READ, 0xc030_6201);
const_assert_eq!(BINDER_SET_MAX_THREADS, 0x4004_6205);
const_assert_eq!(BINDER_SET_CONTEXT_MGR, 0x4004_6207);
const_assert_eq!(BINDER_VERSION, 0xc004_6209);
const_assert_eq!(BINDER_CTL_ADD, 0xc108_6201);

const BC_CHAR: u8 = b'c';

/// Sends a transaction to a target handle.
pub const BC_TRANSACTION: u32 = iow(BC_CHAR, 0, TransactionData::SIZE);
/// Sends the reply for the transaction currently being handled.
pub const BC_REPLY: u32 = iow(BC_CHAR, 1, TransactionData::SIZE);
/// Result of an attempted acquire (unused by this process).
pub const BC_ACQUIRE_RESULT: u32 = iow(BC_CHAR, 2, 4);
/// Returns a transaction buffer to the driver.
pub const BC_FREE_BUFFER: u32 = iow(BC_CHAR, 3, 8);
/// Weak increment on a remote handle.
pub const BC_INCREFS: u32 = iow(BC_CHAR, 4, 4);
/// Strong increment on a remote handle.
pub const BC_ACQUIRE: u32 = iow(BC_CHAR, 5, 4);
/// Strong decrement on a remote handle.
pub const BC_RELEASE: u32 = iow(BC_CHAR, 6, 4);
/// Weak decrement on a remote handle.
pub const BC_DECREFS: u32 = iow(BC_CHAR, 7, 4);
/// Acknowledges BR_INCREFS for a local object.
pub const BC_INCREFS_DONE: u32 = iow(BC_CHAR, 8, PtrCookie::SIZE);
/// Acknowledges BR_ACQUIRE for a local object.
pub const BC_ACQUIRE_DONE: u32 = iow(BC_CHAR, 9, PtrCookie::SIZE);
/// Attempted acquire (unused by this process).
pub const BC_ATTEMPT_ACQUIRE: u32 = iow(BC_CHAR, 10, 8);
/// Registers a spawned looper thread.
pub const BC_REGISTER_LOOPER: u32 = io(BC_CHAR, 11);
/// Marks the calling thread as a looper.
pub const BC_ENTER_LOOPER: u32 = io(BC_CHAR, 12);
/// Removes the calling thread from the looper pool.
pub const BC_EXIT_LOOPER: u32 = io(BC_CHAR, 13);
/// Registers interest in a remote object's death.
pub const BC_REQUEST_DEATH_NOTIFICATION: u32 = iow(BC_CHAR, 14, HandleCookie::SIZE);
/// Withdraws a death-notification registration.
pub const BC_CLEAR_DEATH_NOTIFICATION: u32 = iow(BC_CHAR, 15, HandleCookie::SIZE);
/// Acknowledges a delivered BR_DEAD_BINDER so the driver can retire it.
pub const BC_DEAD_BINDER_DONE: u32 = iow(BC_CHAR, 16, 8);

const_assert_eq!(BC_TRANSACTION, 0x4040_6300);
const_assert_eq!(BC_FREE_BUFFER, 0x4008_6303);
const_assert_eq!(BC_ENTER_LOOPER, 0x0000_630c);
const_assert_eq!(BC_REQUEST_DEATH_NOTIFICATION, 0x400c_630e);

const BR_CHAR: u8 = b'r';

/// Driver-reported protocol error, payload i32.
pub const BR_ERROR: u32 = ior(BR_CHAR, 0, 4);
/// No-payload success marker.
pub const BR_OK: u32 = io(BR_CHAR, 1);
/// Inbound transaction addressed to this process.
pub const BR_TRANSACTION: u32 = ior(BR_CHAR, 2, TransactionData::SIZE);
/// Reply to a transaction this process sent.
pub const BR_REPLY: u32 = ior(BR_CHAR, 3, TransactionData::SIZE);
/// Result of BC_ATTEMPT_ACQUIRE (unused by this process).
pub const BR_ACQUIRE_RESULT: u32 = ior(BR_CHAR, 4, 4);
/// The target of a transaction died before replying.
pub const BR_DEAD_REPLY: u32 = io(BR_CHAR, 5);
/// The driver accepted an outbound transaction or reply.
pub const BR_TRANSACTION_COMPLETE: u32 = io(BR_CHAR, 6);
/// Weak increment request for a local object.
pub const BR_INCREFS: u32 = ior(BR_CHAR, 7, PtrCookie::SIZE);
/// Strong increment request for a local object.
pub const BR_ACQUIRE: u32 = ior(BR_CHAR, 8, PtrCookie::SIZE);
/// Strong decrement request for a local object.
pub const BR_RELEASE: u32 = ior(BR_CHAR, 9, PtrCookie::SIZE);
/// Weak decrement request for a local object.
pub const BR_DECREFS: u32 = ior(BR_CHAR, 10, PtrCookie::SIZE);
/// Attempted acquire request (unused by this process).
pub const BR_ATTEMPT_ACQUIRE: u32 = ior(BR_CHAR, 11, 8);
/// Padding command, carries nothing.
pub const BR_NOOP: u32 = io(BR_CHAR, 12);
/// The driver wants another looper thread (suppressed by max-threads 0).
pub const BR_SPAWN_LOOPER: u32 = io(BR_CHAR, 13);
/// Looper teardown marker.
pub const BR_FINISHED: u32 = io(BR_CHAR, 14);
/// A remote object this process watches has died; payload is the cookie.
pub const BR_DEAD_BINDER: u32 = ior(BR_CHAR, 15, 8);
/// A death-notification registration was withdrawn; payload is the cookie.
pub const BR_CLEAR_DEATH_NOTIFICATION_DONE: u32 = ior(BR_CHAR, 16, 8);
/// An outbound transaction or reply could not be delivered.
pub const BR_FAILED_REPLY: u32 = io(BR_CHAR, 17);

const_assert_eq!(BR_TRANSACTION, 0x8040_7202);
const_assert_eq!(BR_NOOP, 0x0000_720c);
const_assert_eq!(BR_DEAD_BINDER, 0x8008_720f);
const_assert_eq!(BR_FAILED_REPLY, 0x0000_7211);

const fn object_tag(c1: u8, c2: u8, c3: u8) -> u32 {
    ((c1 as u32) << 24) | ((c2 as u32) << 16) | ((c3 as u32) << 8) | 0x85
}

/// Strong reference to a local binder object.
pub const BINDER_TYPE_BINDER: u32 = object_tag(b's', b'b', b'*');
/// Weak reference to a local binder object.
pub const BINDER_TYPE_WEAK_BINDER: u32 = object_tag(b'w', b'b', b'*');
/// Strong reference to a remote handle.
pub const BINDER_TYPE_HANDLE: u32 = object_tag(b's', b'h', b'*');
/// Weak reference to a remote handle.
pub const BINDER_TYPE_WEAK_HANDLE: u32 = object_tag(b'w', b'h', b'*');
/// File descriptor carried across the transaction.
pub const BINDER_TYPE_FD: u32 = object_tag(b'f', b'd', b'*');

const_assert_eq!(BINDER_TYPE_BINDER, 0x7362_2a85);
const_assert_eq!(BINDER_TYPE_HANDLE, 0x7368_2a85);
const_assert_eq!(BINDER_TYPE_FD, 0x6664_2a85);

bitflags! {
    /// Flags carried in [`TransactionData::flags`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TransactionFlags: u32 {
        /// Fire-and-forget: no reply is expected or permitted.
        const ONE_WAY = 0x01;
        /// Target is the root object of the receiving process.
        const ROOT_OBJECT = 0x04;
        /// Payload is a single status word, not a message buffer.
        const STATUS_CODE = 0x08;
        /// Sender allows file descriptors in the payload.
        const ACCEPT_FDS = 0x10;
    }
}

/// Flat-object flag: the object's owner accepts file descriptors.
pub const FLAT_BINDER_FLAG_ACCEPTS_FDS: u32 = 0x100;

/// Argument block for [`BINDER_WRITE_READ`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteRead {
    /// Bytes available in the write buffer.
    pub write_size: u64,
    /// Bytes the driver consumed from the write buffer.
    pub write_consumed: u64,
    /// Userspace address of the write buffer.
    pub write_buffer: u64,
    /// Bytes of free space in the read buffer.
    pub read_size: u64,
    /// Bytes the driver filled into the read buffer.
    pub read_consumed: u64,
    /// Userspace address of the read buffer.
    pub read_buffer: u64,
}

impl WriteRead {
    /// Encoded size in bytes.
    pub const SIZE: usize = 48;

    /// Encodes into the kernel's struct layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.write_size.to_ne_bytes());
        out[8..16].copy_from_slice(&self.write_consumed.to_ne_bytes());
        out[16..24].copy_from_slice(&self.write_buffer.to_ne_bytes());
        out[24..32].copy_from_slice(&self.read_size.to_ne_bytes());
        out[32..40].copy_from_slice(&self.read_consumed.to_ne_bytes());
        out[40..48].copy_from_slice(&self.read_buffer.to_ne_bytes());
        out
    }

    /// Decodes from the kernel's struct layout.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self {
            write_size: read_u64(raw, 0),
            write_consumed: read_u64(raw, 8),
            write_buffer: read_u64(raw, 16),
            read_size: read_u64(raw, 24),
            read_consumed: read_u64(raw, 32),
            read_buffer: read_u64(raw, 40),
        }
    }
}

/// Payload of [`BR_TRANSACTION`], [`BR_REPLY`], [`BC_TRANSACTION`] and
/// [`BC_REPLY`].
///
/// `target` is a union in the kernel: outbound transactions address a handle
/// in the low 32 bits, inbound ones carry the target object pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionData {
    /// Target handle (low 32 bits) or object pointer.
    pub target: u64,
    /// Target object cookie (inbound only).
    pub cookie: u64,
    /// Request code, interpreted by the receiver.
    pub code: u32,
    /// Raw [`TransactionFlags`] bits.
    pub flags: u32,
    /// Sending process id (filled by the driver).
    pub sender_pid: i32,
    /// Sending effective uid (filled by the driver).
    pub sender_euid: u32,
    /// Length of the data region in bytes.
    pub data_size: u64,
    /// Length of the offsets region in bytes.
    pub offsets_size: u64,
    /// Address of the data region.
    pub data_buffer: u64,
    /// Address of the offsets region.
    pub data_offsets: u64,
}

impl TransactionData {
    /// Encoded size in bytes.
    pub const SIZE: usize = 64;

    /// Target handle for outbound addressing.
    pub fn target_handle(&self) -> u32 {
        self.target as u32
    }

    /// Decoded transaction flags; unknown bits are dropped.
    pub fn transaction_flags(&self) -> TransactionFlags {
        TransactionFlags::from_bits_truncate(self.flags)
    }

    /// True when the sender does not expect a reply.
    pub fn is_one_way(&self) -> bool {
        self.transaction_flags().contains(TransactionFlags::ONE_WAY)
    }

    /// Encodes into the kernel's struct layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.target.to_ne_bytes());
        out[8..16].copy_from_slice(&self.cookie.to_ne_bytes());
        out[16..20].copy_from_slice(&self.code.to_ne_bytes());
        out[20..24].copy_from_slice(&self.flags.to_ne_bytes());
        out[24..28].copy_from_slice(&self.sender_pid.to_ne_bytes());
        out[28..32].copy_from_slice(&self.sender_euid.to_ne_bytes());
        out[32..40].copy_from_slice(&self.data_size.to_ne_bytes());
        out[40..48].copy_from_slice(&self.offsets_size.to_ne_bytes());
        out[48..56].copy_from_slice(&self.data_buffer.to_ne_bytes());
        out[56..64].copy_from_slice(&self.data_offsets.to_ne_bytes());
        out
    }

    /// Decodes from the kernel's struct layout.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self {
            target: read_u64(raw, 0),
            cookie: read_u64(raw, 8),
            code: read_u32(raw, 16),
            flags: read_u32(raw, 20),
            sender_pid: read_u32(raw, 24) as i32,
            sender_euid: read_u32(raw, 28),
            data_size: read_u64(raw, 32),
            offsets_size: read_u64(raw, 40),
            data_buffer: read_u64(raw, 48),
            data_offsets: read_u64(raw, 56),
        }
    }
}

/// One object reference embedded in a message's data region.
///
/// The offsets region locates these records so the driver can translate
/// them in transit without parsing payload semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlatObject {
    /// One of the `BINDER_TYPE_*` tags.
    pub object_type: u32,
    /// `FLAT_BINDER_FLAG_*` bits.
    pub flags: u32,
    /// Handle, fd or object pointer depending on the type tag.
    pub payload: u64,
    /// Registrant-chosen cookie.
    pub cookie: u64,
}

impl FlatObject {
    /// Encoded size in bytes.
    pub const SIZE: usize = 24;

    /// Strong handle reference.
    pub fn for_handle(handle: u32) -> Self {
        Self {
            object_type: BINDER_TYPE_HANDLE,
            flags: FLAT_BINDER_FLAG_ACCEPTS_FDS,
            payload: handle as u64,
            cookie: 0,
        }
    }

    /// File descriptor record.
    pub fn for_fd(fd: i32) -> Self {
        Self {
            object_type: BINDER_TYPE_FD,
            flags: FLAT_BINDER_FLAG_ACCEPTS_FDS,
            payload: fd as u32 as u64,
            cookie: 0,
        }
    }

    /// Handle carried by a `BINDER_TYPE_HANDLE` record.
    pub fn handle(&self) -> u32 {
        self.payload as u32
    }

    /// Encodes into the kernel's struct layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.object_type.to_ne_bytes());
        out[4..8].copy_from_slice(&self.flags.to_ne_bytes());
        out[8..16].copy_from_slice(&self.payload.to_ne_bytes());
        out[16..24].copy_from_slice(&self.cookie.to_ne_bytes());
        out
    }

    /// Decodes from the kernel's struct layout.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self {
            object_type: read_u32(raw, 0),
            flags: read_u32(raw, 4),
            payload: read_u64(raw, 8),
            cookie: read_u64(raw, 16),
        }
    }
}

/// Payload of the `BR_INCREFS`/`BR_ACQUIRE`/`BR_RELEASE`/`BR_DECREFS`
/// family: a local object pointer plus its cookie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PtrCookie {
    /// Local object pointer.
    pub ptr: u64,
    /// Object cookie.
    pub cookie: u64,
}

impl PtrCookie {
    /// Encoded size in bytes.
    pub const SIZE: usize = 16;

    /// Decodes from the kernel's struct layout.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self { ptr: read_u64(raw, 0), cookie: read_u64(raw, 8) }
    }
}

/// Payload of [`BC_REQUEST_DEATH_NOTIFICATION`] and
/// [`BC_CLEAR_DEATH_NOTIFICATION`]. Packed in the kernel: 12 bytes, the
/// cookie is unaligned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandleCookie {
    /// Watched handle.
    pub handle: u32,
    /// Registrant-chosen cookie echoed back in BR_DEAD_BINDER.
    pub cookie: u64,
}

impl HandleCookie {
    /// Encoded size in bytes (packed).
    pub const SIZE: usize = 12;

    /// Encodes into the kernel's packed layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.handle.to_ne_bytes());
        out[4..12].copy_from_slice(&self.cookie.to_ne_bytes());
        out
    }

    /// Decodes from the kernel's packed layout.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self { handle: read_u32(raw, 0), cookie: read_u64(raw, 4) }
    }
}

/// Argument block for [`BINDER_VERSION`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersionRecord {
    /// Driver protocol version.
    pub protocol_version: i32,
}

impl VersionRecord {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4;

    /// Decodes from the kernel's struct layout.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        Self { protocol_version: i32::from_ne_bytes(*raw) }
    }
}

/// Argument block for [`BINDER_CTL_ADD`] on the binder-control node.
#[derive(Clone, Copy)]
pub struct FsDevice {
    /// NUL-padded device name.
    pub name: [u8; 256],
    /// Major number allocated by the kernel.
    pub major: u32,
    /// Minor number allocated by the kernel.
    pub minor: u32,
}

impl FsDevice {
    /// Encoded size in bytes.
    pub const SIZE: usize = 264;

    /// Builds a request for a device with the given name.
    ///
    /// Names longer than 255 bytes are truncated; the kernel requires the
    /// trailing NUL.
    pub fn named(name: &str) -> Self {
        let mut buf = [0u8; 256];
        let len = name.len().min(255);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self { name: buf, major: 0, minor: 0 }
    }

    /// Encodes into the kernel's struct layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..256].copy_from_slice(&self.name);
        out[256..260].copy_from_slice(&self.major.to_ne_bytes());
        out[260..264].copy_from_slice(&self.minor.to_ne_bytes());
        out
    }

    /// Decodes from the kernel's struct layout.
    pub fn from_bytes(raw: &[u8; Self::SIZE]) -> Self {
        let mut name = [0u8; 256];
        name.copy_from_slice(&raw[0..256]);
        Self {
            name,
            major: read_u32(raw, 256),
            minor: read_u32(raw, 260),
        }
    }
}

fn read_u32(raw: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&raw[at..at + 4]);
    u32::from_ne_bytes(word)
}

fn read_u64(raw: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&raw[at..at + 8]);
    u64::from_ne_bytes(word)
}
