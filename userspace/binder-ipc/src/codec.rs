// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Typed payload codec over a data region plus an offset table
//!
//! A message is two append-only regions: a byte stream of values and an
//! ordered table of byte offsets locating every embedded object reference.
//! The driver rewrites object records in transit and finds them through the
//! table alone, so the table must point at the start of each record and
//! nothing else. The only operation that touches the table is the object
//! append itself; callers never see raw offset arithmetic.
//!
//! INVARIANTS:
//!   - Offsets are strictly increasing and 4-byte aligned.
//!   - Decoding never reads past the end of the supplied buffers.
//!   - Every decode failure is distinct: end-of-buffer, bad length field,
//!     wrong object type, invalid text.

use binder_abi::{FlatObject, TransactionData, BINDER_TYPE_BINDER, BINDER_TYPE_FD, BINDER_TYPE_HANDLE};

/// Errors produced while encoding or decoding a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A fixed-size field ran past the end of the buffer.
    #[error("end of buffer")]
    Eof,
    /// A length field implies bytes the buffer does not contain.
    #[error("malformed length field")]
    BadLength,
    /// The object record at the cursor has the wrong type tag.
    #[error("object type mismatch: expected {expected:#x}, found {found:#x}")]
    TypeMismatch {
        /// Type tag the caller asked for.
        expected: u32,
        /// Type tag actually present.
        found: u32,
    },
    /// A string field was not valid UTF-8.
    #[error("string is not valid utf-8")]
    BadUtf8,
    /// Encoding would exceed the data or offset-table capacity.
    #[error("message capacity exceeded")]
    Capacity,
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Fixed-capacity message builder.
///
/// Capacity is chosen at construction and never grows; callers size it for
/// the largest payload they intend to send (see the daemon's reply-capacity
/// configuration).
pub struct Message {
    data: Vec<u8>,
    data_cap: usize,
    offsets: Vec<u8>,
    max_objects: usize,
}

impl Message {
    /// Creates a builder holding at most `data_cap` payload bytes and
    /// `max_objects` object references.
    pub fn with_capacity(data_cap: usize, max_objects: usize) -> Self {
        Self {
            data: Vec::with_capacity(data_cap),
            data_cap,
            offsets: Vec::with_capacity(max_objects * 8),
            max_objects,
        }
    }

    /// Discards all appended content, keeping the capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.offsets.clear();
    }

    /// Encoded data region.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encoded offset table, one u64 entry per object reference.
    pub fn offsets(&self) -> &[u8] {
        &self.offsets
    }

    /// Number of object references recorded so far.
    pub fn object_count(&self) -> usize {
        self.offsets.len() / 8
    }

    /// Appends a u32 word.
    pub fn put_u32(&mut self, value: u32) -> Result<(), CodecError> {
        if self.data.len() + 4 > self.data_cap {
            return Err(CodecError::Capacity);
        }
        self.data.extend_from_slice(&value.to_ne_bytes());
        Ok(())
    }

    /// Appends a length-prefixed, NUL-terminated string padded to 4 bytes.
    pub fn put_string(&mut self, value: &str) -> Result<(), CodecError> {
        let body = pad4(value.len() + 1);
        if self.data.len() + 4 + body > self.data_cap {
            return Err(CodecError::Capacity);
        }
        self.data.extend_from_slice(&(value.len() as u32).to_ne_bytes());
        self.data.extend_from_slice(value.as_bytes());
        // NUL terminator plus alignment padding.
        self.data.resize(self.data.len() + (body - value.len()), 0);
        Ok(())
    }

    /// Appends a strong handle reference and records its offset.
    pub fn put_object_handle(&mut self, handle: u32) -> Result<(), CodecError> {
        self.put_object(FlatObject::for_handle(handle))
    }

    /// Appends a local object reference (translated to a handle in transit)
    /// and records its offset.
    pub fn put_binder(&mut self, object: u64, cookie: u64) -> Result<(), CodecError> {
        self.put_object(FlatObject {
            object_type: BINDER_TYPE_BINDER,
            flags: binder_abi::FLAT_BINDER_FLAG_ACCEPTS_FDS,
            payload: object,
            cookie,
        })
    }

    /// Appends a file descriptor record and records its offset.
    pub fn put_fd(&mut self, fd: i32) -> Result<(), CodecError> {
        self.put_object(FlatObject::for_fd(fd))
    }

    // Single insertion point for object records: appends the record and its
    // offset together so the table invariant cannot be broken piecemeal.
    fn put_object(&mut self, object: FlatObject) -> Result<(), CodecError> {
        if self.data.len() + FlatObject::SIZE > self.data_cap
            || self.object_count() >= self.max_objects
        {
            return Err(CodecError::Capacity);
        }
        let at = self.data.len() as u64;
        debug_assert_eq!(at % 4, 0);
        self.data.extend_from_slice(&object.to_bytes());
        self.offsets.extend_from_slice(&at.to_ne_bytes());
        Ok(())
    }
}

/// Zero-copy read cursor over a received payload.
pub struct MessageReader<'buf> {
    data: &'buf [u8],
    offsets: &'buf [u8],
    pos: usize,
}

impl<'buf> MessageReader<'buf> {
    /// Reads from caller-owned data and offset slices.
    pub fn new(data: &'buf [u8], offsets: &'buf [u8]) -> Self {
        Self { data, offsets, pos: 0 }
    }

    /// Reads directly from the kernel-lent buffer a transaction describes.
    ///
    /// # Safety
    /// The transaction's data and offsets pointers must reference memory
    /// that stays valid and unmodified for `'buf` — in practice, until the
    /// buffer is returned with the free-buffer command.
    pub unsafe fn from_transaction(txn: &TransactionData) -> MessageReader<'buf> {
        let data = core::slice::from_raw_parts(txn.data_buffer as *const u8, txn.data_size as usize);
        let offsets =
            core::slice::from_raw_parts(txn.data_offsets as *const u8, txn.offsets_size as usize);
        MessageReader::new(data, offsets)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reads a u32 word.
    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        if self.remaining() < 4 {
            return Err(CodecError::Eof);
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_ne_bytes(word))
    }

    /// Reads a length-prefixed string.
    pub fn get_string(&mut self) -> Result<&'buf str, CodecError> {
        let len = self.get_u32()? as usize;
        let body = pad4(len + 1);
        if body > self.remaining() {
            return Err(CodecError::BadLength);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        if self.data[self.pos + len] != 0 {
            return Err(CodecError::BadLength);
        }
        self.pos += body;
        core::str::from_utf8(bytes).map_err(|_| CodecError::BadUtf8)
    }

    /// Reads the object record at the cursor, verifying the offset table
    /// actually marks one here.
    pub fn get_object(&mut self) -> Result<FlatObject, CodecError> {
        if self.remaining() < FlatObject::SIZE {
            return Err(CodecError::Eof);
        }
        if !self.offset_marked(self.pos as u64) {
            let mut tag = [0u8; 4];
            tag.copy_from_slice(&self.data[self.pos..self.pos + 4]);
            return Err(CodecError::TypeMismatch {
                expected: BINDER_TYPE_HANDLE,
                found: u32::from_ne_bytes(tag),
            });
        }
        let mut raw = [0u8; FlatObject::SIZE];
        raw.copy_from_slice(&self.data[self.pos..self.pos + FlatObject::SIZE]);
        self.pos += FlatObject::SIZE;
        Ok(FlatObject::from_bytes(&raw))
    }

    /// Reads a strong handle reference.
    pub fn get_object_handle(&mut self) -> Result<u32, CodecError> {
        let object = self.get_object()?;
        if object.object_type != BINDER_TYPE_HANDLE {
            return Err(CodecError::TypeMismatch {
                expected: BINDER_TYPE_HANDLE,
                found: object.object_type,
            });
        }
        Ok(object.handle())
    }

    /// Reads a file descriptor record.
    pub fn get_fd(&mut self) -> Result<i32, CodecError> {
        let object = self.get_object()?;
        if object.object_type != BINDER_TYPE_FD {
            return Err(CodecError::TypeMismatch {
                expected: BINDER_TYPE_FD,
                found: object.object_type,
            });
        }
        Ok(object.payload as i32)
    }

    fn offset_marked(&self, at: u64) -> bool {
        self.offsets.chunks_exact(8).any(|entry| {
            let mut word = [0u8; 8];
            word.copy_from_slice(entry);
            u64::from_ne_bytes(word) == at
        })
    }
}
