// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Ownership of the binder character device
//!
//! One channel per process: device descriptor plus a read-only mapping the
//! driver uses for address-translation bookkeeping. The mapping is never
//! written from userspace. All unsafe device calls live here.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use binder_abi::{
    VersionRecord, WriteRead, BINDER_SET_CONTEXT_MGR, BINDER_SET_MAX_THREADS, BINDER_VERSION,
    BINDER_WRITE_READ, PROTOCOL_VERSION,
};

use crate::{IpcError, Result};

/// Default size of the driver mapping.
///
/// The classic default is 1 MiB minus two pages; that is oversized for a
/// registry daemon, so a small mapping is used unless configured otherwise.
pub const DEFAULT_MAP_SIZE: usize = 128 * 1024;

/// Outcome of one write/read exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeStatus {
    /// The exchange completed; consumed counts are updated.
    Ok,
    /// The driver asked the caller to retry.
    Again,
    /// A driver-side wait timed out; retryable.
    Timeout,
    /// The remote object backing the exchange is gone.
    DeadObject,
}

/// Owned binder device channel.
pub struct DriverChannel {
    fd: OwnedFd,
    map_base: *mut libc::c_void,
    map_size: usize,
}

impl DriverChannel {
    /// Opens `path`, validates the driver protocol version and maps
    /// `map_size` bytes read-only.
    pub fn open(path: &Path, map_size: usize) -> Result<Self> {
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| IpcError::Io(io::Error::from(io::ErrorKind::InvalidInput)))?;
        let raw = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        if raw < 0 {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut version_raw = [0u8; VersionRecord::SIZE];
        let rc = unsafe {
            libc::ioctl(fd.as_raw_fd(), BINDER_VERSION as libc::c_ulong, version_raw.as_mut_ptr())
        };
        if rc < 0 {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }
        let version = VersionRecord::from_bytes(&version_raw);
        if version.protocol_version != PROTOCOL_VERSION {
            return Err(IpcError::VersionMismatch {
                driver: version.protocol_version,
                compiled: PROTOCOL_VERSION,
            });
        }

        let map_base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_size,
                libc::PROT_READ,
                libc::MAP_PRIVATE | libc::MAP_NORESERVE,
                fd.as_raw_fd(),
                0,
            )
        };
        if map_base == libc::MAP_FAILED {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }

        log::debug!("opened {} with {} byte mapping", path.display(), map_size);
        Ok(Self { fd, map_base, map_size })
    }

    /// One-time claim of the context-manager role for this device.
    pub fn request_context_manager(&self) -> Result<()> {
        let zero: u32 = 0;
        let rc = unsafe {
            libc::ioctl(self.fd.as_raw_fd(), BINDER_SET_CONTEXT_MGR as libc::c_ulong, &zero)
        };
        if rc < 0 {
            return Err(IpcError::ContextManagerClaim(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Caps the looper threads the driver may ask this process to spawn.
    pub fn set_max_threads(&self, threads: u32) -> Result<()> {
        let rc = unsafe {
            libc::ioctl(self.fd.as_raw_fd(), BINDER_SET_MAX_THREADS as libc::c_ulong, &threads)
        };
        if rc < 0 {
            return Err(IpcError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Performs one write-then-read exchange.
    ///
    /// With a non-empty read buffer the call blocks until the driver has
    /// work for this thread. On [`ExchangeStatus::Ok`] the consumed counts
    /// in `wr` are updated from the driver.
    pub fn exchange(&self, wr: &mut WriteRead) -> Result<ExchangeStatus> {
        let mut raw = wr.to_bytes();
        let rc = unsafe {
            libc::ioctl(self.fd.as_raw_fd(), BINDER_WRITE_READ as libc::c_ulong, raw.as_mut_ptr())
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(ExchangeStatus::Again),
                Some(libc::ETIMEDOUT) => Ok(ExchangeStatus::Timeout),
                Some(libc::EHOSTDOWN) | Some(libc::ESHUTDOWN) => Ok(ExchangeStatus::DeadObject),
                _ => Err(IpcError::Io(err)),
            };
        }
        *wr = WriteRead::from_bytes(&raw);
        Ok(ExchangeStatus::Ok)
    }

    /// Unmaps and closes the device.
    pub fn close(self) {
        // Teardown lives in Drop so every exit path shares it.
    }
}

impl Drop for DriverChannel {
    fn drop(&mut self) {
        // The fd closes via OwnedFd; only the mapping needs manual teardown.
        unsafe {
            libc::munmap(self.map_base, self.map_size);
        }
    }
}
