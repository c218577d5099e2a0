// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Best-effort binderfs provisioning before the device is opened
//!
//! Mirrors what init would do on a fully-provisioned system: mount the
//! binderfs instance, allocate the device node through binder-control and
//! open its permissions. Every step is skipped when the node already
//! exists, and individual failures are logged rather than fatal — the
//! definitive check is the device open that follows.

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::ptr;

use binder_abi::{FsDevice, BINDER_CTL_ADD};

use crate::config::Config;

/// Ensures the configured device node exists, creating it if possible.
pub fn ensure_device(config: &Config) {
    if config.device.exists() {
        return;
    }

    if let Err(err) = fs::create_dir_all(&config.mount_point) {
        log::warn!("create {}: {err}", config.mount_point.display());
    }
    if let Err(err) = mount_binderfs(&config.mount_point) {
        log::warn!("mount binderfs on {}: {err}", config.mount_point.display());
    }
    match allocate_device(&config.control, &config.device_name) {
        Ok((major, minor)) => {
            log::info!("allocated binder device {} ({major}:{minor})", config.device_name);
        }
        Err(err) => log::warn!("allocate {}: {err}", config.device_name),
    }
    if let Err(err) = open_permissions(&config.device) {
        log::warn!("chmod {}: {err}", config.device.display());
    }
}

fn mount_binderfs(mount_point: &Path) -> io::Result<()> {
    let target = CString::new(mount_point.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let rc = unsafe {
        libc::mount(ptr::null(), target.as_ptr(), c"binder".as_ptr(), 0, ptr::null())
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        // An instance mounted by a previous run is fine.
        if err.raw_os_error() != Some(libc::EBUSY) {
            return Err(err);
        }
    }
    Ok(())
}

fn allocate_device(control: &Path, name: &str) -> io::Result<(u32, u32)> {
    let cpath = CString::new(control.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let raw = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let mut record = FsDevice::named(name).to_bytes();
    let rc = unsafe {
        libc::ioctl(fd.as_raw_fd(), BINDER_CTL_ADD as libc::c_ulong, record.as_mut_ptr())
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    let allocated = FsDevice::from_bytes(&record);
    Ok((allocated.major, allocated.minor))
}

fn open_permissions(device: &Path) -> io::Result<()> {
    let metadata = fs::metadata(device)?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o006);
    fs::set_permissions(device, permissions)
}
