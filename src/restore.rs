// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Restoring ownership, mode, and timestamps onto a freshly dumped file,
//! gated behind `--preserve`. A thin shell over `nix`'s POSIX wrappers;
//! failures are logged and never abort the dump, matching the original's
//! `restore_stats` (each call is attempted independently).

use std::path::Path;

use log::warn;
use nix::sys::stat::{utimensat, UtimensatFlags};
use nix::sys::time::TimeSpec;
use nix::unistd::{chown, Gid, Uid};

use crate::inode::InodeCore;

/// Restores uid/gid, mode, and atime/mtime from `inode` onto `path`.
/// Every step is attempted independently; a failure is logged at `warn!`
/// and does not prevent the remaining steps from running.
pub fn restore_stats(path: &Path, inode: &InodeCore) {
    if let Err(e) = chown(path, Some(Uid::from_raw(inode.uid)), Some(Gid::from_raw(inode.gid))) {
        warn!("chown({}) failed: {e}", path.display());
    }

    if let Err(e) = std::fs::set_permissions(path, std::os::unix::fs::PermissionsExt::from_mode(inode.mode.0 as u32)) {
        warn!("chmod({}) failed: {e}", path.display());
    }

    let atime = TimeSpec::new(inode.atime.sec as i64, inode.atime.nsec as i64);
    let mtime = TimeSpec::new(inode.mtime.sec as i64, inode.mtime.nsec as i64);
    if let Err(e) = utimensat(None, path, &atime, &mtime, UtimensatFlags::FollowSymlink) {
        warn!("utimes({}) failed: {e}", path.display());
    }
}
