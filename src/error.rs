// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error kinds produced while reading and recovering an XFS filesystem.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while interpreting on-disk XFS structures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a valid XFS superblock (bad magic)")]
    BadSuperblock,

    #[error("not a valid inode at iadr=0x{iadr:x} (bad magic)")]
    InvalidInode { iadr: u64 },

    #[error("not a directory (iadr=0x{iadr:x})")]
    NotADirectory { iadr: u64 },

    #[error("not a regular file or symlink (mode=0o{mode:o})")]
    NotRegularOrSymlink { mode: u16 },

    #[error("corrupt directory at iadr=0x{iadr:x}: {reason}")]
    CorruptDirectory { iadr: u64, reason: &'static str },

    #[error("decode invariant violated while dumping iadr=0x{iadr:x}: {reason}")]
    InvalidExtentList { iadr: u64, reason: &'static str },

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("failed to write recovered data to {path:?}")]
    WriteFailed { path: PathBuf },

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
