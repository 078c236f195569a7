// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forensic/recovery toolkit for damaged XFS filesystems: reads an XFS
//! block device or image read-only, interprets on-disk structures
//! directly, and extracts directory listings and file content from
//! inodes whose locations are known or discoverable by scanning.
//!
//! The CLI binary (`src/main.rs`) is a thin shell over this library;
//! everything that actually interprets the on-disk format lives here and
//! has no dependency on `clap` or the process environment.

pub mod bmbt;
pub mod device;
pub mod dir;
pub mod dump;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod inode;
pub mod restore;
pub mod scan;
pub mod superblock;
pub mod traverse;

pub use error::{Error, Result};
pub use geometry::Geometry;
