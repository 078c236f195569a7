// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The XFS superblock: sector 0 of the filesystem, read once per session
//! and used to derive [`Geometry`].

use std::io::{Read, Seek};

use zerocopy::byteorder::big_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::geometry::{Geometry, Ino};

/// Magic number identifying an XFS superblock: "XFSB".
pub const XFS_SB_MAGIC: u32 = 0x5846_5342;

/// Enough of the on-disk superblock to derive geometry and basic
/// identifying information. Fields beyond this point (quota inodes, log
/// parameters, V5 feature bits) are outside this tool's scope.
///
/// All multibyte fields are big-endian on disk; the `U16`/`U32`/`U64`
/// wrapper types from `zerocopy` decode them without any separate
/// byte-swap step, so wire bytes and host values are never mixed in the
/// same scope.
#[derive(FromBytes, KnownLayout, Immutable, Debug)]
#[repr(C)]
pub struct RawSuperblock {
    pub magicnum: U32,
    pub blocksize: U32,
    pub dblocks: U64,
    pub rblocks: U64,
    pub rextents: U64,
    pub uuid: [u8; 16],
    pub logstart: U64,
    pub rootino: U64,
    pub rbmino: U64,
    pub rsumino: U64,
    pub rextsize: U32,
    pub agblocks: U32,
    pub agcount: U32,
    pub rbmblocks: U32,
    pub logblocks: U32,
    pub versionnum: U16,
    pub sectsize: U16,
    pub inodesize: U16,
    pub inopblock: U16,
    pub fname: [u8; 12],
    pub blocklog: u8,
    pub sectlog: u8,
    pub inodelog: u8,
    pub inopblog: u8,
    pub agblklog: u8,
    pub rextslog: u8,
    pub inprogress: u8,
    pub imax_pct: u8,
}

static_assertions::const_assert!(core::mem::size_of::<RawSuperblock>() <= 264);

/// Size, in bytes, to read from offset 0 to cover [`RawSuperblock`] and
/// then some (real XFS superblocks are several hundred bytes long; we
/// only parse the prefix we need).
pub const SUPERBLOCK_READ_SIZE: usize = 512;

/// The parsed superblock, owning the data [`Geometry`] is derived from
/// plus a handful of informational fields.
#[derive(Clone, Debug)]
pub struct Superblock {
    pub geometry: Geometry,
    pub root_ino: Ino,
    pub uuid: [u8; 16],
}

impl Superblock {
    /// Reads and validates the superblock at device offset 0. The
    /// device's prior position is preserved.
    pub fn read<R: Read + Seek>(device: &Device<R>) -> Result<Superblock> {
        let mut buf = [0u8; SUPERBLOCK_READ_SIZE];
        device.read_at(0, &mut buf)?;
        Self::parse(&buf)
    }

    /// Parses a superblock from an in-memory buffer (used directly by
    /// tests, and internally by [`Superblock::read`]).
    pub fn parse(buf: &[u8]) -> Result<Superblock> {
        let (raw, _) = RawSuperblock::ref_from_prefix(buf)
            .map_err(|_| Error::BadSuperblock)?;
        if raw.magicnum.get() != XFS_SB_MAGIC {
            return Err(Error::BadSuperblock);
        }
        let geometry = Geometry {
            block_size: raw.blocksize.get(),
            inode_size: raw.inodesize.get(),
            agblocks: raw.agblocks.get(),
            blocklog: raw.blocklog,
            inodelog: raw.inodelog,
            agblklog: raw.agblklog,
            inopblog: raw.inopblog,
        };
        Ok(Superblock {
            geometry,
            root_ino: Ino(raw.rootino.get()),
            uuid: raw.uuid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds a minimal synthetic superblock buffer for the geometry in
    /// spec.md §8: block size 4096, inode size 256, one AG of 1024 blocks.
    pub(crate) fn sample_superblock_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; SUPERBLOCK_READ_SIZE];
        buf[0..4].copy_from_slice(&XFS_SB_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&4096u32.to_be_bytes()); // blocksize
        // skip dblocks/rblocks/rextents/uuid/logstart/rootino/rbmino/rsumino/rextsize
        let agblocks_off = 4 + 4 + 8 + 8 + 8 + 16 + 8 + 8 + 8 + 8 + 4;
        buf[agblocks_off..agblocks_off + 4].copy_from_slice(&1024u32.to_be_bytes());
        let versionnum_off = agblocks_off + 4 + 4 + 4 + 4; // agblocks,agcount,rbmblocks,logblocks
        let inodesize_off = versionnum_off + 2 + 2; // versionnum, sectsize
        buf[inodesize_off..inodesize_off + 2].copy_from_slice(&256u16.to_be_bytes());
        let fname_off = inodesize_off + 2 + 2; // inopblock
        let blocklog_off = fname_off + 12;
        buf[blocklog_off] = 12; // blocklog
        buf[blocklog_off + 1] = 9; // sectlog
        buf[blocklog_off + 2] = 8; // inodelog
        buf[blocklog_off + 3] = 4; // inopblog
        buf[blocklog_off + 4] = 10; // agblklog
        buf
    }

    #[test]
    fn parses_sample_superblock() {
        let buf = sample_superblock_bytes();
        let sb = Superblock::parse(&buf).unwrap();
        assert_eq!(sb.geometry.blocklog, 12);
        assert_eq!(sb.geometry.inodelog, 8);
        assert_eq!(sb.geometry.block_size, 4096);
        assert_eq!(sb.geometry.inode_size, 256);
        assert_eq!(sb.geometry.agblocks, 1024);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = sample_superblock_bytes();
        buf[0] = 0;
        assert!(matches!(Superblock::parse(&buf), Err(Error::BadSuperblock)));
    }

    #[test]
    fn read_preserves_device_position() {
        let buf = sample_superblock_bytes();
        let dev = Device::new(Cursor::new(buf));
        dev.seek_abs(42).unwrap();
        let sb = Superblock::read(&dev).unwrap();
        assert_eq!(sb.geometry.block_size, 4096);
        assert_eq!(dev.tell().unwrap(), 42);
    }
}
