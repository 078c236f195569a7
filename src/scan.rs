// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Naive linear scans that don't consult any filesystem structure: a
//! sweep across inode-sized slots looking for directory magics, and a
//! raw byte-pattern search. Both are last resorts for when no directory
//! chain survives and are deliberately the dumbest possible algorithm,
//! matching the original tools they're ported from.

use std::io::{Read, Seek};

use crate::device::Device;
use crate::geometry::{Geometry, Ino};
use crate::inode::{peek_magic, read_inode, INO_MAGIC};

/// Fixed block size used by the raw byte search, inherited from the
/// original tool rather than derived from geometry: `rawsearch` runs
/// before any superblock has necessarily been read, over files that may
/// not even be XFS images.
pub const RAWSEARCH_BLOCK_SIZE: u64 = 4096;

/// Walks inode-sized slots starting at `start_ino`, yielding the inode
/// number of every slot that has the `IN` magic and is a directory. Stops
/// when the device runs out of bytes to peek.
pub struct DirFind<'a, R> {
    device: &'a Device<R>,
    geo: &'a Geometry,
    next_ino: u64,
}

impl<'a, R: Read + Seek> DirFind<'a, R> {
    pub fn new(device: &'a Device<R>, geo: &'a Geometry, start_ino: u64) -> DirFind<'a, R> {
        DirFind { device, geo, next_ino: start_ino }
    }
}

impl<'a, R: Read + Seek> Iterator for DirFind<'a, R> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            let ino = self.next_ino;
            let iadr = self.geo.ino_to_iadr(Ino(ino));
            let magic = peek_magic(self.device, self.geo, iadr).ok()?;
            self.next_ino += 1;

            if magic != INO_MAGIC {
                continue;
            }
            let isdir = read_inode(self.device, self.geo, iadr).ok().and_then(|inode| inode.isdir()).is_some();
            if isdir {
                return Some(ino);
            }
        }
    }
}

/// Walks inode-sized slots from `start_ino` upward, matching
/// `xfsr-dirfind.c`'s `main` loop, and yields each directory inode found.
pub fn dirfind<R: Read + Seek>(device: &Device<R>, geo: &Geometry, start_ino: u64) -> DirFind<'_, R> {
    DirFind::new(device, geo, start_ino)
}

/// A `(block_number, offset_in_block)` match location for [`rawsearch`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Match {
    pub block: u64,
    pub offset_in_block: u64,
}

/// Linearly scans the device for `needle`, skipping `skip_blocks` fixed
/// [`RAWSEARCH_BLOCK_SIZE`]-sized blocks first, yielding a [`Match`] per
/// occurrence found. Uses naive byte-at-a-time matching, matching the
/// original's state-machine-over-a-single-pointer approach.
pub fn rawsearch<R: Read + Seek>(device: &Device<R>, needle: &[u8], skip_blocks: u64) -> std::io::Result<Vec<Match>> {
    device.seek_abs(skip_blocks * RAWSEARCH_BLOCK_SIZE)?;

    let mut matches = Vec::new();
    if needle.is_empty() {
        return Ok(matches);
    }

    let mut matched = 0usize;
    let mut nread = 0u64;
    let mut block = skip_blocks;
    let mut byte = [0u8; 1];

    loop {
        let n = device.read(&mut byte)?;
        if n == 0 {
            break;
        }
        nread += 1;
        if nread == RAWSEARCH_BLOCK_SIZE {
            nread = 0;
            block += 1;
        }

        if byte[0] == needle[matched] {
            matched += 1;
            if matched == needle.len() {
                matches.push(Match { block, offset_in_block: nread.wrapping_sub(needle.len() as u64) });
                matched = 0;
            }
        } else {
            matched = 0;
        }
    }

    Ok(matches)
}
