// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Directory decoding: LOCAL (shortform), EXTENTS (block-dir/data-dir),
//! and the unimplemented BTREE case.
//!
//! Each variant ultimately produces the same `Vec<DirEntry>`: synthetic
//! "." and ".." first (LOCAL reads them directly off the header; EXTENTS
//! finds them as ordinary entries in the first data block), followed by
//! the directory's real children.

use std::io::{Read, Seek};

use log::warn;

use crate::bmbt::unpack;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::geometry::{Geometry, Iadr, Ino};
use crate::inode::{read_inode, ForkFormat, InodeCore, INO_DATA_FORK_OFFSET};

/// XFS magic identifying a single-block directory, "XD2B".
pub const XFS_DIR2_BLOCK_MAGIC: u32 = 0x5844_3242;
/// XFS magic identifying a multi-block directory data block, "XD2D".
pub const XFS_DIR2_DATA_MAGIC: u32 = 0x5844_3244;

/// One decoded directory entry: its inode number, name, and already-read
/// inode core (so callers can dispatch on type without a second read).
pub struct DirEntry {
    pub ino: Ino,
    pub name: String,
    pub inode: InodeCore,
}

/// Reads and decodes the directory fork of `dir_inode`, whose address is
/// `iadr`. Dispatches on the inode's data-fork format.
pub fn read_dir<R: Read + Seek>(
    device: &Device<R>,
    geo: &Geometry,
    iadr: Iadr,
    dir_inode: &InodeCore,
) -> Result<Vec<DirEntry>> {
    match dir_inode.format {
        ForkFormat::Local => read_dir_local(device, geo, iadr),
        ForkFormat::Extents => read_dir_extents(device, geo, iadr, dir_inode),
        ForkFormat::Btree => Err(Error::Unsupported("btree directory")),
        _ => Err(Error::NotADirectory { iadr: iadr.0 }),
    }
}

fn try_read_child<R: Read + Seek>(device: &Device<R>, geo: &Geometry, ino: u64) -> Option<InodeCore> {
    match read_inode(device, geo, geo.ino_to_iadr(Ino(ino))) {
        Ok(inode) => Some(inode),
        Err(e) => {
            warn!("skipping directory entry ino=0x{ino:x}: {e}");
            None
        }
    }
}

fn read_dir_local<R: Read + Seek>(device: &Device<R>, geo: &Geometry, iadr: Iadr) -> Result<Vec<DirEntry>> {
    let inode_size = geo.inode_size as usize;
    let mut buf = vec![0u8; inode_size];
    device.read_at(geo.iadr_byte_offset(iadr), &mut buf)?;

    let hdr_off = INO_DATA_FORK_OFFSET as usize;
    let count = buf[hdr_off];
    let i8count = buf[hdr_off + 1];
    let (nentries, inolen): (usize, usize) = if count != 0 {
        (count as usize, 4)
    } else if i8count != 0 {
        (i8count as usize, 8)
    } else {
        return Err(Error::CorruptDirectory { iadr: iadr.0, reason: "count and i8count both zero" });
    };
    if count != 0 && i8count != 0 {
        return Err(Error::CorruptDirectory { iadr: iadr.0, reason: "count and i8count both nonzero" });
    }

    let mut p = hdr_off + 2;
    let parent_ino = read_ino_field(&buf, p, inolen)?;
    p += inolen;

    let mut entries = Vec::with_capacity(nentries + 2);

    let self_ino = geo.iadr_to_ino(iadr);
    let self_inode = read_inode(device, geo, iadr)?;
    entries.push(DirEntry { ino: self_ino, name: ".".to_string(), inode: self_inode });

    if let Some(parent_inode) = try_read_child(device, geo, parent_ino) {
        entries.push(DirEntry { ino: Ino(parent_ino), name: "..".to_string(), inode: parent_inode });
    }

    for _ in 0..nentries {
        if p >= buf.len() {
            return Err(Error::CorruptDirectory { iadr: iadr.0, reason: "shortform entry ran past inode" });
        }
        let namelen = buf[p] as usize;
        p += 1 + 2; // namelen byte, then 2-byte opaque offset tag (skipped)
        if p + namelen + inolen > buf.len() {
            return Err(Error::CorruptDirectory { iadr: iadr.0, reason: "shortform entry ran past inode" });
        }
        let name = String::from_utf8_lossy(&buf[p..p + namelen]).into_owned();
        p += namelen;
        let ino = read_ino_field(&buf, p, inolen)?;
        p += inolen;

        if let Some(inode) = try_read_child(device, geo, ino) {
            entries.push(DirEntry { ino: Ino(ino), name, inode });
        }
    }

    Ok(entries)
}

fn read_ino_field(buf: &[u8], off: usize, inolen: usize) -> Result<u64> {
    if off + inolen > buf.len() {
        return Err(Error::ShortRead { expected: off + inolen, got: buf.len() });
    }
    Ok(if inolen == 4 {
        u32::from_be_bytes(buf[off..off + 4].try_into().unwrap()) as u64
    } else {
        u64::from_be_bytes(buf[off..off + 8].try_into().unwrap())
    })
}

/// Parses one entry in a block/data-directory block starting at `pos`.
/// Returns `(record_size, entry)`, where `entry` is `None` for free-space
/// records (which carry no name/inode). A `record_size` of 0 signals end
/// of the entry list.
fn parse_block_entry(block: &[u8], pos: usize, dir_iadr: u64) -> Result<(usize, Option<(u64, String)>)> {
    if pos + 8 > block.len() {
        return Ok((0, None));
    }
    let ino_field = u64::from_be_bytes(block[pos..pos + 8].try_into().unwrap());
    let top16 = ino_field >> 48;

    if top16 == 0xffff {
        let len = ((ino_field >> 32) & 0xffff) as usize;
        if len == 0 {
            return Ok((0, None));
        }
        if pos + len > block.len() || len < 2 {
            return Err(Error::CorruptDirectory { iadr: dir_iadr, reason: "free-space record runs past block" });
        }
        Ok((len, None))
    } else {
        if pos + 9 > block.len() {
            return Err(Error::CorruptDirectory { iadr: dir_iadr, reason: "entry header runs past block" });
        }
        let namelen = block[pos + 8] as usize;
        if pos + 9 + namelen + 2 > block.len() {
            return Err(Error::CorruptDirectory { iadr: dir_iadr, reason: "entry runs past block" });
        }
        let name = String::from_utf8_lossy(&block[pos + 9..pos + 9 + namelen]).into_owned();
        let raw_size = 8 + 1 + namelen + 2;
        let size = (raw_size + 7) & !7usize;
        if pos + size > block.len() {
            return Err(Error::CorruptDirectory { iadr: dir_iadr, reason: "padded entry runs past block" });
        }
        let tag = u16::from_be_bytes([block[pos + size - 2], block[pos + size - 1]]);
        if tag as usize != pos {
            warn!("block dir tag mismatch (tag=0x{tag:x}, offset=0x{pos:x})");
        }
        Ok((size, Some((ino_field, name))))
    }
}

fn read_dir_extents<R: Read + Seek>(
    device: &Device<R>,
    geo: &Geometry,
    iadr: Iadr,
    dir_inode: &InodeCore,
) -> Result<Vec<DirEntry>> {
    let nextents = dir_inode.nextents as usize;
    let mut rec_buf = vec![0u8; nextents * 16];
    device.read_at(geo.iadr_byte_offset(iadr) + INO_DATA_FORK_OFFSET, &mut rec_buf)?;

    let single_block = nextents == 1;
    let leaf_startoff = 1u64 << (35 - geo.blocklog as u32);

    let mut entries = Vec::new();
    let mut seen_self = false;

    for i in 0..nextents {
        let l0 = u64::from_be_bytes(rec_buf[i * 16..i * 16 + 8].try_into().unwrap());
        let l1 = u64::from_be_bytes(rec_buf[i * 16 + 8..i * 16 + 16].try_into().unwrap());
        let rec = unpack(l0, l1);

        if rec.startoff == leaf_startoff {
            warn!("extent dirs' leaves are not handled (iadr=0x{:x})", iadr.0);
            continue;
        }

        let mut block = vec![0u8; geo.block_size as usize];
        device.read_at(geo.blkno_byte_offset(rec.startblock), &mut block)?;

        let magic = u32::from_be_bytes(block[0..4].try_into().unwrap());
        let expected_magic = if single_block { XFS_DIR2_BLOCK_MAGIC } else { XFS_DIR2_DATA_MAGIC };
        if magic != expected_magic {
            return Err(Error::CorruptDirectory { iadr: iadr.0, reason: "directory block magic mismatch" });
        }

        let mut pos = 0x10usize;
        while pos < block.len() {
            let (size, entry) = parse_block_entry(&block, pos, iadr.0)?;
            if size == 0 {
                break;
            }
            let next_pos = pos + size;

            if let Some((ino_field, name)) = entry {
                if ino_field >> 48 != 0xffff {
                    if let Some(inode) = try_read_child(device, geo, ino_field) {
                        if !seen_self && name == "." {
                            if geo.ino_to_iadr(Ino(ino_field)) != iadr {
                                return Err(Error::CorruptDirectory {
                                    iadr: iadr.0,
                                    reason: "self-reference mismatch on . entry",
                                });
                            }
                            seen_self = true;
                        }
                        entries.push(DirEntry { ino: Ino(ino_field), name, inode });
                    }
                }
            }

            pos = next_pos;
        }
    }

    if entries.len() < 2 {
        return Err(Error::CorruptDirectory { iadr: iadr.0, reason: "fewer than 2 entries after decode" });
    }

    Ok(entries)
}
