// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The traversal driver: walks a directory tree from a root inode,
//! formats and emits a listing line per entry, and optionally extracts
//! (dumps) regular files/symlinks and recreates subdirectories.
//!
//! The original source `chdir()`s into each subdirectory as it recurses
//! and dumps into the process's current working directory. This
//! reimplementation threads the output path explicitly instead — no
//! process-wide mutable state, and recursive calls stay trivially
//! reentrant. See DESIGN.md.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use log::error;

use crate::device::Device;
use crate::dir::read_dir;
use crate::dump;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::geometry::{Geometry, Iadr};
use crate::inode::{read_inode, FileType};
use crate::restore::restore_stats;

/// Where (if anywhere) extracted content should land, and whether to
/// restore original ownership/mode/timestamps onto it.
pub struct ExtractOptions<'a> {
    pub root: &'a Path,
    pub preserve: bool,
}

/// Controls what a traversal emits and how deep it recurses.
pub struct ListOptions<'a> {
    pub depth_cap: u32,
    pub minimal: bool,
    pub filter: &'a Filter,
}

/// Walks the directory tree rooted at `root_iadr`, writing one listing
/// line per visited entry to `sink` and optionally extracting file
/// content under `extract.root`.
pub fn traverse<R: Read + Seek>(
    device: &Device<R>,
    geo: &Geometry,
    root_iadr: Iadr,
    opts: &ListOptions,
    sink: &mut dyn Write,
    extract: Option<&ExtractOptions>,
) -> Result<()> {
    traverse_dir(device, geo, root_iadr, 0, opts, sink, extract.map(|e| e.root), extract.map_or(false, |e| e.preserve))
}

fn traverse_dir<R: Read + Seek>(
    device: &Device<R>,
    geo: &Geometry,
    dir_iadr: Iadr,
    depth: u32,
    opts: &ListOptions,
    sink: &mut dyn Write,
    extract_root: Option<&Path>,
    preserve: bool,
) -> Result<()> {
    let dir_inode = read_inode(device, geo, dir_iadr)?;
    if dir_inode.isdir().is_none() {
        return Err(Error::NotADirectory { iadr: dir_iadr.0 });
    }

    let entries = read_dir(device, geo, dir_iadr, &dir_inode)?;

    for entry in entries {
        if !opts.filter.matches(&entry.name) {
            continue;
        }

        write_entry_line(sink, geo, entry.ino, &entry, opts.minimal)?;

        let is_dir = entry.inode.isdir().is_some();
        if is_dir && depth < opts.depth_cap && entry.name != "." && entry.name != ".." {
            let child_extract_root = match extract_root {
                Some(base) => {
                    let path = base.join(&entry.name);
                    if let Err(e) = std::fs::create_dir(&path) {
                        error!("mkdir({}) failed: {e}", path.display());
                    } else if preserve {
                        restore_stats(&path, &entry.inode);
                    }
                    Some(path)
                }
                None => None,
            };

            let child_iadr = geo.ino_to_iadr(entry.ino);
            if let Err(e) = traverse_dir(device, geo, child_iadr, depth + 1, opts, sink, child_extract_root.as_deref(), preserve) {
                match e {
                    Error::IoError(_) => return Err(e),
                    e => error!("{e}"),
                }
            }
        } else if matches!(entry.inode.mode.typ(), FileType::Regular | FileType::SymLink) {
            if let Some(base) = extract_root {
                let out = base.join(&entry.name);
                let child_iadr = geo.ino_to_iadr(entry.ino);
                match dump::dump(device, geo, child_iadr, &out) {
                    Ok(_) if preserve => restore_stats(&out, &entry.inode),
                    Ok(_) => {}
                    Err(Error::IoError(e)) => return Err(Error::IoError(e)),
                    Err(e) => error!("failed to dump {}: {e}", entry.name),
                }
            }
        }
    }

    Ok(())
}

fn write_entry_line(
    sink: &mut dyn Write,
    geo: &Geometry,
    ino: crate::geometry::Ino,
    entry: &crate::dir::DirEntry,
    minimal: bool,
) -> Result<()> {
    if minimal {
        writeln!(sink, "0x{:08x}\t{}", ino.0, entry.name).map_err(Error::IoError)
    } else {
        let iadr = geo.ino_to_iadr(ino);
        writeln!(
            sink,
            "[ENTRY]\t0x{:08x}\t0x{:08x}\t{:08}\t{:o}\t{}\t{}\t{}",
            iadr.0, ino.0, entry.inode.size, entry.inode.mode.0, entry.inode.uid, entry.inode.gid, entry.name
        )
        .map_err(Error::IoError)
    }
}

/// Convenience for callers that only want the emitted byte stream.
pub fn traverse_to_string<R: Read + Seek>(
    device: &Device<R>,
    geo: &Geometry,
    root_iadr: Iadr,
    opts: &ListOptions,
) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    traverse(device, geo, root_iadr, opts, &mut buf, None)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
