// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Address arithmetic derived from the superblock.
//!
//! XFS divides the device into fixed-size Allocation Groups (AGs) and
//! packs an AG index into the high bits of both inode numbers and block
//! numbers. `Geometry` is the pure value that knows how to convert between
//! the four address spaces in play: inode numbers, inode-size-unit
//! addresses ("iadr"), block numbers, and block-size-unit addresses
//! ("blkadr"). It performs no I/O.

/// An XFS inode number: AG index and in-AG offset packed into one integer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ino(pub u64);

/// An inode address, in inode-size units: `byte_offset = iadr << inodelog`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Iadr(pub u64);

/// A filesystem block number: AG-relative bits packed with the AG index.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Blkno(pub u64);

/// A block address, in block-size units: `byte_offset = blkadr << blocklog`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Blkadr(pub u64);

/// Returns a mask selecting the low `bits` bits of a 64-bit value.
fn mask_low(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Filesystem geometry derived from the superblock. Immutable for the
/// lifetime of a session; all address conversions are pure functions of
/// these few numbers.
#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    pub block_size: u32,
    pub inode_size: u16,
    pub agblocks: u32,
    pub blocklog: u8,
    pub inodelog: u8,
    pub agblklog: u8,
    pub inopblog: u8,
}

impl Geometry {
    /// `agblklog + inopblog`: the number of low bits of an inode number
    /// that are AG-relative (as opposed to selecting the AG itself).
    fn inobits(&self) -> u32 {
        self.agblklog as u32 + self.inopblog as u32
    }

    /// Converts an inode number to an inode address.
    pub fn ino_to_iadr(&self, ino: Ino) -> Iadr {
        let inobits = self.inobits();
        let ag = ino.0 >> inobits;
        let agblocks = self.agblocks as u64;
        Iadr((ag * agblocks << self.inopblog) + (mask_low(inobits) & ino.0))
    }

    /// Converts an inode address back to an inode number. Inverse of
    /// [`Geometry::ino_to_iadr`]; the round trip is checked with a debug
    /// assertion.
    pub fn iadr_to_ino(&self, iadr: Iadr) -> Ino {
        let inobits = self.inobits();
        let adr = iadr.0 << self.inodelog;
        let blkadr = adr >> self.blocklog;
        let agblocks = self.agblocks as u64;
        let ag = blkadr / agblocks;
        let ag_adr = ag * agblocks << self.blocklog;
        let r_adr = adr - ag_adr;
        let ino = Ino((r_adr >> self.inodelog) | (ag << inobits));
        debug_assert_eq!(iadr, self.ino_to_iadr(ino));
        ino
    }

    /// Converts a filesystem block number to a linear block address.
    pub fn blkno_to_blkadr(&self, blkno: Blkno) -> Blkadr {
        let ag = blkno.0 >> self.agblklog;
        let agblocks = self.agblocks as u64;
        Blkadr(agblocks * ag + (mask_low(self.agblklog as u32) & blkno.0))
    }

    /// Byte offset on the device corresponding to an inode address.
    pub fn iadr_byte_offset(&self, iadr: Iadr) -> u64 {
        iadr.0 << self.inodelog
    }

    /// Byte offset on the device corresponding to a block address.
    pub fn blkadr_byte_offset(&self, blkadr: Blkadr) -> u64 {
        blkadr.0 << self.blocklog
    }

    /// Byte offset on the device corresponding to a filesystem block
    /// number, combining [`Geometry::blkno_to_blkadr`] and
    /// [`Geometry::blkadr_byte_offset`].
    pub fn blkno_byte_offset(&self, blkno: Blkno) -> u64 {
        self.blkadr_byte_offset(self.blkno_to_blkadr(blkno))
    }

    /// Byte offset on the device corresponding to an inode number.
    pub fn ino_byte_offset(&self, ino: Ino) -> u64 {
        self.iadr_byte_offset(self.ino_to_iadr(ino))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The geometry from spec.md §8's concrete scenario: block size 4096,
    /// inode size 256, one AG of 1024 blocks.
    fn sample() -> Geometry {
        Geometry {
            block_size: 4096,
            inode_size: 256,
            agblocks: 1024,
            blocklog: 12,
            inodelog: 8,
            agblklog: 10,
            inopblog: 4,
        }
    }

    #[test]
    fn root_inode_roundtrip() {
        let geo = sample();
        let iadr = geo.ino_to_iadr(Ino(128));
        assert_eq!(iadr, Iadr(128));
        assert_eq!(geo.iadr_to_ino(iadr), Ino(128));
    }

    #[test]
    fn ino_iadr_roundtrip_across_ags() {
        let geo = sample();
        for raw in [0u64, 1, 128, 4095, 1 << geo.inobits(), (1 << geo.inobits()) + 7] {
            let ino = Ino(raw);
            let iadr = geo.ino_to_iadr(ino);
            assert_eq!(geo.iadr_to_ino(iadr), ino, "ino {raw} did not round-trip");
        }
    }

    #[test]
    fn iadr_ino_roundtrip() {
        let geo = sample();
        for raw in [0u64, 128, 4096, 8192] {
            let iadr = Iadr(raw);
            let ino = geo.iadr_to_ino(iadr);
            assert_eq!(geo.ino_to_iadr(ino), iadr, "iadr {raw} did not round-trip");
        }
    }

    #[test]
    fn byte_offsets_shift_by_log2() {
        let geo = sample();
        assert_eq!(geo.iadr_byte_offset(Iadr(1)), 256);
        assert_eq!(geo.blkadr_byte_offset(Blkadr(1)), 4096);
    }
}
