//! On-disk inode layout.
//!
//! `InodeDisk` is the exact byte image stored in an inode's own sector;
//! `IndirectBlock` is the exact byte image of a single-indirect or
//! double-indirect container sector. Both derive `bytemuck::{Pod,
//! Zeroable}` so they can be reinterpreted directly from a `[u8; 512]`
//! sector buffer with no manual (de)serialization code.

use bytemuck::{Pod, Zeroable};

use crate::layout::{
    DINDIRECT_COUNT, DIRECT_COUNT, INDIRECT_COUNT, INODE_MAGIC, PTRS_PER_INDIRECT, SECTOR_SIZE,
};

/// The on-disk inode, occupying exactly one sector.
///
/// `_pad` brings the struct up to `SECTOR_SIZE` bytes so it can be read and
/// written whole.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct InodeDisk {
    /// File length in bytes.
    pub length: u64,
    /// Must equal [`INODE_MAGIC`] for the inode to be considered valid.
    pub magic: u32,
    /// The sector this inode itself lives at; used for self-consistency
    /// checks and by the cache's lookup key.
    pub self_sector: u32,
    /// Nonzero if this inode is a directory.
    pub is_dir: u32,
    /// Direct data sector pointers, `0` meaning unallocated.
    pub direct: [u32; DIRECT_COUNT],
    /// Number of populated entries in `direct`, in order.
    pub dir_count: u32,
    /// Single-indirect container sector pointers, `0` meaning unallocated.
    pub indirect: [u32; INDIRECT_COUNT],
    /// Number of populated entries in `indirect`.
    pub indir_count: u32,
    /// Number of populated data-sector slots inside the single-indirect
    /// container currently being filled.
    pub indir_fill: u32,
    /// Double-indirect container sector pointers, `0` meaning unallocated.
    pub dindirect: [u32; DINDIRECT_COUNT],
    /// Number of populated entries in `dindirect`.
    pub dindir_count: u32,
    /// Number of populated level-1 (pointer-to-pointer-block) slots inside
    /// the double-indirect container currently being filled.
    pub dindir_l1_fill: u32,
    /// Number of populated data-sector slots inside the level-2 block
    /// currently being filled under that level-1 slot.
    pub dindir_l2_fill: u32,
    _pad: [u8; PAD_LEN],
}

const HEADER_LEN: usize = 8 // length
    + 4 // magic
    + 4 // self_sector
    + 4 // is_dir
    + DIRECT_COUNT * 4
    + 4 // dir_count
    + INDIRECT_COUNT * 4
    + 4 // indir_count
    + 4 // indir_fill
    + DINDIRECT_COUNT * 4
    + 4 // dindir_count
    + 4 // dindir_l1_fill
    + 4; // dindir_l2_fill
const PAD_LEN: usize = SECTOR_SIZE - HEADER_LEN;

const _: () = assert!(core::mem::size_of::<InodeDisk>() == SECTOR_SIZE);

impl InodeDisk {
    /// Builds a fresh, empty inode image bound to `self_sector`.
    pub fn new(self_sector: u32, is_dir: bool) -> Self {
        Self {
            length: 0,
            magic: INODE_MAGIC,
            self_sector,
            is_dir: is_dir as u32,
            direct: [0; DIRECT_COUNT],
            dir_count: 0,
            indirect: [0; INDIRECT_COUNT],
            indir_count: 0,
            indir_fill: 0,
            dindirect: [0; DINDIRECT_COUNT],
            dindir_count: 0,
            dindir_l1_fill: 0,
            dindir_l2_fill: 0,
            _pad: [0; PAD_LEN],
        }
    }

    /// `true` if `magic` identifies a valid formatted inode.
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    /// Reinterprets a raw sector buffer as an inode image.
    pub fn from_sector(buf: &[u8; SECTOR_SIZE]) -> Self {
        *bytemuck::from_bytes(buf)
    }

    /// Serializes this inode image to a raw sector buffer.
    pub fn to_sector(&self) -> [u8; SECTOR_SIZE] {
        bytemuck::bytes_of(self).try_into().unwrap()
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }
}

/// A single indirect or double-indirect container sector: a flat array of
/// sector pointers, `0` meaning unallocated, with no header of its own.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct IndirectBlock {
    pub ptrs: [u32; PTRS_PER_INDIRECT],
}

const _: () = assert!(core::mem::size_of::<IndirectBlock>() == SECTOR_SIZE);

impl IndirectBlock {
    pub fn empty() -> Self {
        Self {
            ptrs: [0; PTRS_PER_INDIRECT],
        }
    }

    pub fn from_sector(buf: &[u8; SECTOR_SIZE]) -> Self {
        *bytemuck::from_bytes(buf)
    }

    pub fn to_sector(&self) -> [u8; SECTOR_SIZE] {
        bytemuck::bytes_of(self).try_into().unwrap()
    }
}

const _: () = assert!(DINDIRECT_COUNT == 1 && INDIRECT_COUNT == 1);
