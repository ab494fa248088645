//! On-disk layout constants.
//!
//! Fixed `const`s rather than a runtime configuration surface: there is no
//! inode table or bitmap region of its own size to derive, since the
//! allocator is an external collaborator, so the layout here is limited to
//! what the inode codec and directory store need.

/// Size of a single sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Sector `0` is reserved to mean "no block" at rest.
pub const NO_SECTOR: u32 = 0;

/// Number of direct data sectors referenced from an inode.
pub const DIRECT_COUNT: usize = 12;

/// Number of single-indirect containers referenced from an inode.
pub const INDIRECT_COUNT: usize = 1;

/// Number of double-indirect containers referenced from an inode.
pub const DINDIRECT_COUNT: usize = 1;

/// Sector addresses packed into one indirect sector (4 bytes each).
pub const PTRS_PER_INDIRECT: usize = SECTOR_SIZE / core::mem::size_of::<u32>();

/// Maximum sectors reachable through direct slots.
pub const MAX_DIRECT_SECTORS: usize = DIRECT_COUNT;

/// Maximum sectors reachable through the single-indirect container.
pub const MAX_INDIRECT_SECTORS: usize = INDIRECT_COUNT * PTRS_PER_INDIRECT;

/// Maximum sectors reachable through the double-indirect container.
pub const MAX_DINDIRECT_SECTORS: usize = DINDIRECT_COUNT * PTRS_PER_INDIRECT * PTRS_PER_INDIRECT;

/// Maximum number of data sectors a single inode can address.
pub const MAX_FILE_SECTORS: usize =
    MAX_DIRECT_SECTORS + MAX_INDIRECT_SECTORS + MAX_DINDIRECT_SECTORS;

/// Maximum file length in bytes: `(12 + 128 + 128*128) * 512`.
pub const MAX_FILE_LEN: u64 = (MAX_FILE_SECTORS * SECTOR_SIZE) as u64;

/// Fixed constant identifying a valid on-disk inode.
pub const INODE_MAGIC: u32 = 0x494e4f32; // "INO2"

/// Bound on a directory entry's name, matching `READDIR_MAX_LEN`.
pub const MAX_NAME_LEN: usize = 14;

/// Sector at which the free-sector bitmap begins; sector `0` is left as
/// the boot/reserved sector ahead of it.
pub const BITMAP_START: u32 = 1;

/// Reserved slot index within a directory for the `..` back-pointer.
pub const PARENT_ENTRY_INDEX: usize = 0;

#[inline]
pub const fn bytes_to_sectors(len: u64) -> usize {
    len.div_ceil(SECTOR_SIZE as u64) as usize
}
