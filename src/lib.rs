//! `sectorfs` — an inode-based block allocation engine for a flat,
//! fixed-block-size storage device.
//!
//! This crate implements the core of an educational on-disk file system:
//! direct/single-indirect/double-indirect inode extents that grow lazily
//! during writes, hierarchical directory resolution over absolute and
//! relative paths, a reference-counted in-memory inode cache, and a
//! byte-addressed file-handle layer with seek and deny-write semantics.
//! The raw block device and the free-sector allocator are abstract
//! collaborators (see [`block_device::BlockDevice`] and
//! [`alloc::SectorAllocator`]); this crate ships one concrete
//! implementation of each so the engine can format, mount, and run
//! end-to-end without an external test double.
//!
//! [`fs::FileSystem`] is the entry point: `format`/`mount` a device, then
//! drive it through the syscall-shaped methods (`create`, `open`,
//! `read`, `write`, `mkdir`, `chdir`, ...), each of which takes a
//! `&mut `[`process::ProcessEnv`] standing in for the caller's per-process
//! working directory and open-file table.

pub mod alloc;
pub mod block_device;
pub mod cache;
pub mod directory;
pub mod error;
pub mod extent;
pub mod file;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod path;
pub mod process;

pub use block_device::{BlockDevice, MemoryDisk};
pub use error::{FsError, FsResult};
pub use fs::FileSystem;
pub use process::{Fd, ProcessEnv};
