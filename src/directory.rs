//! Directory-as-file record store.
//!
//! A directory's contents are just the bytes of a regular file,
//! interpreted as a flat array of fixed-width [`DirEntryDisk`] records.
//! Lookup and removal are linear scans; `add` reuses the first record
//! whose `in_use` flag is clear before growing the file for a new one.
//! Every directory's record `0` is its `..` back-pointer and record `1`
//! is its `.` self-pointer, written once at directory creation and never
//! reused by `add`. Duplicate names are rejected, `remove` refuses a
//! non-empty directory, and `..`/`.` removal reports busy rather than
//! being silently accepted.

use bytemuck::{Pod, Zeroable};

use crate::alloc::SectorAllocator;
use crate::block_device::BlockDevice;
use crate::cache::InodeCache;
use crate::error::{FsError, FsResult};
use crate::file;
use crate::layout::{MAX_NAME_LEN, PARENT_ENTRY_INDEX};

const DOT_INDEX: u32 = PARENT_ENTRY_INDEX as u32 + 1;

/// One fixed-width directory record.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DirEntryDisk {
    pub in_use: u32,
    pub inode_sector: u32,
    pub is_subdir: u32,
    pub name: [u8; MAX_NAME_LEN],
    _pad: [u8; 2],
}

pub const RECORD_LEN: usize = core::mem::size_of::<DirEntryDisk>();

impl DirEntryDisk {
    fn empty() -> Self {
        Self::zeroed()
    }

    fn used(name: &str, inode_sector: u32, is_subdir: bool) -> FsResult<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
            return Err(FsError::BadPath);
        }
        let mut buf = [0u8; MAX_NAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            in_use: 1,
            inode_sector,
            is_subdir: is_subdir as u32,
            name: buf,
            _pad: [0; 2],
        })
    }

    fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

fn record_count(cache: &InodeCache, dir_sector: u32) -> u32 {
    (file::length(cache, dir_sector) / RECORD_LEN as u64) as u32
}

fn read_record(
    dev: &mut dyn BlockDevice,
    cache: &InodeCache,
    dir_sector: u32,
    index: u32,
) -> DirEntryDisk {
    let mut buf = [0u8; RECORD_LEN];
    file::read_at(dev, cache, dir_sector, index as u64 * RECORD_LEN as u64, &mut buf);
    *bytemuck::from_bytes(&buf)
}

fn write_record(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    cache: &mut InodeCache,
    dir_sector: u32,
    index: u32,
    rec: &DirEntryDisk,
) -> FsResult<()> {
    let written = file::write_at(
        dev,
        alloc,
        cache,
        dir_sector,
        index as u64 * RECORD_LEN as u64,
        bytemuck::bytes_of(rec),
    )?;
    if written < RECORD_LEN {
        return Err(FsError::NoSpace);
    }
    Ok(())
}

/// Writes the initial `..`/`.` records for a freshly created directory.
pub fn init(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    cache: &mut InodeCache,
    dir_sector: u32,
    parent_sector: u32,
) -> FsResult<()> {
    write_record(
        dev,
        alloc,
        cache,
        dir_sector,
        PARENT_ENTRY_INDEX as u32,
        &DirEntryDisk::used("..", parent_sector, true)?,
    )?;
    write_record(
        dev,
        alloc,
        cache,
        dir_sector,
        DOT_INDEX,
        &DirEntryDisk::used(".", dir_sector, true)?,
    )
}

/// Looks up `name` in the directory at `dir_sector`.
///
/// Returns the child's inode sector and whether it is itself a
/// directory.
pub fn lookup(
    dev: &mut dyn BlockDevice,
    cache: &InodeCache,
    dir_sector: u32,
    name: &str,
) -> Option<(u32, bool)> {
    let count = record_count(cache, dir_sector);
    for i in 0..count {
        let rec = read_record(dev, cache, dir_sector, i);
        if rec.in_use != 0 && rec.name_str() == name {
            return Some((rec.inode_sector, rec.is_subdir != 0));
        }
    }
    None
}

/// Adds a new `name -> inode_sector` record, failing if `name` already
/// exists in this directory.
pub fn add(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    cache: &mut InodeCache,
    dir_sector: u32,
    name: &str,
    inode_sector: u32,
    is_subdir: bool,
) -> FsResult<()> {
    if name == "." || name == ".." {
        return Err(FsError::Exists);
    }
    let count = record_count(cache, dir_sector);
    let mut free_slot = None;
    for i in 0..count {
        let rec = read_record(dev, cache, dir_sector, i);
        if rec.in_use != 0 {
            if rec.name_str() == name {
                return Err(FsError::Exists);
            }
        } else if free_slot.is_none() {
            free_slot = Some(i);
        }
    }
    let rec = DirEntryDisk::used(name, inode_sector, is_subdir)?;
    let slot = free_slot.unwrap_or(count);
    write_record(dev, alloc, cache, dir_sector, slot, &rec)
}

/// Removes `name` from the directory, refusing to remove `.`/`..` and
/// refusing to remove a subdirectory that is not empty.
pub fn remove(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    cache: &mut InodeCache,
    dir_sector: u32,
    name: &str,
) -> FsResult<u32> {
    if name == "." || name == ".." {
        return Err(FsError::Busy);
    }
    let count = record_count(cache, dir_sector);
    for i in 0..count {
        let rec = read_record(dev, cache, dir_sector, i);
        if rec.in_use != 0 && rec.name_str() == name {
            if rec.is_subdir != 0 && !is_empty(dev, cache, rec.inode_sector) {
                return Err(FsError::DirectoryNotEmpty);
            }
            let cleared = DirEntryDisk::empty();
            write_record(dev, alloc, cache, dir_sector, i, &cleared)?;
            return Ok(rec.inode_sector);
        }
    }
    Err(FsError::NotFound)
}

/// A directory is empty if it has no in-use records besides `.`/`..`.
pub fn is_empty(dev: &mut dyn BlockDevice, cache: &InodeCache, dir_sector: u32) -> bool {
    let count = record_count(cache, dir_sector);
    for i in 0..count {
        if i == PARENT_ENTRY_INDEX as u32 || i == DOT_INDEX {
            continue;
        }
        if read_record(dev, cache, dir_sector, i).in_use != 0 {
            return false;
        }
    }
    true
}

/// Returns the next in-use record at or after `cursor`, along with the
/// cursor value the caller should pass next time, or `None` at
/// end-of-directory. `.`/`..` are skipped, scoping readdir to a
/// directory's real children.
pub fn readdir(
    dev: &mut dyn BlockDevice,
    cache: &InodeCache,
    dir_sector: u32,
    cursor: u32,
) -> Option<(String, u32, bool, u32)> {
    let count = record_count(cache, dir_sector);
    let mut i = cursor;
    while i < count {
        if i != PARENT_ENTRY_INDEX as u32 && i != DOT_INDEX {
            let rec = read_record(dev, cache, dir_sector, i);
            if rec.in_use != 0 {
                return Some((rec.name_str().to_string(), rec.inode_sector, rec.is_subdir != 0, i + 1));
            }
        }
        i += 1;
    }
    None
}
