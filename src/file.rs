//! Byte-addressed file I/O over the extent engine.
//!
//! `read_at`/`write_at` translate a byte range into the sectors it spans
//! and stage any partial leading or trailing sector through a bounce
//! buffer, so callers never need to reason about sector boundaries.
//! `write_at` grows the file through [`extent::extend`] first and
//! returns how many bytes actually landed, which can be short if the
//! allocator ran out of space. Writes are immediate and unbuffered; there
//! is no journal to stage them through.

use crate::alloc::SectorAllocator;
use crate::block_device::BlockDevice;
use crate::cache::InodeCache;
use crate::error::{FsError, FsResult};
use crate::extent;
use crate::inode::InodeDisk;
use crate::layout::SECTOR_SIZE;

fn read_sector(dev: &mut dyn BlockDevice, sector: u32) -> [u8; SECTOR_SIZE] {
    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_sector(sector, &mut buf);
    buf
}

/// Current length in bytes of the inode at `sector`.
pub fn length(cache: &InodeCache, sector: u32) -> u64 {
    cache.get(sector).length
}

/// Reads up to `out.len()` bytes starting at `offset` into `out`,
/// stopping at end-of-file. Returns the number of bytes actually read.
pub fn read_at(
    dev: &mut dyn BlockDevice,
    cache: &InodeCache,
    sector: u32,
    offset: u64,
    out: &mut [u8],
) -> usize {
    let inode = cache.get(sector);
    let file_len = inode.length;
    if offset >= file_len {
        return 0;
    }
    let want = (out.len() as u64).min(file_len - offset) as usize;
    let mut done = 0usize;
    while done < want {
        let pos = offset + done as u64;
        let sector_idx = (pos / SECTOR_SIZE as u64) as u32;
        let in_sector = (pos % SECTOR_SIZE as u64) as usize;
        let chunk = (SECTOR_SIZE - in_sector).min(want - done);

        match extent::locate(dev, inode, sector_idx) {
            Some(data_sector) => {
                let buf = read_sector(dev, data_sector);
                out[done..done + chunk].copy_from_slice(&buf[in_sector..in_sector + chunk]);
            }
            None => {
                out[done..done + chunk].fill(0);
            }
        }
        done += chunk;
    }
    done
}

/// Writes `data` at `offset`, growing the file if `offset + data.len()`
/// exceeds its current length. Returns the number of bytes actually
/// written, which is less than `data.len()` only if growth fell short of
/// covering the whole write.
pub fn write_at(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    cache: &mut InodeCache,
    sector: u32,
    offset: u64,
    data: &[u8],
) -> FsResult<usize> {
    if cache.is_write_denied(sector) {
        return Err(FsError::ReadOnly);
    }

    let target_len = offset + data.len() as u64;
    let inode = cache.get_mut(sector);
    if target_len > inode.length {
        extent::extend(dev, alloc, inode, target_len);
    }

    let inode = cache.get(sector);
    let writable = (data.len() as u64).min(inode.length.saturating_sub(offset)) as usize;

    let mut done = 0usize;
    while done < writable {
        let pos = offset + done as u64;
        let sector_idx = (pos / SECTOR_SIZE as u64) as u32;
        let in_sector = (pos % SECTOR_SIZE as u64) as usize;
        let chunk = (SECTOR_SIZE - in_sector).min(writable - done);

        let Some(data_sector) = extent::locate(dev, cache.get(sector), sector_idx) else {
            break;
        };

        if chunk == SECTOR_SIZE {
            let mut buf = [0u8; SECTOR_SIZE];
            buf.copy_from_slice(&data[done..done + chunk]);
            dev.write_sector(data_sector, &buf);
        } else {
            let mut buf = read_sector(dev, data_sector);
            buf[in_sector..in_sector + chunk].copy_from_slice(&data[done..done + chunk]);
            dev.write_sector(data_sector, &buf);
        }
        done += chunk;
    }
    Ok(done)
}

/// Zero-extends the file at `sector` to `new_len` without writing any
/// caller-supplied bytes, used by directory growth when appending a
/// fresh record past the current end of the directory file.
pub fn grow_to(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    cache: &mut InodeCache,
    sector: u32,
    new_len: u64,
) -> u64 {
    let inode = cache.get_mut(sector);
    if new_len > inode.length {
        extent::extend(dev, alloc, inode, new_len);
    }
    cache.get(sector).length
}

/// Releases every sector owned by the inode at `sector`, used when a
/// create fails partway through and must roll back its freshly allocated
/// inode.
pub fn discard(dev: &mut dyn BlockDevice, alloc: &mut dyn SectorAllocator, inode: &InodeDisk) {
    extent::free_all(dev, alloc, inode);
    alloc.release(inode.self_sector, 1);
}
