//! Reference-counted inode cache.
//!
//! Every open inode lives in memory at most once, keyed by its own
//! sector. `open` loads it from disk on a cold miss and bumps its
//! reference count on a hit; `close` drops the count and, on the last
//! reference to an inode marked `removed`, frees every sector it owns via
//! [`extent::free_all`] and returns its own sector to the allocator.
//! Otherwise the cached copy is simply evicted — every mutation already
//! writes through to disk synchronously, so there is nothing to flush.

use std::collections::BTreeMap;

use crate::alloc::SectorAllocator;
use crate::block_device::BlockDevice;
use crate::extent;
use crate::inode::InodeDisk;
use crate::layout::SECTOR_SIZE;

struct CacheEntry {
    inode: InodeDisk,
    refcount: u32,
    removed: bool,
    deny_write: u32,
}

/// The in-memory table of open inodes.
#[derive(Default)]
pub struct InodeCache {
    entries: BTreeMap<u32, CacheEntry>,
}

impl InodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the inode at `sector`, loading it from disk on a cold miss
    /// and incrementing its reference count either way. Panics if the
    /// loaded sector's magic is invalid — that is structural corruption,
    /// not a recoverable error.
    pub fn open(&mut self, dev: &mut dyn BlockDevice, sector: u32) {
        if let Some(entry) = self.entries.get_mut(&sector) {
            entry.refcount += 1;
            return;
        }
        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sector(sector, &mut buf);
        let inode = InodeDisk::from_sector(&buf);
        assert!(
            inode.is_valid(),
            "inode at sector {sector} has an invalid magic; on-disk state is corrupted"
        );
        self.entries.insert(
            sector,
            CacheEntry {
                inode,
                refcount: 1,
                removed: false,
                deny_write: 0,
            },
        );
    }

    /// Registers a freshly formatted inode that has already been written
    /// to disk, opening it with a single reference.
    pub fn adopt(&mut self, inode: InodeDisk) {
        self.entries.insert(
            inode.self_sector,
            CacheEntry {
                inode,
                refcount: 1,
                removed: false,
                deny_write: 0,
            },
        );
    }

    /// Adds one more reference to an inode already resident in the cache.
    pub fn reopen(&mut self, sector: u32) {
        if let Some(entry) = self.entries.get_mut(&sector) {
            entry.refcount += 1;
        }
    }

    pub fn get(&self, sector: u32) -> &InodeDisk {
        &self.entries.get(&sector).expect("inode not open").inode
    }

    pub fn get_mut(&mut self, sector: u32) -> &mut InodeDisk {
        &mut self.entries.get_mut(&sector).expect("inode not open").inode
    }

    /// Marks the inode at `sector` for deletion: it is physically freed
    /// once its last reference is closed, not before.
    pub fn mark_removed(&mut self, sector: u32) {
        if let Some(entry) = self.entries.get_mut(&sector) {
            entry.removed = true;
        }
    }

    pub fn is_removed(&self, sector: u32) -> bool {
        self.entries
            .get(&sector)
            .map(|e| e.removed)
            .unwrap_or(false)
    }

    pub fn open_count(&self, sector: u32) -> u32 {
        self.entries.get(&sector).map(|e| e.refcount).unwrap_or(0)
    }

    pub fn deny_write(&mut self, sector: u32) {
        if let Some(entry) = self.entries.get_mut(&sector) {
            entry.deny_write += 1;
        }
    }

    pub fn allow_write(&mut self, sector: u32) {
        if let Some(entry) = self.entries.get_mut(&sector) {
            entry.deny_write = entry.deny_write.saturating_sub(1);
        }
    }

    pub fn is_write_denied(&self, sector: u32) -> bool {
        self.entries
            .get(&sector)
            .map(|e| e.deny_write > 0)
            .unwrap_or(false)
    }

    /// Drops one reference to the inode at `sector`. If this was the
    /// last reference and the inode had been marked removed, frees its
    /// extents and its own sector, then evicts it from the cache.
    pub fn close(
        &mut self,
        dev: &mut dyn BlockDevice,
        alloc: &mut dyn SectorAllocator,
        sector: u32,
    ) {
        let Some(entry) = self.entries.get_mut(&sector) else {
            return;
        };
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount > 0 {
            return;
        }
        let entry = self.entries.remove(&sector).unwrap();
        if entry.removed {
            extent::free_all(dev, alloc, &entry.inode);
            alloc.release(sector, 1);
            log::debug!("cache: inode at sector {sector} physically freed");
        }
    }
}
