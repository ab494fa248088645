//! Extent engine: the direct/indirect/double-indirect growth and lookup
//! state machine.
//!
//! Growth always fills the direct slots first, then the single-indirect
//! container, then the double-indirect container; within the
//! double-indirect region, level-1 pointer blocks are filled left to
//! right and each one is exhausted (128 data pointers) before the next is
//! allocated. `locate` relies on that contiguous-fill invariant: every
//! slot before the last populated one is assumed full. A container sector
//! touched during a single `extend` call (the indirect block, or any
//! double-indirect blocks) is read at most once and written at most once,
//! no matter how many data pointers get appended to it along the way.

use crate::alloc::SectorAllocator;
use crate::block_device::BlockDevice;
use crate::inode::{IndirectBlock, InodeDisk};
use crate::layout::{bytes_to_sectors, DIRECT_COUNT, MAX_FILE_SECTORS, PTRS_PER_INDIRECT, SECTOR_SIZE};

fn read_sector(dev: &mut dyn BlockDevice, sector: u32) -> [u8; SECTOR_SIZE] {
    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_sector(sector, &mut buf);
    buf
}

fn sectors_filled(inode: &InodeDisk) -> u32 {
    let mut n = inode.dir_count;
    if inode.indir_count == 1 {
        n += inode.indir_fill;
    }
    if inode.dindir_count == 1 && inode.dindir_l1_fill > 0 {
        n += (inode.dindir_l1_fill - 1) * PTRS_PER_INDIRECT as u32 + inode.dindir_l2_fill;
    }
    n
}

/// Resolves the `sector_index`-th data sector of `inode`, or `None` if
/// that sector has not been allocated yet.
pub fn locate(dev: &mut dyn BlockDevice, inode: &InodeDisk, sector_index: u32) -> Option<u32> {
    if sector_index < DIRECT_COUNT as u32 {
        return (sector_index < inode.dir_count).then(|| inode.direct[sector_index as usize]);
    }

    let idx = sector_index - DIRECT_COUNT as u32;
    if idx < PTRS_PER_INDIRECT as u32 {
        if inode.indir_count == 0 || idx >= inode.indir_fill {
            return None;
        }
        let blk = IndirectBlock::from_sector(&read_sector(dev, inode.indirect[0]));
        return Some(blk.ptrs[idx as usize]);
    }

    if inode.dindir_count == 0 {
        return None;
    }
    let idx2 = idx - PTRS_PER_INDIRECT as u32;
    let l1 = idx2 / PTRS_PER_INDIRECT as u32;
    let l2 = idx2 % PTRS_PER_INDIRECT as u32;
    if l1 + 1 > inode.dindir_l1_fill {
        return None;
    }
    let is_last_l1 = l1 + 1 == inode.dindir_l1_fill;
    if is_last_l1 && l2 >= inode.dindir_l2_fill {
        return None;
    }
    let l1_blk = IndirectBlock::from_sector(&read_sector(dev, inode.dindirect[0]));
    let l2_sector = l1_blk.ptrs[l1 as usize];
    let l2_blk = IndirectBlock::from_sector(&read_sector(dev, l2_sector));
    Some(l2_blk.ptrs[l2 as usize])
}

/// Grows `inode` to cover `target_len` bytes, allocating one sector at a
/// time from `alloc` and zero-filling every new data sector.
///
/// Stops early if the allocator runs dry or the file would exceed
/// [`crate::layout::MAX_FILE_LEN`]; in either case the inode is left
/// consistent at whatever length was actually achieved, which callers
/// compare against the requested length to detect a short extend.
/// Container sectors (the indirect block and any double-indirect blocks
/// touched during the call) are read at most once and written at most
/// once per call, no matter how many data pointers are appended to them.
/// `inode.self_sector` is rewritten unconditionally before returning.
pub fn extend(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    inode: &mut InodeDisk,
    target_len: u64,
) -> u64 {
    let target_sectors = bytes_to_sectors(target_len).min(MAX_FILE_SECTORS) as u32;
    let zero = [0u8; SECTOR_SIZE];

    let mut indirect_buf = IndirectBlock::empty();
    let mut indirect_loaded = false;
    let mut indirect_dirty = false;

    let mut l1_buf = IndirectBlock::empty();
    let mut l1_loaded = false;
    let mut l1_dirty = false;

    let mut l2_buf = IndirectBlock::empty();
    let mut l2_loaded = false;
    let mut l2_dirty = false;
    let mut l2_sector: u32 = 0;

    loop {
        if sectors_filled(inode) >= target_sectors {
            break;
        }

        if inode.dir_count < DIRECT_COUNT as u32 {
            let Some(s) = alloc.allocate(1) else { break };
            dev.write_sector(s, &zero);
            inode.direct[inode.dir_count as usize] = s;
            inode.dir_count += 1;
            continue;
        }

        if inode.indir_count == 0 {
            let Some(s) = alloc.allocate(1) else { break };
            inode.indirect[0] = s;
            inode.indir_count = 1;
            inode.indir_fill = 0;
            indirect_buf = IndirectBlock::empty();
            indirect_loaded = true;
            indirect_dirty = true;
            continue;
        }

        if inode.indir_fill < PTRS_PER_INDIRECT as u32 {
            if !indirect_loaded {
                indirect_buf = IndirectBlock::from_sector(&read_sector(dev, inode.indirect[0]));
                indirect_loaded = true;
            }
            let Some(s) = alloc.allocate(1) else { break };
            dev.write_sector(s, &zero);
            indirect_buf.ptrs[inode.indir_fill as usize] = s;
            inode.indir_fill += 1;
            indirect_dirty = true;
            continue;
        }

        if inode.dindir_count == 0 {
            let Some(s) = alloc.allocate(1) else { break };
            inode.dindirect[0] = s;
            inode.dindir_count = 1;
            inode.dindir_l1_fill = 0;
            inode.dindir_l2_fill = 0;
            l1_buf = IndirectBlock::empty();
            l1_loaded = true;
            l1_dirty = true;
            continue;
        }

        if !l1_loaded {
            l1_buf = IndirectBlock::from_sector(&read_sector(dev, inode.dindirect[0]));
            l1_loaded = true;
        }

        if inode.dindir_l1_fill == 0 || inode.dindir_l2_fill >= PTRS_PER_INDIRECT as u32 {
            if inode.dindir_l1_fill >= PTRS_PER_INDIRECT as u32 {
                break; // double-indirect region exhausted
            }
            if l2_dirty {
                dev.write_sector(l2_sector, &l2_buf.to_sector());
                l2_dirty = false;
            }
            let Some(s) = alloc.allocate(1) else { break };
            l1_buf.ptrs[inode.dindir_l1_fill as usize] = s;
            inode.dindir_l1_fill += 1;
            inode.dindir_l2_fill = 0;
            l1_dirty = true;
            l2_buf = IndirectBlock::empty();
            l2_loaded = true;
            l2_sector = s;
            l2_dirty = true;
            continue;
        }

        if !l2_loaded {
            let cur = l1_buf.ptrs[(inode.dindir_l1_fill - 1) as usize];
            l2_buf = IndirectBlock::from_sector(&read_sector(dev, cur));
            l2_sector = cur;
            l2_loaded = true;
        }

        let Some(s) = alloc.allocate(1) else { break };
        dev.write_sector(s, &zero);
        l2_buf.ptrs[inode.dindir_l2_fill as usize] = s;
        inode.dindir_l2_fill += 1;
        l2_dirty = true;
    }

    if indirect_dirty {
        dev.write_sector(inode.indirect[0], &indirect_buf.to_sector());
    }
    if l1_dirty {
        dev.write_sector(inode.dindirect[0], &l1_buf.to_sector());
    }
    if l2_dirty {
        dev.write_sector(l2_sector, &l2_buf.to_sector());
    }

    let achieved_sectors = sectors_filled(inode);
    inode.length = if achieved_sectors >= target_sectors {
        target_len.min((MAX_FILE_SECTORS * SECTOR_SIZE) as u64)
    } else {
        achieved_sectors as u64 * SECTOR_SIZE as u64
    };
    dev.write_sector(inode.self_sector, &inode.to_sector());
    inode.length
}

/// Releases every data and container sector owned by `inode`, in reverse
/// allocation order (double-indirect, then single-indirect, then
/// direct), the order a reference-counted cache entry frees its extents
/// on final close.
pub fn free_all(dev: &mut dyn BlockDevice, alloc: &mut dyn SectorAllocator, inode: &InodeDisk) {
    if inode.dindir_count == 1 {
        let l1_blk = IndirectBlock::from_sector(&read_sector(dev, inode.dindirect[0]));
        for l1 in 0..inode.dindir_l1_fill {
            let l2_sector = l1_blk.ptrs[l1 as usize];
            let l2_blk = IndirectBlock::from_sector(&read_sector(dev, l2_sector));
            let count = if l1 + 1 == inode.dindir_l1_fill {
                inode.dindir_l2_fill
            } else {
                PTRS_PER_INDIRECT as u32
            };
            for i in 0..count {
                alloc.release(l2_blk.ptrs[i as usize], 1);
            }
            alloc.release(l2_sector, 1);
        }
        alloc.release(inode.dindirect[0], 1);
    }

    if inode.indir_count == 1 {
        let blk = IndirectBlock::from_sector(&read_sector(dev, inode.indirect[0]));
        for i in 0..inode.indir_fill {
            alloc.release(blk.ptrs[i as usize], 1);
        }
        alloc.release(inode.indirect[0], 1);
    }

    for i in 0..inode.dir_count {
        alloc.release(inode.direct[i as usize], 1);
    }
}
