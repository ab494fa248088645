//! Free-sector allocator.
//!
//! The allocator tracks free/used sectors across the whole device and hands
//! them out one at a time to the extent engine. It is a flat bitmap rather
//! than a fixed-size-block structure, since there is no separate inode table
//! whose size would otherwise bound the bitmap region.

use crate::block_device::BlockDevice;
use crate::layout::SECTOR_SIZE;

/// Allocates and releases sectors by count.
///
/// The extent engine always requests `n = 1`; `n` is still a parameter so
/// multi-sector requests remain possible for other callers.
pub trait SectorAllocator: Send {
    /// Reserves `n` free sectors and returns the first one allocated, or
    /// `None` if the allocator ran out of space before satisfying the
    /// request.
    fn allocate(&mut self, n: usize) -> Option<u32>;

    /// Returns `n` contiguous sectors starting at `sector` to the free
    /// pool.
    fn release(&mut self, sector: u32, n: usize);

    /// Number of sectors currently marked in-use.
    fn in_use(&self) -> usize;
}

/// A flat, bit-per-sector free map persisted to a reserved prefix of the
/// device.
///
/// The bitmap occupies sectors `[bitmap_start, bitmap_start + bitmap_len)`
/// and tracks every sector on the device, including the bitmap's own
/// sectors and the root directory's sector — both are marked allocated at
/// `create` time so they are never handed out again.
pub struct BitmapAllocator {
    bits: Vec<u64>,
    total: u32,
    bitmap_start: u32,
    bitmap_len: u32,
}

const BITS_PER_WORD: u32 = u64::BITS;

/// Number of sectors a bitmap covering `total` sectors occupies on disk.
///
/// Purely a function of the device's sector count, so both `format` and a
/// later `mount` derive the same root sector (`bitmap_start + bitmap_len`)
/// from `dev.sector_count()` without persisting it anywhere: fixed for a
/// given device size, rather than a single cross-device literal.
pub fn bitmap_len_for(total: u32) -> u32 {
    let words = (total as usize).div_ceil(BITS_PER_WORD as usize);
    ((words * 8).div_ceil(SECTOR_SIZE)) as u32
}

impl BitmapAllocator {
    /// Builds a fresh, all-free bitmap for a device of `total` sectors,
    /// reserving `bitmap_start..bitmap_start+bitmap_len` for the bitmap's
    /// own on-disk image and writes it out via `create`.
    pub fn create(dev: &mut dyn BlockDevice, bitmap_start: u32, total: u32) -> Self {
        let words = (total as usize).div_ceil(BITS_PER_WORD as usize);
        let bitmap_len = bitmap_len_for(total);
        let mut this = Self {
            bits: vec![0u64; words],
            total,
            bitmap_start,
            bitmap_len,
        };
        for s in 0..bitmap_start + bitmap_len {
            this.mark(s, true);
        }
        this.flush(dev);
        this
    }

    /// Re-reads a previously created bitmap image from disk.
    pub fn open(dev: &mut dyn BlockDevice, bitmap_start: u32, total: u32) -> Self {
        let words = (total as usize).div_ceil(BITS_PER_WORD as usize);
        let bitmap_len = bitmap_len_for(total);
        let mut bits = vec![0u64; words];
        let mut buf = [0u8; SECTOR_SIZE];
        let mut byte_off = 0usize;
        for s in bitmap_start..bitmap_start + bitmap_len {
            dev.read_sector(s, &mut buf);
            for chunk in buf.chunks_exact(8) {
                let word_idx = byte_off / 8;
                if word_idx < bits.len() {
                    bits[word_idx] = u64::from_le_bytes(chunk.try_into().unwrap());
                }
                byte_off += 8;
            }
        }
        Self {
            bits,
            total,
            bitmap_start,
            bitmap_len,
        }
    }

    /// Flushes the bitmap's in-memory image back to its reserved sectors.
    pub fn flush(&self, dev: &mut dyn BlockDevice) {
        let mut buf = [0u8; SECTOR_SIZE];
        let bytes: Vec<u8> = self.bits.iter().flat_map(|w| w.to_le_bytes()).collect();
        for (i, s) in (self.bitmap_start..self.bitmap_start + self.bitmap_len).enumerate() {
            buf.fill(0);
            let start = i * SECTOR_SIZE;
            let end = (start + SECTOR_SIZE).min(bytes.len());
            if start < bytes.len() {
                buf[..end - start].copy_from_slice(&bytes[start..end]);
            }
            dev.write_sector(s, &buf);
        }
    }

    fn is_marked(&self, pos: u32) -> bool {
        let (w, b) = (pos / BITS_PER_WORD, pos % BITS_PER_WORD);
        self.bits[w as usize] & (1 << b) != 0
    }

    fn mark(&mut self, pos: u32, used: bool) {
        let (w, b) = (pos / BITS_PER_WORD, pos % BITS_PER_WORD);
        if used {
            self.bits[w as usize] |= 1 << b;
        } else {
            self.bits[w as usize] &= !(1 << b);
        }
    }
}

impl SectorAllocator for BitmapAllocator {
    fn allocate(&mut self, n: usize) -> Option<u32> {
        debug_assert_eq!(n, 1, "extent engine only ever allocates one sector at a time");
        for pos in 0..self.total {
            if !self.is_marked(pos) {
                self.mark(pos, true);
                log::debug!("allocator: sector {pos} marked in-use");
                return Some(pos);
            }
        }
        log::warn!("allocator: out of free sectors");
        None
    }

    fn release(&mut self, sector: u32, n: usize) {
        for s in sector..sector + n as u32 {
            self.mark(s, false);
        }
        log::debug!("allocator: released {n} sector(s) starting at {sector}");
    }

    fn in_use(&self) -> usize {
        (0..self.total).filter(|&p| self.is_marked(p)).count()
    }
}

impl BitmapAllocator {
    /// Number of sectors this bitmap's own on-disk image occupies.
    pub fn bitmap_len(&self) -> u32 {
        self.bitmap_len
    }
}
