//! Top-level filesystem driver.
//!
//! [`FileSystem`] owns the device, the sector allocator, and the inode
//! cache behind one [`Mutex`] — the global FS lock — and exposes the
//! syscall-shaped operations as inherent methods taking a
//! `&mut `[`ProcessEnv`]. The lock is acquired once per call and held for
//! the call's entire duration, including nested block I/O and allocator
//! work, so a single top-level call always observes and produces a
//! consistent persistent state.

use std::sync::Mutex;

use crate::alloc::{self, BitmapAllocator};
use crate::block_device::BlockDevice;
use crate::cache::InodeCache;
use crate::directory;
use crate::error::{FsError, FsResult};
use crate::extent;
use crate::file;
use crate::inode::InodeDisk;
use crate::layout::{BITMAP_START, SECTOR_SIZE};
use crate::path;
use crate::process::{Fd, ProcessEnv};

struct FileSystemInner {
    dev: Box<dyn BlockDevice>,
    alloc: BitmapAllocator,
    cache: InodeCache,
    root_sector: u32,
}

/// The mounted filesystem. Cheaply `Send + Sync` (all mutable state sits
/// behind the internal mutex), so it is normally shared as `Arc<FileSystem>`
/// across however many cooperatively scheduled callers the embedder has.
pub struct FileSystem {
    inner: Mutex<FileSystemInner>,
}

impl FileSystem {
    /// Formats `dev` fresh: creates the free-sector bitmap and the root
    /// directory (its own parent), then mounts it.
    pub fn format(dev: Box<dyn BlockDevice>) -> Self {
        Self::mount_inner(dev, true)
    }

    /// Mounts a device, optionally formatting it first.
    pub fn mount(dev: Box<dyn BlockDevice>, format: bool) -> Self {
        Self::mount_inner(dev, format)
    }

    fn mount_inner(mut dev: Box<dyn BlockDevice>, format: bool) -> Self {
        let total = dev.sector_count();
        let mut cache = InodeCache::new();
        let mut sector_alloc = if format {
            BitmapAllocator::create(dev.as_mut(), BITMAP_START, total)
        } else {
            BitmapAllocator::open(dev.as_mut(), BITMAP_START, total)
        };

        let root_sector = if format {
            // The bitmap's own `create` has already marked every sector up
            // through `BITMAP_START + bitmap_len` in use, so the very
            // first sector the allocator hands out is the one immediately
            // after it: that becomes the root directory's fixed home for
            // this device size.
            let sector = sector_alloc
                .allocate(1)
                .expect("a freshly formatted device always has room for the root directory");
            log::info!("fs: formatting {total} sectors, root directory at sector {sector}");
            let root = InodeDisk::new(sector, true);
            dev.write_sector(sector, &root.to_sector());
            cache.adopt(root);
            directory::init(dev.as_mut(), &mut sector_alloc, &mut cache, sector, sector)
                .expect("formatting a fresh root directory cannot fail");
            sector
        } else {
            let sector = BITMAP_START + alloc::bitmap_len_for(total);
            cache.open(dev.as_mut(), sector);
            log::info!("fs: mounted {total} sectors, root directory at sector {sector}");
            sector
        };

        Self {
            inner: Mutex::new(FileSystemInner {
                dev,
                alloc: sector_alloc,
                cache,
                root_sector,
            }),
        }
    }

    /// Persists the allocator's bitmap one last time.
    ///
    /// Every mutation already flushes immediately, so this is a
    /// belt-and-suspenders final write rather than a drain of pending
    /// state.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let dev = inner.dev.as_mut();
        inner.alloc.flush(dev);
        log::info!("fs: shut down");
    }

    pub fn root_sector(&self) -> u32 {
        self.inner.lock().expect("fs lock poisoned").root_sector
    }

    /// Creates a fresh per-process environment rooted at this
    /// filesystem's root directory, holding its own cache reference on
    /// it so a later `chdir` away from the root can safely release it.
    ///
    /// Process creation/destruction itself lives outside this engine;
    /// this hook exists because *something* external must hand a
    /// process its first working directory in a way the inode cache's
    /// ref-counting stays consistent with.
    pub fn new_process(&self) -> ProcessEnv {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let root = inner.root_sector;
        inner.cache.reopen(root);
        ProcessEnv::new(root)
    }

    /// Releases every descriptor still open in `proc`, plus its working
    /// directory. Not part of the syscall surface, but needed for a
    /// clean teardown once a process exits.
    pub fn drop_process(&self, proc: &mut ProcessEnv) {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        for (_, sector) in proc.open_sectors() {
            inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, sector);
        }
        let cwd = proc.cwd_sector;
        inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, cwd);
    }

    // ---- syscall surface -----------------------------------------------

    /// `create(path, size) -> bool`.
    pub fn create(&self, proc: &ProcessEnv, path: &str, size: u64) -> bool {
        self.try_create(proc, path, size, false).is_ok()
    }

    /// `mkdir(path) -> bool`.
    pub fn mkdir(&self, proc: &ProcessEnv, path: &str) -> bool {
        self.try_create(proc, path, 0, true).is_ok()
    }

    fn try_create(&self, proc: &ProcessEnv, path: &str, size: u64, is_dir: bool) -> FsResult<()> {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let inner = &mut *inner;
        let (parent, parent_is_dir, name) = path::resolve(
            inner.dev.as_mut(),
            &mut inner.alloc,
            &mut inner.cache,
            proc.cwd_sector,
            inner.root_sector,
            path,
            false,
        )?;
        let result = create_under(inner, parent, parent_is_dir, &name, size, is_dir);
        inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, parent);
        result
    }

    /// `remove(path) -> bool`.
    pub fn remove(&self, proc: &ProcessEnv, path: &str) -> bool {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let inner = &mut *inner;
        let Ok((parent, parent_is_dir, name)) = path::resolve(
            inner.dev.as_mut(),
            &mut inner.alloc,
            &mut inner.cache,
            proc.cwd_sector,
            inner.root_sector,
            path,
            false,
        ) else {
            return false;
        };
        let result = remove_under(inner, parent, parent_is_dir, &name);
        inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, parent);
        result.is_ok()
    }

    /// `open(path) -> fd`, negative on failure. Opens a file or a
    /// directory; the directory iterator is implicit in the descriptor's
    /// own `dir_cursor`.
    pub fn open(&self, proc: &mut ProcessEnv, path: &str) -> Fd {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let inner = &mut *inner;
        let resolved = path::resolve(
            inner.dev.as_mut(),
            &mut inner.alloc,
            &mut inner.cache,
            proc.cwd_sector,
            inner.root_sector,
            path,
            true,
        );
        match resolved {
            Ok((sector, _is_dir, _)) => proc.alloc_fd(sector),
            Err(_) => -1,
        }
    }

    /// `read(fd, buf, n) -> int`.
    pub fn read(&self, proc: &mut ProcessEnv, fd: Fd, buf: &mut [u8]) -> i32 {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let Ok(pf) = proc.get_mut(fd) else { return -1 };
        let n = file::read_at(inner.dev.as_mut(), &inner.cache, pf.inode_sector, pf.pos, buf);
        pf.pos += n as u64;
        n as i32
    }

    /// `write(fd, buf, n) -> int`. Returns the `-1` sentinel distinct
    /// from the plain `0` a deny-write or zero-length write returns.
    pub fn write(&self, proc: &mut ProcessEnv, fd: Fd, buf: &[u8]) -> i32 {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let inner = &mut *inner;
        let Ok(pf) = proc.get_mut(fd) else { return -1 };
        if buf.is_empty() {
            return 0;
        }
        let target_len = pf.pos + buf.len() as u64;
        match file::write_at(inner.dev.as_mut(), &mut inner.alloc, &mut inner.cache, pf.inode_sector, pf.pos, buf) {
            Ok(n) => {
                pf.pos += n as u64;
                if (n as u64) < buf.len() as u64 && inner.cache.get(pf.inode_sector).length < target_len {
                    -1
                } else {
                    n as i32
                }
            }
            Err(FsError::ReadOnly) => 0,
            Err(_) => -1,
        }
    }

    /// `seek(fd, pos)`.
    pub fn seek(&self, proc: &mut ProcessEnv, fd: Fd, pos: u64) {
        if let Ok(pf) = proc.get_mut(fd) {
            pf.pos = pos;
        }
    }

    /// `tell(fd) -> uint`.
    pub fn tell(&self, proc: &ProcessEnv, fd: Fd) -> i64 {
        proc.get(fd).map(|pf| pf.pos as i64).unwrap_or(-1)
    }

    /// `filesize(fd) -> int`.
    pub fn filesize(&self, proc: &ProcessEnv, fd: Fd) -> i64 {
        let Ok(pf) = proc.get(fd) else { return -1 };
        let inner = self.inner.lock().expect("fs lock poisoned");
        inner.cache.get(pf.inode_sector).length as i64
    }

    /// `close(fd)`.
    pub fn close(&self, proc: &mut ProcessEnv, fd: Fd) {
        let Ok(pf) = proc.take(fd) else { return };
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        if pf.deny_write_held {
            inner.cache.allow_write(pf.inode_sector);
        }
        inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, pf.inode_sector);
    }

    /// `chdir(path) -> bool`.
    pub fn chdir(&self, proc: &mut ProcessEnv, path: &str) -> bool {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let inner = &mut *inner;
        match path::resolve(
            inner.dev.as_mut(),
            &mut inner.alloc,
            &mut inner.cache,
            proc.cwd_sector,
            inner.root_sector,
            path,
            true,
        ) {
            Ok((sector, true, _)) => {
                inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, proc.cwd_sector);
                proc.cwd_sector = sector;
                true
            }
            Ok((sector, false, _)) => {
                inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, sector);
                false
            }
            Err(_) => false,
        }
    }

    /// `readdir(fd, out_name) -> bool`.
    pub fn readdir(&self, proc: &mut ProcessEnv, fd: Fd) -> Option<String> {
        let Ok(pf) = proc.get_mut(fd) else { return None };
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let (name, _sector, _is_dir, next_cursor) =
            directory::readdir(inner.dev.as_mut(), &inner.cache, pf.inode_sector, pf.dir_cursor)?;
        pf.dir_cursor = next_cursor;
        Some(name)
    }

    /// `isdir(fd) -> bool`.
    pub fn isdir(&self, proc: &ProcessEnv, fd: Fd) -> bool {
        let Ok(pf) = proc.get(fd) else { return false };
        let inner = self.inner.lock().expect("fs lock poisoned");
        inner.cache.get(pf.inode_sector).is_dir()
    }

    /// `inumber(fd) -> int`: the inode's own sector, a stable numeric
    /// identity for the life of the descriptor.
    pub fn inumber(&self, proc: &ProcessEnv, fd: Fd) -> i32 {
        proc.get(fd).map(|pf| pf.inode_sector as i32).unwrap_or(-1)
    }

    /// `deny_write(fd)`: bracket a region during which all writes to
    /// this inode fail. A descriptor may deny at most once.
    pub fn deny_write(&self, proc: &mut ProcessEnv, fd: Fd) -> bool {
        let Ok(pf) = proc.get_mut(fd) else { return false };
        if pf.deny_write_held {
            return false;
        }
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        inner.cache.deny_write(pf.inode_sector);
        pf.deny_write_held = true;
        true
    }

    /// `allow_write(fd)`: releases a deny-write interlock this
    /// descriptor holds.
    pub fn allow_write(&self, proc: &mut ProcessEnv, fd: Fd) -> bool {
        let Ok(pf) = proc.get_mut(fd) else { return false };
        if !pf.deny_write_held {
            return false;
        }
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        inner.cache.allow_write(pf.inode_sector);
        pf.deny_write_held = false;
        true
    }

    /// Number of sectors the allocator currently has marked in-use, used
    /// by tests to check that `remove`+final-close returns the device to
    /// its post-format baseline.
    pub fn sectors_in_use(&self) -> usize {
        self.inner.lock().expect("fs lock poisoned").alloc.in_use()
    }

    /// Total sectors on the mounted device.
    pub fn sector_count(&self) -> u32 {
        self.inner.lock().expect("fs lock poisoned").dev.sector_count()
    }

    /// Reads every sector on the mounted device back out as one flat
    /// buffer, for embedders (such as the CLI demo binary) that want to
    /// persist the image between invocations of an otherwise purely
    /// in-memory [`crate::block_device::MemoryDisk`].
    pub fn snapshot(&self) -> Vec<u8> {
        let mut inner = self.inner.lock().expect("fs lock poisoned");
        let total = inner.dev.sector_count();
        let mut bytes = Vec::with_capacity(total as usize * SECTOR_SIZE);
        let mut buf = [0u8; SECTOR_SIZE];
        for s in 0..total {
            inner.dev.read_sector(s, &mut buf);
            bytes.extend_from_slice(&buf);
        }
        bytes
    }
}

/// Allocates a fresh inode under `parent` and links it in as `name`,
/// rolling the inode back if directory setup fails partway through:
/// `create`/`mkdir` must not leave an orphaned, unreachable inode behind
/// on failure.
fn create_under(
    inner: &mut FileSystemInner,
    parent: u32,
    parent_is_dir: bool,
    name: &str,
    size: u64,
    is_dir: bool,
) -> FsResult<()> {
    if !parent_is_dir {
        return Err(FsError::NotDirectory);
    }
    let Some(sector) = inner.alloc.allocate(1) else {
        return Err(FsError::NoSpace);
    };
    let new_inode = InodeDisk::new(sector, is_dir);
    inner.dev.write_sector(sector, &new_inode.to_sector());
    inner.cache.adopt(new_inode);

    let setup = setup_new_inode(inner, parent, name, sector, size, is_dir);
    if let Err(e) = setup {
        let disk_inode = *inner.cache.get(sector);
        file::discard(inner.dev.as_mut(), &mut inner.alloc, &disk_inode);
        inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, sector);
        return Err(e);
    }
    inner.cache.close(inner.dev.as_mut(), &mut inner.alloc, sector);
    log::debug!(
        "fs: created {} at sector {sector} under parent {parent}",
        if is_dir { "directory" } else { "file" }
    );
    Ok(())
}

fn setup_new_inode(
    inner: &mut FileSystemInner,
    parent: u32,
    name: &str,
    sector: u32,
    size: u64,
    is_dir: bool,
) -> FsResult<()> {
    if is_dir {
        directory::init(inner.dev.as_mut(), &mut inner.alloc, &mut inner.cache, sector, parent)?;
    } else if size > 0 {
        file::grow_to(inner.dev.as_mut(), &mut inner.alloc, &mut inner.cache, sector, size);
    }
    directory::add(
        inner.dev.as_mut(),
        &mut inner.alloc,
        &mut inner.cache,
        parent,
        name,
        sector,
        is_dir,
    )
}

/// Removes `name` from `parent`, reporting [`FsError::Busy`] if the
/// target is a directory that turns out to be some process's working
/// directory — an `open-count > 1` heuristic, checked only against
/// directories (an ordinary file may be removed freely no matter how many
/// descriptors hold it open; those handles must keep working until their
/// own close).
///
/// A target with no open reference at all is freed immediately, since
/// nothing will ever close it to trigger the deferred free in
/// [`crate::cache::InodeCache::close`].
fn remove_under(inner: &mut FileSystemInner, parent: u32, parent_is_dir: bool, name: &str) -> FsResult<()> {
    if !parent_is_dir {
        return Err(FsError::NotDirectory);
    }
    let Some((target, is_dir)) = directory::lookup(inner.dev.as_mut(), &inner.cache, parent, name) else {
        return Err(FsError::NotFound);
    };
    if is_dir && inner.cache.open_count(target) > 1 {
        return Err(FsError::Busy);
    }

    let removed_sector = directory::remove(inner.dev.as_mut(), &mut inner.alloc, &mut inner.cache, parent, name)?;
    if inner.cache.open_count(removed_sector) > 0 {
        inner.cache.mark_removed(removed_sector);
    } else {
        free_unopened_inode(inner, removed_sector);
    }
    log::debug!("fs: removed {name:?} from directory {parent}, target sector {removed_sector}");
    Ok(())
}

/// Frees an inode's extents and its own sector directly, for a target
/// that has no handle or cache entry that would otherwise trigger
/// [`crate::cache::InodeCache::close`]'s deferred free.
fn free_unopened_inode(inner: &mut FileSystemInner, sector: u32) {
    let mut buf = [0u8; SECTOR_SIZE];
    inner.dev.read_sector(sector, &mut buf);
    let disk_inode = InodeDisk::from_sector(&buf);
    extent::free_all(inner.dev.as_mut(), &mut inner.alloc, &disk_inode);
    inner.alloc.release(sector, 1);
}
