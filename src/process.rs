//! Per-process file descriptor table.
//!
//! Each mounted session keeps one current working directory and a table
//! of open file descriptors, each carrying its own seek position and, for
//! directories, its own persistent `readdir` cursor — two descriptors
//! opened on the same path advance independently.

use std::collections::BTreeMap;

use crate::error::{FsError, FsResult};

/// File descriptor numbers, matching the userland syscall ABI's `int`.
pub type Fd = i32;

/// State tracked per open file descriptor.
pub struct ProcessFile {
    /// Sector of the inode this descriptor was opened on.
    pub inode_sector: u32,
    /// Current byte seek position, shared by `read`/`write`.
    pub pos: u64,
    /// Persistent `readdir` cursor; meaningless for non-directories.
    pub dir_cursor: u32,
    /// Whether this specific descriptor is the one holding the inode's
    /// deny-write interlock. A handle may deny at most once; this flag is
    /// what `allow_write` checks before releasing.
    pub deny_write_held: bool,
}

/// A single process's working directory and open file descriptors.
pub struct ProcessEnv {
    pub cwd_sector: u32,
    next_fd: Fd,
    open: BTreeMap<Fd, ProcessFile>,
}

/// The first descriptor number handed out; `0`/`1` are left unused to
/// mirror the standard-stream reservation at the syscall boundary.
const FIRST_FD: Fd = 2;

impl ProcessEnv {
    pub fn new(root_sector: u32) -> Self {
        Self {
            cwd_sector: root_sector,
            next_fd: FIRST_FD,
            open: BTreeMap::new(),
        }
    }

    /// Registers a newly opened inode and returns its fresh descriptor.
    pub fn alloc_fd(&mut self, inode_sector: u32) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(
            fd,
            ProcessFile {
                inode_sector,
                pos: 0,
                dir_cursor: 0,
                deny_write_held: false,
            },
        );
        fd
    }

    pub fn get(&self, fd: Fd) -> FsResult<&ProcessFile> {
        self.open.get(&fd).ok_or(FsError::BadFd)
    }

    pub fn get_mut(&mut self, fd: Fd) -> FsResult<&mut ProcessFile> {
        self.open.get_mut(&fd).ok_or(FsError::BadFd)
    }

    /// Removes and returns the descriptor's state, for the caller to
    /// close out against the inode cache.
    pub fn take(&mut self, fd: Fd) -> FsResult<ProcessFile> {
        self.open.remove(&fd).ok_or(FsError::BadFd)
    }

    /// Every inode sector this process currently holds open, used at
    /// shutdown to close out descriptors left dangling by the caller.
    pub fn open_sectors(&self) -> Vec<(Fd, u32)> {
        self.open.iter().map(|(&fd, f)| (fd, f.inode_sector)).collect()
    }
}
