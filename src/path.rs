//! Path resolution.
//!
//! Splits a path into components, then walks them one directory lookup
//! at a time from either the root or the caller's current directory.
//! Every directory stepped through along the way is opened in the inode
//! cache just long enough to look up its next component and then closed
//! again, except the starting directory (owned by the caller already)
//! and the final resolved directory (returned with one extra open
//! reference, which the caller must eventually close). This is what lets
//! `directory::lookup` — which only ever reads inodes already resident
//! in the cache — work on paths that descend through directories the
//! caller never explicitly opened.
//!
//! Short-circuits through any directory that has been marked removed: a
//! directory unlinked out from under an open handle stops resolving new
//! paths through it even though its own handle stays valid until closed.
//!
//! `.` and `..` need no special casing here: both are ordinary records
//! written by [`crate::directory::init`], so an ordinary lookup resolves
//! them.

use crate::alloc::SectorAllocator;
use crate::block_device::BlockDevice;
use crate::cache::InodeCache;
use crate::directory;
use crate::error::{FsError, FsResult};

fn split(path: &str) -> (bool, Vec<&str>) {
    let absolute = path.starts_with('/');
    let comps = path.split('/').filter(|s| !s.is_empty()).collect();
    (absolute, comps)
}

/// `basename(path)`: the substring after the last `/`, or the whole
/// string if there is none. An empty result denotes "the path names the
/// directory itself".
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Resolves `path` against the caller's working directory (or the root,
/// if `path` is absolute), stepping through every intermediate component
/// and — when `include_last` is `true` — the final component too.
///
/// Returns the resolved directory's sector, already opened with one
/// extra inode-cache reference for the caller to eventually
/// `cache.close`, whether it names a directory, and (only when
/// `include_last` is `false`) the final path component the caller should
/// resolve against that directory itself.
///
/// Fails with [`FsError::BadPath`] if `include_last` is `false` and the
/// path has no final component (it is empty or names only `/`).
pub fn resolve(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn SectorAllocator,
    cache: &mut InodeCache,
    cwd_sector: u32,
    root_sector: u32,
    path: &str,
    include_last: bool,
) -> FsResult<(u32, bool, String)> {
    let (absolute, comps) = split(path);
    if !include_last && comps.is_empty() {
        return Err(FsError::BadPath);
    }
    let walk = if include_last { comps.len() } else { comps.len() - 1 };

    let mut cur = if absolute { root_sector } else { cwd_sector };
    cache.reopen(cur);
    let mut cur_is_dir = true;

    for comp in &comps[..walk] {
        if !cur_is_dir {
            cache.close(dev, alloc, cur);
            return Err(FsError::NotDirectory);
        }
        if cache.is_removed(cur) {
            cache.close(dev, alloc, cur);
            return Err(FsError::NotFound);
        }
        let Some((next, is_dir)) = directory::lookup(dev, cache, cur, comp) else {
            cache.close(dev, alloc, cur);
            return Err(FsError::NotFound);
        };
        cache.open(dev, next);
        cache.close(dev, alloc, cur);
        cur = next;
        cur_is_dir = is_dir;
    }

    if cache.is_removed(cur) {
        cache.close(dev, alloc, cur);
        return Err(FsError::NotFound);
    }

    let tail = if include_last {
        String::new()
    } else {
        comps[walk].to_string()
    };
    Ok((cur, cur_is_dir, tail))
}
