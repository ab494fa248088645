//! End-to-end scenarios and universal invariants, each a plain `#[test]`
//! function driving a [`FileSystem`] over a [`MemoryDisk`] with
//! `assert!`/`assert_eq!`, no external test framework.

use sectorfs::block_device::MemoryDisk;
use sectorfs::layout::{DIRECT_COUNT, MAX_FILE_SECTORS, PTRS_PER_INDIRECT, SECTOR_SIZE};
use sectorfs::FileSystem;

const SECTORS: u32 = 20_000;

fn fresh() -> FileSystem {
    FileSystem::format(Box::new(MemoryDisk::new(SECTORS)))
}

fn pattern(i: usize) -> u8 {
    (i % 251) as u8
}

#[test]
fn grow_across_regions() {
    let fs = fresh();
    let mut proc = fs.new_process();

    assert!(fs.create(&proc, "/big", 0));
    let fd = fs.open(&mut proc, "/big");
    assert!(fd >= 0);

    let n = 200_000usize;
    let data: Vec<u8> = (0..n).map(pattern).collect();
    let written = fs.write(&mut proc, fd, &data);
    assert_eq!(written, n as i32);
    assert_eq!(fs.filesize(&proc, fd), n as i64);

    fs.seek(&mut proc, fd, 0);
    let mut out = vec![0u8; n];
    let read = fs.read(&mut proc, fd, &mut out);
    assert_eq!(read, n as i32);
    assert_eq!(out, data);

    // 200_000 bytes is beyond the 12 direct sectors (6144 bytes) and the
    // single-indirect region (12+128 = 140 sectors, 71680 bytes), so this
    // file must have reached into the double-indirect region.
    let sectors_needed = n.div_ceil(SECTOR_SIZE);
    assert!(sectors_needed > DIRECT_COUNT + PTRS_PER_INDIRECT);

    fs.close(&mut proc, fd);
    fs.drop_process(&mut proc);
}

#[test]
fn truncate_by_remove() {
    let fs = fresh();
    let mut proc = fs.new_process();
    let baseline = fs.sectors_in_use();

    assert!(fs.create(&proc, "/a", 8192));
    let fd1 = fs.open(&mut proc, "/a");
    let fd2 = fs.open(&mut proc, "/a");
    assert!(fd1 >= 0 && fd2 >= 0);

    assert!(fs.remove(&proc, "/a"));

    let mut buf = vec![0u8; 8192];
    let read = fs.read(&mut proc, fd1, &mut buf);
    assert_eq!(read, 8192);

    fs.close(&mut proc, fd1);
    fs.close(&mut proc, fd2);
    fs.drop_process(&mut proc);

    assert_eq!(fs.sectors_in_use(), baseline);
}

#[test]
fn directory_tree() {
    let fs = fresh();
    let mut proc = fs.new_process();

    assert!(fs.mkdir(&proc, "/x"));
    assert!(fs.mkdir(&proc, "/x/y"));
    assert!(fs.mkdir(&proc, "/x/y/z"));

    assert!(fs.chdir(&mut proc, "/x/y"));
    let fd = fs.open(&mut proc, "../y/z");
    assert!(fd >= 0, "../y/z should resolve to /x/y/z from cwd /x/y");
    assert!(fs.isdir(&proc, fd));
    fs.close(&mut proc, fd);

    assert!(!fs.remove(&proc, "/x/y"), "non-empty directory must refuse removal");
    assert!(fs.remove(&proc, "/x/y/z"));
    assert!(fs.remove(&proc, "/x/y"));

    fs.drop_process(&mut proc);
}

#[test]
fn name_collision() {
    let fs = fresh();
    let proc = fs.new_process();

    assert!(fs.create(&proc, "/f", 0));
    assert!(!fs.create(&proc, "/f", 0));
    assert!(!fs.mkdir(&proc, "/f"));
}

#[test]
fn deny_write() {
    let fs = fresh();
    let mut proc = fs.new_process();

    assert!(fs.create(&proc, "/exe", 0));
    let fd1 = fs.open(&mut proc, "/exe");
    let fd2 = fs.open(&mut proc, "/exe");

    assert!(fs.deny_write(&mut proc, fd1));
    assert_eq!(fs.write(&mut proc, fd2, b"hello"), 0);

    assert!(fs.allow_write(&mut proc, fd1));
    assert_eq!(fs.write(&mut proc, fd2, b"hello"), 5);

    fs.close(&mut proc, fd1);
    fs.close(&mut proc, fd2);
    fs.drop_process(&mut proc);
}

#[test]
fn max_size_boundary() {
    let fs = fresh();
    let mut proc = fs.new_process();

    assert!(fs.create(&proc, "/m", 0));
    let fd = fs.open(&mut proc, "/m");

    let max_len = MAX_FILE_SECTORS * SECTOR_SIZE;
    let data = vec![0xabu8; max_len];
    let written = fs.write(&mut proc, fd, &data);
    assert_eq!(written as usize, max_len);
    assert_eq!(fs.filesize(&proc, fd), max_len as i64);

    let one_more = fs.write(&mut proc, fd, b"x");
    assert_eq!(one_more, -1);
    assert_eq!(fs.filesize(&proc, fd), max_len as i64);

    fs.close(&mut proc, fd);
    fs.drop_process(&mut proc);
}

#[test]
fn roundtrip_write_then_read_arbitrary_offset() {
    let fs = fresh();
    let mut proc = fs.new_process();
    assert!(fs.create(&proc, "/f", 0));
    let fd = fs.open(&mut proc, "/f");

    let offset = 10_000u64;
    let data: Vec<u8> = (0..5_000usize).map(pattern).collect();
    fs.seek(&mut proc, fd, offset);
    let written = fs.write(&mut proc, fd, &data);
    assert_eq!(written as usize, data.len());

    fs.seek(&mut proc, fd, offset);
    let mut out = vec![0u8; data.len()];
    let read = fs.read(&mut proc, fd, &mut out);
    assert_eq!(read as usize, data.len());
    assert_eq!(out, data);

    fs.close(&mut proc, fd);
    fs.drop_process(&mut proc);
}

#[test]
fn sparse_extension_reads_as_zero() {
    let fs = fresh();
    let mut proc = fs.new_process();
    assert!(fs.create(&proc, "/f", 0));
    let fd = fs.open(&mut proc, "/f");

    // First establish a length of L with some non-zero tail.
    fs.write(&mut proc, fd, b"hello");
    assert_eq!(fs.filesize(&proc, fd), 5);

    // Then write further out, past a gap.
    fs.seek(&mut proc, fd, 4096);
    fs.write(&mut proc, fd, b"world");
    assert_eq!(fs.filesize(&proc, fd), 4101);

    let mut gap = vec![0xffu8; 4096 - 5];
    fs.seek(&mut proc, fd, 5);
    let n = fs.read(&mut proc, fd, &mut gap);
    assert_eq!(n as usize, gap.len());
    assert!(gap.iter().all(|&b| b == 0), "gap between old EOF and new write must read as zero");

    fs.close(&mut proc, fd);
    fs.drop_process(&mut proc);
}

#[test]
fn dedup_two_opens_share_one_inode() {
    let fs = fresh();
    let mut proc = fs.new_process();
    assert!(fs.create(&proc, "/shared", 0));

    let fd1 = fs.open(&mut proc, "/shared");
    let fd2 = fs.open(&mut proc, "/shared");
    assert_ne!(fd1, fd2, "two opens must produce distinct descriptors");

    let written = fs.write(&mut proc, fd1, b"abc");
    assert_eq!(written, 3);

    let mut buf = [0u8; 3];
    let read = fs.read(&mut proc, fd2, &mut buf);
    assert_eq!(read, 3);
    assert_eq!(&buf, b"abc", "a write through fd1 must be immediately visible through fd2");

    fs.close(&mut proc, fd1);
    fs.close(&mut proc, fd2);
    fs.drop_process(&mut proc);
}

#[test]
fn unlink_persistence_across_existing_handles() {
    let fs = fresh();
    let mut proc = fs.new_process();
    assert!(fs.create(&proc, "/doomed", 0));
    let fd = fs.open(&mut proc, "/doomed");
    fs.write(&mut proc, fd, b"still here");

    assert!(fs.remove(&proc, "/doomed"));
    assert!(fs.open(&mut proc, "/doomed") < 0, "removed name must no longer resolve");

    let mut buf = [0u8; 10];
    let n = fs.read(&mut proc, fd, &mut buf);
    assert_eq!(n, 10, "existing handle keeps working until its own close");

    fs.close(&mut proc, fd);
    fs.drop_process(&mut proc);
}

#[test]
fn path_resolution_equivalent_forms() {
    let fs = fresh();
    let mut proc = fs.new_process();
    assert!(fs.mkdir(&proc, "/a"));
    assert!(fs.mkdir(&proc, "/a/b"));
    assert!(fs.create(&proc, "/a/b/c", 0));

    let abs = fs.open(&mut proc, "/a/b/c");
    assert!(abs >= 0);
    let abs_ino = fs.inumber(&proc, abs);
    fs.close(&mut proc, abs);

    assert!(fs.chdir(&mut proc, "/a"));
    let rel = fs.open(&mut proc, "b/c");
    assert!(rel >= 0);
    assert_eq!(fs.inumber(&proc, rel), abs_ino);
    fs.close(&mut proc, rel);

    let dotted = fs.open(&mut proc, "././b/c");
    assert!(dotted >= 0);
    assert_eq!(fs.inumber(&proc, dotted), abs_ino);
    fs.close(&mut proc, dotted);

    fs.drop_process(&mut proc);
}

#[test]
fn readdir_skips_dot_and_dotdot() {
    let fs = fresh();
    let mut proc = fs.new_process();
    assert!(fs.mkdir(&proc, "/dir"));
    assert!(fs.create(&proc, "/dir/one", 0));
    assert!(fs.create(&proc, "/dir/two", 0));

    let fd = fs.open(&mut proc, "/dir");
    let mut names = Vec::new();
    while let Some(name) = fs.readdir(&mut proc, fd) {
        names.push(name);
    }
    names.sort();
    assert_eq!(names, vec!["one".to_string(), "two".to_string()]);
    fs.close(&mut proc, fd);
    fs.drop_process(&mut proc);
}
