//! End-to-end behavior of the in-memory filesystem.

mod common;

use std::io::{Cursor, SeekFrom};
use std::time::SystemTime;

use arbor_vfs::{
    ErrorKind, FileMode, FileSystem, MemFs, OpenFlags, ReadableFs, VfsConfig, VfsError,
    VfsFile, WritableFs,
};
use common::init_tracing;

fn file_mode() -> FileMode {
    FileMode::file(0o644)
}

// ============================================================================
// Basic scenarios
// ============================================================================

#[test]
fn test_mkdir_all_then_stat_parent() {
    init_tracing();
    let fs = MemFs::new();
    fs.mkdir_all("a/b/c", FileMode::dir(0o755)).unwrap();

    let entry = fs.stat("a/b").unwrap();
    assert!(entry.is_dir());
    assert_eq!(entry.name(), "b");
    assert_eq!(entry.dir(), "a");

    // idempotent, including for existing prefixes
    fs.mkdir_all("a/b/c", FileMode::dir(0o755)).unwrap();
    fs.mkdir_all("a/b/c/d", FileMode::dir(0o755)).unwrap();
    assert!(fs.stat("a/b/c/d").unwrap().is_dir());
}

#[test]
fn test_write_file_under_missing_parents() {
    init_tracing();
    let fs = MemFs::new();
    fs.write_file("a/b/c/file.txt", b"hello", file_mode()).unwrap();

    assert_eq!(fs.read_file("a/b/c/file.txt").unwrap(), b"hello");
    let entry = fs.stat("a/b/c/file.txt").unwrap();
    assert_eq!(entry.size(), 5);
    assert!(!entry.is_dir());
    assert!(fs.stat("a/b/c").unwrap().is_dir());
}

#[test]
fn test_open_missing_file() {
    init_tracing();
    let fs = MemFs::new();
    let err = fs.open("missing.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().starts_with("open missing.txt:"));
}

#[test]
fn test_growth_from_zero_capacity() {
    init_tracing();
    let fs = MemFs::new();
    let file = fs.create("big.bin").unwrap();
    assert_eq!(file.capacity(), 0);

    let data: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(file.write(&data).unwrap(), 2000);
    assert!(file.capacity() >= 2000);
    file.close().unwrap();

    assert_eq!(fs.read_file("big.bin").unwrap(), data);
}

#[test]
fn test_remove_is_not_implemented() {
    init_tracing();
    let fs = MemFs::new();
    fs.write_file("a/b/c/file.txt", b"hello", file_mode()).unwrap();

    let err = fs.remove("a/b/c/file.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
    assert_eq!(fs.read_file("a/b/c/file.txt").unwrap(), b"hello");

    // independent of input validity
    assert_eq!(fs.remove("").unwrap_err().kind(), ErrorKind::NotImplemented);
    assert_eq!(fs.remove_all("nope").unwrap_err().kind(), ErrorKind::NotImplemented);
    assert_eq!(fs.rename("x", "y").unwrap_err().kind(), ErrorKind::NotImplemented);
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn test_size_and_mtime_track_writes() {
    init_tracing();
    let fs = MemFs::new();
    let file = fs.create("log.txt").unwrap();
    let created = file.stat().unwrap();
    let before = SystemTime::now();

    file.write(b"first line\n").unwrap();
    file.write(b"second\n").unwrap();

    let entry = fs.stat("log.txt").unwrap();
    assert_eq!(entry.size(), 18);
    assert!(entry.mod_time() >= before);
    assert!(entry.mod_time() >= created.mod_time());
    assert!(entry.mod_time() >= entry.attributes().ctime());
}

#[test]
fn test_stat_root_and_dot_paths() {
    init_tracing();
    let fs = MemFs::new();
    fs.mkdir_all("a/b", FileMode::dir(0o755)).unwrap();

    assert!(fs.stat(".").unwrap().is_dir());
    assert_eq!(fs.stat(".").unwrap().path(), ".");
    assert_eq!(fs.stat("a/.").unwrap().path(), "a");
    assert_eq!(fs.stat("a/./b").unwrap().path(), "a/b");
    assert_eq!(fs.stat("a/b/").unwrap().path(), "a/b");
}

#[test]
fn test_file_in_path_is_not_a_directory() {
    init_tracing();
    let fs = MemFs::new();
    fs.write_file("plain", b"", file_mode()).unwrap();

    let err = fs.stat("plain/child").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
    let err = fs.mkdir_all("plain/child", FileMode::dir(0o755)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
    let err = fs.create("plain/child").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
}

#[test]
fn test_mkdir_existing_fails() {
    init_tracing();
    let fs = MemFs::new();
    fs.mkdir("dir", FileMode::dir(0o755)).unwrap();
    let err = fs.mkdir("dir", FileMode::dir(0o755)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.op(), Some(arbor_vfs::Op::Mkdir));
}

// ============================================================================
// Handles
// ============================================================================

#[test]
fn test_read_dir_paging_through_handle() {
    init_tracing();
    let fs = MemFs::new();
    for name in ["c", "a", "b"] {
        fs.write_file(&format!("dir/{name}"), name.as_bytes(), file_mode())
            .unwrap();
    }

    let dir = fs.open("dir").unwrap();
    let first = dir.read_dir(2).unwrap();
    assert_eq!(
        first.iter().map(|e| e.name()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );
    assert!(!first.eof);
    let last = dir.read_dir(2).unwrap();
    assert_eq!(last.len(), 1);
    assert!(last.eof);
    let err = dir.read_dir(2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EndOfDirectory);
    assert!(matches!(err.root_cause(), VfsError::EndOfDirectory));

    let fresh = fs.open("dir").unwrap();
    assert_eq!(fresh.read_dir(-1).unwrap().len(), 3);
    assert!(fresh.read_dir(-1).unwrap().is_empty());
}

#[test]
fn test_truncate_flag_resets_size() {
    init_tracing();
    let fs = MemFs::new();
    fs.write_file("t", b"0123456789", file_mode()).unwrap();
    let file = fs
        .open_file("t", OpenFlags::RDWR | OpenFlags::TRUNC, file_mode())
        .unwrap();
    assert_eq!(file.stat().unwrap().size(), 0);
    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_read_from_source() {
    init_tracing();
    let fs = MemFs::new();
    let file = fs.create("copy").unwrap();
    let mut src = Cursor::new(vec![7u8; 100_000]);
    assert_eq!(file.read_from(&mut src).unwrap(), 100_000);
    assert_eq!(fs.stat("copy").unwrap().size(), 100_000);
}

#[test]
fn test_read_from_failing_source() {
    init_tracing();
    struct Broken;
    impl std::io::Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("upstream failure"))
        }
    }

    let fs = MemFs::new();
    let file = fs.create("sink").unwrap();
    let err = file.read_from(&mut Broken).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.op(), Some(arbor_vfs::Op::ReadFrom));
}

#[test]
fn test_std_io_interop() {
    init_tracing();
    let fs = MemFs::new();
    let mut writer = fs.create("interop").unwrap();
    let mut src = Cursor::new(b"through std::io".to_vec());
    std::io::copy(&mut src, &mut writer).unwrap();

    let mut reader = fs.open("interop").unwrap();
    std::io::Seek::seek(&mut reader, SeekFrom::Start(8)).unwrap();
    let mut out = String::new();
    std::io::Read::read_to_string(&mut reader, &mut out).unwrap();
    assert_eq!(out, "std::io");
}

// ============================================================================
// Views and configuration
// ============================================================================

#[test]
fn test_sub_view_glob_is_relative() {
    init_tracing();
    let fs = MemFs::new();
    fs.write_file("src/lib.rs", b"", file_mode()).unwrap();
    fs.write_file("src/bin/tool.rs", b"", file_mode()).unwrap();
    fs.write_file("README.md", b"", file_mode()).unwrap();

    let src = fs.sub("src").unwrap();
    assert_eq!(src.glob("*.rs").unwrap(), vec!["lib.rs"]);
    assert_eq!(src.glob("*/*.rs").unwrap(), vec!["bin/tool.rs"]);
    assert_eq!(fs.glob("src/*/*.rs").unwrap(), vec!["src/bin/tool.rs"]);
}

#[test]
fn test_sub_view_paths_round_trip() {
    init_tracing();
    let fs = MemFs::new();
    fs.write_file("proj/src/main.rs", b"fn main() {}", file_mode()).unwrap();
    let sub = fs.sub("proj").unwrap();

    let entry = sub.stat("src/main.rs").unwrap();
    let again = sub.stat(entry.path()).unwrap();
    assert_eq!(again.path(), "src/main.rs");
    for listed in sub.read_dir(entry.dir()).unwrap() {
        assert_eq!(sub.read_file(listed.path()).unwrap(), b"fn main() {}");
    }
}

#[test]
fn test_initial_capacity_from_config() {
    init_tracing();
    let config = VfsConfig::from_toml_str("initial_capacity = 128").unwrap();
    let fs = MemFs::with_config(config).unwrap();
    let file = fs.create("f").unwrap();
    assert_eq!(file.capacity(), 128);
    file.write(&[1; 100]).unwrap();
    assert_eq!(file.capacity(), 128);
}

#[test]
fn test_max_content_len_enforced() {
    init_tracing();
    let fs = MemFs::with_config(VfsConfig::default().with_max_content_len(1024)).unwrap();
    let err = fs.write_file("f", &[0; 2048], file_mode()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooLarge);
    assert_eq!(fs.stat("f").unwrap().size(), 0);
}

#[test]
fn test_as_trait_object() {
    init_tracing();
    let fs: Box<dyn FileSystem> = Box::new(MemFs::new());
    fs.write_file("x/y", b"boxed", file_mode()).unwrap();
    assert_eq!(fs.read_dir("x").unwrap().len(), 1);
    assert_eq!(fs.glob("x/*").unwrap(), vec!["x/y"]);
    fs.close().unwrap();
    assert_eq!(fs.close().unwrap_err().kind(), ErrorKind::Closed);
}
