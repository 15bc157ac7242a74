use std::{
    fs::OpenOptions,
    io::{Seek, SeekFrom, Write},
    path::PathBuf,
};

use tempfile::TempDir;

use super::*;
use crate::fs::volume::VolumeLayout;

fn scratch(block_size: u32) -> (TempDir, PathBuf, FileSystem) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("volume.img");
    let fs = FileSystem::format(&path, block_size).unwrap();
    (dir, path, fs)
}

fn names(records: &[DirectoryEntry]) -> Vec<String> {
    records.iter().map(|r| r.name()).collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251 + 1) as u8).collect()
}

#[test]
fn format_reserves_block_zero_for_root() {
    let (_dir, _path, fs) = scratch(1024);

    assert!(fs.allocation_table().is_busy(ROOT_BLOCK));
    assert_eq!(fs.allocation_table().busy_count(), 1);
    assert_eq!(fs.entries().len(), 1);

    let root = fs.find_entry(ROOT_NAME).unwrap();
    assert!(root.is_directory());
    assert_eq!(root.attributes(), Attributes::DIRECTORY_DEFAULT);
    assert_eq!(names(&fs.list_directory("/").unwrap()), vec!["/"]);
}

#[test]
fn written_content_reads_back() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"hello world").unwrap();

    let content = fs.read_file("/a.txt", "/b.txt", None).unwrap();
    assert_eq!(content, b"hello world");

    // read 同时生成了一份副本
    let copy = fs.find_entry("b.txt").unwrap();
    assert_eq!(copy.size(), 11);
    assert_eq!(fs.read_file("/b.txt", "/c.txt", None).unwrap(), b"hello world");
}

#[test]
fn content_is_cut_at_first_zero_byte() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/z.bin", b"ab\0cd").unwrap();
    assert_eq!(fs.read_file("/z.bin", "/out", None).unwrap(), b"ab");
}

#[test]
fn empty_file_still_owns_a_block() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/empty", b"").unwrap();

    let entry = fs.find_entry("empty").unwrap();
    assert_eq!(entry.size(), 0);
    assert!(fs.allocation_table().is_busy(entry.first_block()));
    assert!(fs.read_file("/empty", "/out", None).unwrap().is_empty());
}

#[test]
fn multi_block_files_are_chained() {
    let (_dir, _path, mut fs) = scratch(512);
    let content = pattern(1300);
    fs.write_file("/big.dat", &content).unwrap();

    let entry = fs.find_entry("big").unwrap().clone();
    let chain = fs.allocation_table().chain(entry.first_block());
    assert_eq!(chain, vec![1, 2, 3]);
    assert_eq!(fs.allocation_table().next(3), None);

    assert_eq!(fs.read_file("/big.dat", "/copy", None).unwrap(), content);
}

#[test]
fn make_directory_shows_up_in_root_listing() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/foo").unwrap();

    let root = fs.list_directory("/").unwrap();
    let foo = root.iter().find(|r| r.name() == "foo").unwrap();
    assert!(foo.is_directory());
    assert!(fs.allocation_table().is_busy(foo.first_block()));

    // 新目录块里是自己和父目录的副本
    assert_eq!(names(&fs.list_directory("/foo").unwrap()), vec!["foo", "/"]);
}

#[test]
fn make_directory_checks_parent_and_duplicates() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/docs").unwrap();

    assert!(matches!(
        fs.make_directory("/docs"),
        Err(FileSystemError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.make_directory("/nowhere/x"),
        Err(FileSystemError::NotFound(_))
    ));
    assert!(matches!(
        fs.make_directory("/"),
        Err(FileSystemError::InvalidPath(_))
    ));
}

#[test]
fn nested_files_live_in_their_directory_block() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/docs").unwrap();
    fs.write_file("/docs/n.txt", b"note").unwrap();

    assert!(names(&fs.list_directory("/docs").unwrap()).contains(&"n".to_string()));
    assert!(!names(&fs.list_directory("/").unwrap()).contains(&"n".to_string()));
    assert_eq!(fs.read_file("/docs/n.txt", "/docs/m", None).unwrap(), b"note");
}

#[test]
fn write_into_read_only_directory_is_denied() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/d").unwrap();
    fs.change_mode("/d", PermissionDelta::RemoveWrite).unwrap();

    let busy = fs.allocation_table().busy_count();
    let count = fs.entries().len();

    assert!(matches!(
        fs.write_file("/d/secret.txt", b"x"),
        Err(FileSystemError::PermissionDenied(_))
    ));
    assert_eq!(fs.allocation_table().busy_count(), busy);
    assert_eq!(fs.entries().len(), count);
    assert!(fs.find_entry("secret").is_none());
}

#[test]
fn directory_mode_change_updates_both_records() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/d").unwrap();
    fs.change_mode("/d", PermissionDelta::RemoveWrite).unwrap();

    let root = fs.list_directory("/").unwrap();
    let in_parent = root.iter().find(|r| r.name() == "d").unwrap();
    assert_eq!(in_parent.attributes().bits(), 0x11);

    let own = fs.list_directory("/d").unwrap();
    assert_eq!(own[0].attributes().bits(), 0x11);
    assert_eq!(fs.find_entry("d").unwrap().attributes().bits(), 0x11);
}

#[test]
fn duplicate_file_is_rejected() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"one").unwrap();
    let busy = fs.allocation_table().busy_count();

    assert!(matches!(
        fs.write_file("/a.txt", b"two"),
        Err(FileSystemError::AlreadyExists(_))
    ));
    // 扩展名不参与比较
    assert!(matches!(
        fs.write_file("/a.md", b"two"),
        Err(FileSystemError::AlreadyExists(_))
    ));
    assert_eq!(fs.allocation_table().busy_count(), busy);
}

#[test]
fn password_protects_reads() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"top secret").unwrap();
    fs.add_password("/a.txt", "pw").unwrap();

    let entry = fs.find_entry("a").unwrap();
    assert!(entry.has_password());
    assert_eq!(entry.attributes(), Attributes::FILE_DEFAULT);

    assert!(matches!(
        fs.read_file("/a.txt", "/out", Some("nope")),
        Err(FileSystemError::AuthenticationFailed(_))
    ));
    assert!(matches!(
        fs.read_file("/a.txt", "/out", None),
        Err(FileSystemError::AuthenticationFailed(_))
    ));
    assert_eq!(fs.read_file("/a.txt", "/out", Some("pw")).unwrap(), b"top secret");
}

#[test]
fn overlong_password_is_rejected_before_any_change() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"data").unwrap();
    let before = fs.find_entry("a").unwrap().clone();

    assert!(matches!(
        fs.add_password("/a.txt", "much-too-long"),
        Err(FileSystemError::InvalidArgument(_))
    ));
    assert_eq!(fs.find_entry("a").unwrap(), &before);
}

#[test]
fn change_mode_drops_password_and_add_password_resets_mode() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"data").unwrap();
    fs.add_password("/a.txt", "pw").unwrap();

    fs.change_mode("/a.txt", PermissionDelta::RemoveWrite).unwrap();
    let entry = fs.find_entry("a").unwrap();
    assert_eq!(entry.attributes().bits(), 0x21);
    assert!(!entry.has_password());
    assert_eq!(fs.read_file("/a.txt", "/out", None).unwrap(), b"data");

    fs.add_password("/a.txt", "pw2").unwrap();
    let entry = fs.find_entry("a").unwrap();
    assert_eq!(entry.attributes(), Attributes::FILE_DEFAULT);
    assert!(entry.check_password(Some("pw2")));
}

#[test]
fn unreadable_file_cannot_be_read() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"data").unwrap();
    fs.change_mode("/a.txt", PermissionDelta::RemoveRead).unwrap();

    assert!(matches!(
        fs.read_file("/a.txt", "/out", None),
        Err(FileSystemError::PermissionDenied(_))
    ));
}

#[test]
fn read_replaces_existing_destination() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a", b"fresh").unwrap();
    fs.write_file("/out", b"stale").unwrap();

    fs.read_file("/a", "/out", None).unwrap();
    assert_eq!(fs.read_file("/out", "/check", None).unwrap(), b"fresh");
    assert_eq!(
        fs.entries().iter().filter(|e| e.matches("out")).count(),
        1
    );
}

#[test]
fn copy_from_existing_file() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"abc").unwrap();

    fs.write_file_from_existing("/c.txt", "/a.txt").unwrap();
    assert_eq!(fs.read_file("/c.txt", "/out", None).unwrap(), b"abc");

    assert!(matches!(
        fs.write_file_from_existing("/c.txt", "/a.txt"),
        Err(FileSystemError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.write_file_from_existing("/d.txt", "/missing"),
        Err(FileSystemError::NotFound(_))
    ));

    fs.change_mode("/a.txt", PermissionDelta::RemoveWrite).unwrap();
    assert!(matches!(
        fs.write_file_from_existing("/e.txt", "/a.txt"),
        Err(FileSystemError::PermissionDenied(_))
    ));
}

#[test]
fn delete_frees_the_whole_chain() {
    let (_dir, _path, mut fs) = scratch(512);
    fs.write_file("/big", &pattern(1500)).unwrap();
    let first = fs.find_entry("big").unwrap().first_block();
    let chain = fs.allocation_table().chain(first);
    assert_eq!(chain.len(), 3);

    fs.delete_file("/big").unwrap();

    for block in chain {
        assert!(!fs.allocation_table().is_busy(block));
    }
    assert!(fs.find_entry("big").is_none());
    assert_eq!(names(&fs.list_directory("/").unwrap()), vec!["/"]);
    assert!(fs.block_contents().unwrap().is_empty());

    // 释放的块可以被重新分配
    fs.write_file("/next", b"x").unwrap();
    assert_eq!(fs.find_entry("next").unwrap().first_block(), 1);
}

#[test]
fn delete_reports_missing_and_directories() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/d").unwrap();

    assert!(matches!(
        fs.delete_file("/ghost"),
        Err(FileSystemError::NotFound(_))
    ));
    assert!(matches!(
        fs.delete_file("/d"),
        Err(FileSystemError::IsADirectory(_))
    ));
    assert!(matches!(
        fs.read_file("/d", "/out", None),
        Err(FileSystemError::IsADirectory(_))
    ));
}

#[test]
fn remove_directory_releases_its_block() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/tmp").unwrap();
    let block = fs.find_entry("tmp").unwrap().first_block();

    fs.remove_directory("/tmp").unwrap();
    assert!(fs.find_entry("tmp").is_none());
    assert!(!fs.allocation_table().is_busy(block));
    assert_eq!(names(&fs.list_directory("/").unwrap()), vec!["/"]);

    assert!(matches!(
        fs.remove_directory("/tmp"),
        Err(FileSystemError::NotFound(_))
    ));
    assert!(matches!(
        fs.remove_directory("/"),
        Err(FileSystemError::InvalidPath(_))
    ));
}

#[test]
fn full_directory_block_rejects_new_entries() {
    let (_dir, _path, mut fs) = scratch(512);
    // 512 字节 = 16 个槽位，根目录自己占一个
    for i in 0..15 {
        fs.write_file(&format!("/f{}", i), b"x").unwrap();
    }
    let busy = fs.allocation_table().busy_count();

    assert!(matches!(
        fs.write_file("/one_more", b"x"),
        Err(FileSystemError::DirectoryFull(_))
    ));
    assert!(matches!(
        fs.make_directory("/sub"),
        Err(FileSystemError::DirectoryFull(_))
    ));
    assert_eq!(fs.allocation_table().busy_count(), busy);
}

#[test]
fn exhausted_volume_keeps_partial_write() {
    let (_dir, _path, mut fs) = scratch(512);
    let content = pattern(TOTAL_BLOCKS as usize * 512);

    assert!(matches!(
        fs.write_file("/huge", &content),
        Err(FileSystemError::OutOfSpace)
    ));
    assert_eq!(fs.allocation_table().free_count(), 0);
    let entry = fs.find_entry("huge").unwrap();
    assert_eq!(
        fs.allocation_table().chain(entry.first_block()).len(),
        TOTAL_BLOCKS as usize - 1
    );

    assert!(matches!(
        fs.write_file("/more", b"x"),
        Err(FileSystemError::OutOfSpace)
    ));
    assert!(fs.find_entry("more").is_none());
}

#[test]
fn save_and_mount_round_trip() {
    let (_dir, path, mut fs) = scratch(2048);
    fs.make_directory("/docs").unwrap();
    fs.write_file("/docs/a.txt", &pattern(5000)).unwrap();
    fs.write_file("/b", b"bee").unwrap();
    fs.delete_file("/b").unwrap();
    fs.write_file("/c", b"sea").unwrap();
    fs.save().unwrap();

    let mounted = FileSystem::mount(&path).unwrap();
    assert_eq!(mounted.block_size(), 2048);
    assert_eq!(mounted.super_block(), fs.super_block());

    let before: Vec<_> = fs.entries().iter().cloned().collect();
    let after: Vec<_> = mounted.entries().iter().cloned().collect();
    assert_eq!(before, after);
    assert_eq!(mounted.allocation_table(), fs.allocation_table());

    let mut mounted = mounted;
    assert_eq!(
        mounted.read_file("/docs/a.txt", "/out", None).unwrap(),
        pattern(5000)
    );
}

#[test]
fn open_or_format_mounts_existing_volume() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("auto.img");

    let mut fs = FileSystem::open_or_format(&path, 0.5).unwrap();
    assert_eq!(fs.block_size(), 512);
    fs.write_file("/keep", b"me").unwrap();
    fs.save().unwrap();
    drop(fs);

    let fs = FileSystem::open_or_format(&path, 0.5).unwrap();
    assert!(fs.find_entry("keep").is_some());
    drop(fs);

    // 挂载已有卷时不看块大小参数
    let fs = FileSystem::open_or_format(&path, 0.3).unwrap();
    assert_eq!(fs.block_size(), 512);
    assert!(fs.find_entry("keep").is_some());

    assert!(matches!(
        FileSystem::open_or_format(dir.path().join("bad.img"), 0.3),
        Err(FileSystemError::InvalidBlockSize(_))
    ));
}

#[test]
fn mount_rejects_oversized_entry_count() {
    let (_dir, path, fs) = scratch(1024);
    drop(fs);

    let offset = VolumeLayout::new(1024).entries_offset();
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&5000u32.to_le_bytes()).unwrap();
    drop(file);

    assert!(matches!(
        FileSystem::mount(&path),
        Err(FileSystemError::CorruptState(_))
    ));
}

#[test]
fn summary_and_dumps_describe_the_volume() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/docs").unwrap();
    fs.write_file("/docs/a.txt", b"alpha").unwrap();

    let summary = fs.dump_summary();
    assert_eq!(summary.block_count, TOTAL_BLOCKS);
    assert_eq!(summary.block_size, 1024);
    assert_eq!(summary.occupied_blocks, 3);
    assert_eq!(summary.free_blocks, TOTAL_BLOCKS - 3);
    assert_eq!(summary.directory_count, 2);
    assert_eq!(summary.file_count, 1);
    assert!(summary.to_string().contains("File: a at blocks [2]"));

    let pages = fs.directory_pages().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(names(&pages[0].records), vec!["/", "docs"]);

    let dumps = fs.block_contents().unwrap();
    let blocks: Vec<_> = dumps.iter().map(|d| d.block).collect();
    assert_eq!(blocks, vec![1, 2]);
    assert!(dumps[1].to_string().ends_with("alpha"));
}

fn record_in(fs: &FileSystem, dir: &str, name: &str) -> DirectoryEntry {
    fs.list_directory(dir)
        .unwrap()
        .into_iter()
        .find(|r| r.name() == name)
        .unwrap()
}

#[test]
fn recreate_keeps_content_of_the_file_in_its_own_directory() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.write_file("/a.txt", b"ROOT").unwrap();
    fs.make_directory("/docs").unwrap();
    fs.write_file("/docs/a.txt", b"DOCS").unwrap();
    fs.change_mode("/a.txt", PermissionDelta::RemoveRead).unwrap();

    fs.change_mode("/docs/a.txt", PermissionDelta::RemoveWrite).unwrap();
    let docs_a = record_in(&fs, "/docs", "a");
    assert_eq!(fs.read_content(&docs_a).unwrap(), b"DOCS");
    // 权限增量作用在 /docs/a.txt 自己的属性上
    assert_eq!(docs_a.attributes().bits(), 0x21);

    fs.add_password("/docs/a.txt", "pw").unwrap();
    let docs_a = record_in(&fs, "/docs", "a");
    assert_eq!(fs.read_content(&docs_a).unwrap(), b"DOCS");
    assert!(docs_a.has_password());

    let root_a = record_in(&fs, "/", "a");
    assert_eq!(fs.read_content(&root_a).unwrap(), b"ROOT");
    assert_eq!(root_a.attributes().bits(), 0x22);
    assert!(!root_a.has_password());
}

#[test]
fn directory_referenced_by_a_chain_is_not_removed() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/d").unwrap();
    fs.write_file("/f", b"x").unwrap();
    let d_block = fs.find_entry("d").unwrap().first_block();
    let f_block = fs.find_entry("f").unwrap().first_block();
    fs.fat.set_next(f_block, Some(d_block));

    let busy = fs.allocation_table().busy_count();
    let count = fs.entries().len();
    assert!(matches!(
        fs.remove_directory("/d"),
        Err(FileSystemError::DirectoryNotEmpty(_))
    ));

    assert_eq!(fs.allocation_table().busy_count(), busy);
    assert_eq!(fs.entries().len(), count);
    assert!(fs.allocation_table().is_busy(d_block));
    assert!(names(&fs.list_directory("/").unwrap()).contains(&"d".to_string()));
    assert_eq!(names(&fs.list_directory("/d").unwrap()), vec!["d", "/"]);
}

#[test]
fn directory_password_is_set_in_place() {
    let (_dir, _path, mut fs) = scratch(1024);
    fs.make_directory("/d").unwrap();
    let block = fs.find_entry("d").unwrap().first_block();

    fs.add_password("/d", "pw").unwrap();

    let entry = fs.find_entry("d").unwrap();
    assert!(entry.check_password(Some("pw")));
    assert_eq!(entry.first_block(), block);
    assert_eq!(entry.attributes(), Attributes::DIRECTORY_DEFAULT);

    let in_parent = record_in(&fs, "/", "d");
    assert!(in_parent.check_password(Some("pw")));
    assert_eq!(in_parent.attributes().bits(), 0x13);

    let own = &fs.list_directory("/d").unwrap()[0];
    assert_eq!(own.name(), "d");
    assert!(own.check_password(Some("pw")));
    assert_eq!(own.attributes().bits(), 0x13);
}
