//! End-to-end filesystem scenarios through the public API
//!
//! Covers the documented command contracts: import/export, shared copies,
//! moves, directory removal and persistence across reopen.

use pfat_rs::{EntryKind, FileSystem, FormatOptions, FsError};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tempfile::TempDir;

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

fn format_1mb() -> FileSystem {
    FileSystem::format(1024 * 1024, &FormatOptions::default()).unwrap()
}

#[test]
fn test_incp_outcp_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("input.bin");
    let target = temp_dir.path().join("output.bin");
    let data = random_bytes(9000, 1);
    std::fs::write(&source, &data).unwrap();

    let mut fs = format_1mb();
    fs.mkdir("a").unwrap();
    fs.mkdir("a/b").unwrap();
    fs.incp(&source, "/a/b/f.bin").unwrap();

    let info = fs.info("/a/b/f.bin").unwrap();
    assert_eq!(info.size, 9000);
    assert_eq!(info.clusters.len(), 3);

    assert_eq!(fs.outcp("/a/b/f.bin", &target).unwrap(), 9000);
    assert_eq!(std::fs::read(&target).unwrap(), data);
}

#[test]
fn test_incp_relative_to_current_directory() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("note.txt");
    std::fs::write(&source, b"relative").unwrap();

    let mut fs = format_1mb();
    fs.mkdir("/work").unwrap();
    fs.cd("/work").unwrap();
    fs.incp(&source, "note.txt").unwrap();

    assert_eq!(fs.read_file("/work/note.txt").unwrap(), b"relative");
    assert_eq!(fs.item("/work").unwrap().size(), 8);
}

#[test]
fn test_incp_failure_modes() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("x.bin");
    std::fs::write(&source, b"x").unwrap();

    let mut fs = format_1mb();
    fs.incp(&source, "/x.bin").unwrap();

    assert!(matches!(
        fs.incp(temp_dir.path().join("missing.bin"), "/y.bin"),
        Err(FsError::SourceNotFound(_))
    ));
    assert!(matches!(
        fs.incp(&source, "/nowhere/x.bin"),
        Err(FsError::DestNotFound(_))
    ));
    assert!(matches!(
        fs.incp(&source, "/x.bin"),
        Err(FsError::NameConflict(_))
    ));
}

#[test]
fn test_outcp_leaves_no_file_on_failure() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("never.bin");

    let mut fs = format_1mb();
    fs.mkdir("/d").unwrap();

    assert!(matches!(fs.outcp("/d", &target), Err(FsError::NotAFile(_))));
    assert!(matches!(
        fs.outcp("/missing", &target),
        Err(FsError::NotFound(_))
    ));
    assert!(!target.exists());
}

#[test]
fn test_copy_survives_source_removal() {
    let data = random_bytes(9000, 2);
    let mut fs = format_1mb();
    fs.mkdir("/a/b").unwrap();
    fs.write_file("/a/b/f.bin", &data).unwrap();

    fs.cp("/a/b/f.bin", "/c.bin").unwrap();
    fs.rm("/a/b/f.bin").unwrap();

    let mut out = Vec::new();
    fs.cat("/c.bin", &mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn test_cp_destination_forms() {
    let mut fs = format_1mb();
    fs.mkdir("/dir").unwrap();
    fs.write_file("/f", b"payload").unwrap();

    // Into an existing directory, keeping the name
    fs.cp("/f", "/dir").unwrap();
    // New name under root
    fs.cp("/f", "/g").unwrap();
    // New name relative to the current directory
    fs.cd("/dir").unwrap();
    fs.cp("/f", "h").unwrap();

    for path in ["/dir/f", "/g", "/dir/h"] {
        assert_eq!(fs.read_file(path).unwrap(), b"payload");
    }

    assert!(matches!(fs.cp("/f", "/nope/x"), Err(FsError::NotFound(_))));
}

#[test]
fn test_directory_capacity() {
    let mut fs = format_1mb();
    fs.mkdir("/full").unwrap();
    for i in 0..128 {
        fs.write_file(&format!("/full/f{}", i), b"").unwrap();
    }

    assert!(matches!(
        fs.write_file("/full/overflow", b""),
        Err(FsError::DirectoryFull(_))
    ));
    assert!(matches!(
        fs.mkdir("/full/sub"),
        Err(FsError::DirectoryFull(_))
    ));

    fs.write_file("/outside", b"1").unwrap();
    assert!(matches!(
        fs.cp("/outside", "/full"),
        Err(FsError::DirectoryFull(_))
    ));
    assert!(matches!(
        fs.mv("/outside", "/full"),
        Err(FsError::DirectoryFull(_))
    ));
}

#[test]
fn test_mv_keeps_cwd_and_contents() {
    let mut fs = format_1mb();
    fs.mkdir("/a/inner").unwrap();
    fs.mkdir("/b").unwrap();
    fs.write_file("/a/inner/data", b"moved").unwrap();

    fs.cd("/a/inner").unwrap();
    fs.mv("/a", "/b").unwrap();

    assert_eq!(fs.pwd(), "/b/a/inner");
    assert_eq!(fs.read_file("data").unwrap(), b"moved");
    assert!(matches!(fs.resolve("/a"), Err(FsError::NotFound(_))));
}

#[test]
fn test_mv_rename_in_place() {
    let mut fs = format_1mb();
    fs.mkdir("/docs").unwrap();
    fs.write_file("/docs/old.txt", b"text").unwrap();

    fs.cd("/docs").unwrap();
    fs.mv("old.txt", "new.txt").unwrap();

    let names: Vec<String> = fs.ls(None).unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["new.txt"]);
}

#[test]
fn test_ls_reports_kinds_and_sizes() {
    let mut fs = format_1mb();
    fs.mkdir("/sub").unwrap();
    fs.write_file("/a.bin", &[1u8; 100]).unwrap();
    fs.write_file("/b.bin", &[2u8; 50]).unwrap();

    let entries = fs.ls(Some("/")).unwrap();
    let kinds: Vec<EntryKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EntryKind::Directory, EntryKind::File, EntryKind::File]
    );
    assert_eq!(fs.item("/").unwrap().size(), 150);

    fs.rm("/a.bin").unwrap();
    assert_eq!(fs.item("/").unwrap().size(), 50);
}

#[test]
fn test_reopen_restores_everything() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("disk.img");
    let data = random_bytes(20_000, 3);

    {
        let mut fs = format_1mb();
        fs.mkdir("/x/y/z").unwrap();
        fs.write_file("/x/y/z/blob", &data).unwrap();
        fs.cp("/x/y/z/blob", "/x/alias").unwrap();
        fs.save(&image).unwrap();
    }

    let mut fs = FileSystem::open(&image).unwrap().unwrap();
    assert_eq!(fs.pwd(), "/");
    assert_eq!(fs.read_file("/x/alias").unwrap(), data);

    let chain = fs.info("/x/alias").unwrap().clusters;
    for &cluster in &chain {
        assert_eq!(fs.fat().ref_count(cluster), 2);
    }

    fs.rm("/x/y/z/blob").unwrap();
    assert_eq!(fs.read_file("/x/alias").unwrap(), data);
}

#[test]
fn test_open_missing_image_is_unformatted() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("fresh.img");

    assert!(FileSystem::open(&image).unwrap().is_none());
    assert!(image.exists());
}

#[test]
fn test_deep_copy_is_independent() {
    let data = random_bytes(5000, 4);
    let mut fs = format_1mb();
    fs.mkdir("/orig/sub").unwrap();
    fs.write_file("/orig/sub/file", &data).unwrap();

    fs.deep_copy("/orig", "/clone").unwrap();
    fs.rm("/orig/sub/file").unwrap();
    fs.rmdir("/orig/sub").unwrap();
    fs.rmdir("/orig").unwrap();

    assert_eq!(fs.read_file("/clone/sub/file").unwrap(), data);
    for cluster in fs.info("/clone/sub/file").unwrap().clusters {
        assert_eq!(fs.fat().ref_count(cluster), 1);
    }
}
