//! Corruption detection tests
//!
//! Damaged tables, chains and images must be reported, never followed

use pfat_rs::{
    CheckStatus, FatEntry, FileSystem, FileSystemBuilder, FsError, FAT_BAD_CLUSTER, FAT_UNUSED,
};
use tempfile::TempDir;

fn small_fs() -> FileSystem {
    FileSystemBuilder::new()
        .disk_size(32 * 1024)
        .cluster_size(512)
        .build()
        .unwrap()
}

#[test]
fn test_cycle_in_chain_is_detected() {
    let mut fs = small_fs();
    fs.write_file("/loop", &[1u8; 1500]).unwrap();
    let clusters = fs.info("/loop").unwrap().clusters;

    // Point the last cluster back at the first
    let last = *clusters.last().unwrap();
    fs.fat_mut().link(last, clusters[0]).unwrap();

    assert!(matches!(
        fs.read_file("/loop"),
        Err(FsError::CorruptChain { .. })
    ));
    assert!(matches!(fs.info("/loop"), Err(FsError::CorruptChain { .. })));
    assert!(matches!(fs.rm("/loop"), Err(FsError::CorruptChain { .. })));

    let reports = fs.check();
    assert!(matches!(reports[0].status, CheckStatus::CorruptChain(_)));
}

#[test]
fn test_link_to_unused_cluster_is_detected() {
    let mut fs = small_fs();
    fs.write_file("/f", &[1u8; 1024]).unwrap();
    let clusters = fs.info("/f").unwrap().clusters;

    fs.fat_mut().set(clusters[1], FatEntry::Unused).unwrap();
    assert!(matches!(fs.read_file("/f"), Err(FsError::CorruptChain { .. })));
    assert!(fs.fat().mirrors_agree());
}

#[test]
fn test_bad_clusters_are_never_allocated() {
    let mut fs = small_fs();
    for cluster in 1..5 {
        fs.fat_mut().mark_bad(cluster).unwrap();
    }

    fs.write_file("/f", &[9u8; 2048]).unwrap();
    let clusters = fs.info("/f").unwrap().clusters;
    assert_eq!(clusters, vec![5, 6, 7, 8]);
    assert_eq!(fs.fat().primary()[1], FAT_BAD_CLUSTER);
}

#[test]
fn test_bug_then_check_reports_without_mutation() {
    let mut fs = small_fs();
    fs.mkdir("/dir").unwrap();
    fs.write_file("/file", &[3u8; 700]).unwrap();
    fs.write_file("/ok", b"fine").unwrap();

    fs.bug("file").unwrap();
    fs.bug("dir").unwrap();

    let tables = fs.fat().primary().to_vec();
    let reports = fs.check();
    assert_eq!(fs.fat().primary(), &tables[..]);

    assert_eq!(reports.len(), 3);
    assert!(matches!(
        reports[0].status,
        CheckStatus::InvalidStartCluster(-999)
    ));
    assert!(matches!(reports[1].status, CheckStatus::InvalidCluster(-999)));
    assert!(reports[2].is_intact());

    assert_eq!(reports[0].to_string(), "Error: Directory 'dir' has an invalid start cluster (-999).");
    assert_eq!(reports[2].to_string(), "File 'ok' is intact.");
}

#[test]
fn test_check_only_covers_current_directory() {
    let mut fs = small_fs();
    fs.mkdir("/deep").unwrap();
    fs.write_file("/deep/f", b"x").unwrap();
    fs.cd("/deep").unwrap();
    fs.bug("f").unwrap();

    fs.cd("/").unwrap();
    assert!(fs.check().iter().all(|r| r.is_intact()));

    fs.cd("/deep").unwrap();
    assert!(!fs.check()[0].is_intact());
}

#[test]
fn test_bug_missing_item() {
    let mut fs = small_fs();
    assert!(matches!(fs.bug("ghost"), Err(FsError::NotFound(_))));
}

#[test]
fn test_corrupt_image_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("disk.img");

    let mut fs = small_fs();
    fs.write_file("/f", b"data").unwrap();
    fs.save(&image).unwrap();

    let bytes = std::fs::read(&image).unwrap();

    // Descriptor cluster count no longer matches the geometry
    let mut damaged = bytes.clone();
    damaged[17..21].copy_from_slice(&1234u32.to_le_bytes());
    std::fs::write(&image, &damaged).unwrap();
    assert!(matches!(
        FileSystem::open(&image),
        Err(FsError::CorruptImage(_))
    ));

    // Truncated arena
    std::fs::write(&image, &bytes[..bytes.len() - 100]).unwrap();
    assert!(matches!(
        FileSystem::open(&image),
        Err(FsError::CorruptImage(_))
    ));
}

#[test]
fn test_load_survives_corrupted_chain() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("disk.img");

    let mut fs = small_fs();
    fs.write_file("/good", b"good").unwrap();
    fs.write_file("/bad", &[0u8; 600]).unwrap();
    let bad_chain = fs.info("/bad").unwrap().clusters;
    fs.bug("/bad").unwrap();
    fs.save(&image).unwrap();

    let loaded = FileSystem::open(&image).unwrap().unwrap();
    assert_eq!(loaded.read_file("/good").unwrap(), b"good");
    assert!(loaded.read_file("/bad").is_err());

    // The unreachable tail keeps its table entry but has no owner
    let tail = bad_chain[1];
    assert_eq!(loaded.fat().entry(tail).unwrap(), FatEntry::ChainEnd);
    assert_eq!(loaded.fat().ref_count(tail), 0);
    assert_ne!(loaded.fat().primary()[tail as usize], FAT_UNUSED);
}
