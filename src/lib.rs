//! # pfat - Pseudo-FAT Filesystem Engine
//!
//! `pfat-rs` simulates a FAT-style block device inside a single image file:
//!
//! - **Mirrored allocation table** with first-fit cluster allocation
//! - **Directory tree** with path resolution (`.`, `..`, absolute/relative)
//! - **Shared-cluster copies** gated by per-cluster reference counts
//! - **Whole-image persistence** in a flat little-endian format
//! - **Fault injection and checking** to exercise corruption handling
//!
//! ## Quick Start
//!
//! ```rust
//! use pfat_rs::{FileSystem, FormatOptions, Result};
//!
//! # fn main() -> Result<()> {
//! let mut fs = FileSystem::format(1024 * 1024, &FormatOptions::default())?;
//!
//! fs.mkdir("/docs/drafts")?;
//! fs.write_file("/docs/readme.txt", b"Hello, World!")?;
//!
//! // Copies share clusters until the last owner is removed
//! fs.cp("/docs/readme.txt", "/readme.txt")?;
//! fs.rm("/docs/readme.txt")?;
//! assert_eq!(fs.read_file("/readme.txt")?, b"Hello, World!");
//!
//! for entry in fs.ls(Some("/docs"))? {
//!     println!("{} {}", entry.kind, entry.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Geometry
//!
//! ```rust,no_run
//! use pfat_rs::{FileSystemBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let fs = FileSystemBuilder::new()
//!     .disk_size_str("16MB")?
//!     .cluster_size(1024)
//!     .signature("novak")
//!     .build()?;
//!
//! fs.save("disk.img")?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod shell;

pub use crate::core::{
    allocator::{AllocationTable, ClusterAllocator, FatEntry, FAT_BAD_CLUSTER, FAT_CHAIN_END, FAT_UNUSED},
    config::FormatOptions,
    descriptor::FsDescriptor,
    error::{FsError, Result},
    filesystem::{BugReport, CheckReport, CheckStatus, Entry, EntryKind, FileSystem, ItemInfo},
    tree::{DirectoryItem, NodeId, MAX_CHILDREN},
    validation::{parse_disk_size, ItemName},
};

use tracing::info;

/// Default disk size used when none is given to the builder (1 MB)
pub const DEFAULT_DISK_SIZE: u32 = 1024 * 1024;

/// Builder for formatting a filesystem with custom geometry
///
/// # Examples
///
/// ```rust
/// use pfat_rs::FileSystemBuilder;
///
/// let fs = FileSystemBuilder::new()
///     .disk_size(64 * 1024)
///     .cluster_size(512)
///     .build()
///     .unwrap();
///
/// assert_eq!(fs.descriptor().cluster_count, 128);
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemBuilder {
    disk_size: u32,
    options: FormatOptions,
}

impl FileSystemBuilder {
    /// Create a builder with the default geometry
    pub fn new() -> Self {
        FileSystemBuilder {
            disk_size: DEFAULT_DISK_SIZE,
            options: FormatOptions::default(),
        }
    }

    /// Set the disk size in bytes
    pub fn disk_size(mut self, bytes: u32) -> Self {
        self.disk_size = bytes;
        self
    }

    /// Set the disk size from a literal such as `10MB`
    pub fn disk_size_str(mut self, literal: &str) -> Result<Self> {
        self.disk_size = parse_disk_size(literal)?;
        Ok(self)
    }

    /// Set the cluster size in bytes
    pub fn cluster_size(mut self, bytes: u32) -> Self {
        self.options.cluster_size = bytes;
        self
    }

    /// Set the descriptor signature
    pub fn signature<S: Into<String>>(mut self, signature: S) -> Self {
        self.options.signature = signature.into();
        self
    }

    /// Replace all format options at once
    pub fn options(mut self, options: FormatOptions) -> Self {
        self.options = options;
        self
    }

    /// Format the filesystem
    pub fn build(self) -> Result<FileSystem> {
        info!(
            "Building filesystem: {} bytes, {} B clusters, signature '{}'",
            self.disk_size, self.options.cluster_size, self.options.signature
        );
        FileSystem::format(self.disk_size, &self.options)
    }
}

impl Default for FileSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}
