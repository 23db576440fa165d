//! Filesystem context and command operations
//!
//! [`FileSystem`] owns the descriptor, the allocation tables, the cluster
//! arena and the directory tree, plus the current-directory pointer. Every
//! command is a method on it; failures leave the state unchanged.

use crate::core::allocator::{AllocationTable, ClusterAllocator, FAT_CHAIN_END};
use crate::core::arena::ClusterArena;
use crate::core::config::FormatOptions;
use crate::core::descriptor::FsDescriptor;
use crate::core::error::{FsError, Result};
use crate::core::image;
use crate::core::tree::{DirectoryItem, DirectoryTree, NodeId, MAX_CHILDREN};
use crate::core::validation::{split_parent, ItemName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Value written by [`FileSystem::bug`] over links and start clusters
pub const CORRUPT_MARKER: i32 = -999;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "FILE"),
            EntryKind::Directory => write!(f, "DIR"),
        }
    }
}

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u32,
    pub start_cluster: i32,
}

impl Entry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Size and cluster chain of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u32,
    pub clusters: Vec<u32>,
}

impl fmt::Display for ItemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Size: {}B", self.size)?;
        let chain: Vec<String> = self.clusters.iter().map(|c| c.to_string()).collect();
        write!(f, "{} {}", self.name, chain.join(","))
    }
}

/// Outcome of checking one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Intact,
    /// The chain left the cluster range at this value
    InvalidCluster(i64),
    /// The chain loops or reaches an unused/bad cluster
    CorruptChain(String),
    /// Recorded size is larger than the chain can hold
    SizeMismatch { size: u32, capacity: u64 },
    /// Directory start cluster is out of range
    InvalidStartCluster(i32),
}

/// Result of checking one immediate child of the current directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub name: String,
    pub kind: EntryKind,
    pub status: CheckStatus,
}

impl CheckReport {
    pub fn is_intact(&self) -> bool {
        self.status == CheckStatus::Intact
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            EntryKind::File => "File",
            EntryKind::Directory => "Directory",
        };

        match &self.status {
            CheckStatus::Intact => write!(f, "{} '{}' is intact.", label, self.name),
            CheckStatus::InvalidCluster(cluster) => write!(
                f,
                "Error: {} '{}' has an invalid cluster ({}).",
                label, self.name, cluster
            ),
            CheckStatus::CorruptChain(reason) => write!(
                f,
                "Error: {} '{}' has a corrupt chain: {}.",
                label, self.name, reason
            ),
            CheckStatus::SizeMismatch { size, capacity } => write!(
                f,
                "Error: {} '{}' has an incorrect size. Actual: {}, Expected: {}.",
                label, self.name, size, capacity
            ),
            CheckStatus::InvalidStartCluster(cluster) => write!(
                f,
                "Error: {} '{}' has an invalid start cluster ({}).",
                label, self.name, cluster
            ),
        }
    }
}

/// What [`FileSystem::bug`] overwrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugReport {
    pub name: String,
    pub kind: EntryKind,
    /// Table entry of the start cluster for files, start cluster for directories
    pub original: i32,
}

impl fmt::Display for BugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntryKind::File => write!(
                f,
                "File '{}' has been corrupted. Original value: {}.",
                self.name, self.original
            ),
            EntryKind::Directory => write!(
                f,
                "Directory '{}' has been corrupted. Original cluster value: {}.",
                self.name, self.original
            ),
        }
    }
}

/// A formatted pseudo-FAT filesystem
#[derive(Debug, Clone)]
pub struct FileSystem {
    descriptor: FsDescriptor,
    fat: AllocationTable,
    arena: ClusterArena,
    tree: DirectoryTree,
    cwd: NodeId,
}

impl FileSystem {
    /// Format a fresh disk of `disk_size` bytes
    ///
    /// The root directory takes cluster 0.
    pub fn format(disk_size: u32, options: &FormatOptions) -> Result<Self> {
        options.validate()?;

        let descriptor = FsDescriptor::new(&options.signature, disk_size, options.cluster_size)?;
        let mut fat = AllocationTable::new(descriptor.cluster_count);
        let arena = ClusterArena::new(descriptor.cluster_size, descriptor.cluster_count);

        let root_cluster = fat.allocate()?;
        fat.reference(root_cluster)?;
        let tree = DirectoryTree::new(root_cluster as i32);

        info!(
            "Formatted {} bytes: {} clusters of {} B",
            descriptor.disk_size, descriptor.cluster_count, descriptor.cluster_size
        );

        Ok(FileSystem {
            descriptor,
            fat,
            arena,
            tree,
            cwd: NodeId::ROOT,
        })
    }

    /// Assemble a filesystem from decoded parts and rebuild reference counts
    pub(crate) fn from_parts(
        descriptor: FsDescriptor,
        fat: AllocationTable,
        arena: ClusterArena,
        tree: DirectoryTree,
    ) -> Self {
        let mut fs = FileSystem {
            descriptor,
            fat,
            arena,
            tree,
            cwd: NodeId::ROOT,
        };
        fs.rebuild_refs();
        fs
    }

    /// Load an image; `None` if the file is missing or empty
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        image::load(path)
    }

    /// Persist the whole state to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        image::save(self, path)
    }

    /// Recount chain owners from the tree
    ///
    /// Chains that cannot be walked are skipped.
    fn rebuild_refs(&mut self) {
        self.fat.clear_refs();

        let nodes = match self.tree.preorder(self.tree.root()) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Cannot rebuild reference counts: {}", e);
                return;
            }
        };

        for id in nodes {
            let Ok(item) = self.tree.get(id) else {
                continue;
            };
            let start = item.start_cluster();
            if start == FAT_CHAIN_END {
                continue;
            }

            match self.fat.chain(start) {
                Ok(chain) => {
                    for cluster in chain {
                        // In range: the walk only yields valid indices
                        let _ = self.fat.reference(cluster);
                    }
                }
                Err(e) => warn!(
                    "Skipping chain of '{}' during reference rebuild: {}",
                    self.tree.path_of(id),
                    e
                ),
            }
        }

        debug!(
            "Rebuilt reference counts: {} clusters referenced",
            self.fat.refs().referenced()
        );
    }

    // Accessors

    pub fn descriptor(&self) -> &FsDescriptor {
        &self.descriptor
    }

    pub fn fat(&self) -> &AllocationTable {
        &self.fat
    }

    /// Mutable table access for fault injection
    pub fn fat_mut(&mut self) -> &mut AllocationTable {
        &mut self.fat
    }

    pub fn arena(&self) -> &ClusterArena {
        &self.arena
    }

    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    pub fn cwd(&self) -> NodeId {
        self.cwd
    }

    pub fn cluster_size(&self) -> u32 {
        self.descriptor.cluster_size
    }

    pub fn free_clusters(&self) -> usize {
        self.fat.free_clusters()
    }

    /// Resolve a path against the current directory
    pub fn resolve(&self, path: &str) -> Result<NodeId> {
        self.tree.resolve(path, self.cwd)
    }

    /// Look up an item by path
    pub fn item(&self, path: &str) -> Result<&DirectoryItem> {
        self.tree.get(self.resolve(path)?)
    }

    // Chain ownership

    /// Drop one owner from every cluster of a chain
    ///
    /// The whole chain is walked before anything is released, so a corrupt
    /// chain changes nothing.
    fn release_chain(&mut self, start: i32) -> Result<()> {
        if start == FAT_CHAIN_END {
            return Ok(());
        }

        let chain = self.fat.chain(start)?;
        for cluster in chain {
            if self.fat.release(cluster)? {
                self.arena.zero(cluster)?;
            }
        }

        Ok(())
    }

    /// Allocate a linked chain of `clusters` clusters, each with one owner
    fn allocate_owned(&mut self, clusters: usize) -> Result<Vec<u32>> {
        let chain = self.fat.allocate_chain(clusters)?;
        for &cluster in &chain {
            self.fat.reference(cluster)?;
        }
        Ok(chain)
    }

    /// Copy a chain's bytes into freshly allocated clusters
    fn duplicate_chain(&mut self, start: i32) -> Result<i32> {
        if start == FAT_CHAIN_END {
            return Ok(FAT_CHAIN_END);
        }

        let source = self.fat.chain(start)?;
        let copy = self.allocate_owned(source.len())?;
        for (&src, &dest) in source.iter().zip(&copy) {
            self.arena.copy_cluster(src, dest)?;
        }

        Ok(copy[0] as i32)
    }

    /// Release every chain under `id` and detach it
    fn discard(&mut self, id: NodeId) {
        let nodes = self.tree.preorder(id).unwrap_or_default();
        for node in nodes {
            if let Ok(start) = self.tree.get(node).map(|item| item.start_cluster()) {
                if let Err(e) = self.release_chain(start) {
                    warn!("Rollback could not release chain {}: {}", start, e);
                }
            }
        }

        if let Err(e) = self.tree.remove(id) {
            warn!("Rollback could not detach {}: {}", id, e);
        }
    }

    fn clusters_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.descriptor.cluster_size as usize)
    }

    // Namespace commands

    /// Create a directory, including missing intermediate directories
    ///
    /// Fails with AlreadyExists if the final component exists. Directories
    /// created before a later failure are removed again.
    pub fn mkdir(&mut self, path: &str) -> Result<NodeId> {
        let mut created = Vec::new();

        match self.mkdir_components(path, &mut created) {
            Ok(id) => {
                debug!("mkdir {}: created {} directories", path, created.len());
                Ok(id)
            }
            Err(e) => {
                // `..` can branch off, so not everything sits under the first node
                for &id in created.iter().rev() {
                    if self.tree.get(id).is_ok() {
                        self.discard(id);
                    }
                }
                Err(e)
            }
        }
    }

    fn mkdir_components(&mut self, path: &str, created: &mut Vec<NodeId>) -> Result<NodeId> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

        if components.len() > MAX_CHILDREN {
            return Err(FsError::InvalidPath(format!(
                "too many components ({}, max {})",
                components.len(),
                MAX_CHILDREN
            )));
        }

        let mut current = if path.starts_with('/') {
            self.tree.root()
        } else {
            self.cwd
        };

        let last = match components.iter().rposition(|c| *c != ".") {
            Some(idx) if components[idx] != ".." => idx,
            _ => return Err(FsError::AlreadyExists(path.to_string())),
        };

        for (idx, &component) in components.iter().enumerate() {
            match component {
                "." => continue,
                ".." => {
                    current = self.tree.get(current)?.parent().ok_or(FsError::NoParent)?;
                    continue;
                }
                _ => {}
            }

            if let Some(existing) = self.tree.find_child(current, component) {
                if idx == last {
                    return Err(FsError::AlreadyExists(path.to_string()));
                }
                if self.tree.get(existing)?.is_file() {
                    return Err(FsError::NotADirectory(component.to_string()));
                }
                current = existing;
                continue;
            }

            let name = ItemName::new(component)?;
            self.tree.check_insert(current, name.as_str())?;

            let cluster = self.allocate_owned(1)?[0];
            let id = self.tree.add(current, name, false, 0, cluster as i32)?;
            created.push(id);
            current = id;
        }

        Ok(current)
    }

    /// Remove an empty directory
    ///
    /// If the current directory is removed, it moves to the parent.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let id = self.resolve(path)?;
        let item = self.tree.get(id)?;

        let parent = item.parent().ok_or_else(|| {
            FsError::InvalidPath("cannot remove the root directory".to_string())
        })?;

        if item.is_file() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        if item.child_count() > 0 {
            return Err(FsError::NotEmpty(path.to_string()));
        }

        let start = item.start_cluster();
        self.release_chain(start)?;

        if self.tree.is_ancestor(id, self.cwd) {
            self.cwd = parent;
        }
        self.tree.remove(id)?;

        debug!("rmdir {}", path);
        Ok(())
    }

    /// Remove a file, releasing its chain
    pub fn rm(&mut self, path: &str) -> Result<()> {
        let id = self.resolve(path)?;
        let item = self.tree.get(id)?;

        if item.is_dir() {
            return Err(FsError::NotAFile(path.to_string()));
        }

        let start = item.start_cluster();
        self.release_chain(start)?;
        self.tree.remove(id)?;

        debug!("rm {}", path);
        Ok(())
    }

    /// Change the current directory
    pub fn cd(&mut self, path: &str) -> Result<()> {
        let id = self.resolve(path)?;
        if self.tree.get(id)?.is_file() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        self.cwd = id;
        Ok(())
    }

    /// Absolute path of the current directory
    pub fn pwd(&self) -> String {
        self.tree.path_of(self.cwd)
    }

    /// Work out where a copy or new item lands
    ///
    /// An existing directory receives the item under `default_name`; any
    /// other existing item is a conflict; otherwise the final component is
    /// the new name inside the resolved parent.
    fn destination(&self, dest: &str, default_name: &ItemName) -> Result<(NodeId, ItemName)> {
        match self.resolve(dest) {
            Ok(id) => {
                if self.tree.get(id)?.is_dir() {
                    return Ok((id, default_name.clone()));
                }
                return Err(FsError::NameConflict(dest.to_string()));
            }
            Err(FsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let (parent_path, name) = split_parent(dest);
        let parent = self.resolve(parent_path)?;
        if self.tree.get(parent)?.is_file() {
            return Err(FsError::NotADirectory(parent_path.to_string()));
        }

        Ok((parent, ItemName::new(name)?))
    }

    /// Copy a file by sharing its clusters
    ///
    /// The new item points at the same chain; every cluster gains one owner.
    pub fn cp(&mut self, src: &str, dest: &str) -> Result<NodeId> {
        let src_id = self.resolve(src)?;
        let item = self.tree.get(src_id)?;
        if item.is_dir() {
            return Err(FsError::NotAFile(src.to_string()));
        }

        let (size, start) = (item.size(), item.start_cluster());
        let (parent, name) = self.destination(dest, &item.name)?;
        self.tree.check_insert(parent, name.as_str())?;

        let chain = if start == FAT_CHAIN_END {
            Vec::new()
        } else {
            self.fat.chain(start)?
        };

        for &cluster in &chain {
            self.fat.reference(cluster)?;
        }

        let id = self.tree.add(parent, name, true, size, start)?;

        debug!("cp {} -> {}: shared {} clusters", src, dest, chain.len());
        Ok(id)
    }

    /// Copy a file or directory tree byte for byte
    ///
    /// Every chain is duplicated into new clusters. Capacity is checked up
    /// front; a failure part-way removes what was copied.
    pub fn deep_copy(&mut self, src: &str, dest: &str) -> Result<NodeId> {
        let src_id = self.resolve(src)?;
        let default_name = self.tree.get(src_id)?.name.clone();
        let (parent, name) = self.destination(dest, &default_name)?;

        if self.tree.is_ancestor(src_id, parent) {
            return Err(FsError::CyclicMove {
                src: self.tree.path_of(src_id),
                dest: self.tree.path_of(parent),
            });
        }
        self.tree.check_insert(parent, name.as_str())?;

        let nodes = self.tree.preorder(src_id)?;
        let mut needed = 0usize;
        for &node in &nodes {
            let start = self.tree.get(node)?.start_cluster();
            if start != FAT_CHAIN_END {
                needed += self.fat.chain(start)?.len();
            }
        }
        if needed > self.fat.free_clusters() {
            return Err(FsError::OutOfClusters);
        }

        let mut top = None;
        match self.deep_copy_nodes(src_id, parent, name, &mut top) {
            Ok(id) => {
                debug!("deep copy {} -> {}: {} clusters", src, dest, needed);
                Ok(id)
            }
            Err(e) => {
                if let Some(id) = top {
                    self.discard(id);
                }
                Err(e)
            }
        }
    }

    fn deep_copy_nodes(
        &mut self,
        src_id: NodeId,
        parent: NodeId,
        name: ItemName,
        top: &mut Option<NodeId>,
    ) -> Result<NodeId> {
        let mut stack = vec![(src_id, parent, name)];

        while let Some((source, dest_parent, name)) = stack.pop() {
            let item = self.tree.get(source)?;
            let (is_file, size, start) = (item.is_file(), item.size(), item.start_cluster());
            let children: Vec<(NodeId, ItemName)> = item
                .children()
                .iter()
                .filter_map(|&c| self.tree.get(c).ok().map(|child| (c, child.name.clone())))
                .collect();

            let new_start = self.duplicate_chain(start)?;
            let copied = match self.tree.add(
                dest_parent,
                name,
                is_file,
                if is_file { size } else { 0 },
                new_start,
            ) {
                Ok(id) => id,
                Err(e) => {
                    if let Err(release_err) = self.release_chain(new_start) {
                        warn!("Rollback could not release chain {}: {}", new_start, release_err);
                    }
                    return Err(e);
                }
            };

            if top.is_none() {
                *top = Some(copied);
            }

            for (child, child_name) in children.into_iter().rev() {
                stack.push((child, copied, child_name));
            }
        }

        top.ok_or_else(|| FsError::NotFound(format!("node {}", src_id)))
    }

    /// Move or rename an item
    ///
    /// If `dest` is an existing directory the item moves into it. If `dest`
    /// does not resolve, its final component becomes the item's new name in
    /// its current directory.
    pub fn mv(&mut self, src: &str, dest: &str) -> Result<()> {
        let src_id = self.resolve(src)?;
        if src_id == self.tree.root() {
            return Err(FsError::CyclicMove {
                src: "/".to_string(),
                dest: dest.to_string(),
            });
        }

        match self.resolve(dest) {
            Ok(dest_id) => {
                if self.tree.get(dest_id)?.is_file() {
                    return Err(FsError::NameConflict(dest.to_string()));
                }

                if self.tree.get(src_id)?.parent() == Some(dest_id) {
                    return Ok(());
                }

                self.tree.reparent(src_id, dest_id)?;
                debug!("mv {} -> {}", src, self.tree.path_of(src_id));
                Ok(())
            }
            Err(FsError::NotFound(_)) => {
                let (_, new_name) = split_parent(dest);
                let name = ItemName::new(new_name)?;
                self.tree.rename(src_id, name)?;
                debug!("renamed {} -> {}", src, new_name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// List the immediate children of a directory (default: current)
    pub fn ls(&self, path: Option<&str>) -> Result<Vec<Entry>> {
        let target = path.unwrap_or(".");
        let id = self.resolve(target)?;
        let dir = self.tree.get(id)?;
        if dir.is_file() {
            return Err(FsError::NotADirectory(target.to_string()));
        }

        dir.children()
            .iter()
            .map(|&child| self.entry(child))
            .collect()
    }

    fn entry(&self, id: NodeId) -> Result<Entry> {
        let item = self.tree.get(id)?;
        Ok(Entry {
            name: item.name().to_string(),
            path: self.tree.path_of(id),
            kind: kind_of(item),
            size: item.size(),
            start_cluster: item.start_cluster(),
        })
    }

    /// Size and cluster chain of an item
    pub fn info(&self, path: &str) -> Result<ItemInfo> {
        let id = self.resolve(path)?;
        let item = self.tree.get(id)?;
        let start = item.start_cluster();

        let clusters = if start == FAT_CHAIN_END {
            Vec::new()
        } else {
            self.fat.chain(start).map_err(|e| match e {
                FsError::InvalidCluster(cluster) => FsError::InvalidStartCluster {
                    name: item.name().to_string(),
                    cluster,
                },
                other => other,
            })?
        };

        Ok(ItemInfo {
            name: item.name().to_string(),
            path: self.tree.path_of(id),
            kind: kind_of(item),
            size: item.size(),
            clusters,
        })
    }

    /// Check the immediate children of the current directory
    ///
    /// Read-only; problems are reported per item.
    pub fn check(&self) -> Vec<CheckReport> {
        let children = self
            .tree
            .get(self.cwd)
            .map(|dir| dir.children().to_vec())
            .unwrap_or_default();

        children
            .into_iter()
            .filter_map(|id| self.tree.get(id).ok())
            .map(|item| CheckReport {
                name: item.name().to_string(),
                kind: kind_of(item),
                status: self.check_item(item),
            })
            .collect()
    }

    fn check_item(&self, item: &DirectoryItem) -> CheckStatus {
        let start = item.start_cluster();

        if item.is_dir() {
            if start < 0 || start as u32 >= self.descriptor.cluster_count {
                return CheckStatus::InvalidStartCluster(start);
            }
            return CheckStatus::Intact;
        }

        let chain_len = if start == FAT_CHAIN_END {
            0
        } else {
            match self.fat.chain(start) {
                Ok(chain) => chain.len(),
                Err(FsError::InvalidCluster(cluster)) => return CheckStatus::InvalidCluster(cluster),
                Err(FsError::CorruptChain { reason, .. }) => {
                    return CheckStatus::CorruptChain(reason)
                }
                Err(e) => return CheckStatus::CorruptChain(e.to_string()),
            }
        };

        let capacity = chain_len as u64 * self.descriptor.cluster_size as u64;
        if capacity < item.size() as u64 {
            return CheckStatus::SizeMismatch {
                size: item.size(),
                capacity,
            };
        }

        CheckStatus::Intact
    }

    /// Deliberately corrupt an item (fault injection)
    ///
    /// For a file, the table entry of its start cluster (both tables) and
    /// its start cluster are overwritten with [`CORRUPT_MARKER`]. For a
    /// directory only the start cluster is.
    pub fn bug(&mut self, path: &str) -> Result<BugReport> {
        let id = self.resolve(path)?;
        let item = self.tree.get(id)?;
        if item.parent().is_none() {
            return Err(FsError::InvalidPath(
                "cannot corrupt the root directory".to_string(),
            ));
        }

        let name = item.name().to_string();
        let kind = kind_of(item);
        let start = item.start_cluster();

        let original = match kind {
            EntryKind::File if start >= 0 && (start as u32) < self.fat.cluster_count() => {
                let original = self.fat.entry(start as u32)?.encode();
                self.fat.set_raw(start as u32, CORRUPT_MARKER)?;
                original
            }
            _ => start,
        };

        self.tree.set_start_cluster(id, CORRUPT_MARKER)?;

        warn!("Corrupted '{}' (original value {})", name, original);
        Ok(BugReport {
            name,
            kind,
            original,
        })
    }

    // Data transfer

    /// Store `data` as a new file at `dest`
    ///
    /// `dest` names the new file; its parent must be an existing directory.
    pub fn write_file(&mut self, dest: &str, data: &[u8]) -> Result<NodeId> {
        let (parent_path, file_name) = split_parent(dest);

        let parent = match self.resolve(parent_path) {
            Ok(id) => id,
            Err(FsError::NotFound(_)) => return Err(FsError::DestNotFound(parent_path.to_string())),
            Err(e) => return Err(e),
        };
        if self.tree.get(parent)?.is_file() {
            return Err(FsError::DestNotFound(parent_path.to_string()));
        }

        let name = ItemName::new(file_name)?;
        self.tree.check_insert(parent, name.as_str())?;

        let needed = self.clusters_for(data.len());
        if needed > self.fat.free_clusters() {
            return Err(FsError::OutOfClusters);
        }
        let size = u32::try_from(data.len()).map_err(|_| FsError::OutOfClusters)?;

        let chain = self.allocate_owned(needed)?;
        let cluster_size = self.descriptor.cluster_size as usize;
        for (&cluster, chunk) in chain.iter().zip(data.chunks(cluster_size)) {
            self.arena.write(cluster, chunk)?;
        }

        let start = chain.first().map(|&c| c as i32).unwrap_or(FAT_CHAIN_END);
        match self.tree.add(parent, name, true, size, start) {
            Ok(id) => {
                debug!("Wrote {} bytes to {} ({} clusters)", size, dest, chain.len());
                Ok(id)
            }
            Err(e) => {
                if let Err(release_err) = self.release_chain(start) {
                    warn!("Rollback could not release chain {}: {}", start, release_err);
                }
                Err(e)
            }
        }
    }

    /// Store everything readable from `reader` as a new file
    pub fn import<R: Read>(&mut self, mut reader: R, dest: &str) -> Result<NodeId> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.write_file(dest, &data)
    }

    /// Copy an external file into the filesystem
    pub fn incp<P: AsRef<Path>>(&mut self, source: P, dest: &str) -> Result<NodeId> {
        let source = source.as_ref();
        let file = std::fs::File::open(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FsError::SourceNotFound(source.to_path_buf()),
            _ => FsError::Io(e),
        })?;

        self.import(file, dest)
    }

    /// Stream a file's bytes into `writer`
    ///
    /// The chain is validated before anything is written.
    pub fn export<W: Write>(&self, path: &str, writer: &mut W) -> Result<u64> {
        let id = self.resolve(path)?;
        let item = self.tree.get(id)?;
        if item.is_dir() {
            return Err(FsError::NotAFile(path.to_string()));
        }

        let start = item.start_cluster();
        let chain = if start == FAT_CHAIN_END {
            Vec::new()
        } else {
            self.fat.chain(start)?
        };

        let cluster_size = self.descriptor.cluster_size as usize;
        let size = item.size() as usize;
        if chain.len() * cluster_size < size {
            return Err(FsError::corrupt_chain(
                start,
                format!(
                    "{} clusters cannot hold {} bytes",
                    chain.len(),
                    size
                ),
            ));
        }

        let mut remaining = size;
        for cluster in chain {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(cluster_size);
            writer.write_all(&self.arena.read(cluster, take)?)?;
            remaining -= take;
        }

        Ok(size as u64)
    }

    /// Read a whole file into memory
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.export(path, &mut out)?;
        Ok(out)
    }

    /// Copy a file out to the host filesystem
    ///
    /// The destination is only created once the source has been read.
    pub fn outcp<P: AsRef<Path>>(&self, src: &str, dest: P) -> Result<u64> {
        let data = self.read_file(src)?;
        std::fs::write(dest, &data)?;
        Ok(data.len() as u64)
    }

    /// Write a file's contents to `out`
    pub fn cat<W: Write>(&self, path: &str, out: &mut W) -> Result<u64> {
        self.export(path, out)
    }
}

fn kind_of(item: &DirectoryItem) -> EntryKind {
    if item.is_file() {
        EntryKind::File
    } else {
        EntryKind::Directory
    }
}
