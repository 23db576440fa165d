//! Image persistence
//!
//! The whole filesystem is snapshotted into one flat file, in this order:
//!
//! ```text
//! +--------------------+  0
//! | Descriptor (37 B)  |
//! +--------------------+  fat1_offset
//! | Primary table      |  cluster_count x i32
//! +--------------------+  fat2_offset
//! | Secondary table    |  cluster_count x i32
//! +--------------------+  data_start
//! | Directory tree     |  preorder node records
//! +--------------------+
//! | Cluster arena      |  disk_size bytes
//! +--------------------+
//! ```
//!
//! Node record: `name_len u16, name, is_file u8, size u32, start_cluster i32,
//! child_count u32`, followed by the records of its children. Parent links
//! are implied by nesting. All integers are little-endian.
//!
//! Reference counts are not stored; they are rebuilt from the tree on load.

use crate::core::allocator::AllocationTable;
use crate::core::arena::ClusterArena;
use crate::core::descriptor::{FsDescriptor, FAT_ENTRY_SIZE};
use crate::core::error::{FsError, Result};
use crate::core::filesystem::FileSystem;
use crate::core::tree::{DirectoryItem, DirectoryTree, NodeId, MAX_CHILDREN};
use crate::core::validation::ItemName;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Fixed part of a node record, excluding the name bytes
const NODE_FIXED_LEN: usize = 2 + 1 + 4 + 4 + 4;

/// Serialize a filesystem into image bytes
pub fn encode(fs: &FileSystem) -> Result<Vec<u8>> {
    let descriptor = fs.descriptor();
    let fat = fs.fat();
    let tree = fs.tree();

    let table_bytes = descriptor.fat_count as usize * FAT_ENTRY_SIZE;
    let mut bytes = Vec::with_capacity(
        FsDescriptor::ENCODED_LEN + 2 * table_bytes + descriptor.disk_size as usize,
    );

    bytes.extend_from_slice(&descriptor.to_bytes());

    for &entry in fat.primary() {
        bytes.extend_from_slice(&entry.to_le_bytes());
    }
    for &entry in fat.secondary() {
        bytes.extend_from_slice(&entry.to_le_bytes());
    }

    let nodes = tree.preorder(tree.root())?;
    for &id in &nodes {
        encode_node(tree.get(id)?, &mut bytes);
    }

    bytes.extend_from_slice(fs.arena().as_bytes());

    debug!(
        "Encoded image: {} nodes, {} bytes",
        nodes.len(),
        bytes.len()
    );

    Ok(bytes)
}

fn encode_node(item: &DirectoryItem, out: &mut Vec<u8>) {
    let name = item.name().as_bytes();

    out.reserve(NODE_FIXED_LEN + name.len());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(name);
    out.push(item.is_file() as u8);
    out.extend_from_slice(&item.size().to_le_bytes());
    out.extend_from_slice(&item.start_cluster().to_le_bytes());
    out.extend_from_slice(&(item.child_count() as u32).to_le_bytes());
}

/// Rebuild a filesystem from image bytes
pub fn decode(bytes: &[u8]) -> Result<FileSystem> {
    let mut reader = ImageReader::new(bytes);

    let descriptor = FsDescriptor::from_bytes(reader.take(FsDescriptor::ENCODED_LEN)?)?;

    let primary = reader.table(descriptor.fat_count)?;
    let secondary = reader.table(descriptor.fat_count)?;
    let fat = AllocationTable::from_tables(primary, secondary)?;

    let tree = decode_tree(&mut reader)?;

    let arena = ClusterArena::from_bytes(
        reader.take(descriptor.disk_size as usize)?.to_vec(),
        descriptor.cluster_size,
        descriptor.cluster_count,
    )?;

    if reader.remaining() != 0 {
        return Err(FsError::CorruptImage(format!(
            "{} trailing bytes after arena",
            reader.remaining()
        )));
    }

    debug!("Decoded image: {} nodes", tree.len());

    Ok(FileSystem::from_parts(descriptor, fat, arena, tree))
}

struct NodeRecord {
    item: DirectoryItem,
    child_count: u32,
}

fn decode_tree(reader: &mut ImageReader<'_>) -> Result<DirectoryTree> {
    let root = decode_node(reader)?;
    if root.item.is_file() {
        return Err(FsError::CorruptImage("root record is a file".to_string()));
    }

    let mut tree = DirectoryTree::with_root(root.item);

    // (parent, children still to read)
    let mut pending: Vec<(NodeId, u32)> = vec![(tree.root(), root.child_count)];

    while let Some(top) = pending.last_mut() {
        if top.1 == 0 {
            pending.pop();
            continue;
        }
        top.1 -= 1;
        let parent = top.0;

        let record = decode_node(reader)?;
        let id = tree
            .attach(parent, record.item)
            .map_err(|e| FsError::CorruptImage(format!("invalid tree: {}", e)))?;

        if record.child_count > 0 {
            pending.push((id, record.child_count));
        }
    }

    Ok(tree)
}

fn decode_node(reader: &mut ImageReader<'_>) -> Result<NodeRecord> {
    let name_len = reader.u16()? as usize;
    let name = std::str::from_utf8(reader.take(name_len)?)
        .map_err(|_| FsError::CorruptImage("item name is not valid UTF-8".to_string()))?;
    let name = ItemName::new(name).map_err(|e| FsError::CorruptImage(e.to_string()))?;

    let is_file = match reader.u8()? {
        0 => false,
        1 => true,
        other => {
            return Err(FsError::CorruptImage(format!(
                "invalid file flag {} for '{}'",
                other, name
            )))
        }
    };

    let size = reader.u32()?;
    let start_cluster = reader.i32()?;
    let child_count = reader.u32()?;

    if child_count as usize > MAX_CHILDREN {
        return Err(FsError::CorruptImage(format!(
            "'{}' claims {} children (max {})",
            name, child_count, MAX_CHILDREN
        )));
    }

    if is_file && child_count > 0 {
        return Err(FsError::CorruptImage(format!(
            "file '{}' claims {} children",
            name, child_count
        )));
    }

    Ok(NodeRecord {
        item: DirectoryItem::new(name, is_file, size, start_cluster),
        child_count,
    })
}

/// Bounds-checked little-endian cursor
struct ImageReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ImageReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ImageReader { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(FsError::CorruptImage(format!(
                "image truncated at offset {} (needed {} more bytes)",
                self.pos, len
            )));
        }

        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn table(&mut self, count: u32) -> Result<Vec<i32>> {
        let raw = self.take(count as usize * FAT_ENTRY_SIZE)?;
        Ok(raw
            .chunks_exact(FAT_ENTRY_SIZE)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

/// Write a filesystem image to `path`, replacing any existing file
pub fn save<P: AsRef<Path>>(fs: &FileSystem, path: P) -> Result<()> {
    let bytes = encode(fs)?;
    std::fs::write(path.as_ref(), &bytes)?;

    info!(
        "Filesystem state saved to {} ({} bytes)",
        path.as_ref().display(),
        bytes.len()
    );

    Ok(())
}

/// Read a filesystem image from `path`
///
/// A missing file is created empty and `None` is returned; an empty file
/// is likewise unformatted. The caller must format before further use.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<FileSystem>> {
    let path = path.as_ref();

    if !path.exists() {
        File::create(path)?;
        info!(
            "Image {} not found; created empty placeholder",
            path.display()
        );
        return Ok(None);
    }

    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        info!("Image {} is empty (unformatted)", path.display());
        return Ok(None);
    }

    let fs = decode(&bytes)?;
    info!("Filesystem state loaded from {}", path.display());

    Ok(Some(fs))
}
