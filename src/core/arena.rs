//! Cluster arena
//!
//! Contiguous byte store backing every cluster on the virtual disk.
//! Addressing is cluster-granular: cluster `n` occupies
//! `n * cluster_size .. (n + 1) * cluster_size`.

use crate::core::error::{FsError, Result};

/// In-memory backing store for cluster contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterArena {
    data: Vec<u8>,
    cluster_size: u32,
    cluster_count: u32,
}

impl ClusterArena {
    /// Create a zero-filled arena
    pub fn new(cluster_size: u32, cluster_count: u32) -> Self {
        ClusterArena {
            data: vec![0u8; cluster_size as usize * cluster_count as usize],
            cluster_size,
            cluster_count,
        }
    }

    /// Wrap raw bytes read from an image
    pub fn from_bytes(data: Vec<u8>, cluster_size: u32, cluster_count: u32) -> Result<Self> {
        let expected = cluster_size as usize * cluster_count as usize;
        if data.len() != expected {
            return Err(FsError::CorruptImage(format!(
                "arena holds {} bytes, expected {}",
                data.len(),
                expected
            )));
        }

        Ok(ClusterArena {
            data,
            cluster_size,
            cluster_count,
        })
    }

    fn offset(&self, cluster: u32, size: usize) -> Result<usize> {
        if cluster >= self.cluster_count {
            return Err(FsError::InvalidCluster(cluster as i64));
        }

        if size > self.cluster_size as usize {
            return Err(FsError::SizeExceedsCluster {
                size,
                cluster_size: self.cluster_size,
            });
        }

        Ok(cluster as usize * self.cluster_size as usize)
    }

    /// Copy `size` bytes out of a cluster
    pub fn read(&self, cluster: u32, size: usize) -> Result<Vec<u8>> {
        let offset = self.offset(cluster, size)?;
        Ok(self.data[offset..offset + size].to_vec())
    }

    /// Copy `bytes` into the start of a cluster
    pub fn write(&mut self, cluster: u32, bytes: &[u8]) -> Result<()> {
        let offset = self.offset(cluster, bytes.len())?;
        if bytes.is_empty() {
            return Err(FsError::NullData);
        }

        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Zero a whole cluster
    pub fn zero(&mut self, cluster: u32) -> Result<()> {
        let offset = self.offset(cluster, 0)?;
        let end = offset + self.cluster_size as usize;
        self.data[offset..end].fill(0);
        Ok(())
    }

    /// Copy one cluster's full contents onto another
    pub fn copy_cluster(&mut self, src: u32, dest: u32) -> Result<()> {
        let src_offset = self.offset(src, 0)?;
        let dest_offset = self.offset(dest, 0)?;
        let len = self.cluster_size as usize;
        self.data
            .copy_within(src_offset..src_offset + len, dest_offset);
        Ok(())
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// Raw bytes, as persisted
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
