//! Cluster allocation for the pseudo-FAT disk
//!
//! - [`fat`] - mirrored allocation table, first-fit allocator
//! - [`chain`] - bounded, cycle-detecting chain traversal
//! - [`refcount`] - per-cluster reference counts for shared chains

pub mod chain;
pub mod fat;
pub mod refcount;

pub use chain::ChainWalk;
pub use fat::{AllocationTable, FatEntry, FAT_BAD_CLUSTER, FAT_CHAIN_END, FAT_UNUSED};
pub use refcount::RefCounts;

use crate::core::error::Result;

/// Cluster allocator trait
///
/// Defines the interface for handing out and reclaiming single clusters.
pub trait ClusterAllocator {
    /// Allocate one free cluster, marking it as a chain end
    fn allocate(&mut self) -> Result<u32>;

    /// Return a cluster to the free pool
    fn free(&mut self, cluster: u32) -> Result<()>;

    /// Get total number of clusters managed
    fn total_clusters(&self) -> usize;

    /// Get number of clusters available for allocation
    fn free_clusters(&self) -> usize;
}
