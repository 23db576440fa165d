//! Mirrored file allocation table
//!
//! One `i32` entry per cluster holding either the index of the next cluster
//! in a chain or one of three sentinels. A secondary table is kept in
//! lock-step with the primary: every mutation writes both.
//!
//! Reference counts live beside the tables so that shared (aliased) chains
//! are only returned to UNUSED when their last owner releases them.

use crate::core::allocator::chain::ChainWalk;
use crate::core::allocator::refcount::RefCounts;
use crate::core::allocator::ClusterAllocator;
use crate::core::error::{FsError, Result};
use tracing::{debug, warn};

/// Entry marks a cluster as free
pub const FAT_UNUSED: i32 = i32::MAX - 1;

/// Entry marks the last cluster of a chain
pub const FAT_CHAIN_END: i32 = i32::MAX - 2;

/// Entry marks a cluster that must never be allocated
pub const FAT_BAD_CLUSTER: i32 = i32::MAX - 3;

/// Decoded view of a raw table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Unused,
    ChainEnd,
    Bad,
    /// Link to the next cluster of the chain
    Next(u32),
    /// Any other value: not a sentinel and not a valid index
    Invalid(i32),
}

impl FatEntry {
    /// Decode a raw entry against the table size
    pub fn decode(raw: i32, cluster_count: u32) -> Self {
        match raw {
            FAT_UNUSED => FatEntry::Unused,
            FAT_CHAIN_END => FatEntry::ChainEnd,
            FAT_BAD_CLUSTER => FatEntry::Bad,
            n if n >= 0 && (n as u32) < cluster_count => FatEntry::Next(n as u32),
            n => FatEntry::Invalid(n),
        }
    }

    /// Raw on-disk value
    pub fn encode(self) -> i32 {
        match self {
            FatEntry::Unused => FAT_UNUSED,
            FatEntry::ChainEnd => FAT_CHAIN_END,
            FatEntry::Bad => FAT_BAD_CLUSTER,
            FatEntry::Next(n) => n as i32,
            FatEntry::Invalid(n) => n,
        }
    }
}

/// Primary + secondary allocation tables with reference counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationTable {
    primary: Vec<i32>,
    secondary: Vec<i32>,
    refs: RefCounts,
}

impl AllocationTable {
    /// Create tables with every cluster UNUSED
    pub fn new(cluster_count: u32) -> Self {
        AllocationTable {
            primary: vec![FAT_UNUSED; cluster_count as usize],
            secondary: vec![FAT_UNUSED; cluster_count as usize],
            refs: RefCounts::new(cluster_count),
        }
    }

    /// Rebuild from persisted tables; reference counts start at zero
    pub fn from_tables(primary: Vec<i32>, secondary: Vec<i32>) -> Result<Self> {
        if primary.len() != secondary.len() {
            return Err(FsError::CorruptImage(format!(
                "table sizes differ: {} vs {}",
                primary.len(),
                secondary.len()
            )));
        }

        let table = AllocationTable {
            refs: RefCounts::new(primary.len() as u32),
            primary,
            secondary,
        };

        if !table.mirrors_agree() {
            warn!("Secondary allocation table differs from primary; primary is authoritative");
        }

        Ok(table)
    }

    pub fn cluster_count(&self) -> u32 {
        self.primary.len() as u32
    }

    fn check_index(&self, cluster: u32) -> Result<usize> {
        if cluster as usize >= self.primary.len() {
            return Err(FsError::InvalidCluster(cluster as i64));
        }
        Ok(cluster as usize)
    }

    /// Decoded primary entry for a cluster
    pub fn entry(&self, cluster: u32) -> Result<FatEntry> {
        let idx = self.check_index(cluster)?;
        Ok(FatEntry::decode(self.primary[idx], self.cluster_count()))
    }

    /// Write an entry into both tables
    pub fn set(&mut self, cluster: u32, entry: FatEntry) -> Result<()> {
        self.set_raw(cluster, entry.encode())
    }

    pub(crate) fn set_raw(&mut self, cluster: u32, raw: i32) -> Result<()> {
        let idx = self.check_index(cluster)?;
        self.primary[idx] = raw;
        self.secondary[idx] = raw;
        Ok(())
    }

    /// Point `prev` at `next` in both tables
    pub fn link(&mut self, prev: u32, next: u32) -> Result<()> {
        self.check_index(next)?;
        self.set(prev, FatEntry::Next(next))
    }

    /// Mark an UNUSED cluster as BAD so it is never allocated
    pub fn mark_bad(&mut self, cluster: u32) -> Result<()> {
        match self.entry(cluster)? {
            FatEntry::Unused | FatEntry::Bad => self.set(cluster, FatEntry::Bad),
            _ => Err(FsError::InvalidCluster(cluster as i64)),
        }
    }

    /// Allocate `count` clusters linked into one chain
    ///
    /// Capacity is checked first so a failed request allocates nothing.
    pub fn allocate_chain(&mut self, count: usize) -> Result<Vec<u32>> {
        if count > self.free_clusters() {
            return Err(FsError::OutOfClusters);
        }

        let mut chain: Vec<u32> = Vec::with_capacity(count);
        for _ in 0..count {
            let cluster = self.allocate()?;
            if let Some(&prev) = chain.last() {
                self.link(prev, cluster)?;
            }
            chain.push(cluster);
        }

        Ok(chain)
    }

    /// Add one owner to a cluster
    pub fn reference(&mut self, cluster: u32) -> Result<u32> {
        self.check_index(cluster)?;
        Ok(self.refs.increment(cluster))
    }

    /// Drop one owner from a cluster
    ///
    /// When the count reaches zero the cluster is freed in both tables and
    /// `true` is returned; the caller zeroes its arena region. Releasing a
    /// cluster that has no owners frees nothing.
    pub fn release(&mut self, cluster: u32) -> Result<bool> {
        self.check_index(cluster)?;
        if self.refs.get(cluster) == 0 {
            warn!("Release of unreferenced cluster {}", cluster);
            return Ok(false);
        }
        if self.refs.decrement(cluster) == 0 {
            self.free(cluster)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn ref_count(&self, cluster: u32) -> u32 {
        self.refs.get(cluster)
    }

    pub fn refs(&self) -> &RefCounts {
        &self.refs
    }

    pub(crate) fn clear_refs(&mut self) {
        self.refs.clear();
    }

    /// Lazy, bounded walk of the chain beginning at `start`
    pub fn walk(&self, start: i32) -> ChainWalk<'_> {
        ChainWalk::new(&self.primary, start)
    }

    /// Collect a whole chain, failing on the first sign of corruption
    pub fn chain(&self, start: i32) -> Result<Vec<u32>> {
        self.walk(start).collect()
    }

    /// True when both tables hold identical entries
    pub fn mirrors_agree(&self) -> bool {
        self.primary == self.secondary
    }

    pub fn primary(&self) -> &[i32] {
        &self.primary
    }

    pub fn secondary(&self) -> &[i32] {
        &self.secondary
    }
}

impl ClusterAllocator for AllocationTable {
    /// First-fit scan from cluster 0
    fn allocate(&mut self) -> Result<u32> {
        let idx = self
            .primary
            .iter()
            .position(|&raw| raw == FAT_UNUSED)
            .ok_or(FsError::OutOfClusters)?;

        self.primary[idx] = FAT_CHAIN_END;
        self.secondary[idx] = FAT_CHAIN_END;
        debug!("Allocated cluster {}", idx);

        Ok(idx as u32)
    }

    fn free(&mut self, cluster: u32) -> Result<()> {
        self.set(cluster, FatEntry::Unused)?;
        self.refs.reset(cluster);
        debug!("Freed cluster {}", cluster);
        Ok(())
    }

    fn total_clusters(&self) -> usize {
        self.primary.len()
    }

    fn free_clusters(&self) -> usize {
        self.primary.iter().filter(|&&raw| raw == FAT_UNUSED).count()
    }
}
