//! Per-cluster reference counts
//!
//! A count records how many directory items consider the cluster part of
//! their chain. Sized to the full cluster count; counts never go below zero.

/// Reference count table, one slot per cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCounts {
    counts: Vec<u32>,
}

impl RefCounts {
    pub fn new(cluster_count: u32) -> Self {
        RefCounts {
            counts: vec![0; cluster_count as usize],
        }
    }

    /// Current count, zero for out-of-range clusters
    pub fn get(&self, cluster: u32) -> u32 {
        self.counts.get(cluster as usize).copied().unwrap_or(0)
    }

    /// Increment and return the new count
    pub(crate) fn increment(&mut self, cluster: u32) -> u32 {
        let slot = &mut self.counts[cluster as usize];
        *slot = slot.saturating_add(1);
        *slot
    }

    /// Decrement (floored at zero) and return the new count
    pub(crate) fn decrement(&mut self, cluster: u32) -> u32 {
        let slot = &mut self.counts[cluster as usize];
        if *slot == 0 {
            tracing::warn!("Reference count underflow on cluster {}", cluster);
        }
        *slot = slot.saturating_sub(1);
        *slot
    }

    pub(crate) fn reset(&mut self, cluster: u32) {
        self.counts[cluster as usize] = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.counts.fill(0);
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of clusters with at least one reference
    pub fn referenced(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_to_cluster_count() {
        let refs = RefCounts::new(256);
        assert_eq!(refs.len(), 256);
        assert_eq!(refs.get(255), 0);
        assert_eq!(refs.get(1000), 0);
    }

    #[test]
    fn test_increment_decrement() {
        let mut refs = RefCounts::new(8);
        assert_eq!(refs.increment(3), 1);
        assert_eq!(refs.increment(3), 2);
        assert_eq!(refs.decrement(3), 1);
        assert_eq!(refs.decrement(3), 0);
        assert_eq!(refs.referenced(), 0);
    }

    #[test]
    fn test_never_negative() {
        let mut refs = RefCounts::new(8);
        assert_eq!(refs.decrement(5), 0);
        assert_eq!(refs.get(5), 0);
    }
}
