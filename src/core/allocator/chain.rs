//! Bounded cluster chain traversal
//!
//! A walk follows table links from a start cluster until CHAIN-END. Every
//! visited cluster is recorded in a bitmap, so a walk yields at most
//! `cluster_count` clusters and a revisit is reported as a cycle instead of
//! looping forever. Links to UNUSED/BAD entries or out-of-range values end
//! the walk with an error.

use crate::core::allocator::fat::FatEntry;
use crate::core::error::{FsError, Result};

/// Lazy iterator over the clusters of one chain
///
/// Yields `Ok(cluster)` for each link. On corruption it yields a single
/// `Err` and then stops.
pub struct ChainWalk<'a> {
    table: &'a [i32],
    start: i32,
    cursor: i32,
    steps: usize,
    visited: Vec<u64>,
    done: bool,
}

impl<'a> ChainWalk<'a> {
    pub(crate) fn new(table: &'a [i32], start: i32) -> Self {
        ChainWalk {
            table,
            start,
            cursor: start,
            steps: 0,
            visited: vec![0u64; (table.len() + 63) / 64],
            done: false,
        }
    }

    fn mark_visited(&mut self, cluster: u32) -> bool {
        let word = cluster as usize / 64;
        let bit = 1u64 << (cluster % 64);
        let seen = self.visited[word] & bit != 0;
        self.visited[word] |= bit;
        seen
    }

    fn fail(&mut self, err: FsError) -> Option<Result<u32>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for ChainWalk<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let cluster_count = self.table.len() as u32;
        match FatEntry::decode(self.cursor, cluster_count) {
            FatEntry::ChainEnd => {
                self.done = true;
                None
            }
            FatEntry::Next(cluster) => {
                if self.mark_visited(cluster) {
                    return self.fail(FsError::corrupt_chain(
                        self.start,
                        format!("cycle detected at cluster {}", cluster),
                    ));
                }

                self.steps += 1;
                self.cursor = self.table[cluster as usize];
                Some(Ok(cluster))
            }
            _ if self.steps == 0 => self.fail(FsError::InvalidCluster(self.cursor as i64)),
            FatEntry::Unused => self.fail(FsError::corrupt_chain(
                self.start,
                format!("link after {} clusters reaches an unused cluster", self.steps),
            )),
            FatEntry::Bad => self.fail(FsError::corrupt_chain(
                self.start,
                format!("link after {} clusters reaches a bad cluster", self.steps),
            )),
            FatEntry::Invalid(raw) => self.fail(FsError::corrupt_chain(
                self.start,
                format!("link after {} clusters is out of range ({})", self.steps, raw),
            )),
        }
    }
}
