//! Approximate match index over perceptual hashes.
//!
//! A BK-tree keyed by Hamming distance: every node stores one fingerprint,
//! every child edge is labeled with the exact distance from parent to child.
//! The triangle inequality lets a query prune any subtree whose edge label
//! falls outside `[d - max, d + max]`, making search sub-linear instead of
//! exhaustive.
//!
//! Nodes live in a flat arena and traversal is iterative with an explicit
//! stack, so deep trees cannot blow the call stack. The tree is built once
//! per grouping pass from a point-in-time read and queried afterwards; it is
//! never mutated concurrently with queries.

use crate::fingerprint::hamming_distance;

struct Node {
    bits: Vec<u8>,
    file_id: i64,
    /// (edge distance to child, child arena index). Edge labels are unique
    /// per node by construction.
    children: Vec<(u32, usize)>,
}

/// One index instance per perceptual-hash kind. All inserted bit strings
/// must share the width of the first insert; mismatched widths are skipped.
pub struct BkTree {
    nodes: Vec<Node>,
}

impl BkTree {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a fingerprint. Walks down following the measured distance to
    /// the existing node until an empty edge slot is found.
    pub fn insert(&mut self, bits: Vec<u8>, file_id: i64) {
        if self.nodes.is_empty() {
            self.nodes.push(Node {
                bits,
                file_id,
                children: Vec::new(),
            });
            return;
        }

        let mut current = 0usize;
        loop {
            let distance = match hamming_distance(&bits, &self.nodes[current].bits) {
                Some(d) => d,
                None => {
                    tracing::warn!(
                        "skipping index insert for file {}: hash width mismatch",
                        file_id
                    );
                    return;
                }
            };

            match self.nodes[current]
                .children
                .iter()
                .find(|(edge, _)| *edge == distance)
            {
                Some(&(_, child)) => current = child,
                None => {
                    let idx = self.nodes.len();
                    self.nodes.push(Node {
                        bits,
                        file_id,
                        children: Vec::new(),
                    });
                    self.nodes[current].children.push((distance, idx));
                    return;
                }
            }
        }
    }

    /// All fingerprints within `max_distance` of `bits`, with their exact
    /// distances, sorted by distance then file id.
    pub fn query(&self, bits: &[u8], max_distance: u32) -> Vec<(i64, u32)> {
        let mut results = Vec::new();
        if self.nodes.is_empty() {
            return results;
        }

        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let distance = match hamming_distance(bits, &node.bits) {
                Some(d) => d,
                None => continue,
            };

            if distance <= max_distance {
                results.push((node.file_id, distance));
            }

            let low = distance.saturating_sub(max_distance);
            let high = distance + max_distance;
            for &(edge, child) in &node.children {
                if edge >= low && edge <= high {
                    stack.push(child);
                }
            }
        }

        results.sort_by_key(|&(id, d)| (d, id));
        results
    }
}

impl Default for BkTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force(entries: &[(Vec<u8>, i64)], query: &[u8], max: u32) -> Vec<(i64, u32)> {
        let mut hits: Vec<(i64, u32)> = entries
            .iter()
            .filter_map(|(bits, id)| {
                hamming_distance(bits, query)
                    .filter(|d| *d <= max)
                    .map(|d| (*id, d))
            })
            .collect();
        hits.sort_by_key(|&(id, d)| (d, id));
        hits
    }

    #[test]
    fn test_empty_tree() {
        let tree = BkTree::new();
        assert!(tree.is_empty());
        assert!(tree.query(&[0u8; 8], 10).is_empty());
    }

    #[test]
    fn test_exact_and_near_hits() {
        let mut tree = BkTree::new();
        tree.insert(vec![0b0000_0000], 1);
        tree.insert(vec![0b0000_0001], 2);
        tree.insert(vec![0b1111_1111], 3);

        let hits = tree.query(&[0b0000_0000], 1);
        assert_eq!(hits, vec![(1, 0), (2, 1)]);

        let all = tree.query(&[0b0000_0000], 8);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_identical_fingerprints_chain() {
        // Distance-zero edges still chain; duplicates must not be lost.
        let mut tree = BkTree::new();
        for id in 0..5 {
            tree.insert(vec![0xaa, 0xbb], id);
        }
        assert_eq!(tree.len(), 5);
        let hits = tree.query(&[0xaa, 0xbb], 0);
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn test_query_matches_linear_scan() {
        // Exhaustive equivalence against brute force on random bit strings.
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for trial in 0..20 {
            let n = 200;
            let width = 8; // 64-bit hashes
            let mut tree = BkTree::new();
            let mut entries = Vec::new();

            for id in 0..n {
                let bits: Vec<u8> = (0..width).map(|_| rng.gen()).collect();
                tree.insert(bits.clone(), id);
                entries.push((bits, id));
            }

            for _ in 0..10 {
                let query: Vec<u8> = (0..width).map(|_| rng.gen()).collect();
                let max = rng.gen_range(0..=24);
                let expected = brute_force(&entries, &query, max);
                let actual = tree.query(&query, max);
                assert_eq!(actual, expected, "trial {} max {}", trial, max);
            }
        }
    }

    #[test]
    fn test_width_mismatch_skipped() {
        let mut tree = BkTree::new();
        tree.insert(vec![0u8; 8], 1);
        tree.insert(vec![0u8; 4], 2); // wrong width, dropped
        assert_eq!(tree.len(), 1);
    }
}
