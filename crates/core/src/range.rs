//! Missing-chunk interval math.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A closed interval `[start, end]` of chunk offsets still owed by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }
}

/// The minimal sorted list of maximal gaps of `{0..count-1} \ present`.
pub fn missing_ranges(present: &HashSet<u64>, count: u64) -> Vec<ChunkRange> {
    let mut ranges = Vec::new();
    let mut run: Option<(u64, u64)> = None;
    for offset in 0..count {
        if present.contains(&offset) {
            if let Some((start, end)) = run.take() {
                ranges.push(ChunkRange::new(start, end));
            }
        } else {
            run = Some(match run {
                Some((start, _)) => (start, offset),
                None => (offset, offset),
            });
        }
    }
    if let Some((start, end)) = run {
        ranges.push(ChunkRange::new(start, end));
    }
    ranges
}

/// All offsets covered by a range list. Inverse of [`missing_ranges`].
pub fn covered_offsets(ranges: &[ChunkRange]) -> HashSet<u64> {
    ranges
        .iter()
        .flat_map(|r| r.start..=r.end)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(offsets: &[u64]) -> HashSet<u64> {
        offsets.iter().copied().collect()
    }

    #[test]
    fn test_empty_set_yields_full_range() {
        assert_eq!(
            missing_ranges(&present(&[]), 5),
            vec![ChunkRange::new(0, 4)]
        );
    }

    #[test]
    fn test_complete_set_yields_nothing() {
        assert!(missing_ranges(&present(&[0, 1, 2]), 3).is_empty());
    }

    #[test]
    fn test_gaps_are_maximal_and_sorted() {
        assert_eq!(
            missing_ranges(&present(&[1, 4, 5]), 8),
            vec![
                ChunkRange::new(0, 0),
                ChunkRange::new(2, 3),
                ChunkRange::new(6, 7),
            ]
        );
    }

    #[test]
    fn test_trailing_gap() {
        assert_eq!(
            missing_ranges(&present(&[0]), 3),
            vec![ChunkRange::new(1, 2)]
        );
    }

    #[test]
    fn test_single_chunk() {
        assert_eq!(
            missing_ranges(&present(&[]), 1),
            vec![ChunkRange::new(0, 0)]
        );
        assert!(missing_ranges(&present(&[0]), 1).is_empty());
    }

    #[test]
    fn test_zero_count() {
        assert!(missing_ranges(&present(&[]), 0).is_empty());
    }

    #[test]
    fn test_fill_roundtrip() {
        // fill(missing_ranges(S, N)) ∪ S = {0..N-1}
        let count = 64;
        for stored in [
            present(&[]),
            present(&[0, 1, 2, 3]),
            present(&[7, 9, 11, 63]),
            (0..count).collect::<HashSet<_>>(),
        ] {
            let gaps = missing_ranges(&stored, count);
            let mut union = covered_offsets(&gaps);
            union.extend(stored.iter().copied());
            assert_eq!(union, (0..count).collect::<HashSet<_>>());
        }
    }
}
