//! Frame-range partitioning for data-parallel scoring.
//!
//! A trim set is a globally ordered list of disjoint inclusive frame ranges.
//! [`partition_frames`] slices the flattened trimmed range into one
//! contiguous chunk per worker, proportionally sized, and maps each chunk
//! back into (possibly several) trim subranges. Workers therefore touch
//! disjoint frame sets whose union is exactly the trimmed input.

/// An inclusive frame range `start ..= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trim {
    /// First frame of the range.
    pub start: u32,
    /// Last frame of the range (inclusive).
    pub end: u32,
}

impl Trim {
    /// Number of frames in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        u64::from(self.end) - u64::from(self.start) + 1
    }

    /// Whether the range is empty (never true for a well-formed trim).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Total frame count across a trim set.
#[must_use]
pub fn total_frames(trims: &[Trim]) -> u64 {
    trims.iter().map(Trim::len).sum()
}

/// Split a trim set into `workers` disjoint target subrange sets.
///
/// Worker `i` receives the flattened positions `total*i/N .. total*(i+1)/N`,
/// mapped back into the original trim segments. Some workers may receive an
/// empty set when there are more workers than frames.
///
/// Trims must be ordered and disjoint; this is the caller's contract.
#[must_use]
pub fn partition_frames(trims: &[Trim], workers: usize) -> Vec<Vec<Trim>> {
    let workers = workers.max(1);
    let total = total_frames(trims);
    let mut parts = Vec::with_capacity(workers);
    for i in 0..workers {
        let lo = total * i as u64 / workers as u64;
        let hi = total * (i as u64 + 1) / workers as u64;
        parts.push(slice_trims(trims, lo, hi));
    }
    parts
}

/// Map flattened positions `[lo, hi)` back into trim subranges.
fn slice_trims(trims: &[Trim], lo: u64, hi: u64) -> Vec<Trim> {
    let mut out = Vec::new();
    let mut offset = 0u64;
    for t in trims {
        let t_lo = offset;
        let t_hi = offset + t.len();
        offset = t_hi;
        let s = lo.max(t_lo);
        let e = hi.min(t_hi);
        if s >= e {
            continue;
        }
        #[allow(clippy::cast_possible_truncation)]
        out.push(Trim {
            start: t.start + (s - t_lo) as u32,
            end: t.start + (e - t_lo) as u32 - 1,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(parts: &[Vec<Trim>]) -> Vec<u32> {
        let mut frames = Vec::new();
        for part in parts {
            for t in part {
                frames.extend(t.start..=t.end);
            }
        }
        frames
    }

    fn expected(trims: &[Trim]) -> Vec<u32> {
        let mut frames = Vec::new();
        for t in trims {
            frames.extend(t.start..=t.end);
        }
        frames
    }

    #[test]
    fn partition_covers_trims_exactly_once() {
        let trims = [
            Trim { start: 10, end: 42 },
            Trim { start: 100, end: 100 },
            Trim { start: 200, end: 333 },
        ];
        for workers in 1..=9 {
            let parts = partition_frames(&trims, workers);
            assert_eq!(parts.len(), workers);
            assert_eq!(
                flatten(&parts),
                expected(&trims),
                "workers = {workers}: union must be the trimmed set in order"
            );
        }
    }

    #[test]
    fn more_workers_than_frames_leaves_empty_parts() {
        let trims = [Trim { start: 5, end: 7 }];
        let parts = partition_frames(&trims, 8);
        assert_eq!(flatten(&parts), vec![5, 6, 7]);
        assert!(parts.iter().filter(|p| p.is_empty()).count() >= 5);
    }

    #[test]
    fn single_worker_gets_everything() {
        let trims = [Trim { start: 0, end: 9 }, Trim { start: 20, end: 29 }];
        let parts = partition_frames(&trims, 1);
        assert_eq!(parts[0], trims.to_vec());
    }

    #[test]
    fn empty_trim_set_yields_empty_parts() {
        let parts = partition_frames(&[], 4);
        assert!(parts.iter().all(Vec::is_empty));
    }

    #[test]
    fn boundaries_are_proportional() {
        let trims = [Trim { start: 0, end: 99 }];
        let parts = partition_frames(&trims, 4);
        for (i, part) in parts.iter().enumerate() {
            let count: u64 = part.iter().map(Trim::len).sum();
            assert_eq!(count, 25, "worker {i} share");
        }
    }
}
