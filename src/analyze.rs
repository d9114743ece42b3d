//! Data-parallel scoring of candidate models over a frame range.
//!
//! Fan-out/fan-in with no shared mutable state: each rayon worker owns a
//! disjoint partition of the trimmed frame range and writes to its own
//! disjoint slice of the flat `frame x candidate` result vector, split off
//! with `split_at_mut` up front. One join point, then candidate selection
//! and interval extraction run on the assembled results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use rayon::prelude::*;

use crate::error::Result;
use crate::frame::{FrameBuf, Pixel};
use crate::mask::{EvalResult, MaskedModel};
use crate::partition::{partition_frames, total_frames, Trim};

/// Cooperative cancellation flag, cheap to clone and share across threads.
///
/// Cancellation is a clean early exit, never an error: cancelled operations
/// return `Ok(None)`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Score every candidate model against every trimmed frame.
///
/// `provider` produces the decoded frame for a global frame index; it is
/// called from multiple threads. Results are laid out frame-major:
/// `results[flat_frame * models.len() + candidate]`, where `flat_frame`
/// numbers the trimmed frames in global order.
///
/// Returns `Ok(None)` when `cancel` fires mid-run.
///
/// # Errors
///
/// Propagates the first provider or evaluation error.
pub fn score_frames<T, P>(
    provider: &P,
    models: &[MaskedModel],
    trims: &[Trim],
    workers: usize,
    cancel: Option<&CancelToken>,
) -> Result<Option<Vec<EvalResult>>>
where
    T: Pixel,
    P: Fn(u32) -> Result<FrameBuf<T>> + Sync,
{
    #[allow(clippy::cast_possible_truncation)]
    let total = total_frames(trims) as usize;
    let mut results = vec![EvalResult::default(); total * models.len()];
    if total == 0 || models.is_empty() {
        return Ok(Some(results));
    }

    let parts = partition_frames(trims, workers);
    info!(
        "scoring {} candidates over {total} frames on {} workers",
        models.len(),
        parts.len()
    );

    // Carve one disjoint output slice per partition.
    let mut slices: Vec<&mut [EvalResult]> = Vec::with_capacity(parts.len());
    let mut rest = results.as_mut_slice();
    for part in &parts {
        #[allow(clippy::cast_possible_truncation)]
        let size = total_frames(part) as usize * models.len();
        let (head, tail) = rest.split_at_mut(size);
        slices.push(head);
        rest = tail;
    }

    let completed: Result<Vec<bool>> = parts
        .par_iter()
        .zip(slices)
        .map(|(part, out)| {
            let mut i = 0;
            for trim in part {
                for frame_no in trim.start..=trim.end {
                    if cancel.is_some_and(CancelToken::is_cancelled) {
                        return Ok(false);
                    }
                    let frame = provider(frame_no)?;
                    let view = frame.view();
                    for model in models {
                        out[i] = model.evaluate_both(&view)?;
                        i += 1;
                    }
                }
            }
            Ok(true)
        })
        .collect();

    if completed?.iter().all(|&done| done) {
        Ok(Some(results))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn empty_inputs_produce_empty_results() {
        let provider = |_: u32| -> Result<FrameBuf<u8>> { unreachable!("no frames requested") };
        let out = score_frames(&provider, &[], &[], 4, None).unwrap().unwrap();
        assert!(out.is_empty());
    }
}
