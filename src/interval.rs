//! Temporal interval extraction from per-frame correlation scores.
//!
//! A staged signal pipeline per candidate model: pick the best-fitting
//! candidate, collapse its two scores per frame into one raw series, smooth
//! it with two parallel filters, classify frames into on/unknown/off, fill
//! unknown gaps, and emit refined logo-presence intervals in the external
//! report format (`<best> S 0 ALL <start> <end>` / matching `E` line).

use std::io::{self, Write};

use log::info;

use crate::error::{Error, Result};
use crate::mask::EvalResult;

/// Presence threshold on the raw/averaged score and the candidate hit rule.
pub const THRESH: f32 = 0.2;
/// Presence threshold for the min-of-local-maxima filter.
const THRESH_L: f32 = 0.5;

/// Tuning for the smoothing and refinement stages.
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Full width of the moving-average window, in frames.
    pub avg_window: usize,
    /// Half-window of the min-of-local-maxima filter, in frames.
    pub minmax_window: usize,
    /// Width of the median filter used for boundary refinement (odd).
    pub median_frames: usize,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            avg_window: 30,
            minmax_window: 15,
            median_frames: 5,
        }
    }
}

/// One emitted logo-presence interval (frame indices, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoInterval {
    /// Representative frame with the strongest raw score.
    pub best: u32,
    /// First frame of the interval.
    pub start: u32,
    /// Last frame of the interval.
    pub end: u32,
}

/// Per-candidate fit over a frame range, lower is better.
///
/// A frame "hits" when the logo is clearly present (`corr0 > THRESH`) and
/// fully explained by removal (`|corr1| < THRESH`). The score is the average
/// leftover artifact over hits, penalized by the inverse hit rate: a
/// candidate that rarely matches is a poor fit even when its matches are
/// clean. `None` when the candidate never hits.
#[must_use]
pub fn calc_logo_score<I>(evals: I, total: usize) -> Option<f32>
where
    I: IntoIterator<Item = EvalResult>,
{
    let mut hits = 0u32;
    let mut leftover = 0.0_f32;
    for e in evals {
        if e.corr0 > THRESH && e.corr1.abs() < THRESH {
            hits += 1;
            leftover += e.corr1.abs();
        }
    }
    if hits == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let (hits_f, total_f) = (hits as f32, total as f32);
    Some((leftover / hits_f) * (total_f / hits_f))
}

/// Pick the best-fitting candidate from frame-major evaluation results
/// (`evals[frame * num_candidates + candidate]`).
///
/// Lowest [`calc_logo_score`] wins; ties go to the first candidate. `None`
/// when no candidate ever hits.
#[must_use]
pub fn select_logo(evals: &[EvalResult], num_candidates: usize) -> Option<usize> {
    if num_candidates == 0 || evals.len() < num_candidates {
        return None;
    }
    let total = evals.len() / num_candidates;
    let mut best: Option<(usize, f32)> = None;
    for cand in 0..num_candidates {
        let series = evals[cand..].iter().step_by(num_candidates).copied();
        if let Some(score) = calc_logo_score(series, total) {
            let better = best.is_none_or(|(_, s)| score < s);
            if better {
                best = Some((cand, score));
            }
        }
    }
    best.map(|(cand, _)| cand)
}

/// Collapse one candidate's evaluations into the raw per-frame score series:
/// `max(0, corr0) + min(0, corr1)` — noise in the "wrong" direction of
/// either term carries no information and is discarded.
#[must_use]
pub fn raw_scores(evals: &[EvalResult], num_candidates: usize, candidate: usize) -> Vec<f32> {
    if candidate >= evals.len() {
        return Vec::new();
    }
    evals[candidate..]
        .iter()
        .step_by(num_candidates.max(1))
        .map(|e| e.corr0.max(0.0) + e.corr1.min(0.0))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Off,
    Unknown,
    On,
}

/// Min of the local maxima over the preceding and following half-windows.
///
/// A brief occlusion (someone walks in front of the logo) dents only one
/// side's maximum, so the filter rides through it; a genuine transition
/// dents both.
fn filter_minmax(raw: &[f32], half_window: usize) -> Vec<f32> {
    let n = raw.len();
    let mut out = vec![0.0_f32; n];
    for i in 0..n {
        let lo = i.saturating_sub(half_window);
        let hi = (i + half_window + 1).min(n);
        let before = raw[lo..=i].iter().copied().fold(f32::MIN, f32::max);
        let after = raw[i..hi].iter().copied().fold(f32::MIN, f32::max);
        out[i] = before.min(after);
    }
    out
}

/// Plain moving average with clamped borders.
fn filter_average(raw: &[f32], window: usize) -> Vec<f32> {
    let n = raw.len();
    let half = (window / 2).max(1);
    let mut out = vec![0.0_f32; n];
    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        #[allow(clippy::cast_precision_loss)]
        {
            out[i] = raw[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;
        }
    }
    out
}

/// Median over a clamped window centered on `i`.
fn median_at(raw: &[f32], i: usize, width: usize) -> f32 {
    let half = width / 2;
    let lo = i.saturating_sub(half);
    let hi = (i + half + 1).min(raw.len());
    let mut window: Vec<f32> = raw[lo..hi].to_vec();
    window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    window[window.len() / 2]
}

/// Classify each frame from the two smoothed series; the filters must agree
/// for a definite state.
fn classify(raw: &[f32], config: &IntervalConfig) -> Vec<State> {
    let minmax = filter_minmax(raw, config.minmax_window);
    let avg = filter_average(raw, config.avg_window);
    minmax
        .iter()
        .zip(&avg)
        .map(|(&m, &a)| {
            let on_m = m >= THRESH_L;
            let on_a = a >= THRESH;
            match (on_m, on_a) {
                (true, true) => State::On,
                (false, false) => State::Off,
                _ => State::Unknown,
            }
        })
        .collect()
}

/// Relabel unknown runs bordered by one definite state on both sides.
///
/// Runs at the sequence edge take their single definite neighbor; a fully
/// unknown sequence collapses to off.
fn fill_gaps(states: &mut [State]) {
    let n = states.len();
    let mut i = 0;
    while i < n {
        if states[i] != State::Unknown {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < n && states[i] == State::Unknown {
            i += 1;
        }
        let left = run_start.checked_sub(1).map(|j| states[j]);
        let right = (i < n).then(|| states[i]);
        let fill = match (left, right) {
            (Some(l), Some(r)) if l == r => l,
            (Some(l), None) => l,
            (None, Some(r)) => r,
            (None, None) => State::Off,
            _ => State::Unknown,
        };
        for s in &mut states[run_start..i] {
            *s = fill;
        }
    }
}

/// Walk a median-filtered score across the threshold crossing to undo the
/// smoothing filters' lag at a run boundary.
fn refine_boundary(raw: &[f32], from: usize, width: usize, forward: bool, floor: usize) -> usize {
    let n = raw.len();
    let mut i = from;
    if forward {
        // push the end outward while the signal stays on, then pull back in
        while i + 1 < n && median_at(raw, i + 1, width) > THRESH {
            i += 1;
        }
        while i > from && median_at(raw, i, width) <= THRESH {
            i -= 1;
        }
    } else {
        while i > floor && median_at(raw, i - 1, width) > THRESH {
            i -= 1;
        }
        while i < from && median_at(raw, i, width) <= THRESH {
            i += 1;
        }
    }
    i
}

/// Extract logo-presence intervals from one candidate's raw score series.
///
/// Frame indices are positions within `raw`; callers with trimmed input map
/// them back through their trim set.
#[must_use]
pub fn extract_intervals(raw: &[f32], config: &IntervalConfig) -> Vec<LogoInterval> {
    if raw.is_empty() {
        return Vec::new();
    }
    let mut states = classify(raw, config);
    fill_gaps(&mut states);

    let mut intervals = Vec::new();
    let mut i = 0;
    let mut last_end: Option<usize> = None;
    while i < states.len() {
        if states[i] != State::On {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < states.len() && states[i] == State::On {
            i += 1;
        }
        let run_end = i - 1;

        let floor = last_end.map_or(0, |e| e + 1);
        let start = refine_boundary(raw, run_start, config.median_frames, false, floor);
        let end = refine_boundary(raw, run_end, config.median_frames, true, 0);
        let best = (start..=end)
            .max_by(|&a, &b| raw[a].total_cmp(&raw[b]))
            .unwrap_or(run_start);
        last_end = Some(end);

        #[allow(clippy::cast_possible_truncation)]
        intervals.push(LogoInterval {
            best: best as u32,
            start: start as u32,
            end: end as u32,
        });
    }
    info!("extracted {} logo interval(s)", intervals.len());
    intervals
}

/// Write intervals in the external report format, one `S` and one `E` line
/// per interval.
///
/// # Errors
///
/// Propagates writer errors.
pub fn write_report<W: Write>(mut w: W, intervals: &[LogoInterval]) -> io::Result<()> {
    for iv in intervals {
        writeln!(w, "{} S 0 ALL {} {}", iv.best, iv.start, iv.end)?;
        writeln!(w, "{} E 0 ALL {} {}", iv.best, iv.start, iv.end)?;
    }
    Ok(())
}

/// Parse a report produced by [`write_report`].
///
/// # Errors
///
/// Returns [`Error::Format`] for lines that do not match the report shape.
pub fn parse_report(text: &str) -> Result<Vec<LogoInterval>> {
    let mut intervals = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [best, kind, _, _, start, end] = fields.as_slice() else {
            return Err(Error::Format(format!("bad report line: {line:?}")));
        };
        if *kind == "E" {
            continue; // paired with the S line already parsed
        }
        if *kind != "S" {
            return Err(Error::Format(format!("bad event kind in line: {line:?}")));
        }
        let parse = |s: &str| {
            s.parse::<u32>()
                .map_err(|_| Error::Format(format!("bad frame number {s:?}")))
        };
        intervals.push(LogoInterval {
            best: parse(best)?,
            start: parse(start)?,
            end: parse(end)?,
        });
    }
    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(corr0: f32, corr1: f32) -> EvalResult {
        EvalResult { corr0, corr1 }
    }

    #[test]
    fn candidate_score_prefers_clean_frequent_hits() {
        // candidate 0: hits everywhere, tiny leftover
        // candidate 1: hits half the time, larger leftover
        let mut evals = Vec::new();
        for i in 0..100 {
            evals.push(eval(0.9, 0.01));
            if i % 2 == 0 {
                evals.push(eval(0.8, 0.1));
            } else {
                evals.push(eval(0.0, 0.0));
            }
        }
        assert_eq!(select_logo(&evals, 2), Some(0));
    }

    #[test]
    fn candidate_with_no_hits_is_disqualified() {
        let evals: Vec<EvalResult> = (0..50).map(|_| eval(0.05, 0.9)).collect();
        assert_eq!(select_logo(&evals, 1), None);
    }

    #[test]
    fn rare_candidate_loses_to_steady_one() {
        // candidate 0 hits only 5% of frames; candidate 1 hits everywhere
        // with the same leftover, so the inverse hit rate decides:
        // 0.05 * (200/10) = 1.0 vs 0.05 * (200/200) = 0.05
        let mut evals = Vec::new();
        for i in 0..200 {
            if i % 20 == 0 {
                evals.push(eval(0.9, 0.05));
            } else {
                evals.push(eval(0.0, 0.5));
            }
            evals.push(eval(0.7, 0.05));
        }
        assert_eq!(select_logo(&evals, 2), Some(1));
    }

    #[test]
    fn zero_leftover_scores_zero_regardless_of_hit_rate() {
        // the hit-rate penalty multiplies the average leftover, so a
        // candidate whose few hits are exact still scores a perfect 0
        let evals: Vec<EvalResult> = (0..40)
            .map(|i| if i % 10 == 0 { eval(0.9, 0.0) } else { eval(0.0, 0.5) })
            .collect();
        let score = calc_logo_score(evals.iter().copied(), 40).unwrap();
        assert!(score.abs() < f32::EPSILON, "score = {score}");
    }

    #[test]
    fn raw_scores_discard_wrong_direction_noise() {
        let evals = vec![eval(-0.3, -0.1), eval(0.6, 0.2)];
        let raw = raw_scores(&evals, 1, 0);
        assert!((raw[0] - (-0.1)).abs() < 1e-6); // corr0 clamped up to 0
        assert!((raw[1] - 0.6).abs() < 1e-6); // corr1 clamped down to 0
    }

    fn plateau_series(n: usize, on_start: usize, on_end: usize) -> Vec<f32> {
        (0..n)
            .map(|i| if i >= on_start && i < on_end { 1.0 } else { 0.02 })
            .collect()
    }

    fn small_config() -> IntervalConfig {
        IntervalConfig {
            avg_window: 10,
            minmax_window: 5,
            median_frames: 5,
        }
    }

    #[test]
    fn single_plateau_emits_single_interval() {
        let raw = plateau_series(300, 80, 200);
        let intervals = extract_intervals(&raw, &small_config());
        assert_eq!(intervals.len(), 1, "expected one interval, got {intervals:?}");
        let iv = intervals[0];
        let tol = 6i64; // within the smoothing window
        assert!((i64::from(iv.start) - 80).abs() <= tol, "start = {}", iv.start);
        assert!((i64::from(iv.end) - 199).abs() <= tol, "end = {}", iv.end);
        assert!(iv.best >= iv.start && iv.best <= iv.end);
    }

    #[test]
    fn brief_occlusion_does_not_split_interval() {
        let mut raw = plateau_series(300, 80, 200);
        for v in &mut raw[140..143] {
            *v = 0.0; // 3-frame occlusion dip
        }
        let intervals = extract_intervals(&raw, &small_config());
        assert_eq!(intervals.len(), 1, "dip split the interval: {intervals:?}");
    }

    #[test]
    fn all_quiet_series_emits_nothing() {
        let raw = vec![0.05_f32; 200];
        assert!(extract_intervals(&raw, &small_config()).is_empty());
    }

    #[test]
    fn two_plateaus_emit_two_intervals() {
        let mut raw = plateau_series(400, 50, 150);
        for v in &mut raw[250..350] {
            *v = 1.0;
        }
        let intervals = extract_intervals(&raw, &small_config());
        assert_eq!(intervals.len(), 2, "got {intervals:?}");
        assert!(intervals[0].end < intervals[1].start);
    }

    #[test]
    fn gap_fill_bridges_matching_neighbors() {
        let mut states = vec![State::On, State::Unknown, State::Unknown, State::On];
        fill_gaps(&mut states);
        assert!(states.iter().all(|&s| s == State::On));

        let mut states = vec![State::On, State::Unknown, State::Off];
        fill_gaps(&mut states);
        assert_eq!(states[1], State::Unknown);

        let mut states = vec![State::Unknown, State::Off];
        fill_gaps(&mut states);
        assert_eq!(states[0], State::Off);
    }

    #[test]
    fn report_round_trips() {
        let intervals = vec![
            LogoInterval {
                best: 120,
                start: 84,
                end: 205,
            },
            LogoInterval {
                best: 500,
                start: 450,
                end: 633,
            },
        ];
        let mut buf = Vec::new();
        write_report(&mut buf, &intervals).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("120 S 0 ALL 84 205"));
        assert!(text.contains("120 E 0 ALL 84 205"));
        assert_eq!(parse_report(&text).unwrap(), intervals);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(parse_report("12 S 0 ALL 5").is_err());
        assert!(parse_report("12 X 0 ALL 5 9").is_err());
        assert!(parse_report("twelve S 0 ALL 5 9").is_err());
    }
}
