//! Build-phase scan: streaming per-pixel regression toward a [`LogoModel`].
//!
//! Each qualifying frame contributes one `(observed, background)` pair per
//! pixel, where the background is estimated from the scan-region border. A
//! frame only qualifies when the border is near-uniform per plane; the logo
//! model is only identifiable against backgrounds that are locally flat.
//!
//! Lifecycle: [`LogoScan::new`] → many [`LogoScan::add_frame`] →
//! [`LogoScan::normalize`] → [`LogoScan::into_logo`]. Accumulation is
//! sequential by design (streaming sums); parallelism in this crate happens
//! at the scoring stage, not here.

use log::debug;

use crate::error::{Error, Result};
use crate::frame::{Pixel, PlanarFrame};
use crate::model::{LogoHeader, LogoModel};

/// Reset-to-identity threshold on the x1000-scaled distance map used by the
/// `clean` pass. Empirically tuned; kept as-is.
pub const CLEAN_THRESHOLD: f32 = 0.3;
/// Scale applied to the raw distance map before thresholding.
const CLEAN_DIST_SCALE: f32 = 1000.0;
/// How many times the 3x3 max filter grows the confident area outward.
const MAX_FILTER_PASSES: usize = 3;

/// Scan-region geometry and frame-acceptance policy.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// X position of the scan region within the frame (luma pixels).
    pub x: u32,
    /// Y position of the scan region within the frame.
    pub y: u32,
    /// Scan region width.
    pub w: u32,
    /// Scan region height.
    pub h: u32,
    /// Horizontal chroma subsampling shift of the source (0 or 1).
    pub log_uvx: u32,
    /// Vertical chroma subsampling shift of the source (0 or 1).
    pub log_uvy: u32,
    /// Reject a frame when sorted border samples of any plane span more than
    /// this many code values (`max - min`).
    pub uniformity_threshold: f32,
}

/// Per-pixel streaming regression sums.
#[derive(Debug, Clone, Copy, Default)]
struct PixelAcc {
    sum_f: f64,
    sum_b: f64,
    sum_ff: f64,
    sum_bb: f64,
    sum_fb: f64,
}

impl PixelAcc {
    #[inline]
    fn add(&mut self, f: f64, b: f64) {
        self.sum_f += f;
        self.sum_b += b;
        self.sum_ff += f * f;
        self.sum_bb += b * b;
        self.sum_fb += f * b;
    }

    fn scale(&mut self, inv: f64) {
        self.sum_f *= inv;
        self.sum_b *= inv;
        self.sum_ff *= inv * inv;
        self.sum_bb *= inv * inv;
        self.sum_fb *= inv * inv;
    }
}

/// Ordinary least squares `y = a*x + b` from accumulated sums.
fn ols(n: f64, sx: f64, sy: f64, sxx: f64, sxy: f64) -> Option<(f64, f64)> {
    let det = n.mul_add(sxx, -(sx * sx));
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let a = n.mul_add(sxy, -(sx * sy)) / det;
    let b = sxx.mul_add(sy, -(sx * sxy)) / det;
    if a.is_finite() && b.is_finite() {
        Some((a, b))
    } else {
        None
    }
}

/// Solve `observed = A*background + B` from one pixel's sums.
///
/// Regresses in both directions and averages the first fit with the
/// algebraic inverse of the second; noise sits on both axes, and a single
/// one-way OLS would bias `A` low. `None` means no usable logo signal
/// (degenerate, non-finite, or zero slope).
fn solve_ab(acc: &PixelAcc, n: f64) -> Option<(f32, f32)> {
    // observed on background
    let (a1, b1) = ols(n, acc.sum_b, acc.sum_f, acc.sum_bb, acc.sum_fb)?;
    // background on observed, then inverted back
    let (a2, b2) = ols(n, acc.sum_f, acc.sum_b, acc.sum_ff, acc.sum_fb)?;
    if a2 == 0.0 {
        return None;
    }
    let a = (a1 + 1.0 / a2) * 0.5;
    let b = (b1 - b2 / a2) * 0.5;
    if !a.is_finite() || !b.is_finite() || a == 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let pair = (a as f32, b as f32);
    Some(pair)
}

/// Robust uniform-background estimate from sorted border samples.
///
/// Rejects (returns `None`) when `max - min` exceeds `threshold`; otherwise
/// returns the trimmed mean of the middle 50%, which shrugs off a few
/// outlier samples near the region corners.
fn estimate_background(samples: &mut [f32], threshold: f32) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let spread = samples[samples.len() - 1] - samples[0];
    if spread > threshold {
        return None;
    }
    let lo = samples.len() / 4;
    let hi = (samples.len() * 3 / 4).max(lo + 1);
    let mid = &samples[lo..hi];
    #[allow(clippy::cast_precision_loss)]
    let mean = mid.iter().sum::<f32>() / mid.len() as f32;
    Some(mean)
}

/// Collect the border samples of a `w x h` region at `(x0, y0)` in a plane.
///
/// Top and bottom rows in full, left and right columns excluding the corner
/// pixels already counted.
fn border_samples<T: Pixel>(
    plane: &[T],
    pitch: usize,
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(2 * w + 2 * h.saturating_sub(2));
    for x in 0..w {
        out.push(plane[y0 * pitch + x0 + x].to_f32());
        out.push(plane[(y0 + h - 1) * pitch + x0 + x].to_f32());
    }
    for y in 1..h.saturating_sub(1) {
        out.push(plane[(y0 + y) * pitch + x0].to_f32());
        out.push(plane[(y0 + y) * pitch + x0 + w - 1].to_f32());
    }
    out
}

/// Streaming scan over frames, producing a [`LogoModel`] on completion.
#[derive(Debug)]
pub struct LogoScan {
    config: ScanConfig,
    acc_y: Vec<PixelAcc>,
    acc_u: Vec<PixelAcc>,
    acc_v: Vec<PixelAcc>,
    frames: u32,
    frame_dims: Option<(u32, u32)>,
    normalized: bool,
}

impl LogoScan {
    /// Create a scan for the given region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] when the region is empty or not aligned
    /// to the chroma subsampling.
    pub fn new(config: ScanConfig) -> Result<Self> {
        let sub_x = 1u32 << config.log_uvx;
        let sub_y = 1u32 << config.log_uvy;
        if config.w == 0 || config.h == 0 {
            return Err(Error::Geometry("empty scan region".to_string()));
        }
        if config.log_uvx > 1 || config.log_uvy > 1 {
            return Err(Error::Geometry(format!(
                "unsupported chroma subsampling shift {}x{}",
                config.log_uvx, config.log_uvy
            )));
        }
        if config.w % sub_x != 0
            || config.h % sub_y != 0
            || config.x % sub_x != 0
            || config.y % sub_y != 0
        {
            return Err(Error::Geometry(format!(
                "scan region {}x{}+{}+{} not aligned to {sub_x}x{sub_y} subsampling",
                config.w, config.h, config.x, config.y
            )));
        }
        let wh = (config.w * config.h) as usize;
        let wh_uv = ((config.w >> config.log_uvx) * (config.h >> config.log_uvy)) as usize;
        Ok(Self {
            config,
            acc_y: vec![PixelAcc::default(); wh],
            acc_u: vec![PixelAcc::default(); wh_uv],
            acc_v: vec![PixelAcc::default(); wh_uv],
            frames: 0,
            frame_dims: None,
            normalized: false,
        })
    }

    /// Number of frames accepted so far.
    #[must_use]
    pub fn accepted_frames(&self) -> u32 {
        self.frames
    }

    /// Offer one frame to the scan.
    ///
    /// Estimates a uniform background per plane from the scan-region border;
    /// the frame is rejected (`Ok(false)`) when any plane's border spans more
    /// than the uniformity threshold. Accepted frames update every pixel
    /// accumulator and return `Ok(true)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] when the frame does not cover the scan
    /// region or disagrees on chroma subsampling.
    pub fn add_frame<T: Pixel>(&mut self, frame: &PlanarFrame<'_, T>) -> Result<bool> {
        frame.validate()?;
        let c = &self.config;
        if frame.log_uvx != c.log_uvx || frame.log_uvy != c.log_uvy {
            return Err(Error::Geometry(format!(
                "frame subsampling {}x{} does not match scan {}x{}",
                frame.log_uvx, frame.log_uvy, c.log_uvx, c.log_uvy
            )));
        }
        if c.x + c.w > frame.width || c.y + c.h > frame.height {
            return Err(Error::Geometry(format!(
                "scan region {}x{}+{}+{} exceeds frame {}x{}",
                c.w, c.h, c.x, c.y, frame.width, frame.height
            )));
        }

        let (x, y, w, h) = (c.x as usize, c.y as usize, c.w as usize, c.h as usize);
        let (xu, yu) = (x >> c.log_uvx, y >> c.log_uvy);
        let (wu, hu) = (w >> c.log_uvx, h >> c.log_uvy);

        let mut by = border_samples(frame.y, frame.pitch_y, x, y, w, h);
        let mut bu = border_samples(frame.u, frame.pitch_uv, xu, yu, wu, hu);
        let mut bv = border_samples(frame.v, frame.pitch_uv, xu, yu, wu, hu);
        let th = c.uniformity_threshold;
        let (Some(bg_y), Some(bg_u), Some(bg_v)) = (
            estimate_background(&mut by, th),
            estimate_background(&mut bu, th),
            estimate_background(&mut bv, th),
        ) else {
            debug!("frame rejected: scan-region border not uniform");
            return Ok(false);
        };

        accumulate_plane(&mut self.acc_y, frame.y, frame.pitch_y, x, y, w, h, bg_y);
        accumulate_plane(&mut self.acc_u, frame.u, frame.pitch_uv, xu, yu, wu, hu, bg_u);
        accumulate_plane(&mut self.acc_v, frame.v, frame.pitch_uv, xu, yu, wu, hu, bg_v);

        self.frames += 1;
        self.frame_dims.get_or_insert((frame.width, frame.height));
        Ok(true)
    }

    /// Convert the accumulated sums from code-value units into the `[0, 1]`
    /// domain used by the regression and all later stages.
    ///
    /// Call exactly once, after the last frame.
    pub fn normalize(&mut self, max_value: f32) {
        debug_assert!(!self.normalized, "normalize called twice");
        let inv = 1.0 / f64::from(max_value);
        for acc in self
            .acc_y
            .iter_mut()
            .chain(self.acc_u.iter_mut())
            .chain(self.acc_v.iter_mut())
        {
            acc.scale(inv);
        }
        self.normalized = true;
    }

    /// Solve the per-pixel regression and produce the logo model.
    ///
    /// All-or-nothing: a single degenerate pixel fails the whole build.
    /// With `clean`, pixels whose smoothed distance from the identity model
    /// falls below [`CLEAN_THRESHOLD`] are reset to `A=1, B=0`, suppressing
    /// faint noise-shaped residue around the true logo silhouette (at the
    /// cost of possibly leaving a thin uncleaned ring).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientLogoFrames`] when no frame was accepted
    /// or any pixel's regression is degenerate.
    pub fn into_logo(self, clean: bool) -> Result<LogoModel> {
        let c = &self.config;
        let Some((imgw, imgh)) = self.frame_dims else {
            return Err(Error::InsufficientLogoFrames { x: 0, y: 0 });
        };
        let n = f64::from(self.frames);
        let w = c.w as usize;
        let wu = (c.w >> c.log_uvx) as usize;

        let solve_plane = |accs: &[PixelAcc], stride: usize| -> Result<(Vec<f32>, Vec<f32>)> {
            let mut a = Vec::with_capacity(accs.len());
            let mut b = Vec::with_capacity(accs.len());
            for (i, acc) in accs.iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let (x, y) = ((i % stride) as u32, (i / stride) as u32);
                let (av, bv) =
                    solve_ab(acc, n).ok_or(Error::InsufficientLogoFrames { x, y })?;
                a.push(av);
                b.push(bv);
            }
            Ok((a, b))
        };

        let (mut a_y, mut b_y) = solve_plane(&self.acc_y, w)?;
        let (mut a_u, mut b_u) = solve_plane(&self.acc_u, wu)?;
        let (mut a_v, mut b_v) = solve_plane(&self.acc_v, wu)?;

        if clean {
            clean_identity_pixels(
                (c.w as usize, c.h as usize, c.log_uvx, c.log_uvy),
                (&mut a_y, &mut b_y),
                (&mut a_u, &mut b_u),
                (&mut a_v, &mut b_v),
            );
        }

        let header = LogoHeader {
            w: c.w,
            h: c.h,
            log_uvx: c.log_uvx,
            log_uvy: c.log_uvy,
            imgw,
            imgh,
            imgx: c.x,
            imgy: c.y,
            service_id: -1,
            name: String::new(),
        };
        let mut data = Vec::with_capacity(header.payload_len());
        for plane in [a_y, b_y, a_u, b_u, a_v, b_v] {
            data.extend(plane);
        }
        LogoModel::from_parts(header, data)
    }
}

#[allow(clippy::too_many_arguments)]
fn accumulate_plane<T: Pixel>(
    accs: &mut [PixelAcc],
    plane: &[T],
    pitch: usize,
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
    bg: f32,
) {
    let bg = f64::from(bg);
    for py in 0..h {
        let row = (y0 + py) * pitch + x0;
        for px in 0..w {
            accs[py * w + px].add(f64::from(plane[row + px].to_f32()), bg);
        }
    }
}

/// Squared-ish distance of `(A, B)` from the identity model.
#[inline]
fn identity_dist(a: f32, b: f32) -> f32 {
    let da = a - 1.0;
    (da * da) / 3.0 + da * b + b * b
}

/// 3x3 max filter with clamped borders.
fn max_filter_3x3(src: &[f32], w: usize, h: usize) -> Vec<f32> {
    let mut out = vec![0.0_f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut m = f32::MIN;
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    m = m.max(src[ny * w + nx]);
                }
            }
            out[y * w + x] = m;
        }
    }
    out
}

type PlanePair<'a> = (&'a mut [f32], &'a mut [f32]);

/// Re-run the identity-reset pass on an existing model.
///
/// Same smoothed-distance criterion as `into_logo(true)`; useful for models
/// that were built without cleaning and saved.
#[must_use]
pub fn clean_logo(model: &LogoModel) -> LogoModel {
    let hd = model.header();
    let mut a_y = model.a_y().to_vec();
    let mut b_y = model.b_y().to_vec();
    let mut a_u = model.a_u().to_vec();
    let mut b_u = model.b_u().to_vec();
    let mut a_v = model.a_v().to_vec();
    let mut b_v = model.b_v().to_vec();
    clean_identity_pixels(
        (hd.w as usize, hd.h as usize, hd.log_uvx, hd.log_uvy),
        (&mut a_y, &mut b_y),
        (&mut a_u, &mut b_u),
        (&mut a_v, &mut b_v),
    );
    let mut data = Vec::with_capacity(hd.payload_len());
    for plane in [a_y, b_y, a_u, b_u, a_v, b_v] {
        data.extend(plane);
    }
    // geometry unchanged, so this cannot fail
    LogoModel::from_parts(hd.clone(), data).expect("clean preserves geometry")
}

/// Reset pixels with no credible logo signal back to the identity model.
fn clean_identity_pixels(
    (w, h, log_uvx, log_uvy): (usize, usize, u32, u32),
    y: PlanePair<'_>,
    u: PlanePair<'_>,
    v: PlanePair<'_>,
) {
    let wu = w >> log_uvx;

    let mut dist = vec![0.0_f32; w * h];
    for py in 0..h {
        for px in 0..w {
            let i = py * w + px;
            let iuv = (py >> log_uvy) * wu + (px >> log_uvx);
            let d = identity_dist(y.0[i], y.1[i])
                + identity_dist(u.0[iuv], u.1[iuv])
                + identity_dist(v.0[iuv], v.1[iuv]);
            dist[i] = d * CLEAN_DIST_SCALE;
        }
    }
    for _ in 0..MAX_FILTER_PASSES {
        dist = max_filter_3x3(&dist, w, h);
    }

    let mut kept = vec![false; w * h];
    for i in 0..w * h {
        if dist[i] < CLEAN_THRESHOLD {
            y.0[i] = 1.0;
            y.1[i] = 0.0;
        } else {
            kept[i] = true;
        }
    }

    // Chroma pixels reset only when every luma pixel they cover was reset.
    let sub_x = 1usize << log_uvx;
    let sub_y = 1usize << log_uvy;
    let hu = h >> log_uvy;
    for cy in 0..hu {
        for cx in 0..wu {
            let any_kept = (0..sub_y).any(|dy| {
                (0..sub_x).any(|dx| kept[(cy * sub_y + dy) * w + cx * sub_x + dx])
            });
            if !any_kept {
                let i = cy * wu + cx;
                u.0[i] = 1.0;
                u.1[i] = 0.0;
                v.0[i] = 1.0;
                v.1[i] = 0.0;
            }
        }
    }
}
