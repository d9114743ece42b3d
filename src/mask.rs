//! Feature mask construction and per-frame correlation scoring.
//!
//! [`MaskedModel::prepare`] runs once per logo model: it composites the model
//! onto 32 synthetic solid-luma backgrounds, ranks interior pixels by 5x5
//! local variance, keeps the top fraction as feature pixels, and calibrates a
//! per-(feature x luma-bucket) scale pair so that an exact logo match scores
//! 1.0 regardless of the background it sits on. Scoring a frame then costs
//! one fade blend plus one 5x5 correlation per feature.

use log::{debug, info};

use crate::error::{Error, Result};
use crate::frame::{Pixel, PlanarFrame};
use crate::kernel::{Kernel, KernelKind};
use crate::model::LogoModel;

/// Number of synthetic solid-luma backgrounds (and scale buckets).
const NUM_BACKGROUNDS: usize = 32;
/// Reference luma range the calibration works in (8-bit domain).
const REF_MAX: f32 = 255.0;
/// Buckets whose correlation response falls below this fraction of the
/// average response get their contribution capped down instead of amplified;
/// amplifying a genuinely weak-contrast bucket would amplify noise with it.
/// Empirically tuned; kept as-is.
const CORR_LOWER_LIMIT: f32 = 0.2;
/// Interior margin: the 5x5 window must fit.
const BORDER: usize = 2;
/// Responses below this are treated as no signal at all.
const TINY_RESPONSE: f32 = 1e-6;

/// Correlation scores of one candidate model against one frame.
///
/// `corr0` is the score with no removal applied, `corr1` with full removal.
/// A real, well-modeled logo shows `corr0` near 1 and `corr1` near 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalResult {
    /// Correlation score at fade = 0.
    pub corr0: f32,
    /// Correlation score at fade = 1.
    pub corr1: f32,
}

/// One selected feature pixel with its calibration.
#[derive(Debug, Clone)]
struct Feature {
    x: usize,
    y: usize,
    /// Zero-mean 5x5 reference pattern around this pixel.
    kernel: [f32; 25],
    /// Per-luma-bucket `(normalizing, capping)` scale pair.
    scales: [(f32, f32); NUM_BACKGROUNDS],
}

/// A [`LogoModel`] extended with everything needed to score and remove.
///
/// All derived state is computed once by [`MaskedModel::prepare`] and never
/// mutated afterward.
#[derive(Debug)]
pub struct MaskedModel {
    model: LogoModel,
    kernel: Kernel,
    mask: Vec<bool>,
    features: Vec<Feature>,
    // inverted coefficients: applying the fade blend with these removes
    inv_a_y: Vec<f32>,
    inv_b_y: Vec<f32>,
    inv_a_u: Vec<f32>,
    inv_b_u: Vec<f32>,
    inv_a_v: Vec<f32>,
    inv_b_v: Vec<f32>,
    black_score: f32,
}

/// Luma level of synthetic background `i`, spanning 0..=255.
#[allow(clippy::cast_precision_loss)]
fn bg_level(i: usize) -> f32 {
    i as f32 * REF_MAX / (NUM_BACKGROUNDS - 1) as f32
}

/// Invert `(A, B)` so the fade blend removes instead of applies.
fn invert(a: &[f32], b: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut ia = Vec::with_capacity(a.len());
    let mut ib = Vec::with_capacity(b.len());
    for (&av, &bv) in a.iter().zip(b) {
        if av.is_finite() && av != 0.0 && bv.is_finite() {
            ia.push(1.0 / av);
            ib.push(-bv / av);
        } else {
            debug!("degenerate coefficient pair ({av}, {bv}) treated as identity");
            ia.push(1.0);
            ib.push(0.0);
        }
    }
    (ia, ib)
}

impl MaskedModel {
    /// Build the feature mask and calibration for `model`.
    ///
    /// `mask_ratio` is the fraction of interior pixels kept as features
    /// (typical values 0.1 to 0.35). The optional `progress` callback is
    /// invoked between build steps; returning `false` aborts cleanly and
    /// yields `Ok(None)` — cancellation is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyMask`] when the ratio selects no pixels or the
    /// logo has no usable contrast, [`Error::Geometry`] when the model is
    /// too small to hold any 5x5 interior window.
    pub fn prepare(
        model: LogoModel,
        mask_ratio: f32,
        progress: Option<&dyn Fn(usize, usize) -> bool>,
    ) -> Result<Option<Self>> {
        let kernel = Kernel::detect();
        Self::prepare_with_kernel(model, mask_ratio, kernel, progress)
    }

    /// [`MaskedModel::prepare`] with an explicit kernel strategy.
    ///
    /// # Errors
    ///
    /// Same as [`MaskedModel::prepare`].
    pub fn prepare_with_kernel(
        model: LogoModel,
        mask_ratio: f32,
        kernel: Kernel,
        progress: Option<&dyn Fn(usize, usize) -> bool>,
    ) -> Result<Option<Self>> {
        let w = model.header().w as usize;
        let h = model.header().h as usize;
        if w <= 2 * BORDER || h <= 2 * BORDER {
            return Err(Error::Geometry(format!(
                "scan region {w}x{h} has no interior for 5x5 windows"
            )));
        }
        info!(
            "building feature mask for {w}x{h} logo, kernel {:?}",
            kernel.kind()
        );

        let check = |step: usize| -> bool {
            progress.is_none_or(|p| p(step, NUM_BACKGROUNDS + 1))
        };

        // Composite the model onto each synthetic background.
        let mut synth = Vec::with_capacity(NUM_BACKGROUNDS);
        for i in 0..NUM_BACKGROUNDS {
            if !check(i) {
                return Ok(None);
            }
            let bg = bg_level(i);
            let mut img = vec![0.0_f32; w * h];
            for (px, (&a, &b)) in img.iter_mut().zip(model.a_y().iter().zip(model.b_y())) {
                *px = a.mul_add(bg, b * REF_MAX).clamp(0.0, REF_MAX);
            }
            synth.push(img);
        }
        let mid = &synth[NUM_BACKGROUNDS / 2];

        // Rank interior pixels by 5x5 local variance on the middle-luma
        // image; flat logo interior and flat background carry no signal.
        let mut ranked: Vec<(f32, usize)> = Vec::with_capacity((w - 2 * BORDER) * (h - 2 * BORDER));
        for y in BORDER..h - BORDER {
            for x in BORDER..w - BORDER {
                ranked.push((window_variance(mid, w, x, y), y * w + x));
            }
        }
        ranked.sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let keep = (ranked.len() as f32 * mask_ratio.clamp(0.0, 1.0)) as usize;
        if keep == 0 {
            return Err(Error::EmptyMask { mask_ratio });
        }

        let mut mask = vec![false; w * h];
        for &(_, idx) in &ranked[..keep] {
            mask[idx] = true;
        }

        if !check(NUM_BACKGROUNDS) {
            return Ok(None);
        }

        // Calibrate each feature across all backgrounds.
        let mut features = Vec::with_capacity(keep);
        for y in BORDER..h - BORDER {
            for x in BORDER..w - BORDER {
                if !mask[y * w + x] {
                    continue;
                }
                let zk = zero_mean_window(mid, w, x, y);
                let mut responses = [0.0_f32; NUM_BACKGROUNDS];
                for (i, img) in synth.iter().enumerate() {
                    let (corr, _) = kernel.correlate_5x5(&zk, img, x, y, w);
                    responses[i] = corr.abs();
                }
                #[allow(clippy::cast_precision_loss)]
                let avg = responses.iter().sum::<f32>() / NUM_BACKGROUNDS as f32;
                let mut scales = [(0.0_f32, 0.0_f32); NUM_BACKGROUNDS];
                if avg > TINY_RESPONSE {
                    for (s, &resp) in scales.iter_mut().zip(&responses) {
                        if resp > TINY_RESPONSE {
                            *s = (1.0 / resp, (resp / (avg * CORR_LOWER_LIMIT)).min(1.0));
                        }
                    }
                }
                features.push(Feature {
                    x,
                    y,
                    kernel: zk,
                    scales,
                });
            }
        }

        let (inv_a_y, inv_b_y) = invert(model.a_y(), model.b_y());
        let (inv_a_u, inv_b_u) = invert(model.a_u(), model.b_u());
        let (inv_a_v, inv_b_v) = invert(model.a_v(), model.b_v());

        let mut built = Self {
            model,
            kernel,
            mask,
            features,
            inv_a_y,
            inv_b_y,
            inv_a_u,
            inv_b_u,
            inv_a_v,
            inv_b_v,
            black_score: 1.0,
        };

        // Reference magnitude: the logo composited on black, no removal.
        let black = built.correlation_score(&synth[0], w);
        if black.abs() < TINY_RESPONSE {
            return Err(Error::EmptyMask { mask_ratio });
        }
        built.black_score = black;
        info!(
            "feature mask ready: {} features, black reference {:.3}",
            built.features.len(),
            built.black_score
        );
        Ok(Some(built))
    }

    /// The underlying logo model.
    #[must_use]
    pub fn model(&self) -> &LogoModel {
        &self.model
    }

    /// Number of selected feature pixels.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// The boolean Y-plane feature mask, row-major `w * h`.
    #[must_use]
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Which numeric implementation scoring dispatches to.
    #[must_use]
    pub fn kernel_kind(&self) -> KernelKind {
        self.kernel.kind()
    }

    /// Sum of calibrated feature correlations over a work buffer in the
    /// 0..=255 reference domain (stride = scan-region width).
    ///
    /// A sum, not an average: the magnitude scales with mask size, which is
    /// consistent because the same mask serves every evaluation of this
    /// model.
    fn correlation_score(&self, work: &[f32], stride: usize) -> f32 {
        let mut sum = 0.0_f32;
        for f in &self.features {
            let (corr, avg) = self.kernel.correlate_5x5(&f.kernel, work, f.x, f.y, stride);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bucket = ((avg * (NUM_BACKGROUNDS - 1) as f32 / REF_MAX).round())
                .clamp(0.0, (NUM_BACKGROUNDS - 1) as f32) as usize;
            let (scale, cap) = f.scales[bucket];
            sum += (corr * scale).clamp(-1.0, 1.0) * cap;
        }
        sum
    }

    /// Fill `work` with the scan region of `frame`'s luma, removed at
    /// `fade`, rescaled into the 0..=255 reference domain.
    fn fill_work<T: Pixel>(
        &self,
        frame: &PlanarFrame<'_, T>,
        fade: f32,
        work: &mut Vec<f32>,
        row: &mut Vec<f32>,
    ) {
        let hd = self.model.header();
        let (w, h) = (hd.w as usize, hd.h as usize);
        let (x0, y0) = (hd.imgx as usize, hd.imgy as usize);
        let rescale = REF_MAX / frame.max_value;

        work.resize(w * h, 0.0);
        row.resize(w, 0.0);
        for y in 0..h {
            let src = &frame.y[(y0 + y) * frame.pitch_y + x0..][..w];
            for (r, s) in row.iter_mut().zip(src) {
                *r = s.to_f32() * rescale;
            }
            self.kernel.remove_logo_line(
                &mut work[y * w..(y + 1) * w],
                row,
                &self.inv_a_y[y * w..(y + 1) * w],
                &self.inv_b_y[y * w..(y + 1) * w],
                REF_MAX,
                fade,
            );
        }
    }

    /// Score `frame` against this model at one fade level.
    ///
    /// Magnitude near 1 means "the logo as modeled is present at this
    /// residual strength"; near 0 means the fade level fully explains the
    /// pixels. Normalized by the black-background reference score.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] when the frame does not contain the
    /// model's scan region.
    pub fn evaluate<T: Pixel>(&self, frame: &PlanarFrame<'_, T>, fade: f32) -> Result<f32> {
        self.check_frame(frame)?;
        let mut work = Vec::new();
        let mut row = Vec::new();
        self.fill_work(frame, fade, &mut work, &mut row);
        Ok(self.correlation_score(&work, self.model.header().w as usize) / self.black_score)
    }

    /// Score `frame` at fade = 0 and fade = 1 in one call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] when the frame does not contain the
    /// model's scan region.
    pub fn evaluate_both<T: Pixel>(&self, frame: &PlanarFrame<'_, T>) -> Result<EvalResult> {
        self.check_frame(frame)?;
        let stride = self.model.header().w as usize;
        let mut work = Vec::new();
        let mut row = Vec::new();
        self.fill_work(frame, 0.0, &mut work, &mut row);
        let corr0 = self.correlation_score(&work, stride) / self.black_score;
        self.fill_work(frame, 1.0, &mut work, &mut row);
        let corr1 = self.correlation_score(&work, stride) / self.black_score;
        Ok(EvalResult { corr0, corr1 })
    }

    /// Erase the logo from a frame in place at the given fade strength.
    ///
    /// Applies the inverted blend to all three planes of the scan region.
    /// Values are clamped to `[0, max_value]` before narrowing back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] when the frame does not contain the
    /// model's scan region.
    pub fn remove_logo<T: Pixel>(
        &self,
        frame: &mut crate::frame::FrameBuf<T>,
        fade: f32,
    ) -> Result<()> {
        self.check_frame(&frame.view())?;
        let hd = self.model.header().clone();
        let max_value = frame.view().max_value;
        let (pitch_y, pitch_uv) = (frame.view().pitch_y, frame.view().pitch_uv);

        let plane_args = [
            (
                hd.imgx as usize,
                hd.imgy as usize,
                hd.w as usize,
                hd.h as usize,
                pitch_y,
            ),
            (
                (hd.imgx >> hd.log_uvx) as usize,
                (hd.imgy >> hd.log_uvy) as usize,
                hd.w_uv() as usize,
                hd.h_uv() as usize,
                pitch_uv,
            ),
        ];

        remove_plane(
            &self.kernel,
            frame.y_mut(),
            plane_args[0],
            &self.inv_a_y,
            &self.inv_b_y,
            max_value,
            fade,
        );
        remove_plane(
            &self.kernel,
            frame.u_mut(),
            plane_args[1],
            &self.inv_a_u,
            &self.inv_b_u,
            max_value,
            fade,
        );
        remove_plane(
            &self.kernel,
            frame.v_mut(),
            plane_args[1],
            &self.inv_a_v,
            &self.inv_b_v,
            max_value,
            fade,
        );
        Ok(())
    }

    fn check_frame<T: Pixel>(&self, frame: &PlanarFrame<'_, T>) -> Result<()> {
        frame.validate()?;
        let hd = self.model.header();
        if hd.imgx + hd.w > frame.width || hd.imgy + hd.h > frame.height {
            return Err(Error::Geometry(format!(
                "frame {}x{} does not contain scan region {}x{}+{}+{}",
                frame.width, frame.height, hd.w, hd.h, hd.imgx, hd.imgy
            )));
        }
        if frame.log_uvx != hd.log_uvx || frame.log_uvy != hd.log_uvy {
            return Err(Error::Geometry(format!(
                "frame subsampling {}x{} does not match model {}x{}",
                frame.log_uvx, frame.log_uvy, hd.log_uvx, hd.log_uvy
            )));
        }
        Ok(())
    }
}

/// Apply the inverted fade blend to one plane region, in place.
fn remove_plane<T: Pixel>(
    kernel: &Kernel,
    plane: &mut [T],
    (x0, y0, w, h, pitch): (usize, usize, usize, usize, usize),
    inv_a: &[f32],
    inv_b: &[f32],
    max_value: f32,
    fade: f32,
) {
    let mut src = vec![0.0_f32; w];
    let mut dst = vec![0.0_f32; w];
    for y in 0..h {
        let row = &mut plane[(y0 + y) * pitch + x0..][..w];
        for (s, p) in src.iter_mut().zip(row.iter()) {
            *s = p.to_f32();
        }
        kernel.remove_logo_line(
            &mut dst,
            &src,
            &inv_a[y * w..(y + 1) * w],
            &inv_b[y * w..(y + 1) * w],
            max_value,
            fade,
        );
        for (p, d) in row.iter_mut().zip(&dst) {
            *p = T::from_f32(d.clamp(0.0, max_value));
        }
    }
}

/// 5x5 window variance (sum of squared zero-mean samples).
fn window_variance(img: &[f32], stride: usize, x: usize, y: usize) -> f32 {
    let mut sum = 0.0_f32;
    for dy in 0..5 {
        for dx in 0..5 {
            sum += img[(y + dy - 2) * stride + x + dx - 2];
        }
    }
    let avg = sum / 25.0;
    let mut var = 0.0_f32;
    for dy in 0..5 {
        for dx in 0..5 {
            let d = img[(y + dy - 2) * stride + x + dx - 2] - avg;
            var += d * d;
        }
    }
    var
}

/// The zero-mean 5x5 window around `(x, y)` as a correlation kernel.
fn zero_mean_window(img: &[f32], stride: usize, x: usize, y: usize) -> [f32; 25] {
    let mut sum = 0.0_f32;
    for dy in 0..5 {
        for dx in 0..5 {
            sum += img[(y + dy - 2) * stride + x + dx - 2];
        }
    }
    let avg = sum / 25.0;
    let mut out = [0.0_f32; 25];
    for dy in 0..5 {
        for dx in 0..5 {
            out[dy * 5 + dx] = img[(y + dy - 2) * stride + x + dx - 2] - avg;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuf;
    use crate::model::LogoHeader;

    const W: u32 = 32;
    const H: u32 = 24;

    fn test_header() -> LogoHeader {
        LogoHeader {
            w: W,
            h: H,
            log_uvx: 1,
            log_uvy: 1,
            imgw: 128,
            imgh: 96,
            imgx: 64,
            imgy: 32,
            service_id: -1,
            name: "test".to_string(),
        }
    }

    /// A model with a structured diagonal-stripe logo in its center.
    fn test_model() -> LogoModel {
        let mut model = LogoModel::identity(test_header()).unwrap();
        let w = W as usize;
        let mut data = model.raw().to_vec();
        for y in 6..18 {
            for x in 8..24 {
                let i = y * w + x;
                if (x + y) % 3 == 0 {
                    data[i] = 0.55; // aY
                    data[w * H as usize + i] = 0.35; // bY
                } else {
                    data[i] = 0.85;
                    data[w * H as usize + i] = 0.10;
                }
            }
        }
        model = LogoModel::from_parts(model.header().clone(), data).unwrap();
        model
    }

    /// Frame with the model's logo composited at `fade` over a uniform
    /// background.
    fn frame_with_logo(model: &LogoModel, bg: f32, fade: f32) -> FrameBuf<u8> {
        let hd = model.header();
        let mut buf = FrameBuf::<u8>::new(hd.imgw, hd.imgh, hd.log_uvx, hd.log_uvy, 255.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            buf.y_mut().iter_mut().for_each(|p| *p = bg.round() as u8);
            buf.u_mut().iter_mut().for_each(|p| *p = 128);
            buf.v_mut().iter_mut().for_each(|p| *p = 128);
        }
        let (w, h) = (hd.w as usize, hd.h as usize);
        let (x0, y0) = (hd.imgx as usize, hd.imgy as usize);
        for y in 0..h {
            for x in 0..w {
                let a = model.a_y()[y * w + x];
                let b = model.b_y()[y * w + x];
                let logo = a.mul_add(bg, b * 255.0);
                let v = fade.mul_add(logo - bg, bg).clamp(0.0, 255.0);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    buf.y_mut()[(y0 + y) * hd.imgw as usize + x0 + x] = v.round() as u8;
                }
            }
        }
        buf
    }

    fn prepare(ratio: f32) -> MaskedModel {
        MaskedModel::prepare_with_kernel(test_model(), ratio, Kernel::scalar(), None)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn mask_grows_with_ratio() {
        let small = prepare(0.05);
        let large = prepare(0.3);
        assert!(small.feature_count() > 0);
        assert!(
            large.feature_count() >= small.feature_count(),
            "raising mask_ratio must never shrink the mask"
        );
    }

    #[test]
    fn zero_ratio_is_an_error() {
        let err =
            MaskedModel::prepare_with_kernel(test_model(), 0.0, Kernel::scalar(), None)
                .unwrap_err();
        assert!(matches!(err, Error::EmptyMask { .. }));
    }

    #[test]
    fn cancellation_returns_none() {
        let cancel = |_: usize, _: usize| false;
        let out =
            MaskedModel::prepare_with_kernel(test_model(), 0.2, Kernel::scalar(), Some(&cancel))
                .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn logo_frame_scores_high_at_fade_zero() {
        let masked = prepare(0.2);
        let frame = frame_with_logo(masked.model(), 120.0, 1.0);
        let r = masked.evaluate_both(&frame.view()).unwrap();
        assert!(r.corr0 > 0.7, "corr0 = {}", r.corr0);
        assert!(r.corr1.abs() < 0.25, "corr1 = {}", r.corr1);
    }

    #[test]
    fn plain_frame_scores_low() {
        let masked = prepare(0.2);
        let frame = frame_with_logo(masked.model(), 120.0, 0.0); // no logo
        let r = masked.evaluate_both(&frame.view()).unwrap();
        assert!(r.corr0.abs() < 0.3, "corr0 = {}", r.corr0);
    }

    #[test]
    fn scoring_holds_across_backgrounds() {
        let masked = prepare(0.2);
        for bg in [40.0, 100.0, 180.0] {
            let frame = frame_with_logo(masked.model(), bg, 1.0);
            let r = masked.evaluate_both(&frame.view()).unwrap();
            assert!(r.corr0 > 0.6, "bg {bg}: corr0 = {}", r.corr0);
            assert!(r.corr1.abs() < 0.3, "bg {bg}: corr1 = {}", r.corr1);
        }
    }

    #[test]
    fn remove_logo_restores_background() {
        let masked = prepare(0.2);
        let mut frame = frame_with_logo(masked.model(), 120.0, 1.0);
        masked.remove_logo(&mut frame, 1.0).unwrap();
        let hd = masked.model().header();
        let (x0, y0) = (hd.imgx as usize, hd.imgy as usize);
        for y in 0..hd.h as usize {
            for x in 0..hd.w as usize {
                let v = frame.view().y[(y0 + y) * hd.imgw as usize + x0 + x];
                let diff = (i32::from(v) - 120).abs();
                assert!(diff <= 2, "pixel ({x},{y}) off by {diff}");
            }
        }
    }

    #[test]
    fn evaluate_rejects_mismatched_frame() {
        let masked = prepare(0.2);
        let frame = FrameBuf::<u8>::new(32, 32, 1, 1, 255.0);
        assert!(matches!(
            masked.evaluate(&frame.view(), 0.0),
            Err(Error::Geometry(_))
        ));
    }
}
