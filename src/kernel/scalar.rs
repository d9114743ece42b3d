//! Scalar reference implementations of the correlation primitives.
//!
//! These are the semantics the SIMD forms in [`super::x86`] must reproduce;
//! the differential tests in [`super`] hold them to it.

/// 5x5 zero-mean correlation around `(x, y)`.
///
/// Computes the mean of the 5x5 window centered on `(x, y)`, subtracts it
/// from each of the 25 samples, and dot-products against `kernel`.
/// Returns `(correlation, window_mean)`.
///
/// Caller guarantees `2 <= x < stride - 2` and that rows `y - 2 ..= y + 2`
/// lie inside `plane`.
pub fn correlate_5x5(kernel: &[f32; 25], plane: &[f32], x: usize, y: usize, stride: usize) -> (f32, f32) {
    let mut sum = 0.0_f32;
    for dy in 0..5 {
        let row = (y + dy - 2) * stride + (x - 2);
        for dx in 0..5 {
            sum += plane[row + dx];
        }
    }
    let avg = sum / 25.0;

    let mut corr = 0.0_f32;
    for dy in 0..5 {
        let row = (y + dy - 2) * stride + (x - 2);
        for dx in 0..5 {
            corr += (plane[row + dx] - avg) * kernel[dy * 5 + dx];
        }
    }
    (corr, avg)
}

/// Per-pixel fade blend of one row: `dst = fade*(A*src + B*maxv) + (1-fade)*src`.
///
/// With forward coefficients this composites the logo onto a background;
/// with inverted coefficients (`1/A`, `-B/A`) it removes it. All slices must
/// have equal length.
pub fn remove_logo_line(
    dst: &mut [f32],
    src: &[f32],
    a: &[f32],
    b: &[f32],
    max_value: f32,
    fade: f32,
) {
    debug_assert_eq!(dst.len(), src.len());
    debug_assert_eq!(dst.len(), a.len());
    debug_assert_eq!(dst.len(), b.len());
    let keep = 1.0 - fade;
    for i in 0..dst.len() {
        dst[i] = fade * (a[i] * src[i] + b[i] * max_value) + keep * src[i];
    }
}
