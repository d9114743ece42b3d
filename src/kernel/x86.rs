//! x86_64 SIMD implementations of the correlation primitives.
//!
//! Two tiers: AVX (mul + add) and AVX2 + FMA (`fmadd`, same lane layout).
//! Each 5-sample row is loaded with a masked 8-lane load; the three dead
//! lanes carry zero kernel weights, so the full 8-lane horizontal reduction
//! still yields the 5-element result.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::arch::x86_64::*;

/// Horizontal sum of all eight lanes.
///
/// # Safety
/// Caller must ensure AVX is available.
#[target_feature(enable = "avx")]
#[inline]
unsafe fn hsum256(v: __m256) -> f32 {
    let hi = _mm256_extractf128_ps(v, 1);
    let lo = _mm256_castps256_ps128(v);
    let s = _mm_add_ps(lo, hi);
    let s = _mm_add_ps(s, _mm_movehl_ps(s, s));
    let s = _mm_add_ss(s, _mm_shuffle_ps(s, s, 1));
    _mm_cvtss_f32(s)
}

/// Load mask selecting the first five of eight lanes.
///
/// # Safety
/// Caller must ensure AVX is available.
#[target_feature(enable = "avx")]
#[inline]
unsafe fn row_mask() -> __m256i {
    _mm256_setr_epi32(-1, -1, -1, -1, -1, 0, 0, 0)
}

/// AVX form of [`super::scalar::correlate_5x5`].
///
/// # Safety
/// Caller must ensure AVX is available and that the window around `(x, y)`
/// lies inside `plane` (same contract as the scalar form).
#[target_feature(enable = "avx")]
pub unsafe fn correlate_5x5_avx(
    kernel: &[f32; 25],
    plane: &[f32],
    x: usize,
    y: usize,
    stride: usize,
) -> (f32, f32) {
    let mask = row_mask();
    let base = plane.as_ptr().add((y - 2) * stride + (x - 2));

    let mut rows = [_mm256_setzero_ps(); 5];
    let mut sum = _mm256_setzero_ps();
    for (r, row) in rows.iter_mut().enumerate() {
        // Masked load touches only the first five lanes, so reading at the
        // right edge of the plane is in bounds.
        let v = _mm256_maskload_ps(base.add(r * stride), mask);
        *row = v;
        sum = _mm256_add_ps(sum, v);
    }
    let avg = hsum256(sum) / 25.0;
    let avgv = _mm256_set1_ps(avg);

    let mut acc = _mm256_setzero_ps();
    for (r, row) in rows.iter().enumerate() {
        let k = _mm256_maskload_ps(kernel.as_ptr().add(r * 5), mask);
        let d = _mm256_sub_ps(*row, avgv);
        acc = _mm256_add_ps(acc, _mm256_mul_ps(d, k));
    }
    (hsum256(acc), avg)
}

/// AVX2 + FMA form of [`super::scalar::correlate_5x5`].
///
/// # Safety
/// Caller must ensure AVX2 and FMA are available and that the window around
/// `(x, y)` lies inside `plane`.
#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn correlate_5x5_avx2(
    kernel: &[f32; 25],
    plane: &[f32],
    x: usize,
    y: usize,
    stride: usize,
) -> (f32, f32) {
    let mask = row_mask();
    let base = plane.as_ptr().add((y - 2) * stride + (x - 2));

    let mut rows = [_mm256_setzero_ps(); 5];
    let mut sum = _mm256_setzero_ps();
    for (r, row) in rows.iter_mut().enumerate() {
        let v = _mm256_maskload_ps(base.add(r * stride), mask);
        *row = v;
        sum = _mm256_add_ps(sum, v);
    }
    let avg = hsum256(sum) / 25.0;
    let avgv = _mm256_set1_ps(avg);

    let mut acc = _mm256_setzero_ps();
    for (r, row) in rows.iter().enumerate() {
        let k = _mm256_maskload_ps(kernel.as_ptr().add(r * 5), mask);
        let d = _mm256_sub_ps(*row, avgv);
        acc = _mm256_fmadd_ps(d, k, acc);
    }
    (hsum256(acc), avg)
}

/// AVX form of [`super::scalar::remove_logo_line`].
///
/// # Safety
/// Caller must ensure AVX is available. Slices must have equal length.
#[target_feature(enable = "avx")]
pub unsafe fn remove_logo_line_avx(
    dst: &mut [f32],
    src: &[f32],
    a: &[f32],
    b: &[f32],
    max_value: f32,
    fade: f32,
) {
    let n = dst.len();
    let fadev = _mm256_set1_ps(fade);
    let keep = _mm256_set1_ps(1.0 - fade);
    let fmaxv = _mm256_set1_ps(fade * max_value);

    let mut i = 0;
    while i + 8 <= n {
        let s = _mm256_loadu_ps(src.as_ptr().add(i));
        let av = _mm256_loadu_ps(a.as_ptr().add(i));
        let bv = _mm256_loadu_ps(b.as_ptr().add(i));
        // dst = src*(fade*A + (1-fade)) + fade*B*maxv
        let coef = _mm256_add_ps(_mm256_mul_ps(fadev, av), keep);
        let r = _mm256_add_ps(_mm256_mul_ps(s, coef), _mm256_mul_ps(bv, fmaxv));
        _mm256_storeu_ps(dst.as_mut_ptr().add(i), r);
        i += 8;
    }
    while i < n {
        dst[i] = fade * (a[i] * src[i] + b[i] * max_value) + (1.0 - fade) * src[i];
        i += 1;
    }
}

/// AVX2 + FMA form of [`super::scalar::remove_logo_line`].
///
/// # Safety
/// Caller must ensure AVX2 and FMA are available. Slices must have equal
/// length.
#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn remove_logo_line_avx2(
    dst: &mut [f32],
    src: &[f32],
    a: &[f32],
    b: &[f32],
    max_value: f32,
    fade: f32,
) {
    let n = dst.len();
    let fadev = _mm256_set1_ps(fade);
    let keep = _mm256_set1_ps(1.0 - fade);
    let fmaxv = _mm256_set1_ps(fade * max_value);

    let mut i = 0;
    while i + 8 <= n {
        let s = _mm256_loadu_ps(src.as_ptr().add(i));
        let av = _mm256_loadu_ps(a.as_ptr().add(i));
        let bv = _mm256_loadu_ps(b.as_ptr().add(i));
        let coef = _mm256_fmadd_ps(fadev, av, keep);
        let r = _mm256_fmadd_ps(s, coef, _mm256_mul_ps(bv, fmaxv));
        _mm256_storeu_ps(dst.as_mut_ptr().add(i), r);
        i += 8;
    }
    while i < n {
        dst[i] = fade * (a[i] * src[i] + b[i] * max_value) + (1.0 - fade) * src[i];
        i += 1;
    }
}
