//! Numeric primitives: 5x5 zero-mean correlation and the fade-blend
//! ("remove logo") line operator.
//!
//! Each primitive exists as a scalar reference implementation and as AVX and
//! AVX2+FMA accelerated forms. [`Kernel::detect`] probes CPU capabilities
//! once and yields a strategy value dispatching to the best available form;
//! all forms are numerically equivalent within floating rounding.

mod scalar;
#[cfg(target_arch = "x86_64")]
mod x86;

/// Which numeric implementation a [`Kernel`] dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    /// Portable scalar reference implementation.
    Scalar,
    /// 8-lane AVX (mul + add).
    Avx,
    /// 8-lane AVX2 with fused multiply-add.
    Avx2Fma,
}

/// Capability-selected correlation strategy.
///
/// Construct once (typically at [`crate::MaskedModel`] preparation) and
/// reuse; detection is a plain value, not a global cache.
#[derive(Debug, Clone, Copy)]
pub struct Kernel {
    kind: KernelKind,
}

impl Kernel {
    /// Probe CPU features and select the fastest available implementation.
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("avx2")
                && std::arch::is_x86_feature_detected!("fma")
            {
                return Self {
                    kind: KernelKind::Avx2Fma,
                };
            }
            if std::arch::is_x86_feature_detected!("avx") {
                return Self {
                    kind: KernelKind::Avx,
                };
            }
        }
        Self {
            kind: KernelKind::Scalar,
        }
    }

    /// Force the scalar reference implementation.
    #[must_use]
    pub fn scalar() -> Self {
        Self {
            kind: KernelKind::Scalar,
        }
    }

    /// The implementation this kernel dispatches to.
    #[must_use]
    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    /// 5x5 zero-mean correlation around `(x, y)`; returns
    /// `(correlation, window_mean)`.
    ///
    /// Caller guarantees `2 <= x < stride - 2` and that rows
    /// `y - 2 ..= y + 2` lie inside `plane`.
    #[must_use]
    pub fn correlate_5x5(
        &self,
        kernel: &[f32; 25],
        plane: &[f32],
        x: usize,
        y: usize,
        stride: usize,
    ) -> (f32, f32) {
        debug_assert!(x >= 2 && x + 2 < stride);
        debug_assert!(y >= 2 && (y + 2) * stride + x + 3 <= plane.len());
        match self.kind {
            KernelKind::Scalar => scalar::correlate_5x5(kernel, plane, x, y, stride),
            #[cfg(target_arch = "x86_64")]
            // Safety: the matching feature was detected at construction.
            KernelKind::Avx => unsafe { x86::correlate_5x5_avx(kernel, plane, x, y, stride) },
            #[cfg(target_arch = "x86_64")]
            KernelKind::Avx2Fma => unsafe { x86::correlate_5x5_avx2(kernel, plane, x, y, stride) },
            #[cfg(not(target_arch = "x86_64"))]
            _ => scalar::correlate_5x5(kernel, plane, x, y, stride),
        }
    }

    /// Fade blend of one row: `dst = fade*(A*src + B*maxv) + (1-fade)*src`.
    ///
    /// With forward coefficients this composites the logo onto `src`; with
    /// inverted coefficients it removes it.
    pub fn remove_logo_line(
        &self,
        dst: &mut [f32],
        src: &[f32],
        a: &[f32],
        b: &[f32],
        max_value: f32,
        fade: f32,
    ) {
        match self.kind {
            KernelKind::Scalar => scalar::remove_logo_line(dst, src, a, b, max_value, fade),
            #[cfg(target_arch = "x86_64")]
            // Safety: the matching feature was detected at construction.
            KernelKind::Avx => unsafe {
                x86::remove_logo_line_avx(dst, src, a, b, max_value, fade);
            },
            #[cfg(target_arch = "x86_64")]
            KernelKind::Avx2Fma => unsafe {
                x86::remove_logo_line_avx2(dst, src, a, b, max_value, fade);
            },
            #[cfg(not(target_arch = "x86_64"))]
            _ => scalar::remove_logo_line(dst, src, a, b, max_value, fade),
        }
    }
}
