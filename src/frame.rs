//! Frame source contract: planar Y/U/V pixel views.
//!
//! Decoding is out of scope; callers hand this crate raw planar buffers with
//! independent pitches per plane and a known bit depth. [`PlanarFrame`] is a
//! borrowed view, [`FrameBuf`] an owned buffer that yields such views, so
//! plane slices can never outlive their backing storage.

use crate::error::{Error, Result};

/// A raw pixel sample type (8- or 16-bit planar video).
pub trait Pixel: Copy + Send + Sync + 'static {
    /// Widen the sample to `f32` code-value units.
    fn to_f32(self) -> f32;

    /// Narrow a code value back to the sample type, rounding and clamping
    /// to the type's range.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f32(v: f32) -> Self {
        v.round().clamp(0.0, 255.0) as u8
    }
}

impl Pixel for u16 {
    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f32(v: f32) -> Self {
        v.round().clamp(0.0, 65535.0) as u16
    }
}

/// A borrowed view of one planar Y/U/V frame.
///
/// `u` and `v` are subsampled by `(log_uvx, log_uvy)` relative to `y`
/// (0 = full resolution, 1 = halved). Pitches are in samples, not bytes.
#[derive(Debug, Clone, Copy)]
pub struct PlanarFrame<'a, T: Pixel> {
    /// Luma plane samples, `pitch_y * height` long at minimum.
    pub y: &'a [T],
    /// First chroma plane.
    pub u: &'a [T],
    /// Second chroma plane.
    pub v: &'a [T],
    /// Luma row pitch in samples.
    pub pitch_y: usize,
    /// Chroma row pitch in samples.
    pub pitch_uv: usize,
    /// Frame width in luma samples.
    pub width: u32,
    /// Frame height in luma samples.
    pub height: u32,
    /// Horizontal chroma subsampling shift (0 or 1).
    pub log_uvx: u32,
    /// Vertical chroma subsampling shift (0 or 1).
    pub log_uvy: u32,
    /// Largest representable code value (255 for 8-bit, 1023 for 10-bit
    /// stored in u16, and so on).
    pub max_value: f32,
}

impl<'a, T: Pixel> PlanarFrame<'a, T> {
    /// Chroma plane width in samples.
    #[must_use]
    pub fn width_uv(&self) -> u32 {
        self.width >> self.log_uvx
    }

    /// Chroma plane height in samples.
    #[must_use]
    pub fn height_uv(&self) -> u32 {
        self.height >> self.log_uvy
    }

    /// Validate that every plane slice covers its declared geometry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] if any plane is shorter than
    /// `pitch * rows`.
    pub fn validate(&self) -> Result<()> {
        let need_y = self.pitch_y * self.height as usize;
        let need_uv = self.pitch_uv * self.height_uv() as usize;
        if self.y.len() < need_y {
            return Err(Error::Geometry(format!(
                "Y plane holds {} samples, geometry requires {need_y}",
                self.y.len()
            )));
        }
        if self.u.len() < need_uv || self.v.len() < need_uv {
            return Err(Error::Geometry(format!(
                "chroma planes hold {}/{} samples, geometry requires {need_uv}",
                self.u.len(),
                self.v.len()
            )));
        }
        Ok(())
    }
}

/// An owned planar frame buffer.
///
/// Convenience storage for callers (and tests) that synthesize frames rather
/// than borrow them from a decoder.
#[derive(Debug, Clone)]
pub struct FrameBuf<T: Pixel> {
    y: Vec<T>,
    u: Vec<T>,
    v: Vec<T>,
    width: u32,
    height: u32,
    log_uvx: u32,
    log_uvy: u32,
    max_value: f32,
}

impl<T: Pixel + Default> FrameBuf<T> {
    /// Allocate a zeroed frame with tightly packed planes.
    #[must_use]
    pub fn new(width: u32, height: u32, log_uvx: u32, log_uvy: u32, max_value: f32) -> Self {
        let wuv = (width >> log_uvx) as usize;
        let huv = (height >> log_uvy) as usize;
        Self {
            y: vec![T::default(); width as usize * height as usize],
            u: vec![T::default(); wuv * huv],
            v: vec![T::default(); wuv * huv],
            width,
            height,
            log_uvx,
            log_uvy,
            max_value,
        }
    }
}

impl<T: Pixel> FrameBuf<T> {
    /// Borrow the frame as a [`PlanarFrame`] view.
    #[must_use]
    pub fn view(&self) -> PlanarFrame<'_, T> {
        PlanarFrame {
            y: &self.y,
            u: &self.u,
            v: &self.v,
            pitch_y: self.width as usize,
            pitch_uv: (self.width >> self.log_uvx) as usize,
            width: self.width,
            height: self.height,
            log_uvx: self.log_uvx,
            log_uvy: self.log_uvy,
            max_value: self.max_value,
        }
    }

    /// Mutable access to the luma plane.
    pub fn y_mut(&mut self) -> &mut [T] {
        &mut self.y
    }

    /// Mutable access to the first chroma plane.
    pub fn u_mut(&mut self) -> &mut [T] {
        &mut self.u
    }

    /// Mutable access to the second chroma plane.
    pub fn v_mut(&mut self) -> &mut [T] {
        &mut self.v
    }
}
