//! The per-pixel logo model and its binary file format.
//!
//! For each pixel of the scan region the model stores two coefficients per
//! color plane: `observed = A * background + B * max_value`. `A = 1, B = 0`
//! means "no logo at this pixel". The six plane arrays (`aY bY aU bU aV bV`)
//! live in one contiguous buffer, sliced by index-computed views.
//!
//! On disk: a fixed-size little-endian [`LogoHeader`] followed by the
//! flattened `f32` arrays. Magic and version are validated strictly on load.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// File magic, `"LGF2"` in little-endian byte order.
pub const LOGO_FILE_MAGIC: u32 = u32::from_le_bytes(*b"LGF2");
/// Current file format version.
pub const LOGO_FILE_VERSION: u32 = 1;

/// Size in bytes of the fixed name field.
const NAME_LEN: usize = 64;
/// Size in bytes of the reserved tail (forward compatibility).
const RESERVED_LEN: usize = 60;
/// Total serialized header size in bytes.
const HEADER_LEN: usize = 44 + NAME_LEN + RESERVED_LEN;

/// Geometry and identity metadata of a logo model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoHeader {
    /// Scan region width in luma pixels.
    pub w: u32,
    /// Scan region height in luma pixels.
    pub h: u32,
    /// Horizontal chroma subsampling shift (0 or 1).
    pub log_uvx: u32,
    /// Vertical chroma subsampling shift (0 or 1).
    pub log_uvy: u32,
    /// Full video frame width the placement refers to.
    pub imgw: u32,
    /// Full video frame height the placement refers to.
    pub imgh: u32,
    /// X position of the scan region within the frame.
    pub imgx: u32,
    /// Y position of the scan region within the frame.
    pub imgy: u32,
    /// Broadcast service identifier, `-1` when unknown.
    pub service_id: i32,
    /// Free-text logo name (truncated to 64 UTF-8 bytes on disk).
    pub name: String,
}

impl LogoHeader {
    /// Chroma plane width.
    #[must_use]
    pub fn w_uv(&self) -> u32 {
        self.w >> self.log_uvx
    }

    /// Chroma plane height.
    #[must_use]
    pub fn h_uv(&self) -> u32 {
        self.h >> self.log_uvy
    }

    /// Total pixel count across all three planes.
    #[must_use]
    pub fn num_pixels(&self) -> usize {
        (self.w * self.h + 2 * self.w_uv() * self.h_uv()) as usize
    }

    /// Number of `f32` values in the model payload (A and B per pixel).
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.num_pixels() * 2
    }

    /// Check the header invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] for zero plane dimensions, subsampling
    /// shifts above 1, placement not aligned to the chroma subsampling, or a
    /// scan region outside the frame.
    pub fn validate(&self) -> Result<()> {
        if self.w == 0 || self.h == 0 || self.w_uv() == 0 || self.h_uv() == 0 {
            return Err(Error::Geometry(format!(
                "empty plane: {}x{} (uv {}x{})",
                self.w,
                self.h,
                self.w_uv(),
                self.h_uv()
            )));
        }
        if self.log_uvx > 1 || self.log_uvy > 1 {
            return Err(Error::Geometry(format!(
                "unsupported chroma subsampling shift {}x{}",
                self.log_uvx, self.log_uvy
            )));
        }
        let sub_x = 1 << self.log_uvx;
        let sub_y = 1 << self.log_uvy;
        if self.w % sub_x != 0
            || self.h % sub_y != 0
            || self.imgx % sub_x != 0
            || self.imgy % sub_y != 0
        {
            return Err(Error::Geometry(format!(
                "scan geometry {}x{}+{}+{} not aligned to {sub_x}x{sub_y} subsampling",
                self.w, self.h, self.imgx, self.imgy
            )));
        }
        if self.imgx + self.w > self.imgw || self.imgy + self.h > self.imgh {
            return Err(Error::Geometry(format!(
                "scan region {}x{}+{}+{} exceeds frame {}x{}",
                self.w, self.h, self.imgx, self.imgy, self.imgw, self.imgh
            )));
        }
        Ok(())
    }

    fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&LOGO_FILE_MAGIC.to_le_bytes())?;
        w.write_all(&LOGO_FILE_VERSION.to_le_bytes())?;
        for v in [
            self.w, self.h, self.log_uvx, self.log_uvy, self.imgw, self.imgh, self.imgx,
            self.imgy,
        ] {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&self.service_id.to_le_bytes())?;
        let mut name = [0u8; NAME_LEN];
        let bytes = self.name.as_bytes();
        let n = bytes.len().min(NAME_LEN);
        name[..n].copy_from_slice(&bytes[..n]);
        w.write_all(&name)?;
        w.write_all(&[0u8; RESERVED_LEN])?;
        Ok(())
    }

    fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        r.read_exact(&mut buf)?;
        let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());

        let magic = u32_at(0);
        if magic != LOGO_FILE_MAGIC {
            return Err(Error::Format(format!("bad magic {magic:#010x}")));
        }
        let version = u32_at(4);
        if version != LOGO_FILE_VERSION {
            return Err(Error::Format(format!(
                "unsupported version {version} (expected {LOGO_FILE_VERSION})"
            )));
        }

        let name_raw = &buf[44..44 + NAME_LEN];
        let name_end = name_raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let header = Self {
            w: u32_at(8),
            h: u32_at(12),
            log_uvx: u32_at(16),
            log_uvy: u32_at(20),
            imgw: u32_at(24),
            imgh: u32_at(28),
            imgx: u32_at(32),
            imgy: u32_at(36),
            service_id: i32::from_le_bytes(buf[40..44].try_into().unwrap()),
            name: String::from_utf8_lossy(&name_raw[..name_end]).into_owned(),
        };
        header.validate().map_err(|e| Error::Format(e.to_string()))?;
        Ok(header)
    }
}

/// A complete per-pixel logo model.
///
/// Owns one contiguous coefficient buffer; the plane views below are
/// index-computed slices of it, so they cannot outlive the model.
/// Immutable once built by [`crate::LogoScan`] or loaded from a file.
#[derive(Debug, Clone)]
pub struct LogoModel {
    header: LogoHeader,
    data: Vec<f32>,
}

impl LogoModel {
    /// Wrap a header and coefficient buffer, validating both.
    ///
    /// The buffer layout is `[aY][bY][aU][bU][aV][bV]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] for invalid headers and
    /// [`Error::Format`] when the buffer length does not match the header.
    pub fn from_parts(header: LogoHeader, data: Vec<f32>) -> Result<Self> {
        header.validate()?;
        if data.len() != header.payload_len() {
            return Err(Error::Format(format!(
                "payload holds {} floats, header requires {}",
                data.len(),
                header.payload_len()
            )));
        }
        Ok(Self { header, data })
    }

    /// An identity model (`A = 1, B = 0` everywhere) for the given geometry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Geometry`] for invalid headers.
    pub fn identity(header: LogoHeader) -> Result<Self> {
        header.validate()?;
        let wh = (header.w * header.h) as usize;
        let wh_uv = (header.w_uv() * header.h_uv()) as usize;
        let mut data = Vec::with_capacity(header.payload_len());
        for plane in [wh, wh_uv, wh_uv] {
            data.extend(std::iter::repeat_n(1.0_f32, plane));
            data.extend(std::iter::repeat_n(0.0_f32, plane));
        }
        Ok(Self { header, data })
    }

    /// The model's header.
    #[must_use]
    pub fn header(&self) -> &LogoHeader {
        &self.header
    }

    fn plane_bounds(&self) -> [usize; 7] {
        let wh = (self.header.w * self.header.h) as usize;
        let wh_uv = (self.header.w_uv() * self.header.h_uv()) as usize;
        let mut bounds = [0usize; 7];
        let sizes = [wh, wh, wh_uv, wh_uv, wh_uv, wh_uv];
        for (i, size) in sizes.iter().enumerate() {
            bounds[i + 1] = bounds[i] + size;
        }
        bounds
    }

    fn plane(&self, index: usize) -> &[f32] {
        let b = self.plane_bounds();
        &self.data[b[index]..b[index + 1]]
    }

    /// Luma A coefficients, row-major `w * h`.
    #[must_use]
    pub fn a_y(&self) -> &[f32] {
        self.plane(0)
    }

    /// Luma B coefficients.
    #[must_use]
    pub fn b_y(&self) -> &[f32] {
        self.plane(1)
    }

    /// First-chroma A coefficients, row-major `w_uv * h_uv`.
    #[must_use]
    pub fn a_u(&self) -> &[f32] {
        self.plane(2)
    }

    /// First-chroma B coefficients.
    #[must_use]
    pub fn b_u(&self) -> &[f32] {
        self.plane(3)
    }

    /// Second-chroma A coefficients.
    #[must_use]
    pub fn a_v(&self) -> &[f32] {
        self.plane(4)
    }

    /// Second-chroma B coefficients.
    #[must_use]
    pub fn b_v(&self) -> &[f32] {
        self.plane(5)
    }

    /// The raw coefficient buffer, layout `[aY][bY][aU][bU][aV][bV]`.
    #[must_use]
    pub fn raw(&self) -> &[f32] {
        &self.data
    }

    /// Write the model to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on any write failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.header.write_to(&mut w)?;
        for v in &self.data {
            w.write_all(&v.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }

    /// Load a model from `path`, validating magic, version, geometry, and
    /// payload size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] for missing or short files and
    /// [`Error::Format`] for malformed content.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }

    /// Load a model from any reader. See [`LogoModel::load`].
    ///
    /// # Errors
    ///
    /// Same as [`LogoModel::load`].
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let header = LogoHeader::read_from(&mut r)?;
        let len = header.payload_len();
        let mut bytes = vec![0u8; len * 4];
        r.read_exact(&mut bytes)?;
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Self::from_parts(header, data)
    }
}
