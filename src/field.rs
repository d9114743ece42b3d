//! Interlace-aware model derivation.
//!
//! Source video may be interlaced while regression and scoring run on
//! progressive approximations. [`deint`] yields a progressive-equivalent
//! luma model; [`make_field`] yields half-height per-field models so top and
//! bottom fields can be matched independently — a logo that fades or moves
//! per field cannot be expressed by frame-based matching alone.

use crate::error::{Error, Result};
use crate::model::{LogoHeader, LogoModel};

/// Progressive-equivalent model via a 3-tap vertical filter on the Y plane.
///
/// Each A/B row becomes `(top + 2*mid + bottom) / 4`; the first and last
/// rows are copied unchanged (no neighbor available). Chroma is untouched.
#[must_use]
pub fn deint(model: &LogoModel) -> LogoModel {
    let hd = model.header();
    let w = hd.w as usize;
    let h = hd.h as usize;

    let filter = |src: &[f32]| -> Vec<f32> {
        let mut out = src.to_vec();
        for y in 1..h - 1 {
            for x in 0..w {
                let top = src[(y - 1) * w + x];
                let mid = src[y * w + x];
                let bot = src[(y + 1) * w + x];
                out[y * w + x] = 2.0_f32.mul_add(mid, top + bot) / 4.0;
            }
        }
        out
    };

    let mut data = Vec::with_capacity(hd.payload_len());
    data.extend(filter(model.a_y()));
    data.extend(filter(model.b_y()));
    data.extend_from_slice(model.a_u());
    data.extend_from_slice(model.b_u());
    data.extend_from_slice(model.a_v());
    data.extend_from_slice(model.b_v());

    // geometry unchanged, so this cannot fail
    LogoModel::from_parts(hd.clone(), data).expect("deint preserves geometry")
}

/// Derive a half-height single-field model.
///
/// Takes every other Y row starting at `bottom as usize`; chroma rows follow
/// a parity derived from the model's vertical image offset, so the field
/// model lines up with how the chroma grid interleaves in the source.
///
/// # Errors
///
/// Returns [`Error::Geometry`] when the field-resolution geometry cannot be
/// expressed (height or placement not divisible far enough for the chroma
/// subsampling).
pub fn make_field(model: &LogoModel, bottom: bool) -> Result<LogoModel> {
    let hd = model.header();
    let sub_y = 1u32 << hd.log_uvy;
    let field = u32::from(bottom);

    if hd.h % (2 * sub_y) != 0 || hd.imgy % 2 != 0 || (hd.imgy / 2) % sub_y != 0 {
        return Err(Error::Geometry(format!(
            "model {}x{}+{}+{} cannot be split into fields with {}x chroma subsampling",
            hd.w, hd.h, hd.imgx, hd.imgy, sub_y
        )));
    }

    let header = LogoHeader {
        h: hd.h / 2,
        imgh: hd.imgh / 2,
        imgy: hd.imgy / 2,
        ..hd.clone()
    };

    let w = hd.w as usize;
    let wu = hd.w_uv() as usize;
    let parity = ((field + (hd.imgy >> hd.log_uvy)) & 1) as usize;

    let take_rows = |src: &[f32], stride: usize, start: usize, rows: usize| -> Vec<f32> {
        let mut out = Vec::with_capacity(stride * rows);
        for r in 0..rows {
            let row = start + 2 * r;
            out.extend_from_slice(&src[row * stride..(row + 1) * stride]);
        }
        out
    };

    let rows_y = (hd.h / 2) as usize;
    let rows_uv = (header.h_uv()) as usize;

    let mut data = Vec::with_capacity(header.payload_len());
    data.extend(take_rows(model.a_y(), w, field as usize, rows_y));
    data.extend(take_rows(model.b_y(), w, field as usize, rows_y));
    data.extend(take_rows(model.a_u(), wu, parity, rows_uv));
    data.extend(take_rows(model.b_u(), wu, parity, rows_uv));
    data.extend(take_rows(model.a_v(), wu, parity, rows_uv));
    data.extend(take_rows(model.b_v(), wu, parity, rows_uv));

    LogoModel::from_parts(header, data)
}
