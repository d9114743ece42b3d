//! Detect and remove broadcast station logos via per-pixel blend modeling.
//!
//! A station logo burned into video is assumed to blend linearly with the
//! underlying picture: for each pixel, `observed = A*background + B*maxv`.
//! This crate estimates `(A, B)` per pixel by streaming regression over many
//! frames with varied backgrounds, serializes the model to a compact binary
//! file, scores arbitrary frames against it with a 5x5 correlation ensemble
//! (scalar or AVX2-accelerated), removes the logo at a chosen fade strength,
//! and converts noisy per-frame scores into clean on/off intervals.
//!
//! # Quick start
//!
//! ```no_run
//! use delogo::{LogoModel, MaskedModel};
//!
//! let model = LogoModel::load("station.lgd").expect("failed to load model");
//! let masked = MaskedModel::prepare(model, 0.1, None)
//!     .expect("mask build failed")
//!     .expect("cancelled");
//! // masked.evaluate(...) scores frames; masked.remove_logo(...) erases.
//! ```
//!
//! Video decoding is out of scope: callers feed planar Y/U/V buffers (8- or
//! 16-bit) through the [`frame`] module's view types.

#![deny(missing_docs)]

pub mod analyze;
pub mod error;
pub mod field;
pub mod frame;
pub mod interval;
pub mod kernel;
pub mod mask;
pub mod model;
pub mod partition;
pub mod scan;

pub use analyze::{score_frames, CancelToken};
pub use error::{Error, Result};
pub use frame::{FrameBuf, Pixel, PlanarFrame};
pub use interval::{extract_intervals, select_logo, IntervalConfig, LogoInterval};
pub use kernel::{Kernel, KernelKind};
pub use mask::{EvalResult, MaskedModel};
pub use model::{LogoHeader, LogoModel};
pub use partition::{partition_frames, Trim};
pub use scan::{clean_logo, LogoScan, ScanConfig};
