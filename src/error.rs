//! Error types for the delogo crate.

/// Errors that can occur while building, loading, or applying logo models.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred while reading or writing a model file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A model file is malformed: wrong magic, version, or payload size.
    #[error("bad logo file: {0}")]
    Format(String),

    /// The regression could not be solved for at least one pixel.
    ///
    /// The scan did not see enough frames with sufficiently varied
    /// backgrounds. No partial model is produced.
    #[error("insufficient logo frames: regression failed at pixel ({x}, {y})")]
    InsufficientLogoFrames {
        /// X coordinate of the first failing pixel (scan-region local).
        x: u32,
        /// Y coordinate of the first failing pixel (scan-region local).
        y: u32,
    },

    /// Feature-mask construction selected no usable feature pixels.
    #[error("empty feature mask: mask_ratio {mask_ratio} selected no pixels")]
    EmptyMask {
        /// The requested feature fraction.
        mask_ratio: f32,
    },

    /// Scan or frame geometry is inconsistent (odd sizes, out-of-bounds
    /// placement, short plane buffers).
    #[error("bad geometry: {0}")]
    Geometry(String),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
