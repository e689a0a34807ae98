//! Recognition pipeline errors.
//!
//! A board that simply is not found in the photo is not an error: the
//! pipeline falls back to the full image and reports
//! `corners_detected = false`. Errors are reserved for inputs the
//! pipeline cannot work with at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Image buffer does not match the declared dimensions, or is empty.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The corner quadrilateral collapses; no perspective mapping
    /// exists.
    #[error("degenerate corner geometry: {0}")]
    DegenerateGeometry(String),

    /// Unsupported board size (only 9, 13, and 19 are recognised).
    #[error("unsupported board size {0}")]
    UnsupportedBoardSize(usize),
}
