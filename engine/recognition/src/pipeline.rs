//! End-to-end recognition: photograph in, stones and position record
//! out.
//!
//! Flow: saturation mask -> dilation -> quadrilateral detection ->
//! perspective warp -> grayscale -> intersection classification ->
//! position-record emission. Board detection failure is not an error;
//! the pipeline falls back to the full image and says so in
//! `corners_detected`.

use image::RgbaImage;
use tracing::{debug, info};

use goban::{position_record, Coord, Player};

use crate::classifier::{classify_stones, ClassifierOptions, Hint, Stone};
use crate::detector::detect_board_quad;
use crate::edge::estimate_grid_corners;
use crate::error::RecognitionError;
use crate::homography::warp_to_square;
use crate::image_ops::{dilate, grayscale, resize_gray, saturation_mask, Point, DILATE_RADIUS};

/// Side length the estimated-grid-corner pass works at; the full warped
/// image is larger than the Hough transform needs.
const GRID_ESTIMATE_SIZE: u32 = 240;

/// Options for one recognition request.
#[derive(Debug, Clone)]
pub struct RecognitionOptions {
    pub board_size: usize,
    /// Side length of the square warped output.
    pub output_size: usize,
    /// Fallback darkness threshold for the classifier.
    pub black_threshold: f32,
    /// Fallback brightness threshold for the classifier.
    pub white_threshold: f32,
    /// Inner playing-area corners in warped space, overriding even
    /// intersection spacing.
    pub grid_corners: Option<[Point; 4]>,
}

impl RecognitionOptions {
    pub fn new(board_size: usize) -> Self {
        Self {
            board_size,
            output_size: 800,
            black_threshold: 45.0,
            white_threshold: 30.0,
            grid_corners: None,
        }
    }
}

/// The typed result of a recognition request.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub board_size: usize,
    pub stones: Vec<Stone>,
    /// Source-image corners used for the warp, ordered TL, TR, BR, BL.
    pub corners: [Point; 4],
    pub corners_detected: bool,
    /// Text position record of the detected stones.
    pub position_file: String,
    /// Square warped board image, side = `output_size`.
    pub warped: RgbaImage,
    /// Hough-estimated inner grid corners in warped space, advisory.
    pub estimated_grid_corners: Option<[Point; 4]>,
}

/// Detect the board and classify its stones.
pub fn recognize_board(
    image: &RgbaImage,
    options: &RecognitionOptions,
) -> Result<RecognitionResult, RecognitionError> {
    validate(image, options)?;

    let (width, height) = image.dimensions();
    let mask = saturation_mask(image);
    let mask = dilate(&mask, width as usize, height as usize, DILATE_RADIUS);

    let detected = detect_board_quad(&mask, width as usize, height as usize);
    let corners_detected = detected.is_some();
    let corners = detected.unwrap_or_else(|| {
        debug!("no board quad found, falling back to the full image");
        full_image_corners(width, height)
    });

    run_pipeline(image, corners, corners_detected, &[], options)
}

/// Re-run the warp and classification with caller-adjusted corners.
pub fn reclassify_with_corners(
    image: &RgbaImage,
    corners: [Point; 4],
    options: &RecognitionOptions,
) -> Result<RecognitionResult, RecognitionError> {
    validate(image, options)?;
    run_pipeline(image, corners, true, &[], options)
}

/// Re-run with adjusted corners and per-point calibration hints.
pub fn reclassify_with_hints(
    image: &RgbaImage,
    corners: [Point; 4],
    hints: &[Hint],
    options: &RecognitionOptions,
) -> Result<RecognitionResult, RecognitionError> {
    validate(image, options)?;
    run_pipeline(image, corners, true, hints, options)
}

fn validate(image: &RgbaImage, options: &RecognitionOptions) -> Result<(), RecognitionError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RecognitionError::InvalidImage("empty image".to_string()));
    }
    if !matches!(options.board_size, 9 | 13 | 19) {
        return Err(RecognitionError::UnsupportedBoardSize(options.board_size));
    }
    Ok(())
}

fn full_image_corners(width: u32, height: u32) -> [Point; 4] {
    let far_x = (width - 1) as f32;
    let far_y = (height - 1) as f32;
    [
        Point::new(0.0, 0.0),
        Point::new(far_x, 0.0),
        Point::new(far_x, far_y),
        Point::new(0.0, far_y),
    ]
}

fn run_pipeline(
    image: &RgbaImage,
    corners: [Point; 4],
    corners_detected: bool,
    hints: &[Hint],
    options: &RecognitionOptions,
) -> Result<RecognitionResult, RecognitionError> {
    let warped = warp_to_square(image, &corners, options.output_size)?;
    let gray = grayscale(&warped);

    let mut classifier_options = ClassifierOptions::new(options.board_size);
    classifier_options.black_threshold = options.black_threshold;
    classifier_options.white_threshold = options.white_threshold;
    classifier_options.grid_corners = options.grid_corners;
    classifier_options.hints = hints.to_vec();
    let stones = classify_stones(&gray, &classifier_options);

    let placed: Vec<(Coord, Player)> = stones
        .iter()
        .map(|s| (Coord::new(s.col, s.row), s.color))
        .collect();
    let position_file = position_record(options.board_size, &placed);

    // Estimate the inner grid on a reduced copy; purely advisory.
    let reduced = resize_gray(&gray, GRID_ESTIMATE_SIZE, GRID_ESTIMATE_SIZE);
    let scale = options.output_size as f32 / GRID_ESTIMATE_SIZE as f32;
    let estimated_grid_corners = estimate_grid_corners(&reduced).map(|quad| {
        quad.map(|p| Point::new(p.x * scale, p.y * scale))
    });

    info!(
        stones = stones.len(),
        corners_detected,
        grid_estimate = estimated_grid_corners.is_some(),
        "recognition complete"
    );

    Ok(RecognitionResult {
        board_size: options.board_size,
        stones,
        corners,
        corners_detected,
        position_file,
        warped,
        estimated_grid_corners,
    })
}
