//! Stone classification on the warped board image.
//!
//! Every grid intersection is sampled inside a disc and judged by its
//! brightness *relative to its local neighbourhood*, which cancels
//! lighting gradients across the board. A 1-D k-means over the relative
//! values finds the black-stone, bare-board, and white-stone clusters;
//! calibration hints can pin individual points and recalibrate the
//! clusters.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use goban::Player;

use crate::image_ops::Point;

/// Sampling disc radius as a fraction of the cell size.
const DISC_RADIUS_FACTOR: f32 = 0.35;
/// Half-width of the neighbourhood used for the local median.
const NEIGHBORHOOD: i32 = 3;
/// K-means seeds: percentiles of the relative-value distribution.
const SEED_PERCENTILES: [f32; 3] = [0.10, 0.50, 0.90];
/// K-means stops when no centroid moves further than this.
const KMEANS_EPSILON: f32 = 0.5;
const KMEANS_MAX_ITERS: usize = 20;
/// Minimum black-to-white centroid distance for clusters to count.
const MIN_SPREAD: f32 = 5.0;
/// A cluster must sit this fraction of the spread away from the board
/// cluster to be considered present.
const MIN_GAP_RATIO: f32 = 0.15;
/// Extra margin applied on the outer ring, as a fraction of the spread.
const EDGE_MARGIN_RATIO: f32 = 0.10;
/// Sample-deviation gate multiplier over the median deviation.
const DEVIATION_GATE: f32 = 3.0;

/// A detected stone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stone {
    pub col: u8,
    pub row: u8,
    pub color: Player,
}

/// A caller-supplied ground truth for one intersection. `stone = None`
/// marks the point as known-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub col: u8,
    pub row: u8,
    pub stone: Option<Player>,
}

/// Classifier tuning.
#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    pub board_size: usize,
    /// Fallback darkness threshold when no black cluster is found.
    pub black_threshold: f32,
    /// Fallback brightness threshold when no white cluster is found.
    pub white_threshold: f32,
    /// Inner playing-area corners (TL, TR, BR, BL) in warped-image
    /// space. None means intersections are evenly spaced cell centres.
    pub grid_corners: Option<[Point; 4]>,
    pub hints: Vec<Hint>,
}

impl ClassifierOptions {
    pub fn new(board_size: usize) -> Self {
        Self {
            board_size,
            black_threshold: 45.0,
            white_threshold: 30.0,
            grid_corners: None,
            hints: Vec::new(),
        }
    }
}

/// Intersection positions in warped-image space. With grid corners the
/// inner quad is bilinearly parameterised; otherwise points sit at the
/// centres of evenly divided cells.
pub fn grid_points(image_size: usize, board_size: usize, corners: Option<&[Point; 4]>) -> Vec<Point> {
    let n = board_size;
    let mut points = Vec::with_capacity(n * n);
    match corners {
        Some([tl, tr, br, bl]) => {
            let steps = (n - 1) as f32;
            for row in 0..n {
                for col in 0..n {
                    let u = col as f32 / steps;
                    let v = row as f32 / steps;
                    let x = (1.0 - u) * (1.0 - v) * tl.x
                        + u * (1.0 - v) * tr.x
                        + u * v * br.x
                        + (1.0 - u) * v * bl.x;
                    let y = (1.0 - u) * (1.0 - v) * tl.y
                        + u * (1.0 - v) * tr.y
                        + u * v * br.y
                        + (1.0 - u) * v * bl.y;
                    points.push(Point::new(x, y));
                }
            }
        }
        None => {
            let cell = image_size as f32 / n as f32;
            for row in 0..n {
                for col in 0..n {
                    points.push(Point::new(
                        (col as f32 + 0.5) * cell,
                        (row as f32 + 0.5) * cell,
                    ));
                }
            }
        }
    }
    points
}

/// Mean and standard deviation of gray intensity inside a disc.
fn disc_stats(gray: &GrayImage, center: Point, radius: f32) -> (f32, f32) {
    let (width, height) = gray.dimensions();
    let r = radius.max(1.0);
    let r2 = r * r;
    let x0 = ((center.x - r).floor().max(0.0)) as u32;
    let x1 = ((center.x + r).ceil() as u32).min(width - 1);
    let y0 = ((center.y - r).floor().max(0.0)) as u32;
    let y1 = ((center.y + r).ceil() as u32).min(height - 1);

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - center.x;
            let dy = y as f32 - center.y;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let v = gray.get_pixel(x, y).0[0] as f64;
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean as f32, variance.sqrt() as f32)
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[values.len() / 2]
}

/// 1-D k-means with k = 3, seeded at fixed percentiles. Returns the
/// centroids sorted ascending.
pub fn kmeans3(values: &[f32]) -> [f32; 3] {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let percentile = |p: f32| {
        let idx = ((sorted.len() - 1) as f32 * p).round() as usize;
        sorted[idx]
    };
    let mut centroids = [
        percentile(SEED_PERCENTILES[0]),
        percentile(SEED_PERCENTILES[1]),
        percentile(SEED_PERCENTILES[2]),
    ];

    for _ in 0..KMEANS_MAX_ITERS {
        let mut sums = [0.0f32; 3];
        let mut counts = [0u32; 3];
        for &v in values {
            let nearest = (0..3)
                .min_by(|&a, &b| {
                    (v - centroids[a])
                        .abs()
                        .partial_cmp(&(v - centroids[b]).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(1);
            sums[nearest] += v;
            counts[nearest] += 1;
        }

        let mut motion = 0.0f32;
        for k in 0..3 {
            if counts[k] == 0 {
                continue;
            }
            let next = sums[k] / counts[k] as f32;
            motion = motion.max((next - centroids[k]).abs());
            centroids[k] = next;
        }
        if motion < KMEANS_EPSILON {
            break;
        }
    }

    centroids.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    centroids
}

/// Classify every intersection of the warped grayscale board.
pub fn classify_stones(gray: &GrayImage, options: &ClassifierOptions) -> Vec<Stone> {
    let n = options.board_size;
    let image_size = gray.width() as usize;
    let cell = image_size as f32 / n as f32;
    let radius = DISC_RADIUS_FACTOR * cell;

    let points = grid_points(image_size, n, options.grid_corners.as_ref());
    let stats: Vec<(f32, f32)> = points
        .iter()
        .map(|&p| disc_stats(gray, p, radius))
        .collect();

    // Brightness relative to the local neighbourhood median.
    let mut relative = vec![0.0f32; n * n];
    for row in 0..n {
        for col in 0..n {
            let mut neighborhood = Vec::new();
            for dr in -NEIGHBORHOOD..=NEIGHBORHOOD {
                for dc in -NEIGHBORHOOD..=NEIGHBORHOOD {
                    let r = row as i32 + dr;
                    let c = col as i32 + dc;
                    if r < 0 || c < 0 || r >= n as i32 || c >= n as i32 {
                        continue;
                    }
                    neighborhood.push(stats[r as usize * n + c as usize].0);
                }
            }
            relative[row * n + col] = stats[row * n + col].0 - median(&mut neighborhood);
        }
    }

    let hinted: HashMap<(u8, u8), Option<Player>> = options
        .hints
        .iter()
        .filter(|h| (h.col as usize) < n && (h.row as usize) < n)
        .map(|h| ((h.col, h.row), h.stone))
        .collect();

    // Cluster centroids from k-means, recalibrated by hint means where
    // hints of that class exist. An override that would break the
    // black < board < white ordering is ignored for calibration; the
    // hint still decides its own point below.
    let centroids = kmeans3(&relative);
    let hint_mean = |class: Option<Player>| {
        let values: Vec<f32> = hinted
            .iter()
            .filter(|(_, &stone)| stone == class)
            .map(|(&(col, row), _)| relative[row as usize * n + col as usize])
            .collect();
        (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
    };
    let mut black_c = centroids[0];
    let mut board_c = centroids[1];
    let mut white_c = centroids[2];
    if let Some(mean) = hint_mean(Some(Player::B)) {
        if mean < board_c {
            black_c = mean;
        }
    }
    if let Some(mean) = hint_mean(Some(Player::W)) {
        if mean > board_c {
            white_c = mean;
        }
    }
    if let Some(mean) = hint_mean(None) {
        if mean > black_c && mean < white_c {
            board_c = mean;
        }
    }

    let spread = white_c - black_c;
    let has_black = (spread > MIN_SPREAD && board_c - black_c > MIN_GAP_RATIO * spread)
        || hinted.values().any(|&s| s == Some(Player::B));
    let has_white = (spread > MIN_SPREAD && white_c - board_c > MIN_GAP_RATIO * spread)
        || hinted.values().any(|&s| s == Some(Player::W));
    let black_boundary = (black_c + board_c) / 2.0;
    let white_boundary = (board_c + white_c) / 2.0;

    let mut deviations: Vec<f32> = stats.iter().map(|s| s.1).collect();
    let median_deviation = median(&mut deviations);
    debug!(
        black_c,
        board_c, white_c, has_black, has_white, median_deviation, "classifier calibration"
    );

    let mut stones = Vec::new();
    for row in 0..n {
        for col in 0..n {
            // A hint decides its point outright; no gates re-apply.
            if let Some(&stone) = hinted.get(&(col as u8, row as u8)) {
                if let Some(color) = stone {
                    stones.push(Stone {
                        col: col as u8,
                        row: row as u8,
                        color,
                    });
                }
                continue;
            }

            let value = relative[row * n + col];
            let deviation = stats[row * n + col].1;
            let on_edge = row == 0 || col == 0 || row == n - 1 || col == n - 1;
            let edge_margin = if on_edge {
                EDGE_MARGIN_RATIO * spread.max(0.0)
            } else {
                0.0
            };
            let deviation_ok = deviation <= DEVIATION_GATE * median_deviation;

            let (black_limit, black_extreme) = if has_black {
                (black_boundary, black_c)
            } else {
                (-options.black_threshold, -2.0 * options.black_threshold)
            };
            let (white_limit, white_extreme) = if has_white {
                (white_boundary, white_c)
            } else {
                (options.white_threshold, 2.0 * options.white_threshold)
            };

            let color = if value < black_limit - edge_margin
                && (deviation_ok || value <= black_extreme)
            {
                Some(Player::B)
            } else if value > white_limit + edge_margin
                && (deviation_ok || value >= white_extreme)
            {
                Some(Player::W)
            } else {
                None
            };

            if let Some(color) = color {
                stones.push(Stone {
                    col: col as u8,
                    row: row as u8,
                    color,
                });
            }
        }
    }

    stones
}
