//! Edge detection and Hough line voting.
//!
//! Used to estimate the inner grid corners on the warped board: the
//! outermost grid lines are strong, near-axis-aligned edges, so their
//! Hough peaks intersect at the playing area's corners. The estimate is
//! advisory; callers fall back to even spacing when it is unavailable.

use image::GrayImage;
use tracing::debug;

use crate::detector::order_corners;
use crate::image_ops::Point;

/// Canny hysteresis thresholds on gradient magnitude.
const CANNY_LOW: f32 = 40.0;
const CANNY_HIGH: f32 = 90.0;
/// Angular resolution of the Hough accumulator.
const THETA_STEPS: usize = 180;
/// How close to axis-aligned a line must be to count as a grid line.
const AXIS_TOLERANCE_DEG: f32 = 20.0;

/// A line in normal form: `rho = x cos(theta) + y sin(theta)`.
#[derive(Debug, Clone, Copy)]
pub struct HoughLine {
    pub rho: f32,
    pub theta: f32,
    pub votes: u32,
}

/// 5x5 Gaussian blur with sigma ~1.
fn gaussian_blur(gray: &GrayImage) -> Vec<f32> {
    const KERNEL: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    const NORM: f32 = 16.0;
    let (width, height) = gray.dimensions();
    let (w, h) = (width as i32, height as i32);
    let at = |x: i32, y: i32| {
        let x = x.clamp(0, w - 1) as u32;
        let y = y.clamp(0, h - 1) as u32;
        gray.get_pixel(x, y).0[0] as f32
    };

    let mut horizontal = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0;
            for (k, weight) in KERNEL.iter().enumerate() {
                sum += weight * at(x + k as i32 - 2, y);
            }
            horizontal[(y * w + x) as usize] = sum / NORM;
        }
    }

    let mut out = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0;
            for (k, weight) in KERNEL.iter().enumerate() {
                let yy = (y + k as i32 - 2).clamp(0, h - 1);
                sum += weight * horizontal[(yy * w + x) as usize];
            }
            out[(y * w + x) as usize] = sum / NORM;
        }
    }
    out
}

/// Canny edge detector: blur, Sobel, non-maximum suppression along the
/// quantised gradient direction, then hysteresis.
pub fn canny(gray: &GrayImage) -> Vec<bool> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let blurred = gaussian_blur(gray);

    let mut magnitude = vec![0.0f32; w * h];
    let mut direction = vec![0u8; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let at = |dx: i32, dy: i32| {
                blurred[(y as i32 + dy) as usize * w + (x as i32 + dx) as usize]
            };
            let gx = -at(-1, -1) - 2.0 * at(-1, 0) - at(-1, 1)
                + at(1, -1)
                + 2.0 * at(1, 0)
                + at(1, 1);
            let gy = -at(-1, -1) - 2.0 * at(0, -1) - at(1, -1)
                + at(-1, 1)
                + 2.0 * at(0, 1)
                + at(1, 1);
            magnitude[y * w + x] = (gx * gx + gy * gy).sqrt();
            // Quantise to 0/45/90/135 degrees
            let angle = gy.atan2(gx).to_degrees().rem_euclid(180.0);
            direction[y * w + x] = match angle {
                a if !(22.5..157.5).contains(&a) => 0,
                a if a < 67.5 => 1,
                a if a < 112.5 => 2,
                _ => 3,
            };
        }
    }

    // Non-maximum suppression
    let mut strong = Vec::new();
    let mut state = vec![0u8; w * h]; // 0 none, 1 weak, 2 strong
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let m = magnitude[y * w + x];
            if m < CANNY_LOW {
                continue;
            }
            let (da, db) = match direction[y * w + x] {
                0 => ((1i32, 0i32), (-1i32, 0i32)),
                1 => ((1, 1), (-1, -1)),
                2 => ((0, 1), (0, -1)),
                _ => ((1, -1), (-1, 1)),
            };
            let neighbor = |d: (i32, i32)| {
                magnitude[(y as i32 + d.1) as usize * w + (x as i32 + d.0) as usize]
            };
            if m < neighbor(da) || m < neighbor(db) {
                continue;
            }
            if m >= CANNY_HIGH {
                state[y * w + x] = 2;
                strong.push((x, y));
            } else {
                state[y * w + x] = 1;
            }
        }
    }

    // Hysteresis: weak edges survive when connected to a strong one
    let mut edges = vec![false; w * h];
    let mut stack = strong;
    while let Some((x, y)) = stack.pop() {
        if edges[y * w + x] {
            continue;
        }
        edges[y * w + x] = true;
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                    continue;
                }
                let idx = ny as usize * w + nx as usize;
                if state[idx] >= 1 && !edges[idx] {
                    stack.push((nx as usize, ny as usize));
                }
            }
        }
    }
    edges
}

/// Vote edge pixels into a (rho, theta) accumulator and return peaks
/// above `min_votes`, non-maximum suppressed by proximity.
pub fn hough_lines(edges: &[bool], width: usize, height: usize, min_votes: u32) -> Vec<HoughLine> {
    let diagonal = ((width * width + height * height) as f32).sqrt().ceil() as i32;
    let rho_bins = (2 * diagonal + 1) as usize;
    let mut accumulator = vec![0u32; rho_bins * THETA_STEPS];

    let tables: Vec<(f32, f32)> = (0..THETA_STEPS)
        .map(|t| {
            let theta = t as f32 * std::f32::consts::PI / THETA_STEPS as f32;
            (theta.cos(), theta.sin())
        })
        .collect();

    for y in 0..height {
        for x in 0..width {
            if !edges[y * width + x] {
                continue;
            }
            for (t, &(cos, sin)) in tables.iter().enumerate() {
                let rho = x as f32 * cos + y as f32 * sin;
                let bin = (rho.round() as i32 + diagonal) as usize;
                accumulator[bin * THETA_STEPS + t] += 1;
            }
        }
    }

    let mut peaks: Vec<HoughLine> = Vec::new();
    for bin in 0..rho_bins {
        for t in 0..THETA_STEPS {
            let votes = accumulator[bin * THETA_STEPS + t];
            if votes < min_votes {
                continue;
            }
            let line = HoughLine {
                rho: (bin as i32 - diagonal) as f32,
                theta: t as f32 * 180.0 / THETA_STEPS as f32,
                votes,
            };
            // Suppress near-duplicates, keeping the stronger peak
            if let Some(existing) = peaks
                .iter_mut()
                .find(|p| (p.rho - line.rho).abs() < 10.0 && angle_distance(p.theta, line.theta) < 5.0)
            {
                if line.votes > existing.votes {
                    *existing = line;
                }
            } else {
                peaks.push(line);
            }
        }
    }
    peaks.sort_by(|a, b| b.votes.cmp(&a.votes));
    peaks
}

fn angle_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs() % 180.0;
    d.min(180.0 - d)
}

/// Intersection of two lines in normal form.
fn intersect(a: &HoughLine, b: &HoughLine) -> Option<Point> {
    let (t1, t2) = (a.theta.to_radians(), b.theta.to_radians());
    let det = t1.cos() * t2.sin() - t2.cos() * t1.sin();
    if det.abs() < 1e-6 {
        return None;
    }
    let x = (a.rho * t2.sin() - b.rho * t1.sin()) / det;
    let y = (b.rho * t1.cos() - a.rho * t2.cos()) / det;
    Some(Point::new(x, y))
}

/// Estimate the playing area's corner points on a warped, grayscale
/// board image from the outermost grid lines.
pub fn estimate_grid_corners(gray: &GrayImage) -> Option<[Point; 4]> {
    let (width, height) = gray.dimensions();
    let edges = canny(gray);
    let min_votes = (width.min(height) / 3) as u32;
    let lines = hough_lines(&edges, width as usize, height as usize, min_votes);

    let mut vertical: Vec<&HoughLine> = lines
        .iter()
        .filter(|l| angle_distance(l.theta, 0.0) < AXIS_TOLERANCE_DEG)
        .collect();
    let mut horizontal: Vec<&HoughLine> = lines
        .iter()
        .filter(|l| angle_distance(l.theta, 90.0) < AXIS_TOLERANCE_DEG)
        .collect();
    if vertical.len() < 2 || horizontal.len() < 2 {
        debug!(
            vertical = vertical.len(),
            horizontal = horizontal.len(),
            "not enough grid lines for a corner estimate"
        );
        return None;
    }

    // Outermost members of each family by absolute offset
    vertical.sort_by(|a, b| a.rho.abs().partial_cmp(&b.rho.abs()).unwrap_or(std::cmp::Ordering::Equal));
    horizontal.sort_by(|a, b| a.rho.abs().partial_cmp(&b.rho.abs()).unwrap_or(std::cmp::Ordering::Equal));
    let left = vertical.first()?;
    let right = vertical.last()?;
    let top = horizontal.first()?;
    let bottom = horizontal.last()?;

    let corners = [
        intersect(left, top)?,
        intersect(right, top)?,
        intersect(right, bottom)?,
        intersect(left, bottom)?,
    ];
    Some(order_corners(corners))
}
