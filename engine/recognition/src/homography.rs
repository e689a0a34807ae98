//! Four-point homography estimation and inverse perspective warp.
//!
//! The mapping from the detected board quadrilateral to the square
//! output is solved as the standard 8-equation DLT system (two rows per
//! corner, h8 fixed at 1) by Gaussian elimination with partial pivoting.

use image::RgbaImage;

use crate::error::RecognitionError;
use crate::image_ops::{bilinear_sample, Point};

/// Row-major 3x3 matrix.
pub type Mat3 = [f64; 9];

/// Solve the homography mapping each `src[i]` onto `dst[i]`.
pub fn compute_homography(src: &[Point; 4], dst: &[Point; 4]) -> Result<Mat3, RecognitionError> {
    let mut a = [[0.0f64; 9]; 8];
    for i in 0..4 {
        let (x, y) = (src[i].x as f64, src[i].y as f64);
        let (u, v) = (dst[i].x as f64, dst[i].y as f64);
        a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, u];
        a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v, v];
    }

    let h = solve_8x8(&mut a)?;
    Ok([h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0])
}

/// Gaussian elimination with partial pivoting over an 8x9 augmented
/// system. Fails cleanly when a pivot vanishes.
fn solve_8x8(a: &mut [[f64; 9]; 8]) -> Result<[f64; 8], RecognitionError> {
    for col in 0..8 {
        let pivot_row = (col..8)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot_row][col].abs() <= 1e-12 {
            return Err(RecognitionError::DegenerateGeometry(
                "homography system is singular".to_string(),
            ));
        }
        a.swap(col, pivot_row);

        let pivot = a[col][col];
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut solution = [0.0f64; 8];
    for (i, row) in a.iter().enumerate() {
        solution[i] = row[8] / row[i];
    }
    Ok(solution)
}

/// Invert a 3x3 matrix via its adjugate.
pub fn invert_3x3(m: &Mat3) -> Result<Mat3, RecognitionError> {
    let det = m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
        + m[2] * (m[3] * m[7] - m[4] * m[6]);
    if det.abs() <= 1e-12 {
        return Err(RecognitionError::DegenerateGeometry(
            "homography is not invertible".to_string(),
        ));
    }
    let inv_det = 1.0 / det;
    Ok([
        (m[4] * m[8] - m[5] * m[7]) * inv_det,
        (m[2] * m[7] - m[1] * m[8]) * inv_det,
        (m[1] * m[5] - m[2] * m[4]) * inv_det,
        (m[5] * m[6] - m[3] * m[8]) * inv_det,
        (m[0] * m[8] - m[2] * m[6]) * inv_det,
        (m[2] * m[3] - m[0] * m[5]) * inv_det,
        (m[3] * m[7] - m[4] * m[6]) * inv_det,
        (m[1] * m[6] - m[0] * m[7]) * inv_det,
        (m[0] * m[4] - m[1] * m[3]) * inv_det,
    ])
}

/// Apply a homography to a point.
pub fn apply(m: &Mat3, p: Point) -> Point {
    let (x, y) = (p.x as f64, p.y as f64);
    let w = m[6] * x + m[7] * y + m[8];
    let w = if w.abs() < 1e-12 { 1e-12 } else { w };
    Point::new(
        ((m[0] * x + m[1] * y + m[2]) / w) as f32,
        ((m[3] * x + m[4] * y + m[5]) / w) as f32,
    )
}

/// Square destination corners `(0,0) (S-1,0) (S-1,S-1) (0,S-1)`.
pub fn square_corners(size: usize) -> [Point; 4] {
    let far = (size - 1) as f32;
    [
        Point::new(0.0, 0.0),
        Point::new(far, 0.0),
        Point::new(far, far),
        Point::new(0.0, far),
    ]
}

/// Warp the source quadrilateral onto a square RGBA image of side
/// `output_size`. Each output pixel is mapped back through the inverse
/// homography and bilinearly interpolated; samples outside the source
/// clamp to the nearest edge pixel.
pub fn warp_to_square(
    image: &RgbaImage,
    corners: &[Point; 4],
    output_size: usize,
) -> Result<RgbaImage, RecognitionError> {
    let forward = compute_homography(corners, &square_corners(output_size))?;
    let inverse = invert_3x3(&forward)?;

    let mut out = RgbaImage::new(output_size as u32, output_size as u32);
    for y in 0..output_size {
        for x in 0..output_size {
            let src = apply(&inverse, Point::new(x as f32, y as f32));
            let r = bilinear_sample(image, src.x, src.y, 0).round() as u8;
            let g = bilinear_sample(image, src.x, src.y, 1).round() as u8;
            let b = bilinear_sample(image, src.x, src.y, 2).round() as u8;
            out.put_pixel(x as u32, y as u32, image::Rgba([r, g, b, 255]));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point, eps: f32) {
        assert!(
            (a.x - b.x).abs() < eps && (a.y - b.y).abs() < eps,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_homography_maps_corners_exactly() {
        let src = [
            Point::new(10.0, 12.0),
            Point::new(90.0, 8.0),
            Point::new(95.0, 88.0),
            Point::new(5.0, 92.0),
        ];
        let dst = square_corners(100);
        let h = compute_homography(&src, &dst).unwrap();
        for i in 0..4 {
            assert_close(apply(&h, src[i]), dst[i], 1e-3);
        }
    }

    #[test]
    fn test_inverse_round_trips() {
        let src = [
            Point::new(20.0, 30.0),
            Point::new(200.0, 25.0),
            Point::new(210.0, 190.0),
            Point::new(15.0, 205.0),
        ];
        let h = compute_homography(&src, &square_corners(128)).unwrap();
        let inv = invert_3x3(&h).unwrap();
        let p = Point::new(100.0, 110.0);
        assert_close(apply(&inv, apply(&h, p)), p, 1e-2);
    }

    #[test]
    fn test_collinear_corners_rejected() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(30.0, 0.0),
        ];
        assert!(compute_homography(&src, &square_corners(100)).is_err());
    }

    #[test]
    fn test_identity_warp_preserves_center() {
        // A smooth gradient image warped with its own corners
        let size = 64u32;
        let mut image = RgbaImage::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let v = ((x * 3 + y * 2) % 256) as u8;
                image.put_pixel(x, y, image::Rgba([v, v, v, 255]));
            }
        }
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(63.0, 0.0),
            Point::new(63.0, 63.0),
            Point::new(0.0, 63.0),
        ];
        let warped = warp_to_square(&image, &corners, 64).unwrap();
        for y in 16..48 {
            for x in 16..48 {
                let a = image.get_pixel(x, y).0[0] as i16;
                let b = warped.get_pixel(x, y).0[0] as i16;
                assert!((a - b).abs() <= 10, "pixel ({},{}): {} vs {}", x, y, a, b);
            }
        }
    }

    #[test]
    fn test_warp_output_is_square() {
        let image = RgbaImage::new(50, 40);
        let corners = [
            Point::new(5.0, 5.0),
            Point::new(45.0, 5.0),
            Point::new(45.0, 35.0),
            Point::new(5.0, 35.0),
        ];
        let warped = warp_to_square(&image, &corners, 80).unwrap();
        assert_eq!(warped.dimensions(), (80, 80));
    }
}
