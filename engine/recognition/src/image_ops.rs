//! Image primitives: grayscale, saturation masking, morphology, and
//! clamped bilinear sampling over raw buffers.

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// A point in image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Saturation threshold above which a pixel counts as board material.
pub const SATURATION_THRESHOLD: f32 = 0.1;
/// Brightness window for the saturation mask, exclusive on both ends.
pub const BRIGHTNESS_LO: f32 = 35.0;
pub const BRIGHTNESS_HI: f32 = 235.0;
/// Radius of the square structuring element that fills stone holes.
pub const DILATE_RADIUS: usize = 5;

/// Rec. 601 luma grayscale.
pub fn grayscale(image: &RgbaImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let [r, g, b, _] = src.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        dst.0 = [luma.round().clamp(0.0, 255.0) as u8];
    }
    gray
}

/// HSV-style saturation: `(max - min) / max`, zero for black pixels.
#[inline]
pub fn saturation(r: u8, g: u8, b: u8) -> f32 {
    let max = r.max(g).max(b) as f32;
    if max == 0.0 {
        return 0.0;
    }
    let min = r.min(g).min(b) as f32;
    (max - min) / max
}

/// Boolean mask of saturated, mid-brightness pixels. This selects the
/// wooden board surface while rejecting background, glare, and the
/// stones themselves (the stones become holes, closed by dilation).
pub fn saturation_mask(image: &RgbaImage) -> Vec<bool> {
    image
        .pixels()
        .map(|p| {
            let [r, g, b, _] = p.0;
            let sat = saturation(r, g, b);
            let brightness = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            sat > SATURATION_THRESHOLD
                && brightness > BRIGHTNESS_LO
                && brightness < BRIGHTNESS_HI
        })
        .collect()
}

/// Dilation by a square structuring element, done as a horizontal run
/// followed by a vertical run.
pub fn dilate(mask: &[bool], width: usize, height: usize, radius: usize) -> Vec<bool> {
    let mut horizontal = vec![false; mask.len()];
    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            if !mask[row + x] {
                continue;
            }
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(width - 1);
            for out in &mut horizontal[row + lo..=row + hi] {
                *out = true;
            }
        }
    }

    let mut result = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            if !horizontal[y * width + x] {
                continue;
            }
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(height - 1);
            for yy in lo..=hi {
                result[yy * width + x] = true;
            }
        }
    }
    result
}

/// Bilinear sample of one channel with edge clamping.
pub fn bilinear_sample(image: &RgbaImage, x: f32, y: f32, channel: usize) -> f32 {
    let (width, height) = image.dimensions();
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |xx: u32, yy: u32| image.get_pixel(xx, yy).0[channel] as f32;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Bilinear grayscale resize.
pub fn resize_gray(image: &GrayImage, new_width: u32, new_height: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = GrayImage::new(new_width, new_height);
    let scale_x = width as f32 / new_width as f32;
    let scale_y = height as f32 / new_height as f32;

    for y in 0..new_height {
        for x in 0..new_width {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (width - 1) as f32);
            let src_y = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (height - 1) as f32);

            let x0 = src_x.floor() as u32;
            let y0 = src_y.floor() as u32;
            let x1 = (x0 + 1).min(width - 1);
            let y1 = (y0 + 1).min(height - 1);
            let fx = src_x - x0 as f32;
            let fy = src_y - y0 as f32;

            let at = |xx: u32, yy: u32| image.get_pixel(xx, yy).0[0] as f32;
            let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
            let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
            out.get_pixel_mut(x, y).0 = [(top * (1.0 - fy) + bottom * fy).round() as u8];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_saturation_formula() {
        assert_eq!(saturation(0, 0, 0), 0.0);
        assert_eq!(saturation(200, 200, 200), 0.0);
        assert!((saturation(200, 100, 100) - 0.5).abs() < 1e-6);
        assert!((saturation(255, 0, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mask_rejects_dark_and_bright() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([180, 140, 60, 255])); // board wood
        image.put_pixel(1, 0, Rgba([20, 10, 5, 255])); // too dark
        image.put_pixel(2, 0, Rgba([255, 240, 220, 255])); // too bright
        let mask = saturation_mask(&image);
        assert_eq!(mask, vec![true, false, false]);
    }

    #[test]
    fn test_dilate_fills_hole() {
        // 11x11 mask with a 3x3 hole in the centre
        let (w, h) = (11usize, 11usize);
        let mut mask = vec![true; w * h];
        for y in 4..7 {
            for x in 4..7 {
                mask[y * w + x] = false;
            }
        }
        let dilated = dilate(&mask, w, h, DILATE_RADIUS);
        assert!(dilated.iter().all(|&v| v), "hole should be closed");
    }

    #[test]
    fn test_dilate_expands_blob() {
        let (w, h) = (9usize, 9usize);
        let mut mask = vec![false; w * h];
        mask[4 * w + 4] = true;
        let dilated = dilate(&mask, w, h, 2);
        assert!(dilated[2 * w + 2]);
        assert!(dilated[6 * w + 6]);
        assert!(!dilated[w + 1]);
    }

    #[test]
    fn test_grayscale_weights() {
        let mut image = RgbaImage::new(1, 1);
        image.put_pixel(0, 0, Rgba([100, 100, 100, 255]));
        let gray = grayscale(&image);
        assert_eq!(gray.get_pixel(0, 0).0[0], 100);
    }

    #[test]
    fn test_bilinear_sample_center() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([100, 0, 0, 255]));
        let mid = bilinear_sample(&image, 0.5, 0.0, 0);
        assert!((mid - 50.0).abs() < 1e-3);
        // Clamped outside
        let out = bilinear_sample(&image, -5.0, 0.0, 0);
        assert_eq!(out, 0.0);
    }
}
