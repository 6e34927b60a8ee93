//! Pixel stages of the preprocessing ladder.
//!
//! All filters take and return 8-bit grayscale images. Binary images use 0 for
//! ink and 255 for background.

use image::{GrayImage, Luma};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `tiles x tiles` regions, each histogram is clipped
/// at `clip_limit` times the mean bin height, and pixel values are mapped by
/// bilinear interpolation between the four surrounding tile mappings.
pub fn clahe(image: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let tiles_x = tiles.clamp(1, width);
    let tiles_y = tiles.clamp(1, height);

    let bounds = |t: u32, n: u32, size: u32| (t * size / n, (t + 1) * size / n);

    let mut maps = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, x1) = bounds(tx, tiles_x, width);
            let (y0, y1) = bounds(ty, tiles_y, height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = ((x1 - x0) * (y1 - y0)).max(1);

            let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let share = excess / 256;
            let remainder = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += share + u32::from(i < remainder);
            }

            let map = &mut maps[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u32;
            for (i, bin) in hist.iter().enumerate() {
                cdf += bin;
                map[i] = ((cdf as f32 * 255.0 / area as f32).round()).min(255.0) as u8;
            }
        }
    }

    // Tile centers in pixel coordinates
    let center = |t: u32, n: u32, size: u32| {
        let (a, b) = bounds(t, n, size);
        (a + b) as f32 / 2.0
    };

    // Index of the tile whose center is left of `pos`, and the weight of the next one
    let locate = |pos: f32, n: u32, size: u32| -> (u32, u32, f32) {
        let first = center(0, n, size);
        let last = center(n - 1, n, size);
        if pos <= first {
            return (0, 0, 0.0);
        }
        if pos >= last {
            return (n - 1, n - 1, 0.0);
        }
        let mut t = 0;
        while t + 1 < n && center(t + 1, n, size) <= pos {
            t += 1;
        }
        let c0 = center(t, n, size);
        let c1 = center(t + 1, n, size);
        (t, t + 1, (pos - c0) / (c1 - c0))
    };

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let (ty0, ty1, wy) = locate(y as f32 + 0.5, tiles_y, height);
        for x in 0..width {
            let (tx0, tx1, wx) = locate(x as f32 + 0.5, tiles_x, width);
            let v = image.get_pixel(x, y)[0] as usize;
            let m = |tx: u32, ty: u32| maps[(ty * tiles_x + tx) as usize][v] as f32;

            let top = m(tx0, ty0) * (1.0 - wx) + m(tx1, ty0) * wx;
            let bottom = m(tx0, ty1) * (1.0 - wx) + m(tx1, ty1) * wx;
            let value = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Mean-based local threshold: a pixel becomes background when it is brighter
/// than the mean of its `block_size` neighbourhood minus `c`.
pub fn adaptive_threshold(image: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let (width, height) = image.dimensions();
    let integral = integral_image::<_, u64>(image);
    let half = block_size / 2;

    let mut result = GrayImage::new(width, height);
    for y in 0..height {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(width);

            let count = u64::from((x1 - x0) * (y1 - y0));
            let sum = sum_image_pixels(&integral, x0, y0, x1 - 1, y1 - 1)[0];
            let mean = (sum / count) as i32;
            let pixel = image.get_pixel(x, y)[0] as i32;

            let output = if pixel > mean - c { 255 } else { 0 };
            result.put_pixel(x, y, Luma([output]));
        }
    }
    result
}

/// Global binarization at the Otsu level.
pub fn otsu_binarize(image: &GrayImage) -> GrayImage {
    threshold(image, otsu_level(image), ThresholdType::Binary)
}

/// Number of ink (zero-valued) pixels in a binary image.
pub fn foreground_count(binary: &GrayImage) -> usize {
    binary.pixels().filter(|p| p[0] == 0).count()
}

/// Erase horizontal and vertical ruling lines from a binary image.
///
/// Lines are found by a morphological opening of the ink mask with a wide
/// flat rectangle and a tall narrow one; pixels they cover are reset to
/// background.
pub fn remove_lines(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    if width == 0 || height == 0 {
        return binary.clone();
    }

    let thin_w = (width / 200).max(1);
    let thin_h = (height / 200).max(1);
    let ink = threshold(binary, 0, ThresholdType::BinaryInverted);
    let horizontal = open_rect(&ink, (width / 30).max(10), thin_h);
    let vertical = open_rect(&ink, thin_w, (height / 30).max(10));

    let mut out = binary.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if horizontal.get_pixel(x, y)[0] > 0 || vertical.get_pixel(x, y)[0] > 0 {
            *pixel = Luma([255]);
        }
    }
    out
}

/// Opening with a `kw x kh` rectangle, applied as a row pass and a column
/// pass. Sides are rounded up to odd lengths so the mask stays centered.
fn open_rect(ink: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    let row = rect_mask(kw, 1);
    let column = rect_mask(1, kh);
    let eroded = grayscale_erode(&grayscale_erode(ink, &row), &column);
    grayscale_dilate(&grayscale_dilate(&eroded, &row), &column)
}

fn rect_mask(width: u32, height: u32) -> Mask {
    // Masks are limited to 511 pixels per side
    let side = |n: u32| (n | 1).min(MAX_MASK_SIDE);
    let (w, h) = (side(width), side(height));
    let shape = GrayImage::from_pixel(w, h, Luma([255]));
    Mask::from_image(&shape, (w / 2) as u8, (h / 2) as u8)
}

const MAX_MASK_SIDE: u32 = 511;
