//! Skew estimation from the minimum-area rectangle around dark pixels.

use image::GrayImage;
use imageproc::contrast::otsu_level;
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;

/// Residual skew of the page content, in degrees within (-45, 45].
///
/// Positive values mean content descends to the right (clockwise tilt in
/// image coordinates). Returns `None` for blank pages.
pub fn estimate_skew(image: &GrayImage) -> Option<f32> {
    let (darkest, lightest) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if darkest >= lightest {
        return None;
    }

    let level = otsu_level(image);
    let (width, height) = image.dimensions();

    // Row extremes are enough: the convex hull only depends on them
    let mut points: Vec<Point<i32>> = Vec::new();
    for y in 0..height {
        let mut left = None;
        let mut right = None;
        for x in 0..width {
            if image.get_pixel(x, y)[0] <= level {
                left.get_or_insert(x);
                right = Some(x);
            }
        }
        if let (Some(l), Some(r)) = (left, right) {
            points.push(Point::new(l as i32, y as i32));
            if r != l {
                points.push(Point::new(r as i32, y as i32));
            }
        }
    }

    if points.len() < 3 {
        return None;
    }

    min_area_rect_angle(&points)
}

/// Angle of the top edge of the minimum-area enclosing rectangle, normalized
/// to (-45, 45]. `None` when there are no points.
pub fn min_area_rect_angle(points: &[Point<i32>]) -> Option<f32> {
    if points.is_empty() {
        return None;
    }
    let [top_left, top_right, _, _] = min_area_rect(points);
    let dx = (top_right.x - top_left.x) as f32;
    let dy = (top_right.y - top_left.y) as f32;
    if dx == 0.0 && dy == 0.0 {
        return Some(0.0);
    }
    Some(normalize_angle(dy.atan2(dx).to_degrees()))
}

fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % 90.0;
    if a <= -45.0 {
        a += 90.0;
    } else if a > 45.0 {
        a -= 90.0;
    }
    a
}
