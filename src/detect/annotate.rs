// Frame annotation: blob boxes, centroid dots and flow tracks.
// Coordinates are only rounded here, never in the detector output.

use image::{Rgb, RgbImage};

use super::cluster::MotionBlob;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const DOT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LINE_THICKNESS: i32 = 2;
const DOT_RADIUS: i32 = 5;

fn put(frame: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}

pub fn draw_rect(frame: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: Rgb<u8>) {
    let (x2, y2) = (x + w, y + h);
    for t in 0..LINE_THICKNESS {
        for px in x..=x2 {
            put(frame, px, y + t, color);
            put(frame, px, y2 - t, color);
        }
        for py in y..=y2 {
            put(frame, x + t, py, color);
            put(frame, x2 - t, py, color);
        }
    }
}

pub fn draw_dot(frame: &mut RgbImage, cx: i32, cy: i32, color: Rgb<u8>) {
    let r2 = DOT_RADIUS * DOT_RADIUS;
    for dy in -DOT_RADIUS..=DOT_RADIUS {
        for dx in -DOT_RADIUS..=DOT_RADIUS {
            if dx * dx + dy * dy <= r2 {
                put(frame, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Bresenham line, thickened by one pixel down and right.
pub fn draw_line(frame: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Rgb<u8>) {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        for t in 0..LINE_THICKNESS {
            put(frame, x0 + t, y0, color);
            put(frame, x0, y0 + t, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

pub fn draw_blobs(frame: &mut RgbImage, blobs: &[MotionBlob]) {
    for blob in blobs {
        let b = &blob.bounding_box;
        draw_rect(frame, b.x as i32, b.y as i32, b.w as i32, b.h as i32, BOX_COLOR);
        draw_dot(frame, blob.centroid.0 as i32, blob.centroid.1 as i32, DOT_COLOR);
    }
}

pub fn draw_tracks(frame: &mut RgbImage, tracks: &[((f32, f32), (f32, f32))]) {
    for &(old, new) in tracks {
        draw_line(
            frame,
            (old.0 as i32, old.1 as i32),
            (new.0 as i32, new.1 as i32),
            BOX_COLOR,
        );
        draw_dot(frame, new.0 as i32, new.1 as i32, DOT_COLOR);
    }
}
