// Binary morphology on foreground masks
// Out-of-image neighbours are ignored, so borders neither erode nor grow.

use image::GrayImage;

use super::background::{BACKGROUND, FOREGROUND};

/// Offsets of an elliptical structuring element inscribed in a size x size box.
pub fn ellipse_kernel(size: u32) -> Vec<(i32, i32)> {
    let size = size.max(1) as i32;
    let r = size / 2;
    if r == 0 {
        return vec![(0, 0)];
    }
    let rf = r as f64;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        // Half-width of the ellipse row at this dy
        let t = dy as f64 / rf;
        let half = (rf * (1.0 - t * t).max(0.0).sqrt()).round() as i32;
        for dx in -half..=half {
            offsets.push((dx, dy));
        }
    }
    offsets
}

fn is_empty(mask: &GrayImage) -> bool {
    mask.as_raw().iter().all(|&v| v == BACKGROUND)
}

pub fn erode(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    if is_empty(mask) {
        return out;
    }
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            if mask.get_pixel(x as u32, y as u32)[0] == BACKGROUND {
                continue;
            }
            let keep = kernel.iter().all(|&(dx, dy)| {
                let nx = x + dx;
                let ny = y + dy;
                nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32
                    || mask.get_pixel(nx as u32, ny as u32)[0] != BACKGROUND
            });
            if keep {
                out.get_pixel_mut(x as u32, y as u32)[0] = FOREGROUND;
            }
        }
    }
    out
}

pub fn dilate(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    if is_empty(mask) {
        return out;
    }
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            if mask.get_pixel(x as u32, y as u32)[0] == BACKGROUND {
                continue;
            }
            for &(dx, dy) in kernel {
                let nx = x + dx;
                let ny = y + dy;
                if nx >= 0 && ny >= 0 && nx < w as i32 && ny < h as i32 {
                    out.get_pixel_mut(nx as u32, ny as u32)[0] = FOREGROUND;
                }
            }
        }
    }
    out
}

/// Erode then dilate: removes specks smaller than the kernel.
pub fn open(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    dilate(&erode(mask, kernel), kernel)
}

/// Dilate then erode: fills small holes and gaps.
pub fn close(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    erode(&dilate(mask, kernel), kernel)
}

/// Speckle suppression applied to every raw mask.
pub fn denoise(mask: &GrayImage, kernel: &[(i32, i32)]) -> GrayImage {
    close(&open(mask, kernel), kernel)
}
