// Sparse pyramidal Lucas-Kanade optical flow
//
// Tracks a handful of points from the previous gray frame into the current one.
// Each point either yields a new position (good status) or None when the window
// is textureless, the solve is singular or the point leaves the image.

use image::GrayImage;

use crate::config::FlowParams;

/// Float image with clamped bilinear sampling
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    /// 2x2 box downsample
    fn downsample(&self) -> Self {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let x0 = (2 * x).min(self.width - 1);
                let y0 = (2 * y).min(self.height - 1);
                let x1 = (x0 + 1).min(self.width - 1);
                let y1 = (y0 + 1).min(self.height - 1);
                let sum = self.at(x0, y0) + self.at(x1, y0) + self.at(x0, y1) + self.at(x1, y1);
                data.push(sum / 4.0);
            }
        }
        Self { width, height, data }
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    fn sample(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
        let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width - 1) as f32 && y <= (self.height - 1) as f32
    }
}

fn pyramid(gray: &GrayImage, max_level: u32) -> Vec<Plane> {
    let mut levels = vec![Plane::from_gray(gray)];
    for _ in 0..max_level {
        let next = match levels.last() {
            Some(prev) if prev.width >= 2 && prev.height >= 2 => prev.downsample(),
            _ => break,
        };
        levels.push(next);
    }
    levels
}

/// Track `points` from `prev` to `next`. Output is index-aligned with the input.
pub fn track_points(
    prev: &GrayImage,
    next: &GrayImage,
    points: &[(f32, f32)],
    params: &FlowParams,
) -> Vec<Option<(f32, f32)>> {
    if points.is_empty() || prev.dimensions() != next.dimensions() || prev.width() == 0 || prev.height() == 0 {
        return vec![None; points.len()];
    }

    let prev_pyr = pyramid(prev, params.max_level);
    let next_pyr = pyramid(next, params.max_level);
    let levels = prev_pyr.len().min(next_pyr.len());

    points
        .iter()
        .map(|&p| track_one(&prev_pyr[..levels], &next_pyr[..levels], p, params))
        .collect()
}

fn track_one(
    prev_pyr: &[Plane],
    next_pyr: &[Plane],
    point: (f32, f32),
    params: &FlowParams,
) -> Option<(f32, f32)> {
    let half = (params.window_size.max(3) / 2) as i32;
    let window_pixels = ((2 * half + 1) * (2 * half + 1)) as f64;
    let eps = params.epsilon as f32;

    if !prev_pyr[0].contains(point.0, point.1) {
        return None;
    }

    let mut guess = (0.0f32, 0.0f32);

    for level in (0..prev_pyr.len()).rev() {
        let prev = &prev_pyr[level];
        let next = &next_pyr[level];
        let scale = (1u32 << level) as f32;
        let px = point.0 / scale;
        let py = point.1 / scale;

        // Spatial gradient matrix over the window
        let mut gxx = 0.0f64;
        let mut gxy = 0.0f64;
        let mut gyy = 0.0f64;
        let mut samples = Vec::with_capacity(window_pixels as usize);
        for dy in -half..=half {
            for dx in -half..=half {
                let x = px + dx as f32;
                let y = py + dy as f32;
                let ix = (prev.sample(x + 1.0, y) - prev.sample(x - 1.0, y)) / 2.0;
                let iy = (prev.sample(x, y + 1.0) - prev.sample(x, y - 1.0)) / 2.0;
                gxx += (ix * ix) as f64;
                gxy += (ix * iy) as f64;
                gyy += (iy * iy) as f64;
                samples.push((x, y, ix, iy, prev.sample(x, y)));
            }
        }

        let det = gxx * gyy - gxy * gxy;
        let trace = gxx + gyy;
        let min_eig = (trace - ((gxx - gyy).powi(2) + 4.0 * gxy * gxy).sqrt()) / 2.0;
        // Normalised by window size and 8-bit range
        if det.abs() < f64::EPSILON || min_eig / (window_pixels * 255.0 * 255.0) < params.min_eigen_threshold {
            return None;
        }

        let mut v = (0.0f32, 0.0f32);
        for _ in 0..params.max_iterations.max(1) {
            let mut bx = 0.0f64;
            let mut by = 0.0f64;
            for &(x, y, ix, iy, intensity) in &samples {
                let diff = intensity - next.sample(x + guess.0 + v.0, y + guess.1 + v.1);
                bx += (diff * ix) as f64;
                by += (diff * iy) as f64;
            }
            let eta_x = ((gyy * bx - gxy * by) / det) as f32;
            let eta_y = ((gxx * by - gxy * bx) / det) as f32;
            v.0 += eta_x;
            v.1 += eta_y;
            if eta_x * eta_x + eta_y * eta_y < eps * eps {
                break;
            }
        }

        guess = if level > 0 {
            (2.0 * (guess.0 + v.0), 2.0 * (guess.1 + v.1))
        } else {
            (guess.0 + v.0, guess.1 + v.1)
        };
    }

    let moved = (point.0 + guess.0, point.1 + guess.1);
    if !moved.0.is_finite() || !moved.1.is_finite() || !prev_pyr[0].contains(moved.0, moved.1) {
        return None;
    }
    Some(moved)
}
