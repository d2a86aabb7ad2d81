// External contour extraction
//
// Each 8-connected foreground component is one external contour. Holes inside a
// component belong to it, so only outer regions are reported.

use image::GrayImage;

use super::background::BACKGROUND;

/// Axis-aligned summary of one contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contour {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub area: f64,
}

impl Contour {
    /// Exact box centre; never rounded.
    pub fn centroid(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Find external contours in scan order (top-to-bottom, left-to-right by first pixel).
pub fn find_contours(mask: &GrayImage) -> Vec<Contour> {
    let (w, h) = mask.dimensions();
    let mut visited = vec![false; (w as usize) * (h as usize)];
    let mut contours = Vec::new();
    let mut stack: Vec<(u32, u32)> = Vec::new();

    let idx = |x: u32, y: u32| (y as usize) * (w as usize) + x as usize;

    for y in 0..h {
        for x in 0..w {
            if visited[idx(x, y)] || mask.get_pixel(x, y)[0] == BACKGROUND {
                continue;
            }

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
            let mut pixels: u64 = 0;
            visited[idx(x, y)] = true;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                pixels += 1;
                min_x = min_x.min(cx);
                max_x = max_x.max(cx);
                min_y = min_y.min(cy);
                max_y = max_y.max(cy);

                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = cx as i32 + dx;
                        let ny = cy as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        let i = idx(nx, ny);
                        if !visited[i] && mask.get_pixel(nx, ny)[0] != BACKGROUND {
                            visited[i] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            contours.push(Contour {
                x: min_x as f64,
                y: min_y as f64,
                w: (max_x - min_x + 1) as f64,
                h: (max_y - min_y + 1) as f64,
                area: pixels as f64,
            });
        }
    }

    contours
}
