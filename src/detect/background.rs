// Background subtraction
//
// Per-pixel running Gaussian over RGB with a shared variance per pixel.
// A pixel is foreground when its squared distance to the mean, scaled by the
// variance, exceeds the threshold. The learning rate starts at 1 and settles
// at 1/history, so the first frames bootstrap the model quickly.

use image::{GrayImage, Luma, RgbImage};

use crate::config::DetectorParams;
use crate::constants::{BACKGROUND_VAR_INIT, BACKGROUND_VAR_MAX, BACKGROUND_VAR_MIN};
use crate::error::{HabitatError, Result};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Anything that turns a frame into a binary foreground mask (0 or 255).
pub trait BackgroundModel: Send {
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage>;
}

pub struct GaussianBackground {
    history: u32,
    var_threshold: f64,
    frames_seen: u32,
    width: u32,
    height: u32,
    mean: Vec<[f32; 3]>,
    variance: Vec<f32>,
}

impl GaussianBackground {
    pub fn new(history: u32, var_threshold: f64) -> Self {
        Self {
            history: history.max(1),
            var_threshold,
            frames_seen: 0,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
        }
    }

    pub fn from_params(params: &DetectorParams) -> Self {
        Self::new(params.history, params.var_threshold)
    }

    fn initialize(&mut self, frame: &RgbImage) {
        self.width = frame.width();
        self.height = frame.height();
        self.mean = frame
            .pixels()
            .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
            .collect();
        self.variance = vec![BACKGROUND_VAR_INIT as f32; self.mean.len()];
    }

    fn learning_rate(&self) -> f32 {
        1.0 / (self.frames_seen.min(self.history) as f32)
    }
}

impl BackgroundModel for GaussianBackground {
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        if self.frames_seen == 0 {
            self.initialize(frame);
            self.frames_seen = 1;
            return Ok(GrayImage::new(frame.width(), frame.height()));
        }

        if frame.width() != self.width || frame.height() != self.height {
            return Err(HabitatError::Decode(format!(
                "frame size {}x{} does not match background model {}x{}",
                frame.width(), frame.height(), self.width, self.height
            )));
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = self.learning_rate();
        let threshold = self.var_threshold as f32;
        let mut mask = GrayImage::new(self.width, self.height);

        for (i, (pixel, out)) in frame.pixels().zip(mask.pixels_mut()).enumerate() {
            let mean = &mut self.mean[i];
            let var = &mut self.variance[i];

            let d0 = pixel[0] as f32 - mean[0];
            let d1 = pixel[1] as f32 - mean[1];
            let d2 = pixel[2] as f32 - mean[2];
            let dist2 = d0 * d0 + d1 * d1 + d2 * d2;

            *out = if dist2 > threshold * *var {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            };

            mean[0] += alpha * d0;
            mean[1] += alpha * d1;
            mean[2] += alpha * d2;
            let updated = *var + alpha * (dist2 / 3.0 - *var);
            *var = updated.clamp(BACKGROUND_VAR_MIN as f32, BACKGROUND_VAR_MAX as f32);
        }

        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn test_first_frame_is_all_background() {
        let mut model = GaussianBackground::new(100, 50.0);
        let mask = model.apply(&solid(8, 8, 200)).unwrap();
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
    }

    #[test]
    fn test_static_scene_stays_background() {
        let mut model = GaussianBackground::new(100, 50.0);
        for _ in 0..20 {
            let mask = model.apply(&solid(8, 8, 30)).unwrap();
            assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
        }
    }

    #[test]
    fn test_bright_patch_is_foreground() {
        let mut model = GaussianBackground::new(100, 50.0);
        for _ in 0..10 {
            model.apply(&solid(16, 16, 0)).unwrap();
        }

        let mut frame = solid(16, 16, 0);
        for y in 4..8 {
            for x in 4..8 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let mask = model.apply(&frame).unwrap();
        assert_eq!(mask.get_pixel(5, 5)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(0, 0)[0], BACKGROUND);
        let count = mask.pixels().filter(|p| p[0] == FOREGROUND).count();
        assert_eq!(count, 16);
    }

    #[test]
    fn test_size_change_is_rejected() {
        let mut model = GaussianBackground::new(100, 50.0);
        model.apply(&solid(8, 8, 0)).unwrap();
        assert!(matches!(model.apply(&solid(4, 4, 0)), Err(HabitatError::Decode(_))));
    }
}
