// Per-frame motion detection
// Foreground segmentation, greedy blob clustering and sparse point tracking.

pub mod annotate;
pub mod background;
pub mod cluster;
pub mod contours;
pub mod flow;
pub mod morphology;

#[cfg(test)]
mod tests;

use image::{GrayImage, RgbImage};

use crate::config::DetectorParams;
use crate::error::{HabitatError, Result};

pub use background::{BackgroundModel, GaussianBackground};
pub use cluster::{BoundingBox, MotionBlob};

/// A decoded video frame, resized to the capture resolution.
pub type Frame = RgbImage;

/// State carried from one detect call to the next.
///
/// The first frame of a stream starts from `TrackingState::default()`, so
/// point tracking only kicks in once a gray frame and seed points exist.
#[derive(Debug, Clone, Default)]
pub struct TrackingState {
    pub previous_gray: Option<GrayImage>,
    pub points: Vec<(f32, f32)>,
}

/// Outcome of one detect call.
#[derive(Debug, Clone)]
pub struct Detection {
    pub activity: bool,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub blobs: Vec<MotionBlob>,
    pub tracked_points: Vec<(f32, f32)>,
    pub tracking: TrackingState,
}

pub struct FrameDetector {
    params: DetectorParams,
    kernel: Vec<(i32, i32)>,
}

impl FrameDetector {
    pub fn new(params: DetectorParams) -> Self {
        let kernel = morphology::ellipse_kernel(params.kernel_size);
        Self { params, kernel }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Fresh background model matching this detector's parameters.
    pub fn new_background(&self) -> GaussianBackground {
        GaussianBackground::from_params(&self.params)
    }

    /// Detect motion in `frame`, annotating it in place when enabled.
    pub fn detect(
        &self,
        frame: &mut Frame,
        background: &mut dyn BackgroundModel,
        tracking: TrackingState,
    ) -> Result<Detection> {
        let raw_mask = background.apply(frame)?;
        if raw_mask.dimensions() != frame.dimensions() {
            return Err(HabitatError::Decode(format!(
                "mask size {:?} does not match frame size {:?}",
                raw_mask.dimensions(),
                frame.dimensions()
            )));
        }
        let mask = morphology::denoise(&raw_mask, &self.kernel);
        let found = contours::find_contours(&mask);
        let blobs = cluster::cluster_contours(&found, self.params.distance_threshold);

        let gray = image::imageops::grayscale(frame);

        let mut tracks = Vec::new();
        if let Some(previous) = tracking.previous_gray.as_ref() {
            if !tracking.points.is_empty() {
                let moved = flow::track_points(previous, &gray, &tracking.points, &self.params.flow);
                for (old, new) in tracking.points.iter().zip(moved) {
                    if let Some(new) = new {
                        tracks.push((*old, new));
                    }
                }
            }
        }
        let tracked_points: Vec<(f32, f32)> = tracks.iter().map(|&(_, new)| new).collect();

        let box_activity = !blobs.is_empty();
        let flow_activity = !tracked_points.is_empty();
        let activity = box_activity || flow_activity;

        let (x, y) = if let Some(first) = blobs.first() {
            (Some(first.centroid.0), Some(first.centroid.1))
        } else if flow_activity {
            let n = tracked_points.len() as f64;
            let sum_x: f64 = tracked_points.iter().map(|p| p.0 as f64).sum();
            let sum_y: f64 = tracked_points.iter().map(|p| p.1 as f64).sum();
            (Some(sum_x / n), Some(sum_y / n))
        } else {
            (None, None)
        };

        let next_points = if box_activity {
            blobs.iter().map(|b| (b.centroid.0 as f32, b.centroid.1 as f32)).collect()
        } else {
            tracked_points.clone()
        };

        if self.params.annotate {
            annotate::draw_tracks(frame, &tracks);
            annotate::draw_blobs(frame, &blobs);
        }

        Ok(Detection {
            activity,
            x,
            y,
            blobs,
            tracked_points,
            tracking: TrackingState {
                previous_gray: Some(gray),
                points: next_points,
            },
        })
    }
}
