// Detector tests with synthetic frames and scripted background masks

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma, Rgb, RgbImage};

    use crate::config::DetectorParams;
    use crate::detect::background::{BackgroundModel, FOREGROUND};
    use crate::detect::{FrameDetector, TrackingState};
    use crate::error::{HabitatError, Result};

    /// Background model that always returns the same mask
    struct ScriptedMask(GrayImage);

    impl BackgroundModel for ScriptedMask {
        fn apply(&mut self, _frame: &RgbImage) -> Result<GrayImage> {
            Ok(self.0.clone())
        }
    }

    fn quiet_params() -> DetectorParams {
        DetectorParams { annotate: false, ..Default::default() }
    }

    fn square_mask(w: u32, h: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x0 + side && y >= y0 && y < y0 + side {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        })
    }

    /// Gray frame with a smooth bright spot, good texture for flow
    fn spot_frame(w: u32, h: u32, cx: f32, cy: f32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let v = (20.0 + 220.0 * (-(dx * dx + dy * dy) / 72.0).exp()) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_empty_frame_is_inactive() {
        let detector = FrameDetector::new(quiet_params());
        let mut background = detector.new_background();
        let mut frame = RgbImage::new(64, 48);

        let detection = detector.detect(&mut frame, &mut background, TrackingState::default()).unwrap();
        assert!(!detection.activity);
        assert_eq!(detection.x, None);
        assert_eq!(detection.y, None);
        assert!(detection.blobs.is_empty());
        assert!(detection.tracking.points.is_empty());
        assert!(detection.tracking.previous_gray.is_some());
    }

    #[test]
    fn test_static_stream_stays_inactive() {
        let detector = FrameDetector::new(quiet_params());
        let mut background = detector.new_background();
        let mut tracking = TrackingState::default();

        for _ in 0..10 {
            let mut frame = RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]));
            let detection = detector.detect(&mut frame, &mut background, tracking).unwrap();
            assert!(!detection.activity);
            assert_eq!(detection.x, None);
            tracking = detection.tracking;
        }
    }

    #[test]
    fn test_blob_sets_coordinate_and_seeds() {
        let detector = FrameDetector::new(quiet_params());
        let mut background = ScriptedMask(square_mask(80, 60, 20, 10, 16));
        let mut frame = RgbImage::new(80, 60);

        let detection = detector.detect(&mut frame, &mut background, TrackingState::default()).unwrap();
        assert!(detection.activity);
        assert_eq!(detection.blobs.len(), 1);
        // Box 20..36 x 10..26 after open/close keeps its extent
        assert_eq!(detection.x, Some(28.0));
        assert_eq!(detection.y, Some(18.0));
        assert_eq!(detection.tracking.points, vec![(28.0, 18.0)]);
    }

    #[test]
    fn test_moving_square_is_detected_by_background_model() {
        let detector = FrameDetector::new(quiet_params());
        let mut background = detector.new_background();
        let mut tracking = TrackingState::default();

        for _ in 0..5 {
            let mut frame = RgbImage::new(96, 64);
            tracking = detector.detect(&mut frame, &mut background, tracking).unwrap().tracking;
        }

        let mut frame = RgbImage::new(96, 64);
        for y in 20..40 {
            for x in 30..50 {
                frame.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let detection = detector.detect(&mut frame, &mut background, tracking).unwrap();
        assert!(detection.activity);
        assert_eq!(detection.blobs.len(), 1);
        let (x, y) = (detection.x.unwrap(), detection.y.unwrap());
        assert!((x - 40.0).abs() < 1.0, "x = {}", x);
        assert!((y - 30.0).abs() < 1.0, "y = {}", y);
    }

    #[test]
    fn test_flow_only_activity_uses_mean_of_tracked_points() {
        let detector = FrameDetector::new(quiet_params());
        let mut background = ScriptedMask(GrayImage::new(64, 64));

        let previous = image::imageops::grayscale(&spot_frame(64, 64, 30.0, 30.0));
        let tracking = TrackingState {
            previous_gray: Some(previous),
            points: vec![(30.0, 30.0)],
        };
        let mut frame = spot_frame(64, 64, 31.0, 30.0);

        let detection = detector.detect(&mut frame, &mut background, tracking).unwrap();
        assert!(detection.blobs.is_empty());
        assert!(detection.activity);
        assert_eq!(detection.tracked_points.len(), 1);
        let x = detection.x.unwrap();
        assert!((x - 31.0).abs() < 0.5, "x = {}", x);
        // Tracked points become the next seeds
        assert_eq!(detection.tracking.points, detection.tracked_points);
    }

    #[test]
    fn test_blob_takes_precedence_over_flow() {
        let detector = FrameDetector::new(quiet_params());
        let mut background = ScriptedMask(square_mask(64, 64, 2, 2, 10));

        let previous = image::imageops::grayscale(&spot_frame(64, 64, 40.0, 40.0));
        let tracking = TrackingState {
            previous_gray: Some(previous),
            points: vec![(40.0, 40.0)],
        };
        let mut frame = spot_frame(64, 64, 40.0, 40.0);

        let detection = detector.detect(&mut frame, &mut background, tracking).unwrap();
        assert_eq!(detection.x, Some(7.0));
        assert_eq!(detection.y, Some(7.0));
        assert_eq!(detection.tracking.points, vec![(7.0, 7.0)]);
    }

    #[test]
    fn test_annotation_marks_frame() {
        let detector = FrameDetector::new(DetectorParams::default());
        let mut background = ScriptedMask(square_mask(80, 60, 20, 10, 16));
        let mut frame = RgbImage::new(80, 60);

        detector.detect(&mut frame, &mut background, TrackingState::default()).unwrap();
        assert_eq!(*frame.get_pixel(20, 18), crate::detect::annotate::BOX_COLOR);
        assert_eq!(*frame.get_pixel(28, 18), crate::detect::annotate::DOT_COLOR);
    }

    #[test]
    fn test_mask_size_mismatch_is_decode_error() {
        let detector = FrameDetector::new(quiet_params());
        let mut background = ScriptedMask(GrayImage::new(10, 10));
        let mut frame = RgbImage::new(20, 20);

        let result = detector.detect(&mut frame, &mut background, TrackingState::default());
        assert!(matches!(result, Err(HabitatError::Decode(_))));
    }
}
