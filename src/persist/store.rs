// Library-backed segment store
// Encoded file under processed_videos/<camera>/, rows in the library database.

use std::path::{Path, PathBuf};

use crate::constants::SEGMENT_FILENAME_TIME_FORMAT;
use crate::db::{self, schema};
use crate::error::{HabitatError, Result};
use crate::segment::Segment;

use super::{encode, SegmentSink};

#[derive(Debug, Clone)]
pub struct LibraryStore {
    library_root: PathBuf,
}

impl LibraryStore {
    pub fn new(library_root: &Path) -> Self {
        Self { library_root: library_root.to_path_buf() }
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// Output path for a segment, unique per camera and start time.
    pub fn segment_path(&self, segment: &Segment) -> PathBuf {
        let filename = format!(
            "{}_{}.mp4",
            segment.camera,
            segment.start_time.format(SEGMENT_FILENAME_TIME_FORMAT)
        );
        db::get_processed_dir(&self.library_root, segment.camera).join(filename)
    }

    fn record(&self, segment: &Segment, fps: u32, output_path: &Path) -> Result<i64> {
        let (width, height) = segment
            .frames
            .first()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0));

        let filename = output_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut conn = db::open_db(&db::get_db_path(&self.library_root))?;
        let tx = conn.transaction()?;
        let id = schema::insert_processed_video(&tx, &schema::NewProcessedVideo {
            filename,
            camera: segment.camera,
            filepath: output_path.to_string_lossy().to_string(),
            duration: segment.duration_secs(fps),
            frame_count: segment.len() as i64,
            resolution_width: width as i64,
            resolution_height: height as i64,
            start_time: segment.start_time,
        })?;
        schema::insert_tracking_records(&tx, &segment.observations)?;
        tx.commit()?;
        Ok(id)
    }
}

impl SegmentSink for LibraryStore {
    fn persist(&self, segment: &Segment, fps: u32) -> Result<PathBuf> {
        if segment.is_empty() {
            return Err(HabitatError::Persist("No frames to save".to_string()));
        }

        let output_path = self.segment_path(segment);
        encode::encode_segment(&segment.frames, fps, &output_path)
            .map_err(|e| HabitatError::Persist(format!("{}: {}", output_path.display(), e)))?;

        let id = self.record(segment, fps, &output_path)?;
        log::debug!(
            "[{}] Recorded video {} ({} tracking rows)",
            segment.camera, id, segment.observations.len()
        );

        Ok(output_path)
    }
}
