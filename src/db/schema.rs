// Database schema types and query helpers

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::camera::CameraId;
use crate::constants::{ACTIVITY_ROWS_PER_SECOND, PIPELINE_VERSION, TIMESTAMP_FORMAT};
use crate::error::Result;
use crate::segment::FrameObservation;

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn camera_column(row: &Row, idx: usize) -> rusqlite::Result<CameraId> {
    let raw: String = row.get(idx)?;
    raw.parse::<CameraId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ----- Processed videos -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedVideo {
    pub id: i64,
    pub filename: String,
    pub camera: CameraId,
    pub filepath: String,
    pub duration: f64,
    pub frame_count: i64,
    pub resolution_width: i64,
    pub resolution_height: i64,
    pub start_time: NaiveDateTime,
    pub created_at: String,
}

impl ProcessedVideo {
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + Duration::microseconds((self.duration * 1_000_000.0).round() as i64)
    }

    /// Overlap test, inclusive at both ends.
    pub fn overlaps(&self, start: &NaiveDateTime, end: &NaiveDateTime) -> bool {
        self.end_time() >= *start && self.start_time <= *end
    }
}

#[derive(Debug, Clone)]
pub struct NewProcessedVideo {
    pub filename: String,
    pub camera: CameraId,
    pub filepath: String,
    pub duration: f64,
    pub frame_count: i64,
    pub resolution_width: i64,
    pub resolution_height: i64,
    pub start_time: NaiveDateTime,
}

const VIDEO_COLUMNS: &str = "id, filename, camera, filepath, duration, frame_count,
    resolution_width, resolution_height, start_time, created_at";

fn video_from_row(row: &Row) -> rusqlite::Result<ProcessedVideo> {
    Ok(ProcessedVideo {
        id: row.get(0)?,
        filename: row.get(1)?,
        camera: camera_column(row, 2)?,
        filepath: row.get(3)?,
        duration: row.get(4)?,
        frame_count: row.get(5)?,
        resolution_width: row.get(6)?,
        resolution_height: row.get(7)?,
        start_time: timestamp_column(row, 8)?,
        created_at: row.get(9)?,
    })
}

pub fn insert_processed_video(conn: &Connection, video: &NewProcessedVideo) -> Result<i64> {
    conn.execute(
        "INSERT INTO processed_videos (filename, camera, filepath, duration, frame_count,
            resolution_width, resolution_height, start_time, pipeline_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            video.filename,
            video.camera.folder_name(),
            video.filepath,
            video.duration,
            video.frame_count,
            video.resolution_width,
            video.resolution_height,
            format_timestamp(&video.start_time),
            PIPELINE_VERSION,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_processed_video(conn: &Connection, id: i64) -> Result<Option<ProcessedVideo>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM processed_videos WHERE id = ?1", VIDEO_COLUMNS),
        params![id],
        video_from_row,
    ).optional()?;
    Ok(result)
}

/// All stored segments, oldest first, optionally for one camera.
pub fn list_processed_videos(conn: &Connection, camera: Option<CameraId>) -> Result<Vec<ProcessedVideo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM processed_videos
         WHERE ?1 IS NULL OR camera = ?1
         ORDER BY start_time, camera",
        VIDEO_COLUMNS
    ))?;
    let rows = stmt.query_map(params![camera.map(|c| c.folder_name())], video_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Videos of one camera overlapping a time range, with the first and last
/// of the selection called out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoSelection {
    pub first: Option<ProcessedVideo>,
    pub last: Option<ProcessedVideo>,
    pub selected: Vec<ProcessedVideo>,
}

pub fn find_videos_in_range(
    conn: &Connection,
    camera: CameraId,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> Result<VideoSelection> {
    let selected: Vec<ProcessedVideo> = list_processed_videos(conn, Some(camera))?
        .into_iter()
        .filter(|v| v.overlaps(start, end))
        .collect();

    Ok(VideoSelection {
        first: selected.first().cloned(),
        last: selected.last().cloned(),
        selected,
    })
}

// ----- Motion tracking -----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub is_active: bool,
    pub coordinate_x: Option<f64>,
    pub coordinate_y: Option<f64>,
    pub camera: CameraId,
}

/// Insert one row per observation. Callers wrap this in a transaction.
pub fn insert_tracking_records(conn: &Connection, observations: &[FrameObservation]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO motion_tracking (timestamp, is_active, coordinate_x, coordinate_y, camera)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for obs in observations {
        stmt.execute(params![
            format_timestamp(&obs.timestamp),
            obs.is_active,
            obs.x,
            obs.y,
            obs.camera.folder_name(),
        ])?;
    }
    Ok(observations.len())
}

pub fn tracking_in_range(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> Result<Vec<TrackingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, timestamp, is_active, coordinate_x, coordinate_y, camera
         FROM motion_tracking
         WHERE timestamp >= ?1 AND timestamp <= ?2
         ORDER BY camera, timestamp, id",
    )?;
    let rows = stmt.query_map(
        params![format_timestamp(start), format_timestamp(end)],
        |row| {
            Ok(TrackingRecord {
                id: row.get(0)?,
                timestamp: timestamp_column(row, 1)?,
                is_active: row.get(2)?,
                coordinate_x: row.get(3)?,
                coordinate_y: row.get(4)?,
                camera: camera_column(row, 5)?,
            })
        },
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// One flag per second of footage: true when any camera saw activity in that
/// second. Each camera's rows are grouped in consecutive runs of one second's
/// worth of frames; a camera with fewer rows simply stops contributing.
pub fn activity_by_second(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> Result<Vec<bool>> {
    let mut per_camera: BTreeMap<CameraId, Vec<bool>> = BTreeMap::new();
    for record in tracking_in_range(conn, start, end)? {
        per_camera.entry(record.camera).or_default().push(record.is_active);
    }

    let seconds = per_camera
        .values()
        .map(|rows| rows.len().div_ceil(ACTIVITY_ROWS_PER_SECOND))
        .max()
        .unwrap_or(0);

    let mut activity = vec![false; seconds];
    for rows in per_camera.values() {
        for (second, chunk) in rows.chunks(ACTIVITY_ROWS_PER_SECOND).enumerate() {
            if chunk.iter().any(|&active| active) {
                activity[second] = true;
            }
        }
    }
    Ok(activity)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Per-frame coordinates for every camera in a time range, in time order.
/// Every camera gets an entry, possibly empty.
pub fn coordinates_in_range(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> Result<BTreeMap<CameraId, Vec<Coordinate>>> {
    let mut coords: BTreeMap<CameraId, Vec<Coordinate>> =
        CameraId::ALL.iter().map(|c| (*c, Vec::new())).collect();
    for record in tracking_in_range(conn, start, end)? {
        coords.entry(record.camera).or_default().push(Coordinate {
            x: record.coordinate_x,
            y: record.coordinate_y,
        });
    }
    Ok(coords)
}
