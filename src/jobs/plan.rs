// Work unit derivation
//
// A recording session root holds Camera1/, Camera2/, Camera3/. Files are paired
// across cameras by sorted position; the file at index i of every camera starts at
// nominal_start + i * reference_duration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use walkdir::WalkDir;

use crate::camera::CameraId;
use crate::constants::RECORDING_EXTENSION;
use crate::error::{HabitatError, Result};
use crate::metadata::{has_extension, MediaProbe};

use super::{RecordingJob, WorkUnit};

/// Recordings directly inside `dir`, sorted by file name.
/// A missing directory yields an empty list.
pub fn discover_camera_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| HabitatError::Io(e.into()))?;
        if entry.file_type().is_file() && has_extension(entry.path(), RECORDING_EXTENSION) {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Duration offset of `index` files of `secs` each.
fn offset_for(index: usize, secs: f64) -> Duration {
    Duration::microseconds((index as f64 * secs * 1_000_000.0).round() as i64)
}

/// Derive every work unit of a job, ordered by file index then camera.
pub fn build_work_units(job: &RecordingJob, probe: &dyn MediaProbe) -> Result<Vec<WorkUnit>> {
    if !job.root_path.is_dir() {
        return Err(HabitatError::InvalidJob(format!(
            "{} is not a directory",
            job.root_path.display()
        )));
    }

    let mut per_camera: BTreeMap<CameraId, Vec<PathBuf>> = BTreeMap::new();
    for camera in CameraId::ALL {
        let dir = job.root_path.join(camera.folder_name());
        let files = discover_camera_files(&dir)?;
        if files.is_empty() {
            log::warn!("No recordings for {} in {}, skipping camera", camera, dir.display());
            continue;
        }
        per_camera.insert(camera, files);
    }

    let mut counts = per_camera.iter().map(|(c, f)| (*c, f.len()));
    let Some((reference_camera, expected)) = counts.next() else {
        log::warn!("No recordings found under {}", job.root_path.display());
        return Ok(Vec::new());
    };
    if let Some((camera, count)) = counts.find(|(_, n)| *n != expected) {
        return Err(HabitatError::CameraFileMismatch(format!(
            "{} has {} files, {} has {}",
            reference_camera, expected, camera, count
        )));
    }

    // Probe the first file of every camera; the first camera with files is the reference
    let mut reference_secs = None;
    for (camera, files) in &per_camera {
        match probe.duration_secs(&files[0]) {
            Ok(secs) => match reference_secs {
                None => {
                    log::info!("{} reference duration {:.3}s", camera, secs);
                    reference_secs = Some(secs);
                }
                Some(reference) if (secs - reference).abs() > 0.5 => log::warn!(
                    "{} first file lasts {:.3}s, reference is {:.3}s; using reference",
                    camera, secs, reference
                ),
                Some(_) => {}
            },
            Err(e) if *camera == reference_camera => return Err(e),
            Err(e) => log::warn!("Could not probe {}: {}", files[0].display(), e),
        }
    }
    let reference_secs = reference_secs.unwrap_or(0.0);

    let mut units = Vec::with_capacity(expected * per_camera.len());
    for index in 0..expected {
        let real_start = job.nominal_start + offset_for(index, reference_secs);
        for (camera, files) in &per_camera {
            units.push(WorkUnit {
                video_path: files[index].clone(),
                real_start,
                camera: *camera,
            });
        }
    }

    log::info!(
        "Derived {} work units from {} cameras under {}",
        units.len(), per_camera.len(), job.root_path.display()
    );
    Ok(units)
}
