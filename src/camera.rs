// Camera identities for a recording session

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::HabitatError;

/// One of the three fixed enclosure cameras.
///
/// A recording session root holds one subfolder per camera, named by
/// [`CameraId::folder_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CameraId {
    Cam1,
    Cam2,
    Cam3,
}

impl CameraId {
    pub const ALL: [CameraId; 3] = [CameraId::Cam1, CameraId::Cam2, CameraId::Cam3];

    /// Folder name inside a recording session root, also the name stored in the db.
    pub fn folder_name(&self) -> &'static str {
        match self {
            CameraId::Cam1 => "Camera1",
            CameraId::Cam2 => "Camera2",
            CameraId::Cam3 => "Camera3",
        }
    }

    /// Lowercase folder used under processed_videos/
    pub fn output_folder(&self) -> &'static str {
        match self {
            CameraId::Cam1 => "camera1",
            CameraId::Cam2 => "camera2",
            CameraId::Cam3 => "camera3",
        }
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

impl FromStr for CameraId {
    type Err = HabitatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "camera1" | "cam1" | "1" => Ok(CameraId::Cam1),
            "camera2" | "cam2" | "2" => Ok(CameraId::Cam2),
            "camera3" | "cam3" | "3" => Ok(CameraId::Cam3),
            other => Err(HabitatError::Other(format!("Unknown camera: {}", other))),
        }
    }
}
