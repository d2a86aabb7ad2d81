// Database module

pub mod migrations;
pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use anyhow::Result;

use crate::camera::CameraId;
use crate::constants::{DB_FILENAME, HABITAT_FOLDER, PROCESSED_VIDEOS_FOLDER};

/// Open or create a database at the given path
pub fn open_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;

    // Several save threads write to the same file
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.busy_timeout(std::time::Duration::from_secs(30))?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Get the database path for a library root
pub fn get_db_path(library_root: &Path) -> PathBuf {
    library_root
        .join(HABITAT_FOLDER)
        .join(DB_FILENAME)
}

/// Folder holding encoded segments for one camera
pub fn get_processed_dir(library_root: &Path, camera: CameraId) -> PathBuf {
    library_root
        .join(PROCESSED_VIDEOS_FOLDER)
        .join(camera.output_folder())
}

/// Initialize library folder structure and the database
pub fn init_library_folders(library_root: &Path) -> Result<()> {
    std::fs::create_dir_all(library_root.join(HABITAT_FOLDER))?;
    for camera in CameraId::ALL {
        std::fs::create_dir_all(get_processed_dir(library_root, camera))?;
    }
    open_db(&get_db_path(library_root))?;

    Ok(())
}
