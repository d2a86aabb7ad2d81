// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- One row per encoded segment
    CREATE TABLE processed_videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        camera TEXT NOT NULL CHECK (camera IN ('Camera1', 'Camera2', 'Camera3')),
        filepath TEXT NOT NULL UNIQUE,
        duration REAL NOT NULL,
        frame_count INTEGER NOT NULL,
        resolution_width INTEGER NOT NULL,
        resolution_height INTEGER NOT NULL,
        start_time TEXT NOT NULL,
        pipeline_version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- One row per captured frame
    CREATE TABLE motion_tracking (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        is_active INTEGER NOT NULL,
        coordinate_x REAL,
        coordinate_y REAL,
        camera TEXT NOT NULL CHECK (camera IN ('Camera1', 'Camera2', 'Camera3'))
    );

    CREATE INDEX idx_processed_videos_camera_start ON processed_videos(camera, start_time);
    CREATE INDEX idx_motion_tracking_timestamp ON motion_tracking(timestamp);
    CREATE INDEX idx_motion_tracking_camera_timestamp ON motion_tracking(camera, timestamp);
    "#,
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row(
        "PRAGMA user_version",
        [],
        |row| row.get(0)
    )?;
    Ok(version)
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    // Refuse to open a DB created by a newer build
    if current_version > target_version {
        anyhow::bail!(
            "Database schema version {} is newer than this build supports (max {})",
            current_version,
            target_version
        );
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        // Schema change and version bump commit together
        let batch = format!(
            "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration, migration_version
        );
        if let Err(e) = conn.execute_batch(&batch) {
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(e.into());
        }

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}
