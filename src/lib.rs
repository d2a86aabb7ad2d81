// Habitat Cam - Library Entry Point
//
// Offline motion tracking for multi-camera enclosure footage: each recording
// is decoded, run through a per-frame detector, buffered into segments and
// persisted as annotated video plus per-frame tracking rows.

pub mod constants;
pub mod error;
pub mod tools;
pub mod config;
pub mod camera;
pub mod metadata;
pub mod detect;
pub mod video;
pub mod segment;
pub mod persist;
pub mod processor;
pub mod jobs;
pub mod db;

pub use error::{HabitatError, Result};
