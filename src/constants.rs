// Habitat Cam Constants
// Pipeline defaults. PipelineConfig starts from these values.

pub const PIPELINE_VERSION: u32 = 1;

// Capture
pub const CAPTURE_FPS: u32 = 15;
pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;

// Buffering
pub const SEGMENT_BUFFER_CAPACITY: usize = 1_000_000; // effectively one segment per recording
pub const SAVE_QUEUE_CAPACITY: usize = 3;
pub const STOP_JOIN_TIMEOUT_SECS: u64 = 5;

// Concurrency
pub const WORKER_CPU_FRACTION: f64 = 0.75;

// Background model
pub const BACKGROUND_HISTORY: u32 = 100;
pub const BACKGROUND_VAR_THRESHOLD: f64 = 50.0;
pub const BACKGROUND_VAR_INIT: f64 = 225.0; // 15^2
pub const BACKGROUND_VAR_MIN: f64 = 4.0;
pub const BACKGROUND_VAR_MAX: f64 = 5.0 * BACKGROUND_VAR_INIT;

// Morphology
pub const MORPH_KERNEL_SIZE: u32 = 7;

// Blob clustering
pub const BLOB_DISTANCE_THRESHOLD: f64 = 400.0;

// Sparse optical flow
pub const FLOW_WINDOW_SIZE: u32 = 15;
pub const FLOW_MAX_LEVEL: u32 = 2;
pub const FLOW_MAX_ITERATIONS: u32 = 10;
pub const FLOW_EPSILON: f64 = 0.03;
pub const FLOW_MIN_EIGEN_THRESHOLD: f64 = 1e-4;

// Encoding
pub const ENCODE_CODEC: &str = "libx264";
pub const ENCODE_PRESET: &str = "ultrafast";
pub const ENCODE_CRF: u32 = 30;
pub const ENCODE_PIXEL_FORMAT: &str = "yuv420p";

// Paths
pub const HABITAT_FOLDER: &str = ".habitat";
pub const DB_FILENAME: &str = "habitat.db";
pub const PROCESSED_VIDEOS_FOLDER: &str = "processed_videos";
pub const CONFIG_FILENAME: &str = "config.json";

// Recording session layout
pub const RECORDING_EXTENSION: &str = "mp4";

// Timestamps are stored as naive local wall-clock strings
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// Job summary
pub const JOB_FINISHED_MESSAGE: &str = "All video processing finished";

// Processed segment filenames: <Camera>_<start>.mp4
pub const SEGMENT_FILENAME_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.3f";

// Tracking rows are grouped this many at a time into one second of activity
pub const ACTIVITY_ROWS_PER_SECOND: usize = CAPTURE_FPS as usize;

// Bytes of ffmpeg/ffprobe stderr kept for error messages
pub const STDERR_TAIL_BYTES: usize = 8 * 1024;
