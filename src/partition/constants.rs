pub const DEFAULT_THRESHOLD: usize = 1000;
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_IO_BUFFER_SIZE_KB: usize = 64;
pub const DEFAULT_INPUT_EXTENSION: &str = "txt";

pub const MIN_THRESHOLD: usize = 1;
pub const MIN_WORKER_COUNT: usize = 1;
pub const MAX_WORKER_COUNT: usize = 256;
pub const MIN_QUEUE_CAPACITY: usize = 1;
pub const MIN_MAX_DEPTH: usize = 1;
// Nested directory names grow by one character per level, so total path
// length is quadratic in depth. An all-ASCII path at this depth stays well
// under MAX_PATH_BYTES.
pub const MAX_MAX_DEPTH: usize = 80;
pub const MIN_IO_BUFFER_SIZE_KB: usize = 4;
pub const MAX_IO_BUFFER_SIZE_KB: usize = 16 * 1024;

pub const BYTES_PER_KB: usize = 1024;
pub const BYTES_PER_MB: usize = 1024 * 1024;

/// Character used to right-pad records shorter than the current depth.
pub const PAD_CHAR: char = ' ';
pub const LEAF_FILE_EXTENSION: &str = "txt";

// Byte limits for a single path component (NAME_MAX) and a whole path
// (PATH_MAX less its NUL terminator).
pub const MAX_NAME_BYTES: usize = 255;
pub const MAX_PATH_BYTES: usize = 4095;
pub const MAX_CHAR_BYTES: usize = 4;

// Warn when the input takes more than this share of available memory.
pub const MEMORY_WARNING_PERCENT: f64 = 50.0;

pub const POOL_PROGRESS_INTERVAL_MS: u64 = 5000;
