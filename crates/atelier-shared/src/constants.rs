/// Maximum upload size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Simulated upload progress: percentage added per tick
pub const UPLOAD_PROGRESS_STEP: u8 = 10;

/// Simulated upload progress: tick interval in milliseconds
pub const UPLOAD_PROGRESS_TICK_MS: u64 = 100;

/// Simulated upload progress never passes this value before the write completes
pub const UPLOAD_PROGRESS_CEILING: u8 = 90;

/// Length of the last-message preview shown in conversation lists (chars)
pub const MESSAGE_PREVIEW_LEN: usize = 80;

/// Buffer size of the row-change broadcast channel
pub const REALTIME_CHANNEL_CAPACITY: usize = 256;

/// Number of wallet transactions returned with a wallet view
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 50;

/// `previous` restarts the current track instead of going back past this point
pub const PLAYER_RESTART_THRESHOLD_SECS: f64 = 3.0;
