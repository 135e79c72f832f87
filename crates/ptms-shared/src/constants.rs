/// Placeholder prefix used when a chat sender's display name is unknown
pub const UNKNOWN_USER_PREFIX: &str = "User #";

/// Default cache freshness threshold in hours
pub const DEFAULT_CACHE_FRESHNESS_HOURS: i64 = 24;

/// Idle window after the last keystroke before `typing=false` is sent
pub const DEFAULT_TYPING_IDLE_SECS: u64 = 3;

/// Chat heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// Missed heartbeat intervals tolerated before the link is considered dead
pub const HEARTBEAT_MISS_LIMIT: u32 = 3;

/// Reconnection policy defaults
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

/// Close code reported when the heartbeat watchdog drops the link
pub const CLOSE_CODE_HEARTBEAT_TIMEOUT: u16 = 4000;

/// Close code reported for abnormal closure (no close frame)
pub const CLOSE_CODE_ABNORMAL: u16 = 1006;

/// Close code used for a client-initiated disconnect
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Path appended to the derived chat gateway URL
pub const CHAT_GATEWAY_PATH: &str = "/ws/chat";

/// HTTP request timeout in seconds
pub const HTTP_TIMEOUT_SECS: u64 = 30;
