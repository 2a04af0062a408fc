// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8889;
pub const WS_PATH: &str = "ws";

// Inbound frames larger than this are rejected before parsing
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

// Admin sessions older than this report check = -1
pub const DEFAULT_SESSION_TTL_SECS: u64 = 720;

// Class handles
pub const HANDLE_LENGTH: usize = 8;

// Upper bound on the groups requested when a class is created
pub const MAX_GROUPS: u32 = 100;

// Username the instructor console uses for XML edits
pub const ADMIN_USERNAME: &str = "admin";
// Username reported in admin-originated notices
pub const ADMIN_DISPLAY_NAME: &str = "Admin";
