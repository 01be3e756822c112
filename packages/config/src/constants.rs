// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Runbox

// Resource Profile Configuration
pub const RUNBOX_MEMORY_LIMIT_MB: &str = "RUNBOX_MEMORY_LIMIT_MB";
pub const RUNBOX_CPU_CORES: &str = "RUNBOX_CPU_CORES";
pub const RUNBOX_PID_LIMIT: &str = "RUNBOX_PID_LIMIT";
pub const RUNBOX_TIMEOUT_SECS: &str = "RUNBOX_TIMEOUT_SECS";
pub const RUNBOX_NETWORK_MODE: &str = "RUNBOX_NETWORK_MODE";
pub const RUNBOX_FILESYSTEM_MODE: &str = "RUNBOX_FILESYSTEM_MODE";

// Execution Environment Configuration
pub const RUNBOX_IMAGE: &str = "RUNBOX_IMAGE";
pub const RUNBOX_OUTPUT_CAP_BYTES: &str = "RUNBOX_OUTPUT_CAP_BYTES";
pub const RUNBOX_SCRATCH_SIZE_MB: &str = "RUNBOX_SCRATCH_SIZE_MB";
