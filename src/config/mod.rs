use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the temporary avatar staging area
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Directory holding one file per staged upload (default: "./uploads/temp-avatars")
    pub staging_dir: PathBuf,

    /// How long a staged upload stays valid before auto-eviction (default: 3 minutes)
    pub ttl: Duration,

    /// How often the background reaper scans for expired uploads (default: 1 minute)
    pub sweep_interval: Duration,

    /// Maximum accepted avatar size in bytes (default: 5 MB)
    pub max_file_size: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("./uploads/temp-avatars"),
            ttl: Duration::from_secs(3 * 60),
            sweep_interval: Duration::from_secs(60),
            max_file_size: 5 * 1024 * 1024, // 5 MB
        }
    }
}

impl StagingConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            staging_dir: env::var("TEMP_AVATAR_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            ttl: env_secs("TEMP_AVATAR_TTL_SECS").unwrap_or(default.ttl),

            sweep_interval: env_secs("TEMP_AVATAR_SWEEP_INTERVAL_SECS")
                .unwrap_or(default.sweep_interval),

            max_file_size: env::var("MAX_AVATAR_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),
        }
    }

    /// Create config for local development (short TTL, fast reaper)
    pub fn development() -> Self {
        Self {
            staging_dir: env::temp_dir().join("avatar-staging"),
            ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Same as default, rooted at the given staging directory
    pub fn with_dir(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            ..Self::default()
        }
    }
}

/// Reads a positive number of seconds; zero and garbage fall back to the default.
fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
