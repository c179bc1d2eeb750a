use rollcall_core::asset::{self, AssetSpec};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Recognition service endpoint that receives capture batches.
    pub upload_url: String,
    /// Timeout in seconds for one upload request.
    pub upload_timeout_secs: u64,
    /// V4L2 device path for the preferred (rear-facing) camera.
    pub camera_device: String,
    /// Preferred capture width.
    pub capture_width: u32,
    /// Preferred capture height.
    pub capture_height: u32,
    /// JPEG quality for captured stills (1–100).
    pub jpeg_quality: u8,
    /// Pause between overlay detection passes, in milliseconds.
    pub frame_interval_ms: u64,
    /// Seconds an upload outcome message stays visible.
    pub status_clear_secs: u64,
    /// Where to fetch the face classifier from.
    pub cascade_url: String,
    /// Expected SHA-256 of the classifier file, if pinned.
    pub cascade_sha256: Option<String>,
    /// Local cache directory for model assets.
    pub asset_dir: PathBuf,
    /// Upper bound on resolving and loading the classifier.
    pub asset_timeout_secs: u64,
    /// Roster TOML to load instead of the embedded sample roster.
    pub roster_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let asset_dir = std::env::var("ROLLCALL_ASSET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| asset::default_asset_dir());

        Self {
            upload_url: std::env::var("ROLLCALL_UPLOAD_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5000/upload".to_string()),
            upload_timeout_secs: env_u64("ROLLCALL_UPLOAD_TIMEOUT_SECS", 30),
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            capture_width: env_u32("ROLLCALL_CAPTURE_WIDTH", 1280),
            capture_height: env_u32("ROLLCALL_CAPTURE_HEIGHT", 720),
            jpeg_quality: env_u32("ROLLCALL_JPEG_QUALITY", 90).clamp(1, 100) as u8,
            frame_interval_ms: env_u64("ROLLCALL_FRAME_INTERVAL_MS", 33),
            status_clear_secs: env_u64("ROLLCALL_STATUS_CLEAR_SECS", 4),
            cascade_url: std::env::var("ROLLCALL_CASCADE_URL")
                .unwrap_or_else(|_| asset::DEFAULT_CASCADE_URL.to_string()),
            cascade_sha256: std::env::var("ROLLCALL_CASCADE_SHA256")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            asset_dir,
            asset_timeout_secs: env_u64("ROLLCALL_ASSET_TIMEOUT_SECS", 20),
            roster_path: std::env::var("ROLLCALL_ROSTER_PATH").ok().map(PathBuf::from),
        }
    }

    pub fn cascade_asset(&self) -> AssetSpec {
        AssetSpec::from_url(self.cascade_url.clone(), self.cascade_sha256.clone())
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_timeout_secs)
    }

    pub fn status_clear_after(&self) -> Duration {
        Duration::from_secs(self.status_clear_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
