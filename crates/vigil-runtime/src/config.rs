use std::path::PathBuf;
use std::time::Duration;
use vigil_core::{PolicyError, ScanConfig, SentryConfig, ThresholdPolicy};

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Built-in liveness profile name (default: bio-id).
    pub profile: String,
    /// Optional TOML policy file; overrides `profile` when set.
    pub profile_path: Option<PathBuf>,
    /// Liveness and motion polling period.
    pub poll_interval_ms: u64,
    /// Skin scan frame period.
    pub scan_interval_ms: u64,
    /// Frames averaged per skin scan.
    pub scan_frames: u32,
    /// Per-axis acceleration delta that triggers the alarm.
    pub motion_threshold: f32,
    /// Arming countdown in seconds.
    pub arming_secs: u32,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            profile: std::env::var("VIGIL_PROFILE")
                .unwrap_or_else(|_| vigil_core::profiles::DEFAULT_PROFILE.to_string()),
            profile_path: std::env::var("VIGIL_PROFILE_PATH").ok().map(PathBuf::from),
            poll_interval_ms: env_u64("VIGIL_POLL_INTERVAL_MS", 100).max(1),
            scan_interval_ms: env_u64("VIGIL_SCAN_INTERVAL_MS", 200).max(1),
            scan_frames: env_u32("VIGIL_SCAN_FRAMES", 10).max(1),
            motion_threshold: env_f32("VIGIL_MOTION_THRESHOLD", 2.5),
            arming_secs: env_u32("VIGIL_ARMING_SECS", 3),
        }
    }

    /// Resolve the liveness policy: file if configured, else built-in profile.
    pub fn load_policy(&self) -> Result<ThresholdPolicy, PolicyError> {
        match &self.profile_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading policy file");
                ThresholdPolicy::from_file(path)
            }
            None => vigil_core::profiles::load_profile(&self.profile),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn sentry_config(&self) -> SentryConfig {
        SentryConfig {
            threshold: self.motion_threshold,
            arming_secs: self.arming_secs,
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            frames: self.scan_frames,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parsing_falls_back_on_garbage() {
        std::env::set_var("VIGIL_TEST_GARBAGE_U64", "soon");
        assert_eq!(env_u64("VIGIL_TEST_GARBAGE_U64", 100), 100);
        std::env::set_var("VIGIL_TEST_NAN_F32", "NaN");
        assert_eq!(env_f32("VIGIL_TEST_NAN_F32", 2.5), 2.5);
        std::env::set_var("VIGIL_TEST_VALID_U32", "7");
        assert_eq!(env_u32("VIGIL_TEST_VALID_U32", 3), 7);
    }

    #[test]
    fn test_default_policy_resolves() {
        let config = Config {
            profile: "bio-id".into(),
            profile_path: None,
            poll_interval_ms: 100,
            scan_interval_ms: 200,
            scan_frames: 10,
            motion_threshold: 2.5,
            arming_secs: 3,
        };
        let policy = config.load_policy().unwrap();
        assert_eq!(policy.name, "bio-id");
        assert_eq!(config.sentry_config(), SentryConfig::default());
        assert_eq!(config.scan_config(), ScanConfig::default());
    }
}
