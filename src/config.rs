//! Application configuration
//!
//! Loaded once at startup from a JSON file (path in `OPEN_CAPTURE_CONFIG`),
//! falling back to defaults for anything the file leaves out.

use crate::capture::synthetic::SyntheticConfig;
use crate::capture::CaptureRequest;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "OPEN_CAPTURE_CONFIG";

// =============================================================================
// Recording
// =============================================================================

/// The artifact container is fixed by the chunk producer, so it is not a
/// setting; unknown keys are rejected rather than silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RecordingSettings {
    /// How often the recorder receives a chunk, in milliseconds
    pub timeslice_ms: u64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { timeslice_ms: 100 }
    }
}

// =============================================================================
// Photo
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoCompression {
    Fast,
    #[default]
    Default,
    Best,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoSettings {
    pub compression: PhotoCompression,
}

// =============================================================================
// Backend
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Software test-pattern camera and microphone
    #[default]
    Synthetic,
    /// Platform devices (requires the `native` feature)
    Native,
}

// =============================================================================
// App
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Media requested from the device at startup
    pub capture: CaptureRequest,

    pub recording: RecordingSettings,

    pub photo: PhotoSettings,

    pub backend: BackendKind,

    pub synthetic: SyntheticConfig,

    /// How long to wait for the preview's first frame
    pub preview_ready_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureRequest::environment_camera(),
            recording: RecordingSettings::default(),
            photo: PhotoSettings::default(),
            backend: BackendKind::default(),
            synthetic: SyntheticConfig::default(),
            preview_ready_timeout_ms: 5000,
        }
    }
}

impl AppConfig {
    /// Read and validate a config file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from `OPEN_CAPTURE_CONFIG` when set, defaults otherwise
    pub fn from_env() -> AppResult<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        self.capture
            .validate()
            .map_err(|e| AppError::Config(format!("capture: {e}")))?;

        if self.recording.timeslice_ms == 0 {
            return Err(AppError::Config(
                "recording.timesliceMs must be positive".to_string(),
            ));
        }

        if self.preview_ready_timeout_ms == 0 {
            return Err(AppError::Config(
                "previewReadyTimeoutMs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FacingMode;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_request_rear_camera_and_mic() {
        let config = AppConfig::default();
        assert!(config.capture.wants_audio());
        assert_eq!(
            config.capture.video.facing_mode(),
            Some(FacingMode::Environment)
        );
        assert_eq!(config.recording.timeslice_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.json");
        fs::write(
            &path,
            r#"{
                "capture": {"audio": false, "video": {"facingMode": "user"}},
                "recording": {"timesliceMs": 250},
                "synthetic": {"width": 320, "height": 240}
            }"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert!(!config.capture.wants_audio());
        assert_eq!(config.capture.video.facing_mode(), Some(FacingMode::User));
        assert_eq!(config.recording.timeslice_ms, 250);
        assert_eq!(config.synthetic.width, 320);
        assert_eq!(config.synthetic.fps, 30);
        assert_eq!(config.backend, BackendKind::Synthetic);
    }

    #[test]
    fn test_invalid_files_rejected() {
        let dir = tempdir().unwrap();

        let zero_timeslice = dir.path().join("zero.json");
        fs::write(&zero_timeslice, r#"{"recording": {"timesliceMs": 0}}"#).unwrap();
        assert!(matches!(
            AppConfig::load(&zero_timeslice),
            Err(AppError::Config(_))
        ));

        let no_media = dir.path().join("none.json");
        fs::write(&no_media, r#"{"capture": {"audio": false, "video": false}}"#).unwrap();
        assert!(matches!(AppConfig::load(&no_media), Err(AppError::Config(_))));

        let container = dir.path().join("container.json");
        fs::write(&container, r#"{"recording": {"mimeType": "video/mp4"}}"#).unwrap();
        assert!(matches!(
            AppConfig::load(&container),
            Err(AppError::Serialization(_))
        ));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            AppConfig::load(&garbage),
            Err(AppError::Serialization(_))
        ));
    }
}
