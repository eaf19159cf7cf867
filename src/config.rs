use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ProcessorError, Result};

/// Application directory name under the per-user config location
pub const APP_DIR_NAME: &str = "mkv-processor";

/// Environment variable that overrides the persisted remote token
pub const TOKEN_ENV_VAR: &str = "MKV_PROCESSOR_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub processing: ProcessingConfig,
    pub media: MediaConfig,
    pub scratch: ScratchConfig,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Preferred language code (ISO 639-2, as tagged in the container)
    pub target_language: String,
    /// Folder receiving remuxes that keep the target-language audio
    pub dubbed_folder: String,
    /// Folder receiving remuxes that keep the original/foreign audio
    pub original_folder: String,
    /// Folder receiving extracted subtitles
    pub subtitle_dir: String,
    /// Folder holding the processed ledger and run snapshots
    pub log_dir: String,
    /// Input file extensions (case-insensitive)
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Probe time limit in seconds (0 = unlimited)
    pub probe_timeout_secs: u64,
    /// Stream copy/extract time limit in seconds (0 = unlimited)
    pub copy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Use fast scratch locations at all
    pub enabled: bool,
    /// Candidate locations in priority order; empty selects platform defaults
    pub candidates: Vec<PathBuf>,
    /// Required scratch space for an audio remux, as a multiple of the source size
    pub audio_space_factor: u64,
    /// Required scratch space for a subtitle extraction
    pub subtitle_min_bytes: u64,
}

/// Persisted remote mirror settings; see [`crate::sync::SyncConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub token: String,
    /// `owner/name`
    pub repo: String,
    pub branch: String,
    /// Remote JSON ledger path; empty means `<logs_dir>/processed.json`
    pub log_path: String,
    pub subtitle_dir: String,
    pub logs_dir: String,
    /// Remote legacy pipe-delimited log, converted on first sight
    pub legacy_log_path: String,
    pub api_base: String,
    pub auto_upload: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target_language: "vie".to_string(),
            dubbed_folder: "Lồng Tiếng - Thuyết Minh".to_string(),
            original_folder: "Original".to_string(),
            subtitle_dir: "Subtitles".to_string(),
            log_dir: "logs".to_string(),
            extensions: vec!["mkv".to_string()],
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            probe_timeout_secs: 120,
            copy_timeout_secs: 4 * 60 * 60,
        }
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            candidates: Vec::new(),
            audio_space_factor: 2,
            subtitle_min_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            log_path: String::new(),
            subtitle_dir: "subtitles".to_string(),
            logs_dir: "logs".to_string(),
            legacy_log_path: "Subtitles/processed_files.log".to_string(),
            api_base: "https://api.github.com".to_string(),
            auto_upload: false,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProcessorError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ProcessorError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProcessorError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| ProcessorError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Per-user application directory (config file, log files)
    pub fn app_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| ProcessorError::Config("Cannot determine user config directory".to_string()))
    }

    pub fn user_config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.toml"))
    }

    /// Load settings once for a run.
    ///
    /// An explicit path must parse. The per-user file falls back to defaults
    /// when absent or unreadable.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::user_config_path()?;
                if path.exists() {
                    info!("Loading settings from {}", path.display());
                    Self::from_file(&path).unwrap_or_else(|e| {
                        warn!("Ignoring unreadable settings {}: {}", path.display(), e);
                        Self::default()
                    })
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                config.sync.token = token;
            }
        }

        Ok(config)
    }

    /// Delete the per-user settings file; returns whether one existed
    pub fn reset() -> Result<bool> {
        let path = Self::user_config_path()?;
        if path.exists() {
            std::fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Copy safe for display: the token is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.sync.token.is_empty() {
            copy.sync.token = "********".to_string();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("config.toml");
        file.write_str("[processing]\ntarget_language = \"eng\"\n\n[sync]\nrepo = \"me/subs\"\n")
            .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.processing.target_language, "eng");
        assert_eq!(config.processing.original_folder, "Original");
        assert_eq!(config.sync.repo, "me/subs");
        assert_eq!(config.sync.branch, "main");
        assert!(config.scratch.enabled);
        assert_eq!(config.media.probe_timeout_secs, 120);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.sync.auto_upload = true;
        config.scratch.candidates = vec![PathBuf::from("/dev/shm")];
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(loaded.sync.auto_upload);
        assert_eq!(loaded.scratch.candidates, vec![PathBuf::from("/dev/shm")]);
        assert_eq!(loaded.processing.dubbed_folder, "Lồng Tiếng - Thuyết Minh");
    }

    #[test]
    fn test_explicit_unreadable_file_is_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("broken.toml");
        file.write_str("[processing\n").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(ProcessorError::Config(_))));
    }

    #[test]
    fn test_redacted_masks_token() {
        let mut config = Config::default();
        config.sync.token = "ghp_secret".to_string();
        assert_eq!(config.redacted().sync.token, "********");
        assert_eq!(config.sync.token, "ghp_secret");
    }
}
