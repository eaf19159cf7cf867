use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use super::{parse_probe_output, MediaBackend, MediaCommandBuilder, ProbeResult, StreamCopy};
use crate::config::MediaConfig;
use crate::error::{ProcessorError, Result};

/// ffmpeg/ffprobe implementation of the media backend
pub struct FfmpegBackend {
    command_builder: MediaCommandBuilder,
}

impl FfmpegBackend {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(
            config.ffmpeg_path,
            config.ffprobe_path,
            config.probe_timeout_secs,
            config.copy_timeout_secs,
        );

        Self { command_builder }
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        let output = self
            .command_builder
            .probe(path)
            .run()
            .await
            .map_err(|e| ProcessorError::Probe(format!("{}: {}", path.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessorError::Probe(format!(
                "ffprobe failed on {} ({}): {}",
                path.display(),
                output.status,
                stderr.trim()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        debug!("Probe output for {}: {}", path.display(), json);
        parse_probe_output(&json)
    }

    async fn copy_streams(&self, input: &Path, job: StreamCopy, output: &Path) -> Result<()> {
        let command = match job {
            StreamCopy::AudioRemux { audio_index } => {
                self.command_builder.remux_audio(input, audio_index, output)
            }
            StreamCopy::Subtitle { subtitle_index } => {
                self.command_builder.extract_subtitle(input, subtitle_index, output)
            }
        };

        info!("{}: {} -> {}", command.description, input.display(), output.display());
        let result = command.execute().await?;
        debug!("ffmpeg stderr: {}", String::from_utf8_lossy(&result.stderr));
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        for command in self.command_builder.version_checks() {
            let output = command
                .run()
                .await
                .map_err(|e| ProcessorError::Config(format!("Media tool not found: {}", e)))?;
            if !output.status.success() {
                return Err(ProcessorError::Config(format!("{} failed", command.description)));
            }
        }

        info!("Media toolchain is available");
        Ok(())
    }

    async fn version_info(&self) -> Result<Vec<String>> {
        let mut versions = Vec::new();
        for command in self.command_builder.version_checks() {
            let output = command.execute().await?;
            let banner = String::from_utf8_lossy(&output.stdout);
            // First line carries the version
            versions.push(banner.lines().next().unwrap_or("Unknown version").to_string());
        }
        Ok(versions)
    }
}
