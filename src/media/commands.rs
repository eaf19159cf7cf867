use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ProcessorError, Result};

/// Abstract media tool invocation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    /// `None` lets the tool run until it exits on its own
    pub timeout: Option<Duration>,
}

impl MediaCommand {
    /// Create a new media tool command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            timeout: None,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Bound the run time; zero means no limit
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Select streams of the first input (`0:v`, `0:3`, ...)
    pub fn map<S: AsRef<str>>(self, selector: S) -> Self {
        self.arg("-map").arg(format!("0:{}", selector.as_ref()))
    }

    /// Copy every mapped stream without re-encoding
    pub fn copy_all(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Set subtitle codec
    pub fn subtitle_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:s").arg(codec)
    }

    /// Keep ffmpeg quiet and non-interactive
    pub fn batch_mode(self) -> Self {
        self.arg("-hide_banner").arg("-nostdin")
    }

    /// Run the command and return its raw output, whatever the exit status
    pub async fn run(&self) -> Result<Output> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args).kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ProcessorError::Timeout {
                    description: self.description.clone(),
                    secs: limit.as_secs(),
                })?,
            None => cmd.output().await,
        };

        output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessorError::FileNotFound(format!("{} ({})", self.binary_path, self.description))
            } else {
                ProcessorError::Io(e)
            }
        })
    }

    /// Run the command, treating a non-zero exit as an extraction failure
    pub async fn execute(&self) -> Result<Output> {
        let output = self.run().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessorError::Extraction(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }
}

/// Builder for the ffmpeg/ffprobe invocations the pipeline needs
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    ffmpeg_path: String,
    ffprobe_path: String,
    probe_timeout_secs: u64,
    copy_timeout_secs: u64,
}

impl MediaCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        ffmpeg_path: S1,
        ffprobe_path: S2,
        probe_timeout_secs: u64,
        copy_timeout_secs: u64,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            probe_timeout_secs,
            copy_timeout_secs,
        }
    }

    /// Build the stream probe command (JSON on stdout)
    pub fn probe<P: AsRef<Path>>(&self, input_path: P) -> MediaCommand {
        MediaCommand::new(&self.ffprobe_path, "Stream probe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .output(input_path)
            .timeout_secs(self.probe_timeout_secs)
    }

    /// Build the video + one audio track remux command
    pub fn remux_audio<P: AsRef<Path>>(&self, input_path: P, audio_index: u32, output_path: P) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Audio remux")
            .batch_mode()
            .input(input_path)
            .map("v")
            .map(audio_index.to_string())
            .copy_all()
            .overwrite()
            .output(output_path)
            .timeout_secs(self.copy_timeout_secs)
    }

    /// Build the single subtitle stream extraction command
    pub fn extract_subtitle<P: AsRef<Path>>(&self, input_path: P, subtitle_index: u32, output_path: P) -> MediaCommand {
        MediaCommand::new(&self.ffmpeg_path, "Subtitle extraction")
            .batch_mode()
            .input(input_path)
            .map(subtitle_index.to_string())
            .subtitle_codec("srt")
            .overwrite()
            .output(output_path)
            .timeout_secs(self.copy_timeout_secs)
    }

    /// Build version check commands for both tools
    pub fn version_checks(&self) -> [MediaCommand; 2] {
        [
            MediaCommand::new(&self.ffmpeg_path, "ffmpeg version check")
                .arg("-version")
                .timeout_secs(self.probe_timeout_secs),
            MediaCommand::new(&self.ffprobe_path, "ffprobe version check")
                .arg("-version")
                .timeout_secs(self.probe_timeout_secs),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> MediaCommandBuilder {
        MediaCommandBuilder::new("ffmpeg", "ffprobe", 120, 0)
    }

    #[test]
    fn test_remux_audio_maps_video_and_one_audio() {
        let cmd = builder().remux_audio("/in/a.mkv", 3, "/out/b.mkv");
        assert_eq!(
            cmd.args,
            vec![
                "-hide_banner", "-nostdin", "-i", "/in/a.mkv", "-map", "0:v", "-map", "0:3", "-c", "copy",
                "-y", "/out/b.mkv"
            ]
        );
        assert_eq!(cmd.timeout, None);
    }

    #[test]
    fn test_extract_subtitle_uses_srt_codec() {
        let cmd = builder().extract_subtitle("/in/a.mkv", 5, "/subs/a.vie.srt");
        assert!(cmd.args.windows(2).any(|w| w == ["-map", "0:5"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-c:s", "srt"]));
        assert_eq!(cmd.args.last().map(String::as_str), Some("/subs/a.vie.srt"));
    }

    #[test]
    fn test_probe_command_has_timeout() {
        let cmd = builder().probe("/in/a.mkv");
        assert_eq!(cmd.binary_path, "ffprobe");
        assert_eq!(cmd.timeout, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let cmd = MediaCommand::new("definitely-not-a-real-binary-42", "Missing tool");
        let err = cmd.run().await.unwrap_err();
        assert!(matches!(err, ProcessorError::FileNotFound(_)));
    }
}
