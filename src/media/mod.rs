// Media tool abstraction
//
// - Commands: ffmpeg/ffprobe command builders
// - Probe: ffprobe JSON interpretation
// - Processor: ffmpeg-backed implementation of MediaBackend

pub mod commands;
pub mod probe;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use probe::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Which streams a copy job keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCopy {
    /// Video stream(s) plus exactly one audio stream, stream copied
    AudioRemux { audio_index: u32 },
    /// Exactly one subtitle stream written as a standalone subtitle file
    Subtitle { subtitle_index: u32 },
}

/// Operations the pipeline needs from the external media toolchain
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Enumerate container streams and tags
    async fn probe(&self, path: &Path) -> Result<ProbeResult>;

    /// Run one stream copy/extract job writing `output`
    async fn copy_streams(&self, input: &Path, job: StreamCopy, output: &Path) -> Result<()>;

    /// Check that the toolchain can be executed
    async fn check_availability(&self) -> Result<()>;

    /// First line of each tool's version banner
    async fn version_info(&self) -> Result<Vec<String>>;
}

/// Factory for media backend instances
pub struct MediaBackendFactory;

impl MediaBackendFactory {
    /// Create the default (ffmpeg-based) backend
    pub fn create_backend(config: &MediaConfig) -> Box<dyn MediaBackend> {
        Box::new(FfmpegBackend::new(config.clone()))
    }
}
