//! Stream extraction and file renaming.
//!
//! Every copy job first tries a scratch directory on the roomiest fast
//! location, promoting the result to its destination through a `.partial`
//! file. When no location fits, or the scratch attempt fails, the job is run
//! again straight into the destination. Both paths yield the same bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ProcessorError, Result};
use crate::media::{MediaBackend, ProbeResult, StreamCopy, UNDEFINED_LANGUAGE};
use crate::naming::{derive_name, language_abbreviation, subtitle_name, UNKNOWN_RESOLUTION};
use crate::scratch::{ScratchPolicy, ScratchSpace};
use crate::selector::{AudioTrack, SubtitleTrack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Written { via_scratch: bool },
    /// The destination existed before the job; nothing was run
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxOutput {
    /// The source after its in-place rename
    pub source: PathBuf,
    pub output: PathBuf,
    pub copy: CopyOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleOutput {
    pub path: PathBuf,
    pub copy: CopyOutcome,
}

/// File stem used as the base of every derived name
pub fn base_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .ok_or_else(|| ProcessorError::Config(format!("Invalid file name: {}", path.display())))
}

/// Rename without ever replacing an existing file
pub fn rename_no_clobber(from: &Path, to: &Path) -> Result<PathBuf> {
    if from == to {
        return Ok(to.to_path_buf());
    }
    if to.exists() {
        return Err(ProcessorError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            reason: "target already exists".to_string(),
        });
    }

    std::fs::rename(from, to).map_err(|e| ProcessorError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        reason: e.to_string(),
    })?;
    info!("Renamed {} -> {}", from.display(), to.display());
    Ok(to.to_path_buf())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

fn verify_output(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProcessorError::Extraction(format!(
            "Expected output {} was not produced",
            path.display()
        )))
    }
}

async fn remove_if_exists(path: &Path) {
    if tokio::fs::metadata(path).await.is_ok() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Cannot remove incomplete output {}: {}", path.display(), e);
        }
    }
}

pub struct ExtractionEngine {
    backend: Arc<dyn MediaBackend>,
    scratch: ScratchPolicy,
}

impl ExtractionEngine {
    pub fn new(backend: Arc<dyn MediaBackend>, scratch: ScratchPolicy) -> Self {
        Self { backend, scratch }
    }

    /// Check that the destination filesystem can take a full copy of `source`.
    ///
    /// Unknown free space passes.
    pub fn preflight(&self, source: &Path, destination_dir: &Path) -> Result<()> {
        let required = std::fs::metadata(source)?.len();
        let Some(location) = destination_dir.ancestors().find(|p| p.exists()) else {
            return Ok(());
        };

        match self.scratch.available(location) {
            Some(available) if available < required => Err(ProcessorError::Resource {
                location: destination_dir.to_path_buf(),
                required,
                available,
            }),
            _ => Ok(()),
        }
    }

    /// Run one copy job into `destination`, skipping it when the destination exists
    pub async fn copy_to(&self, input: &Path, job: StreamCopy, destination: &Path) -> Result<CopyOutcome> {
        if destination.exists() {
            info!("{} already exists, skipping extraction", destination.display());
            return Ok(CopyOutcome::AlreadyPresent);
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let source_size = tokio::fs::metadata(input).await?.len();
        let required = self.scratch.required_bytes(job, source_size);

        if let Some(scratch) = self.scratch.acquire(required) {
            match self.copy_via_scratch(input, job, destination, &scratch).await {
                Ok(()) => return Ok(CopyOutcome::Written { via_scratch: true }),
                Err(e) => warn!(
                    "Scratch extraction in {} failed, writing directly: {}",
                    scratch.location().path.display(),
                    e
                ),
            }
        } else {
            debug!("No scratch location with {} bytes free, writing directly", required);
        }

        self.copy_direct(input, job, destination).await?;
        Ok(CopyOutcome::Written { via_scratch: false })
    }

    async fn copy_via_scratch(
        &self,
        input: &Path,
        job: StreamCopy,
        destination: &Path,
        scratch: &ScratchSpace,
    ) -> Result<()> {
        let name = destination
            .file_name()
            .ok_or_else(|| ProcessorError::Config(format!("Invalid output path: {}", destination.display())))?;
        let staged = scratch.file(name);
        debug!("Staging {} in {}", destination.display(), scratch.path().display());

        self.backend.copy_streams(input, job, &staged).await?;
        verify_output(&staged)?;

        let partial = partial_path(destination);
        if let Err(e) = promote(&staged, &partial, destination).await {
            remove_if_exists(&partial).await;
            return Err(e);
        }
        Ok(())
    }

    async fn copy_direct(&self, input: &Path, job: StreamCopy, destination: &Path) -> Result<()> {
        let result = match self.backend.copy_streams(input, job, destination).await {
            Ok(()) => verify_output(destination),
            Err(e) => Err(e),
        };
        if result.is_err() {
            remove_if_exists(destination).await;
        }
        result
    }

    /// Remux video plus `selected` into `output_dir`, then rename the source in
    /// place after its `first` audio track.
    pub async fn remux_audio(
        &self,
        source: &Path,
        probe: &ProbeResult,
        first: &AudioTrack,
        selected: &AudioTrack,
        output_dir: &Path,
    ) -> Result<RemuxOutput> {
        let base = base_name(source)?;
        let resolution = probe.resolution_label();
        let year = probe.year();

        let output_name = derive_name(
            &resolution,
            &language_abbreviation(&selected.language),
            Some(selected.title.as_str()),
            year,
            &base,
        );
        let source_name = derive_name(
            &resolution,
            &language_abbreviation(&first.language),
            Some(first.title.as_str()),
            year,
            &base,
        );

        let output = output_dir.join(output_name);
        let copy = self
            .copy_to(source, StreamCopy::AudioRemux { audio_index: selected.index }, &output)
            .await?;
        info!("Video saved to {}", output.display());

        let renamed = rename_no_clobber(source, &source.with_file_name(source_name))?;
        Ok(RemuxOutput {
            source: renamed,
            output,
            copy,
        })
    }

    /// Write one subtitle stream into `subtitle_dir`; `ordinal` numbers
    /// same-language tracks of one source from 1.
    pub async fn extract_subtitle(
        &self,
        source: &Path,
        track: &SubtitleTrack,
        ordinal: usize,
        subtitle_dir: &Path,
    ) -> Result<SubtitleOutput> {
        let name = subtitle_name(&base_name(source)?, &track.language, ordinal);
        let path = subtitle_dir.join(name);
        let copy = self
            .copy_to(source, StreamCopy::Subtitle { subtitle_index: track.index }, &path)
            .await?;
        info!("Extracted {} subtitle to {}", track.language, path.display());
        Ok(SubtitleOutput { path, copy })
    }

    /// Rename after the first audio track only, without touching streams
    pub fn simple_rename(&self, source: &Path, probe: Option<&ProbeResult>) -> Result<PathBuf> {
        let resolution = probe
            .map(ProbeResult::resolution_label)
            .unwrap_or_else(|| UNKNOWN_RESOLUTION.to_string());
        let first = probe.and_then(ProbeResult::first_audio);
        let language = first.map(|s| s.language.as_str()).unwrap_or(UNDEFINED_LANGUAGE);
        let title = first.and_then(|s| s.title.as_deref());

        let name = derive_name(&resolution, &language_abbreviation(language), title, None, &base_name(source)?);
        rename_no_clobber(source, &source.with_file_name(name))
    }
}

async fn promote(staged: &Path, partial: &Path, destination: &Path) -> Result<()> {
    tokio::fs::copy(staged, partial).await?;
    tokio::fs::rename(partial, destination).await?;
    Ok(())
}
