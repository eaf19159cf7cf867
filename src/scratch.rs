//! Fast scratch space for extraction output.
//!
//! Output is written into a temporary directory on the roomiest fast location
//! (RAM-backed where the platform has one), then copied to its destination.
//! The directory is removed when the [`ScratchSpace`] is dropped.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::ScratchConfig;
use crate::media::StreamCopy;

/// Free bytes available to unprivileged users on the filesystem holding `path`.
#[cfg(unix)]
pub fn available_space(path: &Path) -> Option<u64> {
    let stat = nix::sys::statvfs::statvfs(path).ok()?;
    Some(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(unix))]
pub fn available_space(path: &Path) -> Option<u64> {
    fs4::available_space(path).ok()
}

/// Free-space lookup used for scratch candidates and destinations
pub type SpaceQuery = fn(&Path) -> Option<u64>;

/// Candidate locations, fastest first
pub fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/dev/shm"));
        candidates.push(PathBuf::from("/run/shm"));
    }
    candidates.push(std::env::temp_dir());
    candidates
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLocation {
    pub path: PathBuf,
    pub available: u64,
}

#[derive(Debug, Clone)]
pub struct ScratchPolicy {
    enabled: bool,
    candidates: Vec<PathBuf>,
    audio_space_factor: u64,
    subtitle_min_bytes: u64,
    space: SpaceQuery,
}

impl ScratchPolicy {
    pub fn from_config(config: &ScratchConfig) -> Self {
        let candidates = if config.candidates.is_empty() {
            default_candidates()
        } else {
            config.candidates.clone()
        };
        Self {
            enabled: config.enabled,
            candidates,
            audio_space_factor: config.audio_space_factor.max(1),
            subtitle_min_bytes: config.subtitle_min_bytes,
            space: available_space,
        }
    }

    /// A policy that always writes straight to the destination
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            candidates: Vec::new(),
            audio_space_factor: 2,
            subtitle_min_bytes: 0,
            space: available_space,
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.enabled = true;
        self.candidates = candidates;
        self
    }

    #[cfg(test)]
    pub fn with_space_query(mut self, space: SpaceQuery) -> Self {
        self.space = space;
        self
    }

    /// Free bytes on the filesystem holding `path`, if known
    pub fn available(&self, path: &Path) -> Option<u64> {
        (self.space)(path)
    }

    /// Scratch bytes needed for a job on a source of `source_size` bytes
    pub fn required_bytes(&self, job: StreamCopy, source_size: u64) -> u64 {
        match job {
            StreamCopy::AudioRemux { .. } => source_size.saturating_mul(self.audio_space_factor),
            StreamCopy::Subtitle { .. } => self.subtitle_min_bytes,
        }
    }

    /// The existing candidate with the most free space that still clears `required`
    pub fn choose(&self, required: u64) -> Option<ScratchLocation> {
        if !self.enabled {
            return None;
        }

        self.candidates
            .iter()
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let available = self.available(path)?;
                debug!("Scratch candidate {}: {} bytes free", path.display(), available);
                Some(ScratchLocation {
                    path: path.clone(),
                    available,
                })
            })
            .filter(|location| location.available >= required)
            // max_by_key keeps the last maximum; reverse so earlier candidates win ties
            .rev()
            .max_by_key(|location| location.available)
    }

    /// Create a private scratch directory on the best location, if any fits
    pub fn acquire(&self, required: u64) -> Option<ScratchSpace> {
        let location = self.choose(required)?;
        match tempfile::Builder::new()
            .prefix("mkv-processor-")
            .tempdir_in(&location.path)
        {
            Ok(dir) => Some(ScratchSpace { dir, location }),
            Err(e) => {
                warn!("Cannot create scratch directory in {}: {}", location.path.display(), e);
                None
            }
        }
    }
}

/// Scratch directory owned by one in-flight extraction
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
    location: ScratchLocation,
}

impl ScratchSpace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn location(&self) -> &ScratchLocation {
        &self.location
    }

    pub fn file<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_bytes() {
        let policy = ScratchPolicy::from_config(&ScratchConfig::default());
        assert_eq!(policy.required_bytes(StreamCopy::AudioRemux { audio_index: 1 }, 1_000), 2_000);
        assert_eq!(
            policy.required_bytes(StreamCopy::Subtitle { subtitle_index: 2 }, 1_000),
            64 * 1024 * 1024
        );
    }

    #[test]
    fn test_disabled_policy_never_chooses() {
        assert!(ScratchPolicy::disabled().choose(0).is_none());
        assert!(ScratchPolicy::disabled().acquire(0).is_none());
    }

    #[test]
    fn test_missing_candidates_are_skipped() {
        let policy = ScratchPolicy::disabled().with_candidates(vec![PathBuf::from("/definitely/not/here")]);
        assert!(policy.choose(0).is_none());
    }

    #[test]
    fn test_choose_respects_requirement() {
        let temp = tempfile::tempdir().unwrap();
        let policy = ScratchPolicy::disabled().with_candidates(vec![temp.path().to_path_buf()]);

        let location = policy.choose(1).unwrap();
        assert_eq!(location.path, temp.path());
        assert!(policy.choose(u64::MAX).is_none());
    }

    #[test]
    fn test_roomiest_candidate_wins_and_ties_keep_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let candidates = vec![first.path().to_path_buf(), second.path().to_path_buf()];

        let level = ScratchPolicy::disabled()
            .with_candidates(candidates.clone())
            .with_space_query(|_| Some(500));
        assert_eq!(level.choose(100).unwrap().path, first.path());
        assert!(level.choose(501).is_none());

        let unknown = ScratchPolicy::disabled()
            .with_candidates(candidates)
            .with_space_query(|_| None);
        assert!(unknown.choose(0).is_none());
    }

    #[test]
    fn test_scratch_space_is_removed_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let policy = ScratchPolicy::disabled().with_candidates(vec![temp.path().to_path_buf()]);

        let scratch = policy.acquire(1).unwrap();
        let dir = scratch.path().to_path_buf();
        std::fs::write(scratch.file("out.mkv"), b"data").unwrap();
        assert!(dir.starts_with(temp.path()));
        assert!(dir.exists());

        drop(scratch);
        assert!(!dir.exists());
    }
}
