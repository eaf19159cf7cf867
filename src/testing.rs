//! Test doubles for the media toolchain and the remote store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{ProcessorError, Result};
use crate::media::{MediaBackend, ProbeResult, StreamCopy, StreamDescriptor, StreamKind};
use crate::sync::{RemoteObject, RemoteStore};

pub fn video_stream(index: u32, width: u32, height: u32) -> StreamDescriptor {
    StreamDescriptor {
        index,
        kind: StreamKind::Video,
        codec: "h264".to_string(),
        language: "und".to_string(),
        title: None,
        channels: None,
        width: Some(width),
        height: Some(height),
    }
}

pub fn audio_stream(index: u32, language: &str, channels: u32, title: Option<&str>) -> StreamDescriptor {
    StreamDescriptor {
        index,
        kind: StreamKind::Audio,
        codec: "ac3".to_string(),
        language: language.to_string(),
        title: title.map(str::to_string),
        channels: Some(channels),
        width: None,
        height: None,
    }
}

pub fn subtitle_stream(index: u32, language: &str, codec: &str) -> StreamDescriptor {
    StreamDescriptor {
        index,
        kind: StreamKind::Subtitle,
        codec: codec.to_string(),
        language: language.to_string(),
        title: None,
        channels: None,
        width: None,
        height: None,
    }
}

pub fn probe_result(streams: Vec<StreamDescriptor>, duration: &str) -> ProbeResult {
    ProbeResult {
        streams,
        duration: Some(duration.to_string()),
        tags: HashMap::new(),
    }
}

/// How the fake toolchain answers a copy job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyBehavior {
    Write,
    /// Non-zero exit
    Fail,
    /// Zero exit but nothing written
    NoOutput,
}

#[derive(Debug, Clone)]
pub struct CopyCall {
    pub input: PathBuf,
    pub job: StreamCopy,
    pub output: PathBuf,
}

/// Scripted media backend keyed by input file name.
///
/// Unscripted files fail to probe. Copies write the job description followed
/// by the input bytes, so equal inputs and jobs give equal outputs.
#[derive(Default)]
pub struct FakeBackend {
    probes: Mutex<HashMap<String, ProbeResult>>,
    behaviors: Mutex<HashMap<String, CopyBehavior>>,
    fail_under: Mutex<Option<PathBuf>>,
    copies: Mutex<Vec<CopyCall>>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(self, name: &str, probe: ProbeResult) -> Self {
        self.probes.lock().unwrap().insert(name.to_string(), probe);
        self
    }

    pub fn with_behavior(self, name: &str, behavior: CopyBehavior) -> Self {
        self.behaviors.lock().unwrap().insert(name.to_string(), behavior);
        self
    }

    /// Fail every copy whose output lands below `dir`
    pub fn failing_under(self, dir: &Path) -> Self {
        *self.fail_under.lock().unwrap() = Some(dir.to_path_buf());
        self
    }

    pub fn copies(&self) -> Vec<CopyCall> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        self.probes
            .lock()
            .unwrap()
            .get(&file_name(path))
            .cloned()
            .ok_or_else(|| ProcessorError::Probe(format!("unreadable container {}", path.display())))
    }

    async fn copy_streams(&self, input: &Path, job: StreamCopy, output: &Path) -> Result<()> {
        self.copies.lock().unwrap().push(CopyCall {
            input: input.to_path_buf(),
            job,
            output: output.to_path_buf(),
        });

        let failing_dir = self.fail_under.lock().unwrap().clone();
        if failing_dir.is_some_and(|dir| output.starts_with(dir)) {
            return Err(ProcessorError::Extraction("No space left on device".to_string()));
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&file_name(input))
            .copied()
            .unwrap_or(CopyBehavior::Write);

        match behavior {
            CopyBehavior::Write => {
                let mut content = format!("{:?}\n", job).into_bytes();
                content.extend(tokio::fs::read(input).await?);
                tokio::fs::write(output, content).await?;
                Ok(())
            }
            CopyBehavior::Fail => Err(ProcessorError::Extraction(
                "Invalid data found when processing input".to_string(),
            )),
            CopyBehavior::NoOutput => Ok(()),
        }
    }

    async fn check_availability(&self) -> Result<()> {
        Ok(())
    }

    async fn version_info(&self) -> Result<Vec<String>> {
        Ok(vec!["fake ffmpeg".to_string(), "fake ffprobe".to_string()])
    }
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, (Vec<u8>, u64)>,
    next_revision: u64,
    fail_writes: bool,
    messages: Vec<String>,
}

/// Remote store held in memory; clones share state
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.next_revision += 1;
        let revision = state.next_revision;
        state.objects.insert(path.to_string(), (content.to_vec(), revision));
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(path).map(|(c, _)| c.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state.lock().unwrap().objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Simulate a transport failure on every write
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_object(&self, path: &str) -> Result<Option<RemoteObject>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .objects
            .get(path)
            .map(|(content, revision)| RemoteObject {
                content: content.clone(),
                revision: revision.to_string(),
            }))
    }

    async fn put_object(
        &self,
        path: &str,
        content: Vec<u8>,
        message: &str,
        revision: Option<&str>,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(ProcessorError::Sync("connection reset".to_string()));
        }
        if let Some((_, current)) = state.objects.get(path) {
            if revision != Some(current.to_string().as_str()) {
                return Err(ProcessorError::SyncConflict(path.to_string()));
            }
        }

        state.next_revision += 1;
        let revision = state.next_revision;
        state.objects.insert(path.to_string(), (content, revision));
        state.messages.push(message.to_string());
        Ok(revision.to_string())
    }

    async fn delete_object(&self, path: &str, revision: &str, message: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(ProcessorError::Sync("connection reset".to_string()));
        }
        match state.objects.get(path) {
            Some((_, current)) if current.to_string() == revision => {
                state.objects.remove(path);
                state.messages.push(message.to_string());
                Ok(())
            }
            Some(_) => Err(ProcessorError::SyncConflict(path.to_string())),
            None => Err(ProcessorError::Sync(format!("{} not found", path))),
        }
    }
}
