use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{GitHubStore, RemoteStore};
use crate::config::SyncSettings;
use crate::error::{ProcessorError, Result};
use crate::ledger::{EntryCategory, FileSignature, LedgerEntry};

/// Remote mirror settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub token: String,
    pub repo: String,
    pub branch: String,
    /// JSON ledger object
    pub log_path: String,
    pub subtitle_dir: String,
    pub logs_dir: String,
    pub legacy_log_path: String,
    pub api_base: String,
}

impl SyncConfig {
    /// `None` unless a token and a repo are set and auto upload is on
    pub fn from_settings(settings: &SyncSettings) -> Option<Self> {
        let token = settings.token.trim();
        let repo = settings.repo.trim();
        if token.is_empty() || repo.is_empty() || !settings.auto_upload {
            return None;
        }

        let or_default = |value: &str, default: &str| {
            let value = value.trim().trim_matches('/');
            if value.is_empty() { default.to_string() } else { value.to_string() }
        };
        let logs_dir = or_default(&settings.logs_dir, "logs");
        let log_path = or_default(&settings.log_path, &format!("{}/processed.json", logs_dir));

        Some(Self {
            token: token.to_string(),
            repo: repo.to_string(),
            branch: or_default(&settings.branch, "main"),
            log_path,
            subtitle_dir: or_default(&settings.subtitle_dir, "subtitles"),
            logs_dir,
            legacy_log_path: settings.legacy_log_path.trim().to_string(),
            api_base: or_default(&settings.api_base, "https://api.github.com"),
        })
    }
}

/// Remote mirror capability used by the pipeline
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Whether a video with this signature is already on the remote ledger
    fn has_signature(&self, signature: &FileSignature) -> bool;

    /// Whether the remote ledger already holds an equivalent record
    fn knows(&self, entry: &LedgerEntry) -> bool;

    /// Buffer a recorded entry, uploading `artifact` first for subtitles.
    /// Returns the entry as it will be mirrored.
    async fn record(&mut self, entry: LedgerEntry, artifact: Option<&Path>) -> LedgerEntry;

    /// Write buffered entries back in one update; returns how many were written.
    /// Buffered entries survive a failed flush.
    async fn flush(&mut self) -> Result<usize>;

    /// Upload a run snapshot; returns its remote path
    async fn upload_snapshot(&self, entries: &[LedgerEntry]) -> Option<String>;

    fn pending(&self) -> usize;
}

/// Stand-in used when no remote is configured
pub struct NoopSync;

#[async_trait]
impl RemoteSync for NoopSync {
    fn has_signature(&self, _signature: &FileSignature) -> bool {
        false
    }

    fn knows(&self, _entry: &LedgerEntry) -> bool {
        false
    }

    async fn record(&mut self, entry: LedgerEntry, _artifact: Option<&Path>) -> LedgerEntry {
        entry
    }

    async fn flush(&mut self) -> Result<usize> {
        Ok(0)
    }

    async fn upload_snapshot(&self, _entries: &[LedgerEntry]) -> Option<String> {
        None
    }

    fn pending(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Loading,
    LegacyConversion,
    Active,
    Flushed,
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn same_record(a: &LedgerEntry, b: &LedgerEntry) -> bool {
    a.old_name == b.old_name && a.new_name == b.new_name && a.category == b.category
}

/// Append `incoming` to `base`, dropping videos whose signature is already
/// present and records already present by name.
pub fn merge_entries(base: &[LedgerEntry], incoming: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let mut merged = base.to_vec();
    let mut signatures: HashSet<String> = base
        .iter()
        .filter(|e| e.category == EntryCategory::Video)
        .filter_map(|e| e.signature.clone())
        .collect();

    for entry in incoming {
        let duplicate_signature = entry.category == EntryCategory::Video
            && entry.signature.as_ref().is_some_and(|s| signatures.contains(s));
        if duplicate_signature || merged.iter().any(|e| same_record(e, entry)) {
            continue;
        }
        if entry.category == EntryCategory::Video {
            if let Some(signature) = &entry.signature {
                signatures.insert(signature.clone());
            }
        }
        merged.push(entry.clone());
    }
    merged
}

fn to_json(entries: &[LedgerEntry]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(entries)?)
}

/// Reconciles recorded entries with a remote JSON ledger
pub struct RemoteSyncManager<S: RemoteStore> {
    store: S,
    config: SyncConfig,
    phase: SyncPhase,
    remote_entries: Vec<LedgerEntry>,
    revision: Option<String>,
    signatures: HashSet<String>,
    pending: Vec<LedgerEntry>,
    /// Remote entries changed locally (legacy conversion) and not yet written
    dirty: bool,
    /// Set when the remote log could not be read; blocks every write to it
    load_error: Option<String>,
}

impl<S: RemoteStore> RemoteSyncManager<S> {
    pub fn new(store: S, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            phase: SyncPhase::Idle,
            remote_entries: Vec::new(),
            revision: None,
            signatures: HashSet::new(),
            pending: Vec::new(),
            dirty: false,
            load_error: None,
        }
    }

    /// Create the manager and pull remote state
    pub async fn connect(store: S, config: SyncConfig) -> Self {
        let mut manager = Self::new(store, config);
        manager.load().await;
        manager
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn pending_entries(&self) -> &[LedgerEntry] {
        &self.pending
    }

    /// Pull the remote ledger, then convert a remote legacy log if one exists.
    ///
    /// A remote log that cannot be fetched or parsed leaves the manager active
    /// with an empty view, and the log is never written back during this run.
    pub async fn load(&mut self) {
        self.phase = SyncPhase::Loading;
        self.load_error = None;
        match self.store.get_object(&self.config.log_path).await {
            Ok(Some(object)) => match serde_json::from_slice(&object.content) {
                Ok(entries) => {
                    self.remote_entries = entries;
                    self.revision = Some(object.revision);
                }
                Err(e) => {
                    warn!("Remote log {} is not valid JSON, leaving it untouched: {}", self.config.log_path, e);
                    self.load_error = Some(format!("{} is not valid JSON: {}", self.config.log_path, e));
                }
            },
            Ok(None) => debug!("No remote log at {}", self.config.log_path),
            Err(e) => {
                warn!("Cannot load remote log {}: {}", self.config.log_path, e);
                self.load_error = Some(format!("cannot read {}: {}", self.config.log_path, e));
            }
        }
        self.seed_signatures();
        info!(
            "Remote log has {} entries ({} video signatures)",
            self.remote_entries.len(),
            self.signatures.len()
        );

        if self.load_error.is_none() && !self.config.legacy_log_path.is_empty() {
            self.phase = SyncPhase::LegacyConversion;
            match self.convert_legacy().await {
                Ok(Some(converted)) => {
                    self.remote_entries = merge_entries(&self.remote_entries, &converted);
                    self.seed_signatures();
                    self.dirty = true;
                }
                Ok(None) => {}
                Err(e) => warn!("Cannot convert remote legacy log: {}", e),
            }
        }

        self.phase = SyncPhase::Active;
    }

    fn seed_signatures(&mut self) {
        self.signatures = self
            .remote_entries
            .iter()
            .filter(|e| e.category == EntryCategory::Video)
            .filter_map(|e| e.signature.clone())
            .collect();
    }

    async fn convert_legacy(&self) -> Result<Option<Vec<LedgerEntry>>> {
        let legacy_path = &self.config.legacy_log_path;
        let Some(object) = self.store.get_object(legacy_path).await? else {
            return Ok(None);
        };

        let text = String::from_utf8_lossy(&object.content);
        let mut converted: Vec<LedgerEntry> = text.lines().filter_map(LedgerEntry::from_line).collect();
        if converted.is_empty() {
            return Ok(None);
        }
        for entry in &mut converted {
            if entry.timestamp.is_empty() {
                entry.timestamp = Utc::now().to_rfc3339();
            }
        }

        let target = format!("{}/legacy_{}.json", self.config.logs_dir, timestamp());
        self.store
            .put_object(&target, to_json(&converted)?, "Convert legacy processed_files log", None)
            .await?;
        self.store
            .delete_object(legacy_path, &object.revision, "Remove legacy processed_files.log")
            .await?;

        info!("Converted remote {} ({} records) into {}", legacy_path, converted.len(), target);
        Ok(Some(converted))
    }

    async fn upload_artifact(&self, local: &Path) -> Result<String> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let remote_path = format!("{}/{}_{}", self.config.subtitle_dir, timestamp(), file_name);
        let content = tokio::fs::read(local).await?;

        self.store
            .put_object(&remote_path, content, &format!("Upload {}", file_name), None)
            .await?;
        info!("Uploaded {} to {}", file_name, remote_path);
        Ok(remote_path)
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteSync for RemoteSyncManager<S> {
    fn has_signature(&self, signature: &FileSignature) -> bool {
        self.signatures.contains(signature.as_str())
    }

    fn knows(&self, entry: &LedgerEntry) -> bool {
        let known_signature = entry.category == EntryCategory::Video
            && entry.signature.as_ref().is_some_and(|s| self.signatures.contains(s));
        known_signature || self.remote_entries.iter().any(|e| same_record(e, entry))
    }

    async fn record(&mut self, mut entry: LedgerEntry, artifact: Option<&Path>) -> LedgerEntry {
        match entry.category {
            EntryCategory::Video => {
                if let Some(signature) = &entry.signature {
                    if !self.signatures.insert(signature.clone()) {
                        debug!("Signature {} already mirrored, not buffering {}", signature, entry.old_name);
                        return entry;
                    }
                }
            }
            EntryCategory::Subtitle => {
                if let Some(local) = artifact.filter(|p| p.is_file()) {
                    match self.upload_artifact(local).await {
                        Ok(remote_path) => entry.remote_path = Some(remote_path),
                        Err(e) => warn!("Cannot upload {}: {}", local.display(), e),
                    }
                }
            }
        }

        self.pending.push(entry.clone());
        self.phase = SyncPhase::Active;
        entry
    }

    async fn flush(&mut self) -> Result<usize> {
        if self.pending.is_empty() && !self.dirty {
            return Ok(0);
        }
        if let Some(reason) = &self.load_error {
            return Err(ProcessorError::Sync(format!("remote log not updated, {}", reason)));
        }

        let merged = merge_entries(&self.remote_entries, &self.pending);
        let written = merged.len() - self.remote_entries.len();
        let message = format!("Update logs ({} entries)", self.pending.len());

        let revision = self
            .store
            .put_object(&self.config.log_path, to_json(&merged)?, &message, self.revision.as_deref())
            .await?;

        info!("Remote log updated with {} entries", written);
        self.remote_entries = merged;
        self.revision = Some(revision);
        self.pending.clear();
        self.dirty = false;
        self.phase = SyncPhase::Flushed;
        Ok(written)
    }

    async fn upload_snapshot(&self, entries: &[LedgerEntry]) -> Option<String> {
        if entries.is_empty() {
            return None;
        }
        let remote_path = format!("{}/run_{}.json", self.config.logs_dir, timestamp());
        let content = match to_json(entries) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot serialize run snapshot: {}", e);
                return None;
            }
        };

        match self
            .store
            .put_object(&remote_path, content, "Upload run log snapshot", None)
            .await
        {
            Ok(_) => {
                info!("Uploaded run snapshot to {}", remote_path);
                Some(remote_path)
            }
            Err(e) => {
                warn!("Cannot upload run snapshot: {}", e);
                None
            }
        }
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Pick the remote capability for this run
pub async fn connect(settings: &SyncSettings) -> Box<dyn RemoteSync> {
    let Some(config) = SyncConfig::from_settings(settings) else {
        debug!("Remote sync not configured");
        return Box::new(NoopSync);
    };

    match GitHubStore::new(&config) {
        Ok(store) => {
            info!("Remote sync enabled for {} ({})", config.repo, config.branch);
            Box::new(RemoteSyncManager::connect(store, config).await)
        }
        Err(e) => {
            warn!("Remote sync disabled, cannot create client: {}", e);
            Box::new(NoopSync)
        }
    }
}
