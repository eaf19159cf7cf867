//! Per-run state threaded through the pipeline.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ProcessingConfig;
use crate::error::{ProcessorError, Result};
use crate::ledger::{LedgerEntry, ProcessedLedger, LEDGER_FILE_NAME};
use crate::selector::OutputRoute;
use crate::sync::RemoteSync;

/// Shared stop request; set from a signal handler, polled between files
pub type CancelFlag = Arc<AtomicBool>;

/// Absolute directories of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub input_dir: PathBuf,
    pub dubbed_dir: PathBuf,
    pub original_dir: PathBuf,
    pub subtitle_dir: PathBuf,
    pub log_dir: PathBuf,
}

fn resolve_dir(base: &Path, dir: &str) -> PathBuf {
    let dir = PathBuf::from(dir);
    if dir.is_absolute() {
        dir
    } else {
        base.join(dir)
    }
}

impl RunLayout {
    /// Resolve configured directories against the input folder
    pub fn resolve(input_dir: &Path, processing: &ProcessingConfig) -> Result<Self> {
        if !input_dir.is_dir() {
            return Err(ProcessorError::FileNotFound(format!(
                "Input folder {} does not exist",
                input_dir.display()
            )));
        }
        let input_dir = input_dir.canonicalize()?;

        Ok(Self {
            dubbed_dir: resolve_dir(&input_dir, &processing.dubbed_folder),
            original_dir: resolve_dir(&input_dir, &processing.original_folder),
            subtitle_dir: resolve_dir(&input_dir, &processing.subtitle_dir),
            log_dir: resolve_dir(&input_dir, &processing.log_dir),
            input_dir,
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.log_dir.join(LEDGER_FILE_NAME)
    }

    /// Where older versions kept the ledger
    pub fn legacy_ledger_path(&self) -> PathBuf {
        self.subtitle_dir.join(LEDGER_FILE_NAME)
    }

    pub fn route_dir(&self, route: OutputRoute) -> &Path {
        match route {
            OutputRoute::Dubbed => &self.dubbed_dir,
            OutputRoute::Original => &self.original_dir,
        }
    }

    pub fn create_output_dirs(&self) -> Result<()> {
        for dir in [&self.dubbed_dir, &self.original_dir, &self.subtitle_dir, &self.log_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Everything one run owns: layout, ledger, remote capability and the
/// entries recorded so far
pub struct RunContext {
    pub run_id: Uuid,
    pub layout: RunLayout,
    pub ledger: ProcessedLedger,
    pub sync: Box<dyn RemoteSync>,
    pub run_entries: Vec<LedgerEntry>,
    cancel: CancelFlag,
}

impl RunContext {
    /// Open the local ledger, folding in a legacy ledger if one is present
    pub fn open(run_id: Uuid, layout: RunLayout, sync: Box<dyn RemoteSync>, cancel: CancelFlag) -> Result<Self> {
        let mut ledger = ProcessedLedger::open(layout.ledger_path())?;
        if let Err(e) = ledger.migrate_legacy(&layout.legacy_ledger_path(), &layout.log_dir) {
            warn!("Cannot migrate legacy ledger {}: {}", layout.legacy_ledger_path().display(), e);
        }
        info!("Using ledger {}", ledger.path().display());

        Ok(Self {
            run_id,
            layout,
            ledger,
            sync,
            run_entries: Vec::new(),
            cancel,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Append to the local ledger, then hand the entry to the remote mirror
    pub async fn record(&mut self, entry: LedgerEntry, artifact: Option<&Path>) -> Result<()> {
        self.ledger.append(&entry)?;
        let mirrored = self.sync.record(entry, artifact).await;
        self.run_entries.push(mirrored);
        Ok(())
    }
}
