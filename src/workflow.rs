use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::context::{CancelFlag, RunContext, RunLayout};
use crate::error::{ProcessorError, Result};
use crate::extract::{CopyOutcome, ExtractionEngine};
use crate::ledger::{write_snapshot, EntryCategory, FileSignature, LedgerEntry, PriorMatch, ProcessedLedger};
use crate::media::{MediaBackend, MediaBackendFactory, ProbeResult};
use crate::prompt::OperatorPrompt;
use crate::scratch::ScratchPolicy;
use crate::selector::{AudioDecision, SubtitleDecision, TrackSelector};
use crate::sync::{self, RemoteSync};

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Matched a ledger record by name or content
    Skipped { previous: String },
    /// Alternate audio written to `output`, source renamed to `renamed`
    Remuxed { renamed: PathBuf, output: PathBuf },
    /// Renamed only
    Renamed { renamed: PathBuf },
    /// Left untouched and unrecorded; retried on the next run
    Failed { reason: String },
    /// Operator declined, or unattended mode refused, a resource shortfall
    Blocked { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub input: PathBuf,
    pub outcome: FileOutcome,
    pub subtitles: Vec<PathBuf>,
}

impl FileReport {
    fn new(input: &Path, outcome: FileOutcome) -> Self {
        Self {
            input: input.to_path_buf(),
            outcome,
            subtitles: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub reports: Vec<FileReport>,
    /// Local JSON snapshot of this run's entries
    pub snapshot: Option<PathBuf>,
    pub remote_snapshot: Option<String>,
    /// Entries added to the remote log
    pub remote_entries: usize,
    pub sync_error: Option<String>,
    pub cancelled: bool,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            reports: Vec::new(),
            snapshot: None,
            remote_snapshot: None,
            remote_entries: 0,
            sync_error: None,
            cancelled: false,
        }
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Remuxed { .. } | FileOutcome::Renamed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. } | FileOutcome::Blocked { .. }))
    }
}

/// Input containers directly inside `dir`, sorted by path
pub fn scan_inputs(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| ProcessorError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let wanted = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
        if wanted {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Subtitle output waiting for the video outcome of the same source
struct StagedSubtitle {
    entry: LedgerEntry,
    path: PathBuf,
}

pub struct Workflow {
    config: Config,
    backend: Arc<dyn MediaBackend>,
    engine: ExtractionEngine,
    selector: TrackSelector,
    prompt: Box<dyn OperatorPrompt>,
    show_progress: bool,
}

impl Workflow {
    pub fn new(config: Config, prompt: Box<dyn OperatorPrompt>) -> Self {
        let backend: Arc<dyn MediaBackend> = Arc::from(MediaBackendFactory::create_backend(&config.media));
        Self::with_backend(config, backend, prompt)
    }

    pub fn with_backend(config: Config, backend: Arc<dyn MediaBackend>, prompt: Box<dyn OperatorPrompt>) -> Self {
        let engine = ExtractionEngine::new(backend.clone(), ScratchPolicy::from_config(&config.scratch));
        let selector = TrackSelector::new(config.processing.target_language.clone());

        Self {
            config,
            backend,
            engine,
            selector,
            prompt,
            show_progress: true,
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchPolicy) -> Self {
        self.engine = ExtractionEngine::new(self.backend.clone(), scratch);
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub async fn check_toolchain(&self) -> Result<()> {
        self.backend.check_availability().await
    }

    pub async fn toolchain_versions(&self) -> Result<Vec<String>> {
        self.backend.version_info().await
    }

    /// Process every input container in `input_dir`.
    ///
    /// A missing toolchain or an unreadable folder fails the run; anything
    /// that goes wrong with a single file is reported in the summary.
    pub async fn process_directory(&self, input_dir: &Path, cancel: CancelFlag) -> Result<RunSummary> {
        self.check_toolchain().await?;
        let sync = sync::connect(&self.config.sync).await;
        self.run(input_dir, sync, cancel).await
    }

    /// Process `input_dir` mirroring to the given remote capability
    pub async fn run(&self, input_dir: &Path, sync: Box<dyn RemoteSync>, cancel: CancelFlag) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.run_inner(run_id, input_dir, sync, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        input_dir: &Path,
        sync: Box<dyn RemoteSync>,
        cancel: CancelFlag,
    ) -> Result<RunSummary> {
        let layout = RunLayout::resolve(input_dir, &self.config.processing)?;
        let inputs = scan_inputs(&layout.input_dir, &self.config.processing.extensions)?;
        info!("Found {} input files in {}", inputs.len(), layout.input_dir.display());

        layout.create_output_dirs()?;
        let mut ctx = RunContext::open(run_id, layout, sync, cancel)?;
        let mut summary = RunSummary::new(run_id);

        let progress = self.progress_bar(inputs.len() as u64);
        for (done, input) in inputs.iter().enumerate() {
            if ctx.is_cancelled() {
                warn!("Stop requested, {} files left unprocessed", inputs.len() - done);
                summary.cancelled = true;
                break;
            }
            progress.set_message(file_name(input));
            let report = self.process_file(&mut ctx, input, &progress).await;
            debug!("{}: {:?}", input.display(), report.outcome);
            summary.reports.push(report);
            progress.inc(1);
        }
        progress.finish_and_clear();

        self.finish_run(&mut ctx, &mut summary).await;
        info!(
            "Run finished: {} processed, {} skipped, {} failed",
            summary.processed(),
            summary.skipped(),
            summary.failed()
        );
        Ok(summary)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    async fn process_file(&self, ctx: &mut RunContext, input: &Path, progress: &ProgressBar) -> FileReport {
        let name = file_name(input);
        info!("Processing file: {}", name);
        match self.process_file_inner(ctx, input, &name, progress).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Failed to process {}: {}", name, e);
                FileReport::new(input, FileOutcome::Failed { reason: e.to_string() })
            }
        }
    }

    async fn process_file_inner(
        &self,
        ctx: &mut RunContext,
        input: &Path,
        name: &str,
        progress: &ProgressBar,
    ) -> Result<FileReport> {
        let size = tokio::fs::metadata(input).await?.len();
        let probe = match self.backend.probe(input).await {
            Ok(probe) => Some(probe),
            Err(e) => {
                warn!("Cannot read streams of {}: {}", name, e);
                None
            }
        };
        let signature = probe.as_ref().map(|p| FileSignature::from_probe(size, p));

        if let Some(prior) = ctx.ledger.find_prior(name, signature.as_ref()) {
            let entry = match prior {
                PriorMatch::ByName(entry) => {
                    info!("{} was processed as {} on {}, skipping", name, entry.new_name, entry.timestamp);
                    entry
                }
                PriorMatch::BySignature(entry) => {
                    info!("{} has the same content as {}, skipping", name, entry.new_name);
                    entry
                }
            };
            return Ok(FileReport::new(input, FileOutcome::Skipped { previous: entry.new_name.clone() }));
        }
        if let Some(signature) = signature.as_ref().filter(|s| ctx.sync.has_signature(s)) {
            info!("{} has the same content as a file on the remote log, skipping", name);
            return Ok(FileReport::new(input, FileOutcome::Skipped { previous: signature.to_string() }));
        }

        let Some(probe) = probe else {
            return self
                .rename_only(ctx, input, name, None, None, Vec::new())
                .await;
        };

        let plan = self.selector.select(&probe);
        for decision in &plan.subtitles {
            if let SubtitleDecision::Skip { track, reason } = decision {
                info!("Skipping subtitle stream {} of {}: {}", track.index, name, reason);
            }
        }

        let mut staged = Vec::new();
        for (i, track) in plan.extractable_subtitles().enumerate() {
            match self
                .engine
                .extract_subtitle(input, track, i + 1, &ctx.layout.subtitle_dir)
                .await
            {
                Ok(output) => {
                    let subtitle_name = file_name(&output.path);
                    if output.copy == CopyOutcome::AlreadyPresent && ctx.ledger.lookup_name(&subtitle_name).is_some() {
                        continue;
                    }
                    let entry = LedgerEntry::new(name, subtitle_name, EntryCategory::Subtitle, signature.as_ref())
                        .with_output(&output.path)
                        .with_language(track.language.clone());
                    staged.push(StagedSubtitle { entry, path: output.path });
                }
                Err(e) => warn!("Subtitle stream {} of {} not extracted: {}", track.index, name, e),
            }
        }

        match &plan.audio {
            AudioDecision::Remux { first, selected, route } => {
                let output_dir = ctx.layout.route_dir(*route).to_path_buf();
                match self.engine.preflight(input, &output_dir) {
                    Ok(()) => {}
                    Err(e @ ProcessorError::Resource { .. }) => {
                        if !progress.suspend(|| self.confirm_resources(&e)) {
                            warn!("Not remuxing {}: {}", name, e);
                            let mut report = FileReport::new(input, FileOutcome::Blocked { reason: e.to_string() });
                            report.subtitles = staged.into_iter().map(|s| s.path).collect();
                            return Ok(report);
                        }
                    }
                    Err(e) => return Err(e),
                }

                match self
                    .engine
                    .remux_audio(input, &probe, first, selected, &output_dir)
                    .await
                {
                    Ok(remux) => {
                        let entry = LedgerEntry::new(name, file_name(&remux.source), EntryCategory::Video, signature.as_ref())
                            .with_output(&remux.output)
                            .with_language(selected.language.clone());
                        let subtitles = self.commit(ctx, staged, entry).await?;
                        Ok(FileReport {
                            input: input.to_path_buf(),
                            outcome: FileOutcome::Remuxed {
                                renamed: remux.source,
                                output: remux.output,
                            },
                            subtitles,
                        })
                    }
                    Err(e) => {
                        warn!("Audio remux of {} failed, leaving it untouched: {}", name, e);
                        let mut report = FileReport::new(input, FileOutcome::Failed { reason: e.to_string() });
                        report.subtitles = staged.into_iter().map(|s| s.path).collect();
                        Ok(report)
                    }
                }
            }
            AudioDecision::NoAudio => {
                info!("No audio found in {}, renaming only", name);
                self.rename_only(ctx, input, name, Some(&probe), signature.as_ref(), staged)
                    .await
            }
            AudioDecision::NoAlternate { first_language } => {
                info!("No alternate audio in {} (first track {}), renaming only", name, first_language);
                self.rename_only(ctx, input, name, Some(&probe), signature.as_ref(), staged)
                    .await
            }
        }
    }

    /// Ask whether to go ahead despite a destination space shortfall
    fn confirm_resources(&self, shortfall: &ProcessorError) -> bool {
        self.prompt.confirm(&format!("{}. Continue anyway?", shortfall))
    }

    async fn rename_only(
        &self,
        ctx: &mut RunContext,
        input: &Path,
        name: &str,
        probe: Option<&ProbeResult>,
        signature: Option<&FileSignature>,
        staged: Vec<StagedSubtitle>,
    ) -> Result<FileReport> {
        match self.engine.simple_rename(input, probe) {
            Ok(renamed) => {
                let mut entry = LedgerEntry::new(name, file_name(&renamed), EntryCategory::Video, signature);
                if probe.is_none() {
                    entry = entry.with_notes("stream information unavailable");
                }
                let subtitles = self.commit(ctx, staged, entry).await?;
                Ok(FileReport {
                    input: input.to_path_buf(),
                    outcome: FileOutcome::Renamed { renamed },
                    subtitles,
                })
            }
            Err(e) => {
                warn!("Cannot rename {}: {}", name, e);
                let mut report = FileReport::new(input, FileOutcome::Failed { reason: e.to_string() });
                report.subtitles = staged.into_iter().map(|s| s.path).collect();
                Ok(report)
            }
        }
    }

    /// Record staged subtitles, then the video entry
    async fn commit(&self, ctx: &mut RunContext, staged: Vec<StagedSubtitle>, video: LedgerEntry) -> Result<Vec<PathBuf>> {
        let mut subtitles = Vec::with_capacity(staged.len());
        for subtitle in staged {
            ctx.record(subtitle.entry, Some(&subtitle.path)).await?;
            subtitles.push(subtitle.path);
        }
        ctx.record(video, None).await?;
        Ok(subtitles)
    }

    async fn finish_run(&self, ctx: &mut RunContext, summary: &mut RunSummary) {
        if !ctx.run_entries.is_empty() {
            match write_snapshot(&ctx.layout.log_dir, "run", &ctx.run_entries) {
                Ok(path) => {
                    info!("Run log saved to {}", path.display());
                    summary.snapshot = Some(path);
                }
                Err(e) => warn!("Cannot write run log: {}", e),
            }
            summary.remote_snapshot = ctx.sync.upload_snapshot(&ctx.run_entries).await;
        }

        match ctx.sync.flush().await {
            Ok(count) => summary.remote_entries = count,
            Err(e) => {
                warn!(
                    "Remote log not updated, {} entries stay local until the next run: {}",
                    ctx.sync.pending(),
                    e
                );
                summary.sync_error = Some(e.to_string());
            }
        }
    }

    /// Push every local ledger record the remote log does not hold yet.
    ///
    /// Returns how many records were added remotely.
    pub async fn resync(&self, input_dir: &Path, mut sync: Box<dyn RemoteSync>) -> Result<usize> {
        let layout = RunLayout::resolve(input_dir, &self.config.processing)?;
        let ledger = ProcessedLedger::open(layout.ledger_path())?;

        let mut queued = 0;
        for entry in ledger.entries()? {
            if sync.knows(&entry) {
                continue;
            }
            let artifact = match entry.category {
                EntryCategory::Subtitle => Some(layout.subtitle_dir.join(&entry.new_name)),
                EntryCategory::Video => None,
            };
            sync.record(entry, artifact.as_deref()).await;
            queued += 1;
        }

        let written = sync.flush().await?;
        info!("Resync queued {} local records, {} added to the remote log", queued, written);
        Ok(written)
    }
}
