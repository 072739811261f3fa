//! Metadata-enrichment scan sessions.
//!
//! One engine drives both the duration and the loudness scan: enumerate
//! video files under a root, skip everything already cached, then pull the
//! remainder through a bounded pool of worker threads that invoke the
//! decode tool, parse its output, and commit results to the cache with
//! periodic checkpoint saves. A single process-wide session slot serializes
//! the two scan kinds; cancellation is cooperative and always leaves the
//! cache saved with whatever progress was made.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::collaborators::{CurrentRootProvider, DirectoryEnumerator, ProgressSink, StatusSink};
use crate::library_index::MediaKind;
use crate::library_store::LibraryStore;
use crate::media_caches::{DurationCache, LoudnessCache, LoudnessMeasurement};
use crate::media_file_discovery::media_kind_for_path;
use crate::media_probe::{MediaProber, ProbeError};

const MIN_SCAN_WORKERS: usize = 2;
const MAX_SCAN_WORKERS: usize = 8;
const CHECKPOINT_INTERVAL: usize = 50;

/// Cooperative cancellation signal shared by one scan session. Observed
/// before each file and while waiting on each subprocess.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Duration,
    Loudness,
}

impl ScanKind {
    fn label(self) -> &'static str {
        match self {
            Self::Duration => "Duration scan",
            Self::Loudness => "Loudness scan",
        }
    }
}

/// Session lifecycle. `Idle` until the first scan; terminal states remain
/// visible until the next session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Root folder vanished before the session could enumerate it.
    #[error("scan root unavailable: {}", .0.display())]
    DirectoryUnavailable(PathBuf),

    /// Decode tool missing; the session aborts before any per-file work.
    #[error("decode tool unavailable: {0}")]
    ToolUnavailable(String),
}

/// Final counts of one finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub phase: ScanPhase,
    pub already_cached: usize,
    pub scanned: usize,
    pub errors: usize,
    pub skipped_missing: usize,
}

/// Result of a start request: the finished session, or one of the two
/// no-op cases (slot already held, no root to scan).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRun {
    Finished(ScanOutcome),
    AlreadyScanning,
    NoEligibleRoot,
}

/// Drives duration and loudness scan sessions over the shared caches.
pub struct ScanManager {
    store: Arc<LibraryStore>,
    durations: Arc<DurationCache>,
    loudness: Arc<LoudnessCache>,
    prober: Arc<dyn MediaProber>,
    scanning: AtomicBool,
    phase: Mutex<ScanPhase>,
    worker_count: usize,
}

impl ScanManager {
    pub fn new(
        store: Arc<LibraryStore>,
        durations: Arc<DurationCache>,
        loudness: Arc<LoudnessCache>,
        prober: Arc<dyn MediaProber>,
    ) -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|parallelism| parallelism.get())
            .unwrap_or(MIN_SCAN_WORKERS)
            .clamp(MIN_SCAN_WORKERS, MAX_SCAN_WORKERS);
        Self {
            store,
            durations,
            loudness,
            prober,
            scanning: AtomicBool::new(false),
            phase: Mutex::new(ScanPhase::Idle),
            worker_count,
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.clamp(1, MAX_SCAN_WORKERS);
        self
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock().expect("scan phase mutex should not be poisoned")
    }

    /// Runs a duration scan session over `root`. Returns
    /// [`ScanRun::AlreadyScanning`] without touching anything when another
    /// session holds the slot.
    pub fn run_duration_scan(
        &self,
        root: &Path,
        enumerator: &dyn DirectoryEnumerator,
        progress: &dyn ProgressSink,
        status: &dyn StatusSink,
        cancel: &CancelToken,
    ) -> Result<ScanRun, ScanError> {
        self.run_scan(ScanKind::Duration, root, enumerator, progress, status, cancel)
    }

    /// Duration scan over whatever root the front-end currently exposes.
    /// No selected root is a reported no-op.
    pub fn run_duration_scan_for_provider(
        &self,
        provider: &dyn CurrentRootProvider,
        enumerator: &dyn DirectoryEnumerator,
        progress: &dyn ProgressSink,
        status: &dyn StatusSink,
        cancel: &CancelToken,
    ) -> Result<ScanRun, ScanError> {
        let Some(root) = provider.current_root() else {
            status.status("Duration scan skipped: no folder selected");
            return Ok(ScanRun::NoEligibleRoot);
        };
        self.run_duration_scan(&root, enumerator, progress, status, cancel)
    }

    /// Loudness scan counterpart of
    /// [`Self::run_duration_scan_for_provider`].
    pub fn run_loudness_scan_for_provider(
        &self,
        provider: &dyn CurrentRootProvider,
        enumerator: &dyn DirectoryEnumerator,
        progress: &dyn ProgressSink,
        status: &dyn StatusSink,
        cancel: &CancelToken,
    ) -> Result<ScanRun, ScanError> {
        let Some(root) = provider.current_root() else {
            status.status("Loudness scan skipped: no folder selected");
            return Ok(ScanRun::NoEligibleRoot);
        };
        self.run_loudness_scan(&root, enumerator, progress, status, cancel)
    }

    /// Runs a loudness scan session over `root`.
    pub fn run_loudness_scan(
        &self,
        root: &Path,
        enumerator: &dyn DirectoryEnumerator,
        progress: &dyn ProgressSink,
        status: &dyn StatusSink,
        cancel: &CancelToken,
    ) -> Result<ScanRun, ScanError> {
        self.run_scan(ScanKind::Loudness, root, enumerator, progress, status, cancel)
    }

    fn run_scan(
        &self,
        kind: ScanKind,
        root: &Path,
        enumerator: &dyn DirectoryEnumerator,
        progress: &dyn ProgressSink,
        status: &dyn StatusSink,
        cancel: &CancelToken,
    ) -> Result<ScanRun, ScanError> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("{} requested while another scan session is active", kind.label());
            return Ok(ScanRun::AlreadyScanning);
        }
        self.set_phase(ScanPhase::Scanning);

        let result = self.run_scan_session(kind, root, enumerator, progress, status, cancel);

        match &result {
            Ok(outcome) => self.set_phase(outcome.phase),
            Err(_) => self.set_phase(ScanPhase::Failed),
        }
        self.scanning.store(false, Ordering::SeqCst);
        result.map(ScanRun::Finished)
    }

    fn run_scan_session(
        &self,
        kind: ScanKind,
        root: &Path,
        enumerator: &dyn DirectoryEnumerator,
        progress: &dyn ProgressSink,
        status: &dyn StatusSink,
        cancel: &CancelToken,
    ) -> Result<ScanOutcome, ScanError> {
        let tool_check = match kind {
            ScanKind::Duration => self.prober.verify_duration_tool(),
            ScanKind::Loudness => self.prober.verify_loudness_tool(),
        };
        if let Err(err) = tool_check {
            status.status(&format!("{} failed: {}", kind.label(), err));
            return Err(ScanError::ToolUnavailable(err.to_string()));
        }

        if !root.is_dir() {
            status.status(&format!(
                "{} failed: folder is unavailable: {}",
                kind.label(),
                root.display()
            ));
            return Err(ScanError::DirectoryUnavailable(root.to_path_buf()));
        }

        let video_files: Vec<PathBuf> = enumerator
            .enumerate(root)
            .into_iter()
            .filter(|path| media_kind_for_path(path) == Some(MediaKind::Video))
            .collect();

        let cached_keys = match kind {
            ScanKind::Duration => self.durations.snapshot_keys(),
            ScanKind::Loudness => self.loudness.snapshot_keys(),
        };
        let (already_cached, to_scan): (Vec<PathBuf>, Vec<PathBuf>) =
            video_files.into_iter().partition(|path| {
                cached_keys.contains(&crate::library_index::normalize_path_key(
                    &path.to_string_lossy(),
                ))
            });
        let already_cached = already_cached.len();
        let total = already_cached + to_scan.len();

        progress.report(already_cached, total, 0);
        if to_scan.is_empty() {
            self.save_cache(kind);
            status.status(&format!(
                "{} complete: all {} file(s) already cached",
                kind.label(),
                total
            ));
            return Ok(ScanOutcome {
                phase: ScanPhase::Completed,
                already_cached,
                scanned: 0,
                errors: 0,
                skipped_missing: 0,
            });
        }

        info!(
            "{} starting: {} cached, {} to scan, {} worker(s)",
            kind.label(),
            already_cached,
            to_scan.len(),
            self.worker_count
        );

        let work_queue = Mutex::new(VecDeque::from(to_scan));
        let scanned = AtomicUsize::new(0);
        let errors = AtomicUsize::new(0);
        let skipped_missing = AtomicUsize::new(0);
        let attempted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..self.worker_count {
                scope.spawn(|| {
                    self.scan_worker_loop(
                        kind,
                        &work_queue,
                        &scanned,
                        &errors,
                        &skipped_missing,
                        &attempted,
                        already_cached,
                        total,
                        progress,
                        cancel,
                    );
                });
            }
        });

        // Partial progress survives cancellation and per-file failures.
        self.save_cache(kind);
        if let Err(err) = self.store.save() {
            warn!("Failed persisting library after {}: {}", kind.label(), err);
        }

        let outcome = ScanOutcome {
            phase: if cancel.is_cancelled() {
                ScanPhase::Cancelled
            } else {
                ScanPhase::Completed
            },
            already_cached,
            scanned: scanned.load(Ordering::Relaxed),
            errors: errors.load(Ordering::Relaxed),
            skipped_missing: skipped_missing.load(Ordering::Relaxed),
        };

        match outcome.phase {
            ScanPhase::Cancelled => status.status(&format!(
                "{} cancelled: {} scanned, {} error(s)",
                kind.label(),
                outcome.scanned,
                outcome.errors
            )),
            _ => status.status(&format!(
                "{} complete: {} scanned, {} cached, {} error(s)",
                kind.label(),
                outcome.scanned,
                already_cached,
                outcome.errors
            )),
        }
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_worker_loop(
        &self,
        kind: ScanKind,
        work_queue: &Mutex<VecDeque<PathBuf>>,
        scanned: &AtomicUsize,
        errors: &AtomicUsize,
        skipped_missing: &AtomicUsize,
        attempted: &AtomicUsize,
        already_cached: usize,
        total: usize,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let Some(file_path) = work_queue
                .lock()
                .expect("scan queue mutex should not be poisoned")
                .pop_front()
            else {
                return;
            };

            if !file_path.exists() {
                skipped_missing.fetch_add(1, Ordering::Relaxed);
                self.report_file_done(attempted, already_cached, total, errors, progress);
                continue;
            }

            let path_string = file_path.to_string_lossy().to_string();
            let committed = match kind {
                ScanKind::Duration => match self.prober.probe_duration(&file_path, cancel) {
                    Ok(probe) => {
                        self.durations.insert(&path_string, probe.duration_secs);
                        self.store.apply_duration_probe(
                            &path_string,
                            probe.duration_secs,
                            probe.has_audio,
                        );
                        true
                    }
                    Err(ProbeError::Cancelled) => return,
                    Err(err) => {
                        warn!("Duration probe failed for {}: {}", file_path.display(), err);
                        errors.fetch_add(1, Ordering::Relaxed);
                        false
                    }
                },
                ScanKind::Loudness => match self.prober.probe_loudness(&file_path, cancel) {
                    Ok(probe) => {
                        self.loudness.insert(
                            &path_string,
                            LoudnessMeasurement {
                                mean_volume_db: probe.mean_volume_db,
                                peak_db: probe.peak_db,
                            },
                        );
                        self.store.apply_loudness(&path_string, probe.mean_volume_db);
                        true
                    }
                    Err(ProbeError::Cancelled) => return,
                    Err(err) => {
                        warn!("Loudness probe failed for {}: {}", file_path.display(), err);
                        errors.fetch_add(1, Ordering::Relaxed);
                        false
                    }
                },
            };

            if committed {
                let done = scanned.fetch_add(1, Ordering::Relaxed) + 1;
                if done.is_multiple_of(CHECKPOINT_INTERVAL) {
                    self.save_cache(kind);
                }
            }
            self.report_file_done(attempted, already_cached, total, errors, progress);
        }
    }

    fn report_file_done(
        &self,
        attempted: &AtomicUsize,
        already_cached: usize,
        total: usize,
        errors: &AtomicUsize,
        progress: &dyn ProgressSink,
    ) {
        let processed = already_cached + attempted.fetch_add(1, Ordering::Relaxed) + 1;
        progress.report(processed, total, errors.load(Ordering::Relaxed));
    }

    fn save_cache(&self, kind: ScanKind) {
        let result = match kind {
            ScanKind::Duration => self.durations.save(),
            ScanKind::Loudness => self.loudness.save(),
        };
        if let Err(err) = result {
            warn!("Failed saving {} cache: {}", kind.label(), err);
        }
    }

    fn set_phase(&self, phase: ScanPhase) {
        *self
            .phase
            .lock()
            .expect("scan phase mutex should not be poisoned") = phase;
    }
}
