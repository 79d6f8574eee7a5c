//! Album indexing jobs.
//!
//! `encode_album` turns a list of photos into stored embeddings on a
//! background task. Each photo is decoded, preprocessed, encoded and written
//! independently; a failing photo is recorded and the job moves on. The job
//! publishes a `JobProgress` snapshot after every photo on a watch channel,
//! so observers never slow the job down.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::embeddings::{EncoderService, EncodingFailure};
use super::storage::RecordStore;
use super::types::{AlbumId, EmbeddingRecord, PhotoId};
use crate::eid::JobId;
use crate::gallery::PhotoSource;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    /// Every photo was encoded and stored.
    Completed,
    /// Every photo was processed, at least one failed.
    Incomplete,
    Cancelled,
    /// The job stopped early; photos stored before the failure are kept.
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Decode,
    Inference,
    StoreWrite,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub photo_id: PhotoId,
    pub kind: FailureKind,
    pub message: String,
}

/// Point-in-time view of a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub album_id: AlbumId,
    /// Photos processed so far, successful or not
    pub completed: usize,
    /// Photos this job will process
    pub total: usize,
    pub succeeded: usize,
    /// Photos left out because they were already indexed
    pub skipped_existing: usize,
    pub failures: Vec<ItemFailure>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Which photos an encode request re-encodes.
#[derive(Clone, Debug, Default)]
pub struct EncodeOptions {
    /// Re-encode photos that are already indexed
    pub reencode: bool,
    /// Re-encode these photos even when `reencode` is off
    pub force: Vec<PhotoId>,
}

/// Caller's view of a running or finished job.
#[derive(Clone)]
pub struct JobHandle {
    job_id: JobId,
    progress: watch::Receiver<JobProgress>,
    cancel: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Latest snapshot.
    pub fn progress(&self) -> JobProgress {
        self.progress.borrow().clone()
    }

    /// A receiver that is notified on every snapshot.
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.progress.clone()
    }

    /// Ask the job to stop before its next photo.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Resolve once the job reaches a terminal status.
    pub async fn wait(&self) -> JobProgress {
        let mut rx = self.progress.clone();
        let result = rx
            .wait_for(|p| p.status.is_terminal())
            .await
            .map(|p| p.clone());
        match result {
            Ok(progress) => progress,
            Err(_) => rx.borrow().clone(),
        }
    }
}

struct JobTable {
    active: HashMap<AlbumId, JobHandle>,
    /// Finished jobs, newest first
    history: VecDeque<JobProgress>,
    history_cap: usize,
}

impl JobTable {
    fn finish(&mut self, progress: JobProgress) {
        let is_current = self
            .active
            .get(&progress.album_id)
            .map(|h| h.job_id == progress.job_id)
            .unwrap_or(false);
        if is_current {
            self.active.remove(&progress.album_id);
        }

        self.history.push_front(progress);
        self.history.truncate(self.history_cap);
    }
}

enum ItemError {
    /// This photo failed; the job continues.
    Skip(ItemFailure),
    /// The model is unusable; the job stops.
    Abort(EncodingFailure),
}

/// Publishes the terminal snapshot of one job and takes it out of the
/// active table.
///
/// If the job task ends without calling `finish` (a panic, or the runtime
/// shutting down), dropping the guard marks the job `Failed` instead, so the
/// album does not keep a dead handle.
struct JobGuard {
    jobs: Arc<Mutex<JobTable>>,
    tx: watch::Sender<JobProgress>,
    finished: bool,
}

impl JobGuard {
    fn finish(mut self, mut progress: JobProgress) {
        self.publish(&mut progress);
        self.finished = true;
    }

    fn publish(&self, progress: &mut JobProgress) {
        progress.finished_at = Some(Utc::now());
        // table first, so a woken waiter never sees the job still active
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.finish(progress.clone());
        self.tx.send_replace(progress.clone());
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut progress = self.tx.borrow().clone();
        log::error!(
            "Job {} for album {} stopped unexpectedly",
            progress.job_id,
            progress.album_id
        );
        progress.status = JobStatus::Failed("indexing task stopped unexpectedly".to_string());
        self.publish(&mut progress);
    }
}

/// Runs album encoding jobs against one encoder service and store.
pub struct IndexingPipeline {
    encoders: Arc<EncoderService>,
    store: Arc<dyn RecordStore>,
    photos: Arc<dyn PhotoSource>,
    store_write_retries: u32,
    jobs: Arc<Mutex<JobTable>>,
}

impl IndexingPipeline {
    pub fn new(
        encoders: Arc<EncoderService>,
        store: Arc<dyn RecordStore>,
        photos: Arc<dyn PhotoSource>,
        store_write_retries: u32,
        job_history: usize,
    ) -> Self {
        Self {
            encoders,
            store,
            photos,
            store_write_retries,
            jobs: Arc::new(Mutex::new(JobTable {
                active: HashMap::new(),
                history: VecDeque::new(),
                history_cap: job_history.max(1),
            })),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, JobTable> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start encoding `photo_ids` into `album_id` on a background task.
    ///
    /// If the album already has an active job, that job's handle is
    /// returned and nothing new is started. Must be called within a tokio
    /// runtime.
    pub fn encode_album(
        &self,
        album_id: AlbumId,
        photo_ids: Vec<PhotoId>,
        options: EncodeOptions,
    ) -> JobHandle {
        let mut jobs = self.jobs();
        if let Some(handle) = jobs.active.get(&album_id) {
            log::info!(
                "Album {} already has active job {}, not starting another",
                album_id,
                handle.job_id
            );
            return handle.clone();
        }

        let force: HashSet<&PhotoId> = options.force.iter().collect();
        let mut seen = HashSet::new();
        let mut skipped_existing = 0;
        let mut pending = Vec::with_capacity(photo_ids.len());
        for photo_id in &photo_ids {
            if !seen.insert(photo_id) {
                continue;
            }
            if !options.reencode && !force.contains(photo_id) && self.store.contains(photo_id) {
                skipped_existing += 1;
                continue;
            }
            pending.push(photo_id.clone());
        }

        let job_id = JobId::new();
        let progress = JobProgress {
            job_id: job_id.clone(),
            album_id: album_id.clone(),
            completed: 0,
            total: pending.len(),
            succeeded: 0,
            skipped_existing,
            failures: Vec::new(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        };
        let (tx, rx) = watch::channel(progress.clone());
        let cancel = Arc::new(AtomicBool::new(false));

        let handle = JobHandle {
            job_id: job_id.clone(),
            progress: rx,
            cancel: cancel.clone(),
        };
        jobs.active.insert(album_id.clone(), handle.clone());
        drop(jobs);

        log::info!(
            "Starting job {} for album {}: {} to encode, {} already indexed",
            job_id,
            album_id,
            pending.len(),
            skipped_existing
        );

        let runner = JobRunner {
            encoders: self.encoders.clone(),
            store: self.store.clone(),
            photos: self.photos.clone(),
            store_write_retries: self.store_write_retries,
            album_id,
            cancel,
        };
        let guard = JobGuard {
            jobs: self.jobs.clone(),
            tx,
            finished: false,
        };

        tokio::spawn(async move {
            let progress = runner.run(pending, progress, &guard.tx).await;

            log::info!(
                "Job {} for album {} finished: {:?}, {}/{} encoded, {} failed",
                progress.job_id,
                progress.album_id,
                progress.status,
                progress.succeeded,
                progress.total,
                progress.failures.len()
            );
            guard.finish(progress);
        });

        handle
    }

    /// Request cancellation. Returns false if no such job is active.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let jobs = self.jobs();
        match jobs.active.values().find(|h| &h.job_id == job_id) {
            Some(handle) => {
                log::info!("Cancelling job {}", job_id);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshot of an active or recently finished job.
    pub fn job(&self, job_id: &JobId) -> Option<JobProgress> {
        let jobs = self.jobs();
        if let Some(handle) = jobs.active.values().find(|h| &h.job_id == job_id) {
            return Some(handle.progress());
        }
        jobs.history.iter().find(|p| &p.job_id == job_id).cloned()
    }

    pub fn active_job_for(&self, album_id: &AlbumId) -> Option<JobHandle> {
        self.jobs().active.get(album_id).cloned()
    }

    pub fn active_jobs(&self) -> Vec<JobProgress> {
        let mut active: Vec<JobProgress> =
            self.jobs().active.values().map(|h| h.progress()).collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    /// Finished jobs, newest first.
    pub fn history(&self) -> Vec<JobProgress> {
        self.jobs().history.iter().cloned().collect()
    }
}

struct JobRunner {
    encoders: Arc<EncoderService>,
    store: Arc<dyn RecordStore>,
    photos: Arc<dyn PhotoSource>,
    store_write_retries: u32,
    album_id: AlbumId,
    cancel: Arc<AtomicBool>,
}

impl JobRunner {
    async fn run(
        &self,
        pending: Vec<PhotoId>,
        mut progress: JobProgress,
        tx: &watch::Sender<JobProgress>,
    ) -> JobProgress {
        for photo_id in pending {
            if self.cancel.load(Ordering::SeqCst) {
                progress.status = JobStatus::Cancelled;
                return progress;
            }

            let outcome = self.process(&photo_id).await;
            progress.completed += 1;
            match outcome {
                Ok(()) => progress.succeeded += 1,
                Err(ItemError::Skip(failure)) => {
                    log::warn!(
                        "Skipping {} ({:?}): {}",
                        failure.photo_id,
                        failure.kind,
                        failure.message
                    );
                    progress.failures.push(failure);
                }
                Err(ItemError::Abort(failure)) => {
                    log::error!("Aborting job {}: {}", progress.job_id, failure);
                    progress.failures.push(ItemFailure {
                        photo_id: failure.photo_id.clone(),
                        kind: FailureKind::Inference,
                        message: failure.source.to_string(),
                    });
                    progress.status = JobStatus::Failed(failure.to_string());
                    return progress;
                }
            }

            tx.send_replace(progress.clone());
        }

        progress.status = if progress.failures.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::Incomplete
        };
        progress
    }

    async fn process(&self, photo_id: &PhotoId) -> Result<(), ItemError> {
        let skip = |kind: FailureKind, message: String| {
            ItemError::Skip(ItemFailure {
                photo_id: photo_id.clone(),
                kind,
                message,
            })
        };

        let photos = self.photos.clone();
        let id = photo_id.clone();
        let image = tokio::task::spawn_blocking(move || photos.decode(&id))
            .await
            .map_err(|e| skip(FailureKind::Decode, format!("decoder panicked: {e}")))?
            .map_err(|e| skip(FailureKind::Decode, e.to_string()))?;

        let vector = match self.encoders.image().encode_photo(photo_id, image).await {
            Ok(vector) => vector,
            Err(failure) if failure.source.is_fatal() => return Err(ItemError::Abort(failure)),
            Err(failure) => return Err(skip(FailureKind::Inference, failure.source.to_string())),
        };

        let record = EmbeddingRecord::new(photo_id.clone(), self.album_id.clone(), vector);
        self.write(record)
            .await
            .map_err(|message| skip(FailureKind::StoreWrite, message))
    }

    /// Upsert with up to `store_write_retries` extra attempts.
    async fn write(&self, record: EmbeddingRecord) -> Result<(), String> {
        let mut attempt = 0;
        loop {
            let store = self.store.clone();
            let next = record.clone();
            let result = tokio::task::spawn_blocking(move || store.upsert(next))
                .await
                .map_err(|e| format!("store write panicked: {e}"))
                .and_then(|r| r.map_err(|e| e.to_string()));

            match result {
                Ok(()) => return Ok(()),
                Err(message) if attempt < self.store_write_retries => {
                    attempt += 1;
                    log::warn!(
                        "Store write for {} failed, retrying (attempt {}/{}): {}",
                        record.photo_id,
                        attempt,
                        self.store_write_retries,
                        message
                    );
                }
                Err(message) => return Err(message),
            }
        }
    }
}
