//! Runs text-to-narration conversions as background jobs.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::assembler::{AudioAssembler, LabeledClip};
use crate::audio::AudioClip;
use crate::cascade::{panic_detail, SynthesisCascade};
use crate::classifier::{LanguageDetector, WordClassifier, DEFAULT_SHORT_WORD_THRESHOLD};
use crate::jobs::{JobArtifact, JobError, JobId, JobRegistry, JobSnapshot, JobStatus};
use crate::segmenter::segment_text;
use crate::Segment;

pub const PLACEHOLDER_BACKEND: &str = "placeholder";

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorSettings {
    /// Silence substituted for a segment no backend could voice.
    pub placeholder_ms: u32,
    /// Backend calls in flight across all jobs.
    pub max_concurrent_synthesis: usize,
    pub short_word_threshold: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            placeholder_ms: 1_000,
            max_concurrent_synthesis: 4,
            short_word_threshold: DEFAULT_SHORT_WORD_THRESHOLD,
        }
    }
}

/// Result of a synchronous conversion.
#[derive(Debug, Clone)]
pub struct SyncOutput {
    pub job_id: JobId,
    pub artifact: Arc<JobArtifact>,
}

struct Inner {
    registry: JobRegistry,
    cascade: SynthesisCascade,
    assembler: AudioAssembler,
    detector: Arc<dyn LanguageDetector>,
    settings: OrchestratorSettings,
    permits: Semaphore,
}

/// Owns the job registry and the pipeline components. Cheap to clone.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("cascade", &self.inner.cascade)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl JobOrchestrator {
    pub fn new(
        cascade: SynthesisCascade,
        assembler: AudioAssembler,
        detector: Arc<dyn LanguageDetector>,
        settings: OrchestratorSettings,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent_synthesis.max(1));
        Self {
            inner: Arc::new(Inner {
                registry: JobRegistry::new(),
                cascade,
                assembler,
                detector,
                settings,
                permits,
            }),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn cascade(&self) -> &SynthesisCascade {
        &self.inner.cascade
    }

    pub fn assembler(&self) -> &AudioAssembler {
        &self.inner.assembler
    }

    /// Queue a conversion and return its id immediately.
    pub fn submit(&self, text: String) -> Result<JobId, JobError> {
        self.spawn(text).map(|(id, _)| id)
    }

    pub fn progress(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        self.inner.registry.snapshot(id)
    }

    pub fn result(&self, id: &JobId) -> Result<Arc<JobArtifact>, JobError> {
        self.inner.registry.artifact(id)
    }

    pub fn cancel(&self, id: &JobId) -> Result<JobSnapshot, JobError> {
        let snapshot = self.inner.registry.cancel(id)?;
        info!(job_id = %id, "Cancel requested (status now {})", snapshot.status);
        Ok(snapshot)
    }

    /// Submit, wait for the job to end and fetch its audio.
    pub async fn synthesize_sync(&self, text: String) -> Result<SyncOutput, JobError> {
        let (id, handle) = self.spawn(text)?;
        if let Err(e) = handle.await {
            error!(job_id = %id, "Job task failed: {e}");
        }

        let snapshot = self.inner.registry.snapshot(&id)?;
        match snapshot.status {
            JobStatus::Finished => Ok(SyncOutput {
                artifact: self.inner.registry.artifact(&id)?,
                job_id: id,
            }),
            JobStatus::Error => Err(JobError::Failed(snapshot.error.unwrap_or(snapshot.message))),
            status => Err(JobError::NotFinished(status)),
        }
    }

    /// Evict old terminal jobs every `period`, forever.
    pub fn spawn_eviction(&self, max_age: std::time::Duration, period: std::time::Duration) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = inner.registry.evict_expired(max_age);
                if removed > 0 {
                    info!("Evicted {removed} expired job(s)");
                }
            }
        })
    }

    fn spawn(&self, text: String) -> Result<(JobId, JoinHandle<()>), JobError> {
        if text.trim().is_empty() {
            return Err(JobError::NoContent);
        }

        let id = self.inner.registry.create();
        let cancelled = self
            .inner
            .registry
            .cancel_flag(&id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;
        info!(job_id = %id, chars = text.chars().count(), "Job queued");

        let inner = self.inner.clone();
        let job_id = id.clone();
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(run_job(&inner, &job_id, text, &cancelled))
                .catch_unwind()
                .await;

            let reason = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => panic_message(panic.as_ref()),
            };
            error!(job_id = %job_id, "Job failed: {reason}");
            inner.registry.fail(&job_id, reason);
        });

        Ok((id, handle))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    format!("internal error: {}", panic_detail(panic))
}

/// 10..=90 while segments are being synthesized.
fn synthesis_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 90;
    }
    (10 + 80 * completed.min(total) / total) as u8
}

async fn run_job(inner: &Inner, id: &JobId, text: String, cancelled: &AtomicBool) -> anyhow::Result<()> {
    let registry = &inner.registry;
    registry.update(id, 5, "Splitting text into segments");

    let detector = inner.detector.clone();
    let threshold = inner.settings.short_word_threshold;
    let segments: Vec<Segment> = tokio::task::spawn_blocking(move || {
        let mut classifier = WordClassifier::with_threshold(detector, threshold);
        segment_text(&text, &mut classifier)
    })
    .await
    .context("segmentation task failed")?;

    if segments.is_empty() {
        return Err(anyhow!(JobError::NoContent));
    }
    if cancelled.load(Ordering::SeqCst) {
        return Ok(());
    }

    let total = segments.len();
    registry.update(id, 10, format!("Detected {total} segments"));
    info!(job_id = %id, segments = total, "Segmentation complete");

    let output_rate = inner.assembler.config().output_sample_rate;
    let placeholder_ms = inner.settings.placeholder_ms;
    let fan_out = inner.settings.max_concurrent_synthesis.max(1);

    let mut slots: Vec<Option<LabeledClip>> = vec![None; total];
    let mut results = futures::stream::iter(segments.into_iter().map(|segment| async move {
        let _permit = inner.permits.acquire().await.ok();
        if cancelled.load(Ordering::SeqCst) {
            return (segment.order, None);
        }

        let audio = match inner.cascade.synthesize(&segment.text, segment.language).await {
            Ok(done) => {
                info!(job_id = %id, segment = segment.order, backend = %done.backend, "Segment synthesized");
                done.audio
            }
            Err(e) => {
                warn!(
                    job_id = %id,
                    segment = segment.order,
                    backend = PLACEHOLDER_BACKEND,
                    "Using {placeholder_ms} ms of silence: {e}"
                );
                AudioClip::silence(placeholder_ms, output_rate)
            }
        };
        let clip = LabeledClip {
            audio,
            language: segment.language,
        };
        (segment.order, Some(clip))
    }))
    .buffer_unordered(fan_out);

    let mut completed = 0;
    while let Some((order, clip)) = results.next().await {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        if let Some(slot) = slots.get_mut(order) {
            *slot = clip;
        }
        completed += 1;
        registry.update(
            id,
            synthesis_percent(completed, total),
            format!("Synthesized {completed}/{total} segments"),
        );
    }
    drop(results);

    if cancelled.load(Ordering::SeqCst) {
        info!(job_id = %id, "Job cancelled before assembly");
        return Ok(());
    }

    let clips: Vec<LabeledClip> = slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| anyhow!("audio missing for one or more segments"))?;

    registry.update(id, 92, "Combining audio segments");
    let assembler = inner.assembler.clone();
    let (wav, track) = tokio::task::spawn_blocking(move || assembler.assemble_wav(&clips))
        .await
        .context("assembly task failed")??;

    if cancelled.load(Ordering::SeqCst) {
        return Ok(());
    }

    let artifact = JobArtifact {
        duration_ms: track.duration_ms(),
        sample_rate: track.sample_rate,
        segments: total,
        wav,
    };
    info!(job_id = %id, duration_ms = artifact.duration_ms, "Job finished");
    registry.finish(id, artifact);
    Ok(())
}
