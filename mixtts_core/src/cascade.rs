//! Ordered fallback across synthesis backends.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::audio::AudioClip;
use crate::backends::{BackendError, Engine, SynthesisBackend, VoiceConfig};
use crate::Language;

pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("No synthesis backends are configured")]
    NoBackends,

    #[error("All synthesis backends failed: {}", describe(.tried))]
    Exhausted { tried: Vec<(String, String)> },
}

fn describe(tried: &[(String, String)]) -> String {
    tried
        .iter()
        .map(|(name, reason)| format!("{name} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text carried by a panic payload.
pub(crate) fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Which engine to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePreference {
    #[default]
    Auto,
    Named(Engine),
}

impl EnginePreference {
    /// Full try order: the named engine (if any) followed by the rest of the
    /// default priority order.
    pub fn order(self) -> Vec<Engine> {
        match self {
            EnginePreference::Auto => Engine::PRIORITY.to_vec(),
            EnginePreference::Named(first) => std::iter::once(first)
                .chain(Engine::PRIORITY.into_iter().filter(|e| *e != first))
                .collect(),
        }
    }
}

impl FromStr for EnginePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(EnginePreference::Auto)
        } else {
            s.parse().map(EnginePreference::Named)
        }
    }
}

/// Audio for one segment plus the backend that produced it.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub audio: AudioClip,
    pub backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStats {
    pub name: String,
    pub successes: u64,
    pub failures: u64,
}

struct Registered {
    backend: Arc<dyn SynthesisBackend>,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Backends in try order, sharing one voice configuration.
pub struct SynthesisCascade {
    backends: Vec<Registered>,
    voice: VoiceConfig,
    timeout: Duration,
}

impl std::fmt::Debug for SynthesisCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisCascade")
            .field("backends", &self.backend_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SynthesisCascade {
    /// Use `backends` exactly in the given order.
    pub fn new(backends: Vec<Arc<dyn SynthesisBackend>>, voice: VoiceConfig, timeout: Duration) -> Self {
        Self {
            backends: backends
                .into_iter()
                .map(|backend| Registered {
                    backend,
                    successes: AtomicU64::new(0),
                    failures: AtomicU64::new(0),
                })
                .collect(),
            voice,
            timeout,
        }
    }

    /// Order the available engines by `preference`. Engines missing from
    /// `available` are skipped.
    pub fn from_available(
        mut available: Vec<(Engine, Arc<dyn SynthesisBackend>)>,
        preference: EnginePreference,
        voice: VoiceConfig,
        timeout: Duration,
    ) -> Self {
        let mut ordered = Vec::with_capacity(available.len());
        for engine in preference.order() {
            if let Some(pos) = available.iter().position(|(e, _)| *e == engine) {
                ordered.push(available.remove(pos).1);
            }
        }
        Self::new(ordered, voice, timeout)
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|r| r.backend.name().to_string()).collect()
    }

    pub fn voice(&self) -> &VoiceConfig {
        &self.voice
    }

    pub fn stats(&self) -> Vec<BackendStats> {
        self.backends
            .iter()
            .map(|r| BackendStats {
                name: r.backend.name().to_string(),
                successes: r.successes.load(Ordering::Relaxed),
                failures: r.failures.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Try each backend in order until one returns audio.
    pub async fn synthesize(&self, text: &str, language: Language) -> Result<Synthesized, CascadeError> {
        if self.backends.is_empty() {
            return Err(CascadeError::NoBackends);
        }

        let mut tried = Vec::with_capacity(self.backends.len());
        for reg in &self.backends {
            let name = reg.backend.name();
            // A panicking adapter is that backend's failure, not the caller's
            let call = tokio::time::timeout(self.timeout, reg.backend.try_synthesize(text, language, &self.voice));
            let attempt = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(BackendError::Timeout(self.timeout.as_millis() as u64)),
                Err(panic) => Err(BackendError::Synthesis(format!(
                    "backend panicked: {}",
                    panic_detail(panic.as_ref())
                ))),
            };

            match attempt {
                Ok(audio) if !audio.is_empty() => {
                    reg.successes.fetch_add(1, Ordering::Relaxed);
                    debug!("{name} synthesized {} ms of {language}", audio.duration_ms());
                    return Ok(Synthesized {
                        audio,
                        backend: name.to_string(),
                    });
                }
                Ok(_) => {
                    reg.failures.fetch_add(1, Ordering::Relaxed);
                    warn!("{name} returned empty audio, falling back");
                    tried.push((name.to_string(), "empty audio".to_string()));
                }
                Err(e) => {
                    reg.failures.fetch_add(1, Ordering::Relaxed);
                    warn!("{name} failed, falling back: {e}");
                    tried.push((name.to_string(), e.to_string()));
                }
            }
        }

        Err(CascadeError::Exhausted { tried })
    }
}
