//! Exécution des conversions en arrière-plan.
//!
//! Chaque soumission devient un « run » suivi en mémoire : progression,
//! étiquette d'étape, job créé et issue finale. Un run peut être annulé tant
//! qu'il est en cours ; le job associé est alors marqué en échec. Un run
//! terminé reste consultable pendant `run_retention`, puis il est oublié.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::conversion::{
    cancel_pair, CancelHandle, CancelSignal, JobOrchestrator, ProgressListener,
};
use crate::domain::{CallerId, JobId, ModelId};
use crate::infrastructure::error::{AppError, AppResult};

pub type RunId = Uuid;

/// Configuration du worker
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Nombre maximum de conversions simultanées
    pub max_concurrent_runs: usize,
    /// Durée de conservation d'un run terminé
    pub run_retention: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            run_retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// État observable d'un run
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub state: RunState,
    pub progress: f32,
    pub label: Option<String>,
    pub job_id: Option<JobId>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub caller: CallerId,
}

impl RunSnapshot {
    fn running(run_id: RunId, caller: CallerId) -> Self {
        Self {
            run_id,
            state: RunState::Running,
            progress: 0.0,
            label: None,
            job_id: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            caller,
        }
    }
}

/// Demande de conversion soumise au worker
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub caller: CallerId,
    pub model_id: ModelId,
    pub audio: Bytes,
    pub mime_type: Option<String>,
}

struct RunEntry {
    snapshot: RunSnapshot,
    cancel: Option<CancelHandle>,
}

type RunRegistry = Arc<Mutex<HashMap<RunId, RunEntry>>>;

fn lock(runs: &RunRegistry) -> MutexGuard<'_, HashMap<RunId, RunEntry>> {
    runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn update(runs: &RunRegistry, run_id: RunId, apply: impl FnOnce(&mut RunSnapshot)) {
    if let Some(entry) = lock(runs).get_mut(&run_id) {
        apply(&mut entry.snapshot);
    }
}

/// Reporte les événements du pipeline dans l'instantané du run
struct SnapshotListener {
    run_id: RunId,
    runs: RunRegistry,
}

impl ProgressListener for SnapshotListener {
    fn on_progress(&self, percentage: f32) {
        update(&self.runs, self.run_id, |s| s.progress = percentage);
    }

    fn on_label(&self, label: &str) {
        update(&self.runs, self.run_id, |s| s.label = Some(label.to_string()));
    }

    fn on_job_created(&self, job_id: JobId) {
        update(&self.runs, self.run_id, |s| s.job_id = Some(job_id));
    }
}

#[derive(Clone)]
pub struct ConversionWorker {
    orchestrator: Arc<JobOrchestrator>,
    runs: RunRegistry,
    // Limite le nombre de conversions exécutées en parallèle
    limiter: Arc<Semaphore>,
    retention: Duration,
}

impl ConversionWorker {
    pub fn new(orchestrator: Arc<JobOrchestrator>, config: WorkerConfig) -> Self {
        Self {
            orchestrator,
            runs: Arc::new(Mutex::new(HashMap::new())),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
            retention: config.run_retention,
        }
    }

    /// Lance une conversion en tâche de fond et rend immédiatement son instantané
    pub fn submit(&self, request: ConversionRequest) -> RunSnapshot {
        let run_id = Uuid::new_v4();
        let (cancel_handle, cancel_signal) = cancel_pair();
        let snapshot = RunSnapshot::running(run_id, request.caller.clone());

        lock(&self.runs).insert(
            run_id,
            RunEntry {
                snapshot: snapshot.clone(),
                cancel: Some(cancel_handle),
            },
        );
        info!("📥 Run {} soumis pour le modèle {}", run_id, request.model_id);

        let worker = self.clone();
        tokio::spawn(async move {
            worker.execute(run_id, request, cancel_signal).await;
        });

        snapshot
    }

    async fn execute(self, run_id: RunId, request: ConversionRequest, cancel: CancelSignal) {
        let listener = Arc::new(SnapshotListener {
            run_id,
            runs: self.runs.clone(),
        });

        let outcome = self.run(run_id, request, listener, &cancel).await;
        self.finish(run_id, outcome);

        tokio::time::sleep(self.retention).await;
        if lock(&self.runs).remove(&run_id).is_some() {
            debug!("🧹 Run {} oublié", run_id);
        }
    }

    async fn run(
        &self,
        run_id: RunId,
        request: ConversionRequest,
        listener: Arc<SnapshotListener>,
        cancel: &CancelSignal,
    ) -> AppResult<JobId> {
        let limiter = self.limiter.clone();
        let _permit = cancel
            .guard(async move {
                limiter
                    .acquire_owned()
                    .await
                    .map_err(|_| AppError::Internal("Conversion worker is closed".to_string()))
            })
            .await?;
        debug!("⚙️  Run {} démarré", run_id);

        self.orchestrator
            .create_and_run(
                &request.caller,
                request.model_id,
                request.audio,
                request.mime_type.as_deref(),
                listener,
                cancel,
            )
            .await
    }

    fn finish(&self, run_id: RunId, outcome: AppResult<JobId>) {
        let mut runs = lock(&self.runs);
        let Some(entry) = runs.get_mut(&run_id) else {
            return;
        };
        entry.cancel = None;

        let snapshot = &mut entry.snapshot;
        snapshot.finished_at = Some(Utc::now());
        match outcome {
            Ok(job_id) => {
                snapshot.state = RunState::Succeeded;
                snapshot.job_id = Some(job_id);
                info!("✅ Run {} terminé (job {})", run_id, job_id);
            }
            Err(AppError::Canceled) => {
                snapshot.state = RunState::Canceled;
                snapshot.error = Some(AppError::Canceled.user_message());
                info!("🛑 Run {} annulé", run_id);
            }
            Err(e) => {
                snapshot.state = RunState::Failed;
                snapshot.error = Some(e.user_message());
                warn!("❌ Run {} en échec: {}", run_id, e);
            }
        }
    }

    /// Instantané d'un run appartenant à `caller`
    pub fn snapshot(&self, caller: &CallerId, run_id: RunId) -> AppResult<RunSnapshot> {
        lock(&self.runs)
            .get(&run_id)
            .filter(|entry| &entry.snapshot.caller == caller)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| AppError::NotFound(format!("Conversion run {}", run_id)))
    }

    /// Runs de `caller`, du plus récent au plus ancien
    pub fn runs_for(&self, caller: &CallerId) -> Vec<RunSnapshot> {
        let mut runs: Vec<RunSnapshot> = lock(&self.runs)
            .values()
            .filter(|entry| &entry.snapshot.caller == caller)
            .map(|entry| entry.snapshot.clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Demande l'annulation d'un run en cours
    pub fn cancel(&self, caller: &CallerId, run_id: RunId) -> AppResult<RunSnapshot> {
        let mut runs = lock(&self.runs);
        let entry = runs
            .get_mut(&run_id)
            .filter(|entry| &entry.snapshot.caller == caller)
            .ok_or_else(|| AppError::NotFound(format!("Conversion run {}", run_id)))?;

        let Some(cancel) = entry.cancel.take() else {
            return Err(AppError::Conflict(
                "Conversion run has already finished".to_string(),
            ));
        };
        // Sans effet si la tâche vient de terminer
        cancel.cancel();
        info!("🛑 Annulation demandée pour le run {}", run_id);

        Ok(entry.snapshot.clone())
    }
}
