//! # Job Read Model
//!
//! Lecture des jobs de conversion d'un utilisateur et politique de
//! rafraîchissement : tant qu'au moins un job est en cours, la collection
//! entière est relue à intervalle fixe.

use futures_util::Stream;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::domain::{CallerId, ConversionJob, JobId, ModelId};
use crate::infrastructure::database::DataStore;
use crate::infrastructure::error::{AppError, AppResult};

pub const UNKNOWN_MODEL_NAME: &str = "Unknown Model";

/// Politique de rafraîchissement déclenchée par niveau
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub interval: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

impl RefreshPolicy {
    /// Délai avant la prochaine relecture, ou `None` si tout est terminal
    pub fn next_refresh(&self, jobs: &[ConversionJob]) -> Option<Duration> {
        jobs.iter()
            .any(|job| job.status.is_in_flight())
            .then_some(self.interval)
    }
}

/// Résolution id de modèle → nom affichable
#[derive(Debug, Clone, Default)]
pub struct ModelNameLookup {
    names: HashMap<ModelId, String>,
}

impl ModelNameLookup {
    pub async fn for_caller(store: &dyn DataStore, caller: &CallerId) -> AppResult<Self> {
        let names = store
            .list_models_for_caller(caller)
            .await?
            .into_iter()
            .map(|model| (model.id, model.metadata.name))
            .collect();
        Ok(Self { names })
    }

    pub fn name_for(&self, id: &ModelId) -> &str {
        self.names
            .get(id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_MODEL_NAME)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: ConversionJob,
    pub model_name: String,
}

/// Instantané de la collection et délai de rafraîchissement suggéré
#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    pub jobs: Vec<JobView>,
    pub refresh_after_ms: Option<u64>,
}

pub struct JobService {
    store: Arc<dyn DataStore>,
    policy: RefreshPolicy,
}

impl JobService {
    pub fn new(store: Arc<dyn DataStore>, policy: RefreshPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Lister les jobs de l'appelant, du plus récent au plus ancien
    pub async fn list_jobs(&self, caller: &CallerId) -> AppResult<JobListing> {
        let jobs = self.store.list_jobs_for_caller(caller).await?;
        let refresh_after_ms = self
            .policy
            .next_refresh(&jobs)
            .map(|delay| delay.as_millis() as u64);
        let names = ModelNameLookup::for_caller(self.store.as_ref(), caller).await?;

        let jobs = jobs
            .into_iter()
            .map(|job| JobView {
                model_name: names.name_for(&job.target_model_id).to_string(),
                job,
            })
            .collect();

        Ok(JobListing {
            jobs,
            refresh_after_ms,
        })
    }

    /// Obtenir un job de l'appelant
    pub async fn get_job(&self, caller: &CallerId, id: JobId) -> AppResult<ConversionJob> {
        match self.store.get_job(id).await? {
            Some(job) if job.is_owned_by(caller) => Ok(job),
            _ => Err(AppError::NotFound(format!("Job {}", id))),
        }
    }

    /// Relit la collection tant que la politique le demande.
    ///
    /// Le flux se termine après le premier instantané sans job en cours,
    /// après une erreur, ou quand le consommateur l'abandonne.
    pub fn watch_jobs(self: Arc<Self>, caller: CallerId) -> impl Stream<Item = AppResult<JobListing>> {
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                let listing = self.list_jobs(&caller).await;
                let next = match &listing {
                    Ok(listing) => listing.refresh_after_ms.map(Duration::from_millis),
                    Err(_) => None,
                };

                if tx.send(listing).await.is_err() {
                    debug!(caller = %caller, "Suivi des jobs abandonné");
                    break;
                }
                match next {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => break,
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
