//! Progression d'une exécution de conversion.
//!
//! Chaque sous-opération reçoit une [`ProgressBand`] explicite plutôt qu'une
//! closure partagée : deux exécutions concurrentes ne peuvent pas mélanger
//! leurs pourcentages.

use std::sync::{Arc, Mutex};

use crate::domain::blob::UploadObserver;
use crate::domain::jobs::JobId;

use super::inference::InferenceStage;
use crate::infrastructure::replicate::PredictionStatus;

pub const MODEL_FETCHED: f32 = 5.0;
pub const INPUT_UPLOAD_BAND: ProgressBand = ProgressBand::new(10.0, 20.0);
pub const INFERENCE_BAND: ProgressBand = ProgressBand::new(20.0, 80.0);
pub const RESULT_UPLOAD_BAND: ProgressBand = ProgressBand::new(85.0, 95.0);
pub const COMPLETE: f32 = 100.0;

pub const LABEL_FETCHING_MODEL: &str = "Fetching voice model";
pub const LABEL_UPLOADING_INPUT: &str = "Uploading input audio";
pub const LABEL_CONVERTING: &str = "Running voice conversion";
pub const LABEL_DOWNLOADING: &str = "Downloading converted audio";
pub const LABEL_SAVING: &str = "Saving result";
pub const LABEL_COMPLETE: &str = "Complete";

/// Intervalle `[lo, hi]` dans lequel une sous-opération rapporte 0-100%
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub lo: f32,
    pub hi: f32,
}

impl ProgressBand {
    pub const fn new(lo: f32, hi: f32) -> Self {
        Self { lo, hi }
    }

    /// `lo + pct * (hi - lo) / 100`, avec `pct` borné à 0-100
    pub fn map(&self, pct: f32) -> f32 {
        self.lo + pct.clamp(0.0, 100.0) * (self.hi - self.lo) / 100.0
    }
}

/// Point de contrôle fixe pour chaque étape du client d'inférence
pub fn stage_checkpoint(stage: InferenceStage) -> Option<f32> {
    match stage {
        InferenceStage::Remote(PredictionStatus::Starting) => Some(25.0),
        InferenceStage::Remote(PredictionStatus::Processing) => Some(50.0),
        InferenceStage::Downloading => Some(75.0),
        InferenceStage::Remote(PredictionStatus::Succeeded) => Some(INFERENCE_BAND.hi),
        InferenceStage::Remote(PredictionStatus::Failed | PredictionStatus::Canceled) => None,
    }
}

/// Destinataire des signaux de progression d'une exécution
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, percentage: f32);

    fn on_label(&self, label: &str);

    /// Appelé dès que le job persistant existe
    fn on_job_created(&self, _job_id: JobId) {}
}

/// Progression d'une exécution : ne décroît jamais
#[derive(Clone)]
pub struct RunProgress {
    listener: Arc<dyn ProgressListener>,
    high_water: Arc<Mutex<f32>>,
}

impl RunProgress {
    pub fn new(listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            listener,
            high_water: Arc::new(Mutex::new(0.0)),
        }
    }

    /// Émet `percentage` s'il dépasse la dernière valeur émise
    pub fn report(&self, percentage: f32) {
        let percentage = percentage.clamp(0.0, COMPLETE);
        {
            let mut high_water = self
                .high_water
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if percentage <= *high_water {
                return;
            }
            *high_water = percentage;
        }
        self.listener.on_progress(percentage);
    }

    pub fn label(&self, label: &str) {
        self.listener.on_label(label);
    }

    pub fn job_created(&self, job_id: JobId) {
        self.listener.on_job_created(job_id);
    }

    /// Dernière valeur émise
    pub fn current(&self) -> f32 {
        *self
            .high_water
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Observateur d'upload projeté dans `band`
    pub fn observer(&self, band: ProgressBand) -> UploadObserver {
        let progress = self.clone();
        Arc::new(move |pct| progress.report(band.map(pct)))
    }
}
