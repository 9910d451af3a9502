//! # Conversion Pipeline
//!
//! Pilotage d'une conversion de voix de bout en bout :
//! - `cancel.rs`: annulation coopérative d'une exécution
//! - `inference.rs`: client d'inférence (création, polling, téléchargement)
//! - `progress.rs`: bandes de progression et libellés d'étape
//! - `pipeline.rs`: orchestrateur d'un job (modèle → upload → inférence → résultat)

pub mod cancel;
pub mod inference;
pub mod pipeline;
pub mod progress;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use inference::{InferenceClient, InferenceStage};
pub use pipeline::{JobOrchestrator, OrchestratorConfig};
pub use progress::{ProgressBand, ProgressListener, RunProgress};

pub use crate::infrastructure::replicate::InferenceParameters;

use std::time::Duration;

/// Cadence et budget du polling de prédiction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

impl PollSettings {
    /// Attente totale maximale avant timeout
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}
