//! # Workers Module
//!
//! Tâches de fond de l'application :
//! - `conversion_worker.rs`: exécution des conversions soumises, suivi de
//!   leur progression et annulation

pub mod conversion_worker;

pub use conversion_worker::{
    ConversionRequest, ConversionWorker, RunId, RunSnapshot, RunState, WorkerConfig,
};
