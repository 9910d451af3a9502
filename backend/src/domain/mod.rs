//! # Domain Models Module
//!
//! Entités métier de la conversion de voix, partagées par l'API, le pipeline
//! et les implémentations de persistance.
//!
//! ## Structure
//! - `user.rs`: Identité de l'appelant
//! - `blob.rs`: Handle opaque vers un contenu binaire
//! - `jobs.rs`: Job de conversion et son statut
//! - `model.rs`: Modèle de voix et ses métadonnées

pub mod blob;
pub mod jobs;
pub mod model;
pub mod user;

pub use blob::BlobHandle;
pub use jobs::{ConversionJob, JobId, JobStatus};
pub use model::{ModelId, ModelMetadata, VoiceModel};
pub use user::CallerId;
