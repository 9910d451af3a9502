//! # Data Store
//!
//! Contrat de persistance des modèles de voix et des jobs de conversion.
//! Toutes les opérations sont des appels potentiellement distants : elles
//! peuvent échouer avec une erreur de transport ou un rejet du backend.

use async_trait::async_trait;

use crate::domain::{
    BlobHandle, CallerId, ConversionJob, JobId, ModelId, ModelMetadata, VoiceModel,
};
use crate::infrastructure::error::AppResult;
use crate::infrastructure::storage::BlobStore;

pub mod memory;
pub mod postgres;

pub use memory::MemoryDataStore;
pub use postgres::PgDataStore;

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get_model(&self, id: ModelId) -> AppResult<Option<VoiceModel>>;

    /// Stocke l'audio d'entrée puis crée le job en `Processing`
    async fn create_job(
        &self,
        caller: &CallerId,
        target_model_id: ModelId,
        input: BlobHandle,
    ) -> AppResult<JobId>;

    /// Stocke le résultat puis passe le job en `Completed`
    async fn complete_job(&self, id: JobId, result: BlobHandle) -> AppResult<()>;

    async fn fail_job(&self, id: JobId, reason: &str) -> AppResult<()>;

    async fn list_jobs_for_caller(&self, caller: &CallerId) -> AppResult<Vec<ConversionJob>>;

    async fn get_job(&self, id: JobId) -> AppResult<Option<ConversionJob>>;

    async fn upload_model(
        &self,
        caller: &CallerId,
        metadata: ModelMetadata,
        audio: BlobHandle,
    ) -> AppResult<VoiceModel>;

    async fn list_models_for_caller(&self, caller: &CallerId) -> AppResult<Vec<VoiceModel>>;

    async fn delete_model(&self, caller: &CallerId, id: ModelId) -> AppResult<()>;
}

/// Transforme un handle porteur d'octets en handle URL via le stockage.
///
/// Un handle déjà stocké est renvoyé tel quel.
pub async fn persist_blob(blobs: &dyn BlobStore, handle: &BlobHandle) -> AppResult<BlobHandle> {
    if handle.direct_url().is_some() {
        handle.report_upload_progress(100.0);
        return Ok(handle.clone());
    }
    Ok(blobs.put(handle).await?.into_handle())
}
