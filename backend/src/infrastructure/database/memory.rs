use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use validator::Validate;

use super::{persist_blob, DataStore};
use crate::domain::{
    BlobHandle, CallerId, ConversionJob, JobId, ModelId, ModelMetadata, VoiceModel,
};
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::storage::BlobStore;

/// Persistance en mémoire, utilisée sans `DATABASE_URL` et dans les tests
pub struct MemoryDataStore {
    blobs: Arc<dyn BlobStore>,
    jobs: RwLock<HashMap<JobId, ConversionJob>>,
    models: RwLock<HashMap<ModelId, VoiceModel>>,
}

impl MemoryDataStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            jobs: RwLock::new(HashMap::new()),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Insère un modèle tel quel (sans passer par le stockage)
    pub async fn insert_model(&self, model: VoiceModel) {
        self.models.write().await.insert(model.id, model);
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn get_model(&self, id: ModelId) -> AppResult<Option<VoiceModel>> {
        Ok(self.models.read().await.get(&id).cloned())
    }

    async fn create_job(
        &self,
        caller: &CallerId,
        target_model_id: ModelId,
        input: BlobHandle,
    ) -> AppResult<JobId> {
        let stored = persist_blob(self.blobs.as_ref(), &input).await?;
        let job = ConversionJob::new(caller.clone(), target_model_id, stored);
        let id = job.id;

        self.jobs.write().await.insert(id, job);
        debug!(job_id = %id, "Job créé en mémoire");
        Ok(id)
    }

    async fn complete_job(&self, id: JobId, result: BlobHandle) -> AppResult<()> {
        if self.jobs.read().await.get(&id).is_none() {
            return Err(AppError::NotFound(format!("Job {}", id)));
        }

        let stored = persist_blob(self.blobs.as_ref(), &result).await?;
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;
        job.complete(stored)
    }

    async fn fail_job(&self, id: JobId, reason: &str) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;
        job.fail(reason)
    }

    async fn list_jobs_for_caller(&self, caller: &CallerId) -> AppResult<Vec<ConversionJob>> {
        let mut jobs: Vec<ConversionJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_owned_by(caller))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn get_job(&self, id: JobId) -> AppResult<Option<ConversionJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn upload_model(
        &self,
        caller: &CallerId,
        metadata: ModelMetadata,
        audio: BlobHandle,
    ) -> AppResult<VoiceModel> {
        metadata.validate()?;
        let stored = persist_blob(self.blobs.as_ref(), &audio).await?;
        let model = VoiceModel::new(caller.clone(), metadata, stored);

        self.models.write().await.insert(model.id, model.clone());
        Ok(model)
    }

    async fn list_models_for_caller(&self, caller: &CallerId) -> AppResult<Vec<VoiceModel>> {
        let mut models: Vec<VoiceModel> = self
            .models
            .read()
            .await
            .values()
            .filter(|model| &model.owner == caller)
            .cloned()
            .collect();
        models.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(models)
    }

    async fn delete_model(&self, caller: &CallerId, id: ModelId) -> AppResult<()> {
        let mut models = self.models.write().await;
        match models.get(&id) {
            Some(model) if &model.owner == caller => {
                models.remove(&id);
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("Voice model {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::infrastructure::storage::MemoryBlobStore;
    use uuid::Uuid;

    fn store() -> MemoryDataStore {
        MemoryDataStore::new(Arc::new(MemoryBlobStore::new("http://localhost:8080")))
    }

    fn metadata(name: &str) -> ModelMetadata {
        ModelMetadata {
            name: name.to_string(),
            description: "Studio takes".to_string(),
            format: "zip".to_string(),
            training_data: "20 minutes".to_string(),
        }
    }

    #[tokio::test]
    async fn test_job_lifecycle_stores_blobs() {
        let store = store();
        let caller = CallerId::new("alice");
        let id = store
            .create_job(&caller, Uuid::new_v4(), BlobHandle::from_bytes(&b"input"[..]))
            .await
            .unwrap();

        let job = store.get_job(id).await.unwrap().unwrap();
        assert!(job.status.is_in_flight());
        assert!(job.input_audio.direct_url().is_some());

        store
            .complete_job(id, BlobHandle::from_bytes(&b"output"[..]))
            .await
            .unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        match job.status {
            JobStatus::Completed { result, .. } => assert!(result.direct_url().is_some()),
            other => panic!("unexpected status {:?}", other),
        }

        let err = store.fail_job(id, "too late").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_jobs_are_scoped_to_their_creator() {
        let store = store();
        let alice = CallerId::new("alice");
        let bob = CallerId::new("bob");
        store
            .create_job(&alice, Uuid::new_v4(), BlobHandle::from_bytes(&b"a"[..]))
            .await
            .unwrap();
        store
            .create_job(&bob, Uuid::new_v4(), BlobHandle::from_bytes(&b"b"[..]))
            .await
            .unwrap();

        let jobs = store.list_jobs_for_caller(&alice).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].creator, alice);
    }

    #[tokio::test]
    async fn test_model_management() {
        let store = store();
        let alice = CallerId::new("alice");
        let model = store
            .upload_model(&alice, metadata("Tenor"), BlobHandle::from_bytes(&b"ref"[..]))
            .await
            .unwrap();
        assert!(model.audio_locator().is_ok());

        let invalid = store
            .upload_model(&alice, metadata(""), BlobHandle::from_bytes(&b"ref"[..]))
            .await;
        assert!(matches!(invalid, Err(AppError::InvalidInput(_))));

        assert_eq!(store.list_models_for_caller(&alice).await.unwrap().len(), 1);
        let denied = store.delete_model(&CallerId::new("bob"), model.id).await;
        assert!(matches!(denied, Err(AppError::NotFound(_))));

        store.delete_model(&alice, model.id).await.unwrap();
        assert!(store.get_model(model.id).await.unwrap().is_none());
    }
}
