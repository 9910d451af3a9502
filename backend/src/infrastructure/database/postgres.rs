use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{persist_blob, DataStore};
use crate::domain::{
    BlobHandle, CallerId, ConversionJob, JobId, JobStatus, ModelId, ModelMetadata, VoiceModel,
};
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::storage::BlobStore;

const JOB_COLUMNS: &str = "id, creator, status, input_url, source_model_id, target_model_id, \
     result_url, failure_reason, upload_time, processing_time, failed_at, created_at, updated_at";

const MODEL_COLUMNS: &str =
    "id, owner, name, description, format, training_data, storage_url, created_at";

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    creator: String,
    status: String,
    input_url: String,
    source_model_id: Option<Uuid>,
    target_model_id: Uuid,
    result_url: Option<String>,
    failure_reason: Option<String>,
    upload_time: DateTime<Utc>,
    processing_time: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for ConversionJob {
    type Error = AppError;

    fn try_from(row: JobRow) -> AppResult<Self> {
        let status = match (row.status.as_str(), row.result_url, row.processing_time) {
            ("processing", _, _) => JobStatus::Processing {
                upload_time: row.upload_time,
            },
            ("completed", Some(url), Some(processing_time)) => JobStatus::Completed {
                result: BlobHandle::from_url(url),
                upload_time: row.upload_time,
                processing_time,
            },
            ("failed", _, _) => JobStatus::Failed {
                reason: row.failure_reason.unwrap_or_default(),
                upload_time: row.upload_time,
                failed_at: row.failed_at.unwrap_or(row.updated_at),
            },
            (other, _, _) => {
                return Err(AppError::Backend(format!(
                    "Inconsistent job row {} with status '{}'",
                    row.id, other
                )))
            }
        };

        Ok(ConversionJob {
            id: row.id,
            status,
            creator: CallerId::new(row.creator),
            input_audio: BlobHandle::from_url(row.input_url),
            source_model_id: row.source_model_id,
            target_model_id: row.target_model_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ModelRow {
    id: Uuid,
    owner: String,
    name: String,
    description: String,
    format: String,
    training_data: String,
    storage_url: String,
    created_at: DateTime<Utc>,
}

impl From<ModelRow> for VoiceModel {
    fn from(row: ModelRow) -> Self {
        VoiceModel {
            id: row.id,
            owner: CallerId::new(row.owner),
            metadata: ModelMetadata {
                name: row.name,
                description: row.description,
                format: row.format,
                training_data: row.training_data,
            },
            storage: BlobHandle::from_url(row.storage_url),
            created_at: row.created_at,
        }
    }
}

/// Persistance PostgreSQL
#[derive(Clone)]
pub struct PgDataStore {
    pool: PgPool,
    blobs: Arc<dyn BlobStore>,
}

impl PgDataStore {
    /// Ouvre le pool et applique les migrations embarquées
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        blobs: Arc<dyn BlobStore>,
    ) -> AppResult<Self> {
        info!("🔌 Connexion à la base de données PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Backend(format!("Migration failed: {}", e)))?;
        info!("✅ Base de données prête");

        Ok(Self { pool, blobs })
    }

    /// Distingue "job absent" de "job déjà terminé" après un UPDATE sans effet
    async fn transition_conflict(&self, id: JobId) -> AppError {
        match self.get_job(id).await {
            Ok(Some(job)) => AppError::Conflict(format!(
                "Job {} is already {}",
                id,
                job.status.label()
            )),
            Ok(None) => AppError::NotFound(format!("Job {}", id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    async fn get_model(&self, id: ModelId) -> AppResult<Option<VoiceModel>> {
        let row = sqlx::query_as::<_, ModelRow>(&format!(
            "SELECT {} FROM voice_models WHERE id = $1",
            MODEL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VoiceModel::from))
    }

    async fn create_job(
        &self,
        caller: &CallerId,
        target_model_id: ModelId,
        input: BlobHandle,
    ) -> AppResult<JobId> {
        let stored = persist_blob(self.blobs.as_ref(), &input).await?;
        let input_url = stored
            .direct_url()
            .ok_or_else(|| AppError::Internal("Stored input has no URL".to_string()))?;
        let job = ConversionJob::new(caller.clone(), target_model_id, stored.clone());

        sqlx::query(
            r#"
            INSERT INTO conversion_jobs (
                id, creator, status, input_url, source_model_id, target_model_id,
                upload_time, created_at, updated_at
            )
            VALUES ($1, $2, 'processing', $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id)
        .bind(job.creator.as_str())
        .bind(input_url)
        .bind(job.source_model_id)
        .bind(job.target_model_id)
        .bind(job.status.upload_time())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(job.id)
    }

    async fn complete_job(&self, id: JobId, result: BlobHandle) -> AppResult<()> {
        let stored = persist_blob(self.blobs.as_ref(), &result).await?;
        let result_url = stored
            .direct_url()
            .ok_or_else(|| AppError::Internal("Stored result has no URL".to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE conversion_jobs
            SET status = 'completed', result_url = $2, processing_time = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(result_url)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.transition_conflict(id).await);
        }
        Ok(())
    }

    async fn fail_job(&self, id: JobId, reason: &str) -> AppResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE conversion_jobs
            SET status = 'failed', failure_reason = $2, failed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.transition_conflict(id).await);
        }
        Ok(())
    }

    async fn list_jobs_for_caller(&self, caller: &CallerId) -> AppResult<Vec<ConversionJob>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM conversion_jobs WHERE creator = $1 ORDER BY created_at DESC",
            JOB_COLUMNS
        ))
        .bind(caller.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConversionJob::try_from).collect()
    }

    async fn get_job(&self, id: JobId) -> AppResult<Option<ConversionJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM conversion_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ConversionJob::try_from).transpose()
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

        sqlx::query(
            r#"
            INSERT INTO voice_models (id, owner, name, description, format, training_data, storage_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(model.id)
        .bind(model.owner.as_str())
        .bind(&model.metadata.name)
        .bind(&model.metadata.description)
        .bind(&model.metadata.format)
        .bind(&model.metadata.training_data)
        .bind(model.storage.direct_url())
        .bind(model.created_at)
        .execute(&self.pool)
        .await?;

        Ok(model)
    }

    async fn list_models_for_caller(&self, caller: &CallerId) -> AppResult<Vec<VoiceModel>> {
        let rows = sqlx::query_as::<_, ModelRow>(&format!(
            "SELECT {} FROM voice_models WHERE owner = $1 ORDER BY created_at DESC",
            MODEL_COLUMNS
        ))
        .bind(caller.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VoiceModel::from).collect())
    }

    async fn delete_model(&self, caller: &CallerId, id: ModelId) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM voice_models WHERE id = $1 AND owner = $2")
            .bind(id)
            .bind(caller.as_str())
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Voice model {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> JobRow {
        let now = Utc::now();
        JobRow {
            id: Uuid::new_v4(),
            creator: "alice".to_string(),
            status: status.to_string(),
            input_url: "http://localhost/blobs/in".to_string(),
            source_model_id: None,
            target_model_id: Uuid::new_v4(),
            result_url: None,
            failure_reason: None,
            upload_time: now,
            processing_time: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_rows_map_to_status_variants() {
        let job = ConversionJob::try_from(row("processing")).unwrap();
        assert!(job.status.is_in_flight());

        let mut completed = row("completed");
        completed.result_url = Some("http://localhost/blobs/out".to_string());
        completed.processing_time = Some(Utc::now());
        let job = ConversionJob::try_from(completed).unwrap();
        assert_eq!(job.status.label(), "completed");

        let mut failed = row("failed");
        failed.failure_reason = Some("bad index".to_string());
        let job = ConversionJob::try_from(failed).unwrap();
        assert!(matches!(job.status, JobStatus::Failed { ref reason, .. } if reason == "bad index"));
    }

    #[test]
    fn test_completed_row_without_result_is_rejected() {
        let err = ConversionJob::try_from(row("completed")).unwrap_err();
        assert!(matches!(err, AppError::Backend(_)));
    }
}
