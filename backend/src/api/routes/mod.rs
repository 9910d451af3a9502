use std::sync::Arc;

use crate::core::job_service::JobService;
use crate::infrastructure::database::DataStore;
use crate::infrastructure::replicate::ReplicateApi;
use crate::infrastructure::storage::BlobStore;
use crate::services::credentials::CredentialStore;
use crate::workers::ConversionWorker;

pub mod blobs;
pub mod conversions;
pub mod credentials;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod upload;

/// État partagé par tous les handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub jobs: Arc<JobService>,
    pub worker: ConversionWorker,
    pub credentials: Arc<CredentialStore>,
    pub replicate: Arc<ReplicateApi>,
    pub max_upload_bytes: u64,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::conversion::inference::fakes::ScriptedApi;
    use crate::core::conversion::{InferenceClient, JobOrchestrator, OrchestratorConfig};
    use crate::core::job_service::RefreshPolicy;
    use crate::domain::{BlobHandle, CallerId, ModelId, ModelMetadata, VoiceModel};
    use crate::infrastructure::database::MemoryDataStore;
    use crate::infrastructure::replicate::DEFAULT_MODEL_VERSION;
    use crate::infrastructure::storage::MemoryBlobStore;
    use crate::workers::WorkerConfig;

    pub const CALLER: &str = "alice";
    pub const BOUNDARY: &str = "cover-test-boundary";

    pub struct TestContext {
        pub state: AppState,
        pub store: Arc<MemoryDataStore>,
        pub model_id: ModelId,
    }

    pub async fn context(api: ScriptedApi, token: Option<&str>) -> TestContext {
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new("http://localhost:8080"));
        let store = Arc::new(MemoryDataStore::new(blobs.clone()));

        let model = VoiceModel::new(
            CallerId::new(CALLER),
            ModelMetadata {
                name: "Soprano".to_string(),
                description: "Test voice".to_string(),
                format: "zip".to_string(),
                training_data: String::new(),
            },
            BlobHandle::from_url("https://blobs.example/soprano.zip"),
        );
        let model_id = model.id;
        store.insert_model(model).await;

        let credentials = Arc::new(CredentialStore::in_memory(token.map(str::to_string)));
        let inference = Arc::new(InferenceClient::new(Arc::new(api), credentials.clone()));
        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            inference,
            OrchestratorConfig::default(),
        ));

        let state = AppState {
            store: store.clone(),
            blobs,
            jobs: Arc::new(JobService::new(store.clone(), RefreshPolicy::default())),
            worker: ConversionWorker::new(orchestrator, WorkerConfig::default()),
            credentials,
            replicate: Arc::new(ReplicateApi::new(
                reqwest::Client::new(),
                "http://127.0.0.1:9",
                DEFAULT_MODEL_VERSION,
            )),
            max_upload_bytes: 1024 * 1024,
        };

        TestContext {
            state,
            store,
            model_id,
        }
    }

    /// Corps multipart : champs texte puis un fichier optionnel
    pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((name, file_name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, name, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    pub fn multipart_content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }
}
