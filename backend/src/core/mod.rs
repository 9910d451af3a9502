pub mod conversion;
pub mod job_service;

pub use conversion::{InferenceClient, JobOrchestrator, OrchestratorConfig, PollSettings};
pub use job_service::{JobListing, JobService, RefreshPolicy};
