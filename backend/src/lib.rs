// backend/src/lib.rs
// Modules principaux
pub mod api;
pub mod core;
pub mod domain;
pub mod infrastructure;
pub mod services;
pub mod utils;
pub mod workers;

// Ré-exports pour faciliter l'utilisation
pub use crate::core::{InferenceClient, JobOrchestrator, JobService};
pub use domain::{BlobHandle, CallerId, ConversionJob, JobStatus, VoiceModel};
pub use infrastructure::error::{AppError, AppResult};
pub use utils::Config;
pub use workers::ConversionWorker;

// Version de l'application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Cover Conversion";
