pub mod database;
pub mod error;
pub mod replicate;
pub mod storage;

pub use database::{DataStore, MemoryDataStore, PgDataStore};
pub use error::{AppError, AppResult};
pub use replicate::{PredictionApi, ReplicateApi};
pub use storage::{BlobStore, LocalBlobStore, MemoryBlobStore};
