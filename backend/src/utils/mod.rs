// utils/mod.rs
pub mod config;
pub mod error_message;
pub mod validation;

// Ré-exports pour faciliter l'import
pub use config::Config;
pub use error_message::{normalize_error, normalize_message, UNKNOWN_ERROR_MESSAGE};
pub use validation::{
    ensure_within_limit, guess_mime_type, read_audio_file, validate_filename,
    DEFAULT_MAX_UPLOAD_BYTES,
};
