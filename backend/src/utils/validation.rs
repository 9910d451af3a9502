//! Source d'octets : lecture des fichiers audio soumis et garde-fous associés.

use bytes::Bytes;
use std::path::Path;

use crate::infrastructure::error::{AppError, AppResult};

/// Taille maximale d'un fichier audio soumis (100 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Vérifie qu'une taille ne dépasse pas `limit`
pub fn ensure_within_limit(size: u64, limit: u64) -> AppResult<()> {
    if size > limit {
        return Err(AppError::FileTooLarge { size, limit });
    }
    Ok(())
}

/// Valider un nom de fichier
pub fn validate_filename(filename: &str) -> AppResult<()> {
    if filename.trim().is_empty() {
        return Err(AppError::InvalidInput("Filename cannot be empty".to_string()));
    }

    if filename.len() > 255 {
        return Err(AppError::InvalidInput(
            "Filename too long (max 255 characters)".to_string(),
        ));
    }

    // Éviter les chemins relatifs
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(AppError::InvalidInput("Invalid filename".to_string()));
    }

    Ok(())
}

/// Type MIME audio déduit de l'extension
pub fn guess_mime_type(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();

    match extension.as_str() {
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "flac" => Some("audio/flac"),
        "m4a" => Some("audio/mp4"),
        "ogg" => Some("audio/ogg"),
        "aac" => Some("audio/aac"),
        "webm" => Some("audio/webm"),
        _ => None,
    }
}

/// Lit un fichier audio local en refusant ceux au-delà de `limit`
pub async fn read_audio_file(path: impl AsRef<Path>, limit: u64) -> AppResult<Bytes> {
    let path = path.as_ref();
    let metadata = tokio::fs::metadata(path).await?;
    ensure_within_limit(metadata.len(), limit)?;

    let data = tokio::fs::read(path).await?;
    // Le fichier a pu grossir entre les deux appels
    ensure_within_limit(data.len() as u64, limit)?;
    Ok(Bytes::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_inclusive() {
        assert!(ensure_within_limit(DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            ensure_within_limit(DEFAULT_MAX_UPLOAD_BYTES + 1, DEFAULT_MAX_UPLOAD_BYTES),
            Err(AppError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("take1.MP3"), Some("audio/mpeg"));
        assert_eq!(guess_mime_type("vocals.wav"), Some("audio/wav"));
        assert_eq!(guess_mime_type("mix.m4a"), Some("audio/mp4"));
        assert_eq!(guess_mime_type("notes.txt"), None);
        assert_eq!(guess_mime_type("no_extension"), None);
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("chorus.wav").is_ok());
        assert!(validate_filename("../chorus.wav").is_err());
        assert!(validate_filename("").is_err());
    }

    #[tokio::test]
    async fn test_read_audio_file_enforces_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        tokio::fs::write(&path, vec![0u8; 2048]).await.unwrap();

        assert_eq!(read_audio_file(&path, 4096).await.unwrap().len(), 2048);
        assert!(matches!(
            read_audio_file(&path, 1024).await,
            Err(AppError::FileTooLarge { size: 2048, limit: 1024 })
        ));
    }
}
