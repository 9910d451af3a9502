use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::conversion::{OrchestratorConfig, PollSettings};
use crate::core::job_service::RefreshPolicy;
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::replicate::{DEFAULT_BASE_URL, DEFAULT_MODEL_VERSION};
use crate::workers::WorkerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    // Environnement et serveur
    pub run_mode: String,
    pub server_host: String,
    pub server_port: u16,
    pub workers: usize,
    pub log_level: String,
    pub logging_format: String,

    // Persistance
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub storage_dir: Option<PathBuf>,
    pub public_base_url: String,

    // Service d'inférence
    pub replicate_api_token: Option<String>,
    pub replicate_api_base_url: String,
    pub replicate_model_version: String,
    pub credentials_file: Option<PathBuf>,
    pub http_timeout_seconds: u64,

    // Pipeline
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub job_refresh_interval_ms: u64,
    pub max_upload_size_mb: u64,
    pub persist_failures: bool,
    pub max_concurrent_conversions: usize,
    pub run_retention_seconds: u64,
}

fn parse_or<T: FromStr>(
    source: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> AppResult<T> {
    source(key)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .map_err(|_| AppError::Configuration(format!("{} has an invalid value", key)))
}

fn optional(source: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    source(key).filter(|value| !value.trim().is_empty())
}

impl Config {
    /// Charger la configuration depuis les variables d'environnement
    pub fn from_env() -> AppResult<Self> {
        // Charger le fichier .env si présent
        let _ = dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Construit la configuration à partir d'une source clé → valeur
    pub fn from_source(source: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let server_port: u16 = parse_or(&source, "SERVER_PORT", "8080")?;

        let config = Config {
            run_mode: source("RUN_MODE").unwrap_or_else(|| "development".to_string()),
            server_host: source("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
            workers: parse_or(&source, "WORKERS", "4")?,
            log_level: source("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            logging_format: source("LOGGING_FORMAT").unwrap_or_else(|| "json".to_string()),

            database_url: optional(&source, "DATABASE_URL"),
            database_max_connections: parse_or(&source, "DATABASE_MAX_CONNECTIONS", "10")?,
            storage_dir: optional(&source, "STORAGE_DIR").map(PathBuf::from),
            public_base_url: source("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", server_port)),

            replicate_api_token: optional(&source, "REPLICATE_API_TOKEN"),
            replicate_api_base_url: source("REPLICATE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            replicate_model_version: source("REPLICATE_MODEL_VERSION")
                .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
            credentials_file: optional(&source, "CREDENTIALS_FILE").map(PathBuf::from),
            http_timeout_seconds: parse_or(&source, "HTTP_TIMEOUT_SECONDS", "60")?,

            poll_interval_ms: parse_or(&source, "POLL_INTERVAL_MS", "2000")?,
            poll_max_attempts: parse_or(&source, "POLL_MAX_ATTEMPTS", "60")?,
            job_refresh_interval_ms: parse_or(&source, "JOB_REFRESH_INTERVAL_MS", "5000")?,
            max_upload_size_mb: parse_or(&source, "MAX_UPLOAD_SIZE_MB", "100")?,
            persist_failures: parse_or(&source, "PERSIST_FAILURES", "true")?,
            max_concurrent_conversions: parse_or(&source, "MAX_CONCURRENT_CONVERSIONS", "4")?,
            run_retention_seconds: parse_or(&source, "RUN_RETENTION_SECONDS", "3600")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.poll_max_attempts == 0 {
            return Err(AppError::Configuration(
                "POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 || self.job_refresh_interval_ms == 0 {
            return Err(AppError::Configuration(
                "Polling intervals must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_conversions == 0 {
            return Err(AppError::Configuration(
                "MAX_CONCURRENT_CONVERSIONS must be at least 1".to_string(),
            ));
        }
        if self.max_upload_size_mb == 0 {
            return Err(AppError::Configuration(
                "MAX_UPLOAD_SIZE_MB must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.run_mode == "production"
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.poll_max_attempts,
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            interval: Duration::from_millis(self.job_refresh_interval_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            persist_failures: self.persist_failures,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_concurrent_runs: self.max_concurrent_conversions,
            run_retention: Duration::from_secs(self.run_retention_seconds),
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppResult<Config> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(move |key| values.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.poll_settings().budget(), Duration::from_secs(120));
        assert_eq!(config.refresh_policy().interval, Duration::from_secs(5));
        assert_eq!(config.max_upload_bytes(), 100 * 1024 * 1024);
        assert!(config.persist_failures);
        assert!(config.database_url.is_none());
        assert!(config.replicate_api_token.is_none());
        assert_eq!(config.replicate_api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.public_base_url, "http://localhost:8080");
        assert_eq!(config.worker_config().max_concurrent_runs, 4);
        assert_eq!(config.worker_config().run_retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = config_from(&[
            ("POLL_INTERVAL_MS", "500"),
            ("POLL_MAX_ATTEMPTS", "10"),
            ("PERSIST_FAILURES", "false"),
            ("REPLICATE_API_TOKEN", "  "),
            ("STORAGE_DIR", "/var/lib/covers"),
        ])
        .unwrap();

        assert_eq!(config.poll_settings().budget(), Duration::from_secs(5));
        assert!(!config.orchestrator_config().persist_failures);
        assert!(config.replicate_api_token.is_none());
        assert_eq!(config.storage_dir, Some(PathBuf::from("/var/lib/covers")));
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        assert!(matches!(
            config_from(&[("SERVER_PORT", "eighty")]),
            Err(AppError::Configuration(_))
        ));
        assert!(matches!(
            config_from(&[("POLL_MAX_ATTEMPTS", "0")]),
            Err(AppError::Configuration(_))
        ));
    }
}
