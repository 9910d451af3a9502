use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cover_conversion::api::{self, AppState};
use cover_conversion::core::conversion::{InferenceClient, JobOrchestrator};
use cover_conversion::core::job_service::JobService;
use cover_conversion::infrastructure::database::{DataStore, MemoryDataStore, PgDataStore};
use cover_conversion::infrastructure::replicate::ReplicateApi;
use cover_conversion::infrastructure::storage::{BlobStore, LocalBlobStore, MemoryBlobStore};
use cover_conversion::services::credentials::CredentialStore;
use cover_conversion::utils::Config;
use cover_conversion::workers::ConversionWorker;
use cover_conversion::{AppError, AppResult, NAME, VERSION};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Chargement de la configuration
    let config = Config::from_env().map_err(into_io_error)?;

    // Initialisation du logging
    setup_tracing(&config);
    info!("🚀 Démarrage de {} v{}", NAME, VERSION);
    info!("🔧 Mode: {}", config.run_mode);

    // Initialisation des services
    let state = bootstrap(&config).await.map_err(|e| {
        error!("❌ Initialisation impossible: {}", e);
        into_io_error(e)
    })?;
    let app_state = web::Data::new(state);

    // Configuration du serveur Actix-Web
    let production = config.is_production();
    let server = HttpServer::new(move || {
        let cors = if production {
            Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                .allow_any_header()
                .max_age(3600)
        } else {
            Cors::permissive()
        };

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .app_data(app_state.clone())
            .configure(api::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.workers)
    .shutdown_timeout(10);

    info!("✅ Backend démarré avec succès!");
    info!("🔗 API disponible sur http://{}:{}", config.server_host, config.server_port);

    server.run().await
}

/// Construit les services partagés à partir de la configuration
async fn bootstrap(config: &Config) -> AppResult<AppState> {
    // 1. Stockage des blobs
    let blobs: Arc<dyn BlobStore> = match &config.storage_dir {
        Some(dir) => {
            info!("📦 Stockage des blobs dans {}", dir.display());
            Arc::new(LocalBlobStore::new(dir.clone(), config.public_base_url.clone()).await?)
        }
        None => {
            warn!("⚠️  STORAGE_DIR absent : blobs conservés en mémoire");
            Arc::new(MemoryBlobStore::new(config.public_base_url.clone()))
        }
    };

    // 2. Persistance des modèles et des jobs
    let store: Arc<dyn DataStore> = match &config.database_url {
        Some(url) => {
            let store =
                PgDataStore::connect(url, config.database_max_connections, blobs.clone()).await?;
            info!("✅ Base de données connectée");
            Arc::new(store)
        }
        None => {
            warn!("⚠️  DATABASE_URL absent : persistance en mémoire");
            Arc::new(MemoryDataStore::new(blobs.clone()))
        }
    };

    // 3. Service d'inférence
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;
    let replicate = Arc::new(ReplicateApi::new(
        http,
        config.replicate_api_base_url.clone(),
        config.replicate_model_version.clone(),
    ));
    let credentials = Arc::new(
        CredentialStore::load(
            config.replicate_api_token.clone(),
            config.credentials_file.clone(),
        )
        .await?,
    );
    if !credentials.is_configured() {
        warn!("⚠️  Aucun jeton Replicate configuré : les conversions échoueront");
    }
    let inference = Arc::new(
        InferenceClient::new(replicate.clone(), credentials.clone())
            .with_poll_settings(config.poll_settings()),
    );

    // 4. Orchestration et worker
    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        inference,
        config.orchestrator_config(),
    ));
    let worker = ConversionWorker::new(orchestrator, config.worker_config());
    let jobs = Arc::new(JobService::new(store.clone(), config.refresh_policy()));

    Ok(AppState {
        store,
        blobs,
        jobs,
        worker,
        credentials,
        replicate,
        max_upload_bytes: config.max_upload_bytes(),
    })
}

fn into_io_error(err: AppError) -> io::Error {
    io::Error::other(err.to_string())
}

/// Configure le tracing pour le logging structuré
fn setup_tracing(config: &Config) {
    let log_level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(if config.logging_format == "json" {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        } else {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_line_number(true)
                    .with_file(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        });

    subscriber.init();
}
