use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

mod auth;
mod catalog;
mod error;
mod model;
mod preprocess;
mod render;
mod result;
mod routes;
mod store;
mod utils;

use auth::{SessionStore, StaticCredentials};
use catalog::DiseaseCatalog;
use model::Classifier;
use routes::AppState;
use store::PredictionStore;
use utils::{ensure_files_exist, get_env, Settings};

#[cfg(feature = "tensorflow")]
fn load_classifier(settings: &Settings) -> anyhow::Result<Arc<dyn Classifier>> {
    let model = model::Model::new(
        &settings.model_path,
        &settings.model_input_op,
        &settings.model_output_op,
    )
    .map_err(|e| anyhow::anyhow!("failed to load model {}: {}", settings.model_path, e))?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "tensorflow"))]
fn load_classifier(_settings: &Settings) -> anyhow::Result<Arc<dyn Classifier>> {
    anyhow::bail!("built without the `tensorflow` feature; no classifier backend available")
}

fn load_catalog(path: &str) -> anyhow::Result<DiseaseCatalog> {
    if Path::new(path).exists() {
        DiseaseCatalog::load(path)
    } else {
        tracing::warn!("catalog {} not found, using built-in disease descriptions", path);
        Ok(DiseaseCatalog::builtin())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = get_env()?;
    ensure_files_exist(&settings.model_path, &settings.catalog_path).await?;

    let classifier = load_classifier(&settings)?;
    tracing::info!("loaded model from {}", settings.model_path);

    let catalog = load_catalog(&settings.catalog_path)?;
    tracing::info!("catalog has {} disease entries", catalog.len());

    std::fs::create_dir_all(&settings.upload_dir)
        .with_context(|| format!("failed to create upload dir {}", settings.upload_dir))?;

    let store = PredictionStore::open(&settings.db_path)
        .with_context(|| format!("failed to open database {}", settings.db_path))?;
    tracing::info!(
        "prediction log {} holds {} records",
        settings.db_path,
        store.count()?
    );

    let shared_state = AppState {
        classifier,
        catalog: Arc::new(catalog),
        store,
        sessions: Arc::new(SessionStore::new(chrono::Duration::minutes(
            settings.session_ttl_minutes,
        ))),
        credentials: Arc::new(StaticCredentials::new(
            settings.auth_username.clone(),
            settings.auth_password.clone(),
        )),
        upload_dir: Arc::new(PathBuf::from(&settings.upload_dir)),
    };

    let app = routes::app(shared_state, settings.body_limit_bytes);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", settings.host, settings.port))?;

    tracing::info!("listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
