use std::{env, path::Path, str::FromStr};

use anyhow::{bail, Context};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};

/// Startup configuration, read from the environment once.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: String,
    pub model_input_op: String,
    pub model_output_op: String,
    pub catalog_path: String,
    pub db_path: String,
    pub upload_dir: String,
    pub auth_username: String,
    pub auth_password: String,
    pub session_ttl_minutes: i64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .parse::<T>()
        .with_context(|| format!("{} must be a valid {}", name, std::any::type_name::<T>()))
}

pub fn get_env() -> anyhow::Result<Settings> {
    let body_limit_mb: usize = parse_var("BODY_LIMIT_MB", "5")?;

    Ok(Settings {
        host: var_or("HOST", "0.0.0.0"),
        port: parse_var("PORT", "5020")?,
        body_limit_bytes: body_limit_mb * 1024 * 1024,
        model_path: var_or("MODEL_PATH", "./model/frozen_graph.pb"),
        model_input_op: var_or("MODEL_INPUT_OP", "x"),
        model_output_op: var_or("MODEL_OUTPUT_OP", "Identity"),
        catalog_path: var_or("CATALOG_PATH", "./data/disease_info.json"),
        db_path: var_or("DB_PATH", "predictions.db"),
        upload_dir: var_or("UPLOAD_DIR", "static/uploads"),
        auth_username: var_or("AUTH_USERNAME", "farmer"),
        auth_password: var_or("AUTH_PASSWORD", "1234"),
        session_ttl_minutes: parse_var("SESSION_TTL_MINUTES", "720")?,
    })
}

async fn download_file(url: &str, path: &str) -> anyhow::Result<()> {
    tracing::info!("downloading {} from {}", path, url);

    let mut header_map = HeaderMap::new();

    if let Ok(token) = env::var("GITHUB_TOKEN") {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("invalid GITHUB_TOKEN format")?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .headers(header_map)
        .send()
        .await
        .with_context(|| format!("failed to request {}", url))?;

    if !response.status().is_success() {
        bail!("failed to download {}: {}", url, response.status());
    }

    let bytes = response.bytes().await.context("failed to read response body")?;

    if let Some(parent) = Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path))?;
    Ok(())
}

/// Fetches the model and catalog when they are not on disk yet.
///
/// The model is mandatory. A missing catalog without `CATALOG_URL` is left
/// missing; the caller falls back to the built-in catalog.
pub async fn ensure_files_exist(model_path: &str, catalog_path: &str) -> anyhow::Result<()> {
    tracing::info!("checking model artifacts");
    if !Path::new(model_path).exists() {
        let model_url = env::var("MODEL_URL").with_context(|| {
            format!("{} is missing and MODEL_URL is not set", model_path)
        })?;
        download_file(&model_url, model_path).await?;
    }

    if !Path::new(catalog_path).exists() {
        match env::var("CATALOG_URL") {
            Ok(catalog_url) => download_file(&catalog_url, catalog_path).await?,
            Err(_) => tracing::warn!("{} is missing and CATALOG_URL is not set", catalog_path),
        }
    }

    Ok(())
}
