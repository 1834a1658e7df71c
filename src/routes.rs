use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use crate::auth::{
    removal_cookie, require_login_api, require_login_page, session_cookie, CredentialVerifier,
    SessionStore, SESSION_COOKIE,
};
use crate::catalog::DiseaseCatalog;
use crate::error::{AppError, DetectError};
use crate::model::{top_prediction, Classifier};
use crate::preprocess::{data_uri_extension, preprocess_image, ImageSource};
use crate::render;
use crate::result::{assemble, ClassificationResult};
use crate::store::PredictionStore;

/// Process-wide dependencies, built once in `main` and shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub catalog: Arc<DiseaseCatalog>,
    pub store: PredictionStore,
    pub sessions: Arc<SessionStore>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub upload_dir: Arc<PathBuf>,
}

pub fn app(state: AppState, body_limit_bytes: usize) -> Router {
    let pages: Router<AppState> = Router::new()
        .route("/home", get(home))
        .route("/history", get(history))
        .nest_service("/uploads", ServeDir::new(state.upload_dir.as_path()))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_login_page,
        ));

    let api: Router<AppState> = Router::new()
        .route("/detect", post(detect))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_login_api,
        ));

    Router::new()
        .route("/", get(login_page))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/health", get(health_check))
        .merge(pages)
        .merge(api)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login_page() -> Html<String> {
    Html(render::login_page())
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if !state.credentials.verify(&form.username, &form.password) {
        tracing::warn!("failed login attempt for user {:?}", form.username);
        return Html(render::INVALID_CREDENTIALS).into_response();
    }

    if let Some(previous) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(previous.value());
    }

    let token = state.sessions.create(&form.username);
    tracing::info!(
        "user {} logged in ({} active sessions)",
        form.username,
        state.sessions.len()
    );

    (jar.add(session_cookie(token)), Redirect::to("/home")).into_response()
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    (jar.remove(removal_cookie()), Redirect::to("/")).into_response()
}

async fn home(State(state): State<AppState>, jar: CookieJar) -> Response {
    match state.sessions.session_for(&jar) {
        Some(session) => Html(render::home_page(&session.username)).into_response(),
        None => Redirect::to("/").into_response(),
    }
}

async fn history(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let store = state.store.clone();
    let records = tokio::task::spawn_blocking(move || store.history()).await??;
    Ok(Html(render::history_page(&records)))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}

/// What the multipart body of `/detect` contained.
enum Upload {
    Missing,
    Empty,
    Image {
        source: ImageSource,
        extension: Option<String>,
    },
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().map(str::to_owned);
                let bytes = field.bytes().await?;

                // A part without a filename is a plain form value, not a file.
                let Some(file_name) = file_name else {
                    if bytes.starts_with(b"data:") {
                        let uri = String::from_utf8_lossy(&bytes).into_owned();
                        return Ok(data_uri_upload(uri));
                    }
                    continue;
                };
                if file_name.is_empty() || bytes.is_empty() {
                    return Ok(Upload::Empty);
                }

                return Ok(Upload::Image {
                    source: ImageSource::Bytes(bytes.to_vec()),
                    extension: client_extension(&file_name),
                });
            }
            Some("image_data") => {
                let uri = field.text().await?;
                if uri.trim().is_empty() {
                    return Ok(Upload::Empty);
                }
                return Ok(data_uri_upload(uri));
            }
            _ => continue,
        }
    }
    Ok(Upload::Missing)
}

fn data_uri_upload(uri: String) -> Upload {
    let extension = data_uri_extension(&uri).map(str::to_owned);
    Upload::Image {
        source: ImageSource::DataUri(uri),
        extension,
    }
}

/// Extension of a client-supplied filename, reduced to something safe to
/// put on disk.
fn client_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    let safe = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    safe.then_some(ext)
}

async fn detect(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::warn!("detect request without a multipart body: {}", rejection);
            return Json(json!({ "error": "No image uploaded" })).into_response();
        }
    };

    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(err) => {
            tracing::error!("failed to read multipart upload: {}", err);
            return Json(json!({ "error": "Invalid upload" })).into_response();
        }
    };

    let (source, extension) = match upload {
        Upload::Missing => return Json(json!({ "error": "No image uploaded" })).into_response(),
        Upload::Empty => return Json(json!({ "error": "No selected file" })).into_response(),
        Upload::Image { source, extension } => (source, extension),
    };

    let result = match run_detection(&state, source, extension).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!("error during detection: {}", err);
            ClassificationResult::failed()
        }
    };

    Json(result).into_response()
}

/// Saves the upload, classifies it and records confident results.
async fn run_detection(
    state: &AppState,
    source: ImageSource,
    extension: Option<String>,
) -> Result<ClassificationResult, DetectError> {
    let bytes = source.into_bytes()?;

    let extension = image::guess_format(&bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().map(|e| e.to_string()))
        .or(extension)
        .unwrap_or_else(|| "bin".to_string());
    let stored_name = format!("{}.{}", Uuid::new_v4().simple(), extension);

    tokio::fs::create_dir_all(state.upload_dir.as_path()).await?;
    tokio::fs::write(state.upload_dir.join(&stored_name), &bytes).await?;

    let classifier = state.classifier.clone();
    let catalog = state.catalog.clone();
    let store = state.store.clone();

    tokio::task::spawn_blocking(move || -> Result<ClassificationResult, DetectError> {
        let input = preprocess_image(&bytes)?;
        let scores = classifier.predict(&input)?;
        let (disease, confidence, tied) = top_prediction(&scores)?;
        tracing::info!(
            "prediction for {}: scores={:?} top={} confidence={} tied={}",
            stored_name,
            scores,
            disease,
            confidence,
            tied
        );

        let result = assemble(&catalog, disease, confidence, tied);
        if !result.is_unknown() {
            store.insert(&stored_name, result.disease, result.confidence)?;
        }
        Ok(result)
    })
    .await?
}
