use std::collections::HashMap;
use std::sync::RwLock;

use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "leaf_session";

/// Decides whether a username/password pair may log in.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// A single account configured at startup.
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        !self.username.is_empty() && username == self.username && password == self.password
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Server-side sessions keyed by the opaque token stored in the cookie.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Starts an authenticated session and returns its token.
    pub fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: Utc::now() + self.ttl,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(token.clone(), session);
        token
    }

    /// The live session for `token`, if any. Expired sessions are dropped.
    pub fn get(&self, token: &str) -> Option<Session> {
        let session = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.get(token).cloned()
        }?;

        if session.expires_at <= Utc::now() {
            self.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn remove(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Resolves the session referenced by the request cookie.
    pub fn session_for(&self, jar: &CookieJar) -> Option<Session> {
        jar.get(SESSION_COOKIE).and_then(|c| self.get(c.value()))
    }
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, "").path("/").finish()
}

/// Gate for HTML pages: anonymous visitors are sent to the login form.
pub async fn require_login_page<B>(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    match state.sessions.session_for(&jar) {
        Some(_) => next.run(request).await,
        None => {
            tracing::debug!("redirecting anonymous request for {}", request.uri().path());
            Redirect::to("/").into_response()
        }
    }
}

/// Gate for JSON endpoints: anonymous callers get a 401 body.
pub async fn require_login_api<B>(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    match state.sessions.session_for(&jar) {
        Some(_) => next.run(request).await,
        None => {
            tracing::warn!("rejecting anonymous request for {}", request.uri().path());
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Not authenticated" })),
            )
                .into_response()
        }
    }
}
