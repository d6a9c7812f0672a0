use axum::{
    Json,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::warn;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::signing,
    application::use_cases::auth::generate_token,
};

pub const CSRF_COOKIE: &str = "emshi_csrf";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Endpoints that are authenticated by other means (webhook HMAC) or are
/// deliberately open to cookieless clients.
const EXEMPT_PATHS: &[&str] = &["/api/billing/webhook", "/api/trial-dialogue"];

/// Double-submit check: the header must be the keyed HMAC of the random
/// value stored in the CSRF cookie. Safe methods pass untouched.
pub async fn csrf_middleware(
    State(app_state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let method = request.method();
    if method == Method::GET
        || method == Method::HEAD
        || method == Method::OPTIONS
        || EXEMPT_PATHS.contains(&request.uri().path())
    {
        return Ok(next.run(request).await);
    }

    let Some(base) = jar.get(CSRF_COOKIE).map(|c| c.value().to_string()) else {
        warn!(path = %request.uri().path(), "Mutating request without CSRF cookie");
        return Err(AppError::Forbidden);
    };
    let Some(header) = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!(path = %request.uri().path(), "Mutating request without CSRF header");
        return Err(AppError::Forbidden);
    };

    if !signing::verify_hex_hmac(
        app_state.config.csrf_key.expose_secret().as_bytes(),
        base.as_bytes(),
        header,
    ) {
        warn!(path = %request.uri().path(), "CSRF token mismatch");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

#[derive(Serialize)]
pub struct CsrfToken {
    pub csrf_token: String,
}

/// Issues (or reuses) the CSRF base cookie and returns the matching header
/// token. The SPA calls this once and sends the token with every mutation.
pub async fn issue_csrf_token(
    State(app_state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<CsrfToken>)> {
    let (jar, base) = match jar.get(CSRF_COOKIE).map(|c| c.value().to_string()) {
        Some(base) => (jar, base),
        None => {
            let base = generate_token();
            let mut cookie = Cookie::new(CSRF_COOKIE, base.clone());
            cookie.set_http_only(true);
            cookie.set_same_site(SameSite::Lax);
            cookie.set_path("/");
            cookie.set_secure(app_state.config.is_production());
            (jar.add(cookie), base)
        }
    };

    let csrf_token = signing::sign_hex_hmac(
        app_state.config.csrf_key.expose_secret().as_bytes(),
        base.as_bytes(),
    );
    Ok((jar, Json(CsrfToken { csrf_token })))
}
