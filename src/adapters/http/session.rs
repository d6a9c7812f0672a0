use std::sync::{Arc, Mutex};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::SET_COOKIE},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use tracing::error;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    application::session::{SESSION_COOKIE, SESSION_TTL_HOURS, SessionBag},
    application::use_cases::auth::{generate_token, hash_token},
};

#[derive(Default)]
struct SessionInner {
    bag: SessionBag,
    dirty: bool,
    renew: bool,
    destroyed: bool,
}

/// Handle shared between the session middleware and the handlers of one
/// request. Mutations are collected here and persisted once the handler
/// has produced its response.
#[derive(Clone, Default)]
pub struct SessionHandle(Arc<Mutex<SessionInner>>);

impl SessionHandle {
    fn from_bag(bag: SessionBag) -> Self {
        Self(Arc::new(Mutex::new(SessionInner {
            bag,
            ..SessionInner::default()
        })))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.0.lock().expect("session handle lock poisoned")
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.lock().bag.user_id
    }

    /// Binds the session to a user. The token is rotated so a cookie
    /// issued before authentication never names an authenticated session.
    pub fn login(&self, user_id: Uuid) {
        let mut inner = self.lock();
        inner.bag.user_id = Some(user_id);
        inner.dirty = true;
        inner.renew = true;
        inner.destroyed = false;
    }

    pub fn logout(&self) {
        let mut inner = self.lock();
        inner.bag = SessionBag::default();
        inner.destroyed = true;
    }

    pub fn flash_success(&self, message: impl Into<String>) {
        let mut inner = self.lock();
        inner.bag.flash_success = Some(message.into());
        inner.dirty = true;
    }

    pub fn flash_error(&self, message: impl Into<String>) {
        let mut inner = self.lock();
        inner.bag.flash_error = Some(message.into());
        inner.dirty = true;
    }

    /// Remembers where to send the user once they authenticate.
    pub fn set_redirect(&self, uri: impl Into<String>) {
        let mut inner = self.lock();
        inner.bag.redirect_to = Some(uri.into());
        inner.dirty = true;
    }

    /// Reads and clears the saved redirect target.
    pub fn take_redirect(&self) -> Option<String> {
        let mut inner = self.lock();
        let target = inner.bag.redirect_to.take();
        if target.is_some() {
            inner.dirty = true;
        }
        target
    }

    /// Reads and clears both flash slots.
    pub fn take_flashes(&self) -> (Option<String>, Option<String>) {
        let mut inner = self.lock();
        let success = inner.bag.flash_success.take();
        let err = inner.bag.flash_error.take();
        if success.is_some() || err.is_some() {
            inner.dirty = true;
        }
        (success, err)
    }

    fn snapshot(&self) -> (SessionBag, bool, bool, bool) {
        let inner = self.lock();
        (
            inner.bag.clone(),
            inner.dirty,
            inner.renew,
            inner.destroyed,
        )
    }
}

/// Loads the session named by the cookie, hands a [`SessionHandle`] to the
/// request, and persists any changes afterwards. Cookies only carry an
/// opaque random token; its sha256 is the storage key.
pub async fn session_middleware(
    State(app_state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let raw_token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let now = Utc::now().naive_utc();

    let mut existing_hash = None;
    let mut bag = SessionBag::default();
    if let Some(raw) = &raw_token {
        let hash = hash_token(raw);
        match app_state.sessions.load(&hash, now).await {
            Ok(Some(loaded)) => {
                bag = loaded;
                existing_hash = Some(hash);
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "Session load failed, continuing anonymously"),
        }
    }

    let handle = SessionHandle::from_bag(bag);
    request.extensions_mut().insert(handle.clone());

    let mut response = next.run(request).await;

    let (bag, dirty, renew, destroyed) = handle.snapshot();
    let secure = app_state.config.is_production();

    if destroyed {
        if let Some(hash) = existing_hash
            && let Err(e) = app_state.sessions.delete(&hash).await
        {
            error!(error = %e, "Session delete failed");
        }
        append_cookie(&mut response, removal_cookie(secure));
        return response;
    }

    if renew {
        if let Some(hash) = existing_hash
            && let Err(e) = app_state.sessions.delete(&hash).await
        {
            error!(error = %e, "Stale session delete failed");
        }
        create_session(&app_state, &bag, &mut response, secure).await;
        return response;
    }

    if dirty {
        match existing_hash {
            Some(hash) => {
                if bag.is_empty() {
                    if let Err(e) = app_state.sessions.delete(&hash).await {
                        error!(error = %e, "Session delete failed");
                    }
                    append_cookie(&mut response, removal_cookie(secure));
                } else if let Err(e) = app_state.sessions.update(&hash, &bag).await {
                    error!(error = %e, "Session update failed");
                }
            }
            None if !bag.is_empty() => {
                create_session(&app_state, &bag, &mut response, secure).await;
            }
            None => {}
        }
    }

    response
}

async fn create_session(
    app_state: &AppState,
    bag: &SessionBag,
    response: &mut Response,
    secure: bool,
) {
    let raw = generate_token();
    let expires_at = Utc::now().naive_utc() + Duration::hours(SESSION_TTL_HOURS);
    match app_state
        .sessions
        .create(&hash_token(&raw), bag, expires_at)
        .await
    {
        Ok(()) => append_cookie(response, session_cookie(raw, secure)),
        Err(e) => error!(error = %e, "Session create failed"),
    }
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(secure);
    cookie.set_max_age(time::Duration::hours(SESSION_TTL_HOURS));
    cookie
}

fn removal_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = session_cookie(String::new(), secure);
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

fn append_cookie(response: &mut Response, cookie: Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => error!(error = %e, "Failed to encode session cookie"),
    }
}
