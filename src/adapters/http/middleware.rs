use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{
    adapters::http::{app_state::AppState, session::SessionHandle},
    app_error::AppError,
    application::entitlement::{QuotaDecision, check_quota},
    domain::entities::user::UserProfile,
};

pub async fn rate_limit_middleware(
    State(app_state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Only trust forwarded headers if explicitly configured (when behind a reverse proxy)
    let ip = if app_state.config.trust_proxy {
        forwarded_ip(&request).unwrap_or_else(|| addr.ip().to_string())
    } else {
        addr.ip().to_string()
    };

    tracing::debug!(
        trust_proxy = app_state.config.trust_proxy,
        connect_ip = %addr.ip(),
        forwarded_ip = ?forwarded_ip(&request),
        using_ip = %ip,
        "Rate limiting request"
    );

    app_state.rate_limiter.check(&ip).await?;

    Ok(next.run(request).await)
}

fn forwarded_ip(req: &Request) -> Option<String> {
    // Extract IP from X-Forwarded-For or X-Real-IP headers
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        let trimmed = first.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    if let Some(real) = req.headers().get("x-real-ip")
        && let Ok(val) = real.to_str()
        && !val.trim().is_empty()
    {
        return Some(val.trim().to_string());
    }
    None
}

/// The authenticated user, resolved once per request from the session.
#[derive(Clone)]
pub struct CurrentUser(pub UserProfile);

/// Looks up the session's user and attaches it as a request extension.
/// Anonymous requests pass through without one.
pub async fn inject_current_user(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = request.extensions().get::<SessionHandle>().cloned();
    let user_id = session.as_ref().and_then(SessionHandle::user_id);

    if let Some(user_id) = user_id {
        match app_state.user_repo.get_by_id(user_id).await? {
            Some(user) => {
                request.extensions_mut().insert(CurrentUser(user));
            }
            // A session naming a deleted user is invalid; clear it so the
            // stale cookie stops coming back.
            None => {
                tracing::warn!(%user_id, "Session references a missing user, destroying it");
                if let Some(session) = session {
                    session.logout();
                }
            }
        }
    }

    Ok(next.run(request).await)
}

pub async fn require_auth(request: Request, next: Next) -> Result<Response, AppError> {
    if request.extensions().get::<CurrentUser>().is_none() {
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| user.is_admin())
        .ok_or(AppError::Unauthorized)?;
    if !is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// Admins are exempt; everyone else needs a live paid period. Denied
/// requests leave their URI in the session so a later login can send the
/// user back where they were headed.
pub async fn require_active_subscription(
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let allowed = request
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| user.is_admin() || user.has_active_subscription())
        .ok_or(AppError::Unauthorized)?;
    if !allowed {
        if let Some(session) = request.extensions().get::<SessionHandle>() {
            session.set_redirect(request.uri().to_string());
        }
        return Err(AppError::SubscriptionRequired);
    }
    Ok(next.run(request).await)
}

/// Gate on the monthly token spend. A stale billing anchor (31+ days)
/// resets the counters instead of blocking, covering subscriptions whose
/// renewal webhook never arrived.
pub async fn check_token_quota(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (user_id, is_admin, input_tokens, output_tokens, anchor, period_end) = request
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| {
            (
                user.id,
                user.is_admin(),
                user.tokens_used_input_this_period,
                user.tokens_used_output_this_period,
                user.billing_cycle_anchor,
                user.current_period_end,
            )
        })
        .ok_or(AppError::Unauthorized)?;
    if is_admin {
        return Ok(next.run(request).await);
    }

    let now = Utc::now().naive_utc();
    let decision = check_quota(
        app_state.config.token_rates(),
        app_state.config.token_monthly_limit_kzt(),
        input_tokens,
        output_tokens,
        anchor,
        now,
    );

    match decision {
        QuotaDecision::Allowed => Ok(next.run(request).await),
        QuotaDecision::StalePeriod => {
            if let Some(anchor) = anchor {
                let reset = app_state
                    .user_repo
                    .reset_usage_if_anchor(user_id, anchor, now)
                    .await?;
                tracing::info!(%user_id, reset, "Stale usage period rolled over");
            }
            Ok(next.run(request).await)
        }
        QuotaDecision::Exceeded { spent_kzt, limit_kzt } => {
            tracing::warn!(%user_id, spent_kzt, limit_kzt, "Monthly token quota exceeded");
            Err(AppError::QuotaExceeded { period_end })
        }
    }
}
