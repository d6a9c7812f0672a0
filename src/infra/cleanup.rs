use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::application::session::SessionStore;
use crate::application::use_cases::auth::AuthUseCases;

const CLEANUP_INTERVAL_HOURS: u64 = 24;

/// Daily sweep of expired verification/reset tokens and dead sessions.
/// The first pass runs right at startup.
pub async fn run_token_cleanup_loop(auth: Arc<AuthUseCases>, sessions: Arc<dyn SessionStore>) {
    let mut ticker = interval(Duration::from_secs(CLEANUP_INTERVAL_HOURS * 3600));

    info!(
        "Token cleanup service started (running every {}h)",
        CLEANUP_INTERVAL_HOURS
    );

    loop {
        ticker.tick().await;

        match auth.cleanup_expired_tokens().await {
            Ok(counts) => {
                info!(
                    email_tokens = counts.email_tokens,
                    phone_codes = counts.phone_codes,
                    reset_tokens = counts.reset_tokens,
                    "Expired verification tokens cleared"
                );
            }
            Err(e) => {
                error!(error = %e, "Token cleanup pass failed");
            }
        }

        match sessions.delete_expired(Utc::now().naive_utc()).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "Expired sessions deleted");
                }
            }
            Err(e) => {
                error!(error = %e, "Session cleanup pass failed");
            }
        }
    }
}
