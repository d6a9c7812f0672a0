use std::net::SocketAddr;

use tracing::info;

use emshi::infra::{app::create_app, cleanup::run_token_cleanup_loop, error::InfraError, setup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let app_state = setup::init_app_state().await?;
    let app = create_app(app_state.clone());

    // Roles must exist before the first registration.
    app_state
        .auth_use_cases
        .bootstrap(app_state.config.first_admin_email.as_deref())
        .await?;

    tokio::spawn(run_token_cleanup_loop(
        app_state.auth_use_cases.clone(),
        app_state.sessions.clone(),
    ));

    let addr = app_state.config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(InfraError::TcpBind)?;
    info!(%addr, env = %app_state.config.app_env, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(InfraError::Server)?;

    Ok(())
}
