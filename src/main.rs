use anyhow::Result;
use dispatch_planner::{api, config, controller, telemetry};
use config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.logging);

    let app_state = controller::AppState::new(cfg.clone()).await?;
    let app = api::router(app_state.clone());

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0, the API is reachable from the network");
    }

    info!(
        %addr,
        hours_ahead = cfg.planner.hours_ahead,
        db = cfg!(feature = "db"),
        "starting dispatch planner"
    );

    let shutdown = CancellationToken::new();
    controller::spawn_controller_tasks(&app_state, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            telemetry::shutdown_signal().await;
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    warn!("shutdown complete");
    Ok(())
}
