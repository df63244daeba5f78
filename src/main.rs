use anyhow::Context;
use dotenv::dotenv;
use tracing::info;

use training_backend::{
    app::create_router,
    app_state::AppState,
    config,
    db,
    services::renderer::FontLibrary,
    telemetry::{init_telemetry, TelemetryConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let env = config::init()?;
    let telemetry = init_telemetry(TelemetryConfig::from_app(&env.app)).await?;

    let pool = db::init_pool(&env.database).await?;
    info!("Database connection pool initialized");

    let fonts = FontLibrary::from_config(&env.certificates);
    let state = AppState::new(pool, env, fonts);
    let app = create_router(state);

    let addr = env.server_addr();
    info!("{} ({}) listening on {}", env.app.name, env.app.environment.as_str(), addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to serve application")?;

    telemetry.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
