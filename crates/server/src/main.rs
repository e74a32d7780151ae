use openset_server::{router, startup};
use tracing::info;

async fn serve(config: openset_core::Config) -> anyhow::Result<()> {
    config.log_summary();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let state = startup::build_app_state(config, listener.local_addr()?.port());
    let app = router::build_router(state);

    info!("listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    openset_core::config::load_dotenv();
    let config = openset_core::Config::from_env();

    serve(config).await
}
