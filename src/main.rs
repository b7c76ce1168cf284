use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use unifi_webhook::{
    client::UnifiClient, config::Config, metrics::Metrics, provider::UnifiProvider,
    transport::Transport, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => {
            eprintln!(
                "[tracing] using RUST_LOG={}",
                std::env::var("RUST_LOG").unwrap_or_default()
            );
            f
        }
        Err(e) => {
            let default = "unifi_webhook=info,server=info,tower_http=info";
            eprintln!("[tracing] RUST_LOG not set or invalid ({e}), defaulting to: {default}");
            EnvFilter::new(default)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(false)
                .with_ansi(true),
        )
        .init();

    let cfg = Config::from_env()?;

    info!("UniFi host   : {}", cfg.unifi_host);
    info!("Site         : {}", cfg.unifi_site);
    info!(
        "Auth mode    : {}",
        if cfg.api_key().is_some() { "api-key" } else { "session" }
    );
    info!(
        "Domain filter: {}",
        if cfg.domain_filter.is_empty() { "(all domains)" } else { &cfg.domain_filter }
    );

    let metrics = Arc::new(Metrics::new()?);
    let transport = Transport::new(&cfg, metrics.clone()).await?;
    let client = Arc::new(UnifiClient::new(transport, metrics.clone()));
    let provider = Arc::new(UnifiProvider::new(
        client,
        cfg.domain_filter(),
        metrics.clone(),
    ));

    let app = unifi_webhook::router(AppState { provider, metrics })
        .layer(TraceLayer::new_for_http());

    // bind via ToSocketAddrs so hostnames like "localhost" resolve
    let listener =
        tokio::net::TcpListener::bind((cfg.server_host.as_str(), cfg.server_port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
