use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mongo_query_assistant::{
    config::{tls::TlsConfig, AppConfig},
    create_app,
    services::{GeminiService, LanguageModel, MongoConnector, StoreConnector},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "mongo_query_assistant=info,tower_http=info,mongodb=warn".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let tls = TlsConfig::from_env()?;

    let model: Arc<dyn LanguageModel> = Arc::new(GeminiService::new(config.gemini.clone())?);
    let connector: Arc<dyn StoreConnector> = Arc::new(MongoConnector::new());

    tracing::info!(
        "Model client ready: {} (timeout {}s)",
        model.model_id(),
        config.gemini.timeout.as_secs()
    );

    let app = create_app(AppState::new(config.clone(), model, connector));

    if let Some(tls) = tls {
        let rustls_config = tls.load().await?;
        let addr = tls.bind_address(&config.server_host)?;

        tracing::info!("Starting server with TLS on https://{}", addr);

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;
    } else {
        let addr: SocketAddr = config.server_address().parse()?;

        tracing::info!("Starting server on http://{}", addr);
        tracing::warn!("TLS is disabled. Set TLS_ENABLED=true to serve HTTPS");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}
