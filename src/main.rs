use std::sync::Arc;

use message_mirror::api::router;
use message_mirror::config::AppConfig;
use message_mirror::db;
use message_mirror::remote::{MessageApi, MessageHttpClient, OfflineMessageApi};
use message_mirror::services::ReconcileScheduler;
use message_mirror::state::AppState;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "message_mirror=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = db::connect(&config.database_url).await?;

    let api: Arc<dyn MessageApi> = if config.start_offline {
        info!("starting offline, remote api calls are disabled");
        Arc::new(OfflineMessageApi)
    } else {
        Arc::new(MessageHttpClient::new(config.api_base_url.clone())?)
    };

    let addr = config.bind_addr;
    let reconcile_interval = config.reconcile_interval;
    let (state, push_listener) = AppState::new(config, pool, api);

    tokio::spawn(push_listener.run());

    if let Some(interval) = reconcile_interval {
        let scheduler = ReconcileScheduler::new(state.reconcile.clone(), interval);
        tokio::spawn(scheduler.start());
    }

    let app = router(state);

    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
