use tokio::sync::broadcast;

use huddle_core::events::Notification;
use huddle_registry::{RegistryConfig, RoomRegistry};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting huddle coordinator");

    // Notification broadcast channel shared by the registry and the gateway
    let (event_tx, _) = broadcast::channel::<Notification>(1024);
    let registry = RoomRegistry::new(RegistryConfig::default(), event_tx);

    let mut config = huddle_server::ServerConfig::default();
    if let Ok(port) = std::env::var("PORT") {
        match port.parse() {
            Ok(p) => config.port = p,
            Err(_) => tracing::warn!(port = %port, "Ignoring unparseable PORT override"),
        }
    }

    let handle = huddle_server::start(config, registry)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "Huddle coordinator ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}
