//! `resguard-gateway`: serve the HTTP API until Ctrl-C.

use resguard_config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("ResolutionGuard Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   CORS origin: {}", config.gateway.cors_origin);

    resguard_gateway::start(config).await
}
