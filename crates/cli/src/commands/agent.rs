//! `resguard <message...>`: run one agent turn and print the reply.

use std::sync::Arc;

use resguard_agent::{AgentLoop, NO_RESPONSE};
use resguard_config::AppConfig;
use resguard_core::event::EventBus;
use resguard_ratelimit::{Backends, RateLimiter};
use resguard_store::{ConversationStore, StorePool};
use tracing::info;

pub async fn run(message: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early and give a clear error
    if config.api_key_for(&config.default_provider).is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY=sk-...      (OpenAI-compatible backends)");
        eprintln!("    GEMINI_API_KEY=...         (with RESGUARD_PROVIDER=gemini)");
        eprintln!("    RESGUARD_API_KEY=...       (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let pool = StorePool::open(&config.store);
    let store = ConversationStore::new(pool.clone());
    if config.store.seed_demo_data {
        store.seed_demo_data().await?;
    }

    let backends = Backends::from_config(&config.rate_limit).await;
    if config.rate_limit.enabled {
        let limiter = RateLimiter::agent(backends.counters.clone());
        let decision = limiter
            .check(&format!("cli:{}", config.agent.default_user_id))
            .await;
        if !decision.allowed {
            pool.close().await;
            let wait = decision.retry_after.unwrap_or(decision.reset_after);
            return Err(format!("{} (retry in {}s)", limiter.message(), wait.as_secs()).into());
        }
    }

    let router = resguard_providers::router::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;

    info!(
        provider = %config.default_provider,
        model = %config.active_model(),
        "Starting agent session"
    );
    let agent = AgentLoop::from_config(&config, provider, store, Arc::new(EventBus::default()));

    eprint!("  Thinking...");
    let outcome = agent.run_turn(&message).await;
    eprint!("\r              \r");
    pool.close().await;

    let turn = outcome?;
    println!("{}", turn.reply().unwrap_or(NO_RESPONSE));
    eprintln!("\n  Agent session completed");
    Ok(())
}
