use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeline_bot::config::AppConfig;
use pipeline_bot::gitlab::{GitLabApi, GitLabClient};
use pipeline_bot::notify::{DiscordNotifier, NoopNotifier, Notifier};
use pipeline_bot::orchestrator::Orchestrator;
use pipeline_bot::ratelimit::{CounterStore, InMemoryCounterStore, RateLimiter, RedisCounterStore};
use pipeline_bot::server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeline_bot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(?config, "loaded configuration");

    let store: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisCounterStore::new(url, "ratelimit", config.store_timeout)?;
            tracing::info!("using redis counter store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set; rate limits are per-process and reset on restart");
            Arc::new(InMemoryCounterStore::new())
        }
    };
    let limiter = RateLimiter::new(store, config.rate_limit);

    let api: Arc<dyn GitLabApi> = Arc::new(GitLabClient::new(
        &config.gitlab_url,
        config.gitlab_token.clone(),
        config.pipeline_trigger_token.clone(),
        config.http_timeout,
    )?);

    let notifier: Arc<dyn Notifier> = match &config.discord_webhook_url {
        Some(url) => Arc::new(DiscordNotifier::new(url.clone(), config.http_timeout)?),
        None => Arc::new(NoopNotifier),
    };

    let listen_addr = config.listen_addr;
    let orchestrator = Orchestrator::new(config, api, limiter, notifier);
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    tracing::info!("listening on {listen_addr}");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
