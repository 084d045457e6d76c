use anyhow::Result;
use arrdigest::app::{self, AppState};
use arrdigest::cache::ResponseCache;
use arrdigest::config::{Config, CACHE_SWEEP_PERIOD};
use arrdigest::mailer::OutboxMailer;
use arrdigest::pipeline::{is_policy_abort, Pipeline};
use arrdigest::render::HtmlRenderer;
use arrdigest::scheduler;
use arrdigest::sources::Sources;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_result = dotenv();
    init_tracing();
    match dotenv_result {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }

    let config = Arc::new(Config::from_env()?);
    let sources = Sources::from_config(&config)?;
    let cache = Arc::new(ResponseCache::new());
    let sweeper = cache.spawn_sweeper(CACHE_SWEEP_PERIOD);
    let mailer = Arc::new(OutboxMailer::new(&config.outbox_dir, config.batch_size));
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&config),
        sources,
        cache,
        Arc::new(HtmlRenderer),
        mailer,
    ));

    if std::env::args().skip(1).any(|a| a == "--once") {
        let result = pipeline.send().await;
        sweeper.abort();
        return match result {
            Ok(outcome) => {
                info!("One-shot run finished: {:?}", outcome);
                Ok(())
            }
            Err(e) if is_policy_abort(&e) => {
                error!("One-shot run aborted: {}", e);
                std::process::exit(2);
            }
            Err(e) => Err(e),
        };
    }

    let mut sched = scheduler::start(Arc::clone(&pipeline)).await?;
    let served = app::run_server(AppState::new(pipeline), &config.bind_addr).await;
    if let Err(e) = sched.shutdown().await {
        warn!("Scheduler did not shut down cleanly: {}", e);
    }
    sweeper.abort();
    served
}
