use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use gitquest_server::achievements::AchievementEngine;
use gitquest_server::background::BackgroundOrchestrator;
use gitquest_server::config::Env;
use gitquest_server::db::PgStore;
use gitquest_server::github_pull::GithubClient;
use gitquest_server::health_monitor::HealthMonitor;
use gitquest_server::sessions::SessionScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty());
    tracing::subscriber::set_global_default(subscriber)?;

    let env = Env::load()?;
    let store = Arc::new(PgStore::connect(&env.database_url).await?);
    store.run_migrations().await?;

    let github = GithubClient::new(env.github_token.clone())?;
    if !github.has_credentials() {
        tracing::warn!("GITHUB_TOKEN is not set; stat refreshes will fail until it is configured");
    }

    AchievementEngine::new(store.clone()).sync_registry().await?;

    let health = Arc::new(HealthMonitor::new());

    let scheduler = SessionScheduler::new(store.clone());
    scheduler.start();

    let orchestrator = BackgroundOrchestrator::new(
        store,
        Arc::new(github),
        env.orchestrator_config(),
        Some(health),
    );
    orchestrator.start();

    tracing::info!("GitQuest server is up");
    signal::ctrl_c().await?;
    tracing::warn!("Received SIGINT. Exiting.");
    orchestrator.stop();
    scheduler.stop();

    Ok(())
}
