use std::path::PathBuf;

use vodex::config::AppConfig;
use vodex::retention::RetentionSweep;
use vodex::store::TaskStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = std::env::var("VODEX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/config.json"));

    let config = AppConfig::load(&config_path).await?;

    // Initialize logging; the guard must outlive the runtime
    let _guard = vodex::logging::init_logging(&config.log_dir)?;

    // Open the task store and run a retention sweep
    let store = std::sync::Arc::new(TaskStore::open(config.tasks_file.clone()).await);
    let removed = RetentionSweep::new(store.clone(), config.retention).run_sweep().await;

    let active = store.list_active().await.len();
    tracing::info!(
        active_tasks = active,
        expired_removed = removed,
        "vodex initialized successfully"
    );

    Ok(())
}
