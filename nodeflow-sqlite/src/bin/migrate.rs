use anyhow::Context;
use tracing::info;

use nodeflow_common::{logging::init_tracing, NodeflowConfig};
use nodeflow_sqlite::{db::init_pool, schema::init_schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeflowConfig::from_env()?;
    init_tracing(&config.log_filter);

    let pool = init_pool(&config.db_url, config.max_db_connections)
        .await
        .with_context(|| format!("failed to open {}", config.db_url))?;
    init_schema(&pool).await.context("failed to apply schema")?;

    info!(db_url = %config.db_url, "✅ schema applied");
    Ok(())
}
