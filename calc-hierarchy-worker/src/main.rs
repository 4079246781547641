//! calc-hierarchy-worker — levels every calculation scope in a Postgres edge
//! store once, then exits.
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   CALC_HIERARCHY_DATABASE_URL     — Postgres connection string (required)
//!   CALC_HIERARCHY_MAX_CONNECTIONS  — pool size (default: 8)
//!   CALC_HIERARCHY_TABLE_PREFIX     — group table prefix (default: cal_)
//! plus the runner keys documented in `calc_hierarchy_core::config`.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use calc_hierarchy_core::store::postgres::{PgEdgeStore, DEFAULT_TABLE_PREFIX};
use calc_hierarchy_core::{HierarchyRunner, RunnerConfig};
use sqlx::postgres::PgPoolOptions;

const DEFAULT_MAX_CONNECTIONS: u32 = 8;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,calc_hierarchy_core=debug".into()),
        )
        .init();

    let database_url = std::env::var("CALC_HIERARCHY_DATABASE_URL")
        .context("CALC_HIERARCHY_DATABASE_URL must be set")?;
    let max_connections: u32 = std::env::var("CALC_HIERARCHY_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);
    let table_prefix = std::env::var("CALC_HIERARCHY_TABLE_PREFIX")
        .unwrap_or_else(|_| DEFAULT_TABLE_PREFIX.to_string());
    let config = RunnerConfig::from_env().context("invalid runner configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!(max_connections, "Connected to database");

    let store = Arc::new(PgEdgeStore::with_table_prefix(pool.clone(), table_prefix));
    let runner = HierarchyRunner::from_config(store, &config);
    let report = runner.run_all().await?;

    let summary = serde_json::to_string(&report)?;
    tracing::info!(report = %summary, "run report");
    pool.close().await;

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("{} scope(s) failed", report.failures.len()))
    }
}
