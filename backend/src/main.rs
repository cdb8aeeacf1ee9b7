//! Mart Operations - stock reconciliation job
//!
//! Replays the stock movement log per product and compares it with the batch
//! ledger and the cached aggregate. Intended to run from cron after close of
//! business; exits non-zero when drift is found and left unrepaired.

use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mart_operations_backend::services::{MovementLogService, StockReducer};
use mart_operations_backend::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mart_reconcile=info,mart_operations_backend=info,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting stock reconciliation");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let movements = MovementLogService::new(db_pool.clone());
    let reports = movements.reconcile_all().await?;

    let mut drifted = 0usize;
    let mut repaired = 0usize;
    let mut unrepairable = 0usize;

    for report in &reports {
        if report.consistent {
            continue;
        }
        drifted += 1;

        tracing::error!(
            "Product {} ({}) is inconsistent: cache {}, batch ledger {}, log replay {}",
            report.product_name,
            report.product_id,
            report.cached_stock,
            report.batch_stock,
            report
                .replayed_stock
                .map_or("unreplayable".to_string(), |v| v.to_string()),
        );
        if let Some(err) = &report.log_error {
            tracing::error!(
                "Movement log for product {} does not replay: {}",
                report.product_id,
                err
            );
        }
        if let Ok(detail) = serde_json::to_string(report) {
            tracing::debug!("Reconciliation detail: {}", detail);
        }

        // The batch ledger is authoritative. A drifted cache can be refreshed
        // from it; a log that disagrees with it needs a human.
        let cache_drift = i64::from(report.cached_stock) != report.batch_stock;
        let log_drift = report.log_error.is_some()
            || report.replayed_stock.map(i64::from) != Some(report.batch_stock);

        if cache_drift && config.reconciliation.auto_repair {
            let stock = StockReducer::repair_stock_cache(&db_pool, report.product_id).await?;
            repaired += 1;
            tracing::info!(
                "Repaired stock cache for product {}: now {}",
                report.product_id,
                stock
            );
        }
        if log_drift {
            unrepairable += 1;
        }
    }

    if drifted == 0 {
        tracing::info!("All {} products reconcile cleanly", reports.len());
        return Ok(());
    }

    tracing::warn!(
        "{} of {} products showed drift ({} caches repaired)",
        drifted,
        reports.len(),
        repaired
    );
    if unrepairable > 0 || !config.reconciliation.auto_repair {
        anyhow::bail!("stock reconciliation found {} inconsistent products", drifted);
    }

    Ok(())
}
