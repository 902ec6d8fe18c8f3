use fitgear_api::{config::AppConfig, db::create_orm_conn, services::order_service};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One-shot expiry sweep, for deployments that prefer cron over the
/// in-process interval task.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;

    let retention = chrono::Duration::hours(config.order_retention_hours);
    let swept = order_service::mark_expired(&orm, retention).await?;
    println!("Expired {swept} stale orders");
    Ok(())
}
