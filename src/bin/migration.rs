use promo_ledger_api::{db, migrator::Migrator};
use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

/// Standalone migration runner.
///
/// Usage: `migration [up|down|fresh|status]` with DATABASE_URL set.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sqlx=warn".to_string()),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://promo_ledger.db?mode=rwc".to_string());

    let pool = db::establish_connection(&database_url).await?;

    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    let result = match command.as_str() {
        "up" => Migrator::up(&pool, None).await,
        "down" => Migrator::down(&pool, Some(1)).await,
        "fresh" => Migrator::fresh(&pool).await,
        "status" => Migrator::status(&pool).await,
        other => {
            error!("Unknown migration command: {}", other);
            std::process::exit(2);
        }
    };

    match result {
        Ok(()) => {
            info!("Migration command '{}' completed", command);
            Ok(())
        }
        Err(e) => {
            error!("Migration command '{}' failed: {}", command, e);
            Err(e.into())
        }
    }
}
