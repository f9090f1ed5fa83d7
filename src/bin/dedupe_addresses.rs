//! Removes duplicate address rows left by concurrent first saves of an owner.

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

/// Keeps the first address per (owner_type, owner_id), the same row the
/// application treats as authoritative, and deletes the rest.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt::init();

    let database_url = env::var("DB_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| "DB_URL or DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database. Looking for duplicate addresses...");

    let query = r#"
        DELETE FROM core.addresses a
        USING (
            SELECT id,
                   ROW_NUMBER() OVER (
                       PARTITION BY owner_type, owner_id
                       ORDER BY created_at, id
                   ) AS position
            FROM core.addresses
        ) ranked
        WHERE a.id = ranked.id
          AND ranked.position > 1
    "#;

    let result = sqlx::query(query).execute(&pool).await?;

    tracing::info!(
        "Cleanup complete. Deleted {} duplicate addresses.",
        result.rows_affected()
    );

    Ok(())
}
