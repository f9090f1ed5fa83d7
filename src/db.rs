use sqlx::{postgres::PgPoolOptions, PgPool};

const SCHEMA: &str = include_str!("../migrations/0001_owners_addresses.sql");

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates the owner and address tables when missing. Safe to run on every start.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statements() -> Vec<&'static str> {
        SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()).collect()
    }

    #[test]
    fn test_address_table_rejects_rows_without_data() {
        let addresses = statements()
            .into_iter()
            .find(|s| s.starts_with("CREATE TABLE IF NOT EXISTS core.addresses"))
            .unwrap();
        assert!(addresses.contains("CONSTRAINT addresses_has_data CHECK"));
        for column in ["street", "number", "complement", "neighborhood", "city", "state", "postal_code"] {
            assert!(addresses.contains(&format!("NULLIF(trim({}), '')", column)));
        }
    }

    #[test]
    fn test_schema_statements_are_complete() {
        // Splitting on ';' must never cut a statement in half.
        for statement in statements() {
            let opened = statement.matches('(').count();
            let closed = statement.matches(')').count();
            assert_eq!(opened, closed, "unbalanced statement: {}", statement);
        }
    }
}
