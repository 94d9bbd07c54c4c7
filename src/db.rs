use sqlx::{postgres::PgPoolOptions, PgPool};

const SCHEMA: &str = include_str!("../migrations/0001_user_conversations.sql");

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates the `user_conversations` table when it does not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        tracing::info!("user_conversations table ready");
        Ok(())
    }
}
