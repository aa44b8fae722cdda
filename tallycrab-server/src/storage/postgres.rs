//! Postgres storage backend
//!
//! Applications live in the `apps` table and counters in the `actions`
//! table, one row per (application, action, hour bucket). The row id is
//! the bucket digest, which makes the hot path a single
//! `INSERT .. ON CONFLICT DO UPDATE`: concurrent reports for the same
//! bucket serialize inside Postgres instead of racing in the server.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tallycrab::{App, counter_key};

use super::Storage;

const MAX_CONNECTIONS: u32 = 10;

/// Storage backend on a Postgres pool
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to Postgres and create the schema if it is missing
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS apps (
                id VARCHAR(10) PRIMARY KEY,
                name TEXT NOT NULL,
                token VARCHAR(32) NOT NULL,
                strict_auth BOOLEAN NOT NULL DEFAULT FALSE,
                ip VARCHAR(45) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS actions (
                id VARCHAR(64) PRIMARY KEY,
                app_id VARCHAR(10) NOT NULL,
                action TEXT NOT NULL,
                count BIGINT NOT NULL,
                bucket TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_apps_ip ON apps (ip)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_actions_lookup ON actions (app_id, action, bucket)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_actions_action ON actions (action)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AppRow {
    id: String,
    name: String,
    token: String,
    strict_auth: bool,
    ip: String,
    created_at: DateTime<Utc>,
}

impl From<AppRow> for App {
    fn from(row: AppRow) -> Self {
        App {
            id: row.id,
            name: row.name,
            token: row.token,
            strict_auth: row.strict_auth,
            ip: row.ip,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn app(&self, app_id: &str) -> Result<Option<App>> {
        let row = sqlx::query_as::<_, AppRow>(
            "SELECT id, name, token, strict_auth, ip, created_at FROM apps WHERE id = $1",
        )
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(App::from))
    }

    async fn create_app(&self, app: &App) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO apps (id, name, token, strict_auth, ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&app.id)
        .bind(&app.name)
        .bind(&app.token)
        .bind(app.strict_auth)
        .bind(&app.ip)
        .bind(app.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apps_owned_by(&self, ip: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM apps WHERE ip = $1")
            .bind(ip)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn total_apps(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM apps")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn increment(
        &self,
        app_id: &str,
        action: &str,
        count: i64,
        bucket: DateTime<Utc>,
    ) -> Result<()> {
        let key = counter_key(app_id, action, bucket);
        sqlx::query(
            r#"
            INSERT INTO actions (id, app_id, action, count, bucket)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET count = actions.count + EXCLUDED.count
            "#,
        )
        .bind(&key)
        .bind(app_id)
        .bind(action)
        .bind(count)
        .bind(bucket)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn action_sum_since(
        &self,
        app_id: &str,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(count), 0)::BIGINT FROM actions
            WHERE app_id = $1 AND action = $2 AND bucket > $3
            "#,
        )
        .bind(app_id)
        .bind(action)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }

    async fn global_action_sum(&self, action: &str) -> Result<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(count), 0)::BIGINT FROM actions WHERE action = $1",
        )
        .bind(action)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};
    use uuid::Uuid;

    // Run with:
    //   TALLYCRAB_TEST_DATABASE_URL=postgres://localhost/tallycrab_test \
    //     cargo test -p tallycrab-server -- --ignored
    #[tokio::test]
    #[ignore = "requires a running Postgres"]
    async fn test_postgres_round_trip() {
        let url = std::env::var("TALLYCRAB_TEST_DATABASE_URL")
            .expect("TALLYCRAB_TEST_DATABASE_URL must be set");
        let storage = PostgresStorage::connect(&url).await.unwrap();

        let id: String = Uuid::new_v4().simple().to_string().chars().take(10).collect();
        let app = App {
            id: id.clone(),
            name: "round-trip".to_string(),
            token: Uuid::new_v4().simple().to_string(),
            strict_auth: true,
            ip: "10.9.8.7".to_string(),
            created_at: Utc::now(),
        };

        storage.create_app(&app).await.unwrap();
        let fetched = storage.app(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, app.id);
        assert_eq!(fetched.token, app.token);
        assert!(fetched.strict_auth);

        let bucket = Utc::now()
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap();
        storage.increment(&id, "click", 3, bucket).await.unwrap();
        storage.increment(&id, "click", 2, bucket).await.unwrap();

        let sum = storage
            .action_sum_since(&id, "click", bucket - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(sum, 5);

        // since equal to the bucket is exclusive
        let sum = storage.action_sum_since(&id, "click", bucket).await.unwrap();
        assert_eq!(sum, 0);
    }
}
