use crate::domain::stock::StockRecord;
use crate::error::{PipelineError, Result};
use crate::storage::StockStore;
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

// created_at is read back through its text form and parsed on our side.
const CREATED_AT_SQL: &str = "to_char(created_at, 'YYYY-MM-DD HH24:MI:SS.US')";
const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone)]
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    /// Open the pool and check liveness with a round trip.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(PipelineError::ConnectionFatal)?;

        let store = Self { pool };
        store.ping().await?;

        tracing::info!(max_connections, "database connection established");
        Ok(store)
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PipelineError::ConnectionFatal)?;
        Ok(())
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("sqlx migrations failed")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StockStore for PgStockStore {
    async fn insert(&self, symbol: &str, name: &str, price: i64) -> Result<StockRecord> {
        let sql = format!(
            "INSERT INTO stocks (symbol, name, price) VALUES ($1, $2, $3) RETURNING {CREATED_AT_SQL}"
        );
        let created_at: String = sqlx::query_scalar(&sql)
            .bind(symbol)
            .bind(name)
            .bind(price)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::persist("insert stocks failed", e))?;

        tracing::info!(symbol, name, price, "stock row saved");

        Ok(StockRecord {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price,
            created_at: returned_created_at(symbol, &created_at),
        })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StockRecord>> {
        let sql = format!(
            "SELECT symbol, name, price, {CREATED_AT_SQL} FROM stocks ORDER BY id DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, (String, String, i64, String)>(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::persist("select recent stocks failed", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for (symbol, name, price, created_at) in rows {
            out.push(StockRecord {
                symbol,
                name,
                price,
                created_at: Some(parse_created_at(&created_at)?),
            });
        }
        Ok(out)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("database connection closed");
    }
}

// The row is already written at this point, so a bad timestamp must not turn the insert
// into a failure.
fn returned_created_at(symbol: &str, text: &str) -> Option<DateTime<Utc>> {
    match parse_created_at(text) {
        Ok(ts) => Some(ts),
        Err(err) => {
            tracing::warn!(symbol, error = %err, "saved row has unreadable created_at");
            None
        }
    }
}

/// Parse the text form of a stored timestamp. Stored values are UTC.
pub fn parse_created_at(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), CREATED_AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| PipelineError::persist("created_at parse failed", e))
}
