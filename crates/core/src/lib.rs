pub mod collector;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod storage;

pub use error::{PipelineError, Result};

pub mod config {
    use anyhow::Context;

    const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
    const DEFAULT_SAVED_STOCKS_LIMIT: usize = 100;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub db_max_connections: u32,
        pub saved_stocks_limit: usize,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

            let saved_stocks_limit = std::env::var("SAVED_STOCKS_LIMIT")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(DEFAULT_SAVED_STOCKS_LIMIT);

            anyhow::ensure!(db_max_connections >= 1, "DB_MAX_CONNECTIONS must be >= 1");
            anyhow::ensure!(saved_stocks_limit >= 1, "SAVED_STOCKS_LIMIT must be >= 1");

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                db_max_connections,
                saved_stocks_limit,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }
}
