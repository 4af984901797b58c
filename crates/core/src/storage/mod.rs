pub mod memory;
pub mod stocks;

use crate::domain::stock::StockRecord;
use crate::error::Result;

/// Append-only history of observed prices.
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    /// Append one row. The returned record carries the store-assigned `created_at`, or
    /// `None` if the row was written but its timestamp could not be read back.
    async fn insert(&self, symbol: &str, name: &str, price: i64) -> Result<StockRecord>;

    /// Up to `limit` rows, newest insertion first.
    async fn recent(&self, limit: usize) -> Result<Vec<StockRecord>>;

    async fn close(&self) {}
}
