use crate::domain::stock::StockRecord;
use crate::error::Result;
use crate::storage::StockStore;
use chrono::Utc;

/// In-process store with the same ordering as the database: newest insertion first.
#[derive(Debug, Default)]
pub struct MemoryStockStore {
    rows: tokio::sync::Mutex<Vec<StockRecord>>,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl StockStore for MemoryStockStore {
    async fn insert(&self, symbol: &str, name: &str, price: i64) -> Result<StockRecord> {
        let record = StockRecord {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price,
            created_at: Some(Utc::now()),
        };
        self.rows.lock().await.push(record.clone());
        tracing::debug!(symbol, name, price, "stock row saved in memory");
        Ok(record)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StockRecord>> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }
}
