pub mod fetch;
pub mod rules;

use crate::domain::news::NewsRecord;
use crate::domain::stock::StockRecord;
use crate::error::Result;
use crate::storage::StockStore;
use fetch::{HttpPageFetcher, PageFetcher};
use rules::{NewsRules, PriceRules};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fetches one page per symbol or query and turns it into records.
pub struct Collector {
    fetcher: Arc<dyn PageFetcher>,
    price_rules: PriceRules,
    news_rules: NewsRules,
}

impl Collector {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        price_rules: PriceRules,
        news_rules: NewsRules,
    ) -> Self {
        Self {
            fetcher,
            price_rules,
            news_rules,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(HttpPageFetcher::from_env()?),
            PriceRules::from_env()?,
            NewsRules::from_env()?,
        ))
    }

    /// Current price and display name for `symbol`. The record is not persisted.
    pub async fn fetch_price(&self, symbol: &str) -> Result<StockRecord> {
        let url = self.price_rules.url_for(symbol);
        let html = self.fetcher.fetch_page(&url).await?;
        let record = self.price_rules.extract(symbol, &html)?;

        tracing::debug!(
            symbol = %record.symbol,
            name = %record.name,
            price = record.price,
            "stock price extracted"
        );
        Ok(record)
    }

    /// Fetch each symbol in order and insert it right away.
    ///
    /// The first fetch failure aborts the batch and the records gathered so far are dropped
    /// (rows already inserted stay). Insert failures are best-effort: logged, not returned.
    pub async fn fetch_batch<S>(
        &self,
        symbols: &[S],
        store: &dyn StockStore,
    ) -> Result<BTreeMap<String, StockRecord>>
    where
        S: AsRef<str> + Sync,
    {
        let mut out = BTreeMap::new();
        for symbol in symbols {
            let symbol = symbol.as_ref();
            let record = self.fetch_price(symbol).await?;

            if let Err(err) = store
                .insert(&record.symbol, &record.name, record.price)
                .await
            {
                tracing::warn!(symbol, error = %err, "batch insert failed; continuing");
            }

            out.insert(symbol.to_string(), record);
        }
        Ok(out)
    }

    pub async fn fetch_news(&self, query: &str) -> Result<Vec<NewsRecord>> {
        let url = self.news_rules.url_for(query);
        let html = self.fetcher.fetch_page(&url).await?;
        let items = self.news_rules.extract(&html);

        tracing::debug!(
            query,
            items = items.len(),
            max_items = self.news_rules.max_items(),
            "news extracted"
        );
        Ok(items)
    }
}
