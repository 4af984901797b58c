use crate::collector::Collector;
use crate::domain::news::NewsRecord;
use crate::domain::stock::{Basket, StockRecord};
use crate::error::Result;
use crate::storage::StockStore;
use std::sync::Arc;

/// Fetch-then-persist over an explicitly owned store.
#[derive(Clone)]
pub struct Pipeline {
    collector: Arc<Collector>,
    store: Arc<dyn StockStore>,
}

impl Pipeline {
    pub fn new(collector: Collector, store: Arc<dyn StockStore>) -> Self {
        Self {
            collector: Arc::new(collector),
            store,
        }
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn store(&self) -> &dyn StockStore {
        self.store.as_ref()
    }

    /// Fetch one symbol and append it to the store. Either stage's failure ends the call.
    pub async fn collect_symbol(&self, symbol: &str) -> Result<StockRecord> {
        let fetched = self.collector.fetch_price(symbol).await?;
        self.store
            .insert(&fetched.symbol, &fetched.name, fetched.price)
            .await
    }

    /// Collect every symbol of a basket in order, persisting each as it arrives.
    ///
    /// Stops at the first failure. Rows saved before that point are kept.
    pub async fn collect_basket(&self, basket: Basket) -> Result<Vec<StockRecord>> {
        let mut saved = Vec::with_capacity(basket.symbols().len());
        for &symbol in basket.symbols() {
            match self.collect_symbol(symbol).await {
                Ok(record) => saved.push(record),
                Err(err) => {
                    tracing::error!(
                        basket = basket.label(),
                        symbol,
                        persisted = saved.len(),
                        kind = err.kind(),
                        error = %err,
                        "basket collection aborted"
                    );
                    return Err(err);
                }
            }
        }

        tracing::info!(basket = basket.label(), saved = saved.len(), "basket collected");
        Ok(saved)
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<StockRecord>> {
        self.store.recent(limit).await
    }

    pub async fn news(&self, query: &str) -> Result<Vec<NewsRecord>> {
        self.collector.fetch_news(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::{collector, CannedFetcher};
    use crate::error::PipelineError;
    use crate::storage::memory::MemoryStockStore;

    fn pipeline(fetcher: CannedFetcher) -> (Pipeline, Arc<MemoryStockStore>) {
        let (collector, _) = collector(fetcher);
        let store = Arc::new(MemoryStockStore::new());
        (Pipeline::new(collector, store.clone()), store)
    }

    #[tokio::test]
    async fn collect_symbol_then_recent_returns_it_first() {
        let (pipeline, _) = pipeline(
            CannedFetcher::default()
                .with_stock("005930", "삼성전자", "71,200")
                .with_stock("360750", "TIGER 미국S&P500", "19,875.5"),
        );

        pipeline.collect_symbol("005930").await.unwrap();
        let saved = pipeline.collect_symbol("360750").await.unwrap();
        assert_eq!(saved.price, 19875);
        assert!(saved.created_at.is_some());

        let recent = pipeline.recent(1).await.unwrap();
        assert_eq!(recent, vec![saved]);
    }

    #[tokio::test]
    async fn collect_symbol_does_not_persist_on_extraction_failure() {
        let url = "https://finance.naver.com/item/main.nhn?code=999999";
        let (pipeline, store) =
            pipeline(CannedFetcher::default().with_page(url, "<html><body>점검 중</body></html>"));

        let err = pipeline.collect_symbol("999999").await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)), "{err}");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn partial_basket_stays_persisted() {
        let (pipeline, store) = pipeline(
            CannedFetcher::default()
                .with_stock("005930", "삼성전자", "71,200")
                .with_page(
                    "https://finance.naver.com/item/main.nhn?code=005935",
                    "<p class=\"no_today\"><span class=\"blind\">58,900</span></p>",
                ),
        );

        let err = pipeline.collect_basket(Basket::Samsung).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)), "{err}");

        let recent = pipeline.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].symbol, "005930");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn full_basket_is_persisted_in_order() {
        let (pipeline, _) = pipeline(
            CannedFetcher::default()
                .with_stock("005930", "삼성전자", "71,200")
                .with_stock("005935", "삼성전자우", "58,900"),
        );

        let saved = pipeline.collect_basket(Basket::Samsung).await.unwrap();
        let symbols: Vec<_> = saved.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, ["005930", "005935"]);

        let recent = pipeline.recent(10).await.unwrap();
        assert_eq!(recent[0].symbol, "005935");
    }
}
