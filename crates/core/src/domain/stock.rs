use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed price for a symbol. `created_at` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: String,
    pub name: String,
    pub price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StockRecord {
    pub fn unsaved(symbol: impl Into<String>, name: impl Into<String>, price: i64) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            price,
            created_at: None,
        }
    }
}

/// Fixed symbol sets collected together by one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basket {
    /// Samsung Electronics common and preferred shares.
    Samsung,
    /// TIGER US S&P500 ETF.
    Snp,
}

impl Basket {
    pub fn symbols(self) -> &'static [&'static str] {
        match self {
            Basket::Samsung => &["005930", "005935"],
            Basket::Snp => &["360750"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Basket::Samsung => "Samsung",
            Basket::Snp => "S&P500 ETF",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn unsaved_record_omits_created_at_in_json() {
        let rec = StockRecord::unsaved("005930", "삼성전자", 71200);
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v, json!({"symbol": "005930", "name": "삼성전자", "price": 71200}));
    }

    #[test]
    fn saved_record_serializes_created_at() {
        let mut rec = StockRecord::unsaved("360750", "TIGER 미국S&P500", 19875);
        rec.created_at = Some(Utc.with_ymd_and_hms(2026, 1, 27, 6, 30, 0).unwrap());
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["created_at"], json!("2026-01-27T06:30:00Z"));
    }

    #[test]
    fn baskets_are_fixed() {
        assert_eq!(Basket::Samsung.symbols(), &["005930", "005935"]);
        assert_eq!(Basket::Snp.symbols(), &["360750"]);
    }
}
