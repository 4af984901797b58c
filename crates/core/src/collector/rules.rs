//! Extraction rules: which page to fetch and which nodes hold which field.
//!
//! Selectors are data. When the remote layout changes, override them through the
//! environment instead of touching the extraction code.
//!
//! A single-valued field takes the last node its selector matches; a blank last node
//! counts as missing.

use crate::domain::news::NewsRecord;
use crate::domain::stock::StockRecord;
use crate::error::{PipelineError, Result};
use scraper::{ElementRef, Html, Selector};

pub const DEFAULT_STOCK_PAGE_URL_TEMPLATE: &str =
    "https://finance.naver.com/item/main.nhn?code={symbol}";
pub const DEFAULT_NEWS_SEARCH_URL_TEMPLATE: &str =
    "https://search.naver.com/search.naver?where=news&query={query}";

const DEFAULT_PRICE_SELECTOR: &str = ".no_today .blind";
const DEFAULT_NAME_SELECTOR: &str = ".wrap_company h2 a";

const DEFAULT_NEWS_ITEM_SELECTOR: &str = "ul.list_news div.news_area";
const DEFAULT_NEWS_TITLE_SELECTOR: &str = "a.news_tit";
const DEFAULT_NEWS_LINK_ATTR: &str = "href";
const DEFAULT_NEWS_SUMMARY_SELECTOR: &str = "div.dsc_wrap";
pub const DEFAULT_NEWS_MAX_ITEMS: usize = 10;

/// A compiled CSS selector bound to a named field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    field: &'static str,
    css: String,
    selector: Selector,
}

impl FieldRule {
    pub fn new(field: &'static str, css: &str) -> anyhow::Result<Self> {
        let selector = Selector::parse(css)
            .map_err(|e| anyhow::anyhow!("invalid selector for {field} ({css:?}): {e:?}"))?;
        Ok(Self {
            field,
            css: css.to_string(),
            selector,
        })
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    /// Trimmed text of the last matching node, if it has any.
    fn last_text(&self, scope: ElementRef<'_>) -> Option<String> {
        scope
            .select(&self.selector)
            .last()
            .map(element_text)
            .filter(|text| !text.is_empty())
    }

    /// Text of every matching node, concatenated and trimmed.
    fn joined_text(&self, scope: ElementRef<'_>) -> String {
        scope
            .select(&self.selector)
            .flat_map(|el| el.text())
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn first_attr(&self, scope: ElementRef<'_>, attr: &str) -> String {
        scope
            .select(&self.selector)
            .find_map(|el| el.value().attr(attr))
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Strip thousands separators, parse as a decimal and floor to an integer.
pub fn normalize_price(raw: &str) -> Result<i64> {
    let cleaned = raw.trim().replace(',', "");
    let value = cleaned
        .parse::<f64>()
        .map_err(|e| PipelineError::Parse {
            raw: raw.to_string(),
            reason: e.to_string(),
        })?;

    if !value.is_finite() || value < 0.0 {
        return Err(PipelineError::Parse {
            raw: raw.to_string(),
            reason: "must be a finite non-negative number".to_string(),
        });
    }

    let floored = value.floor();
    if floored >= i64::MAX as f64 {
        return Err(PipelineError::Parse {
            raw: raw.to_string(),
            reason: "out of range".to_string(),
        });
    }

    Ok(floored as i64)
}

#[derive(Debug, Clone)]
pub struct PriceRules {
    url_template: String,
    price: FieldRule,
    name: FieldRule,
}

impl PriceRules {
    pub fn new(url_template: &str, price_css: &str, name_css: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(
            url_template.contains("{symbol}"),
            "stock page URL template must contain {{symbol}} (got {url_template:?})"
        );
        Ok(Self {
            url_template: url_template.to_string(),
            price: FieldRule::new("price", price_css)?,
            name: FieldRule::new("name", name_css)?,
        })
    }

    pub fn naver_finance() -> anyhow::Result<Self> {
        Self::new(
            DEFAULT_STOCK_PAGE_URL_TEMPLATE,
            DEFAULT_PRICE_SELECTOR,
            DEFAULT_NAME_SELECTOR,
        )
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(
            &env_or("STOCK_PAGE_URL_TEMPLATE", DEFAULT_STOCK_PAGE_URL_TEMPLATE),
            &env_or("STOCK_PRICE_SELECTOR", DEFAULT_PRICE_SELECTOR),
            &env_or("STOCK_NAME_SELECTOR", DEFAULT_NAME_SELECTOR),
        )
    }

    pub fn url_for(&self, symbol: &str) -> String {
        self.url_template
            .replace("{symbol}", &urlencoding::encode(symbol.trim()))
    }

    /// Pull name and price out of a stock page. Both must be present.
    pub fn extract(&self, symbol: &str, html: &str) -> Result<StockRecord> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let (price_text, name) = match (self.price.last_text(root), self.name.last_text(root)) {
            (Some(price_text), Some(name)) => (price_text, name),
            (price_text, name) => {
                let missing: Vec<String> = [(price_text, &self.price), (name, &self.name)]
                    .into_iter()
                    .filter(|(text, _)| text.is_none())
                    .map(|(_, rule)| format!("{} (selector {:?})", rule.field(), rule.css()))
                    .collect();
                return Err(PipelineError::Extraction(format!(
                    "{symbol}: no {} on page",
                    missing.join(" or ")
                )));
            }
        };

        let price = normalize_price(&price_text)?;
        Ok(StockRecord::unsaved(symbol, name, price))
    }
}

#[derive(Debug, Clone)]
pub struct NewsRules {
    url_template: String,
    item: FieldRule,
    title: FieldRule,
    link_attr: String,
    summary: FieldRule,
    max_items: usize,
}

impl NewsRules {
    pub fn new(
        url_template: &str,
        item_css: &str,
        title_css: &str,
        link_attr: &str,
        summary_css: &str,
        max_items: usize,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            url_template.contains("{query}"),
            "news search URL template must contain {{query}} (got {url_template:?})"
        );
        anyhow::ensure!(max_items >= 1, "news max items must be >= 1");
        Ok(Self {
            url_template: url_template.to_string(),
            item: FieldRule::new("item", item_css)?,
            title: FieldRule::new("title", title_css)?,
            link_attr: link_attr.to_string(),
            summary: FieldRule::new("summary", summary_css)?,
            max_items,
        })
    }

    pub fn naver_news() -> anyhow::Result<Self> {
        Self::new(
            DEFAULT_NEWS_SEARCH_URL_TEMPLATE,
            DEFAULT_NEWS_ITEM_SELECTOR,
            DEFAULT_NEWS_TITLE_SELECTOR,
            DEFAULT_NEWS_LINK_ATTR,
            DEFAULT_NEWS_SUMMARY_SELECTOR,
            DEFAULT_NEWS_MAX_ITEMS,
        )
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let max_items = std::env::var("NEWS_MAX_ITEMS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_NEWS_MAX_ITEMS);

        Self::new(
            &env_or("NEWS_SEARCH_URL_TEMPLATE", DEFAULT_NEWS_SEARCH_URL_TEMPLATE),
            &env_or("NEWS_ITEM_SELECTOR", DEFAULT_NEWS_ITEM_SELECTOR),
            &env_or("NEWS_TITLE_SELECTOR", DEFAULT_NEWS_TITLE_SELECTOR),
            &env_or("NEWS_LINK_ATTR", DEFAULT_NEWS_LINK_ATTR),
            &env_or("NEWS_SUMMARY_SELECTOR", DEFAULT_NEWS_SUMMARY_SELECTOR),
            max_items,
        )
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn url_for(&self, query: &str) -> String {
        self.url_template
            .replace("{query}", &urlencoding::encode(query.trim()))
    }

    /// One record per result container, capped at `max_items`. The link comes from the
    /// title anchor.
    pub fn extract(&self, html: &str) -> Vec<NewsRecord> {
        let document = Html::parse_document(html);

        document
            .root_element()
            .select(&self.item.selector)
            .take(self.max_items)
            .map(|node| NewsRecord {
                title: self.title.joined_text(node),
                summary: self.summary.joined_text(node),
                url: self.title.first_attr(node, &self.link_attr),
                date: String::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock_page(price: Option<&str>, name: Option<&str>) -> String {
        let price = price
            .map(|p| format!("<p class=\"no_today\"><em><span class=\"blind\">{p}</span></em></p>"))
            .unwrap_or_default();
        let name = name
            .map(|n| format!("<div class=\"wrap_company\"><h2><a href=\"#\">{n}</a></h2></div>"))
            .unwrap_or_default();
        format!("<html><body>{name}<div class=\"rate_info\">{price}</div></body></html>")
    }

    #[test]
    fn normalize_price_floors_instead_of_rounding() {
        assert_eq!(normalize_price("1,234.99").unwrap(), 1234);
        assert_eq!(normalize_price("71,200").unwrap(), 71200);
        assert_eq!(normalize_price(" 0 ").unwrap(), 0);
        assert_eq!(normalize_price("0.99").unwrap(), 0);
    }

    #[test]
    fn normalize_price_rejects_garbage() {
        for raw in ["", "abc", "12.3.4", "-5", "NaN", "inf"] {
            let err = normalize_price(raw).unwrap_err();
            assert!(matches!(err, PipelineError::Parse { .. }), "{raw}: {err}");
        }
    }

    #[test]
    fn extracts_name_and_floored_price() {
        let rules = PriceRules::naver_finance().unwrap();
        let html = stock_page(Some("1,234.99"), Some("삼성전자"));
        let rec = rules.extract("005930", &html).unwrap();
        assert_eq!(rec, StockRecord::unsaved("005930", "삼성전자", 1234));
        assert!(rec.created_at.is_none());
    }

    #[test]
    fn missing_name_is_an_extraction_error() {
        let rules = PriceRules::naver_finance().unwrap();
        let err = rules
            .extract("005930", &stock_page(Some("71,200"), None))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)), "{err}");
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn missing_price_is_an_extraction_error() {
        let rules = PriceRules::naver_finance().unwrap();
        let err = rules
            .extract("005930", &stock_page(None, Some("삼성전자")))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)), "{err}");
    }

    #[test]
    fn blank_price_node_counts_as_missing() {
        let rules = PriceRules::naver_finance().unwrap();
        let err = rules
            .extract("005930", &stock_page(Some("   "), Some("삼성전자")))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)), "{err}");
    }

    #[test]
    fn last_matching_node_wins() {
        let rules = PriceRules::naver_finance().unwrap();
        let html = "<div class=\"wrap_company\"><h2><a>삼성전자</a></h2></div>\
                    <p class=\"no_today\"><span class=\"blind\">100</span></p>\
                    <p class=\"no_today\"><span class=\"blind\">200</span></p>";
        let rec = rules.extract("005930", html).unwrap();
        assert_eq!(rec.price, 200);
    }

    #[test]
    fn blank_last_match_counts_as_missing() {
        let rules = PriceRules::naver_finance().unwrap();
        let html = "<div class=\"wrap_company\"><h2><a>삼성전자</a></h2></div>\
                    <p class=\"no_today\"><span class=\"blind\">100</span></p>\
                    <p class=\"no_today\"><span class=\"blind\"> </span></p>";
        let err = rules.extract("005930", html).unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)), "{err}");
    }

    #[test]
    fn malformed_price_is_a_parse_error() {
        let rules = PriceRules::naver_finance().unwrap();
        let err = rules
            .extract("005930", &stock_page(Some("N/A"), Some("삼성전자")))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }), "{err}");
    }

    #[test]
    fn url_templates_substitute_and_encode() {
        let price = PriceRules::naver_finance().unwrap();
        assert_eq!(
            price.url_for("005930"),
            "https://finance.naver.com/item/main.nhn?code=005930"
        );

        let news = NewsRules::naver_news().unwrap();
        assert_eq!(
            news.url_for("삼성 전자"),
            "https://search.naver.com/search.naver?where=news&query=%EC%82%BC%EC%84%B1%20%EC%A0%84%EC%9E%90"
        );
    }

    #[test]
    fn rejects_template_without_placeholder() {
        assert!(PriceRules::new("https://example.com", ".a", ".b").is_err());
        assert!(NewsRules::new("https://example.com", ".a", ".b", "href", ".c", 10).is_err());
    }

    #[test]
    fn rejects_invalid_selector() {
        assert!(FieldRule::new("price", "div[").is_err());
    }

    fn news_page(n: usize) -> String {
        let items: String = (1..=n)
            .map(|i| {
                format!(
                    "<li><div class=\"news_area\">\
                     <a class=\"news_tit\" href=\"https://news.example/{i}\">Title {i}</a>\
                     <div class=\"dsc_wrap\">Summary {i}</div>\
                     </div></li>"
                )
            })
            .collect();
        format!("<html><body><ul class=\"list_news\">{items}</ul></body></html>")
    }

    #[test]
    fn news_is_capped_at_ten() {
        let rules = NewsRules::naver_news().unwrap();
        let out = rules.extract(&news_page(15));
        assert_eq!(out.len(), 10);
        assert_eq!(out[0].title, "Title 1");
        assert_eq!(out[9].url, "https://news.example/10");
    }

    #[test]
    fn news_returns_fewer_when_fewer_match() {
        let rules = NewsRules::naver_news().unwrap();
        let out = rules.extract(&news_page(3));
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].summary, "Summary 3");
        assert!(out.iter().all(|n| n.date.is_empty()));
    }

    #[test]
    fn news_container_with_missing_fields_yields_empty_strings() {
        let rules = NewsRules::naver_news().unwrap();
        let html = "<ul class=\"list_news\"><div class=\"news_area\"><span>no anchor</span></div></ul>";
        let out = rules.extract(html);
        assert_eq!(out, vec![NewsRecord::default()]);
    }

    #[test]
    fn news_without_containers_is_empty() {
        let rules = NewsRules::naver_news().unwrap();
        assert!(rules.extract("<html><body><p>no results</p></body></html>").is_empty());
    }
}
