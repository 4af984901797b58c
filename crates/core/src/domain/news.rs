use serde::{Deserialize, Serialize};

/// One search result. Sub-fields are empty when the page did not provide them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub title: String,
    pub summary: String,
    pub url: String,
    // Reserved; result pages are not parsed for dates yet.
    pub date: String,
}
