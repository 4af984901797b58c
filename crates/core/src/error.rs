use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Transport failure or non-success status while retrieving a page.
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: BoxError,
    },

    /// The page was retrieved but an expected node was absent or empty.
    #[error("data not found: {0}")]
    Extraction(String),

    #[error("price text {raw:?} is not a valid price: {reason}")]
    Parse { raw: String, reason: String },

    #[error("{context}: {source}")]
    Persist {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// The store could not be opened or closed. Callers should not keep serving.
    #[error("database connection failed: {0}")]
    ConnectionFatal(#[source] sqlx::Error),
}

impl PipelineError {
    pub fn fetch(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Fetch {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn persist(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Persist {
            context,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Extraction(_) => "extraction",
            Self::Parse { .. } => "parse",
            Self::Persist { .. } => "persist",
            Self::ConnectionFatal(_) => "connection_fatal",
        }
    }
}
