use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryMetricsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("query backend error: {0}")]
    Query(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("row parse error: {0}")]
    RowParse(String),

    #[error("send error: {0}")]
    Send(String),

    #[error("unsupported query type: {0}")]
    UnsupportedQueryType(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryMetricsError {
    /// Short stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Query(_) => "query",
            Self::Schema(_) => "schema",
            Self::RowParse(_) => "row_parse",
            Self::Send(_) => "send",
            Self::UnsupportedQueryType(_) => "unsupported_query_type",
            Self::Parse(_) => "parse",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryMetricsError>;
