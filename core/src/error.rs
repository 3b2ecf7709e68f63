use crate::DocId;
use std::path::PathBuf;

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

/// Failures raised by the indexing and retrieval engine.
///
/// `NormalizationMiss` is recovered locally by skipping the token. The query
/// errors (`UnknownTerm`, `EmptyQuery`, `InvalidQuery`) are reported to the
/// caller. Everything else aborts the current pipeline stage.
#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error("token {0:?} could not be normalized")]
    NormalizationMiss(String),

    #[error("term {0:?} has no postings")]
    UnknownTerm(String),

    #[error("no indexable term left in query")]
    EmptyQuery,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("vector dimension mismatch: expected {expected}, found {found}")]
    VectorDimensionMismatch { expected: String, found: String },

    #[error("corpus inconsistency: {0}")]
    CorpusInconsistency(String),

    #[error("document {0} is not in the document store")]
    MissingDocument(DocId),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{artifact}:{line}: {message}")]
    Parse {
        artifact: String,
        line: usize,
        message: String,
    },

    #[error("manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl SearchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SearchError::Io { path: path.into(), source }
    }

    pub(crate) fn parse(artifact: &str, line: usize, message: impl Into<String>) -> Self {
        SearchError::Parse { artifact: artifact.to_string(), line, message: message.into() }
    }

    /// Query-side failures that an interactive session reports and survives.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            SearchError::UnknownTerm(_) | SearchError::EmptyQuery | SearchError::InvalidQuery(_)
        )
    }
}
