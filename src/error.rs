//! 来源层统一错误类型。

use thiserror::Error;

use crate::network_parser::TransportError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed json from {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// 多页目录在部分页面成功之后失败，不能当作完整结果返回。
    #[error("chapter catalog incomplete after {completed_pages} page(s): {source}")]
    PartialCatalog {
        completed_pages: usize,
        #[source]
        source: Box<SourceError>,
    },

    /// 上游在总数未达到时返回了空批次。
    #[error("upstream stopped at {received} of {expected} chapter records")]
    Truncated { received: usize, expected: usize },

    #[error("pagination exceeded {0} pages")]
    PageLimit(usize),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl SourceError {
    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = SourceError> = std::result::Result<T, E>;
