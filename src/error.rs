//! Error taxonomy shared by the list generator, the tab controller and the
//! subscription storage.

use thiserror::Error;

/// Failure reported by a [`crate::source::PagedSource`] or an extractor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// Network failure, timeout or rate limiting.
  #[error("transport error: {0}")]
  Transport(String),

  /// The remote source answered with something that could not be extracted.
  #[error("extraction error: {0}")]
  Extraction(String),

  /// A URL or response could not be parsed.
  #[error("parsing error: {0}")]
  Parsing(String),

  /// The extractor has no support for this streaming service.
  #[error("unsupported service id {0}")]
  UnsupportedService(u32),

  /// The query matched nothing. Not a failure: generators normalise it to an empty page.
  #[error("nothing found")]
  NothingFound,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error("storage error: {0}")]
  Storage(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Programming-contract violation, e.g. switching a tab without a secondary generator.
  #[error("invalid operation: {0}")]
  InvalidOperation(&'static str),

  /// A background task panicked or was dropped before reporting back.
  #[error("background task failed: {0}")]
  Task(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<tokio::task::JoinError> for Error {
  fn from(e: tokio::task::JoinError) -> Self {
    Error::Task(e.to_string())
  }
}
