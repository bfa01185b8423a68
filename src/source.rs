//! Boundary to the remote paginated data source.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::item::InfoItem;

/// Opaque continuation token handed out by a source and passed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

/// Result of a single fetch.
///
/// A page with neither items nor cursor is the exhausted sentinel; a page with
/// items but no cursor is the last non-empty page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
  pub items: Vec<InfoItem>,
  pub next: Option<Cursor>,
}

impl Page {
  pub fn new(items: Vec<InfoItem>, next: Option<Cursor>) -> Self {
    Self { items, next }
  }

  pub fn exhausted() -> Self {
    Self::default()
  }

  pub fn has_next(&self) -> bool {
    self.next.is_some()
  }
}

/// Source of ordered pages. `cursor` is `None` for the initial page.
///
/// Implementations suspend on network I/O and are only ever
/// awaited off the UI loop.
#[async_trait]
pub trait PagedSource: Send + Sync {
  async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page, FetchError>;
}

/// A resolved video whose related items have already been fetched.
pub trait StreamContext: Send + Sync {
  fn url(&self) -> &str;

  fn name(&self) -> &str;

  /// Locator handed to the player.
  fn content_locator(&self) -> &str;

  /// Related items shown under the playing video.
  fn related_items(&self) -> Result<Vec<InfoItem>, FetchError>;

  /// Paged source over the video's comments.
  fn comments_source(&self) -> Result<Box<dyn PagedSource>, FetchError>;
}

/// Entry point to the video platform.
#[async_trait]
pub trait Extractor: Send + Sync {
  /// Paged search results for `query`.
  fn search_source(&self, query: &str) -> Box<dyn PagedSource>;

  /// Paged uploads of a channel, newest first.
  fn channel_feed_source(&self, service_id: u32, url: &str) -> Result<Box<dyn PagedSource>, FetchError>;

  /// Resolves a video and its related items.
  async fn stream(&self, url: &str) -> Result<Box<dyn StreamContext>, FetchError>;
}
