//! Randomly addressable, lazily fetched lists and the tabs that bind them.
//!
//! A [`ListGenerator`] prepends static items to the pages of an optional
//! [`PagedSource`] and memoizes everything it has seen, so callers can ask for
//! "ten items from index 30" without dealing with cursors. A [`GeneratorTab`]
//! binds one or two generators to a [`TabIdentity`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::constants::constants;
use crate::error::{Error, FetchError, Result};
use crate::item::ListItem;
use crate::source::{Cursor, Page, PagedSource, StreamContext};
use crate::tab::TabIdentity;

#[derive(Debug, Clone, PartialEq)]
enum CursorState {
  NotStarted,
  /// At least one page was fetched; `next` is the cursor of the following page, if any.
  HasPage { next: Option<Cursor> },
  Exhausted,
}

/// Memoizing sequence over static items followed by the pages of a source.
///
/// `seen_items` only ever grows by appending. Calls on one generator must be
/// serialized by the caller; [`SharedGenerator`] does this with an async lock.
pub struct ListGenerator {
  seen_items: Vec<ListItem>,
  source: Option<Box<dyn PagedSource>>,
  state: CursorState,
  page_size: usize,
}

impl fmt::Debug for ListGenerator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ListGenerator")
      .field("seen_items", &self.seen_items.len())
      .field("has_source", &self.source.is_some())
      .field("state", &self.state)
      .field("page_size", &self.page_size)
      .finish()
  }
}

impl Default for ListGenerator {
  fn default() -> Self {
    Self::new(Vec::new(), None)
  }
}

impl ListGenerator {
  pub fn new(seen_items: Vec<ListItem>, source: Option<Box<dyn PagedSource>>) -> Self {
    Self { seen_items, source, state: CursorState::NotStarted, page_size: constants().page_size }
  }

  /// Generator over static items only; proper and exhausted from the start.
  pub fn from_items(items: impl IntoIterator<Item = impl Into<ListItem>>) -> Self {
    Self::new(items.into_iter().map(Into::into).collect(), None)
  }

  pub fn from_source(source: impl PagedSource + 'static) -> Self {
    Self::new(Vec::new(), Some(Box::new(source)))
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  pub fn seen_items(&self) -> &[ListItem] {
    &self.seen_items
  }

  /// True if the generator holds only static items or has queried its source at least once.
  pub fn is_proper(&self) -> bool {
    self.source.is_none() || self.state != CursorState::NotStarted
  }

  /// True if the generator holds only static items or its source has no more pages.
  pub fn is_exhausted(&self) -> bool {
    self.source.is_none() || matches!(self.state, CursorState::HasPage { next: None } | CursorState::Exhausted)
  }

  /// Window of up to one page of items starting at `index`, fetching from the
  /// source until the window is full or the source runs dry.
  ///
  /// The boolean is true when items exist past the returned window, either
  /// memoized or still to be fetched.
  pub async fn items_from(&mut self, index: usize) -> Result<(Vec<ListItem>, bool), FetchError> {
    let window_end = index.saturating_add(self.page_size);
    while self.seen_items.len() < window_end && !self.is_exhausted() {
      self.fetch_next_page().await?;
    }

    let start = index.min(self.seen_items.len());
    let end = window_end.min(self.seen_items.len());
    let items = self.seen_items[start..end].to_vec();
    let has_next = window_end < self.seen_items.len() || !self.is_exhausted();
    Ok((items, has_next))
  }

  /// Fetches exactly one more page and returns only the newly seen items.
  /// Empty when there is no source or it is exhausted.
  pub async fn unseen_items(&mut self) -> Result<Vec<ListItem>, FetchError> {
    let before = self.seen_items.len();
    self.fetch_next_page().await?;
    Ok(self.seen_items[before..].to_vec())
  }

  async fn fetch_next_page(&mut self) -> Result<(), FetchError> {
    if self.is_exhausted() {
      return Ok(());
    }
    let Some(source) = self.source.as_deref() else { return Ok(()) };
    let cursor = match &self.state {
      CursorState::NotStarted => None,
      CursorState::HasPage { next: Some(cursor) } => Some(cursor.clone()),
      CursorState::HasPage { next: None } | CursorState::Exhausted => return Ok(()),
    };

    let page = match source.fetch_page(cursor.as_ref()).await {
      Ok(page) => page,
      Err(FetchError::NothingFound) => Page::exhausted(),
      Err(e) => {
        debug!(err = %e, seen = self.seen_items.len(), "generator: page fetch failed");
        return Err(e);
      }
    };

    debug!(items = page.items.len(), has_next = page.has_next(), seen = self.seen_items.len(), "generator: page fetched");
    self.state = if page.items.is_empty() && page.next.is_none() {
      CursorState::Exhausted
    } else {
      CursorState::HasPage { next: page.next }
    };
    self.seen_items.extend(page.items.into_iter().map(ListItem::Remote));
    Ok(())
  }
}

/// Generator handle shared between a tab and the tasks fetching its pages.
/// Equality is identity: two handles are equal only if they point at the same generator.
#[derive(Clone, Debug)]
pub struct SharedGenerator(Arc<Mutex<ListGenerator>>);

impl SharedGenerator {
  pub fn new(generator: ListGenerator) -> Self {
    Self(Arc::new(Mutex::new(generator)))
  }

  /// Waits for any in-flight page walk on this generator to finish.
  pub async fn lock(&self) -> MutexGuard<'_, ListGenerator> {
    self.0.lock().await
  }

  pub async fn items_from(&self, index: usize) -> Result<(Vec<ListItem>, bool), FetchError> {
    self.0.lock().await.items_from(index).await
  }

  pub fn ptr_eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl From<ListGenerator> for SharedGenerator {
  fn from(generator: ListGenerator) -> Self {
    Self::new(generator)
  }
}

impl PartialEq for SharedGenerator {
  fn eq(&self, other: &Self) -> bool {
    self.ptr_eq(other)
  }
}

impl Eq for SharedGenerator {}

/// Tab that consists of one or two generators. With two, the user can switch between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorTab {
  identifier: TabIdentity,
  primary: SharedGenerator,
  secondary: Option<SharedGenerator>,
}

impl GeneratorTab {
  pub fn new(identifier: TabIdentity, primary: impl Into<SharedGenerator>) -> Self {
    Self { identifier, primary: primary.into(), secondary: None }
  }

  pub fn with_secondary(
    identifier: TabIdentity,
    primary: impl Into<SharedGenerator>,
    secondary: impl Into<SharedGenerator>,
  ) -> Self {
    Self { identifier, primary: primary.into(), secondary: Some(secondary.into()) }
  }

  /// Related items as primary and comments as secondary for a resolved video.
  pub fn create_related(stream: &dyn StreamContext) -> Result<Self, FetchError> {
    let related = ListGenerator::from_items(stream.related_items()?);
    let comments = ListGenerator::new(Vec::new(), Some(stream.comments_source()?));
    Ok(Self::with_secondary(TabIdentity::RELATED, related, comments))
  }

  pub fn identifier(&self) -> &TabIdentity {
    &self.identifier
  }

  pub fn primary(&self) -> &SharedGenerator {
    &self.primary
  }

  pub fn secondary(&self) -> Option<&SharedGenerator> {
    self.secondary.as_ref()
  }

  pub fn is_secondary_provided(&self) -> bool {
    self.secondary.is_some()
  }

  /// New tab with primary and secondary swapped. Fails if no secondary is provided.
  pub fn switch_generators(&self) -> Result<Self> {
    let Some(secondary) = self.secondary.clone() else {
      return Err(Error::InvalidOperation("generator switching requires a secondary generator"));
    };
    Ok(Self { identifier: self.identifier.clone(), primary: secondary, secondary: Some(self.primary.clone()) })
  }
}
