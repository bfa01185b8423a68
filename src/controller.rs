//! Tab registry and list rendering.
//!
//! The controller owns every piece of list-view state and is only mutated from
//! the UI loop. Network work (tab factories, page walks) runs on spawned tasks
//! whose results come back through a channel drained by [`VideoListController::check_pending`],
//! the same way the player loop polls its search and load receivers.

use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::error::{Error, FetchError, Result};
use crate::generator::{GeneratorTab, ListGenerator, SharedGenerator};
use crate::item::{ChannelItem, CommentItem, InfoItem, ListItem, LocalNode, StreamItem};
use crate::tab::TabIdentity;

// --- Cards ---

/// Presentation unit produced from a list item.
#[derive(Debug, Clone, PartialEq)]
pub enum Card {
  Video(StreamItem),
  Channel(ChannelItem),
  Comment(CommentItem),
  Node(LocalNode),
  /// Inline failure notice for a tab load or page fetch.
  Error(String),
}

impl Card {
  /// Maps a list item to its card. Items without a card representation are dropped.
  pub fn from_item(item: ListItem) -> Option<Card> {
    match item {
      ListItem::Node(node) => Some(Card::Node(node)),
      ListItem::Remote(InfoItem::Stream(s)) => Some(Card::Video(s)),
      ListItem::Remote(InfoItem::Channel(c)) => Some(Card::Channel(c)),
      ListItem::Remote(InfoItem::Comment(c)) => Some(Card::Comment(c)),
      ListItem::Remote(InfoItem::Playlist(_)) => None,
    }
  }

  pub fn height(&self) -> f64 {
    let c = constants();
    match self {
      Card::Video(_) => c.video_card_height,
      Card::Channel(_) => c.channel_card_height,
      Card::Comment(_) => c.comment_card_height,
      Card::Node(_) | Card::Error(_) => c.node_card_height,
    }
  }
}

impl From<(TabIdentity, ListGenerator)> for GeneratorTab {
  fn from((identifier, generator): (TabIdentity, ListGenerator)) -> Self {
    GeneratorTab::new(identifier, generator)
  }
}

// --- Scrolling ---

/// Vertical scroll state of the list.
///
/// `value` ranges over `[0, max]` where `max` is the content height, so the
/// pixel offset of the viewport top is `value / max * (max - viewport)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollState {
  pub value: f64,
  pub max: f64,
  pub viewport: f64,
}

impl ScrollState {
  pub fn new(viewport: f64) -> Self {
    Self { value: 0.0, max: 0.0, viewport }
  }

  /// Pixel offset of the top of the viewport.
  pub fn top(&self) -> f64 {
    if self.max <= self.viewport { 0.0 } else { self.value / self.max * (self.max - self.viewport) }
  }
}

/// Scroll value after the content grows from `old_max` to `new_max`, keeping
/// the viewport top at the same pixel offset.
///
/// Solves `new - new / new_max * viewport = old - old / old_max * viewport`;
/// returns `old_value` unchanged when either extent is not scrollable.
pub fn remap_scroll_value(viewport: f64, old_value: f64, old_max: f64, new_max: f64) -> f64 {
  if old_max <= 0.0 || new_max <= viewport {
    return old_value;
  }
  let remapped = (old_value * new_max * (old_max - viewport)) / (old_max * (new_max - viewport));
  remapped.clamp(0.0, new_max)
}

// --- Controller ---

enum Completion {
  TabLoaded { load: u64, result: Result<GeneratorTab> },
  PageLoaded { binding: u64, start_index: usize, result: Result<(Vec<ListItem>, bool), FetchError> },
}

/// Armed infinite-scroll trigger: where the next window starts.
#[derive(Debug)]
struct Continuation {
  generator: SharedGenerator,
  next_index: usize,
}

pub struct VideoListController {
  tabs: Vec<GeneratorTab>,
  selected: Option<usize>,
  cards: Vec<Card>,
  /// Tab strip accepts input. Disabled while a tab load is pending.
  interactive: bool,
  switch_visible: bool,
  continuation: Option<Continuation>,
  scroll: ScrollState,
  /// Incremented per `with_cleared_list`; older tab loads are stale.
  load_epoch: u64,
  /// Incremented per fresh render; page results for older bindings are stale.
  binding: u64,
  /// Generator currently bound to the list.
  bound: Option<SharedGenerator>,
  in_flight: usize,
  tx: mpsc::UnboundedSender<Completion>,
  rx: mpsc::UnboundedReceiver<Completion>,
}

impl VideoListController {
  pub fn new(viewport_height: f64) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      tabs: Vec::new(),
      selected: None,
      cards: Vec::new(),
      interactive: true,
      switch_visible: false,
      continuation: None,
      scroll: ScrollState::new(viewport_height),
      load_epoch: 0,
      binding: 0,
      bound: None,
      in_flight: 0,
      tx,
      rx,
    }
  }

  pub fn tabs(&self) -> impl Iterator<Item = &TabIdentity> {
    self.tabs.iter().map(GeneratorTab::identifier)
  }

  pub fn tab(&self, identifier: &TabIdentity) -> Option<&GeneratorTab> {
    self.tabs.iter().find(|t| t.identifier() == identifier)
  }

  pub fn selected_tab(&self) -> Option<&GeneratorTab> {
    self.selected.and_then(|i| self.tabs.get(i))
  }

  pub fn cards(&self) -> &[Card] {
    &self.cards
  }

  pub fn is_interactive(&self) -> bool {
    self.interactive
  }

  /// Whether the control that switches between primary and secondary generator is shown.
  pub fn is_switch_visible(&self) -> bool {
    self.switch_visible
  }

  /// True while an infinite-scroll continuation is armed.
  pub fn has_more(&self) -> bool {
    self.continuation.is_some()
  }

  pub fn is_busy(&self) -> bool {
    self.in_flight > 0
  }

  pub fn scroll(&self) -> ScrollState {
    self.scroll
  }

  /// Clears the list, then installs the tab produced by `factory`.
  ///
  /// A tab with an equal identifier has its generators replaced (and is
  /// re-rendered if selected); otherwise a new tab is appended and selected.
  /// If the factory fails, no tab is touched: the tab strip is re-enabled and
  /// the selected tab is re-rendered under an error card.
  ///
  /// Returns the id of this load; see [`Self::is_superseded`].
  pub fn with_cleared_list<F, T>(&mut self, factory: F) -> u64
  where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Into<GeneratorTab> + Send + 'static,
  {
    self.clear_list();
    self.load_epoch += 1;
    let load = self.load_epoch;
    let tx = self.tx.clone();
    self.in_flight += 1;
    tokio::spawn(async move {
      let result = match tokio::spawn(factory).await {
        Ok(result) => result.map(Into::into),
        Err(e) => Err(Error::from(e)),
      };
      let _ = tx.send(Completion::TabLoaded { load, result });
    });
    load
  }

  /// True once a newer `with_cleared_list` has been issued after `load`.
  pub fn is_superseded(&self, load: u64) -> bool {
    load != self.load_epoch
  }

  /// Selects a tab by position and renders its primary generator.
  /// Ignored while the tab strip is disabled.
  pub fn select(&mut self, index: usize) -> bool {
    if !self.interactive || index >= self.tabs.len() {
      return false;
    }
    self.select_unchecked(index);
    true
  }

  /// Swaps the selected tab's generators and renders the new primary.
  pub fn switch_generators(&mut self) -> Result<()> {
    let index = self.selected.ok_or(Error::InvalidOperation("no tab is selected"))?;
    let switched = self.tabs[index].switch_generators()?;
    self.tabs[index] = switched.clone();
    self.with_cleared_list(async move { Ok(switched) });
    Ok(())
  }

  /// Scrolls the list by `delta`. Returns false when the list is already at its limit.
  pub fn scroll_list(&mut self, delta: f64) -> bool {
    let old = self.scroll.value;
    self.scroll.value = (self.scroll.value + delta).clamp(0.0, self.scroll.max.max(0.0));
    let changed = old != self.scroll.value;
    if changed {
      self.maybe_continue();
    }
    changed
  }

  /// Applies every completion that has already arrived.
  pub fn check_pending(&mut self) {
    while let Ok(completion) = self.rx.try_recv() {
      self.apply(completion);
    }
  }

  /// Waits until no tab load or page fetch is in flight.
  pub async fn settle(&mut self) {
    while self.in_flight > 0 {
      let Some(completion) = self.rx.recv().await else { break };
      self.apply(completion);
    }
  }

  fn apply(&mut self, completion: Completion) {
    self.in_flight = self.in_flight.saturating_sub(1);
    match completion {
      Completion::TabLoaded { load, result } => self.apply_tab(load, result),
      Completion::PageLoaded { binding, start_index, result } => self.apply_page(binding, start_index, result),
    }
  }

  fn apply_tab(&mut self, load: u64, result: Result<GeneratorTab>) {
    if load != self.load_epoch {
      debug!(load, current = self.load_epoch, "controller: dropping superseded tab load");
      return;
    }
    match result {
      Ok(tab) => {
        match self.tabs.iter().position(|t| t.identifier() == tab.identifier()) {
          Some(index) => {
            info!(tab = %tab.identifier(), "controller: tab replaced");
            self.tabs[index] = tab;
            if self.selected == Some(index) {
              self.render_selected();
            } else {
              self.select_unchecked(index);
            }
          }
          None => {
            info!(tab = %tab.identifier(), "controller: tab created");
            self.tabs.push(tab);
            self.select_unchecked(self.tabs.len() - 1);
          }
        }
      }
      Err(e) => {
        warn!(err = %e, "controller: tab load failed");
        self.interactive = true;
        self.cards.push(Card::Error(e.to_string()));
        self.render_selected();
      }
    }
  }

  fn apply_page(&mut self, binding: u64, start_index: usize, result: Result<(Vec<ListItem>, bool), FetchError>) {
    if binding != self.binding {
      debug!(binding, current = self.binding, "controller: dropping stale page");
      return;
    }
    self.interactive = true;
    self.switch_visible = self.selected_tab().is_some_and(GeneratorTab::is_secondary_provided);

    let (items, has_next) = match result {
      Ok(page) => page,
      Err(e) => {
        warn!(err = %e, start_index, "controller: page fetch failed");
        self.cards.push(Card::Error(e.to_string()));
        self.scroll.max = self.content_height();
        // The generator still holds the cursor, so the next scroll retries the same window.
        if start_index > 0
          && let Some(generator) = self.bound.clone()
        {
          self.continuation = Some(Continuation { generator, next_index: start_index });
        }
        return;
      }
    };

    let fetched = items.len();
    let old_max = self.scroll.max;
    self.cards.extend(items.into_iter().filter_map(Card::from_item));
    let new_max = self.content_height();
    self.scroll.value = remap_scroll_value(self.scroll.viewport, self.scroll.value, old_max, new_max);
    self.scroll.max = new_max;

    if has_next && let Some(generator) = self.bound.clone() {
      self.continuation = Some(Continuation { generator, next_index: start_index + fetched });
    }
    debug!(start_index, fetched, has_next, cards = self.cards.len(), "controller: page rendered");
    // A window too short to scroll past the trigger would never fire it.
    self.maybe_continue();
  }

  fn clear_list(&mut self) {
    self.interactive = false;
    self.switch_visible = false;
    self.continuation = None;
    self.cards.clear();
    self.scroll.value = 0.0;
    self.scroll.max = 0.0;
    self.binding += 1;
    self.bound = None;
  }

  fn select_unchecked(&mut self, index: usize) {
    self.selected = Some(index);
    self.clear_list();
    self.render_selected();
  }

  fn render_selected(&mut self) {
    match self.selected_tab().map(|t| t.primary().clone()) {
      Some(generator) => self.render(generator, 0),
      None => self.interactive = true,
    }
  }

  /// Starts a render of the window at `start_index`. A render from index 0
  /// opens a new binding so results for the previous one are discarded.
  fn render(&mut self, generator: SharedGenerator, start_index: usize) {
    self.continuation = None;
    if start_index == 0 {
      self.binding += 1;
      self.bound = Some(generator.clone());
    }
    let binding = self.binding;
    let tx = self.tx.clone();
    self.in_flight += 1;
    tokio::spawn(async move {
      let result = generator.items_from(start_index).await;
      let _ = tx.send(Completion::PageLoaded { binding, start_index, result });
    });
  }

  /// Fires the armed continuation when the viewport is within two cards of the bottom.
  fn maybe_continue(&mut self) {
    let threshold = self.scroll.max - constants().video_card_height * 2.0;
    if self.scroll.value > threshold
      && let Some(Continuation { generator, next_index }) = self.continuation.take()
    {
      self.render(generator, next_index);
    }
  }

  fn content_height(&self) -> f64 {
    let spacing = constants().card_spacing;
    self.cards.iter().map(|c| c.height() + spacing).sum()
  }
}
