//! Wires the list controller, window geometry, history, player and
//! subscriptions into the user-facing actions.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::bounds::{Bounds, Insets, VirtualWindow, WindowBoundsCoordinator};
use crate::config::{Config, Paths};
use crate::constants::constants;
use crate::controller::{Card, VideoListController};
use crate::disk_cache::DiskCache;
use crate::error::Error;
use crate::feed_cache::SubscriptionFeedCache;
use crate::generator::{GeneratorTab, ListGenerator};
use crate::gestures::{GestureOutcome, GestureRouter};
use crate::import::{NewPipeImportService, read_import_source};
use crate::item::{ChannelItem, InfoItem, ListItem, LocalNode};
use crate::navigation::VideoHistory;
use crate::player::Player;
use crate::source::{Extractor, StreamContext};
use crate::subscription::{ChannelIdentifier, SubscriptionStore};
use crate::tab::TabIdentity;
use crate::transport::Downloader;

/// Which way to move through the video history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryStep {
  Goto,
  Back,
}

/// A related-tab load whose video is committed to the history and played
/// only if no newer list load has replaced it.
struct PendingVideo {
  load: u64,
  step: HistoryStep,
  rx: oneshot::Receiver<Arc<dyn StreamContext>>,
}

pub struct App {
  pub list: VideoListController,
  pub bounds: WindowBoundsCoordinator,
  pub gestures: GestureRouter,
  pub player: Player,
  pub subscriptions: SubscriptionStore,
  pub feed: Arc<SubscriptionFeedCache>,
  pub status_message: Option<String>,
  pub last_error: Option<String>,
  history: VideoHistory,
  extractor: Arc<dyn Extractor>,
  downloader: Arc<dyn Downloader>,
  pending_video: Option<PendingVideo>,
}

impl App {
  pub async fn new(
    config: &Config,
    paths: &Paths,
    extractor: Arc<dyn Extractor>,
    downloader: Arc<dyn Downloader>,
  ) -> Result<Self> {
    let subscriptions = SubscriptionStore::load_or_new(&paths.subscription_file)
      .await
      .with_context(|| format!("Failed to load subscriptions from {}", paths.subscription_file.display()))?;
    let storage = DiskCache::open(&paths.cache_dir, config.cache_max_bytes())
      .await
      .with_context(|| format!("Failed to open feed cache in {}", paths.cache_dir.display()))?;
    let feed = SubscriptionFeedCache::from_cache_or_new(storage, Arc::clone(&extractor), config.refresh_cooldown())
      .await
      .context("Failed to load subscription feed")?;

    let c = constants();
    let screen = Bounds::new(0, 0, c.base_width * 3, c.base_height * 3);
    let bounds = WindowBoundsCoordinator::new(
      VirtualWindow::new(Bounds::default(), Insets::default()),
      VirtualWindow::new(Bounds::default(), Insets::default()),
      screen,
    );
    bounds.arrange_initial(c.base_width);

    Ok(Self {
      list: VideoListController::new(c.base_height as f64),
      bounds,
      gestures: GestureRouter::new(),
      player: Player::new(config.player()),
      subscriptions,
      feed: Arc::new(feed),
      status_message: None,
      last_error: None,
      history: VideoHistory::new(),
      extractor,
      downloader,
      pending_video: None,
    })
  }

  pub fn set_error(&mut self, msg: String) {
    error!(msg = %msg, "app: error");
    self.last_error = Some(msg);
  }

  /// Opens (or refreshes) the search tab for `query`.
  pub fn open_search(&mut self, query: &str) {
    info!(query, "app: search");
    let identity = TabIdentity::search(query.to_string());
    let generator = ListGenerator::new(Vec::new(), Some(self.extractor.search_source(query)));
    self.list.with_cleared_list(async move { Ok((identity, generator)) });
  }

  /// Opens a channel tab: the channel itself followed by its uploads.
  pub fn open_channel(&mut self, channel: ChannelItem) {
    info!(url = %channel.url, "app: channel");
    let extractor = Arc::clone(&self.extractor);
    self.list.with_cleared_list(async move {
      let source = extractor.channel_feed_source(channel.service_id, &channel.url)?;
      let identity = TabIdentity::channel(channel.name.clone());
      Ok::<_, Error>((identity, ListGenerator::new(vec![ListItem::from(InfoItem::Channel(channel))], Some(source))))
    });
  }

  /// Plays a video and lists its related items, collapsing the list so only the video shows.
  pub fn open_video(&mut self, url: &str) {
    self.bounds.resize_to_base();
    let extractor = Arc::clone(&self.extractor);
    let url = url.to_string();
    self.load_related(HistoryStep::Goto, async move {
      let stream: Arc<dyn StreamContext> = Arc::from(extractor.stream(&url).await?);
      Ok::<_, Error>(stream)
    });
  }

  /// Returns to the previous video in the history.
  pub fn back(&mut self) {
    let Some(previous) = self.history.peek_back() else {
      warn!("app: no video to go back to");
      return;
    };
    self.load_related(HistoryStep::Back, async move { Ok::<_, Error>(previous) });
  }

  fn load_related<F>(&mut self, step: HistoryStep, resolve: F)
  where
    F: Future<Output = Result<Arc<dyn StreamContext>, Error>> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    let load = self.list.with_cleared_list(async move {
      let stream = resolve.await?;
      let _ = tx.send(Arc::clone(&stream));
      Ok::<_, Error>(GeneratorTab::create_related(stream.as_ref())?)
    });
    self.pending_video = Some(PendingVideo { load, step, rx });
  }

  /// Subscription feed tab. A forced refresh ignores the cooldown.
  pub fn open_subscriptions(&mut self, force_refresh: bool) {
    let feed = Arc::clone(&self.feed);
    let store = self.subscriptions.clone();
    self.list.with_cleared_list(async move {
      let channels = store.channels().await;
      let mut progress = feed.fetch_unseen_items(channels, force_refresh).await;
      while let Some(fetched) = progress.next().await {
        let channel = fetched?;
        info!(url = %channel.url, "app: feed channel fetched");
      }
      drop(progress);
      Ok::<_, Error>((TabIdentity::SUBSCRIPTION, feed.generator().await))
    });
  }

  pub fn open_settings(&mut self) {
    self.list.with_cleared_list(async {
      Ok((TabIdentity::SETTINGS, ListGenerator::from_items(vec![LocalNode::ImportSubscription])))
    });
  }

  pub async fn toggle_subscription(&mut self, channel: &ChannelIdentifier) -> bool {
    self.subscriptions.toggle(channel).await
  }

  /// Imports a NewPipe export from a file path or URL.
  pub async fn import_subscriptions(&mut self, location: &str) -> Result<usize> {
    let input = read_import_source(location, self.downloader.as_ref())
      .await
      .with_context(|| format!("Failed to read subscription export {location}"))?;
    let added = self.subscriptions.import(&NewPipeImportService, &input).await.context("Failed to import subscriptions")?;
    self.status_message = Some(format!("Imported {added} new channel(s)"));
    Ok(added)
  }

  /// Acts on the card at `index` of the visible list.
  pub fn activate(&mut self, index: usize) {
    let Some(card) = self.list.cards().get(index).cloned() else { return };
    match card {
      Card::Video(stream) => self.open_video(&stream.url),
      Card::Channel(channel) => self.open_channel(channel),
      Card::Node(LocalNode::SubscriptionUpdate) => self.open_subscriptions(true),
      Card::Node(LocalNode::ImportSubscription) => {
        self.status_message = Some("Run `piptube subscriptions import <file-or-url>` to import".into());
      }
      Card::Node(LocalNode::Info(_)) | Card::Comment(_) | Card::Error(_) => {}
    }
  }

  /// Switches the selected tab between its two generators.
  pub fn switch_generators(&mut self) {
    if let Err(e) = self.list.switch_generators() {
      warn!(err = %e, "app: switch rejected");
    }
  }

  /// Wheel over the video window.
  pub async fn scroll(&mut self, delta_y: f64) -> GestureOutcome {
    self.gestures.scroll(&mut self.list, &self.bounds, delta_y).await
  }

  /// Commits a resolved video to the history and returns its locator.
  /// A video whose load was superseded is dropped.
  pub(crate) fn take_ready_video(&mut self) -> Option<String> {
    let pending = self.pending_video.as_mut()?;
    let stream = match pending.rx.try_recv() {
      Ok(stream) => stream,
      Err(oneshot::error::TryRecvError::Empty) => return None,
      Err(oneshot::error::TryRecvError::Closed) => {
        self.pending_video = None;
        return None;
      }
    };
    let PendingVideo { load, step, .. } = self.pending_video.take()?;
    if self.list.is_superseded(load) {
      debug!(url = stream.url(), "app: dropping superseded video");
      return None;
    }
    match step {
      HistoryStep::Goto => self.history.push(Arc::clone(&stream)),
      HistoryStep::Back => {
        self.history.back();
      }
    }
    Some(stream.content_locator().to_string())
  }

  /// Applies finished background work: list loads, playback starts and ends.
  pub async fn check_pending(&mut self) -> Result<()> {
    self.list.check_pending();
    if let Some(locator) = self.take_ready_video()
      && let Err(e) = self.player.play(&locator).await
    {
      self.set_error(format!("{e:#}"));
    }
    if self.player.poll_finished() {
      self.bounds.resize_to_expanded();
    }
    Ok(())
  }

  /// Waits for list work to finish, then applies everything else that is ready.
  pub async fn settle(&mut self) -> Result<()> {
    self.list.settle().await;
    self.check_pending().await
  }

  pub async fn shutdown(&mut self) -> Result<()> {
    self.player.stop().await?;
    self.subscriptions.flush().await.context("Failed to save subscriptions")?;
    Ok(())
  }
}
