//! Cached feed of videos from subscribed channels.

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::disk_cache::DiskCache;
use crate::error::{FetchError, Result};
use crate::generator::ListGenerator;
use crate::item::{InfoItem, ListItem, LocalNode, StreamItem};
use crate::source::Extractor;
use crate::subscription::ChannelIdentifier;

/// Newest first, undated last, then by service and url.
fn feed_order(a: &StreamItem, b: &StreamItem) -> Ordering {
  let time = |s: &StreamItem| Reverse(s.upload_date.map_or(-1, |d| d.timestamp()));
  time(a).cmp(&time(b)).then(a.service_id.cmp(&b.service_id)).then_with(|| a.url.cmp(&b.url))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedSnapshot {
  items: Vec<StreamItem>,
  /// Seconds since the Unix epoch; 0 if never refreshed.
  last_updated: i64,
}

#[derive(Default)]
struct FeedState {
  items: Vec<StreamItem>,
  keys: HashSet<(u32, String)>,
  last_updated: i64,
}

impl FeedState {
  fn from_snapshot(snapshot: FeedSnapshot) -> Self {
    let mut state = Self { last_updated: snapshot.last_updated, ..Self::default() };
    state.merge(snapshot.items);
    state
  }

  /// Adds items whose (service, url) is not yet present. Returns how many were added.
  fn merge(&mut self, items: impl IntoIterator<Item = StreamItem>) -> usize {
    let before = self.items.len();
    for item in items {
      if self.keys.insert((item.service_id, item.url.clone())) {
        self.items.push(item);
      }
    }
    self.items.sort_by(feed_order);
    self.items.len() - before
  }
}

enum Progress {
  Fetching(std::vec::IntoIter<ChannelIdentifier>),
  Done,
}

/// Deduplicated, time-ordered videos of subscribed channels, persisted in a [`DiskCache`].
pub struct SubscriptionFeedCache {
  state: Mutex<FeedState>,
  storage: DiskCache,
  extractor: Arc<dyn Extractor>,
  cooldown: Duration,
}

impl SubscriptionFeedCache {
  /// Loads the feed from `storage`, storing an empty one if there is none.
  pub async fn from_cache_or_new(storage: DiskCache, extractor: Arc<dyn Extractor>, cooldown: Duration) -> Result<Self> {
    let key = constants().feed_cache_key.as_str();
    let bytes = storage.get_or_put(key, || Ok(serde_json::to_vec(&FeedSnapshot::default())?)).await?;
    let snapshot: FeedSnapshot = serde_json::from_slice(&bytes)?;
    info!(items = snapshot.items.len(), last_updated = snapshot.last_updated, "feed_cache: loaded");
    Ok(Self { state: Mutex::new(FeedState::from_snapshot(snapshot)), storage, extractor, cooldown })
  }

  pub async fn seen_items(&self) -> Vec<StreamItem> {
    self.state.lock().await.items.clone()
  }

  /// Static generator over the cached feed, headed by the "update subscription" node.
  pub async fn generator(&self) -> ListGenerator {
    let items = self.seen_items().await;
    ListGenerator::new(
      std::iter::once(ListItem::Node(LocalNode::SubscriptionUpdate))
        .chain(items.into_iter().map(ListItem::from))
        .collect(),
      None,
    )
  }

  pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
    let secs = self.state.lock().await.last_updated;
    (secs > 0).then(|| DateTime::from_timestamp(secs, 0)).flatten()
  }

  /// True if a refresh at `now` would be skipped for cooldown.
  pub async fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
    let last = self.state.lock().await.last_updated;
    last.saturating_add(self.cooldown.as_secs() as i64) > now.timestamp()
  }

  /// Fetches the newest page of each channel in turn, yielding each channel once it is merged.
  ///
  /// Empty while the cooldown is active unless `ignore_cooldown`. The refresh
  /// time and the on-disk feed are written only after the last channel, so an
  /// error (yielded as the final item) leaves both unchanged. Dropping the
  /// stream early also skips the write.
  pub async fn fetch_unseen_items(
    &self,
    channels: Vec<ChannelIdentifier>,
    ignore_cooldown: bool,
  ) -> BoxStream<'_, Result<ChannelIdentifier>> {
    let now = Utc::now();
    if !ignore_cooldown && self.is_cooling_down(now).await {
      debug!("feed_cache: cooldown active, skipping refresh");
      return stream::empty().boxed();
    }
    info!(channels = channels.len(), ignore_cooldown, "feed_cache: refreshing");

    stream::unfold(Progress::Fetching(channels.into_iter()), move |progress| async move {
      let Progress::Fetching(mut remaining) = progress else { return None };
      match remaining.next() {
        Some(channel) => match self.fetch_channel(&channel).await {
          Ok(()) => Some((Ok(channel), Progress::Fetching(remaining))),
          Err(e) => Some((Err(e), Progress::Done)),
        },
        None => match self.persist(now).await {
          Ok(()) => None,
          Err(e) => Some((Err(e), Progress::Done)),
        },
      }
    })
    .boxed()
  }

  async fn fetch_channel(&self, channel: &ChannelIdentifier) -> Result<()> {
    let source = match self.extractor.channel_feed_source(channel.service_id, &channel.url) {
      Ok(source) => source,
      Err(FetchError::UnsupportedService(service_id)) => {
        warn!(url = %channel.url, service_id, "feed_cache: skipping channel of unsupported service");
        return Ok(());
      }
      Err(e) => return Err(e.into()),
    };
    let mut generator = ListGenerator::new(Vec::new(), Some(source));
    let streams: Vec<StreamItem> = generator
      .unseen_items()
      .await?
      .into_iter()
      .filter_map(|item| match item {
        ListItem::Remote(InfoItem::Stream(s)) => Some(s),
        _ => None,
      })
      .collect();
    let added = self.state.lock().await.merge(streams);
    debug!(url = %channel.url, added, "feed_cache: channel merged");
    Ok(())
  }

  async fn persist(&self, now: DateTime<Utc>) -> Result<()> {
    let bytes = {
      let state = self.state.lock().await;
      serde_json::to_vec(&FeedSnapshot { items: state.items.clone(), last_updated: now.timestamp() })?
    };
    self.storage.put(&constants().feed_cache_key, &bytes).await?;
    self.state.lock().await.last_updated = now.timestamp();
    info!(bytes = bytes.len(), "feed_cache: persisted");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{Error, FetchError};
  use crate::source::{Cursor, Page, PagedSource, StreamContext};
  use async_trait::async_trait;
  use chrono::TimeZone;
  use std::collections::HashMap;
  use tempfile::TempDir;

  fn video(id: &str, day: Option<u32>) -> StreamItem {
    StreamItem {
      service_id: 0,
      url: format!("https://www.youtube.com/watch?v={id}"),
      name: id.to_string(),
      uploader_name: None,
      upload_date: day.map(|d| Utc.with_ymd_and_hms(2024, 5, d, 12, 0, 0).unwrap()),
      duration: None,
      view_count: None,
    }
  }

  struct FixedPage(Vec<StreamItem>);

  #[async_trait]
  impl PagedSource for FixedPage {
    async fn fetch_page(&self, _cursor: Option<&Cursor>) -> std::result::Result<Page, FetchError> {
      Ok(Page::new(self.0.iter().cloned().map(InfoItem::Stream).collect(), None))
    }
  }

  struct FailingPage;

  #[async_trait]
  impl PagedSource for FailingPage {
    async fn fetch_page(&self, _cursor: Option<&Cursor>) -> std::result::Result<Page, FetchError> {
      Err(FetchError::Transport("feed unreachable".into()))
    }
  }

  /// Channel url to its feed; urls starting with "broken" fail and only service 0 is supported.
  struct FakeExtractor(HashMap<String, Vec<StreamItem>>);

  #[async_trait]
  impl Extractor for FakeExtractor {
    fn search_source(&self, _query: &str) -> Box<dyn PagedSource> {
      Box::new(FixedPage(Vec::new()))
    }

    fn channel_feed_source(&self, service_id: u32, url: &str) -> std::result::Result<Box<dyn PagedSource>, FetchError> {
      if service_id != 0 {
        return Err(FetchError::UnsupportedService(service_id));
      }
      if url.starts_with("broken") {
        return Ok(Box::new(FailingPage));
      }
      Ok(Box::new(FixedPage(self.0.get(url).cloned().unwrap_or_default())))
    }

    async fn stream(&self, url: &str) -> std::result::Result<Box<dyn StreamContext>, FetchError> {
      Err(FetchError::Extraction(format!("no stream {url}")))
    }
  }

  fn extractor() -> Arc<dyn Extractor> {
    Arc::new(FakeExtractor(HashMap::from([
      ("a".to_string(), vec![video("a1", Some(3)), video("a2", None)]),
      ("b".to_string(), vec![video("b1", Some(5)), video("a1", Some(3))]),
    ])))
  }

  async fn open(dir: &TempDir) -> SubscriptionFeedCache {
    let storage = DiskCache::open(dir.path(), 1024 * 1024).await.unwrap();
    SubscriptionFeedCache::from_cache_or_new(storage, extractor(), Duration::from_secs(30 * 60)).await.unwrap()
  }

  fn channel(url: &str) -> ChannelIdentifier {
    ChannelIdentifier::new(0, url)
  }

  #[test]
  fn orders_newest_first_with_undated_last() {
    let mut state = FeedState::default();
    assert_eq!(state.merge([video("old", Some(1)), video("undated", None), video("new", Some(9))]), 3);
    assert_eq!(state.merge([video("new", Some(9))]), 0);
    let names: Vec<_> = state.items.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["new", "old", "undated"]);
  }

  #[tokio::test]
  async fn refresh_merges_and_persists() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;
    assert!(cache.seen_items().await.is_empty());
    assert_eq!(cache.last_updated().await, None);

    let emitted: Vec<_> = cache.fetch_unseen_items(vec![channel("a"), channel("b")], false).await.collect().await;
    let emitted: Vec<_> = emitted.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(emitted, vec![channel("a"), channel("b")]);

    let names: Vec<_> = cache.seen_items().await.into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["b1", "a1", "a2"]);
    assert!(cache.last_updated().await.is_some());

    drop(cache);
    let reopened = open(&dir).await;
    assert_eq!(reopened.seen_items().await.len(), 3);
    assert!(reopened.last_updated().await.is_some());
  }

  #[tokio::test]
  async fn cooldown_skips_unless_forced() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;
    let _: Vec<_> = cache.fetch_unseen_items(vec![channel("a")], false).await.collect().await;
    assert!(cache.is_cooling_down(Utc::now()).await);
    let refreshed_at = cache.last_updated().await;
    assert!(refreshed_at.is_some());

    let skipped: Vec<_> = cache.fetch_unseen_items(vec![channel("b")], false).await.collect().await;
    assert!(skipped.is_empty());
    assert_eq!(cache.seen_items().await.len(), 2);
    assert_eq!(cache.last_updated().await, refreshed_at);

    let forced: Vec<_> = cache.fetch_unseen_items(vec![channel("b")], true).await.collect().await;
    assert_eq!(forced.len(), 1);
    assert_eq!(cache.seen_items().await.len(), 3);
  }

  #[tokio::test]
  async fn failure_stops_without_persisting() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;

    let results: Vec<_> =
      cache.fetch_unseen_items(vec![channel("a"), channel("broken"), channel("b")], false).await.collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &channel("a"));
    assert!(matches!(results[1], Err(Error::Fetch(FetchError::Transport(_)))));
    assert_eq!(cache.last_updated().await, None);

    drop(cache);
    let reopened = open(&dir).await;
    assert!(reopened.seen_items().await.is_empty());
  }

  #[tokio::test]
  async fn unsupported_service_is_skipped() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;
    let soundcloud = ChannelIdentifier::new(1, "https://soundcloud.com/x");

    let results: Vec<_> =
      cache.fetch_unseen_items(vec![soundcloud.clone(), channel("b")], true).await.collect().await;
    let emitted: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(emitted, vec![soundcloud, channel("b")]);
    assert_eq!(cache.seen_items().await.len(), 2);
    assert!(cache.last_updated().await.is_some());
  }

  #[tokio::test]
  async fn generator_starts_with_update_node() {
    let dir = TempDir::new().unwrap();
    let cache = open(&dir).await;
    let _: Vec<_> = cache.fetch_unseen_items(vec![channel("a")], true).await.collect().await;

    let mut generator = cache.generator().await;
    let (items, has_next) = generator.items_from(0).await.unwrap();
    assert_eq!(items[0], ListItem::Node(LocalNode::SubscriptionUpdate));
    assert_eq!(items.len(), 3);
    assert!(!has_next);
  }
}
