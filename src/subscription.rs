//! Persisted set of subscribed channels.
//!
//! Every mutation schedules a save in the background. Saves are coalesced: at
//! most one write is in flight, and mutations that land during a write cause
//! exactly one more write once it finishes, so the file always converges on
//! the latest in-memory set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::import::ImportService;
use crate::item::ChannelItem;

/// Key data of a channel. Field names match NewPipe's export format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelIdentifier {
  pub service_id: u32,
  pub url: String,
}

impl ChannelIdentifier {
  pub fn new(service_id: u32, url: impl Into<String>) -> Self {
    Self { service_id, url: url.into() }
  }
}

impl From<&ChannelItem> for ChannelIdentifier {
  fn from(channel: &ChannelItem) -> Self {
    Self::new(channel.service_id, channel.url.clone())
  }
}

/// Destination of serialized subscription snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
  async fn write(&self, bytes: Vec<u8>) -> Result<()>;
}

/// Writes snapshots to a file by replacing it atomically.
pub struct FileSink {
  path: PathBuf,
}

impl FileSink {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl SnapshotSink for FileSink {
  async fn write(&self, bytes: Vec<u8>) -> Result<()> {
    let path = self.path.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
      let dir = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
      std::fs::create_dir_all(&dir)?;
      let mut file = tempfile::NamedTempFile::new_in(&dir)?;
      file.write_all(&bytes)?;
      file.as_file().sync_all()?;
      file.persist(&path).map_err(|e| e.error)?;
      Ok(())
    })
    .await?
  }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriptionFile {
  channels: BTreeSet<ChannelIdentifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveState {
  Idle,
  Saving,
  SavingWithPending,
}

struct Inner {
  channels: Mutex<BTreeSet<ChannelIdentifier>>,
  sink: Box<dyn SnapshotSink>,
  save_state: watch::Sender<SaveState>,
}

/// Handle to the subscription set. Clones share the same set.
#[derive(Clone)]
pub struct SubscriptionStore {
  inner: Arc<Inner>,
}

impl SubscriptionStore {
  pub fn new(channels: impl IntoIterator<Item = ChannelIdentifier>, sink: impl SnapshotSink + 'static) -> Self {
    let (save_state, _) = watch::channel(SaveState::Idle);
    Self {
      inner: Arc::new(Inner {
        channels: Mutex::new(channels.into_iter().collect()),
        sink: Box::new(sink),
        save_state,
      }),
    }
  }

  /// Loads the set from `path`. A missing file yields an empty set, which is saved right away.
  pub async fn load_or_new(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    match tokio::fs::read(&path).await {
      Ok(bytes) => {
        let file: SubscriptionFile = serde_json::from_slice(&bytes)?;
        info!(path = %path.display(), channels = file.channels.len(), "subscription: loaded");
        Ok(Self::new(file.channels, FileSink::new(path)))
      }
      Err(e) if e.kind() == ErrorKind::NotFound => {
        info!(path = %path.display(), "subscription: no file, starting empty");
        let store = Self::new([], FileSink::new(path));
        store.request_save();
        Ok(store)
      }
      Err(e) => Err(e.into()),
    }
  }

  pub async fn channels(&self) -> Vec<ChannelIdentifier> {
    self.inner.channels.lock().await.iter().cloned().collect()
  }

  pub async fn is_subscribed(&self, channel: &ChannelIdentifier) -> bool {
    self.inner.channels.lock().await.contains(channel)
  }

  /// Flips membership of `channel`. Returns true if it is now subscribed.
  pub async fn toggle(&self, channel: &ChannelIdentifier) -> bool {
    let subscribed = {
      let mut channels = self.inner.channels.lock().await;
      if channels.remove(channel) {
        false
      } else {
        channels.insert(channel.clone());
        true
      }
    };
    info!(url = %channel.url, subscribed, "subscription: toggled");
    self.request_save();
    subscribed
  }

  /// Adds every channel parsed from `input`. Returns how many were new.
  pub async fn import(&self, service: &dyn ImportService, input: &[u8]) -> Result<usize> {
    let imported = service.import_subscription(input)?;
    let added = {
      let mut channels = self.inner.channels.lock().await;
      imported.into_iter().filter(|c| channels.insert(c.clone())).count()
    };
    info!(added, "subscription: imported");
    self.request_save();
    Ok(added)
  }

  /// Waits until no save is in flight or pending.
  pub async fn flush(&self) -> Result<()> {
    let mut state = self.inner.save_state.subscribe();
    state
      .wait_for(|s| *s == SaveState::Idle)
      .await
      .map(|_| ())
      .map_err(|_| Error::Task("subscription save state closed".into()))
  }

  fn request_save(&self) {
    let mut start = false;
    self.inner.save_state.send_modify(|state| {
      *state = match *state {
        SaveState::Idle => {
          start = true;
          SaveState::Saving
        }
        SaveState::Saving | SaveState::SavingWithPending => SaveState::SavingWithPending,
      };
    });
    if start {
      let inner = Arc::clone(&self.inner);
      tokio::spawn(async move { inner.save_loop().await });
    }
  }
}

impl Inner {
  async fn save_loop(&self) {
    loop {
      if let Err(e) = self.save_once().await {
        warn!(err = %e, "subscription: save failed");
      }
      let mut again = false;
      self.save_state.send_modify(|state| {
        *state = match *state {
          SaveState::SavingWithPending => {
            again = true;
            SaveState::Saving
          }
          SaveState::Idle | SaveState::Saving => SaveState::Idle,
        };
      });
      if !again {
        break;
      }
    }
  }

  async fn save_once(&self) -> Result<()> {
    let snapshot = SubscriptionFile { channels: self.channels.lock().await.clone() };
    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    debug!(channels = snapshot.channels.len(), bytes = bytes.len(), "subscription: saving");
    self.sink.write(bytes).await
  }
}
