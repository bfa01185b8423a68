//! Items that populate every scrollable list: remote info items from the video
//! platform and locally constructed placeholder nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service id assigned to YouTube, matching NewPipe's numbering so exported
/// subscription files import unchanged.
pub const YOUTUBE_SERVICE_ID: u32 = 0;

/// A single video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamItem {
  pub service_id: u32,
  pub url: String,
  pub name: String,
  pub uploader_name: Option<String>,
  pub upload_date: Option<DateTime<Utc>>,
  pub duration: Option<String>,
  pub view_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelItem {
  pub service_id: u32,
  pub url: String,
  pub name: String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentItem {
  pub service_id: u32,
  pub url: String,
  pub author: String,
  pub text: String,
  pub like_count: Option<i64>,
  pub published: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
  pub service_id: u32,
  pub url: String,
  pub name: String,
  pub stream_count: Option<u64>,
}

/// Remote content as returned by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoItem {
  Stream(StreamItem),
  Channel(ChannelItem),
  Comment(CommentItem),
  /// Listed by some sources but not presentable as a card.
  Playlist(PlaylistItem),
}

/// Placeholder entries the controller renders as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalNode {
  /// "Update subscription…" action at the top of the subscription feed.
  SubscriptionUpdate,
  /// "Import NewPipe subscription" action on the settings page.
  ImportSubscription,
  /// Free-form informational card.
  Info(String),
}

/// Entry of a list generator. Never mutated once it has been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
  Remote(InfoItem),
  Node(LocalNode),
}

impl From<InfoItem> for ListItem {
  fn from(item: InfoItem) -> Self {
    ListItem::Remote(item)
  }
}

impl From<LocalNode> for ListItem {
  fn from(node: LocalNode) -> Self {
    ListItem::Node(node)
  }
}

impl From<StreamItem> for ListItem {
  fn from(item: StreamItem) -> Self {
    ListItem::Remote(InfoItem::Stream(item))
  }
}
