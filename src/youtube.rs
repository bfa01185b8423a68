//! yt-dlp backed extractor.
//!
//! Listings use `--flat-playlist` with `--playlist-items start:end` so a page
//! costs one process; the cursor is the 1-based playlist index of the next page.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::constants::constants;
use crate::error::FetchError;
use crate::item::{ChannelItem, CommentItem, InfoItem, StreamItem, YOUTUBE_SERVICE_ID};
use crate::source::{Cursor, Extractor, Page, PagedSource, StreamContext};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Detect whether user input refers to a YouTube channel.
/// Returns the canonical uploads URL if detected, or None for a regular search.
pub fn detect_channel_url(input: &str) -> Option<String> {
  let trimmed = input.trim();
  if trimmed.starts_with('@') && !trimmed.contains(' ') && trimmed.len() > 1 {
    return Some(format!("https://www.youtube.com/{trimmed}/videos"));
  }
  if (trimmed.contains("youtube.com/@") || trimmed.contains("youtube.com/channel/"))
    && (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
  {
    return Some(uploads_url(trimmed));
  }
  None
}

/// Appends `/videos` so yt-dlp lists the channel's uploads.
fn uploads_url(channel_url: &str) -> String {
  let url = channel_url.trim_end_matches('/');
  if url.ends_with("/videos") { url.to_string() } else { format!("{url}/videos") }
}

fn field(parts: &[&str], idx: usize) -> Option<String> {
  parts.get(idx).map(|s| s.trim()).filter(|s| !s.is_empty() && *s != "NA").map(str::to_string)
}

fn parse_upload_date(s: &str) -> Option<DateTime<Utc>> {
  let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d")).ok()?;
  Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Parse one line of the listing print template:
/// `title\tid\tupload_date\tuploader\tduration\tview_count`.
fn parse_listing_line(line: &str) -> Option<StreamItem> {
  let parts: Vec<&str> = line.split('\t').collect();
  let id = field(&parts, 1)?;
  Some(StreamItem {
    service_id: YOUTUBE_SERVICE_ID,
    url: format!("{WATCH_URL}{id}"),
    name: field(&parts, 0).unwrap_or_else(|| id.clone()),
    upload_date: field(&parts, 2).as_deref().and_then(parse_upload_date),
    uploader_name: field(&parts, 3),
    duration: field(&parts, 4),
    view_count: field(&parts, 5).and_then(|v| v.parse().ok()),
  })
}

fn parse_listing(stdout: &str) -> Vec<StreamItem> {
  stdout.lines().map(str::trim).filter(|l| !l.is_empty()).filter_map(parse_listing_line).collect()
}

fn start_index(cursor: Option<&Cursor>) -> Result<usize, FetchError> {
  match cursor {
    None => Ok(1),
    Some(c) => c.0.parse().map_err(|_| FetchError::Parsing(format!("invalid listing cursor: {}", c.0))),
  }
}

/// Builds the page for a listing window. A short window is the last page.
fn listing_page(items: Vec<StreamItem>, start: usize, page_size: usize) -> Result<Page, FetchError> {
  if items.is_empty() && start == 1 {
    return Err(FetchError::NothingFound);
  }
  let next = (items.len() >= page_size).then(|| Cursor((start + page_size).to_string()));
  Ok(Page::new(items.into_iter().map(InfoItem::Stream).collect(), next))
}

/// Runs yt-dlp and returns stdout, mapping process failures onto fetch errors.
async fn run_yt_dlp(args: &[&str]) -> Result<String, FetchError> {
  debug!(?args, "youtube: running yt-dlp");
  let output = Command::new("yt-dlp")
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await
    .map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        FetchError::Transport("yt-dlp not found. Install it with: brew install yt-dlp (macOS) or pip install yt-dlp".into())
      } else {
        FetchError::Transport(format!("failed to execute yt-dlp: {e}"))
      }
    })?;

  let stdout = String::from_utf8(output.stdout).map_err(|_| FetchError::Parsing("yt-dlp output non-UTF8".into()))?;
  if !output.status.success() && stdout.trim().is_empty() {
    return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
  }
  Ok(stdout)
}

fn classify_failure(stderr: &str) -> FetchError {
  let message = stderr.trim().to_string();
  if message.contains("HTTP Error 429") {
    FetchError::Transport(format!("rate limited: {message}"))
  } else if message.contains("Unable to download") || message.contains("timed out") {
    FetchError::Transport(message)
  } else {
    FetchError::Extraction(message)
  }
}

async fn fetch_listing(target: &str, start: usize, page_size: usize) -> Result<Vec<StreamItem>, FetchError> {
  let range = format!("{start}:{}", start + page_size - 1);
  let stdout = run_yt_dlp(&[
    "--flat-playlist",
    "--print",
    &constants().print_format,
    "--playlist-items",
    &range,
    "--ignore-errors",
    "--no-warnings",
    "--",
    target,
  ])
  .await?;
  Ok(parse_listing(&stdout))
}

pub struct SearchSource {
  query: String,
  page_size: usize,
}

#[async_trait]
impl PagedSource for SearchSource {
  async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
    let start = start_index(cursor)?;
    let target = format!("ytsearch{}:{}", start + self.page_size - 1, self.query);
    let items = fetch_listing(&target, start, self.page_size).await?;
    listing_page(items, start, self.page_size)
  }
}

pub struct ChannelFeedSource {
  url: String,
  page_size: usize,
}

#[async_trait]
impl PagedSource for ChannelFeedSource {
  async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
    let start = start_index(cursor)?;
    let items = fetch_listing(&self.url, start, self.page_size).await?;
    listing_page(items, start, self.page_size)
  }
}

#[derive(Deserialize)]
struct CommentJson {
  id: String,
  #[serde(default)]
  text: String,
  #[serde(default)]
  author: Option<String>,
  #[serde(default)]
  like_count: Option<i64>,
  #[serde(default)]
  timestamp: Option<i64>,
}

#[derive(Deserialize)]
struct VideoJson {
  id: String,
  title: String,
  #[serde(default)]
  webpage_url: Option<String>,
  #[serde(default)]
  uploader: Option<String>,
  #[serde(default)]
  channel_url: Option<String>,
  #[serde(default)]
  duration_string: Option<String>,
  #[serde(default)]
  upload_date: Option<String>,
  #[serde(default)]
  view_count: Option<u64>,
  #[serde(default)]
  comments: Option<Vec<CommentJson>>,
}

fn comments_from_json(video_url: &str, json: &str) -> Result<Vec<CommentItem>, FetchError> {
  let video: VideoJson = serde_json::from_str(json).map_err(|e| FetchError::Parsing(e.to_string()))?;
  Ok(
    video
      .comments
      .unwrap_or_default()
      .into_iter()
      .map(|c| CommentItem {
        service_id: YOUTUBE_SERVICE_ID,
        url: format!("{video_url}&lc={}", c.id),
        author: c.author.unwrap_or_default(),
        text: c.text,
        like_count: c.like_count,
        published: c.timestamp.and_then(|t| DateTime::from_timestamp(t, 0)).map(|d| d.format("%Y-%m-%d").to_string()),
      })
      .collect(),
  )
}

/// Comments of one video. yt-dlp returns them all at once, so this is a single page.
pub struct CommentsSource {
  video_url: String,
}

#[async_trait]
impl PagedSource for CommentsSource {
  async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page, FetchError> {
    if cursor.is_some() {
      return Ok(Page::exhausted());
    }
    let stdout = run_yt_dlp(&[
      "--skip-download",
      "--get-comments",
      "--dump-single-json",
      "--no-playlist",
      "--no-warnings",
      "--",
      &self.video_url,
    ])
    .await?;
    let comments = comments_from_json(&self.video_url, &stdout)?;
    if comments.is_empty() {
      return Err(FetchError::NothingFound);
    }
    Ok(Page::new(comments.into_iter().map(InfoItem::Comment).collect(), None))
  }
}

/// A resolved video. Related items are the uploader's channel followed by a
/// search on the title, since yt-dlp exposes no related-video list.
pub struct YtStream {
  url: String,
  name: String,
  related: Vec<InfoItem>,
}

impl StreamContext for YtStream {
  fn url(&self) -> &str {
    &self.url
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn content_locator(&self) -> &str {
    &self.url
  }

  fn related_items(&self) -> Result<Vec<InfoItem>, FetchError> {
    Ok(self.related.clone())
  }

  fn comments_source(&self) -> Result<Box<dyn PagedSource>, FetchError> {
    if !self.url.starts_with(WATCH_URL) {
      return Err(FetchError::Parsing(format!("no comments for {}", self.url)));
    }
    Ok(Box::new(CommentsSource { video_url: self.url.clone() }))
  }
}

/// Extractor that shells out to yt-dlp.
#[derive(Debug, Clone)]
pub struct YtDlp {
  search_page_size: usize,
  feed_page_size: usize,
}

impl YtDlp {
  pub fn new(search_page_size: usize) -> Self {
    Self { search_page_size: search_page_size.max(1), feed_page_size: constants().page_size }
  }
}

impl Default for YtDlp {
  fn default() -> Self {
    Self::new(constants().search_page_size)
  }
}

#[async_trait]
impl Extractor for YtDlp {
  fn search_source(&self, query: &str) -> Box<dyn PagedSource> {
    Box::new(SearchSource { query: query.to_string(), page_size: self.search_page_size })
  }

  fn channel_feed_source(&self, service_id: u32, url: &str) -> Result<Box<dyn PagedSource>, FetchError> {
    if service_id != YOUTUBE_SERVICE_ID {
      return Err(FetchError::UnsupportedService(service_id));
    }
    Ok(Box::new(ChannelFeedSource { url: uploads_url(url), page_size: self.feed_page_size }))
  }

  async fn stream(&self, url: &str) -> Result<Box<dyn StreamContext>, FetchError> {
    let stdout = run_yt_dlp(&["--skip-download", "--dump-single-json", "--no-playlist", "--no-warnings", "--", url]).await?;
    let video: VideoJson = serde_json::from_str(&stdout).map_err(|e| FetchError::Parsing(e.to_string()))?;
    let url = video.webpage_url.clone().unwrap_or_else(|| format!("{WATCH_URL}{}", video.id));
    info!(url = %url, title = %video.title, "youtube: stream resolved");

    let mut related = Vec::new();
    if let Some(channel_url) = &video.channel_url {
      related.push(InfoItem::Channel(ChannelItem {
        service_id: YOUTUBE_SERVICE_ID,
        url: channel_url.clone(),
        name: video.uploader.clone().unwrap_or_else(|| channel_url.clone()),
        description: None,
      }));
    }
    let target = format!("ytsearch{}:{}", self.search_page_size, video.title);
    match fetch_listing(&target, 1, self.search_page_size).await {
      Ok(items) => related.extend(items.into_iter().filter(|s| s.url != url).map(InfoItem::Stream)),
      Err(FetchError::NothingFound) => {}
      Err(e) => return Err(e),
    }

    debug!(
      uploader = ?video.uploader,
      duration = ?video.duration_string,
      date = ?video.upload_date.as_deref().and_then(parse_upload_date),
      views = ?video.view_count,
      related = related.len(),
      "youtube: related items"
    );
    Ok(Box::new(YtStream { url, name: video.title, related }))
  }
}
