//! Tuneables embedded from `constants.ron` and parsed once on first access.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // List generator
  pub page_size: usize,
  pub search_page_size: usize,

  // Window geometry
  pub base_width: i32,
  pub base_height: i32,
  pub bounds_settle_delay_ms: u64,

  // Card heights
  pub video_card_height: f64,
  pub channel_card_height: f64,
  pub comment_card_height: f64,
  pub node_card_height: f64,
  pub card_spacing: f64,

  // Subscription feed
  pub refresh_cooldown_minutes: u64,
  pub feed_cache_max_bytes: u64,
  pub feed_cache_key: String,

  // Transport
  pub user_agent: String,
  pub read_timeout_secs: u64,

  // yt-dlp
  pub print_format: String,
}

impl Constants {
  pub fn bounds_settle_delay(&self) -> Duration {
    Duration::from_millis(self.bounds_settle_delay_ms)
  }

  pub fn refresh_cooldown(&self) -> Duration {
    Duration::from_secs(self.refresh_cooldown_minutes * 60)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  ron::from_str(include_str!("../constants.ron")).expect("embedded constants.ron is valid RON")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.page_size, 10);
    assert_eq!(c.refresh_cooldown(), Duration::from_secs(30 * 60));
    assert_eq!(c.feed_cache_max_bytes, 100 * 1024 * 1024);
    assert!(c.print_format.contains("%(id)s"));
  }
}
