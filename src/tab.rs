use std::borrow::Cow;
use std::fmt;

/// Tab kinds that prefix a customizable label. Tabs of the same kind share a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabKind {
  /// Information and video listing of a channel.
  Channel,
  /// Search results.
  Search,
}

impl TabKind {
  pub fn glyph(self) -> &'static str {
    match self {
      TabKind::Channel => "@ ",
      TabKind::Search => "? ",
    }
  }
}

/// Identifier for a tab, which also determines the tab title.
/// A newer tab with an equal identifier replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabIdentity {
  kind: Option<TabKind>,
  label: Cow<'static, str>,
}

impl TabIdentity {
  /// Related videos of the playing video.
  pub const RELATED: TabIdentity = TabIdentity::fixed("~ Related");
  /// Application settings.
  pub const SETTINGS: TabIdentity = TabIdentity::fixed("/ Settings");
  /// Video listing of subscribed channels.
  pub const SUBSCRIPTION: TabIdentity = TabIdentity::fixed("$ Subscription");

  const fn fixed(label: &'static str) -> Self {
    Self { kind: None, label: Cow::Borrowed(label) }
  }

  pub fn new(kind: TabKind, label: impl Into<String>) -> Self {
    Self { kind: Some(kind), label: Cow::Owned(label.into()) }
  }

  pub fn channel(name: impl Into<String>) -> Self {
    Self::new(TabKind::Channel, name)
  }

  pub fn search(query: impl Into<String>) -> Self {
    Self::new(TabKind::Search, query)
  }

  pub fn kind(&self) -> Option<TabKind> {
    self.kind
  }

  pub fn label(&self) -> &str {
    &self.label
  }
}

impl fmt::Display for TabIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(kind) = self.kind {
      f.write_str(kind.glyph())?;
    }
    f.write_str(&self.label)
  }
}
