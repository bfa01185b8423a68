//! Stack of watched videos behind the back action.

use std::sync::Arc;
use tracing::debug;

use crate::source::StreamContext;

#[derive(Default)]
pub struct VideoHistory {
  stack: Vec<Arc<dyn StreamContext>>,
}

impl VideoHistory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.stack.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stack.is_empty()
  }

  pub fn current(&self) -> Option<Arc<dyn StreamContext>> {
    self.stack.last().cloned()
  }

  pub fn push(&mut self, stream: Arc<dyn StreamContext>) {
    debug!(url = stream.url(), depth = self.stack.len() + 1, "navigation: push");
    self.stack.push(stream);
  }

  /// The entry [`Self::back`] would return, without dropping anything.
  pub fn peek_back(&self) -> Option<Arc<dyn StreamContext>> {
    let len = self.stack.len();
    self.stack.get(len.saturating_sub(2)).cloned()
  }

  /// Drops the current video and returns the one before it. The first video
  /// is never dropped, so backing out of it returns it again.
  pub fn back(&mut self) -> Option<Arc<dyn StreamContext>> {
    if self.stack.len() > 1 {
      self.stack.pop();
    }
    self.current()
  }
}
