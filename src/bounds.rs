//! Geometry of the control window and the video window.
//!
//! The control window (tabs and list) sits directly above the video window and
//! the pair moves as one. All coordinates are screen pixels with y growing
//! downwards, so "growing upward" means decreasing `y` while increasing `height`.

use std::ops::{Add, Not, Sub};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::constants::constants;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
  pub x: i32,
  pub y: i32,
}

impl Point {
  pub fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }
}

impl Add for Point {
  type Output = Point;

  fn add(self, other: Point) -> Point {
    Point::new(self.x + other.x, self.y + other.y)
  }
}

impl Sub for Point {
  type Output = Point;

  fn sub(self, other: Point) -> Point {
    Point::new(self.x - other.x, self.y - other.y)
  }
}

/// Window geometry in pixels: position (x, y) and size (width, height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl Bounds {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self { x, y, width, height }
  }

  pub fn location(&self) -> Point {
    Point::new(self.x, self.y)
  }

  pub fn at(self, location: Point) -> Self {
    Self { x: location.x, y: location.y, ..self }
  }

  pub fn bottom(&self) -> i32 {
    self.y + self.height
  }

  pub fn right(&self) -> i32 {
    self.x + self.width
  }
}

/// Window decoration thickness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Insets {
  pub top: i32,
  pub bottom: i32,
  pub left: i32,
  pub right: i32,
}

impl Insets {
  pub fn vertical(&self) -> i32 {
    self.top + self.bottom
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalDirection {
  Left,
  Right,
}

impl Not for HorizontalDirection {
  type Output = HorizontalDirection;

  fn not(self) -> HorizontalDirection {
    match self {
      HorizontalDirection::Left => HorizontalDirection::Right,
      HorizontalDirection::Right => HorizontalDirection::Left,
    }
  }
}

/// A top-level window the coordinator can move and resize.
pub trait WindowSurface: Send {
  fn bounds(&self) -> Bounds;

  fn set_bounds(&mut self, bounds: Bounds);

  fn set_location(&mut self, location: Point) {
    let bounds = self.bounds().at(location);
    self.set_bounds(bounds);
  }

  fn insets(&self) -> Insets {
    Insets::default()
  }

  fn set_focusable(&mut self, focusable: bool);

  fn set_visible(&mut self, visible: bool);

  fn to_front(&mut self);
}

/// In-memory window used headless and in tests. Records focus and visibility changes.
#[derive(Debug, Clone, Default)]
pub struct VirtualWindow {
  pub bounds: Bounds,
  pub insets: Insets,
  pub focusable: bool,
  pub visible: bool,
  pub visibility_changes: Vec<bool>,
  pub raised: usize,
}

impl VirtualWindow {
  pub fn new(bounds: Bounds, insets: Insets) -> Self {
    Self { bounds, insets, focusable: true, visible: true, ..Self::default() }
  }
}

impl WindowSurface for VirtualWindow {
  fn bounds(&self) -> Bounds {
    self.bounds
  }

  fn set_bounds(&mut self, bounds: Bounds) {
    self.bounds = bounds;
  }

  fn insets(&self) -> Insets {
    self.insets
  }

  fn set_focusable(&mut self, focusable: bool) {
    self.focusable = focusable;
  }

  fn set_visible(&mut self, visible: bool) {
    self.visible = visible;
    self.visibility_changes.push(visible);
  }

  fn to_front(&mut self) {
    self.raised += 1;
  }
}

struct Windows<W> {
  control: W,
  video: W,
  /// Video window location relative to the pointer at drag start.
  move_offset: Point,
}

/// Owns the geometry of the window pair.
///
/// Geometry operations are synchronous and never fail. Only [`Self::handle_scroll`]
/// suspends, for a short settle delay while it holds the scroll-resize lock.
pub struct WindowBoundsCoordinator<W: WindowSurface = VirtualWindow> {
  windows: Mutex<Windows<W>>,
  /// Usable area of the primary screen.
  screen: Bounds,
  base_height: i32,
  scroll_lock: tokio::sync::Mutex<()>,
}

impl<W: WindowSurface> WindowBoundsCoordinator<W> {
  pub fn new(control: W, video: W, screen: Bounds) -> Self {
    Self::with_base_height(control, video, screen, constants().base_height)
  }

  pub fn with_base_height(control: W, video: W, screen: Bounds, base_height: i32) -> Self {
    Self {
      windows: Mutex::new(Windows { control, video, move_offset: Point::default() }),
      screen,
      base_height,
      scroll_lock: tokio::sync::Mutex::new(()),
    }
  }

  fn windows(&self) -> MutexGuard<'_, Windows<W>> {
    self.windows.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Runs `f` with read access to the control and video windows.
  pub fn with_windows<R>(&self, f: impl FnOnce(&W, &W) -> R) -> R {
    let w = self.windows();
    f(&w.control, &w.video)
  }

  pub fn control_bounds(&self) -> Bounds {
    self.windows().control.bounds()
  }

  pub fn video_bounds(&self) -> Bounds {
    self.windows().video.bounds()
  }

  /// Records where the video window is relative to the pointer at drag start.
  pub fn prepare_move(&self, start: Point) {
    let mut w = self.windows();
    w.move_offset = w.video.bounds().location() - start;
  }

  /// Moves the video window with the pointer and keeps the control window on top of it.
  pub fn update_move(&self, current: Point) {
    let mut w = self.windows();
    let video = current + w.move_offset;
    w.video.set_location(video);
    let control_height = w.control.bounds().height;
    w.control.set_location(video - Point::new(0, control_height));
  }

  /// Resizes the control window by `delta` pixels, keeping its bottom edge fixed.
  ///
  /// Returns whether the height changed; false means the window is at a size
  /// limit. A call that overlaps a resize still in progress is dropped and
  /// reported as handled (true).
  pub async fn handle_scroll(&self, delta: f64) -> bool {
    let Ok(_guard) = self.scroll_lock.try_lock() else {
      debug!(delta, "bounds: scroll resize already in progress");
      return true;
    };

    let delta_height = {
      let mut w = self.windows();
      let old = w.control.bounds();
      let inset = w.control.insets().vertical();
      let height = ((old.height as f64 + delta) as i32).clamp(inset, inset + self.base_height);
      let delta_height = height - old.height;
      w.control.set_bounds(Bounds::new(old.x, old.y - delta_height, old.width, height));
      delta_height
    };

    tokio::time::sleep(constants().bounds_settle_delay()).await;
    delta_height != 0
  }

  /// Collapses the control window to its decorations only, so just the video shows.
  pub fn resize_to_base(&self) -> bool {
    let mut w = self.windows();
    let inset = w.control.insets().vertical();
    Self::resize_control(&mut w.control, inset)
  }

  /// Expands the control window to its full height above the video.
  pub fn resize_to_expanded(&self) -> bool {
    let mut w = self.windows();
    let height = w.control.insets().vertical() + self.base_height;
    Self::resize_control(&mut w.control, height)
  }

  fn resize_control(control: &mut W, height: i32) -> bool {
    let old = control.bounds();
    let delta = old.height - height;
    control.set_bounds(Bounds::new(old.x, old.y + delta, old.width, height));
    delta != 0
  }

  /// Places the control window directly above the video window.
  pub fn rejoin_windows(&self) {
    let mut w = self.windows();
    let video = w.video.bounds().location();
    let control_height = w.control.bounds().height;
    w.control.set_location(video - Point::new(0, control_height));
  }

  /// Which half of the screen the video window is on.
  pub fn horizontal_direction(&self) -> HorizontalDirection {
    let video = self.video_bounds();
    let min_x = self.screen.x as f64 + self.screen.width as f64 / 2.0 - video.width as f64 / 2.0;
    if video.x as f64 > min_x { HorizontalDirection::Right } else { HorizontalDirection::Left }
  }

  /// Docks the video window to a bottom corner; the control window keeps its offset from it.
  pub fn move_to_bottom(&self, direction: HorizontalDirection) {
    let mut w = self.windows();
    let video = w.video.bounds();
    let control_relative = w.control.bounds().location() - video.location();

    let x = match direction {
      HorizontalDirection::Right => self.screen.right() - video.width,
      HorizontalDirection::Left => self.screen.x,
    };
    let y = self.screen.bottom() - video.height;

    w.control.set_location(Point::new(x, y) + control_relative);
    w.video.set_location(Point::new(x, y));
    debug!(?direction, x, y, "bounds: docked");
  }

  pub fn move_to_bottom_right(&self) {
    self.move_to_bottom(HorizontalDirection::Right);
  }

  /// Toggles whether the control window takes input focus.
  pub fn focus_control_pane(&self, should_focus: bool) {
    let mut w = self.windows();
    w.control.set_focusable(should_focus);
    if should_focus {
      w.control.to_front();
    } else {
      // Cycling visibility makes the window manager hand focus back.
      w.control.set_visible(false);
      w.control.set_visible(true);
    }
  }

  /// Sizes both windows to the base video size, stacks control above video
  /// and docks the pair bottom-right.
  pub fn arrange_initial(&self, base_width: i32) {
    {
      let mut w = self.windows();
      let video = w.video.bounds();
      w.video.set_bounds(Bounds::new(video.x, video.y, base_width, self.base_height));
      let height = w.control.insets().vertical() + self.base_height;
      w.control.set_bounds(Bounds::new(video.x, video.y - height, base_width, height));
    }
    self.move_to_bottom_right();
    info!(video = ?self.video_bounds(), control = ?self.control_bounds(), "bounds: initial arrangement");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCREEN: Bounds = Bounds { x: 0, y: 0, width: 1920, height: 1080 };
  const INSETS: Insets = Insets { top: 28, bottom: 2, left: 0, right: 0 };

  fn coordinator(control_height: i32) -> WindowBoundsCoordinator {
    let video = VirtualWindow::new(Bounds::new(1280, 720, 640, 360), Insets::default());
    let control = VirtualWindow::new(Bounds::new(1280, 720 - control_height, 640, control_height), INSETS);
    WindowBoundsCoordinator::with_base_height(control, video, SCREEN, 360)
  }

  fn move_video_to(c: &WindowBoundsCoordinator, location: Point) {
    c.prepare_move(c.video_bounds().location());
    c.update_move(location);
  }

  #[test]
  fn drag_moves_both_windows() {
    let c = coordinator(200);
    c.prepare_move(Point::new(1300, 750));
    c.update_move(Point::new(1000, 500));

    assert_eq!(c.video_bounds(), Bounds::new(980, 470, 640, 360));
    assert_eq!(c.control_bounds(), Bounds::new(980, 270, 640, 200));
  }

  #[tokio::test(start_paused = true)]
  async fn scroll_resize_is_clamped_and_anchored() {
    let c = coordinator(200);
    let bottom = c.control_bounds().bottom();

    assert!(c.handle_scroll(500.0).await);
    assert_eq!(c.control_bounds().height, 390);
    assert_eq!(c.control_bounds().bottom(), bottom);
    assert!(!c.handle_scroll(10.0).await);

    assert!(c.handle_scroll(-1000.0).await);
    assert_eq!(c.control_bounds().height, 30);
    assert_eq!(c.control_bounds().bottom(), bottom);
    assert!(!c.handle_scroll(-1.0).await);
  }

  #[tokio::test(start_paused = true)]
  async fn full_height_grow_then_shrink() {
    let c = coordinator(INSETS.vertical() + 360);
    let bottom = c.control_bounds().bottom();

    assert!(!c.handle_scroll(1000.0).await);
    assert_eq!(c.control_bounds().height, INSETS.vertical() + 360);
    assert_eq!(c.control_bounds().bottom(), bottom);

    assert!(c.handle_scroll(-1000.0).await);
    assert_eq!(c.control_bounds().height, INSETS.vertical());
    assert_eq!(c.control_bounds().bottom(), bottom);
  }

  #[tokio::test(start_paused = true)]
  async fn base_height_grow_then_shrink_returns_to_base() {
    let c = coordinator(200);
    assert!(c.resize_to_base());
    let base = c.control_bounds().height;
    let bottom = c.control_bounds().bottom();

    assert!(c.handle_scroll(1000.0).await);
    assert_eq!(c.control_bounds().height, base + 360);
    assert_eq!(c.control_bounds().bottom(), bottom);

    assert!(c.handle_scroll(-1000.0).await);
    assert_eq!(c.control_bounds().height, base);
    assert_eq!(c.control_bounds().bottom(), bottom);
  }

  #[tokio::test(start_paused = true)]
  async fn overlapping_scroll_is_dropped_as_handled() {
    let c = coordinator(200);
    let (first, second) = tokio::join!(c.handle_scroll(10.0), c.handle_scroll(10.0));
    assert!(first);
    assert!(second);
    assert_eq!(c.control_bounds().height, 210);

    assert!(c.handle_scroll(10.0).await);
    assert_eq!(c.control_bounds().height, 220);
  }

  #[test]
  fn resize_to_base_then_expanded() {
    let c = coordinator(200);
    let bottom = c.control_bounds().bottom();

    assert!(c.resize_to_base());
    assert_eq!(c.control_bounds().height, INSETS.vertical());
    assert!(!c.resize_to_base());

    assert!(c.resize_to_expanded());
    assert_eq!(c.control_bounds().height, INSETS.vertical() + 360);
    assert_eq!(c.control_bounds().bottom(), bottom);
    assert!(!c.resize_to_expanded());
  }

  #[test]
  fn docking_keeps_control_offset() {
    let c = coordinator(200);
    move_video_to(&c, Point::new(400, 300));
    assert_eq!(c.horizontal_direction(), HorizontalDirection::Left);

    c.move_to_bottom(HorizontalDirection::Right);
    assert_eq!(c.video_bounds(), Bounds::new(1280, 720, 640, 360));
    assert_eq!(c.control_bounds().location(), Point::new(1280, 520));
    assert_eq!(c.horizontal_direction(), HorizontalDirection::Right);

    c.move_to_bottom(!c.horizontal_direction());
    assert_eq!(c.video_bounds().location(), Point::new(0, 720));
    assert_eq!(c.control_bounds().location(), Point::new(0, 520));
  }

  #[test]
  fn horizontal_direction_uses_centred_midpoint() {
    let c = coordinator(200);
    move_video_to(&c, Point::new(640, 0));
    assert_eq!(c.horizontal_direction(), HorizontalDirection::Left);
    move_video_to(&c, Point::new(641, 0));
    assert_eq!(c.horizontal_direction(), HorizontalDirection::Right);
  }

  #[tokio::test(start_paused = true)]
  async fn drag_after_resize_stays_joined() {
    let c = coordinator(200);
    c.handle_scroll(-100.0).await;
    move_video_to(&c, Point::new(100, 600));
    assert_eq!(c.control_bounds().height, 100);
    assert_eq!(c.control_bounds().bottom(), c.video_bounds().y);
  }

  #[test]
  fn rejoin_places_control_above_video() {
    let video = VirtualWindow::new(Bounds::new(500, 600, 640, 360), Insets::default());
    let control = VirtualWindow::new(Bounds::new(0, 0, 640, 250), INSETS);
    let c = WindowBoundsCoordinator::with_base_height(control, video, SCREEN, 360);
    c.rejoin_windows();
    assert_eq!(c.control_bounds(), Bounds::new(500, 350, 640, 250));
  }

  #[test]
  fn unfocusing_cycles_visibility() {
    let c = coordinator(200);
    c.focus_control_pane(false);
    c.with_windows(|control, _| {
      assert!(!control.focusable);
      assert!(control.visible);
      assert_eq!(control.visibility_changes, vec![false, true]);
      assert_eq!(control.raised, 0);
    });

    c.focus_control_pane(true);
    c.with_windows(|control, _| {
      assert!(control.focusable);
      assert_eq!(control.raised, 1);
    });
  }

  #[test]
  fn initial_arrangement_docks_bottom_right() {
    let video = VirtualWindow::new(Bounds::new(10, 10, 100, 100), Insets::default());
    let control = VirtualWindow::new(Bounds::new(10, 10, 100, 100), INSETS);
    let c = WindowBoundsCoordinator::with_base_height(control, video, SCREEN, 360);
    c.arrange_initial(640);

    assert_eq!(c.video_bounds(), Bounds::new(1280, 720, 640, 360));
    assert_eq!(c.control_bounds(), Bounds::new(1280, 720 - 390, 640, 390));
  }
}
