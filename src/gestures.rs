//! Pointer gestures on the video window, routed between list scrolling and
//! window geometry.

use tracing::debug;

use crate::bounds::{Point, WindowBoundsCoordinator, WindowSurface};
use crate::controller::VideoListController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
  Primary,
  Middle,
  Secondary,
}

/// What a gesture ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
  ScrolledList,
  ResizedWindow,
  CollapsedToBase,
  Docked,
  Moved,
  /// Not consumed; the caller may treat it as a plain click on the video.
  Ignored,
}

/// Tracks press/drag/click sequences. A drag suppresses the click that ends it.
#[derive(Debug, Default)]
pub struct GestureRouter {
  dragged: bool,
}

impl GestureRouter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Wheel over the video window.
  ///
  /// Scrolling down (`delta_y < 0`) scrolls the list while it can, then
  /// shrinks the control window and reattaches it to the video. Scrolling up
  /// grows the control window until it reaches its limit, then scrolls the list.
  pub async fn scroll<W: WindowSurface>(
    &self,
    list: &mut VideoListController,
    bounds: &WindowBoundsCoordinator<W>,
    delta_y: f64,
  ) -> GestureOutcome {
    if delta_y < 0.0 {
      if list.scroll_list(delta_y) {
        return GestureOutcome::ScrolledList;
      }
      bounds.handle_scroll(delta_y).await;
      bounds.rejoin_windows();
      GestureOutcome::ResizedWindow
    } else if delta_y > 0.0 {
      if bounds.handle_scroll(delta_y).await {
        return GestureOutcome::ResizedWindow;
      }
      list.scroll_list(delta_y);
      GestureOutcome::ScrolledList
    } else {
      GestureOutcome::Ignored
    }
  }

  pub fn press<W: WindowSurface>(&mut self, bounds: &WindowBoundsCoordinator<W>, at: Point) {
    self.dragged = false;
    bounds.prepare_move(at);
  }

  pub fn drag<W: WindowSurface>(&mut self, bounds: &WindowBoundsCoordinator<W>, at: Point) -> GestureOutcome {
    self.dragged = true;
    bounds.update_move(at);
    GestureOutcome::Moved
  }

  /// Middle click collapses the control window, or docks the pair to the
  /// other bottom corner when it is already collapsed.
  pub fn click<W: WindowSurface>(&mut self, bounds: &WindowBoundsCoordinator<W>, button: PointerButton) -> GestureOutcome {
    if std::mem::take(&mut self.dragged) {
      debug!(?button, "gestures: click after drag suppressed");
      return GestureOutcome::Moved;
    }
    match button {
      PointerButton::Middle if bounds.resize_to_base() => GestureOutcome::CollapsedToBase,
      PointerButton::Middle => {
        bounds.move_to_bottom(!bounds.horizontal_direction());
        GestureOutcome::Docked
      }
      PointerButton::Primary | PointerButton::Secondary => GestureOutcome::Ignored,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bounds::{Bounds, HorizontalDirection, Insets, VirtualWindow};
  use crate::generator::tests::ScriptedSource;
  use crate::generator::{GeneratorTab, ListGenerator};
  use crate::tab::TabIdentity;

  const SCREEN: Bounds = Bounds { x: 0, y: 0, width: 1920, height: 1080 };

  fn coordinator(control_height: i32) -> WindowBoundsCoordinator {
    let video = VirtualWindow::new(Bounds::new(1280, 720, 640, 360), Insets::default());
    let control = VirtualWindow::new(Bounds::new(1280, 720 - control_height, 640, control_height), Insets::default());
    WindowBoundsCoordinator::with_base_height(control, video, SCREEN, 360)
  }

  async fn loaded_list() -> VideoListController {
    let mut list = VideoListController::new(360.0);
    list.with_cleared_list(async {
      Ok(GeneratorTab::new(TabIdentity::search("ambient"), ListGenerator::from_source(ScriptedSource::sized(&[10]))))
    });
    list.settle().await;
    list
  }

  #[tokio::test(start_paused = true)]
  async fn wheel_up_grows_window_before_scrolling_list() {
    let bounds = coordinator(300);
    let mut list = loaded_list().await;
    let router = GestureRouter::new();

    assert_eq!(router.scroll(&mut list, &bounds, 50.0).await, GestureOutcome::ResizedWindow);
    assert_eq!(bounds.control_bounds().height, 350);
    assert_eq!(list.scroll().value, 0.0);

    router.scroll(&mut list, &bounds, 50.0).await;
    assert_eq!(bounds.control_bounds().height, 360);
    assert_eq!(router.scroll(&mut list, &bounds, 50.0).await, GestureOutcome::ScrolledList);
    assert_eq!(list.scroll().value, 50.0);
  }

  #[tokio::test(start_paused = true)]
  async fn wheel_down_scrolls_list_before_shrinking_window() {
    let bounds = coordinator(360);
    let mut list = loaded_list().await;
    let router = GestureRouter::new();
    list.scroll_list(30.0);

    assert_eq!(router.scroll(&mut list, &bounds, -50.0).await, GestureOutcome::ScrolledList);
    assert_eq!(list.scroll().value, 0.0);
    assert_eq!(bounds.control_bounds().height, 360);

    assert_eq!(router.scroll(&mut list, &bounds, -50.0).await, GestureOutcome::ResizedWindow);
    assert_eq!(bounds.control_bounds().height, 310);
    assert_eq!(bounds.control_bounds().bottom(), bounds.video_bounds().y);
  }

  #[test]
  fn middle_click_collapses_then_docks_opposite() {
    let bounds = coordinator(200);
    let mut router = GestureRouter::new();

    assert_eq!(router.click(&bounds, PointerButton::Middle), GestureOutcome::CollapsedToBase);
    assert_eq!(bounds.control_bounds().height, 0);
    assert_eq!(bounds.horizontal_direction(), HorizontalDirection::Right);

    assert_eq!(router.click(&bounds, PointerButton::Middle), GestureOutcome::Docked);
    assert_eq!(bounds.video_bounds().location(), Point::new(0, 720));
    assert_eq!(router.click(&bounds, PointerButton::Primary), GestureOutcome::Ignored);
  }

  #[test]
  fn drag_suppresses_following_click() {
    let bounds = coordinator(200);
    let mut router = GestureRouter::new();

    router.press(&bounds, Point::new(1300, 800));
    assert_eq!(router.drag(&bounds, Point::new(1200, 700)), GestureOutcome::Moved);
    assert_eq!(bounds.video_bounds().location(), Point::new(1180, 620));
    assert_eq!(router.click(&bounds, PointerButton::Middle), GestureOutcome::Moved);
    assert_eq!(bounds.control_bounds().height, 200);

    router.press(&bounds, Point::new(1200, 700));
    assert_eq!(router.click(&bounds, PointerButton::Middle), GestureOutcome::CollapsedToBase);
  }
}
