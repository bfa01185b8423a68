use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// External video player process, one at a time.
pub struct Player {
  command: String,
  current: Option<Child>,
  locator: Option<String>,
}

impl Player {
  pub fn new(command: impl Into<String>) -> Self {
    Self { command: command.into(), current: None, locator: None }
  }

  pub fn is_playing(&self) -> bool {
    self.current.is_some()
  }

  pub fn locator(&self) -> Option<&str> {
    self.locator.as_deref()
  }

  fn is_mpv(&self) -> bool {
    Path::new(&self.command).file_stem().is_some_and(|s| s == "mpv")
  }

  /// Replaces whatever is playing with `locator`.
  pub async fn play(&mut self, locator: &str) -> Result<()> {
    self.stop().await.context("Failed to stop previous playback")?;

    let mut cmd = Command::new(&self.command);
    if self.is_mpv() {
      cmd.args(["--force-window=immediate", "--keep-open=no", "--title=piptube"]);
    }
    cmd.arg(locator);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    // Piped but never drained stderr would fill up and block the player.
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("{} not found. Install it with: brew install mpv (macOS) or apt install mpv (Linux)", self.command)
      } else {
        anyhow!(e).context(format!("Failed to spawn {}", self.command))
      }
    })?;

    info!(player = %self.command, locator, "player: started");
    self.current = Some(child);
    self.locator = Some(locator.to_string());
    Ok(())
  }

  /// Non-blocking check for the end of playback. Returns true once, when the player has exited.
  pub fn poll_finished(&mut self) -> bool {
    let Some(child) = self.current.as_mut() else { return false };
    match child.try_wait() {
      Ok(Some(status)) => {
        self.finish(status);
        true
      }
      Ok(None) => false,
      Err(e) => {
        warn!(err = %e, "player: failed to query process");
        false
      }
    }
  }

  /// Waits until the player exits on its own.
  pub async fn wait(&mut self) -> Result<()> {
    let Some(child) = self.current.as_mut() else { return Ok(()) };
    let status = child.wait().await.context("Failed to wait for player")?;
    self.finish(status);
    Ok(())
  }

  fn finish(&mut self, status: ExitStatus) {
    info!(%status, locator = ?self.locator, "player: finished");
    self.current = None;
  }

  pub async fn stop(&mut self) -> Result<()> {
    if let Some(mut child) = self.current.take() {
      child.kill().await.context("Failed to kill player process")?;
      let _ = child.wait().await;
    }
    self.locator = None;
    Ok(())
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  #[tokio::test]
  async fn reports_finish_once() {
    let mut player = Player::new("true");
    player.play("https://www.youtube.com/watch?v=abc").await.unwrap();
    assert!(player.is_playing());
    assert_eq!(player.locator(), Some("https://www.youtube.com/watch?v=abc"));

    player.wait().await.unwrap();
    assert!(!player.is_playing());
    assert!(!player.poll_finished());
  }

  #[tokio::test]
  async fn replaces_running_playback() {
    let mut player = Player::new("sleep");
    player.play("30").await.unwrap();
    player.play("31").await.unwrap();
    assert_eq!(player.locator(), Some("31"));
    player.stop().await.unwrap();
    assert!(!player.is_playing());
    assert_eq!(player.locator(), None);
  }

  #[tokio::test]
  async fn missing_binary_is_reported() {
    let mut player = Player::new("definitely-not-a-player-binary");
    let err = player.play("x").await.unwrap_err();
    assert!(err.to_string().contains("not found"));
  }

  #[test]
  fn detects_mpv() {
    assert!(Player::new("/usr/local/bin/mpv").is_mpv());
    assert!(!Player::new("vlc").is_mpv());
  }
}
