//! Subscription import from other clients' export files.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::subscription::ChannelIdentifier;
use crate::transport::Downloader;

/// Parses an exported subscription list into channel identifiers.
pub trait ImportService: Send + Sync {
  fn import_subscription(&self, input: &[u8]) -> Result<Vec<ChannelIdentifier>>;
}

/// NewPipe's `subscriptions.json`: `{"subscriptions": [{"service_id": 0, "url": "..."}]}`.
/// Other fields are ignored.
pub struct NewPipeImportService;

#[derive(Deserialize)]
struct NewPipeExport {
  subscriptions: Vec<ChannelIdentifier>,
}

impl ImportService for NewPipeImportService {
  fn import_subscription(&self, input: &[u8]) -> Result<Vec<ChannelIdentifier>> {
    let export: NewPipeExport = serde_json::from_slice(input)?;
    Ok(export.subscriptions)
  }
}

/// Reads an export from a local path or, for `http(s)://` locations, through the downloader.
pub async fn read_import_source(location: &str, downloader: &dyn Downloader) -> Result<Vec<u8>> {
  if location.starts_with("http://") || location.starts_with("https://") {
    info!(url = location, "import: downloading export");
    return Ok(downloader.get(location).await?);
  }
  let path = Path::new(location);
  if !path.is_file() {
    return Err(Error::Storage(std::io::Error::new(
      std::io::ErrorKind::NotFound,
      format!("import file not found: {}", path.display()),
    )));
  }
  Ok(tokio::fs::read(path).await?)
}
