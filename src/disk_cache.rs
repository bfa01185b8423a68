//! Directory-backed blob cache with least-recently-used eviction by total size.

use lru::LruCache;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::error::Result;

const TEMP_SUFFIX: &str = ".tmp";

struct Index {
  /// Key to blob size in bytes, most recently used last.
  entries: LruCache<String, u64>,
  total: u64,
}

pub struct DiskCache {
  dir: PathBuf,
  max_bytes: u64,
  index: Mutex<Index>,
}

impl DiskCache {
  /// Opens (creating if needed) a cache in `dir`. Existing blobs are indexed
  /// oldest-modified first and trimmed to `max_bytes`.
  pub async fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
    let dir = dir.into();
    tokio::fs::create_dir_all(&dir).await?;

    let mut found = Vec::new();
    let mut read_dir = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
      let name = entry.file_name().to_string_lossy().into_owned();
      if name.ends_with(TEMP_SUFFIX) {
        let _ = tokio::fs::remove_file(entry.path()).await;
        continue;
      }
      let Some(key) = decode_key(&name) else { continue };
      let metadata = entry.metadata().await?;
      if metadata.is_file() {
        found.push((metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH), key, metadata.len()));
      }
    }
    found.sort();

    let mut index = Index { entries: LruCache::unbounded(), total: 0 };
    for (_, key, size) in found {
      index.total += size;
      index.entries.put(key, size);
    }
    let cache = Self { dir, max_bytes, index: Mutex::new(index) };
    let evicted = cache.evict_over_capacity();
    cache.remove_files(evicted).await;
    info!(dir = %cache.dir.display(), entries = cache.len(), bytes = cache.total_bytes(), "disk_cache: opened");
    Ok(cache)
  }

  fn index(&self) -> MutexGuard<'_, Index> {
    self.index.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn len(&self) -> usize {
    self.index().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn total_bytes(&self) -> u64 {
    self.index().total
  }

  pub fn contains(&self, key: &str) -> bool {
    self.index().entries.contains(key)
  }

  fn path_for(&self, key: &str) -> PathBuf {
    self.dir.join(encode_key(key))
  }

  /// Reads a blob and marks it most recently used.
  pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    if self.index().entries.get(key).is_none() {
      return Ok(None);
    }
    match tokio::fs::read(self.path_for(key)).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == ErrorKind::NotFound => {
        warn!(key, "disk_cache: indexed blob vanished");
        let mut index = self.index();
        if let Some(size) = index.entries.pop(key) {
          index.total -= size;
        }
        Ok(None)
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Writes a blob, replacing any previous one, then evicts least recently
  /// used blobs until the total fits. A blob larger than the whole cache is not stored.
  pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
    let size = bytes.len() as u64;
    if size > self.max_bytes {
      warn!(key, size, max = self.max_bytes, "disk_cache: blob exceeds capacity, not cached");
      self.remove(key).await?;
      return Ok(());
    }

    let path = self.path_for(key);
    let temp = path.with_extension(&TEMP_SUFFIX[1..]);
    tokio::fs::write(&temp, bytes).await?;
    tokio::fs::rename(&temp, &path).await?;

    let evicted = {
      let mut index = self.index();
      if let Some(old) = index.entries.put(key.to_owned(), size) {
        index.total -= old;
      }
      index.total += size;
      drop(index);
      self.evict_over_capacity()
    };
    self.remove_files(evicted).await;
    debug!(key, size, total = self.total_bytes(), "disk_cache: stored");
    Ok(())
  }

  /// Returns the cached blob, or stores and returns the one produced by `make`.
  pub async fn get_or_put(&self, key: &str, make: impl FnOnce() -> Result<Vec<u8>>) -> Result<Vec<u8>> {
    if let Some(bytes) = self.get(key).await? {
      return Ok(bytes);
    }
    let bytes = make()?;
    self.put(key, &bytes).await?;
    Ok(bytes)
  }

  pub async fn remove(&self, key: &str) -> Result<()> {
    let removed = {
      let mut index = self.index();
      let removed = index.entries.pop(key);
      if let Some(size) = removed {
        index.total -= size;
      }
      removed.is_some()
    };
    if removed {
      self.remove_files(vec![key.to_owned()]).await;
    }
    Ok(())
  }

  fn evict_over_capacity(&self) -> Vec<String> {
    let mut index = self.index();
    let mut evicted = Vec::new();
    while index.total > self.max_bytes {
      let Some((key, size)) = index.entries.pop_lru() else { break };
      index.total -= size;
      evicted.push(key);
    }
    evicted
  }

  async fn remove_files(&self, keys: Vec<String>) {
    for key in keys {
      match tokio::fs::remove_file(self.path_for(&key)).await {
        Ok(()) => debug!(key, "disk_cache: evicted"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(key, err = %e, "disk_cache: failed to remove blob"),
      }
    }
  }
}

/// Hex file name for a key, so arbitrary keys stay valid file names.
fn encode_key(key: &str) -> String {
  key.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_key(name: &str) -> Option<String> {
  if name.len() % 2 != 0 {
    return None;
  }
  let bytes = (0..name.len())
    .step_by(2)
    .map(|i| u8::from_str_radix(name.get(i..i + 2)?, 16).ok())
    .collect::<Option<Vec<u8>>>()?;
  String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn key_names_round_trip() {
    assert_eq!(encode_key("subscription"), "737562736372697074696f6e");
    assert_eq!(decode_key(&encode_key("a/b c")).as_deref(), Some("a/b c"));
    assert_eq!(decode_key("zz"), None);
    assert_eq!(decode_key("abc"), None);
  }

  #[tokio::test]
  async fn put_then_get() {
    let dir = TempDir::new().unwrap();
    let cache = DiskCache::open(dir.path(), 1024).await.unwrap();
    assert_eq!(cache.get("feed").await.unwrap(), None);

    cache.put("feed", b"hello").await.unwrap();
    assert_eq!(cache.get("feed").await.unwrap().as_deref(), Some(&b"hello"[..]));

    cache.put("feed", b"hi").await.unwrap();
    assert_eq!(cache.total_bytes(), 2);
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test]
  async fn evicts_least_recently_used() {
    let dir = TempDir::new().unwrap();
    let cache = DiskCache::open(dir.path(), 10).await.unwrap();
    cache.put("a", &[0; 4]).await.unwrap();
    cache.put("b", &[0; 4]).await.unwrap();
    cache.get("a").await.unwrap();
    cache.put("c", &[0; 4]).await.unwrap();

    assert!(cache.contains("a"));
    assert!(!cache.contains("b"));
    assert!(cache.contains("c"));
    assert_eq!(cache.total_bytes(), 8);
    assert!(!dir.path().join(encode_key("b")).exists());
  }

  #[tokio::test]
  async fn oversized_blob_is_not_stored() {
    let dir = TempDir::new().unwrap();
    let cache = DiskCache::open(dir.path(), 4).await.unwrap();
    cache.put("big", &[1; 5]).await.unwrap();
    assert!(cache.is_empty());
    assert_eq!(cache.get("big").await.unwrap(), None);
  }

  #[tokio::test]
  async fn get_or_put_only_makes_once() {
    let dir = TempDir::new().unwrap();
    let cache = DiskCache::open(dir.path(), 1024).await.unwrap();
    let first = cache.get_or_put("k", || Ok(b"made".to_vec())).await.unwrap();
    let second = cache.get_or_put("k", || panic!("already cached")).await.unwrap();
    assert_eq!(first, second);
  }

  #[tokio::test]
  async fn reopen_rebuilds_index() {
    let dir = TempDir::new().unwrap();
    {
      let cache = DiskCache::open(dir.path(), 1024).await.unwrap();
      cache.put("one", b"1").await.unwrap();
      cache.put("two", b"22").await.unwrap();
    }
    std::fs::write(dir.path().join("stray.tmp"), b"partial").unwrap();
    std::fs::write(dir.path().join("not-hex"), b"ignored").unwrap();

    let cache = DiskCache::open(dir.path(), 1024).await.unwrap();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.total_bytes(), 3);
    assert_eq!(cache.get("two").await.unwrap().as_deref(), Some(&b"22"[..]));
    assert!(!dir.path().join("stray.tmp").exists());
  }

  #[tokio::test]
  async fn reopen_trims_to_smaller_capacity() {
    let dir = TempDir::new().unwrap();
    {
      let cache = DiskCache::open(dir.path(), 1024).await.unwrap();
      cache.put("one", &[0; 6]).await.unwrap();
      cache.put("two", &[0; 6]).await.unwrap();
    }
    let cache = DiskCache::open(dir.path(), 8).await.unwrap();
    assert_eq!(cache.len(), 1);
    assert!(cache.total_bytes() <= 8);
  }
}
