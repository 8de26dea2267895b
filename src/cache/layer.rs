//! Cache layer that orchestrates cache-first lookups with network fetching.

use color_eyre::Result;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

use super::storage::{CacheStorage, CachedResponse};
use super::traits::{CacheResult, RequestKey};
use crate::http::{Request, Response};

/// Cache layer bound to one cache generation.
///
/// Lookups always hit the store before the network. Write-backs after a
/// network fetch run as background tasks and never delay the response.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  cache_name: Arc<str>,
  /// Write-backs still in flight
  pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer over `storage` for the generation `cache_name`.
  pub fn new(storage: S, cache_name: &str) -> Self {
    Self {
      storage: Arc::new(storage),
      cache_name: Arc::from(cache_name),
      pending: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// The current generation tag.
  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  /// Look up a plain GET for `url`. Storage errors count as a miss.
  pub fn lookup_url(&self, url: &Url) -> Option<CachedResponse> {
    self.lookup_key(&RequestKey::new("GET", url))
  }

  fn lookup_key(&self, key: &RequestKey) -> Option<CachedResponse> {
    match self.storage.match_request(&self.cache_name, key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!("Cache lookup for {} failed: {}", key.url, e);
        None
      }
    }
  }

  /// Resolve a request cache-first.
  ///
  /// 1. Check the current store - on a hit, return the stored response
  /// 2. Otherwise fetch from network
  /// 3. Store cacheable responses in the background
  ///
  /// Network rejections are returned as errors for the caller to handle.
  pub async fn fetch_cache_first<F, Fut>(
    &self,
    request: &Request,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    let key = RequestKey::for_request(request);

    if let Some(cached) = self.lookup_key(&key) {
      debug!("Serving {} from cache", key.url);
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    let response = fetcher().await?;

    if response.is_cacheable() {
      self.store_in_background(key, response.clone());
    } else {
      debug!(
        "Not caching {} (status {}, type {:?})",
        key.url, response.status, response.response_type
      );
    }

    Ok(CacheResult::from_network(response))
  }

  /// Spawn a write-back of `response` under `key`.
  fn store_in_background(&self, key: RequestKey, response: Response) {
    let storage = Arc::clone(&self.storage);
    let cache_name = Arc::clone(&self.cache_name);

    let handle = tokio::spawn(async move {
      match storage.put(&cache_name, &key, &response) {
        Ok(()) => debug!("Cached {}", key.url),
        Err(e) => warn!("Failed to cache {}: {}", key.url, e),
      }
    });

    let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    pending.retain(|h| !h.is_finished());
    pending.push(handle);
  }

  /// Wait for every write-back started so far.
  pub async fn wait_until_idle(&self) {
    loop {
      let handles = {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *pending)
      };
      if handles.is_empty() {
        break;
      }

      for handle in handles {
        if let Err(e) = handle.await {
          error!("Unhandled rejection in cache write-back: {}", e);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use crate::http::ResponseType;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn request(path: &str) -> Request {
    Request::get(Url::parse(&format!("http://localhost{}", path)).unwrap())
  }

  fn response(status: u16, response_type: ResponseType) -> Response {
    Response {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: b"body".to_vec(),
      response_type,
      url: None,
      redirected: false,
    }
  }

  fn layer() -> CacheLayer<SqliteStorage> {
    CacheLayer::new(SqliteStorage::open_in_memory().unwrap(), "test-v1")
  }

  #[tokio::test]
  async fn test_network_result_is_cached_for_next_request() {
    let layer = layer();
    let calls = AtomicUsize::new(0);
    let req = request("/assets/images/logo.png");

    let first = layer
      .fetch_cache_first(&req, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, color_eyre::Report>(response(200, ResponseType::Basic))
      })
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);
    layer.wait_until_idle().await;

    let second = layer
      .fetch_cache_first(&req, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, color_eyre::Report>(response(200, ResponseType::Basic))
      })
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data.text(), "body");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_uncacheable_responses_are_not_stored() {
    let layer = layer();

    for (path, resp) in [
      ("/missing", response(404, ResponseType::Basic)),
      ("/cors", response(200, ResponseType::Cors)),
      ("/opaque", response(0, ResponseType::Opaque)),
    ] {
      let result = layer
        .fetch_cache_first(&request(path), || async move { Ok::<_, color_eyre::Report>(resp) })
        .await
        .unwrap();
      assert_eq!(result.source, CacheSource::Network);
    }
    layer.wait_until_idle().await;

    assert_eq!(layer.storage().entry_count("test-v1").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_network_rejection_propagates() {
    let layer = layer();
    let result = layer
      .fetch_cache_first(&request("/"), || async { Err::<Response, _>(eyre!("offline")) })
      .await;
    assert!(result.is_err());
  }
}
