//! Fetch interception: cache-first with network fallback.

use reqwest::Method;
use tracing::{debug, info};

use super::{Worker, WorkerState};
use crate::cache::{CacheResult, CacheStorage};
use crate::http::{Network, Request, Response};

/// What the worker decided to do with a request.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not handled; the request goes to the network untouched
  PassThrough,
  /// Answered by the worker
  Respond(CacheResult<Response>),
}

impl FetchOutcome {
  #[cfg(test)]
  pub fn response(&self) -> Option<&Response> {
    match self {
      Self::PassThrough => None,
      Self::Respond(result) => Some(&result.data),
    }
  }
}

impl<S: CacheStorage, N: Network> Worker<S, N> {
  /// Whether this worker answers `request` at all.
  fn intercepts(&self, request: &Request) -> bool {
    if self.state() != WorkerState::Activated {
      debug!("Not controlling yet, passing {} through", request.url);
      return false;
    }
    if request.method != Method::GET {
      return false;
    }
    request.url.origin() == self.origin.origin()
  }

  /// Resolve a request from a controlled page.
  ///
  /// Never fails: when neither cache nor network can answer, navigations
  /// get the offline document and everything else a synthesized 503.
  pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
    if !self.intercepts(request) {
      return FetchOutcome::PassThrough;
    }

    let network = &self.network;
    match self
      .cache
      .fetch_cache_first(request, || network.fetch(request))
      .await
    {
      Ok(result) => FetchOutcome::Respond(result),
      Err(e) => {
        info!("Network failed for {}: {}", request.url, e);
        FetchOutcome::Respond(self.offline_response(request))
      }
    }
  }

  fn offline_response(&self, request: &Request) -> CacheResult<Response> {
    if request.is_navigation() {
      match self.config.resolve(&self.config.offline_url) {
        Ok(url) => {
          if let Some(cached) = self.cache.lookup_url(&url) {
            return CacheResult::offline(cached.response, cached.cached_at);
          }
          info!("Offline document {} is not cached", url);
        }
        Err(e) => info!("Offline document URL is invalid: {}", e),
      }
    }

    CacheResult::synthetic(Response::offline())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, RequestKey};
  use crate::http::ResponseType;
  use crate::worker::testing::{active_worker, page, test_worker, url, FakeNetwork};
  use url::Url;

  #[tokio::test]
  async fn test_manifest_entries_served_from_cache() {
    let network = FakeNetwork::serving_manifest();
    let worker = active_worker(network.clone()).await;
    let calls = network.call_count();

    let outcome = worker.handle_fetch(&Request::navigate(url("/o-nama/"))).await;

    match outcome {
      FetchOutcome::Respond(result) => {
        assert_eq!(result.source, CacheSource::Cache);
        assert_eq!(result.data.text(), "content of /o-nama/");
      }
      FetchOutcome::PassThrough => panic!("expected a response"),
    }
    assert_eq!(network.call_count(), calls);
  }

  #[tokio::test]
  async fn test_network_success_is_cached_and_reused() {
    let network = FakeNetwork::serving_manifest();
    network.respond("/assets/images/team.jpg", page("/assets/images/team.jpg"));
    let worker = active_worker(network.clone()).await;
    let request = Request::get(url("/assets/images/team.jpg"));

    let first = worker.handle_fetch(&request).await;
    assert!(matches!(
      &first,
      FetchOutcome::Respond(r) if r.source == CacheSource::Network
    ));
    worker.wait_until_idle().await;
    let calls = network.call_count();

    let second = worker.handle_fetch(&request).await;
    assert!(matches!(
      &second,
      FetchOutcome::Respond(r) if r.source == CacheSource::Cache
    ));
    assert_eq!(second.response(), first.response());
    assert_eq!(network.call_count(), calls);
  }

  #[tokio::test]
  async fn test_error_and_redirect_responses_not_cached() {
    let network = FakeNetwork::serving_manifest();
    network.respond_status("/broken", 500);
    network.respond(
      "/old-page",
      Response {
        redirected: true,
        ..page("/new-page")
      },
    );
    let worker = active_worker(network.clone()).await;
    let before = worker.cache().storage().entry_count(worker.version()).unwrap();

    for path in ["/broken", "/old-page", "/does-not-exist"] {
      let outcome = worker.handle_fetch(&Request::get(url(path))).await;
      assert!(outcome.response().is_some());
    }
    worker.wait_until_idle().await;

    assert_eq!(
      worker.cache().storage().entry_count(worker.version()).unwrap(),
      before
    );
  }

  #[tokio::test]
  async fn test_offline_navigation_gets_offline_document() {
    let network = FakeNetwork::serving_manifest();
    let worker = active_worker(network.clone()).await;
    network.set_offline(true);

    let outcome = worker
      .handle_fetch(&Request::navigate(url("/blog/novi-projekt/")))
      .await;

    match outcome {
      FetchOutcome::Respond(result) => {
        assert_eq!(result.source, CacheSource::Offline);
        assert_eq!(result.data.text(), "content of /offline.html");
      }
      FetchOutcome::PassThrough => panic!("expected a response"),
    }
  }

  #[tokio::test]
  async fn test_offline_subresource_gets_503() {
    let network = FakeNetwork::serving_manifest();
    let worker = active_worker(network.clone()).await;
    network.set_offline(true);

    let outcome = worker
      .handle_fetch(&Request::get(url("/assets/images/team.jpg")))
      .await;

    let resp = outcome.response().expect("synthesized response");
    assert_eq!(resp.status, 503);
    assert_eq!(resp.header("Content-Type"), Some("text/plain"));
    assert_eq!(resp.response_type, ResponseType::Default);
  }

  #[tokio::test]
  async fn test_offline_navigation_without_offline_document_gets_503() {
    let network = FakeNetwork::serving_manifest();
    let worker = active_worker(network.clone()).await;
    worker.cache().storage().delete_cache(worker.version()).unwrap();
    network.set_offline(true);

    let outcome = worker.handle_fetch(&Request::navigate(url("/"))).await;
    assert_eq!(outcome.response().map(|r| r.status), Some(503));
  }

  #[tokio::test]
  async fn test_cross_origin_passes_through_and_is_never_cached() {
    let network = FakeNetwork::serving_manifest();
    let font = "https://fonts.example/inter.woff2";
    network.respond(
      font,
      Response {
        response_type: ResponseType::Cors,
        ..page(font)
      },
    );
    let worker = active_worker(network.clone()).await;
    let calls = network.call_count();

    let request = Request::get(Url::parse(font).unwrap());
    assert!(matches!(
      worker.handle_fetch(&request).await,
      FetchOutcome::PassThrough
    ));
    worker.wait_until_idle().await;

    assert_eq!(network.call_count(), calls);
    assert!(worker
      .cache()
      .storage()
      .match_request(worker.version(), &RequestKey::for_request(&request))
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_non_get_passes_through() {
    let worker = active_worker(FakeNetwork::serving_manifest()).await;
    let request = Request::get(url("/kontakt/")).with_method(Method::POST);
    assert!(matches!(
      worker.handle_fetch(&request).await,
      FetchOutcome::PassThrough
    ));
  }

  #[tokio::test]
  async fn test_not_intercepting_before_activation() {
    let worker = test_worker(FakeNetwork::serving_manifest());
    worker.install().await.unwrap();
    assert!(matches!(
      worker.handle_fetch(&Request::get(url("/"))).await,
      FetchOutcome::PassThrough
    ));
  }
}
