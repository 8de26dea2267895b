//! Test doubles shared by the worker tests.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use super::Worker;
use crate::cache::SqliteStorage;
use crate::config::Config;
use crate::db::Database;
use crate::http::{Network, Request, Response, ResponseType};

pub const ORIGIN: &str = "https://eneplus.example";

/// Network double answering from a routing table keyed by URL path
/// (same-origin) or full URL (cross-origin).
#[derive(Clone, Default)]
pub struct FakeNetwork {
  routes: Arc<Mutex<HashMap<String, Response>>>,
  offline: Arc<AtomicBool>,
  calls: Arc<Mutex<Vec<(Method, Url)>>>,
}

impl FakeNetwork {
  /// A network that serves every default manifest entry.
  pub fn serving_manifest() -> Self {
    let net = Self::default();
    for path in &Config::default().precache {
      net.respond(path, page(path));
    }
    net
  }

  pub fn respond(&self, route: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(route.to_string(), response);
  }

  pub fn respond_status(&self, route: &str, status: u16) {
    self.respond(
      route,
      Response {
        status,
        ..page(route)
      },
    );
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls(&self) -> Vec<(Method, Url)> {
    self.calls.lock().unwrap().clone()
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self
      .calls
      .lock()
      .unwrap()
      .push((request.method.clone(), request.url.clone()));

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: network unreachable", request.url));
    }

    let routes = self.routes.lock().unwrap();
    let route = if request.url.origin().ascii_serialization() == ORIGIN {
      request.url.path().to_string()
    } else {
      request.url.to_string()
    };

    Ok(routes.get(&route).cloned().unwrap_or_else(|| Response {
      status: 404,
      status_text: "Not Found".to_string(),
      ..page(&route)
    }))
  }
}

/// A basic 200 response whose body names the path.
pub fn page(path: &str) -> Response {
  Response {
    status: 200,
    status_text: "OK".to_string(),
    headers: vec![("content-type".to_string(), "text/html".to_string())],
    body: format!("content of {}", path).into_bytes(),
    response_type: ResponseType::Basic,
    url: Url::parse(ORIGIN).ok().and_then(|o| o.join(path).ok()),
    redirected: false,
  }
}

pub fn test_config() -> Config {
  Config {
    origin: ORIGIN.to_string(),
    ..Config::default()
  }
}

pub fn test_worker(network: FakeNetwork) -> Worker<SqliteStorage, FakeNetwork> {
  Worker::new(
    test_config(),
    SqliteStorage::open_in_memory().unwrap(),
    network,
    Database::open_in_memory().unwrap(),
  )
  .unwrap()
}

/// A worker that has been installed and activated.
pub async fn active_worker(network: FakeNetwork) -> Worker<SqliteStorage, FakeNetwork> {
  let worker = test_worker(network);
  worker.register().await.unwrap();
  worker
}

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}
