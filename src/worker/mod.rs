//! The offline worker: lifecycle, fetch interception and page messaging.
//!
//! A `Worker` owns one cache generation. It is installed (precache), then
//! activated (old generations removed, pages claimed), and from then on
//! answers fetches for its own origin cache-first.

pub mod clients;
mod fetch;
mod lifecycle;
pub mod message;
pub mod push;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::error;
use url::Url;

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::Config;
use crate::db::Database;
use crate::http::Network;

pub use clients::Clients;
pub use fetch::FetchOutcome;

/// Where the worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  /// Installed and waiting to activate
  Installed,
  Activating,
  Activated,
  /// Install failed; this worker will never control pages
  Redundant,
}

pub struct Worker<S: CacheStorage, N: Network> {
  config: Config,
  origin: Url,
  cache: CacheLayer<S>,
  network: N,
  queue: Database,
  clients: Clients,
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
}

impl<S: CacheStorage, N: Network> Worker<S, N> {
  pub fn new(config: Config, storage: S, network: N, queue: Database) -> Result<Self> {
    let origin = config.origin_url()?;
    let cache = CacheLayer::new(storage, &config.cache_name);

    Ok(Self {
      config,
      origin,
      cache,
      network,
      queue,
      clients: Clients::new(),
      state: Mutex::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
    })
  }

  /// The current cache generation tag.
  pub fn version(&self) -> &str {
    self.cache.cache_name()
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  #[cfg(test)]
  pub fn clients(&self) -> &Clients {
    &self.clients
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn network(&self) -> &N {
    &self.network
  }

  /// Ask to activate as soon as installation finishes, without waiting
  /// for pages controlled by an older worker to close.
  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  pub fn is_skipping_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Wait for background work (cache write-backs) to settle.
  pub async fn wait_until_idle(&self) {
    self.cache.wait_until_idle().await;
  }

  /// Global error hook. Logged only.
  pub fn report_error(&self, err: &color_eyre::Report) {
    error!("Worker error occurred: {:?}", err);
  }

  /// Hook for failed background tasks. Logged only.
  pub fn report_unhandled_rejection(&self, reason: &str) {
    error!("Unhandled rejection: {}", reason);
  }
}
