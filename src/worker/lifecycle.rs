//! Install and activate handlers.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{debug, error, info};

use super::{Worker, WorkerState};
use crate::cache::{CacheStorage, RequestKey};
use crate::http::{Network, Request};

impl<S: CacheStorage, N: Network> Worker<S, N> {
  /// Precache the static asset manifest into the current generation.
  ///
  /// Every asset is fetched before anything is written, and the writes happen
  /// in a single transaction, so a failed install leaves no partial store
  /// behind.
  pub async fn install(&self) -> Result<()> {
    info!("Installing generation {}", self.version());
    self.set_state(WorkerState::Installing);

    match self.precache().await {
      Ok(count) => {
        info!("Installed successfully ({} assets cached)", count);
        self.set_state(WorkerState::Installed);
        self.skip_waiting();
        Ok(())
      }
      Err(e) => {
        error!("Installation failed: {}", e);
        self.set_state(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<usize> {
    let urls = self
      .config
      .precache
      .iter()
      .map(|path| self.config.resolve(path))
      .collect::<Result<Vec<_>>>()?;

    debug!("Caching {} static files", urls.len());

    let entries = try_join_all(urls.into_iter().map(|url| async move {
      let request = Request::get(url);
      let response = self.network.fetch(&request).await?;
      if !response.is_ok() {
        return Err(eyre!(
          "Request for {} failed with status {}",
          request.url,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((RequestKey::for_request(&request), response))
    }))
    .await?;

    let storage = self.cache.storage();
    storage.open_cache(self.version())?;
    storage.put_all(self.version(), &entries)?;
    Ok(entries.len())
  }

  /// Remove superseded generations and take control of open pages.
  pub async fn activate(&self) -> Result<()> {
    match self.state() {
      WorkerState::Installed => {}
      WorkerState::Activated => {
        debug!("Already active");
        return Ok(());
      }
      other => return Err(eyre!("Cannot activate a worker in state {:?}", other)),
    }

    info!("Activating generation {}", self.version());
    self.set_state(WorkerState::Activating);

    if let Err(e) = self.delete_old_generations() {
      error!("Activation failed: {}", e);
      self.set_state(WorkerState::Installed);
      return Err(e);
    }

    self.set_state(WorkerState::Activated);
    let claimed = self.clients.claim(self.version());
    info!("Activated, controlling {} client(s)", claimed);

    Ok(())
  }

  fn delete_old_generations(&self) -> Result<()> {
    let storage = self.cache.storage();
    for name in storage.cache_names()? {
      if name != self.version() {
        info!("Deleting old cache {}", name);
        storage.delete_cache(&name)?;
      }
    }
    Ok(())
  }

  /// Install, then activate if waiting was skipped.
  pub async fn register(&self) -> Result<()> {
    self.install().await?;
    if self.is_skipping_waiting() {
      self.activate().await?;
    } else {
      info!("Installed, waiting to activate");
    }
    Ok(())
  }

  /// Restart a worker whose generation is already on disk, or register a
  /// fresh one.
  pub async fn start(&self) -> Result<()> {
    if self.resume()? {
      return self.activate().await;
    }

    self.register().await
  }

  /// Mark the worker installed if its generation is already on disk.
  pub fn resume(&self) -> Result<bool> {
    if !self.cache.storage().has_cache(self.version())? {
      return Ok(false);
    }

    debug!("Resuming generation {}", self.version());
    self.set_state(WorkerState::Installed);
    Ok(true)
  }
}
