//! Registry of page instances (windows) the worker can control.

use std::sync::Mutex;
use tracing::debug;
use url::Url;

pub type ClientId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
  pub id: ClientId,
  pub url: Url,
  /// Generation tag of the worker controlling this page, if any
  pub controller: Option<String>,
}

#[derive(Default)]
struct Inner {
  next_id: ClientId,
  clients: Vec<Client>,
}

/// Open page instances.
#[derive(Default)]
pub struct Clients {
  inner: Mutex<Inner>,
}

impl Clients {
  pub fn new() -> Self {
    Self::default()
  }

  fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Record a newly opened page.
  pub fn open(&self, url: Url, controller: Option<&str>) -> ClientId {
    let mut inner = self.inner();
    inner.next_id += 1;
    let id = inner.next_id;
    debug!("Client {} opened at {}", id, url);
    inner.clients.push(Client {
      id,
      url,
      controller: controller.map(String::from),
    });
    id
  }

  #[cfg(test)]
  pub fn close(&self, id: ClientId) -> bool {
    let mut inner = self.inner();
    let before = inner.clients.len();
    inner.clients.retain(|c| c.id != id);
    inner.clients.len() != before
  }

  #[cfg(test)]
  pub fn get(&self, id: ClientId) -> Option<Client> {
    self.inner().clients.iter().find(|c| c.id == id).cloned()
  }

  #[cfg(test)]
  pub fn all(&self) -> Vec<Client> {
    self.inner().clients.clone()
  }

  /// Put every open page under `generation`'s control. Returns how many
  /// pages changed controller.
  pub fn claim(&self, generation: &str) -> usize {
    let mut inner = self.inner();
    let mut claimed = 0;
    for client in &mut inner.clients {
      if client.controller.as_deref() != Some(generation) {
        debug!("Claiming client {} at {}", client.id, client.url);
        client.controller = Some(generation.to_string());
        claimed += 1;
      }
    }
    claimed
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(path: &str) -> Url {
    Url::parse("http://localhost").unwrap().join(path).unwrap()
  }

  #[test]
  fn test_claim_takes_over_all_pages() {
    let clients = Clients::new();
    let a = clients.open(url("/"), None);
    let b = clients.open(url("/kontakt/"), Some("eneplus-v0.9.0"));
    let c = clients.open(url("/o-nama/"), Some("eneplus-v1.0.0"));

    assert_eq!(clients.claim("eneplus-v1.0.0"), 2);
    for id in [a, b, c] {
      assert_eq!(
        clients.get(id).unwrap().controller.as_deref(),
        Some("eneplus-v1.0.0")
      );
    }
  }

  #[test]
  fn test_close() {
    let clients = Clients::new();
    let id = clients.open(url("/"), None);
    assert!(clients.close(id));
    assert!(!clients.close(id));
    assert!(clients.all().is_empty());
  }
}
