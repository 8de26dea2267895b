//! Push notifications and notification clicks.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::{Worker, WorkerState};
use crate::cache::CacheStorage;
use crate::http::Network;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

impl<S: CacheStorage, N: Network> Worker<S, N> {
  /// Build the notification shown for a push message.
  pub fn handle_push(&self, data: Option<&str>) -> Notification {
    info!("Push message received");

    let push = &self.config.push;
    Notification {
      title: self.config.brand.clone(),
      body: data
        .map(String::from)
        .unwrap_or_else(|| push.default_body.clone()),
      icon: push.icon.clone(),
      badge: push.badge.clone(),
      vibrate: vec![200, 100, 200],
      data: NotificationData {
        url: Some("/".to_string()),
      },
      actions: vec![
        NotificationAction {
          action: "open".to_string(),
          title: "Otvori".to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Zatvori".to_string(),
        },
      ],
    }
  }

  /// Handle a click on `notification`. The "open" action opens a window at
  /// the notification's URL (or the site root) and returns that URL.
  pub fn handle_notification_click(
    &self,
    notification: &Notification,
    action: Option<&str>,
  ) -> Option<Url> {
    info!("Notification clicked ({})", action.unwrap_or("default"));

    if action != Some("open") {
      return None;
    }

    let target = notification.data.url.as_deref().unwrap_or("/");
    let url = match self.origin.join(target) {
      Ok(url) => url,
      Err(e) => {
        warn!("Notification URL {} is invalid: {}", target, e);
        self.origin.clone()
      }
    };

    let controller = (self.state() == WorkerState::Activated).then(|| self.version());
    self.clients.open(url.clone(), controller);
    Some(url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::worker::testing::{active_worker, test_worker, FakeNetwork, ORIGIN};

  #[test]
  fn test_push_uses_brand_and_default_body() {
    let worker = test_worker(FakeNetwork::default());

    let n = worker.handle_push(None);
    assert_eq!(n.title, "ENEPLUS");
    assert_eq!(n.body, "Nova poruka od ENEPLUS");
    let actions: Vec<&str> = n.actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec!["open", "close"]);

    assert_eq!(worker.handle_push(Some("Nova akcija")).body, "Nova akcija");
  }

  #[tokio::test]
  async fn test_open_action_opens_controlled_window() {
    let worker = active_worker(FakeNetwork::serving_manifest()).await;
    let mut n = worker.handle_push(None);
    n.data.url = Some("/nase-usluge/".to_string());

    let url = worker.handle_notification_click(&n, Some("open")).unwrap();

    assert_eq!(url.as_str(), format!("{}/nase-usluge/", ORIGIN));
    let clients = worker.clients().all();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].controller.as_deref(), Some(worker.version()));
  }

  #[test]
  fn test_open_without_url_goes_to_root() {
    let worker = test_worker(FakeNetwork::default());
    let mut n = worker.handle_push(None);
    n.data.url = None;

    let url = worker.handle_notification_click(&n, Some("open")).unwrap();
    assert_eq!(url.as_str(), format!("{}/", ORIGIN));
  }

  #[test]
  fn test_close_action_opens_nothing() {
    let worker = test_worker(FakeNetwork::default());
    let n = worker.handle_push(None);

    assert!(worker.handle_notification_click(&n, Some("close")).is_none());
    assert!(worker.handle_notification_click(&n, None).is_none());
    assert!(worker.clients().all().is_empty());
  }
}
