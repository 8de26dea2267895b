//! Control messages posted by pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{Worker, WorkerState};
use crate::cache::CacheStorage;
use crate::http::Network;

/// Messages the worker understands, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  SkipWaiting,
  GetVersion,
  ClearCache,
}

/// Replies posted back on the message's reply port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
  Version { version: String },
  Cleared { success: bool },
}

pub type ReplyPort = oneshot::Sender<ControlReply>;

/// A posted message: raw JSON data plus an optional reply port.
#[derive(Debug)]
pub struct Envelope {
  pub data: Value,
  pub port: Option<ReplyPort>,
}

impl Envelope {
  #[cfg(test)]
  pub fn new(data: Value) -> Self {
    Self { data, port: None }
  }

  /// Attach a reply port, returning the receiving end.
  pub fn with_reply(data: Value) -> (Self, oneshot::Receiver<ControlReply>) {
    let (tx, rx) = oneshot::channel();
    (
      Self {
        data,
        port: Some(tx),
      },
      rx,
    )
  }
}

impl<S: CacheStorage, N: Network> Worker<S, N> {
  /// Handle a message from a page. Malformed and unknown messages are
  /// logged and dropped.
  pub async fn handle_message(&self, envelope: Envelope) {
    let Envelope { data, port } = envelope;

    let kind = match data.get("type") {
      None | Some(Value::Null) => {
        debug!("Ignoring message without a type");
        return;
      }
      Some(Value::String(kind)) => kind.clone(),
      Some(other) => other.to_string(),
    };

    let message = match serde_json::from_value::<ControlMessage>(data) {
      Ok(message) => message,
      Err(_) => {
        info!("Unknown message type {}", kind);
        return;
      }
    };

    match message {
      ControlMessage::SkipWaiting => {
        self.skip_waiting();
        if self.state() == WorkerState::Installed {
          if let Err(e) = self.activate().await {
            self.report_error(&e);
          }
        }
      }
      ControlMessage::GetVersion => reply(
        port,
        ControlReply::Version {
          version: self.version().to_string(),
        },
      ),
      ControlMessage::ClearCache => {
        let success = match self.cache.storage().delete_cache(self.version()) {
          Ok(_) => true,
          Err(e) => {
            warn!("Failed to clear cache {}: {}", self.version(), e);
            false
          }
        };
        reply(port, ControlReply::Cleared { success });
      }
    }
  }
}

fn reply(port: Option<ReplyPort>, message: ControlReply) {
  match port {
    Some(port) => {
      if port.send(message).is_err() {
        debug!("Reply port closed before the reply was sent");
      }
    }
    None => warn!("Message expects a reply but no port was provided"),
  }
}
