use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::debug;
use url::Url;

use crate::cache::CacheStorage;
use crate::http::{Network, Request};
use crate::worker::message::{ControlReply, Envelope};
use crate::worker::push::Notification;
use crate::worker::sync::ReplayReport;
use crate::worker::{FetchOutcome, Worker};

/// Worker events
#[derive(Debug)]
pub enum Event {
  /// Precache the manifest, then activate if waiting is skipped
  Install { done: oneshot::Sender<Result<()>> },
  Activate { done: oneshot::Sender<Result<()>> },
  /// A request from a controlled page
  Fetch {
    request: Request,
    respond_to: oneshot::Sender<FetchOutcome>,
  },
  /// A message posted by a page
  Message(Envelope),
  /// Background sync trigger
  Sync {
    tag: String,
    done: oneshot::Sender<Result<Option<ReplayReport>>>,
  },
  Push {
    data: Option<String>,
    shown: oneshot::Sender<Notification>,
  },
  NotificationClick {
    notification: Notification,
    action: Option<String>,
    opened: oneshot::Sender<Option<Url>>,
  },
  /// Global error report
  Error(String),
}

/// Event loop that feeds queued events to a worker, one at a time.
///
/// Lifecycle, message and sync events are handled in arrival order, so an
/// install always finishes before a later activate starts. Fetches run as
/// separate tasks so a slow network does not hold up the queue.
pub struct EventHandler<S: CacheStorage, N: Network> {
  worker: Arc<Worker<S, N>>,
  rx: mpsc::UnboundedReceiver<Event>,
  tasks: JoinSet<()>,
}

/// Sending half handed to pages and the host.
#[derive(Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Event>,
}

impl<S: CacheStorage, N: Network> EventHandler<S, N> {
  /// Create an event loop for `worker`
  pub fn new(worker: Arc<Worker<S, N>>) -> (Self, EventSender) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
      Self {
        worker,
        rx,
        tasks: JoinSet::new(),
      },
      EventSender { tx },
    )
  }

  /// Process events until every sender is dropped, then wait for in-flight
  /// fetches and cache writes.
  pub async fn run(mut self) {
    while let Some(event) = self.rx.recv().await {
      self.dispatch(event).await;
      self.reap_finished();
    }

    while let Some(joined) = self.tasks.join_next().await {
      if let Err(e) = joined {
        self.worker.report_unhandled_rejection(&e.to_string());
      }
    }
    self.worker.wait_until_idle().await;
    debug!("Event loop stopped");
  }

  fn reap_finished(&mut self) {
    while let Some(joined) = self.tasks.try_join_next() {
      if let Err(e) = joined {
        self.worker.report_unhandled_rejection(&e.to_string());
      }
    }
  }

  async fn dispatch(&mut self, event: Event) {
    let worker = &self.worker;

    match event {
      Event::Install { done } => {
        let mut result = worker.install().await;
        if result.is_ok() && worker.is_skipping_waiting() {
          result = worker.activate().await;
        }
        let _ = done.send(result);
      }
      Event::Activate { done } => {
        let _ = done.send(worker.activate().await);
      }
      Event::Fetch {
        request,
        respond_to,
      } => {
        let worker = Arc::clone(worker);
        self.tasks.spawn(async move {
          let outcome = worker.handle_fetch(&request).await;
          if respond_to.send(outcome).is_err() {
            debug!("Page went away before {} was answered", request.url);
          }
        });
      }
      Event::Message(envelope) => worker.handle_message(envelope).await,
      Event::Sync { tag, done } => {
        let _ = done.send(worker.handle_sync(&tag).await);
      }
      Event::Push { data, shown } => {
        let _ = shown.send(worker.handle_push(data.as_deref()));
      }
      Event::NotificationClick {
        notification,
        action,
        opened,
      } => {
        let _ = opened.send(worker.handle_notification_click(&notification, action.as_deref()));
      }
      Event::Error(message) => worker.report_error(&eyre!(message)),
    }
  }
}

impl EventSender {
  fn send(&self, event: Event) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Worker event loop has stopped"))
  }

  async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Event) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    self.send(make(tx))?;
    rx.await
      .map_err(|_| eyre!("Worker dropped the event without answering"))
  }

  pub async fn install(&self) -> Result<()> {
    self.call(|done| Event::Install { done }).await?
  }

  pub async fn activate(&self) -> Result<()> {
    self.call(|done| Event::Activate { done }).await?
  }

  pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
    self
      .call(|respond_to| Event::Fetch {
        request,
        respond_to,
      })
      .await
  }

  /// Post a message and wait for its reply. Messages that produce no reply
  /// yield None.
  pub async fn post_message(&self, data: Value) -> Result<Option<ControlReply>> {
    let (envelope, rx) = Envelope::with_reply(data);
    self.send(Event::Message(envelope))?;
    Ok(rx.await.ok())
  }

  pub async fn sync(&self, tag: &str) -> Result<Option<ReplayReport>> {
    self
      .call(|done| Event::Sync {
        tag: tag.to_string(),
        done,
      })
      .await?
  }

  pub async fn push(&self, data: Option<String>) -> Result<Notification> {
    self.call(|shown| Event::Push { data, shown }).await
  }

  pub async fn click(
    &self,
    notification: Notification,
    action: Option<String>,
  ) -> Result<Option<Url>> {
    self
      .call(|opened| Event::NotificationClick {
        notification,
        action,
        opened,
      })
      .await
  }

  /// Report a global error. Logged by the worker, never fatal.
  pub fn report_error(&self, message: impl Into<String>) -> Result<()> {
    self.send(Event::Error(message.into()))
  }
}
