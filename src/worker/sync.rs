//! Deferred contact-form submissions, replayed on background sync.

use color_eyre::{eyre::eyre, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::cache::CacheStorage;
use crate::http::{Network, Request};

static EMAIL_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// A contact form submission as entered on the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubmission {
  pub name: String,
  pub email: String,
  pub subject: String,
  pub message: String,
}

impl ContactSubmission {
  /// Check the submission the way the contact form does before sending.
  pub fn validate(&self) -> Result<()> {
    let mut errors = Vec::new();

    if self.name.trim().chars().count() < 2 {
      errors.push("name must be at least 2 characters");
    }
    if !EMAIL_RE.is_match(self.email.trim()) {
      errors.push("email address is not valid");
    }
    if self.subject.trim().chars().count() < 3 {
      errors.push("subject must be at least 3 characters");
    }
    if self.message.trim().chars().count() < 10 {
      errors.push("message must be at least 10 characters");
    }

    if errors.is_empty() {
      Ok(())
    } else {
      Err(eyre!("Invalid submission: {}", errors.join(", ")))
    }
  }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
  pub sent: usize,
  /// Still queued for the next sync
  pub failed: usize,
}

impl<S: CacheStorage, N: Network> Worker<S, N> {
  /// Store a submission until the next sync opportunity.
  pub fn queue_submission(&self, submission: &ContactSubmission) -> Result<i64> {
    submission.validate()?;
    let payload = serde_json::to_string(submission)
      .map_err(|e| eyre!("Failed to serialize submission: {}", e))?;
    let id = self.queue.enqueue(&payload)?;
    debug!("Queued submission {}", id);
    Ok(id)
  }

  /// Handle a background-sync trigger. Returns None for tags this worker
  /// does not sync.
  pub async fn handle_sync(&self, tag: &str) -> Result<Option<ReplayReport>> {
    info!("Background sync {}", tag);

    if tag != self.config.sync.tag {
      debug!("No handler for sync tag {}", tag);
      return Ok(None);
    }

    self.replay_submissions().await.map(Some)
  }

  /// POST every queued submission; drop the ones the server accepted.
  pub async fn replay_submissions(&self) -> Result<ReplayReport> {
    let endpoint = self.config.resolve(&self.config.sync.endpoint)?;
    let queued = self.queue.queued()?;
    let mut report = ReplayReport::default();

    for row in queued {
      debug!("Replaying submission {} queued at {}", row.id, row.queued_at);
      let submission: ContactSubmission = match serde_json::from_str(&row.payload) {
        Ok(s) => s,
        Err(e) => {
          error!("Queued submission {} is unreadable: {}", row.id, e);
          report.failed += 1;
          continue;
        }
      };

      let request = Request::post_json(endpoint.clone(), &submission)?;
      match self.network.fetch(&request).await {
        Ok(resp) if resp.is_ok() => {
          self.queue.remove(row.id)?;
          info!("Form submission {} sent successfully", row.id);
          report.sent += 1;
        }
        Ok(resp) => {
          warn!("Form submission {} rejected with status {}", row.id, resp.status);
          report.failed += 1;
        }
        Err(e) => {
          warn!("Failed to send form submission {}: {}", row.id, e);
          report.failed += 1;
        }
      }
    }

    Ok(report)
  }

  /// Number of submissions waiting to be sent.
  pub fn queued_submissions(&self) -> Result<usize> {
    Ok(self.queue.queued()?.len())
  }
}
