mod cache;
mod config;
mod db;
mod event;
mod http;
mod logging;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cache::{CacheStorage, SqliteStorage};
use db::Database;
use event::{EventHandler, EventSender};
use http::{HttpNetwork, Network, Request, Response};
use worker::sync::ContactSubmission;
use worker::{FetchOutcome, Worker};

type SiteWorker = Worker<SqliteStorage, HttpNetwork>;

#[derive(Parser, Debug)]
#[command(name = "offcache")]
#[command(about = "A cache-first offline worker for static websites")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./offcache.yaml or $XDG_CONFIG_HOME/offcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the current generation: precache assets, drop old generations
  Install,
  /// Activate an already installed generation, deleting every other one
  Activate,
  /// Resolve a request the way a controlled page would
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
    #[arg(long, default_value = "GET")]
    method: String,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Post a control message, e.g. '{"type":"GET_VERSION"}'
  Message { json: String },
  /// Queue a contact form submission for the next background sync
  Queue {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    subject: String,
    #[arg(long)]
    message: String,
  },
  /// Trigger a background sync (default tag from config)
  Sync {
    #[arg(long)]
    tag: Option<String>,
  },
  /// Show the notification a push message would produce
  Push { text: Option<String> },
  /// Click an action on a push notification
  Click {
    #[arg(long, default_value = "open")]
    action: String,
    /// Notification target URL (default: site root)
    #[arg(long)]
    url: Option<String>,
  },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config)?;

  let data_dir = config.data_dir()?;
  let storage = SqliteStorage::open(&data_dir.join("cache.db"))?;
  let queue = Database::open(&data_dir.join("queue.db"))?;
  let network = HttpNetwork::new(&config.origin_url()?)?;

  let worker = Arc::new(Worker::new(config, storage, network, queue)?);
  let (handler, events) = EventHandler::new(Arc::clone(&worker));
  let event_loop = tokio::spawn(handler.run());

  let result = run(args.command, &worker, &events).await;
  if let Err(e) = &result {
    let _ = events.report_error(e.to_string());
  }

  // Let in-flight fetches and cache writes finish before exiting.
  drop(events);
  event_loop
    .await
    .map_err(|e| eyre!("Event loop failed: {}", e))?;

  result
}

async fn run(command: Command, worker: &SiteWorker, events: &EventSender) -> Result<()> {
  match command {
    Command::Install => {
      events.install().await?;
      let count = worker.cache().storage().entry_count(worker.version())?;
      println!("{}: {} entries cached", worker.version(), count);
    }
    Command::Activate => {
      if !worker.resume()? {
        return Err(eyre!(
          "Generation {} is not installed, run `offcache install` first",
          worker.version()
        ));
      }
      events.activate().await?;
      println!(
        "Active: {}",
        worker.cache().storage().cache_names()?.join(", ")
      );
    }
    Command::Fetch {
      url,
      navigate,
      method,
      output,
    } => {
      worker.start().await?;
      fetch(worker, events, &url, navigate, &method, output).await?;
    }
    Command::Message { json } => {
      worker.start().await?;
      let data = serde_json::from_str(&json).map_err(|e| eyre!("Invalid message JSON: {}", e))?;
      match events.post_message(data).await? {
        Some(reply) => println!("{}", serde_json::to_string(&reply)?),
        None => println!("(no reply)"),
      }
    }
    Command::Queue {
      name,
      email,
      subject,
      message,
    } => {
      let id = worker.queue_submission(&ContactSubmission {
        name,
        email,
        subject,
        message,
      })?;
      println!(
        "Queued submission {} ({} waiting)",
        id,
        worker.queued_submissions()?
      );
    }
    Command::Sync { tag } => {
      worker.start().await?;
      let tag = tag.unwrap_or_else(|| worker.config().sync.tag.clone());
      match events.sync(&tag).await? {
        Some(report) => println!("sent {}, still queued {}", report.sent, report.failed),
        None => println!("No handler for sync tag {}", tag),
      }
    }
    Command::Push { text } => {
      let notification = events.push(text).await?;
      println!("{}", serde_json::to_string_pretty(&notification)?);
    }
    Command::Click { action, url } => {
      worker.start().await?;
      let mut notification = events.push(None).await?;
      if url.is_some() {
        notification.data.url = url;
      }
      match events.click(notification, Some(action)).await? {
        Some(opened) => println!("Opened {}", opened),
        None => println!("Notification closed"),
      }
    }
  }

  Ok(())
}

async fn fetch(
  worker: &SiteWorker,
  events: &EventSender,
  url: &str,
  navigate: bool,
  method: &str,
  output: Option<PathBuf>,
) -> Result<()> {
  let url = worker.config().resolve(url)?;
  let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
  let request = if navigate {
    Request::navigate(url)
  } else {
    Request::get(url)
  }
  .with_method(method);

  let (response, source) = match events.fetch(request.clone()).await? {
    FetchOutcome::Respond(result) => {
      let source = match result.cached_at {
        Some(at) => format!("{}, cached {}", result.source, at.format("%Y-%m-%d %H:%M:%S")),
        None => result.source.to_string(),
      };
      (result.data, source)
    }
    FetchOutcome::PassThrough => {
      info!("Not intercepted, fetching {} directly", request.url);
      (worker.network().fetch(&request).await?, "passthrough".to_string())
    }
  };

  print_response(&response, &source, output)
}

fn print_response(response: &Response, source: &str, output: Option<PathBuf>) -> Result<()> {
  eprintln!("{} {} ({})", response.status, response.status_text, source);
  for (name, value) in &response.headers {
    eprintln!("{}: {}", name, value);
  }

  match output {
    Some(path) => std::fs::write(&path, &response.body)
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
    None => std::io::stdout()
      .write_all(&response.body)
      .map_err(|e| eyre!("Failed to write body: {}", e))?,
  }

  Ok(())
}
