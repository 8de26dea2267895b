use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use url::{Origin, Url};

use super::types::{Request, RequestMode, Response, ResponseType};

/// The network as seen by the worker.
///
/// An `Err` means the request was rejected outright (offline, DNS or
/// connection failure). HTTP error statuses come back as `Ok` responses.
pub trait Network: Clone + Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// reqwest-backed network client
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl HttpNetwork {
  /// `origin` decides which responses are classified as basic.
  pub fn new(origin: &Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("offcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: origin.origin(),
    })
  }
}

/// Classify a response by where it finally came from.
fn classify(origin: &Origin, request: &Request, final_url: &Url) -> ResponseType {
  if final_url.origin() == *origin {
    ResponseType::Basic
  } else if request.mode == RequestMode::NoCors {
    ResponseType::Opaque
  } else {
    ResponseType::Cors
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let resp = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let final_url = resp.url().clone();
    let response_type = classify(&self.origin, request, &final_url);
    let redirected = final_url != request.url;

    // Opaque responses expose nothing to the page.
    if response_type == ResponseType::Opaque {
      return Ok(Response {
        status: 0,
        status_text: String::new(),
        headers: Vec::new(),
        body: Vec::new(),
        response_type,
        url: None,
        redirected: false,
      });
    }

    let status = resp.status();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", final_url, e))?
      .to_vec();

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
      response_type,
      url: Some(final_url),
      redirected,
    })
  }
}
