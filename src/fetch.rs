//! Outbound HTTP.
//!
//! Every network read in the pipeline goes through the [`Fetcher`] trait so
//! source strategies can be exercised without a network. [`HttpFetcher`] is
//! the production implementation: one shared `reqwest::Client` with a
//! browser-like User-Agent, a uniform timeout and redirect following.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, redirect};
use std::time::Duration;
use tracing::{debug, instrument};

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";
const MAX_REDIRECTS: usize = 10;

/// A failed GET. All variants are transient from the pipeline's point of
/// view: the caller logs and moves on.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

/// GET a URL and return its body as text.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build the shared client. `timeout` applies to every request.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!(bytes = body.len(), "Fetched");
        Ok(body)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Canned {
        Body(String),
        Timeout,
        Status(u16),
    }

    /// In-memory [`Fetcher`]: canned bodies and failures per URL. Unknown
    /// URLs answer 404. Every request is recorded.
    #[derive(Default)]
    pub struct MockFetcher {
        responses: HashMap<String, Canned>,
        pub requested: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, url: &str, body: &str) -> Self {
            self.responses
                .insert(url.to_string(), Canned::Body(body.to_string()));
            self
        }

        pub fn timeout(mut self, url: &str) -> Self {
            self.responses.insert(url.to_string(), Canned::Timeout);
            self
        }

        pub fn status(mut self, url: &str, status: u16) -> Self {
            self.responses
                .insert(url.to_string(), Canned::Status(status));
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn get_text(&self, url: &str) -> Result<String, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            match self.responses.get(url) {
                Some(Canned::Body(body)) => Ok(body.clone()),
                Some(Canned::Timeout) => Err(FetchError::Timeout {
                    url: url.to_string(),
                }),
                Some(Canned::Status(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}
