//! Remote query registry.
//!
//! The registry lists every asynchronous query the service still tracks and
//! serves the result items of finished ones. [`HttpRegistry`] talks to it over
//! blocking HTTP:
//!
//! - `GET {base}/queries` answers a JSON array of `{"id", "status"}` objects,
//!   or an object wrapping that array under `queries`.
//! - `GET {base}/queries/{id}/results` answers a JSON array of items, or an
//!   object wrapping them under `results`.
//!
//! Calls are not retried. A failure is reported to the caller as is.

use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Result, ToolError};
use crate::model::RegistryEntry;

const USER_AGENT: &str = concat!("qledger/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_LIMIT: usize = 200;

/// Read-only view of the remote query registry.
pub trait QueryRegistry {
    /// Lists every query the registry currently knows about.
    fn list_queries(&self) -> Result<Vec<RegistryEntry>>;

    /// Fetches the result items of a finished query.
    fn fetch_result(&self, entry: &RegistryEntry) -> Result<Vec<Value>>;
}

impl<T: QueryRegistry + ?Sized> QueryRegistry for &T {
    fn list_queries(&self) -> Result<Vec<RegistryEntry>> {
        (**self).list_queries()
    }

    fn fetch_result(&self, entry: &RegistryEntry) -> Result<Vec<Value>> {
        (**self).fetch_result(entry)
    }
}

impl<T: QueryRegistry + ?Sized> QueryRegistry for Box<T> {
    fn list_queries(&self) -> Result<Vec<RegistryEntry>> {
        (**self).list_queries()
    }

    fn fetch_result(&self, entry: &RegistryEntry) -> Result<Vec<Value>> {
        (**self).fetch_result(entry)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryListing {
    Bare(Vec<RegistryEntry>),
    Wrapped { queries: Vec<RegistryEntry> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResultListing {
    Bare(Vec<Value>),
    Wrapped { results: Vec<Value> },
}

/// Stand-in used when no registry URL was configured. Passes that never need
/// the registry succeed; the first remote call fails with `InvalidConfig`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredRegistry;

impl UnconfiguredRegistry {
    fn unset() -> ToolError {
        ToolError::InvalidConfig(
            "registry url is not set; pass --registry-url, set QLEDGER_REGISTRY_URL, \
             or add [registry] url to the config file"
                .into(),
        )
    }
}

impl QueryRegistry for UnconfiguredRegistry {
    fn list_queries(&self) -> Result<Vec<RegistryEntry>> {
        Err(Self::unset())
    }

    fn fetch_result(&self, _entry: &RegistryEntry) -> Result<Vec<Value>> {
        Err(Self::unset())
    }
}

/// Registry client speaking JSON over HTTP.
pub struct HttpRegistry {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpRegistry {
    /// Builds a client for the registry rooted at `base_url`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|err| {
            ToolError::InvalidConfig(format!("invalid registry url '{base_url}': {err}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ToolError::InvalidConfig(format!(
                "registry url '{base_url}' cannot carry a path"
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ToolError::InvalidConfig(format!(
                    "registry url '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let mut request = self.http.get(url).header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            return Err(ToolError::Registry {
                status: status.as_u16(),
                message: extract_error(&text),
            });
        }

        let trimmed = text.trim_start_matches('\u{feff}');
        Ok(serde_json::from_str(trimmed)?)
    }
}

impl QueryRegistry for HttpRegistry {
    #[instrument(level = "debug", skip_all, fields(base = %self.base_url))]
    fn list_queries(&self) -> Result<Vec<RegistryEntry>> {
        let url = self.endpoint(&["queries"])?;
        let entries = match self.get_json::<QueryListing>(url)? {
            QueryListing::Bare(entries) | QueryListing::Wrapped { queries: entries } => entries,
        };
        debug!(query_count = entries.len(), "listed registry queries");
        Ok(entries)
    }

    #[instrument(level = "debug", skip_all, fields(query_id = %entry.id))]
    fn fetch_result(&self, entry: &RegistryEntry) -> Result<Vec<Value>> {
        let url = self.endpoint(&["queries", entry.id.as_str(), "results"])?;
        let items = match self.get_json::<ResultListing>(url)? {
            ResultListing::Bare(items) | ResultListing::Wrapped { results: items } => items,
        };
        debug!(item_count = items.len(), "fetched query result");
        Ok(items)
    }
}

/// Pulls a readable message out of an error body, falling back to the body
/// itself (truncated).
fn extract_error(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = json
            .get("error")
            .and_then(|error| error.get("message").or(Some(error)))
            .or_else(|| json.get("message"))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(ERROR_BODY_LIMIT).collect()
}
