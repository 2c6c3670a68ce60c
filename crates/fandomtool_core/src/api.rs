use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{DEFAULT_TIMEOUT_MS, DEFAULT_USER_AGENT, ToolConfig};
use crate::error::{FandomError, FandomResult};

/// How parameters travel to `api.php`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    /// URL-encoded query string.
    Get,
    /// `application/x-www-form-urlencoded` body.
    #[default]
    Post,
}

impl RequestMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
        }
    }
}

/// Transport seam between the harvester/search/icon code and the network.
///
/// One attempt per request: implementations never retry.
pub trait WikiHttp {
    fn call(&mut self, api_url: &str, params: &[(&str, String)]) -> FandomResult<Value>;
    fn download(&mut self, url: &str) -> FandomResult<Vec<u8>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub method: RequestMethod,
}

impl Default for MediaWikiClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            method: RequestMethod::default(),
        }
    }
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            timeout_ms: config.http.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            method: config.http.method.unwrap_or_default(),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    pub fn config(&self) -> &MediaWikiClientConfig {
        &self.config
    }

    fn send(&mut self, api_url: &str, pairs: &[(String, String)]) -> FandomResult<Response> {
        self.request_count += 1;
        let request = match self.config.method {
            RequestMethod::Get => {
                let base_url = Url::parse(api_url).map_err(|error| FandomError::Network {
                    url: api_url.to_string(),
                    message: format!("invalid API URL: {error}"),
                })?;
                self.client.get(base_url).query(pairs)
            }
            RequestMethod::Post => self.client.post(api_url).form(pairs),
        };
        request
            .header("User-Agent", self.config.user_agent.clone())
            .send()
            .map_err(|error| network_error(api_url, &error))
    }
}

impl WikiHttp for MediaWikiClient {
    fn call(&mut self, api_url: &str, params: &[(&str, String)]) -> FandomResult<Value> {
        let pairs = encode_params(params);
        debug!(url = api_url, method = self.config.method.as_str(), "calling wiki API");

        let response = self.send(api_url, &pairs)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FandomError::Network {
                url: api_url.to_string(),
                message: format!("API request failed with HTTP {status}"),
            });
        }
        let body = response
            .text()
            .map_err(|error| network_error(api_url, &error))?;
        decode_payload(&body)
    }

    fn download(&mut self, url: &str) -> FandomResult<Vec<u8>> {
        self.request_count += 1;
        debug!(url, "downloading image");
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.config.user_agent.clone())
            .send()
            .map_err(|error| network_error(url, &error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FandomError::Download {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(|error| network_error(url, &error))?;
        Ok(bytes.to_vec())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Adds `format=json` and drops empty values so optional parameters can be
/// passed unconditionally.
pub fn encode_params(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 1);
    pairs.push(("format".to_string(), "json".to_string()));
    for (key, value) in params {
        if *key == "format" || value.is_empty() {
            continue;
        }
        pairs.push(((*key).to_string(), value.clone()));
    }
    pairs
}

/// Parses a response body, surfacing `{"error": {...}}` payloads as API errors.
pub fn decode_payload(body: &str) -> FandomResult<Value> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|error| FandomError::decode("MediaWiki API response", error))?;
    if !payload.is_object() {
        return Err(FandomError::decode(
            "MediaWiki API response",
            "top-level JSON value is not an object",
        ));
    }
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        return Err(FandomError::Api {
            code: code.to_string(),
            info: info.to_string(),
        });
    }
    Ok(payload)
}

fn network_error(url: &str, error: &reqwest::Error) -> FandomError {
    let kind = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else {
        "transport"
    };
    FandomError::Network {
        url: url.to_string(),
        message: format!("{kind}: {error}"),
    }
}
