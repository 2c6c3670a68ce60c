//! Scripted in-memory transport shared by unit tests.

use std::collections::{BTreeMap, VecDeque};

use serde_json::{Value, json};

use crate::api::WikiHttp;
use crate::error::{FandomError, FandomResult};
use crate::model::WikiConfig;

#[derive(Default)]
pub struct MockApi {
    listings: BTreeMap<String, VecDeque<Option<Value>>>,
    metadata: BTreeMap<(String, String), Value>,
    site_info: BTreeMap<String, Value>,
    search: BTreeMap<String, Value>,
    downloads: BTreeMap<String, Vec<u8>>,
    pub calls: Vec<(String, Vec<(String, String)>)>,
    pub download_calls: Vec<String>,
    request_count: usize,
}

impl MockApi {
    pub fn script_listing(&mut self, wiki: &WikiConfig, response: Value) {
        self.listings
            .entry(wiki.api_url())
            .or_default()
            .push_back(Some(response));
    }

    /// The next listing call for `wiki` fails with a network error.
    pub fn script_listing_error(&mut self, wiki: &WikiConfig) {
        self.listings.entry(wiki.api_url()).or_default().push_back(None);
    }

    pub fn script_metadata(&mut self, wiki: &WikiConfig, page_id: i64, response: Value) {
        self.metadata
            .insert((wiki.api_url(), page_id.to_string()), response);
    }

    pub fn script_site_info(&mut self, wiki: &WikiConfig, response: Value) {
        self.site_info.insert(wiki.api_url(), response);
    }

    pub fn script_search(&mut self, wiki: &WikiConfig, response: Value) {
        self.search.insert(wiki.api_url(), response);
    }

    pub fn script_download(&mut self, url: &str, bytes: Vec<u8>) {
        self.downloads.insert(url.to_string(), bytes);
    }

    pub fn listing_calls(&self, wiki: &WikiConfig) -> usize {
        self.listing_params(wiki).count()
    }

    pub fn listing_tokens(&self, wiki: &WikiConfig) -> Vec<Option<String>> {
        self.listing_params(wiki)
            .map(|params| param(params, "apcontinue").map(ToString::to_string))
            .collect()
    }

    fn listing_params<'a>(
        &'a self,
        wiki: &WikiConfig,
    ) -> impl Iterator<Item = &'a Vec<(String, String)>> + 'a {
        let api_url = wiki.api_url();
        self.calls
            .iter()
            .filter(move |(url, params)| {
                *url == api_url && param(params, "list") == Some("allpages")
            })
            .map(|(_, params)| params)
    }
}

impl WikiHttp for MockApi {
    fn call(&mut self, api_url: &str, params: &[(&str, String)]) -> FandomResult<Value> {
        self.request_count += 1;
        let params = params
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect::<Vec<_>>();
        self.calls.push((api_url.to_string(), params.clone()));

        let scripted = if param(&params, "list") == Some("allpages") {
            self.listings
                .get_mut(api_url)
                .and_then(VecDeque::pop_front)
                .flatten()
        } else if param(&params, "prop") == Some("pageimages|categories") {
            let page_id = param(&params, "pageids").unwrap_or_default().to_string();
            self.metadata.get(&(api_url.to_string(), page_id)).cloned()
        } else if param(&params, "meta") == Some("siteinfo") {
            self.site_info.get(api_url).cloned()
        } else if param(&params, "list") == Some("search") {
            self.search.get(api_url).cloned()
        } else {
            None
        };

        scripted.ok_or_else(|| FandomError::Network {
            url: api_url.to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn download(&mut self, url: &str) -> FandomResult<Vec<u8>> {
        self.request_count += 1;
        self.download_calls.push(url.to_string());
        self.downloads
            .get(url)
            .cloned()
            .ok_or_else(|| FandomError::Download {
                url: url.to_string(),
                status: 404,
            })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

pub fn allpages_response(pages: &[(i64, &str)], next: Option<&str>) -> Value {
    let allpages = pages
        .iter()
        .map(|(id, title)| json!({"pageid": id, "ns": 0, "title": title}))
        .collect::<Vec<_>>();
    let mut response = json!({"batchcomplete": "", "query": {"allpages": allpages}});
    if let Some(token) = next {
        response["continue"] = json!({"apcontinue": token, "continue": "-||"});
    }
    response
}

pub fn page_info_response(page_id: i64, thumbnail: Option<&str>, categories: &[&str]) -> Value {
    let mut page = json!({"pageid": page_id, "ns": 0, "title": format!("Page {page_id}")});
    if let Some(source) = thumbnail {
        page["thumbnail"] = json!({"source": source, "width": 500, "height": 500});
    }
    if !categories.is_empty() {
        page["categories"] = Value::Array(
            categories
                .iter()
                .map(|title| json!({"ns": 14, "title": title}))
                .collect(),
        );
    }
    let mut pages = serde_json::Map::new();
    pages.insert(page_id.to_string(), page);
    json!({"batchcomplete": "", "query": {"pages": pages}})
}
