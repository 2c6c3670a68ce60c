use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::WikiHttp;
use crate::error::{FandomError, FandomResult};
use crate::model::WikiConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub page_id: i64,
    pub url: String,
}

/// Parsed `"<wiki> <term>"` launcher input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSearchInput<'a> {
    /// Fewer than two words: nothing to search yet.
    Incomplete,
    UnknownWiki(&'a str),
    Query { wiki: &'a WikiConfig, term: &'a str },
}

/// The first word picks the first wiki whose name contains it, ignoring case.
pub fn parse_text_search<'a>(input: &'a str, wikis: &'a [WikiConfig]) -> TextSearchInput<'a> {
    let Some((wiki_name, term)) = input.trim_start().split_once(' ') else {
        return TextSearchInput::Incomplete;
    };
    let term = term.trim();
    if wiki_name.is_empty() || term.is_empty() {
        return TextSearchInput::Incomplete;
    }
    let needle = wiki_name.to_lowercase();
    match wikis
        .iter()
        .find(|wiki| wiki.name.to_lowercase().contains(&needle))
    {
        Some(wiki) => TextSearchInput::Query { wiki, term },
        None => TextSearchInput::UnknownWiki(wiki_name),
    }
}

/// One live `list=search` call; no caching and no result pagination.
pub fn search<A: WikiHttp>(
    api: &mut A,
    wiki: &WikiConfig,
    term: &str,
) -> FandomResult<Vec<SearchHit>> {
    run_search(api, wiki, term).map_err(|err| match err {
        FandomError::Search { .. } => err,
        other => FandomError::Search {
            wiki: wiki.name.clone(),
            message: other.to_string(),
        },
    })
}

fn run_search<A: WikiHttp>(
    api: &mut A,
    wiki: &WikiConfig,
    term: &str,
) -> FandomResult<Vec<SearchHit>> {
    let params = vec![
        ("action", "query".to_string()),
        ("list", "search".to_string()),
        ("srsearch", term.to_string()),
    ];
    let response = api.call(&wiki.api_url(), &params)?;
    let parsed: SearchResponse = serde_json::from_value(response)
        .map_err(|err| FandomError::decode("search API response", err))?;

    let hits = parsed
        .query
        .search
        .into_iter()
        .map(|item| SearchHit {
            url: wiki.article_url(&item.title),
            snippet: clean_snippet(item.snippet.as_deref().unwrap_or_default()),
            title: item.title,
            page_id: item.pageid,
        })
        .collect::<Vec<_>>();
    debug!(wiki = %wiki.name, term, hits = hits.len(), "search finished");
    Ok(hits)
}

/// Strip HTML tags and collapse whitespace runs.
pub fn clean_snippet(snippet: &str) -> String {
    let mut text = String::with_capacity(snippet.len());
    let mut in_tag = false;
    for ch in snippet.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: SearchPayload,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    search: Vec<SearchQueryItem>,
}

#[derive(Debug, Deserialize)]
struct SearchQueryItem {
    title: String,
    pageid: i64,
    snippet: Option<String>,
}
