use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::WikiHttp;
use crate::error::{FandomError, FandomResult};
use crate::model::{Page, PageCollection, PageMetadata, WikiConfig, strip_namespace_prefix};

pub const THUMBNAIL_SIZE: u32 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct WikiHarvestReport {
    pub wiki_name: String,
    pub pages: usize,
    pub listing_requests: usize,
    pub metadata_failures: usize,
    pub elapsed_ms: u128,
    pub stopped: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub pages: PageCollection,
    pub reports: Vec<WikiHarvestReport>,
}

impl HarvestOutcome {
    pub fn failed_wikis(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| report.error.is_some())
            .count()
    }
}

/// One `list=allpages` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageListing {
    pub stubs: Vec<PageStub>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageStub {
    pub pageid: i64,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SiteInfo {
    #[serde(default)]
    pub sitename: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
}

pub fn never_stop() -> bool {
    false
}

/// Harvest every wiki in order. A failing wiki keeps its partial pages and
/// does not prevent later wikis from being harvested.
pub fn harvest_all<A: WikiHttp>(
    api: &mut A,
    wikis: &[WikiConfig],
    should_stop: &dyn Fn() -> bool,
) -> HarvestOutcome {
    let mut pages = Vec::new();
    let mut reports = Vec::with_capacity(wikis.len());

    for wiki in wikis {
        if should_stop() {
            info!(wiki = %wiki.name, "harvest stopped before wiki");
            break;
        }
        let (wiki_pages, report) = harvest_wiki(api, wiki, should_stop);
        pages.extend(wiki_pages);
        reports.push(report);
    }

    HarvestOutcome { pages, reports }
}

pub fn harvest_wiki<A: WikiHttp>(
    api: &mut A,
    wiki: &WikiConfig,
    should_stop: &dyn Fn() -> bool,
) -> (PageCollection, WikiHarvestReport) {
    let started = Instant::now();
    let mut pages = Vec::new();
    let mut report = WikiHarvestReport {
        wiki_name: wiki.name.clone(),
        pages: 0,
        listing_requests: 0,
        metadata_failures: 0,
        elapsed_ms: 0,
        stopped: false,
        error: None,
    };
    let mut continue_token: Option<String> = None;

    info!(wiki = %wiki.name, "fetching all pages");
    'listing: loop {
        report.listing_requests += 1;
        let listing = match fetch_page_listing(api, wiki, continue_token.as_deref()) {
            Ok(listing) => listing,
            Err(err) => {
                error!(wiki = %wiki.name, error = %err, "error fetching pages");
                report.error = Some(err.to_string());
                break;
            }
        };

        for stub in listing.stubs {
            if should_stop() {
                report.stopped = true;
                break 'listing;
            }
            let metadata = match fetch_page_metadata(api, wiki, stub.pageid) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(
                        wiki = %wiki.name,
                        page_id = stub.pageid,
                        error = %err,
                        "error fetching page info"
                    );
                    report.metadata_failures += 1;
                    PageMetadata::default()
                }
            };
            pages.push(Page {
                page_id: stub.pageid,
                url: wiki.article_url(&stub.title),
                title: stub.title,
                wiki_name: wiki.name.clone(),
                thumbnail_url: metadata.thumbnail_url,
                categories: metadata.categories,
            });
        }

        match listing.next {
            Some(next) if continue_token.as_deref() == Some(next.as_str()) => {
                let err = FandomError::decode(
                    "allpages continuation",
                    format!("token {next:?} did not advance"),
                );
                error!(wiki = %wiki.name, error = %err, "error fetching pages");
                report.error = Some(err.to_string());
                break;
            }
            Some(next) => {
                debug!(wiki = %wiki.name, apcontinue = %next, "continuing listing");
                continue_token = Some(next);
            }
            None => break,
        }
        if should_stop() {
            report.stopped = true;
            break;
        }
    }

    report.pages = pages.len();
    report.elapsed_ms = started.elapsed().as_millis();
    info!(
        wiki = %wiki.name,
        pages = report.pages,
        elapsed_ms = report.elapsed_ms as u64,
        "fetched pages"
    );
    (pages, report)
}

pub fn fetch_page_listing<A: WikiHttp>(
    api: &mut A,
    wiki: &WikiConfig,
    continue_token: Option<&str>,
) -> FandomResult<PageListing> {
    let mut params = vec![
        ("action", "query".to_string()),
        ("list", "allpages".to_string()),
        ("aplimit", "max".to_string()),
    ];
    if let Some(token) = continue_token {
        params.push(("apcontinue", token.to_string()));
    }

    let response = api.call(&wiki.api_url(), &params)?;
    let parsed: AllPagesResponse = serde_json::from_value(response)
        .map_err(|err| FandomError::decode("allpages API response", err))?;

    Ok(PageListing {
        stubs: parsed.query.allpages,
        next: parsed
            .continuation
            .and_then(|cont| cont.apcontinue)
            .filter(|token| !token.is_empty()),
    })
}

pub fn fetch_page_metadata<A: WikiHttp>(
    api: &mut A,
    wiki: &WikiConfig,
    page_id: i64,
) -> FandomResult<PageMetadata> {
    let params = vec![
        ("action", "query".to_string()),
        ("pageids", page_id.to_string()),
        ("prop", "pageimages|categories".to_string()),
        ("pithumbsize", THUMBNAIL_SIZE.to_string()),
    ];

    let response = api.call(&wiki.api_url(), &params)?;
    let mut parsed: PageInfoResponse = serde_json::from_value(response)
        .map_err(|err| FandomError::decode("page info API response", err))?;
    let item = parsed
        .query
        .pages
        .remove(&page_id.to_string())
        .ok_or_else(|| {
            FandomError::decode(
                "page info API response",
                format!("page {page_id} missing from query.pages"),
            )
        })?;

    Ok(PageMetadata {
        thumbnail_url: item.thumbnail.and_then(|thumbnail| thumbnail.source),
        categories: item
            .categories
            .iter()
            .map(|category| strip_namespace_prefix(&category.title).to_string())
            .collect(),
    })
}

pub fn fetch_site_info<A: WikiHttp>(api: &mut A, wiki: &WikiConfig) -> FandomResult<SiteInfo> {
    let params = vec![
        ("action", "query".to_string()),
        ("meta", "siteinfo".to_string()),
        ("siprop", "general".to_string()),
    ];
    let response = api.call(&wiki.api_url(), &params)?;
    let parsed: SiteInfoResponse = serde_json::from_value(response)
        .map_err(|err| FandomError::decode("siteinfo API response", err))?;
    Ok(parsed.query.general)
}

#[derive(Debug, Deserialize)]
struct AllPagesResponse {
    query: AllPagesPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize)]
struct AllPagesPayload {
    allpages: Vec<PageStub>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    apcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageInfoResponse {
    query: PageInfoPayload,
}

#[derive(Debug, Deserialize)]
struct PageInfoPayload {
    #[serde(default)]
    pages: BTreeMap<String, PageInfoItem>,
}

#[derive(Debug, Deserialize)]
struct PageInfoItem {
    #[serde(default)]
    thumbnail: Option<ThumbnailPayload>,
    #[serde(default)]
    categories: Vec<CategoryItem>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailPayload {
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SiteInfoResponse {
    query: SiteInfoPayload,
}

#[derive(Debug, Deserialize)]
struct SiteInfoPayload {
    general: SiteInfo,
}
