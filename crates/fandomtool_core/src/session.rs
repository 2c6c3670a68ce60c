use std::fs;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::WikiHttp;
use crate::cache::PageCache;
use crate::config::Settings;
use crate::error::{FandomError, FandomResult};
use crate::harvest::{WikiHarvestReport, harvest_all, never_stop};
use crate::icons::{IconBatchReport, download_icons, download_wiki_logos, resolve_icon};
use crate::model::{Page, PageCollection, WikiConfig};
use crate::runtime::ResolvedPaths;
use crate::search::{TextSearchInput, parse_text_search, search};
use crate::suggest::{Suggestion, SuggestionKind, describe, filter, page_suggestion};

pub const TARGET_SEARCH_PAGES: &str = "search_pages";
pub const TARGET_RELOAD_PAGES: &str = "reload_pages";
pub const TARGET_TEXT_SEARCH: &str = "text_search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    Cache,
    Harvest,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub source: PageSource,
    pub pages: usize,
    /// Whether the harvest replaced the collection and the cache file.
    pub saved: bool,
    pub harvest: Vec<WikiHarvestReport>,
    pub icons: Option<IconBatchReport>,
    pub logos: Option<IconBatchReport>,
}

impl RefreshReport {
    pub fn notification(&self) -> Suggestion {
        Suggestion::notification(
            "Pages reloaded",
            "The list of pages has been refreshed",
            "pages_reloaded",
        )
    }
}

/// Owns everything a launcher host needs between calls: settings, the
/// derived wiki list, the page collection and its cache mirror.
pub struct Session<A: WikiHttp> {
    api: A,
    settings: Settings,
    wikis: Vec<WikiConfig>,
    paths: ResolvedPaths,
    cache: PageCache,
    pages: PageCollection,
}

impl<A: WikiHttp> Session<A> {
    pub fn new(api: A, settings: Settings, paths: ResolvedPaths) -> Self {
        let wikis = settings.wikis();
        let cache = PageCache::new(&paths.cache_file);
        debug!(wikis = wikis.len(), "session created");
        Self {
            api,
            settings,
            wikis,
            paths,
            cache,
            pages: Vec::new(),
        }
    }

    pub fn pages(&self) -> &PageCollection {
        &self.pages
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn wikis(&self) -> &[WikiConfig] {
        &self.wikis
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Cache first; harvest and save only when the cache is absent or empty.
    pub fn refresh(&mut self) -> RefreshReport {
        self.refresh_with(&never_stop)
    }

    pub fn refresh_with(&mut self, should_stop: &dyn Fn() -> bool) -> RefreshReport {
        match self.cache.load() {
            Some(pages) if !pages.is_empty() => {
                info!(pages = pages.len(), "using cached pages");
                self.pages = pages;
                let (icons, logos) = self.download_icons_if_enabled(false, should_stop);
                RefreshReport {
                    source: PageSource::Cache,
                    pages: self.pages.len(),
                    saved: false,
                    harvest: Vec::new(),
                    icons,
                    logos,
                }
            }
            _ => {
                debug!("no cached pages found, fetching from wikis");
                self.harvest_and_save(should_stop)
            }
        }
    }

    /// Explicit reload trigger: re-harvests regardless of the cache. The
    /// previous collection survives a harvest that yields nothing usable.
    pub fn reload(&mut self) -> RefreshReport {
        self.reload_with(&never_stop)
    }

    pub fn reload_with(&mut self, should_stop: &dyn Fn() -> bool) -> RefreshReport {
        info!("reloading pages from wikis");
        self.harvest_and_save(should_stop)
    }

    /// Replace settings. A changed wiki list invalidates the cache.
    pub fn on_config_changed(&mut self, settings: Settings) -> RefreshReport {
        let wikis_changed = settings.wiki_names != self.settings.wiki_names
            || settings.domain != self.settings.domain;
        self.wikis = settings.wikis();
        self.settings = settings;
        if wikis_changed {
            info!(wikis = self.wikis.len(), "configured wikis changed, discarding cache");
            self.pages.clear();
            if let Err(err) = self.cache.clear() {
                warn!(error = %err, "failed to discard page cache");
            }
        }
        self.refresh()
    }

    /// Catalog entries: every page in global-results mode, plus the fixed
    /// command entries.
    pub fn list_all_suggestions(&self) -> Vec<Suggestion> {
        let mut catalog = Vec::new();
        if self.settings.search_mode_enabled {
            catalog.extend(
                self.pages
                    .iter()
                    .map(|page| self.page_suggestion(page)),
            );
        } else {
            catalog.push(Suggestion::command(
                "FandomWiki: Search pages",
                "Search pages across all configured wikis",
                TARGET_SEARCH_PAGES,
            ));
        }
        catalog.push(Suggestion::command(
            "FandomWiki: Reload pages",
            "Reload list of pages from all wikis",
            TARGET_RELOAD_PAGES,
        ));
        catalog.push(Suggestion::command(
            "FandomWiki: Text search",
            "Search for content across wikis",
            TARGET_TEXT_SEARCH,
        ));
        catalog
    }

    pub fn search(&self, query: &str) -> Vec<Suggestion> {
        filter(query, &self.pages, self.settings.search_mode_enabled)
            .into_iter()
            .map(|page| self.page_suggestion(page))
            .collect()
    }

    /// Live full-text search for `"<wiki> <term>"`. Failures come back as a
    /// single error suggestion.
    pub fn text_search(&mut self, input: &str) -> Vec<Suggestion> {
        let (wiki, term) = match parse_text_search(input, &self.wikis) {
            TextSearchInput::Incomplete => return Vec::new(),
            TextSearchInput::UnknownWiki(name) => {
                debug!(wiki = name, "text search for unknown wiki");
                return vec![Suggestion::error(
                    "Invalid wiki",
                    "Please enter a valid wiki name followed by your search term",
                )];
            }
            TextSearchInput::Query { wiki, term } => (wiki.clone(), term.to_string()),
        };

        match search(&mut self.api, &wiki, &term) {
            Ok(hits) => hits
                .into_iter()
                .map(|hit| Suggestion {
                    kind: SuggestionKind::Page,
                    label: hit.title,
                    description: describe(&wiki.name, &hit.snippet, self.settings.show_wiki_name),
                    target: hit.url,
                    icon: resolve_icon(&self.paths.icons_dir, &wiki.name, hit.page_id),
                })
                .collect(),
            Err(err) => {
                warn!(wiki = %wiki.name, error = %err, "error performing text search");
                vec![Suggestion::error(
                    "Search error",
                    format!("An error occurred while searching {}: {err}", wiki.name),
                )]
            }
        }
    }

    fn page_suggestion(&self, page: &Page) -> Suggestion {
        page_suggestion(
            page,
            Some(self.paths.icons_dir.as_path()),
            self.settings.show_wiki_name,
        )
    }

    fn harvest_and_save(&mut self, should_stop: &dyn Fn() -> bool) -> RefreshReport {
        let outcome = harvest_all(&mut self.api, &self.wikis, should_stop);
        let completed = outcome
            .reports
            .iter()
            .any(|report| report.error.is_none() && !report.stopped);
        let failed_wikis = outcome.failed_wikis();
        if completed {
            self.pages = outcome.pages;
            self.cache.save(&self.pages);
            info!(
                pages = self.pages.len(),
                failed_wikis,
                "pages harvested and saved to cache"
            );
        } else {
            warn!(
                harvested = outcome.pages.len(),
                kept = self.pages.len(),
                failed_wikis,
                "no wiki finished harvesting, keeping previous pages"
            );
        }
        let (icons, logos) = if completed {
            self.download_icons_if_enabled(true, should_stop)
        } else {
            (None, None)
        };
        RefreshReport {
            source: PageSource::Harvest,
            pages: self.pages.len(),
            saved: completed,
            harvest: outcome.reports,
            icons,
            logos,
        }
    }

    /// Page thumbnails only touch the download path; wiki logos need a
    /// `meta=siteinfo` call each, so they run after a harvest only.
    fn download_icons_if_enabled(
        &mut self,
        with_logos: bool,
        should_stop: &dyn Fn() -> bool,
    ) -> (Option<IconBatchReport>, Option<IconBatchReport>) {
        if !self.settings.download_icons_enabled {
            return (None, None);
        }
        let icons_dir = self.paths.icons_dir.clone();
        if let Err(err) = fs::create_dir_all(&icons_dir) {
            warn!(path = %icons_dir.display(), error = %err, "skipping icon downloads");
            return (None, None);
        }
        let logos =
            with_logos.then(|| download_wiki_logos(&mut self.api, &self.wikis, &icons_dir));
        let icons = download_icons(&mut self.api, &self.pages, &icons_dir, should_stop);
        (Some(icons), logos)
    }

    /// Wiki logos first, then one icon per page thumbnail. Ignores the
    /// `download_icons` setting.
    pub fn download_icons(
        &mut self,
        should_stop: &dyn Fn() -> bool,
    ) -> FandomResult<(IconBatchReport, IconBatchReport)> {
        let icons_dir = self.paths.icons_dir.clone();
        fs::create_dir_all(&icons_dir).map_err(|err| FandomError::io(&icons_dir, err))?;
        let logos = download_wiki_logos(&mut self.api, &self.wikis, &icons_dir);
        let icons = download_icons(&mut self.api, &self.pages, &icons_dir, should_stop);
        Ok((icons, logos))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::testing::{MockApi, allpages_response, page_info_response};

    fn settings(wikis: &[&str], global_results: bool) -> Settings {
        Settings {
            search_mode_enabled: global_results,
            show_wiki_name: true,
            download_icons_enabled: false,
            wiki_names: wikis.iter().map(ToString::to_string).collect(),
            domain: "example.org".to_string(),
        }
    }

    fn scripted_api(wiki: &WikiConfig, pages: &[(i64, &str)]) -> MockApi {
        let mut api = MockApi::default();
        api.script_listing(wiki, allpages_response(pages, None));
        for (id, _) in pages {
            api.script_metadata(wiki, *id, page_info_response(*id, None, &["Category:Jedi"]));
        }
        api
    }

    #[test]
    fn refresh_harvests_then_saves_cache() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let settings = settings(&["starwars"], false);
        let api = scripted_api(&settings.wikis()[0], &[(1, "Yoda"), (2, "Rey")]);
        let mut session = Session::new(api, settings, paths.clone());

        let report = session.refresh();

        assert_eq!(report.source, PageSource::Harvest);
        assert_eq!(report.pages, 2);
        let cached = PageCache::new(&paths.cache_file).load().expect("cache written");
        assert_eq!(&cached, session.pages());
    }

    #[test]
    fn refresh_prefers_cache_without_network() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let cached = vec![Page {
            page_id: 5,
            title: "Cached".to_string(),
            url: "https://starwars.example.org/wiki/Cached".to_string(),
            wiki_name: "starwars".to_string(),
            thumbnail_url: None,
            categories: Vec::new(),
        }];
        PageCache::new(&paths.cache_file).write(&cached).expect("seed cache");
        let mut session = Session::new(MockApi::default(), settings(&["starwars"], false), paths);

        let report = session.refresh();

        assert_eq!(report.source, PageSource::Cache);
        assert_eq!(session.pages(), &cached);
        assert_eq!(session.api().request_count(), 0);
    }

    #[test]
    fn cached_refresh_with_icons_enabled_makes_no_api_calls() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let cached = vec![Page {
            page_id: 5,
            title: "Cached".to_string(),
            url: "https://starwars.example.org/wiki/Cached".to_string(),
            wiki_name: "starwars".to_string(),
            thumbnail_url: Some("https://img.example.org/cached.png".to_string()),
            categories: Vec::new(),
        }];
        PageCache::new(&paths.cache_file).write(&cached).expect("seed cache");
        let mut settings = settings(&["starwars"], false);
        settings.download_icons_enabled = true;
        let mut session = Session::new(MockApi::default(), settings, paths);

        let report = session.refresh();

        assert_eq!(report.source, PageSource::Cache);
        assert!(report.logos.is_none());
        assert_eq!(report.icons.map(|icons| icons.failed), Some(1));
        assert!(session.api().calls.is_empty());
        assert_eq!(
            session.api().download_calls,
            vec!["https://img.example.org/cached.png".to_string()]
        );
    }

    #[test]
    fn failed_reload_keeps_previous_pages_and_cache() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let cached = vec![Page {
            page_id: 1,
            title: "Yoda".to_string(),
            url: "https://starwars.example.org/wiki/Yoda".to_string(),
            wiki_name: "starwars".to_string(),
            thumbnail_url: None,
            categories: vec!["Jedi".to_string()],
        }];
        PageCache::new(&paths.cache_file).write(&cached).expect("seed cache");
        let mut session =
            Session::new(MockApi::default(), settings(&["starwars"], false), paths.clone());
        session.refresh();

        let report = session.reload();

        assert!(!report.saved);
        assert!(report.harvest[0].error.is_some());
        assert_eq!(session.pages(), &cached);
        assert_eq!(PageCache::new(&paths.cache_file).load(), Some(cached));
    }

    #[test]
    fn corrupt_cache_triggers_harvest() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        fs::write(&paths.cache_file, "[{\"pageid\":").expect("corrupt cache");
        let settings = settings(&["starwars"], false);
        let api = scripted_api(&settings.wikis()[0], &[(1, "Yoda")]);
        let mut session = Session::new(api, settings, paths);

        let report = session.refresh();

        assert_eq!(report.source, PageSource::Harvest);
        assert_eq!(session.pages().len(), 1);
    }

    #[test]
    fn reload_ignores_cache_and_returns_notification() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let settings = settings(&["starwars"], false);
        let wiki = settings.wikis()[0].clone();
        let mut api = scripted_api(&wiki, &[(1, "Yoda")]);
        api.script_listing(&wiki, allpages_response(&[(1, "Yoda"), (2, "Ahsoka")], None));
        api.script_metadata(&wiki, 2, page_info_response(2, None, &[]));
        let mut session = Session::new(api, settings, paths);
        session.refresh();

        let report = session.reload();

        assert_eq!(report.source, PageSource::Harvest);
        assert_eq!(session.pages().len(), 2);
        assert_eq!(report.notification().kind, SuggestionKind::Notification);
    }

    #[test]
    fn config_change_with_new_wikis_discards_cache() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let first = settings(&["starwars"], false);
        let second = settings(&["starwars", "lotr"], false);
        let mut api = scripted_api(&first.wikis()[0], &[(1, "Yoda")]);
        let lotr = second.wikis()[1].clone();
        api.script_listing(&first.wikis()[0], allpages_response(&[(1, "Yoda")], None));
        api.script_listing(&lotr, allpages_response(&[(9, "Frodo")], None));
        api.script_metadata(&lotr, 9, page_info_response(9, None, &[]));
        let mut session = Session::new(api, first, paths);
        session.refresh();

        let report = session.on_config_changed(second);

        assert_eq!(report.source, PageSource::Harvest);
        let wikis = session
            .pages()
            .iter()
            .map(|page| page.wiki_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(wikis, vec!["starwars", "lotr"]);
    }

    #[test]
    fn catalog_lists_pages_only_in_global_mode() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let global = settings(&["starwars"], true);
        let api = scripted_api(&global.wikis()[0], &[(1, "Yoda"), (2, "Rey")]);
        let mut session = Session::new(api, global, paths);
        session.refresh();

        let catalog = session.list_all_suggestions();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog[0].label, "Yoda");
        assert_eq!(catalog[0].description, "[starwars] Jedi");
        assert_eq!(catalog[3].target, TARGET_TEXT_SEARCH);

        session.settings.search_mode_enabled = false;
        let catalog = session.list_all_suggestions();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog[0].target, TARGET_SEARCH_PAGES);
    }

    #[test]
    fn search_filters_loaded_pages() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let settings = settings(&["starwars"], false);
        let api = scripted_api(&settings.wikis()[0], &[(1, "Yoda"), (2, "Rey")]);
        let mut session = Session::new(api, settings, paths);
        session.refresh();

        let results = session.search("yo");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target, "https://starwars.example.org/wiki/Yoda");
        assert!(!results[0].has_custom_icon());
    }

    #[test]
    fn text_search_errors_become_single_error_suggestion() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let mut session = Session::new(MockApi::default(), settings(&["starwars"], false), paths);

        let failed = session.text_search("star vader");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, SuggestionKind::Error);
        assert_eq!(failed[0].label, "Search error");

        let unknown = session.text_search("trek spock");
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].label, "Invalid wiki");

        assert!(session.text_search("star").is_empty());
    }

    #[test]
    fn download_icons_writes_page_icon_and_resolves_it() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let settings = settings(&["starwars"], false);
        let wiki = settings.wikis()[0].clone();
        let mut api = MockApi::default();
        api.script_listing(&wiki, allpages_response(&[(4, "Yoda")], None));
        api.script_metadata(
            &wiki,
            4,
            page_info_response(4, Some("https://img.example.org/yoda.png"), &[]),
        );
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgba8(40, 20)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        api.script_download("https://img.example.org/yoda.png", bytes);
        let mut session = Session::new(api, settings, paths.clone());
        session.refresh();

        let (icons, logos) = session.download_icons(&never_stop).expect("icon batch");

        assert_eq!(icons.written, 1);
        assert_eq!(logos.failed, 1);
        let siteinfo_calls = session
            .api()
            .calls
            .iter()
            .filter(|(_, params)| params.iter().any(|(key, value)| key == "meta" && value == "siteinfo"))
            .count();
        assert_eq!(siteinfo_calls, 1);
        assert!(paths.icons_dir.join("starwars-4.png").is_file());
        assert!(session.search("yoda")[0].has_custom_icon());
    }

    #[test]
    fn text_search_maps_hits() {
        let temp = tempdir().expect("tempdir");
        let paths = ResolvedPaths::for_cache_dir(temp.path());
        let settings = settings(&["starwars"], false);
        let mut api = MockApi::default();
        api.script_search(
            &settings.wikis()[0],
            json!({"query": {"search": [{"title": "Darth Vader", "pageid": 3, "snippet": "Sith <b>lord</b>"}]}}),
        );
        let mut session = Session::new(api, settings, paths);

        let results = session.text_search("wars vader");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].description, "[starwars] Sith lord");
        assert_eq!(results[0].target, "https://starwars.example.org/wiki/Darth_Vader");
    }
}
