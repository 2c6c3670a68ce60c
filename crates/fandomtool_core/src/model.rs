use serde::{Deserialize, Serialize};

pub const DEFAULT_WIKI_DOMAIN: &str = "fandom.com";

/// One configured wiki. Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiConfig {
    pub name: String,
    pub api_base_url: String,
}

impl WikiConfig {
    pub fn new(name: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `https://{name}.{domain}`
    pub fn for_fandom(name: &str, domain: &str) -> Self {
        Self::new(name, format!("https://{name}.{domain}"))
    }

    pub fn api_url(&self) -> String {
        format!("{}/api.php", self.api_base_url)
    }

    pub fn article_url(&self, title: &str) -> String {
        format!("{}/wiki/{}", self.api_base_url, title_to_path_segment(title))
    }
}

/// A harvested wiki page, persisted verbatim in the cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(rename = "pageid")]
    pub page_id: i64,
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub wiki_name: String,
    #[serde(default, rename = "thumbnail")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

pub type PageCollection = Vec<Page>;

/// Thumbnail and category data fetched for a single page id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub thumbnail_url: Option<String>,
    pub categories: Vec<String>,
}

pub fn title_to_path_segment(title: &str) -> String {
    title.replace(' ', "_")
}

/// `Category:Jedi Masters` -> `Jedi Masters`
pub fn strip_namespace_prefix(title: &str) -> &str {
    match title.rfind(':') {
        Some(index) => &title[index + 1..],
        None => title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_url_replaces_spaces() {
        let wiki = WikiConfig::for_fandom("starwars", DEFAULT_WIKI_DOMAIN);
        assert_eq!(wiki.api_url(), "https://starwars.fandom.com/api.php");
        assert_eq!(
            wiki.article_url("Luke Skywalker"),
            "https://starwars.fandom.com/wiki/Luke_Skywalker"
        );
    }

    #[test]
    fn article_url_keeps_edge_spaces_as_underscores() {
        let wiki = WikiConfig::for_fandom("starwars", DEFAULT_WIKI_DOMAIN);
        assert_eq!(
            wiki.article_url(" Yoda "),
            "https://starwars.fandom.com/wiki/_Yoda_"
        );
    }

    #[test]
    fn new_trims_trailing_slash() {
        let wiki = WikiConfig::new("local", "http://127.0.0.1:8080/");
        assert_eq!(wiki.api_url(), "http://127.0.0.1:8080/api.php");
    }

    #[test]
    fn strip_namespace_prefix_keeps_text_after_last_colon() {
        assert_eq!(strip_namespace_prefix("Category:Jedi"), "Jedi");
        assert_eq!(strip_namespace_prefix("Kategorie:A:B"), "B");
        assert_eq!(strip_namespace_prefix("Plain"), "Plain");
    }

    #[test]
    fn page_deserializes_with_absent_optional_fields() {
        let page: Page = serde_json::from_str(
            r#"{"pageid": 7, "title": "Yoda", "wiki_name": "starwars"}"#,
        )
        .expect("decode page");
        assert_eq!(page.page_id, 7);
        assert!(page.url.is_empty());
        assert!(page.thumbnail_url.is_none());
        assert!(page.categories.is_empty());
    }

    #[test]
    fn page_serializes_with_cache_field_names() {
        let page = Page {
            page_id: 1,
            title: "Yoda".to_string(),
            url: "https://starwars.fandom.com/wiki/Yoda".to_string(),
            wiki_name: "starwars".to_string(),
            thumbnail_url: None,
            categories: vec!["Jedi".to_string()],
        };
        let value = serde_json::to_value(&page).expect("encode page");
        assert_eq!(value["pageid"], 1);
        assert_eq!(value["wiki_name"], "starwars");
        assert!(value["thumbnail"].is_null());
        assert_eq!(value["categories"][0], "Jedi");
    }
}
