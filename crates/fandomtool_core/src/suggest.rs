use std::path::Path;

use serde::Serialize;

use crate::icons::{IconSource, resolve_icon};
use crate::model::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Page,
    Error,
    Notification,
    /// Fixed launcher entries such as "Reload pages".
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub label: String,
    pub description: String,
    /// URL for pages, command name for commands, label for errors.
    pub target: String,
    pub icon: IconSource,
}

impl Suggestion {
    pub fn error(label: &str, description: impl Into<String>) -> Self {
        Self {
            kind: SuggestionKind::Error,
            label: label.to_string(),
            description: description.into(),
            target: label.to_string(),
            icon: IconSource::Default,
        }
    }

    pub fn notification(label: &str, description: &str, target: &str) -> Self {
        Self {
            kind: SuggestionKind::Notification,
            label: label.to_string(),
            description: description.to_string(),
            target: target.to_string(),
            icon: IconSource::Default,
        }
    }

    pub fn has_custom_icon(&self) -> bool {
        !matches!(self.icon, IconSource::Default)
    }

    pub fn command(label: &str, description: &str, target: &str) -> Self {
        Self {
            kind: SuggestionKind::Command,
            label: label.to_string(),
            description: description.to_string(),
            target: target.to_string(),
            icon: IconSource::Default,
        }
    }
}

/// Case-insensitive substring match on title, any category, or wiki name.
///
/// An empty query returns the whole collection in global-results mode and
/// nothing otherwise. Order is the collection's insertion order.
pub fn filter<'a>(query: &str, pages: &'a [Page], global_results: bool) -> Vec<&'a Page> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return if global_results {
            pages.iter().collect()
        } else {
            Vec::new()
        };
    }
    pages
        .iter()
        .filter(|page| page_matches(page, &needle))
        .collect()
}

fn page_matches(page: &Page, needle: &str) -> bool {
    page.title.to_lowercase().contains(needle)
        || page
            .categories
            .iter()
            .any(|category| category.to_lowercase().contains(needle))
        || page.wiki_name.to_lowercase().contains(needle)
}

/// `[wiki] cat1, cat2`, without the bracketed prefix when `show_wiki_name` is off.
pub fn describe(wiki_name: &str, detail: &str, show_wiki_name: bool) -> String {
    if show_wiki_name {
        format!("[{wiki_name}] {detail}")
    } else {
        detail.to_string()
    }
}

pub fn page_suggestion(page: &Page, icons_dir: Option<&Path>, show_wiki_name: bool) -> Suggestion {
    Suggestion {
        kind: SuggestionKind::Page,
        label: page.title.clone(),
        description: describe(&page.wiki_name, &page.categories.join(", "), show_wiki_name),
        target: page.url.clone(),
        icon: icons_dir
            .map(|dir| resolve_icon(dir, &page.wiki_name, page.page_id))
            .unwrap_or(IconSource::Default),
    }
}
