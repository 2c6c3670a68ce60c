use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toml::Value;

use crate::api::RequestMethod;
use crate::model::{DEFAULT_WIKI_DOMAIN, WikiConfig};

pub const DEFAULT_USER_AGENT: &str = "fandomtool/0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ToolConfig {
    #[serde(default)]
    pub main: MainSection,
    #[serde(default)]
    pub http: HttpSection,
}

/// Host-facing settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MainSection {
    #[serde(default)]
    pub global_results: bool,
    #[serde(default = "default_true")]
    pub show_wiki_name: bool,
    #[serde(default = "default_true")]
    pub download_icons: bool,
    /// Comma-separated wiki subdomains.
    #[serde(default)]
    pub wikis: String,
}

impl Default for MainSection {
    fn default() -> Self {
        Self {
            global_results: false,
            show_wiki_name: true,
            download_icons: true,
            wikis: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub method: Option<RequestMethod>,
    pub domain: Option<String>,
}

/// Resolved settings handed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub search_mode_enabled: bool,
    pub show_wiki_name: bool,
    pub download_icons_enabled: bool,
    pub wiki_names: Vec<String>,
    pub domain: String,
}

impl Default for Settings {
    fn default() -> Self {
        ToolConfig::default().settings()
    }
}

impl Settings {
    pub fn wikis(&self) -> Vec<WikiConfig> {
        self.wiki_names
            .iter()
            .map(|name| WikiConfig::for_fandom(name, &self.domain))
            .collect()
    }
}

fn default_true() -> bool {
    true
}

impl ToolConfig {
    /// Wiki names: env FANDOM_WIKIS > config.
    pub fn wiki_names(&self) -> Vec<String> {
        if let Ok(value) = env::var("FANDOM_WIKIS")
            && !value.trim().is_empty()
        {
            return parse_wiki_list(&value);
        }
        parse_wiki_list(&self.main.wikis)
    }

    /// Resolve user agent: env FANDOM_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Ok(value) = env::var("FANDOM_USER_AGENT") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.http
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn domain(&self) -> String {
        self.http
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .unwrap_or(DEFAULT_WIKI_DOMAIN)
            .to_string()
    }

    pub fn settings(&self) -> Settings {
        Settings {
            search_mode_enabled: self.main.global_results,
            show_wiki_name: self.main.show_wiki_name,
            download_icons_enabled: self.main.download_icons,
            wiki_names: self.wiki_names(),
            domain: self.domain(),
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn parse_wiki_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Load and parse a ToolConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ToolConfig> {
    if !config_path.exists() {
        return Ok(ToolConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ToolConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Rewrite `[main].wikis` while preserving all other config sections.
/// Returns `true` when a write occurred.
pub fn set_wikis(config_path: &Path, names: &[String]) -> Result<bool> {
    let mut root = if config_path.exists() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        toml::from_str::<Value>(&content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?
    } else {
        Value::Table(Default::default())
    };
    let original = root.clone();

    let root_table = root.as_table_mut().ok_or_else(|| {
        anyhow::anyhow!(
            "top-level TOML must be a table in {}",
            config_path.display()
        )
    })?;
    let main_entry = root_table
        .entry("main".to_string())
        .or_insert_with(|| Value::Table(Default::default()));
    let main_table = main_entry
        .as_table_mut()
        .ok_or_else(|| anyhow::anyhow!("[main] must be a table in {}", config_path.display()))?;

    let joined = names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    main_table.insert("wikis".to_string(), Value::String(joined));

    if root == original {
        return Ok(false);
    }

    let parent = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", config_path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    let rendered = toml::to_string_pretty(&root).context("failed to serialize config TOML")?;
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}
