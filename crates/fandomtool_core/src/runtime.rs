use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_DIR_NAME: &str = ".fandomtool";
pub const CACHE_FILENAME: &str = "pages_cache.json";
pub const ICONS_DIR_NAME: &str = "icons";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_file: PathBuf,
    pub icons_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub cache_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Layout rooted at `cache_dir`, used by embedding hosts that hand over a
    /// package cache path directly.
    pub fn for_cache_dir(cache_dir: &Path) -> Self {
        let state_dir = cache_dir.to_path_buf();
        Self {
            project_root: cache_dir.to_path_buf(),
            config_path: state_dir.join("config.toml"),
            cache_file: cache_dir.join(CACHE_FILENAME),
            icons_dir: cache_dir.join(ICONS_DIR_NAME),
            cache_dir: cache_dir.to_path_buf(),
            state_dir,
            root_source: ValueSource::Flag,
            cache_source: ValueSource::Flag,
            config_source: ValueSource::Default,
        }
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\ncache_dir={} ({})\ncache_file={}\nicons_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.cache_dir),
            self.cache_source.as_str(),
            normalize_for_display(&self.cache_file),
            normalize_for_display(&self.icons_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub cache_exists: bool,
    pub cache_size_bytes: Option<u64>,
    pub icons_dir_exists: bool,
    pub icon_count: usize,
    pub config_exists: bool,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> Result<RuntimeStatus> {
    let cache_exists = paths.cache_file.exists();
    let cache_size_bytes = if cache_exists {
        let metadata = fs::metadata(&paths.cache_file)
            .with_context(|| format!("failed to inspect {}", paths.cache_file.display()))?;
        Some(metadata.len())
    } else {
        None
    };

    let icons_dir_exists = paths.icons_dir.is_dir();
    let icon_count = if icons_dir_exists {
        fs::read_dir(&paths.icons_dir)
            .with_context(|| format!("failed to list {}", paths.icons_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|extension| extension == "png")
            })
            .count()
    } else {
        0
    };

    Ok(RuntimeStatus {
        cache_exists,
        cache_size_bytes,
        icons_dir_exists,
        icon_count,
        config_exists: paths.config_path.exists(),
    })
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, &context.cwd), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("FANDOMTOOL_PROJECT_ROOT")) {
        (absolutize(Path::new(&value), &context.cwd), ValueSource::Env)
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };

    let state_dir = project_root.join(STATE_DIR_NAME);

    let (cache_dir, cache_source) = if let Some(path) = overrides.cache_dir.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("FANDOMTOOL_CACHE_DIR")) {
        (absolutize(Path::new(&value), &project_root), ValueSource::Env)
    } else {
        (state_dir.join("cache"), ValueSource::Default)
    };

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("FANDOMTOOL_CONFIG")) {
        (absolutize(Path::new(&value), &project_root), ValueSource::Env)
    } else {
        (state_dir.join("config.toml"), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        cache_file: cache_dir.join(CACHE_FILENAME),
        icons_dir: cache_dir.join(ICONS_DIR_NAME),
        project_root,
        state_dir,
        cache_dir,
        config_path,
        root_source,
        cache_source,
        config_source,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
