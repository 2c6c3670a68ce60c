use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use fandomtool_core::api::{MediaWikiClient, MediaWikiClientConfig};
use fandomtool_core::config::{Settings, ToolConfig, load_config, parse_wiki_list, set_wikis};
use fandomtool_core::harvest::never_stop;
use fandomtool_core::icons::IconBatchReport;
use fandomtool_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, inspect_runtime, resolve_paths,
};
use fandomtool_core::session::{PageSource, RefreshReport, Session};
use fandomtool_core::suggest::Suggestion;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "fandomtool",
    version,
    about = "Search page titles and content across Fandom wikis"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    cache_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(long, global = true, help = "Print collections as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            cache_dir: cli.cache_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
            json: cli.json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Load pages from the cache, harvesting when it is empty")]
    Refresh,
    #[command(about = "Discard the cache and harvest every wiki again")]
    Reload,
    #[command(about = "Print the launcher catalog")]
    List,
    #[command(about = "Filter loaded pages by title, category, or wiki name")]
    Suggest(SuggestArgs),
    #[command(about = "Live full-text search on one wiki")]
    Search(SearchArgs),
    #[command(about = "Download wiki logos and page icons")]
    Icons,
    #[command(about = "Show cache, icon, and config state")]
    Status,
    #[command(about = "List or replace the configured wikis")]
    Wikis(WikisArgs),
}

#[derive(Debug, Args)]
struct SuggestArgs {
    #[arg(default_value = "")]
    query: String,
}

#[derive(Debug, Args)]
struct SearchArgs {
    wiki: String,
    #[arg(required = true, num_args = 1..)]
    term: Vec<String>,
}

#[derive(Debug, Args)]
struct WikisArgs {
    #[command(subcommand)]
    command: WikisSubcommand,
}

#[derive(Debug, Subcommand)]
enum WikisSubcommand {
    #[command(about = "Print configured wikis and their API endpoints")]
    List,
    #[command(about = "Replace [main].wikis in the config file")]
    Set {
        #[arg(required = true, num_args = 1.., help = "Wiki subdomains, space or comma separated")]
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Refresh) => run_refresh(&runtime),
        Some(Commands::Reload) => run_reload(&runtime),
        Some(Commands::List) => run_list(&runtime),
        Some(Commands::Suggest(args)) => run_suggest(&runtime, &args.query),
        Some(Commands::Search(args)) => run_search(&runtime, args),
        Some(Commands::Icons) => run_icons(&runtime),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Wikis(WikisArgs { command })) => match command {
            WikisSubcommand::List => run_wikis_list(&runtime),
            WikisSubcommand::Set { names } => run_wikis_set(&runtime, &names),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_new("debug")
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))
    }
    .context("invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to install log subscriber: {error}"))
}

fn run_refresh(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, mut session) = open_session(runtime)?;
    let report = session.refresh();
    print_refresh_report("refresh", runtime, &paths, &report)
}

fn run_reload(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, mut session) = open_session(runtime)?;
    let report = session.reload();
    print_refresh_report("reload", runtime, &paths, &report)?;
    if !runtime.json {
        println!("notification: {}", report.notification().label);
    }
    Ok(())
}

fn run_list(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, mut session) = open_session(runtime)?;
    session.refresh();
    print_suggestions(runtime, &session.list_all_suggestions())?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_suggest(runtime: &RuntimeOptions, query: &str) -> Result<()> {
    let (paths, mut session) = open_session(runtime)?;
    session.refresh();
    print_suggestions(runtime, &session.search(query))?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_search(runtime: &RuntimeOptions, args: SearchArgs) -> Result<()> {
    let (paths, mut session) = open_session(runtime)?;
    if session.wikis().is_empty() {
        bail!(
            "no wikis configured; run `fandomtool wikis set <names>` or set FANDOM_WIKIS\nconfig: {}",
            normalize_path(&paths.config_path)
        );
    }
    let input = format!("{} {}", args.wiki, args.term.join(" "));
    print_suggestions(runtime, &session.text_search(&input))?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_icons(runtime: &RuntimeOptions) -> Result<()> {
    let (paths, mut session) = open_session_with(runtime, |settings| {
        settings.download_icons_enabled = false;
    })?;
    session.refresh();
    let (icons, logos) = session
        .download_icons(&never_stop)
        .context("failed to run icon batch")?;

    if runtime.json {
        #[derive(Serialize)]
        struct IconsOutput<'a> {
            icons: &'a IconBatchReport,
            logos: &'a IconBatchReport,
        }
        let output = IconsOutput {
            icons: &icons,
            logos: &logos,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("icons");
        println!("icons_dir: {}", normalize_path(&paths.icons_dir));
        print_icon_report("icons", &icons);
        print_icon_report("logos", &logos);
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    let config = load_config(&paths.config_path)?;
    let settings = config.settings();

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("cache_file: {}", normalize_path(&paths.cache_file));
    println!("cache_exists: {}", format_flag(status.cache_exists));
    println!(
        "cache_size_bytes: {}",
        status
            .cache_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("icons_dir_exists: {}", format_flag(status.icons_dir_exists));
    println!("icon_count: {}", status.icon_count);
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("wikis.count: {}", settings.wiki_names.len());
    println!("domain: {}", settings.domain);
    println!("global_results: {}", format_flag(settings.search_mode_enabled));
    println!("show_wiki_name: {}", format_flag(settings.show_wiki_name));
    println!(
        "download_icons: {}",
        format_flag(settings.download_icons_enabled)
    );
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_wikis_list(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = load_config(&paths.config_path)?.settings();

    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&settings.wikis())?);
    } else {
        println!("wikis.count: {}", settings.wiki_names.len());
        if settings.wiki_names.is_empty() {
            println!("wikis: <none>");
        }
        for wiki in settings.wikis() {
            println!("wikis.name: {} ({})", wiki.name, wiki.api_url());
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_wikis_set(runtime: &RuntimeOptions, names: &[String]) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let names = names
        .iter()
        .flat_map(|value| parse_wiki_list(value))
        .collect::<Vec<_>>();
    if names.is_empty() {
        bail!("at least one wiki name is required");
    }

    let (_, mut session) = open_session(runtime)?;
    let changed = set_wikis(&paths.config_path, &names)?;
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("wikis: {}", names.join(", "));
    println!("changed: {}", format_flag(changed));
    if changed {
        let settings = load_config(&paths.config_path)?.settings();
        let report = session.on_config_changed(settings);
        println!("pages: {}", report.pages);
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn open_session(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, Session<MediaWikiClient>)> {
    open_session_with(runtime, |_| {})
}

fn open_session_with(
    runtime: &RuntimeOptions,
    adjust: impl FnOnce(&mut Settings),
) -> Result<(ResolvedPaths, Session<MediaWikiClient>)> {
    let paths = resolve_runtime_paths(runtime)?;
    let config: ToolConfig = load_config(&paths.config_path)?;
    let mut settings = config.settings();
    adjust(&mut settings);
    if settings.wiki_names.is_empty() {
        debug!(config = %normalize_path(&paths.config_path), "no wikis configured");
    }
    let client = MediaWikiClient::new(MediaWikiClientConfig::from_config(&config))?;
    let session = Session::new(client, settings, paths.clone());
    Ok((paths, session))
}

fn print_refresh_report(
    label: &str,
    runtime: &RuntimeOptions,
    paths: &ResolvedPaths,
    report: &RefreshReport,
) -> Result<()> {
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{label}");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("cache_file: {}", normalize_path(&paths.cache_file));
    println!(
        "source: {}",
        match report.source {
            PageSource::Cache => "cache",
            PageSource::Harvest => "harvest",
        }
    );
    println!("pages: {}", report.pages);
    println!("saved: {}", format_flag(report.saved));
    for wiki in &report.harvest {
        println!(
            "harvest.{}: pages={} requests={} metadata_failures={} elapsed_ms={}{}",
            wiki.wiki_name,
            wiki.pages,
            wiki.listing_requests,
            wiki.metadata_failures,
            wiki.elapsed_ms,
            wiki.error
                .as_deref()
                .map(|error| format!(" error={error}"))
                .unwrap_or_default()
        );
    }
    if let Some(icons) = &report.icons {
        print_icon_report("icons", icons);
    }
    if let Some(logos) = &report.logos {
        print_icon_report("logos", logos);
    }
    print_diagnostics(runtime, paths);
    Ok(())
}

fn print_icon_report(label: &str, report: &IconBatchReport) {
    println!(
        "{label}: written={} skipped={} failed={} without_thumbnail={}",
        report.written, report.skipped, report.failed, report.without_thumbnail
    );
}

fn print_suggestions(runtime: &RuntimeOptions, suggestions: &[Suggestion]) -> Result<()> {
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(suggestions)?);
        return Ok(());
    }

    println!("suggestions.count: {}", suggestions.len());
    if suggestions.is_empty() {
        println!("suggestions: <none>");
    }
    for suggestion in suggestions {
        println!("suggestion.label: {}", suggestion.label);
        println!("  description: {}", suggestion.description);
        println!("  target: {}", suggestion.target);
        if let Some(icon) = suggestion.icon.path() {
            println!("  icon: {}", normalize_path(icon));
        }
    }
    Ok(())
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics && !runtime.json {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        cache_dir: runtime.cache_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
