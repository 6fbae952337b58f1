use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{parse_strategy_list, DocumentId, PdfRecord, PdfUpdate, Strategy, ViewerSettings};
use log::{debug, LevelFilter};
use metadata_client::{HttpMetadataStore, MetadataStore};
use preview_scheduler::{PreviewHandle, ScriptedSurface};
use serde::Serialize;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use storage::{set_setting, Storage};
use viewer_core::{resolve, DocumentRef, PreviewPolicy};

const SIMULATED_DOCUMENT: &str = "https://example.com/simulated.pdf";

#[derive(Debug, Parser)]
#[command(name = "pdfshelf")]
#[command(about = "PDF library manager and preview loader")]
pub struct Cli {
    /// Enable debug logging on stderr.
    #[arg(long, global = true)]
    verbose: bool,
    /// Backend base URL, overriding the configured one.
    #[arg(long, global = true, value_name = "URL")]
    backend: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List documents in the library.
    List {
        #[arg(long)]
        favorites: bool,
        #[arg(long)]
        json: bool,
    },
    /// Print one document's metadata.
    Show { id: String },
    /// Toggle a document's favorite flag.
    Favorite { id: String },
    /// Rename a document.
    Rename { id: String, name: String },
    /// Delete a document.
    Delete { id: String },
    /// Print library statistics.
    Stats,
    /// Show what each configured strategy would load for a document.
    Plan { id: String },
    /// Inspect or change persisted viewer settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Run the preview loader against a scripted surface.
    Simulate {
        /// Comma-separated outcomes, one per load: loaded, partial, silent,
        /// fail or fail:<reason>, each optionally suffixed with @<millis>.
        #[arg(long, value_name = "LIST")]
        outcomes: String,
        #[arg(long, value_name = "N")]
        timeout_ms: Option<u64>,
        #[arg(long, value_name = "N")]
        max_attempts: Option<u32>,
        #[arg(long, value_name = "LIST")]
        strategies: Option<String>,
        /// Document URL handed to the surface.
        #[arg(long, default_value = SIMULATED_DOCUMENT)]
        url: String,
        /// Print controller counters after the session settles.
        #[arg(long)]
        stats: bool,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Print effective settings, environment overrides included.
    Show,
    /// Remove persisted settings.
    Reset,
    /// Persist one setting.
    Set { key: String, value: String },
}

#[derive(Debug, Serialize)]
struct PlanEntry {
    strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unavailable: Option<String>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::List { favorites, json } => run_list(cli.backend.as_deref(), favorites, json),
        Commands::Show { id } => run_show(cli.backend.as_deref(), &DocumentId::new(id)),
        Commands::Favorite { id } => run_favorite(cli.backend.as_deref(), &DocumentId::new(id)),
        Commands::Rename { id, name } => {
            run_rename(cli.backend.as_deref(), &DocumentId::new(id), &name)
        }
        Commands::Delete { id } => {
            let id = DocumentId::new(id);
            client(cli.backend.as_deref())?
                .delete_document(&id)
                .with_context(|| format!("failed to delete {id}"))?;
            println!("deleted {id}");
            Ok(())
        }
        Commands::Stats => run_stats(cli.backend.as_deref()),
        Commands::Plan { id } => run_plan(cli.backend.as_deref(), &DocumentId::new(id)),
        Commands::Settings { action } => run_settings(action),
        Commands::Simulate { outcomes, timeout_ms, max_attempts, strategies, url, stats } => {
            let mut settings = effective_settings()?;
            if let Some(ms) = timeout_ms {
                settings.timeout_per_attempt_ms = ms;
            }
            if let Some(n) = max_attempts {
                settings.max_attempts = n;
            }
            if let Some(list) = strategies {
                settings.strategies = parse_strategy_list(&list)?;
            }
            run_simulate(&outcomes, &settings, &url, stats)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    // Logs go to stderr so stdout stays machine-readable.
    let term = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);
    if term.is_err() {
        let _ = WriteLogger::init(level, Config::default(), std::io::stderr());
    }
}

fn effective_settings() -> Result<ViewerSettings> {
    let storage = Storage::from_env_or_default().context("failed to locate settings directory")?;
    storage.load_effective_settings().context("failed to load settings")
}

fn client(backend: Option<&str>) -> Result<HttpMetadataStore> {
    let url = match backend {
        Some(url) => url.to_owned(),
        None => effective_settings()?.backend_url,
    };
    debug!("using backend {url}");
    Ok(HttpMetadataStore::new(&url)?)
}

fn run_list(backend: Option<&str>, favorites: bool, json: bool) -> Result<()> {
    let store = client(backend)?;
    let records = if favorites { store.list_favorites() } else { store.list_documents() }
        .context("failed to list documents")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("no documents");
    }
    for record in &records {
        let marker = if record.is_favorite { "*" } else { " " };
        println!(
            "{marker} {}  {}  {}  {}",
            record.id,
            record.name,
            record.kind,
            record.display_size()
        );
    }
    Ok(())
}

fn run_show(backend: Option<&str>, id: &DocumentId) -> Result<()> {
    let record =
        client(backend)?.fetch_document(id).with_context(|| format!("failed to fetch {id}"))?;
    print_record(&record);
    Ok(())
}

fn print_record(record: &PdfRecord) {
    println!("id:        {}", record.id);
    println!("name:      {}", record.name);
    println!("type:      {}", record.kind);
    println!("size:      {}", record.display_size());
    println!("added:     {}", record.date_added);
    println!("favorite:  {}", record.is_favorite);
    if record.has_inline_content() {
        println!("content:   inline");
    } else {
        println!("uri:       {}", record.uri);
    }
}

fn run_favorite(backend: Option<&str>, id: &DocumentId) -> Result<()> {
    let record = client(backend)?
        .toggle_favorite(id)
        .with_context(|| format!("failed to toggle favorite on {id}"))?;

    let verb = if record.is_favorite { "favorited" } else { "unfavorited" };
    println!("{verb} {}", record.name);
    Ok(())
}

fn run_rename(backend: Option<&str>, id: &DocumentId, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("name must not be empty");
    }

    let record = client(backend)?
        .update_document(id, &PdfUpdate::rename(name))
        .with_context(|| format!("failed to rename {id}"))?;
    println!("renamed {} to {}", record.id, record.name);
    Ok(())
}

fn run_stats(backend: Option<&str>) -> Result<()> {
    let stats = client(backend)?.stats().context("failed to fetch library statistics")?;

    println!("total:     {}", stats.total_pdfs);
    println!("favorites: {}", stats.favorite_pdfs);
    println!("local:     {}", stats.local_pdfs);
    println!("cloud:     {}", stats.cloud_pdfs);
    println!("url:       {}", stats.url_pdfs);
    Ok(())
}

fn run_plan(backend: Option<&str>, id: &DocumentId) -> Result<()> {
    let settings = effective_settings()?;
    let store = client(backend)?;

    let record = store.fetch_document(id).with_context(|| format!("failed to fetch {id}"))?;
    let document = DocumentRef::from_record(&record).context("document cannot be previewed")?;

    let plan: Vec<PlanEntry> = settings
        .strategies
        .iter()
        .map(|&strategy| match resolve(strategy, &document) {
            Ok(source) => {
                PlanEntry { strategy, source: Some(source.describe()), unavailable: None }
            }
            Err(err) => {
                PlanEntry { strategy, source: None, unavailable: Some(err.to_string()) }
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn run_settings(action: SettingsAction) -> Result<()> {
    let storage = Storage::from_env_or_default().context("failed to locate settings directory")?;

    match action {
        SettingsAction::Show => {
            let settings = storage.load_effective_settings().context("failed to load settings")?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Reset => {
            storage.reset_settings().context("failed to reset settings")?;
            println!("settings reset");
        }
        SettingsAction::Set { key, value } => {
            let mut settings = storage.load_settings().context("failed to load settings")?;
            set_setting(&mut settings, &key, &value)?;
            storage.save_settings(&settings).context("failed to save settings")?;
            println!("{key} updated");
        }
    }
    Ok(())
}

fn run_simulate(outcomes: &str, settings: &ViewerSettings, url: &str, stats: bool) -> Result<()> {
    let surface = Arc::new(ScriptedSurface::parse(outcomes)?);
    let handle = PreviewHandle::new(surface).context("failed to start preview runtime")?;
    let updates = handle.subscribe();

    let policy = PreviewPolicy::from_settings(settings);
    let document = DocumentRef::url(url)?;

    // Every attempt is bounded by its deadline; allow one more as slack.
    let attempts = u64::from(settings.max_attempts) + 2;
    let budget = Duration::from_millis(settings.timeout_per_attempt_ms.saturating_mul(attempts));

    handle.start(document, policy)?;
    let result = loop {
        match updates.recv_timeout(budget) {
            Ok(status) => {
                println!("{}", serde_json::to_string(&status)?);
                if status.is_settled() {
                    break Ok(());
                }
            }
            Err(_) => break Err(anyhow::anyhow!("preview did not settle within {budget:?}")),
        }
    };

    if stats {
        println!("{}", serde_json::to_string(&handle.stats())?);
    }
    handle.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pdfshelf",
            "list",
            "--favorites",
            "--backend",
            "http://h:1",
            "--verbose",
        ])
        .expect("valid arguments");

        assert!(cli.verbose);
        assert_eq!(cli.backend.as_deref(), Some("http://h:1"));
        assert!(matches!(cli.command, Commands::List { favorites: true, json: false }));
    }

    #[test]
    fn settings_set_takes_key_and_value() {
        let cli = Cli::try_parse_from(["pdfshelf", "settings", "set", "max_attempts", "4"])
            .expect("valid");
        assert!(matches!(
            cli.command,
            Commands::Settings { action: SettingsAction::Set { ref key, ref value } }
                if key == "max_attempts" && value == "4"
        ));
    }
}
