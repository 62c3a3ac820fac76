use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use attrsync::config::STORAGE_DIR_NAME;
use attrsync::storage::FilesystemAttributeStore;
use attrsync::watcher::{PathClassifier, Reconciler, SelfWriteGuard, WatchService};
use attrsync::{Settings, logging};

#[derive(Parser)]
#[command(name = "attrsync")]
#[command(about = "Keeps extended file attributes alive across cloud sync clients")]
#[command(version)]
struct Cli {
    /// Use a specific settings file instead of discovering one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the side-store directory and a default settings file
    Init {
        /// Force overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Watch the root and keep records synchronized until Ctrl-C
    Start,

    /// Clear the record store and rebuild it from the current tree
    RefreshRecords,

    /// Restore every stored record back onto its file
    RefreshFiles,

    /// Show the effective configuration
    Config,
}

/// Everything the non-init commands need, wired together.
struct App {
    root: PathBuf,
    settings: Settings,
    guard: Arc<SelfWriteGuard>,
    store: Arc<FilesystemAttributeStore>,
    classifier: Arc<PathClassifier>,
}

impl App {
    fn build(settings: Settings) -> anyhow::Result<Self> {
        let root = settings
            .watched_root()
            .with_context(|| format!("cannot resolve watched root {}", settings.root.display()))?;

        let classifier = Arc::new(PathClassifier::new(
            root.clone(),
            settings.storage_root(&root),
            &settings.filter.ignore_patterns,
        )?);
        let guard = Arc::new(SelfWriteGuard::new(settings.self_write_ttl()));
        let store = Arc::new(FilesystemAttributeStore::new(
            root.clone(),
            settings.records_root(&root),
            Arc::clone(&classifier),
            Arc::clone(&guard),
        )?);

        Ok(Self {
            root,
            settings,
            guard,
            store,
            classifier,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that work against an existing side-store need a valid
    // settings file; fail with the init hint instead of defaults.
    let needs_init = matches!(
        &cli.command,
        Commands::Start | Commands::RefreshRecords | Commands::RefreshFiles
    );
    if needs_init && cli.config.is_none() {
        if let Err(msg) = Settings::check_init() {
            bail!("{msg}");
        }
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path.clone())
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load().context("failed to load settings")?,
    };
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => init(settings, force),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Start => {
            let app = App::build(settings)?;
            let engine = Arc::new(Reconciler::new(
                Arc::clone(&app.classifier),
                app.store.clone(),
                Arc::clone(&app.guard),
                app.settings.engine_timings(),
            ));
            let service = WatchService::new(app.root.clone(), engine, Arc::clone(&app.guard))?;
            service.run().await?;
            Ok(())
        }
        Commands::RefreshRecords => {
            let app = App::build(settings)?;
            app.store.clear_all()?;
            let captured = app.store.rebuild_from_tree()?;
            println!("Rebuilt {captured} records under {}", app.root.display());
            Ok(())
        }
        Commands::RefreshFiles => {
            let app = App::build(settings)?;
            let refreshed = app.store.refresh_watched_files()?;
            println!("Refreshed attributes on {refreshed} files");
            Ok(())
        }
    }
}

fn init(settings: Settings, force: bool) -> anyhow::Result<()> {
    let config_path = settings.root.join(STORAGE_DIR_NAME).join("settings.toml");

    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    settings
        .save(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", config_path.display()))?;
    println!("Wrote {}", config_path.display());
    println!("Edit it to set the watched root, then run 'attrsync start'.");
    Ok(())
}
