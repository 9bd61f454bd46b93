/// Shelf - music library importer
mod config;
mod error;
mod source;

use clap::{Parser, Subcommand};
use shelf_core::Catalog;
use shelf_importer::copy::FileOperation;
use shelf_importer::{Choice, ImportSession, LoftyTagCodec, Resolution};
use shelf_storage::SqliteCatalog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ShelfConfig;
use crate::error::CliError;
use crate::source::OfflineSource;

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Import music into a managed library", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./shelf.toml when present)
    #[arg(short, long, global = true, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import directories, files or archives
    Import(ImportArgs),
    /// List albums and singletons in the catalog
    List,
}

#[derive(clap::Args)]
struct ImportArgs {
    /// Paths to import, in order
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Library directory to place files in
    #[arg(short, long)]
    library: Option<PathBuf>,

    /// How files reach the library (copy, move, link, hard_link, reflink, reflink_always, none)
    #[arg(short, long)]
    operation: Option<FileOperation>,

    /// Delete sources after copying
    #[arg(long)]
    delete: bool,

    /// Show what would be imported without changing anything
    #[arg(short, long)]
    pretend: bool,

    /// Import individual tracks instead of albums
    #[arg(short, long)]
    singletons: bool,

    /// Split directories by album artist and album before choosing
    #[arg(short, long)]
    group_albums: bool,

    /// Skip content imported by earlier runs
    #[arg(short, long)]
    incremental: bool,

    /// Start interrupted paths over instead of resuming
    #[arg(long)]
    no_resume: bool,

    /// Import as-is without looking up candidates
    #[arg(short = 'A', long)]
    no_autotag: bool,

    /// Leave file tags untouched
    #[arg(short = 'W', long)]
    no_write: bool,

    /// Import tasks without a strong match as-is instead of skipping them
    #[arg(long)]
    as_is_fallback: bool,

    /// What to do with duplicates (skip, keep_both, remove, merge)
    #[arg(short, long)]
    duplicate_action: Option<Resolution>,

    /// Restrict lookups to this release or recording id
    #[arg(long = "search-id")]
    search_ids: Vec<String>,

    /// Set a field on every imported item, as FIELD=VALUE
    #[arg(long = "set", value_parser = parse_assignment)]
    set_fields: Vec<(String, String)>,
}

fn parse_assignment(raw: &str) -> Result<(String, String), CliError> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(CliError::InvalidArgument(format!(
            "expected FIELD=VALUE, got '{raw}'"
        ))),
    }
}

impl ImportArgs {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(self, config: &mut ShelfConfig) -> Vec<PathBuf> {
        let import = &mut config.import;
        if let Some(library) = self.library {
            import.library_dir = Some(library);
        }
        if let Some(operation) = self.operation {
            import.operation = operation;
        }
        if let Some(action) = self.duplicate_action {
            import.duplicate_action = action;
        }
        import.delete |= self.delete;
        import.pretend |= self.pretend;
        import.singletons |= self.singletons;
        import.group_albums |= self.group_albums;
        import.incremental |= self.incremental;
        if self.no_resume {
            import.resume = false;
        }
        if self.no_autotag {
            import.autotag = false;
        }
        if self.no_write {
            import.write = false;
        }
        if self.as_is_fallback {
            import.quiet_fallback = Choice::AsIs;
        }
        if !self.search_ids.is_empty() {
            import.search_ids = self.search_ids;
        }
        import.set_fields.extend(self.set_fields);
        self.paths
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf=info,shelf_importer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ShelfConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Import(args) => {
            let paths = args.apply(&mut config);
            import(config, &paths).await?;
        }
        Commands::List => list(&config).await?,
    }

    Ok(())
}

async fn import(config: ShelfConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    config.validate()?;

    let catalog = Arc::new(SqliteCatalog::open(&config.database_url).await?);
    tracing::info!("Catalog opened at {}", config.database_url);

    let mut session = ImportSession::new(
        config.import,
        catalog,
        Arc::new(LoftyTagCodec::new()),
        Arc::new(OfflineSource),
    )?;
    let summary = session.run(paths).await?;

    for message in &summary.messages {
        println!("{message}");
    }
    println!("{}", summary.summary_text());
    Ok(())
}

async fn list(config: &ShelfConfig) -> anyhow::Result<()> {
    let catalog = SqliteCatalog::open(&config.database_url).await?;

    for album in catalog.albums().await? {
        let Some(id) = album.id else { continue };
        let items = catalog.album_items(id).await?;
        println!("{} - {} ({} tracks)", album.album_artist, album.album, items.len());
    }
    for item in catalog.items().await?.into_iter().filter(|i| i.album_id.is_none()) {
        println!(
            "{} - {} [singleton]",
            item.meta.artist.as_deref().unwrap_or("Unknown Artist"),
            item.meta.title.as_deref().unwrap_or("Unknown")
        );
    }
    Ok(())
}
