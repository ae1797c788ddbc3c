use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod catalog;
mod config;
mod download;
mod enrich;
mod error;
mod fetch;
mod harvester;
mod models;
mod report;
mod scrapers;
#[cfg(test)]
mod test_support;
mod traits;
mod writer;

use config::{HarvestConfig, NamingScheme, TableFormat};
use error::HarvestError;
use harvester::Harvester;
use models::Collection;
use scrapers::SourceKind;

/// Scrape product listings from e-commerce sites into CSV/XLSX, with images.
#[derive(Parser, Debug)]
#[command(name = "product-harvester", version)]
struct Cli {
    /// Site to scrape
    #[arg(short, long, value_enum)]
    source: SourceArg,

    /// Collection URLs or search terms; read from stdin when omitted
    collections: Vec<String>,

    /// JSON list of {"label", "query"} entries to choose from
    #[arg(long, conflicts_with = "collections")]
    categories: Option<PathBuf>,

    #[arg(short, long, env = "HARVEST_OUTPUT", default_value = "scraped_data")]
    output: PathBuf,

    #[arg(long, value_enum, default_value = "csv")]
    format: FormatArg,

    /// How image files are named
    #[arg(long, value_enum, default_value = "id")]
    naming: NamingArg,

    /// Append a timestamp to the table filename
    #[arg(long)]
    timestamped: bool,

    /// Only write the table
    #[arg(long)]
    no_images: bool,

    /// Skip background removal
    #[arg(long)]
    no_enrich: bool,

    /// Pause after each image download
    #[arg(long, env = "HARVEST_DELAY_MS", default_value_t = 100)]
    delay_ms: u64,

    /// Maximum scroll steps on browser-rendered pages
    #[arg(long, default_value_t = 30)]
    scroll_steps: u32,

    /// Pause after each scroll step
    #[arg(long, default_value_t = 1000)]
    scroll_pause_ms: u64,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Shopstyle,
    Uncommongoods,
    Trescolori,
}

impl From<SourceArg> for SourceKind {
    fn from(v: SourceArg) -> Self {
        match v {
            SourceArg::Shopstyle => SourceKind::ShopStyle,
            SourceArg::Uncommongoods => SourceKind::UncommonGoods,
            SourceArg::Trescolori => SourceKind::TresColori,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Xlsx,
}

impl From<FormatArg> for TableFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Csv => TableFormat::Csv,
            FormatArg::Xlsx => TableFormat::Xlsx,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum NamingArg {
    Id,
    Title,
}

impl From<NamingArg> for NamingScheme {
    fn from(v: NamingArg) -> Self {
        match v {
            NamingArg::Id => NamingScheme::SequentialId,
            NamingArg::Title => NamingScheme::SanitizedTitle,
        }
    }
}

fn build_config(cli: &Cli) -> Result<HarvestConfig, HarvestError> {
    let mut config = HarvestConfig {
        output_dir: cli.output.clone(),
        format: cli.format.into(),
        naming: cli.naming.into(),
        timestamped: cli.timestamped,
        download_images: !cli.no_images,
        download_delay: Duration::from_millis(cli.delay_ms),
        ..HarvestConfig::default()
    };
    config.browser.max_scroll_steps = cli.scroll_steps;
    config.browser.scroll_pause = Duration::from_millis(cli.scroll_pause_ms);

    if !cli.no_enrich && !cli.no_images {
        config = config.with_enrichment_from_env()?;
    }

    config.validate()?;
    Ok(config)
}

/// Positional identifiers, a category menu answer, or one line from stdin.
fn read_collections(cli: &Cli) -> Result<Vec<Collection>, HarvestError> {
    if !cli.collections.is_empty() {
        return Ok(cli
            .collections
            .iter()
            .map(|id| Collection::from_identifier(id))
            .collect());
    }

    let stdin = io::stdin();

    if let Some(path) = &cli.categories {
        let categories = catalog::load_categories(path)?;
        let category = catalog::prompt_selection(&categories, stdin.lock(), io::stdout())?;
        info!("Selected category: {}", category.label);
        return Ok(vec![Collection::from_identifier(category.query())]);
    }

    print!("Enter a collection URL or search term: ");
    io::stdout()
        .flush()
        .map_err(|e| HarvestError::Input(e.to_string()))?;

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| HarvestError::Input(e.to_string()))?;

    if line.trim().is_empty() {
        return Err(HarvestError::Input("no collection given".to_string()));
    }
    Ok(vec![Collection::from_identifier(&line)])
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let kind = SourceKind::from(cli.source);
    info!("Starting product harvester ({:?})", kind);

    let client = fetch::build_client(config.request_timeout)?;
    let source = scrapers::build_source(kind, client.clone(), config.browser.clone())?;
    let collections = read_collections(&cli)?;

    let mut harvester = Harvester::from_config(source, config, client)
        .context("Failed to set up the harvester")?;

    let mut failed = 0;
    for collection in &collections {
        match harvester.harvest(collection).await {
            Ok(report) => println!("{}", report::summary(&report)),
            Err(e) => {
                error!("Collection '{}' failed: {}", collection.name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} collection(s) failed", failed, collections.len());
    }
    Ok(())
}
