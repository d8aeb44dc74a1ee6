//! asset-harvester - crawl, download and flatten game asset packs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use asset_harvester::browser::webdriver::WebDriverSession;
use asset_harvester::catalog::{CatalogCrawler, DownloadLedger, MetadataStore};
use asset_harvester::config::{
    BrowserConfig, CrawlConfig, DownloadConfig, Settings, UnfoldConfig, DEFAULT_BASE_URL, DEFAULT_TARGET_COUNT,
};
use asset_harvester::download::{CheckoutWorkflow, DownloadOrchestrator};
use asset_harvester::unfold::{unfold_directory, UnfoldPipeline};

#[derive(Parser)]
#[command(name = "asset-harvester")]
#[command(version)]
#[command(about = "Crawl a free game-asset catalog, download the packs and flatten them into image folders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: ~/.config/asset-harvester/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect metadata for catalog entries, one JSON file per entry
    Crawl {
        /// Listing page to crawl
        #[arg(default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Directory for the metadata files
        #[arg(default_value = "./output/assets/metadata")]
        out_dir: PathBuf,

        /// Number of entries to collect
        #[arg(long, default_value_t = DEFAULT_TARGET_COUNT)]
        count: usize,

        /// Run the browser headless (default)
        #[arg(long, overrides_with = "no_headless")]
        headless: bool,

        /// Show the browser window
        #[arg(long)]
        no_headless: bool,

        /// Path to the geckodriver executable
        #[arg(long, env = "GECKODRIVER")]
        geckodriver: Option<PathBuf>,

        /// Use a running WebDriver server instead of spawning geckodriver
        #[arg(long)]
        webdriver_url: Option<String>,
    },

    /// Download the packs described by crawled metadata
    Download {
        /// Directory of metadata files written by `crawl`
        #[arg(long, default_value = "./output/assets/metadata")]
        metadata_dir: PathBuf,

        /// Directory for downloaded archives and the ledger
        #[arg(short, long, default_value = "./output/assets/assets")]
        out: PathBuf,

        /// Run the browser headless
        #[arg(long)]
        headless: bool,

        /// Path to the geckodriver executable
        #[arg(long, env = "GECKODRIVER")]
        geckodriver: Option<PathBuf>,

        /// Use a running WebDriver server instead of spawning geckodriver
        #[arg(long)]
        webdriver_url: Option<String>,
    },

    /// Flatten downloaded packs into <output>/<extension>/<name>
    Unfold {
        /// Directory of downloaded packs
        #[arg(default_value = "./output/assets/assets")]
        asset_dir: PathBuf,

        /// Root of the flattened tree
        #[arg(default_value = "./output/assets/unfolded")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(if cli.verbose {
                "asset_harvester=debug".parse()?
            } else {
                "asset_harvester=info".parse()?
            }),
        )
        .init();

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl {
            base_url,
            out_dir,
            count,
            headless,
            no_headless,
            geckodriver,
            webdriver_url,
        } => {
            let headless = if no_headless {
                false
            } else {
                headless || settings.headless.unwrap_or(true)
            };
            let browser = BrowserConfig {
                headless,
                geckodriver_path: geckodriver.or_else(|| settings.geckodriver_path.clone()),
                webdriver_url,
                download_dir: None,
            };
            let config = CrawlConfig::from_settings(base_url, out_dir, count, &settings);
            browser.validate()?;
            config.validate()?;

            println!("Crawling {}", config.base_url);
            println!("Metadata:   {}", config.out_dir.display());
            println!("Target:     {} entries", config.target_count);
            println!();

            let mut session = WebDriverSession::launch(&browser)?;
            let stats = CatalogCrawler::new(&mut session, config).run()?;

            println!("\n=== Crawl Summary ===");
            println!(
                "Entries: {} parsed, {} written, {} duplicates, {} without title",
                stats.parsed, stats.written, stats.duplicates, stats.skipped
            );
            if let Some(reason) = stats.stop {
                println!("Stopped:  {}", reason);
            }
        }

        Commands::Download {
            metadata_dir,
            out,
            headless,
            geckodriver,
            webdriver_url,
        } => {
            let config = DownloadConfig::from_settings(metadata_dir, out, &settings);
            config.validate()?;
            std::fs::create_dir_all(&config.out_dir)
                .with_context(|| format!("Failed to create {}", config.out_dir.display()))?;

            let browser = BrowserConfig {
                headless: headless || settings.headless.unwrap_or(false),
                geckodriver_path: geckodriver.or_else(|| settings.geckodriver_path.clone()),
                webdriver_url,
                download_dir: Some(config.out_dir.clone()),
            };
            browser.validate()?;

            let records = MetadataStore::new(&config.metadata_dir).load_all()?;
            let ledger = DownloadLedger::load(config.ledger_path())?;

            println!("Downloading {} packs", records.len());
            println!("Output:     {}", config.out_dir.display());
            println!("Ledger:     {} known titles", ledger.len());
            println!();

            let mut session = WebDriverSession::launch(&browser)?;
            let workflow = CheckoutWorkflow::from_config(&config);
            let stats = DownloadOrchestrator::new(&mut session, workflow, ledger).run(&records)?;

            println!("\n=== Download Summary ===");
            println!(
                "Packs: {} downloaded, {} already present, {} without page, {} failed",
                stats.downloaded, stats.already_present, stats.no_page, stats.failed
            );
            if stats.failed > 0 {
                println!("\nSome downloads failed. Run again to retry them.");
            }
        }

        Commands::Unfold { asset_dir, output_dir } => {
            let config = UnfoldConfig {
                input_dir: asset_dir,
                output_dir,
                accepted_extensions: settings.accepted_extensions.clone(),
            };
            config.validate()?;

            let pipeline = UnfoldPipeline::from_config(&config);
            let stats = unfold_directory(&pipeline, &config.input_dir, &config.output_dir)?;

            println!("\n=== Unfold Summary ===");
            println!(
                "Files: {} copied, {} unchanged, {} archives expanded, {} ignored, {} failed",
                stats.copied, stats.unchanged, stats.archives, stats.ignored, stats.failed
            );
        }
    }

    Ok(())
}
