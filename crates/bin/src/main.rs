//! Yuho CLI binary.
//!
//! Fetches the latest and previous annual securities reports of an EDINET
//! filer and writes them, with metadata and an index, under an output root.

mod integration;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use integration::cache_manager::{self, default_cache_dir};
use integration::config::{self, CacheConfig, DEFAULT_OUTDIR, FetchConfig, MAX_TTL_DAYS};
use integration::fetch_pipeline;
use std::path::PathBuf;
use std::process;
use std::time::Duration as StdDuration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use yuho::Preference;
use yuho::crawl::DEFAULT_CONCURRENCY;
use yuho::data::cache::DEFAULT_TTL_DAYS;
use yuho::data::edinet::{ClientConfig, EDINET_BASE_URL, EdinetClient};

#[derive(Parser)]
#[command(name = "yuho")]
#[command(about = "Yuho: fetch annual securities reports from EDINET", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and hide the progress bar
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the latest and previous annual reports of a filer
    Fetch(FetchArgs),

    /// Inspect or maintain the document-list cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Cache directory (defaults to the platform cache dir)
        #[arg(long, global = true)]
        cache_dir: Option<PathBuf>,

        /// Age in days after which cached lists expire
        #[arg(
            long,
            default_value_t = DEFAULT_TTL_DAYS,
            value_parser = clap::value_parser!(i64).range(0..=MAX_TTL_DAYS),
            global = true
        )]
        cache_ttl: i64,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// EDINET filer code, e.g. E02144
    filer: String,

    /// First submission date to crawl (YYYY-MM-DD, default: three years before today)
    #[arg(long, value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// Last submission date to crawl (YYYY-MM-DD, default: today)
    #[arg(long, value_parser = parse_date)]
    to: Option<NaiveDate>,

    /// Preferred variant when a period has both: consolidated or separate
    #[arg(long, default_value = "consolidated")]
    prefer: Preference,

    /// Output root; files land in <outdir>/<filer>/
    #[arg(long, default_value = DEFAULT_OUTDIR)]
    outdir: PathBuf,

    /// Cache directory (defaults to the platform cache dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable the document-list cache
    #[arg(long)]
    no_cache: bool,

    /// Clear the document-list cache before crawling
    #[arg(long, conflicts_with = "no_cache")]
    clear_cache: bool,

    /// Age in days after which cached lists are refetched
    #[arg(
        long,
        default_value_t = DEFAULT_TTL_DAYS,
        value_parser = clap::value_parser!(i64).range(0..=MAX_TTL_DAYS)
    )]
    cache_ttl: i64,

    /// Concurrent document-list requests
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Redownload artifacts that already exist
    #[arg(long)]
    overwrite: bool,

    /// EDINET API base URL
    #[arg(long, default_value = EDINET_BASE_URL)]
    api_base: String,
}

#[derive(Subcommand, Clone, Copy)]
enum CacheAction {
    /// Show cache location and statistics
    Stats,
    /// Remove every cached list
    Clear,
    /// Remove cached lists older than the TTL
    Sweep,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    yuho::parse_date_arg(value).map_err(|e| e.to_string())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Fetch(args) => fetch(args, cli.quiet).await,
        Commands::Cache {
            action,
            cache_dir,
            cache_ttl,
        } => cache(action, cache_dir, cache_ttl),
    }
}

async fn fetch(args: FetchArgs, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filer_code = config::normalize_filer_code(&args.filer)?;
    let today = Local::now().date_naive();
    let range = yuho::DateRange::resolve(args.from, args.to, today)?;
    let api_key = config::load_api_key()?;

    let config = FetchConfig {
        filer_code,
        range,
        preference: args.prefer,
        outdir: args.outdir,
        cache: CacheConfig {
            use_cache: !args.no_cache,
            clear_first: args.clear_cache,
            dir: args.cache_dir.unwrap_or_else(default_cache_dir),
            ttl_days: args.cache_ttl,
        },
        concurrency: args.concurrency.max(1),
        overwrite: args.overwrite,
        api_base: args.api_base,
    };
    debug!(filer = %config.filer_code, range = %config.range, prefer = %config.preference, "starting fetch");

    let client = EdinetClient::with_config(
        api_key,
        ClientConfig {
            base_url: config.api_base.clone(),
            ..ClientConfig::default()
        },
    )?;
    let cache = cache_manager::open_cache(&config.cache);

    println!("Fetching annual reports for {} ({})", config.filer_code, config.range);
    println!("  Preference: {}", config.preference);
    cache_manager::print_cache_info(&cache, &config.cache.dir);
    println!();

    let pb = (!quiet).then(|| {
        let pb = ProgressBar::new(config.range.len_days() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb.enable_steady_tick(StdDuration::from_millis(100));
        pb.set_message("Crawling document lists...");
        pb
    });

    let outcome =
        fetch_pipeline::run_fetch(&config, &cache, &client, &client, pb.as_ref()).await;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let outcome = outcome?;

    fetch_pipeline::print_summary(&config, &outcome);
    Ok(())
}

fn cache(
    action: CacheAction,
    cache_dir: Option<PathBuf>,
    cache_ttl: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = CacheConfig {
        use_cache: true,
        clear_first: false,
        dir: cache_dir.unwrap_or_else(default_cache_dir),
        ttl_days: cache_ttl,
    };
    let cache = cache_manager::open_cache(&config);

    match action {
        CacheAction::Stats => cache_manager::print_cache_info(&cache, &config.dir),
        CacheAction::Clear => {
            let removed = cache.clear()?;
            println!("Removed {} cached list(s)", removed);
        }
        CacheAction::Sweep => {
            let removed = cache.sweep()?;
            println!("Removed {} expired list(s) older than {} day(s)", removed, cache_ttl);
        }
    }
    Ok(())
}
