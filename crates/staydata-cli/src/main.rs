use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use staydata_captioner::{CaptionClient, CaptionJobConfig, CsvCaptionJob};
use staydata_crawler::{crawl_site, CrawlerConfig, OnError, PageStore};
use tokio::runtime;

/// Rental listings mirror and image captioning tools
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "crawl")]
    Crawl(CrawlArgs),
    #[clap(name = "caption")]
    Caption(CaptionArgs),
    #[clap(hide = true)]
    Completion,
}

/// Mirror the listings portal into per-country directories
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Root output directory, one subdirectory per country is created in it
    #[clap(parse(from_os_str), long)]
    pub parent_dir: PathBuf,
    /// Path to the crawler log file
    #[clap(parse(from_os_str), long)]
    pub log_path: PathBuf,
    /// Optional default crawler yaml configuration file
    #[clap(env = "STAYDATA_CRAWLER_CONFIG", parse(from_os_str), long)]
    pub crawler_config: Option<PathBuf>,
    /// Override the portal root index URL
    #[clap(long)]
    pub root_url: Option<String>,
    /// Override crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// Override crawler's maximum concurrent listing downloads
    #[clap(long)]
    pub concurrent_downloads: Option<usize>,
    /// Override crawler's download error handling strategy
    #[clap(arg_enum, long)]
    pub on_dl_error: Option<OnError>,
    /// Override crawler's parse error handling strategy
    #[clap(arg_enum, long)]
    pub on_parse_error: Option<OnError>,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(root_url) = &args.root_url {
            conf.root_url = root_url.to_string();
        }
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(concurrent_downloads) = args.concurrent_downloads {
            conf.concurrent_downloads = concurrent_downloads;
        }
        if let Some(on_dl_error) = args.on_dl_error {
            conf.on_dl_error = on_dl_error;
        }
        if let Some(on_parse_error) = args.on_parse_error {
            conf.on_parse_error = on_parse_error;
        }
        Ok(conf)
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let config = (&args).try_into()?;
    let store = PageStore::new(&args.parent_dir)?;
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let stats = rt.block_on(crawl_site(&config, &store))?;
    println!(
        "crawl complete: {} countries ({} skipped), {} listings written, {} already mirrored, {} failed",
        stats.countries,
        stats.countries_skipped,
        stats.listings_written,
        stats.listings_skipped,
        stats.listings_failed,
    );
    Ok(())
}

/// Caption listing images referenced from CSV files
#[derive(Debug, clap::Args)]
pub struct CaptionArgs {
    /// Input CSV files
    #[clap(parse(from_os_str), long, required = true, multiple_values = true)]
    pub files: Vec<PathBuf>,
    /// Output CSV paths, one per input file
    #[clap(parse(from_os_str), long, required = true, multiple_values = true)]
    pub out_paths: Vec<PathBuf>,
    /// Path to the captioner log file
    #[clap(parse(from_os_str), long)]
    pub log_path: PathBuf,
    /// Path to the JSON processing status file
    #[clap(parse(from_os_str), long, default_value = "caption_status.json")]
    pub status_path: PathBuf,
    /// Input column holding image URLs
    #[clap(long, default_value = "picture_url")]
    pub url_column: String,
    /// Output column receiving the generated captions
    #[clap(long, default_value = "picture_description")]
    pub caption_column: String,
    /// Number of records between two status checkpoints
    #[clap(long, default_value_t = 64)]
    pub batch_size: usize,
    /// Inference endpoint base URL
    #[clap(long)]
    pub endpoint: Option<String>,
    /// Captioning model identifier
    #[clap(long)]
    pub model: Option<String>,
    /// Maximum number of new tokens the model may generate per caption
    #[clap(long)]
    pub max_new_tokens: Option<u32>,
    /// Bearer token for the inference endpoint
    #[clap(env = "CAPTION_API_TOKEN", long, hide_env_values = true)]
    pub api_token: String,
}

pub fn caption(args: CaptionArgs) -> anyhow::Result<()> {
    let mut client = CaptionClient::new(args.api_token.clone());
    if let Some(endpoint) = args.endpoint {
        client = client.with_endpoint(endpoint);
    }
    if let Some(model) = args.model {
        client = client.with_model(model);
    }
    if let Some(max_new_tokens) = args.max_new_tokens {
        client = client.with_max_new_tokens(max_new_tokens);
    }

    let config = CaptionJobConfig {
        url_column: args.url_column,
        caption_column: args.caption_column,
        batch_size: args.batch_size,
    };
    let mut job = CsvCaptionJob::new(config, client, &args.status_path)?;

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let stats = rt.block_on(job.process_files(&args.files, &args.out_paths))?;
    println!(
        "caption run complete: {} files, {} records, {} captioned, {} failed",
        stats.files, stats.records, stats.captioned, stats.failed,
    );
    Ok(())
}

/// Progress and errors go to the log file; the console only gets the final
/// summary line.
fn init_file_logger(log_path: &Path) -> anyhow::Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("cannot open log file {}", log_path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            init_file_logger(&args.log_path)?;
            crawl(args)
        }
        SubCommand::Caption(args) => {
            init_file_logger(&args.log_path)?;
            caption(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "staydata", &mut io::stdout());
            Ok(())
        }
    }
}
