use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};

use feedpull::config::Config;
use feedpull::feed::{
    parse_datetime, update_all, ControlCharSanitizer, Feed, FetchOutcome, Fetcher,
    RequestOptions, UpdateOutcome,
};

#[derive(Parser, Debug)]
#[command(
    name = "feedpull",
    version,
    about = "Fetch, parse and incrementally update RSS/Atom feeds"
)]
struct Args {
    /// Config file (default: ~/.config/feedpull/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and parse one or more feeds
    Fetch {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Print the parsed feeds as JSON
        #[arg(long)]
        json: bool,

        /// Save the parsed feeds to FILE for a later `update`
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,

        /// Send If-Modified-Since with this date
        #[arg(long, value_name = "DATE", value_parser = parse_date_arg)]
        if_modified_since: Option<DateTime<Utc>>,

        /// Send If-None-Match with this entity tag
        #[arg(long, value_name = "ETAG")]
        etag: Option<String>,
    },
    /// Print the raw response body for a URL
    Raw {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Re-fetch feeds saved by `fetch --save` and report new entries
    Update {
        #[arg(value_name = "FILE")]
        state: PathBuf,
    },
}

fn parse_date_arg(s: &str) -> Result<DateTime<Utc>, String> {
    parse_datetime(s).ok_or_else(|| format!("unrecognised date: {s}"))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match Config::default_path() {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };
    Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

fn print_feed(feed: &Feed) {
    println!(
        "{} [{}] {} entries",
        feed.title.as_deref().unwrap_or("(untitled)"),
        feed.format,
        feed.entries.len()
    );
    if let Some(url) = &feed.feed_url {
        println!("  feed: {url}");
    }
}

fn load_state(path: &Path) -> Result<Vec<Feed>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file '{}'", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("State file '{}' is not valid feed JSON", path.display()))
}

/// Writes `feeds` to `path` via a temp file and rename, so a crash never
/// leaves a half-written state file.
fn save_state(path: &Path, feeds: &[Feed]) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let json = serde_json::to_vec_pretty(feeds).context("Failed to serialize feeds")?;
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{suffix:016x}"));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temporary file '{}'", temp_path.display()))?;

    temp_file
        .write_all(&json)
        .and_then(|()| temp_file.sync_all())
        .with_context(|| {
            let _ = std::fs::remove_file(&temp_path);
            format!("Failed to write '{}': disk may be full", temp_path.display())
        })?;
    drop(temp_file);

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })
}

async fn fetch(
    fetcher: &Fetcher,
    urls: Vec<String>,
    options: RequestOptions,
    json: bool,
    save: Option<&Path>,
) -> Result<()> {
    let mut feeds = Vec::new();
    let mut outcomes = std::pin::pin!(fetcher.fetch_and_parse_stream(urls, &options));

    while let Some((url, result)) = outcomes.next().await {
        match result {
            Ok(FetchOutcome::Fetched(mut feed)) => {
                feed.sanitize(&ControlCharSanitizer);
                if !json {
                    print_feed(&feed);
                }
                feeds.push(feed);
            }
            Ok(FetchOutcome::NotModified) => println!("{url}: not modified"),
            Ok(FetchOutcome::Failed(failure)) => eprintln!("{failure}"),
            Err(e) => eprintln!("{url}: {e}"),
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&feeds).context("Failed to serialize feeds")?
        );
    }
    if let Some(path) = save {
        save_state(path, &feeds)?;
        eprintln!("Saved {} feeds to {}", feeds.len(), path.display());
    }
    Ok(())
}

async fn update(fetcher: &Fetcher, state: &Path) -> Result<()> {
    let mut feeds = load_state(state)?;
    let results = update_all(fetcher, &mut feeds).await;

    for (feed, result) in feeds.iter_mut().zip(results) {
        let name = feed
            .title
            .clone()
            .or_else(|| feed.feed_url.clone())
            .unwrap_or_else(|| "(untitled)".to_string());
        match result {
            Ok(UpdateOutcome::Merged { new_entries }) => {
                println!("{name}: {new_entries} new");
                feed.sanitize(&ControlCharSanitizer);
                for entry in feed.new_entries() {
                    println!(
                        "  + {}",
                        entry.title.as_deref().or(entry.url.as_deref()).unwrap_or("")
                    );
                }
            }
            Ok(UpdateOutcome::NotModified) => println!("{name}: not modified"),
            Ok(UpdateOutcome::Failed(failure)) => eprintln!("{name}: {failure}"),
            Err(e) => eprintln!("{name}: {e}"),
        }
    }

    save_state(state, &feeds)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let fetcher = Fetcher::from_config(&config).context("Failed to create HTTP client")?;

    match args.command {
        Command::Fetch {
            urls,
            json,
            save,
            if_modified_since,
            etag,
        } => {
            let options = RequestOptions {
                user_agent: None,
                if_modified_since,
                if_none_match: etag,
            };
            fetch(&fetcher, urls, options, json, save.as_deref()).await
        }
        Command::Raw { url } => match fetcher.fetch_raw(&url, &RequestOptions::default()).await {
            FetchOutcome::Fetched(raw) => {
                std::io::stdout()
                    .write_all(raw.body.as_bytes())
                    .context("Failed to write to stdout")?;
                Ok(())
            }
            FetchOutcome::NotModified => {
                println!("{url}: not modified");
                Ok(())
            }
            FetchOutcome::Failed(failure) => anyhow::bail!("{failure}"),
        },
        Command::Update { state } => update(&fetcher, &state).await,
    }
}
