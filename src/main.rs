//! Mangafetch CLI - manga search and chapter downloader.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mangafetch::config::Config;
use mangafetch::console::Console;
use mangafetch::download::{ImageDownloader, prepare_output_dir};
use mangafetch::events::{self, EventReceiver, EventSender};
use mangafetch::http::{HttpTransport, Transport, browser_headers};
use mangafetch::models::trailing_segment;
use mangafetch::sources::baozimh::{PageRange, extract_identity};
use mangafetch::sources::{BaozimhClient, MangaCatalog, MangaDexClient, ResolutionOutcome};
use mangafetch::utils::{safe_path_component, short_id};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Manga search and chapter downloader for Baozimh and MangaDex.
#[derive(Parser, Debug)]
#[command(name = "mangafetch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use this config file instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print download events as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search Baozimh by keyword, or look up a comic URL.
    Search { query: String },

    /// List a Baozimh comic's chapters.
    Chapters {
        /// Comic URL or comic id.
        comic: String,
    },

    /// Download a Baozimh chapter by its reader URL.
    Download {
        chapter_url: String,
        /// Output directory (defaults under the configured output directory).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Download a Baozimh chapter by comic id and chapter slot.
    DownloadSlot {
        comic_id: String,
        slot: u32,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Download a Baozimh chapter by guessing CDN URLs for a known chapter id.
    DownloadId {
        comic_id: String,
        chapter_id: String,
        /// First page index to try.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        start: Option<u32>,
        /// Last page index to try (inclusive).
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        end: Option<u32>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Search MangaDex titles by text or title URL.
    DexSearch { query: String },

    /// List a MangaDex title's chapters.
    DexChapters {
        manga_id: String,
        /// Language filter, repeatable (defaults to the configured list).
        #[arg(long = "lang")]
        languages: Vec<String>,
    },

    /// Download a MangaDex chapter.
    DexDownload {
        chapter_id: String,
        /// Use the compressed data-saver images.
        #[arg(long)]
        data_saver: bool,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let console = Console::new();

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(config.scraping.debug);

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new().context("Failed to build HTTP client")?);
    let baozimh = BaozimhClient::from_config(transport.clone(), &config);
    let output_root = config.paths.output_directory.clone();

    match args.command {
        Command::Search { query } => {
            let comics = if baozimh.is_site_url(&query) {
                vec![baozimh.comic_from_url(&query).await]
            } else {
                baozimh.search(&query).await
            };
            if comics.is_empty() {
                console.warning("No comics found");
            }
            for comic in comics {
                println!(
                    "{}  {}  {}",
                    comic.id,
                    comic.display_title,
                    console.muted(&comic.canonical_url)
                );
            }
        }

        Command::Chapters { comic } => {
            let comic_url = comic_url(&baozimh, &comic);
            let chapters = baozimh.chapters(&comic_url).await;
            if chapters.is_empty() {
                console.warning("No chapters found");
            } else {
                console.section(&format!("{} chapters of {}", chapters.len(), comic_url));
            }
            for (i, chapter) in chapters.iter().enumerate() {
                let slot = chapter
                    .ordering_slot
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>4}  [{}]  {}  {}",
                    i + 1,
                    slot,
                    chapter.title,
                    console.muted(&chapter.url)
                );
            }
        }

        Command::Download {
            chapter_url,
            output,
        } => {
            let dir = output.unwrap_or_else(|| chapter_dir(&output_root, &chapter_url));
            download_baozimh(&baozimh, &chapter_url, &dir, &console, args.json).await?;
        }

        Command::DownloadSlot {
            comic_id,
            slot,
            output,
        } => {
            let chapter_url = baozimh.page_direct_url(&comic_id, slot);
            let dir = output.unwrap_or_else(|| {
                output_root
                    .join(safe_path_component(&comic_id, "baozimh"))
                    .join(format!("chapter_{}", slot))
            });
            download_baozimh(&baozimh, &chapter_url, &dir, &console, args.json).await?;
        }

        Command::DownloadId {
            comic_id,
            chapter_id,
            start,
            end,
            output,
        } => {
            let defaults = PageRange::from(&config.brute_force);
            let range = PageRange::new(
                start.unwrap_or(defaults.start),
                end.unwrap_or(defaults.end),
            );
            if range.is_empty() {
                anyhow::bail!(
                    "Start index ({}) cannot be greater than end index ({})",
                    range.start,
                    range.end
                );
            }
            let dir = output.unwrap_or_else(|| {
                output_root
                    .join(safe_path_component(&comic_id, "baozimh"))
                    .join(format!("Chapter ID {}", safe_path_component(&chapter_id, "unknown")))
            });

            let saved = run_with_events(&console, args.json, |events| async move {
                baozimh
                    .download_by_id(&comic_id, &chapter_id, &dir, range, &events)
                    .await
            })
            .await;
            if saved == 0 {
                console.warning("No new images were saved");
            }
        }

        Command::DexSearch { query } => {
            let catalog = MangaDexClient::new(transport, config.mangadex.clone());
            let titles = catalog
                .search_titles(&query)
                .await
                .context("MangaDex search failed")?;
            if titles.is_empty() {
                console.warning(&format!("No titles found on {}", catalog.name()));
            } else {
                console.section(&format!("{} results for {:?}", catalog.name(), query));
            }
            for title in titles {
                let status = title.status.as_deref().unwrap_or("unknown");
                let languages = title.available_languages.join(",");
                println!(
                    "{}  {}  {}",
                    title.id,
                    title.title,
                    console.muted(&format!("[{}] {}", status, languages))
                );
                if let Some(file) = &title.cover_file {
                    let cover = catalog.cover_url(&title.id, file, Some(256));
                    println!("    {}", console.muted(&cover));
                }
            }
        }

        Command::DexChapters {
            manga_id,
            languages,
        } => {
            let languages = if languages.is_empty() {
                config.mangadex.languages.clone()
            } else {
                languages
            };
            let catalog = MangaDexClient::new(transport, config.mangadex.clone());
            let chapters = catalog
                .list_chapters(&manga_id, &languages)
                .await
                .context("Failed to list MangaDex chapters")?;
            console.info(&format!("Found {} chapters", console.count(chapters.len())));
            for chapter in chapters {
                println!(
                    "{}  [{}]  {}  {}",
                    chapter.id,
                    chapter.language,
                    chapter.label(),
                    console.muted(&chapter.groups.join(", "))
                );
            }
        }

        Command::DexDownload {
            chapter_id,
            data_saver,
            output,
        } => {
            let catalog = MangaDexClient::new(transport.clone(), config.mangadex.clone());
            let urls = catalog
                .resolve_chapter_images(&chapter_id, data_saver)
                .await
                .context("Failed to resolve MangaDex chapter images")?;
            if urls.is_empty() {
                anyhow::bail!("No images found for chapter {}", chapter_id);
            }

            let dir = output.unwrap_or_else(|| {
                output_root
                    .join("mangadex")
                    .join(format!("chapter_{}", short_id(&chapter_id, 8)))
            });
            let timeout = config.mangadex.timeout();
            let saved = run_with_events(&console, args.json, |events| async move {
                if !prepare_output_dir(&dir, &events).await {
                    return 0;
                }
                ImageDownloader::new(
                    transport.as_ref(),
                    browser_headers("https://mangadex.org/"),
                    timeout,
                )
                .download_all(&urls, &dir, &events)
                .await
            })
            .await;
            if saved == 0 {
                console.warning("No new images were saved");
            }
        }
    }

    Ok(())
}

/// Installs the tracing subscriber. `RUST_LOG` wins over the config.
fn init_tracing(debug: bool) {
    let default = if debug { "mangafetch=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Accepts either a full comic URL or a bare comic id.
fn comic_url(client: &BaozimhClient, comic: &str) -> String {
    if client.is_site_url(comic) {
        comic.to_string()
    } else {
        client.comic_url(comic)
    }
}

/// Default output directory for a chapter URL: `<root>/<comic>/<chapter>`.
fn chapter_dir(root: &Path, chapter_url: &str) -> PathBuf {
    let identity = extract_identity(chapter_url, None);
    let comic = identity
        .comic_id
        .as_deref()
        .map(|id| safe_path_component(id, "baozimh"))
        .unwrap_or_else(|| "baozimh".to_string());
    let chapter = match identity.ordering_slot {
        Some(slot) => format!("chapter_{}", slot),
        None => safe_path_component(&trailing_segment(chapter_url), "chapter"),
    };
    root.join(comic).join(chapter)
}

async fn download_baozimh(
    client: &BaozimhClient,
    chapter_url: &str,
    dir: &Path,
    console: &Console,
    json: bool,
) -> Result<()> {
    let outcome = run_with_events(console, json, |events| async move {
        client.download_chapter(chapter_url, dir, &events).await
    })
    .await;

    match outcome {
        ResolutionOutcome::Failed => anyhow::bail!("Could not download chapter {}", chapter_url),
        ResolutionOutcome::Downloaded { saved, total } if saved < total => {
            console.warning(&format!("{} of {} images failed", total - saved, total));
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Runs `work` while rendering its events as they arrive.
///
/// The sender is moved into `work`, so the renderer stops once the work
/// finishes and drops it.
async fn run_with_events<F, Fut, T>(console: &Console, json: bool, work: F) -> T
where
    F: FnOnce(EventSender) -> Fut,
    Fut: Future<Output = T>,
{
    let (tx, rx) = events::channel();
    let (result, ()) = tokio::join!(work(tx), render_events(rx, console, json));
    result
}

async fn render_events(mut rx: EventReceiver, console: &Console, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => console.error(&format!("Failed to encode event: {}", e)),
            }
        } else {
            console.event(&event);
        }
    }
}
