//! Mangafetch - manga search and chapter downloader.
//!
//! This library provides functionality for:
//! - Resolving Baozimh chapter images through a fallback chain (reader
//!   page, app endpoint, CDN guessing) and downloading them
//! - Searching and downloading from the MangaDex JSON API
//! - Reporting download progress as a stream of events

pub mod config;
pub mod console;
pub mod download;
pub mod error;
pub mod events;
pub mod http;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use error::{CatalogError, ConfigError, FetchFailed, ParseFailure, ResolveError};
pub use events::{DownloadEvent, EventKind, EventReceiver, EventSender};
pub use http::{HttpTransport, Transport};
pub use models::{ChapterReference, ComicReference, ResolvedChapterIdentity};
pub use sources::{BaozimhClient, MangaCatalog, MangaDexClient, ResolutionOutcome};
