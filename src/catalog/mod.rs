//! Asset catalog: listing records, the lazy-loading crawler and the record stores.

mod crawler;
mod store;

pub use crawler::{CatalogCrawler, CrawlStats, StopReason};
pub use store::{DownloadLedger, LedgerRow, LedgerStatus, MetadataStore, PersistenceError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{BrowserError, ElementRef, Locator, PageSession};

/// One listing entry
pub const GAME_CELL: Locator = Locator::ClassName("game_cell");
pub const GAME_TITLE: Locator = Locator::ClassName("game_title");
pub const GAME_AUTHOR: Locator = Locator::ClassName("game_author");
pub const GAME_TEXT: Locator = Locator::ClassName("game_text");
/// Link to the asset page (`href`)
pub const GAME_LINK: Locator = Locator::ClassName("game_link");
/// Thumbnail (`src` of the first image)
pub const GAME_IMAGE: Locator = Locator::TagName("img");

/// One discovered catalog entry.
///
/// `title` is the key: it names the metadata file and dedups downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(rename = "text", default)]
    pub description: Option<String>,

    #[serde(rename = "asset_page_url", default)]
    pub page_url: Option<String>,

    #[serde(rename = "image_src", default)]
    pub image_url: Option<String>,
}

/// Read one listing entry.
///
/// Every field is looked up independently; a missing field is `None` and
/// never aborts the entry. Returns `Ok(None)` when the entry has no title.
/// Only a lost session is an error.
pub fn parse_entry<P>(session: &mut P, cell: &ElementRef) -> Result<Option<AssetRecord>, BrowserError>
where
    P: PageSession + ?Sized,
{
    let title = lookup_text(session, cell, GAME_TITLE)?;
    let author = lookup_text(session, cell, GAME_AUTHOR)?;
    let description = lookup_text(session, cell, GAME_TEXT)?;
    let page_url = lookup(session, cell, GAME_LINK, |s, e| s.property(e, "href"))?;
    let image_url = lookup(session, cell, GAME_IMAGE, |s, e| s.property(e, "src"))?;

    let Some(title) = title.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    Ok(Some(AssetRecord {
        title,
        author: author.unwrap_or_default(),
        description,
        page_url,
        image_url,
    }))
}

fn lookup_text<P>(session: &mut P, cell: &ElementRef, locator: Locator) -> Result<Option<String>, BrowserError>
where
    P: PageSession + ?Sized,
{
    lookup(session, cell, locator, |s, e| s.text(e).map(|t| Some(t.trim().to_string())))
}

fn lookup<P, F>(session: &mut P, cell: &ElementRef, locator: Locator, read: F) -> Result<Option<String>, BrowserError>
where
    P: PageSession + ?Sized,
    F: FnOnce(&mut P, &ElementRef) -> Result<Option<String>, BrowserError>,
{
    let result = session
        .find_child(cell, locator)
        .and_then(|child| read(session, &child));

    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!("No {} in {}: {}", locator, cell.0, e);
            Ok(None)
        }
    }
}
