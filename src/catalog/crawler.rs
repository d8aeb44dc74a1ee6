//! Lazy-loading listing crawler.
//!
//! The listing only reveals more entries after scrolling to the bottom. The
//! crawler keeps a monotonically increasing offset into the full entry list,
//! so every entry is parsed exactly once:
//!
//! - `Scanning`: parse the current batch, stop once the target is reached
//! - `WaitingForMore`: scroll, then poll the entry count until it grows
//! - `Done`: target reached, or the listing stopped growing

use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use super::{parse_entry, MetadataStore, GAME_CELL};
use crate::browser::{poll_until, BrowserError, ElementRef, PageSession};
use crate::config::CrawlConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// No new entries appeared within the growth timeout
    ListingExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::ListingExhausted => write!(f, "no more entries"),
        }
    }
}

#[derive(Debug)]
enum CrawlState {
    Scanning(Vec<ElementRef>),
    WaitingForMore,
    Done(StopReason),
}

/// Crawl statistics
#[derive(Debug, Default, Clone)]
pub struct CrawlStats {
    /// Entries taken from the listing
    pub parsed: usize,
    /// Metadata files written
    pub written: usize,
    /// Titles already seen in this crawl
    pub duplicates: usize,
    /// Entries without a title
    pub skipped: usize,
    pub stop: Option<StopReason>,
}

pub struct CatalogCrawler<'a, P: PageSession + ?Sized> {
    session: &'a mut P,
    config: CrawlConfig,
    store: MetadataStore,
    titles: HashSet<String>,
}

impl<'a, P: PageSession + ?Sized> CatalogCrawler<'a, P> {
    pub fn new(session: &'a mut P, config: CrawlConfig) -> Self {
        let store = MetadataStore::new(&config.out_dir);
        Self {
            session,
            config,
            store,
            titles: HashSet::new(),
        }
    }

    /// Crawl until the target count is reached or the listing stops growing.
    pub fn run(&mut self) -> Result<CrawlStats> {
        self.store.create_dir()?;
        self.session
            .navigate(&self.config.base_url)
            .with_context(|| format!("Failed to open {}", self.config.base_url))?;

        let pb = ProgressBar::new(self.config.target_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut stats = CrawlStats::default();
        let first = self.session.find_all(GAME_CELL).context("Failed to read the listing")?;
        let mut seen = first.len();
        let mut state = CrawlState::Scanning(first);

        loop {
            state = match state {
                CrawlState::Scanning(batch) => {
                    debug!("Parsing batch of {} entries", batch.len());
                    for cell in &batch {
                        self.take_entry(cell, &mut stats)?;
                        pb.set_position(stats.parsed as u64);
                        if stats.parsed % 10 == 0 {
                            pb.set_message(format!("{} written", stats.written));
                        }
                    }

                    if stats.parsed >= self.config.target_count {
                        CrawlState::Done(StopReason::TargetReached)
                    } else {
                        CrawlState::WaitingForMore
                    }
                }
                CrawlState::WaitingForMore => match self.wait_for_growth(seen)? {
                    Some(batch) => {
                        info!("Found {} new entries", batch.len());
                        seen += batch.len();
                        CrawlState::Scanning(batch)
                    }
                    None => {
                        info!(
                            "No new entries after {:?} of waiting",
                            self.config.growth_timeout
                        );
                        CrawlState::Done(StopReason::ListingExhausted)
                    }
                },
                CrawlState::Done(reason) => {
                    stats.stop = Some(reason);
                    break;
                }
            };
        }

        pb.finish_and_clear();
        info!(
            "Crawl finished ({}): {} parsed, {} written, {} duplicates, {} without title",
            stats.stop.map(|r| r.to_string()).unwrap_or_default(),
            stats.parsed,
            stats.written,
            stats.duplicates,
            stats.skipped
        );
        Ok(stats)
    }

    fn take_entry(&mut self, cell: &ElementRef, stats: &mut CrawlStats) -> Result<()> {
        stats.parsed += 1;

        let Some(record) = parse_entry(&mut *self.session, cell)? else {
            warn!("Listing entry {} has no title, skipping", cell.0);
            stats.skipped += 1;
            return Ok(());
        };

        if !self.titles.insert(record.title.clone()) {
            info!("Duplicate title in listing: {}", record.title);
            stats.duplicates += 1;
            return Ok(());
        }

        let path = self.store.write(&record)?;
        debug!("Wrote {}", path.display());
        stats.written += 1;
        Ok(())
    }

    /// Scroll and wait for the entry count to exceed `seen`.
    ///
    /// Returns exactly the newly appeared entries, in listing order.
    fn wait_for_growth(&mut self, seen: usize) -> Result<Option<Vec<ElementRef>>, BrowserError> {
        debug!("Scrolling for more entries (seen {})", seen);
        if let Err(e) = self.session.scroll_to_bottom() {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Scroll failed: {}", e);
        }

        let session = &mut *self.session;
        let grown = poll_until(self.config.growth_timeout, self.config.poll_interval, || {
            match session.find_all(GAME_CELL) {
                Ok(all) if all.len() > seen => Ok(Some(all)),
                Ok(_) => Ok(None),
                Err(e) if e.is_fatal() => Err(e),
                Err(_) => Ok(None),
            }
        })?;

        Ok(grown.map(|all| all.into_iter().skip(seen).collect()))
    }
}
