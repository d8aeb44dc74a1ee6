//! Zero-price checkout of catalog entries.
//!
//! [`CheckoutWorkflow`] drives one product page through the purchase dialog
//! until the browser reports the download. [`DownloadOrchestrator`] runs it
//! for every record the ledger does not know yet and always writes the
//! ledger back, even when the browser session is lost halfway.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserError, Locator, PageSession};
use crate::catalog::{AssetRecord, DownloadLedger, LedgerStatus};
use crate::config::DownloadConfig;

/// Opens the purchase dialog
pub const BUY_BUTTON: Locator = Locator::ClassName("buy_btn");
/// Price field in the purchase dialog
pub const MONEY_INPUT: Locator = Locator::ClassName("money_input");
pub const DOWNLOAD_BUTTON: Locator = Locator::ClassName("download_btn");
/// Shown once the browser has started the download
pub const DOWNLOAD_CONFIRMATION: Locator = Locator::ClassName("after_download_lightbox_widget");

/// Price typed into the purchase dialog
const ZERO_PRICE: &str = "0";

/// The purchase sequence for one product page, with a bounded wait per step.
#[derive(Debug, Clone)]
pub struct CheckoutWorkflow {
    pub step_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

impl CheckoutWorkflow {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            step_timeout: config.step_timeout,
            poll_interval: config.poll_interval,
            settle_delay: config.settle_delay,
        }
    }

    /// Navigate to `page_url`, pay nothing and wait for the download to start.
    pub fn run<P: PageSession + ?Sized>(&self, session: &mut P, page_url: &str) -> Result<(), BrowserError> {
        session.navigate(page_url)?;

        // Pages often carry several buy buttons, only some of them visible
        for button in session.find_all(BUY_BUTTON)? {
            match session.click(&button) {
                Ok(()) => break,
                Err(BrowserError::NotInteractable(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let money = session.wait_for(MONEY_INPUT, self.step_timeout, self.poll_interval)?;
        session.clear(&money)?;
        session.send_keys(&money, ZERO_PRICE)?;
        session.submit(&money)?;

        let download = session.wait_for(DOWNLOAD_BUTTON, self.step_timeout, self.poll_interval)?;
        session.click(&download)?;
        session.wait_for(DOWNLOAD_CONFIRMATION, self.step_timeout, self.poll_interval)?;

        thread::sleep(self.settle_delay);
        Ok(())
    }
}

/// Download statistics
#[derive(Debug, Default, Clone)]
pub struct DownloadStats {
    pub downloaded: usize,
    /// Already in the ledger from an earlier run
    pub already_present: usize,
    /// Recorded as skipped because the record has no page URL
    pub no_page: usize,
    /// Workflow failed; left out of the ledger for the next run
    pub failed: usize,
}

pub struct DownloadOrchestrator<'a, P: PageSession + ?Sized> {
    session: &'a mut P,
    workflow: CheckoutWorkflow,
    ledger: DownloadLedger,
}

impl<'a, P: PageSession + ?Sized> DownloadOrchestrator<'a, P> {
    pub fn new(session: &'a mut P, workflow: CheckoutWorkflow, ledger: DownloadLedger) -> Self {
        Self {
            session,
            workflow,
            ledger,
        }
    }

    /// Download every record not yet in the ledger, then save the ledger.
    ///
    /// The ledger is saved even when the loop ends early on a lost session.
    pub fn run(&mut self, records: &[AssetRecord]) -> Result<DownloadStats> {
        let mut stats = DownloadStats::default();
        let outcome = self.download_all(records, &mut stats);

        let saved = self
            .ledger
            .save()
            .with_context(|| format!("Failed to save ledger {}", self.ledger.path().display()));

        match (outcome, saved) {
            (Ok(()), Ok(())) => {}
            (Err(e), Ok(())) => return Err(e),
            (Ok(()), Err(e)) => return Err(e),
            (Err(e), Err(save_err)) => {
                error!("{:#}", save_err);
                return Err(e);
            }
        }

        info!(
            "Download finished: {} downloaded, {} already present, {} without page, {} failed",
            stats.downloaded, stats.already_present, stats.no_page, stats.failed
        );
        Ok(stats)
    }

    fn download_all(&mut self, records: &[AssetRecord], stats: &mut DownloadStats) -> Result<()> {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        for record in records {
            pb.inc(1);
            pb.set_message(record.title.clone());

            if self.ledger.contains(&record.title) {
                debug!("Skipping {}: already in ledger", record.title);
                stats.already_present += 1;
                continue;
            }

            let Some(page_url) = record.page_url.as_deref() else {
                warn!("Skipping {}: no asset page", record.title);
                self.ledger.insert(record, LedgerStatus::Skipped);
                stats.no_page += 1;
                continue;
            };

            if let Err(e) = self.session.close_extra_windows() {
                if e.is_fatal() {
                    pb.abandon();
                    return Err(e).context("Browser session lost");
                }
                warn!("Failed to close extra windows: {}", e);
            }

            info!("Downloading {}...", record.title);
            match self.workflow.run(&mut *self.session, page_url) {
                Ok(()) => {
                    info!("Downloaded {}", record.title);
                    self.ledger.insert(record, LedgerStatus::Downloaded);
                    stats.downloaded += 1;
                }
                Err(e) if e.is_fatal() => {
                    pb.abandon();
                    return Err(e).with_context(|| format!("Browser session lost while downloading {}", record.title));
                }
                Err(e) => {
                    let at = self.session.current_url().unwrap_or_default();
                    warn!("Failed to download {}: {} @ {}", record.title, e, at);
                    stats.failed += 1;
                }
            }
        }

        pb.finish_and_clear();
        Ok(())
    }
}
