//! Page-advance loop: fetch a page, filter its candidates, accumulate,
//! then either advance or stop.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::CrawlError;
use crate::filter::{is_complete, SeenSet};
use crate::venue::{Candidate, Venue};

/// One page worth of extraction output.
#[derive(Debug, Default, Clone)]
pub struct PageBatch {
    pub candidates: Vec<Candidate>,
    /// The source reported there is nothing at or beyond this page.
    pub end_of_results: bool,
}

/// Fetches and extracts a single listing page.
///
/// Calling it again with the same page and URL must be safe.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page: u32, url: &str) -> anyhow::Result<PageBatch>;
}

#[async_trait]
impl<'a, T: PageSource + ?Sized> PageSource for &'a T {
    async fn fetch_page(&self, page: u32, url: &str) -> anyhow::Result<PageBatch> {
        (**self).fetch_page(page, url).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    MaxPagesReached,
    EndOfResults,
    EmptyPage,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::MaxPagesReached => "max-pages-reached",
            Termination::EndOfResults => "end-of-results-signal",
            Termination::EmptyPage => "empty-page-with-no-signal",
        })
    }
}

/// What to do with a page that yields nothing new but did not signal the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPagePolicy {
    #[default]
    Stop,
    Continue,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub base_url: String,
    pub max_pages: u32,
    pub page_delay: Duration,
    pub required_fields: Vec<String>,
    pub empty_page: EmptyPagePolicy,
}

impl CrawlOptions {
    pub fn url_for(&self, page: u32) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}page={}", self.base_url, sep, page)
    }
}

/// Mutable state of a single run, threaded through the loop steps.
#[derive(Debug)]
pub struct RunState {
    pub page: u32,
    pub seen: SeenSet,
    pub venues: Vec<Venue>,
    pub pages_fetched: u32,
}

impl RunState {
    pub fn new() -> Self {
        RunState {
            page: 1,
            seen: SeenSet::new(),
            venues: Vec::new(),
            pages_fetched: 0,
        }
    }

    /// Validate and dedup one page of candidates, in adapter order.
    /// Returns the venues accepted from this page.
    pub fn filter_page<S: AsRef<str>>(
        &mut self,
        candidates: &[Candidate],
        required: &[S],
    ) -> Vec<Venue> {
        let mut accepted = Vec::new();
        for c in candidates {
            if !is_complete(c, required) {
                debug!("Page {}: dropping incomplete candidate", self.page);
                continue;
            }
            let venue = Venue::from_candidate(c);
            if self.seen.is_duplicate(&venue.name) {
                debug!("Page {}: duplicate venue '{}'", self.page, venue.name);
                continue;
            }
            self.seen.record_seen(&venue.name);
            accepted.push(venue);
        }
        accepted
    }

    pub fn accumulate(&mut self, accepted: Vec<Venue>) {
        self.venues.extend(accepted);
    }

    /// Move the cursor forward. Returns a termination when the cap is passed.
    pub fn advance(&mut self, max_pages: u32) -> Option<Termination> {
        self.page += 1;
        if self.page > max_pages {
            Some(Termination::MaxPagesReached)
        } else {
            None
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub venues: Vec<Venue>,
    pub termination: Termination,
    pub pages_fetched: u32,
}

/// Drive the page loop to termination. Adapter failures end the run.
pub async fn crawl<P: PageSource + ?Sized>(
    source: &P,
    opts: &CrawlOptions,
) -> Result<CrawlOutcome, CrawlError> {
    let mut state = RunState::new();

    let pb = ProgressBar::new(opts.max_pages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} page {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let termination = if opts.max_pages == 0 {
        Termination::MaxPagesReached
    } else {
        loop {
            let url = opts.url_for(state.page);
            info!("Scraping URL: {}", url);

            let batch = source
                .fetch_page(state.page, &url)
                .await
                .map_err(|source| CrawlError::Adapter {
                    page: state.page,
                    source,
                })?;
            state.pages_fetched += 1;
            pb.inc(1);

            if batch.end_of_results {
                info!("No more results on page {}. Ending crawl.", state.page);
                break Termination::EndOfResults;
            }

            let accepted = state.filter_page(&batch.candidates, opts.required_fields.as_slice());
            if accepted.is_empty() {
                match opts.empty_page {
                    EmptyPagePolicy::Stop => {
                        info!(
                            "No complete or new venues on page {}. Ending crawl.",
                            state.page
                        );
                        break Termination::EmptyPage;
                    }
                    EmptyPagePolicy::Continue => {
                        info!("No complete or new venues on page {}", state.page)
                    }
                }
            } else {
                info!(
                    "Found {} complete and non-duplicate venues on page {}",
                    accepted.len(),
                    state.page
                );
            }
            state.accumulate(accepted);
            pb.set_message(format!("{} venues", state.venues.len()));

            if let Some(t) = state.advance(opts.max_pages) {
                break t;
            }
            tokio::time::sleep(opts.page_delay).await;
        }
    };

    pb.finish_and_clear();
    info!(
        "Crawl finished ({}): {} pages fetched, {} venues collected, {} distinct names seen",
        termination,
        state.pages_fetched,
        state.venues.len(),
        state.seen.len()
    );

    Ok(CrawlOutcome {
        venues: state.venues,
        termination,
        pages_fetched: state.pages_fetched,
    })
}
