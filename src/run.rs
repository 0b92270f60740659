//! One top-level run. Whatever happens while crawling, the pool is closed and
//! exactly one completion notification goes out.

use std::fmt::Display;
use std::future::Future;
use std::path::Path;

use tracing::{error, info, warn};

use crate::crawl::{self, PageSource, Termination};
use crate::db::{self, ConnectParams, PoolHandle};
use crate::error::CrawlError;
use crate::export;
use crate::notify::{Notifier, RunStatus};
use crate::settings::Settings;

#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub message: String,
    pub saved: usize,
    pub termination: Option<Termination>,
    pub pages_fetched: u32,
}

struct Collected {
    saved: usize,
    termination: Termination,
    pages_fetched: u32,
}

/// Build the page source, crawl, persist, tear down, notify. `shutdown`
/// resolving cancels the crawl at its next await point; cleanup still runs.
pub async fn execute<P, B, F>(
    settings: &Settings,
    build_source: B,
    notifier: &Notifier,
    shutdown: F,
) -> RunReport
where
    P: PageSource,
    B: FnOnce(&Settings) -> anyhow::Result<P>,
    F: Future<Output = ()>,
{
    let mut pool = PoolHandle::new();

    // A crawl that has already finished wins over a signal arriving in the same poll.
    let result = tokio::select! {
        biased;
        r = crawl_and_save(&mut pool, settings, build_source) => r,
        _ = shutdown => {
            warn!("Shutdown requested, abandoning crawl");
            Err(CrawlError::Interrupted)
        }
    };

    pool.close().await;

    let report = match result {
        Ok(c) => RunReport {
            status: RunStatus::Success,
            message: "Crawl completed.".to_string(),
            saved: c.saved,
            termination: Some(c.termination),
            pages_fetched: c.pages_fetched,
        },
        Err(e) => {
            let message = if e.is_connection() {
                format!("Crawl failed: Database connection error - {}", e)
            } else {
                unexpected_failure(&e)
            };
            failed(message)
        }
    };

    send(notifier, report).await
}

/// Settings could not be loaded, so no run started. The completion
/// notification is still owed.
pub async fn abort(notifier: &Notifier, reason: &anyhow::Error) -> RunReport {
    send(notifier, failed(unexpected_failure(reason))).await
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
pub async fn shutdown_signal<S>(signal: S)
where
    S: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn unexpected_failure(e: &dyn Display) -> String {
    format!("Crawl failed: An unexpected error occurred - {}", e)
}

fn failed(message: String) -> RunReport {
    error!("{}", message);
    RunReport {
        status: RunStatus::Failure,
        message,
        saved: 0,
        termination: None,
        pages_fetched: 0,
    }
}

async fn send(notifier: &Notifier, report: RunReport) -> RunReport {
    info!(
        "Sending completion webhook. Status: {:?}, venues: {}",
        report.status, report.saved
    );
    notifier
        .notify(report.status, &report.message, report.saved)
        .await;
    report
}

async fn crawl_and_save<P, B>(
    pool: &mut PoolHandle,
    settings: &Settings,
    build_source: B,
) -> Result<Collected, CrawlError>
where
    P: PageSource,
    B: FnOnce(&Settings) -> anyhow::Result<P>,
{
    let source = build_source(settings).map_err(CrawlError::Setup)?;
    let params = ConnectParams::resolve(&settings.database)?;
    pool.initialize(&params).await?;

    let outcome = crawl::crawl(&source, &settings.crawl_options()).await?;

    if let Some(path) = settings.csv_path.as_deref() {
        // Secondary export: a failure here does not fail the run.
        if let Err(e) = export::save_venues_to_csv(&outcome.venues, Path::new(path)) {
            warn!("CSV export failed: {:#}", e);
        }
    }

    let saved = if outcome.venues.is_empty() {
        info!("No venues were collected during the crawl");
        0
    } else {
        info!("Saving {} venues to database", outcome.venues.len());
        db::save_venues(pool, &outcome.venues).await?
    };

    Ok(Collected {
        saved,
        termination: outcome.termination,
        pages_fetched: outcome.pages_fetched,
    })
}
