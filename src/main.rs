mod crawl;
mod db;
mod error;
mod export;
mod extract;
mod fetch;
mod filter;
mod notify;
mod run;
mod settings;
mod venue;

use std::collections::HashMap;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::notify::{Notifier, RunStatus};
use crate::settings::{Settings, WebhookSettings};

#[derive(Parser)]
#[command(name = "venue-crawler", about = "Crawl venue listings into Postgres")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl listing pages, save new venues, send the completion webhook
    Run {
        /// Max listing pages to fetch (default: CRAWLER_MAX_PAGES or 2)
        #[arg(short = 'n', long)]
        max_pages: Option<u32>,
        /// Also export collected venues to this CSV file
        #[arg(long)]
        csv: Option<String>,
        /// Pause between pages in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Connect and create the venues table
    Init,
    /// Show how many venues are stored
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            if matches!(cli.command, Commands::Run { .. }) {
                let vars: HashMap<String, String> = std::env::vars().collect();
                let notifier = Notifier::new(&WebhookSettings::from_vars(&vars));
                run::abort(&notifier, &e).await;
            }
            return Err(e);
        }
    };

    let result = match cli.command {
        Commands::Run {
            max_pages,
            csv,
            delay_ms,
        } => {
            if let Some(n) = max_pages {
                settings.max_pages = n;
            }
            if csv.is_some() {
                settings.csv_path = csv;
            }
            if let Some(ms) = delay_ms {
                settings.page_delay_ms = ms;
            }

            let notifier = Notifier::new(&settings.webhook);
            let shutdown = run::shutdown_signal(tokio::signal::ctrl_c());

            let report = run::execute(
                &settings,
                fetch::CatalogSource::from_settings,
                &notifier,
                shutdown,
            )
            .await;
            match report.status {
                RunStatus::Success => {
                    println!(
                        "{} {} venues submitted from {} pages ({}).",
                        report.message,
                        report.saved,
                        report.pages_fetched,
                        report
                            .termination
                            .map(|t| t.to_string())
                            .unwrap_or_default()
                    );
                    Ok(())
                }
                RunStatus::Failure => Err(anyhow::anyhow!(report.message)),
            }
        }
        Commands::Init => {
            let params = db::ConnectParams::resolve(&settings.database)?;
            let mut pool = db::PoolHandle::new();
            pool.initialize(&params).await?;
            println!(
                "Venues table ready at {} ({:?}, pool {:?})",
                params.redacted(),
                params.backend(),
                pool.status()
            );
            pool.close().await;
            Ok(())
        }
        Commands::Stats => {
            let params = db::ConnectParams::resolve(&settings.database)?;
            let mut pool = db::PoolHandle::new();
            pool.initialize(&params).await?;
            let count = db::count_venues(&pool).await;
            pool.close().await;
            println!("Venues stored: {}", count?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
