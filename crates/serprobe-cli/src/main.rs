use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use serprobe_client::HttpFetcher;
use serprobe_core::bulk::BulkRunner;
use serprobe_core::config::EngineConfig;
use serprobe_core::limiter::RateLimiter;
use serprobe_core::models::{BulkEntry, SerpResponse};
use serprobe_core::orchestrator::SearchOrchestrator;
use serprobe_core::rotation::RotationManager;
use serprobe_core::traits::{Fetcher, NullStore};

mod export;

#[derive(Parser)]
#[command(name = "serprobe", version, about = "SERP acquisition and extraction engine")]
struct Cli {
    /// Directory for exported JSON/CSV artifacts
    #[arg(long, default_value = "results")]
    out_dir: PathBuf,

    /// Add the rendered-browser fallback strategy (requires Chromium)
    #[cfg(feature = "browser")]
    #[arg(long, default_value_t = false)]
    browser: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query through the strategy ladder
    Search {
        query: String,

        /// Number of results to return
        #[arg(short, long)]
        num: Option<usize>,

        /// Skip writing JSON/CSV artifacts
        #[arg(long, default_value_t = false)]
        no_export: bool,
    },

    /// Run queries from a file, one per line
    Bulk {
        file: PathBuf,

        /// Number of results per query
        #[arg(short, long)]
        num: Option<usize>,

        /// Skip writing JSON/CSV artifacts
        #[arg(long, default_value_t = false)]
        no_export: bool,
    },

    /// Audit pages for structure and metadata
    Audit {
        /// URLs to audit
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("serprobe=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let limiter = RateLimiter::new(config.limiter.clone());
    let rotation =
        RotationManager::new(config.rotation.clone()).map_err(|e| anyhow::anyhow!(e))?;
    let fetcher = HttpFetcher::new(limiter.clone());

    #[cfg(feature = "browser")]
    if cli.browser {
        // A failed launch degrades to direct-only strategies.
        match serprobe_client::BrowserFetcher::new(limiter.clone()).await {
            Ok(browser) => {
                let orchestrator = SearchOrchestrator::with_rendered(
                    fetcher.clone(),
                    browser,
                    rotation.clone(),
                    &config,
                );
                let runner =
                    BulkRunner::new(orchestrator, fetcher, rotation, NullStore, &config)
                        .map_err(|e| anyhow::anyhow!(e))?;
                return dispatch(cli.command, &cli.out_dir, runner, &config).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Browser unavailable; using direct strategies only");
            }
        }
    }

    let orchestrator =
        SearchOrchestrator::<_, HttpFetcher>::new(fetcher.clone(), rotation.clone(), &config);
    let runner = BulkRunner::new(orchestrator, fetcher, rotation, NullStore, &config)
        .map_err(|e| anyhow::anyhow!(e))?;
    dispatch(cli.command, &cli.out_dir, runner, &config).await
}

async fn dispatch<F, R>(
    command: Commands,
    out_dir: &std::path::Path,
    runner: BulkRunner<F, R, NullStore>,
    config: &EngineConfig,
) -> Result<()>
where
    F: Fetcher + 'static,
    R: Fetcher + 'static,
{
    match command {
        Commands::Search {
            query,
            num,
            no_export,
        } => {
            let want = num.unwrap_or(config.num_results);
            let entries = runner.run_queries(&[query], want).await;
            let entry = entries.into_iter().next().context("no entry returned")?;
            let response = entry.outcome.context("query task failed")?;
            report_response(&response, out_dir, no_export)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Bulk {
            file,
            num,
            no_export,
        } => {
            let want = num.unwrap_or(config.num_results);
            let queries = read_lines(&file)?;
            if queries.is_empty() {
                anyhow::bail!("No queries found in {}", file.display());
            }

            let entries = runner.run_queries(&queries, want).await;
            for entry in &entries {
                match &entry.outcome {
                    Some(response) => {
                        report_response(response, out_dir, no_export)?;
                        println!(
                            "{}: {} results",
                            entry.item,
                            response.results.len()
                        );
                    }
                    None => println!(
                        "{}: FAILED ({})",
                        entry.item,
                        entry.error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            summarize(&entries);
        }
        Commands::Audit { urls } => {
            let entries = runner.run_audits(&urls).await;
            for entry in &entries {
                match &entry.outcome {
                    Some(audit) => {
                        let path = export::export_audit(out_dir, audit)?;
                        tracing::info!(url = %entry.item, path = %path.display(), "Audit saved");
                        println!("{}", serde_json::to_string_pretty(audit)?);
                    }
                    None => println!(
                        "{}: FAILED ({})",
                        entry.item,
                        entry.error.as_deref().unwrap_or("unknown error")
                    ),
                }
            }
            summarize(&entries);
        }
    }

    Ok(())
}

fn report_response(
    response: &SerpResponse,
    out_dir: &std::path::Path,
    no_export: bool,
) -> Result<()> {
    if response.is_empty() {
        tracing::warn!(query = %response.query, "No results found");
        return Ok(());
    }
    if !no_export {
        let paths = export::export_response(out_dir, response)?;
        tracing::info!(
            query = %response.query,
            json = %paths.json.display(),
            csv = %paths.csv.display(),
            "Results saved"
        );
    }
    Ok(())
}

fn summarize<T>(entries: &[BulkEntry<T>]) {
    let ok = entries.iter().filter(|e| e.is_ok()).count();
    println!("\nTotal: {} items, {} ok, {} failed", entries.len(), ok, entries.len() - ok);
}

fn read_lines(path: &std::path::Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}
