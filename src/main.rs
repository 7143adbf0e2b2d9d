use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::warn;

use article_history::api::{ContentFormat, MediaWikiClient, RedirectPolicy};
use article_history::config::Settings;
use article_history::fetch::Cancel;
use article_history::history::{HistoryAggregate, LastUpdated};
use article_history::pipeline::{self, BatchErrorPolicy, RunReport};

#[derive(Parser)]
#[command(
    name = "article_history",
    about = "Mine ArticleHistory templates from wiki talk pages"
)]
struct Cli {
    /// Max number of pages to search for ArticleHistory templates
    #[arg(short, long)]
    limit: Option<usize>,
    /// Template whose embedding pages are searched
    #[arg(short = 'C', long)]
    category: Option<String>,
    /// Simultaneous API requests
    #[arg(short, long)]
    concurrency: Option<usize>,
    /// Pages requested per API call
    #[arg(short, long)]
    grouping: Option<usize>,
    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Namespace to keep (1 = talk pages)
    #[arg(long, conflicts_with = "all_namespaces")]
    namespace: Option<i64>,
    /// Keep members from every namespace
    #[arg(long)]
    all_namespaces: bool,
    /// What to do when a batch request fails
    #[arg(long, value_enum)]
    on_batch_error: Option<BatchErrorPolicy>,
    /// Resolution of several titles redirecting to one page
    #[arg(long, value_enum)]
    redirects: Option<RedirectPolicy>,
    /// Ask the API to follow redirects
    #[arg(long)]
    follow_redirects: bool,
    /// Fetch rendered HTML instead of wikitext
    #[arg(long, value_enum)]
    content_format: Option<ContentFormat>,
    /// api.php endpoint
    #[arg(long)]
    api_url: Option<String>,
    /// Most recent histories to print
    #[arg(short = 'n', long, default_value = "20")]
    show: usize,
    /// Print every history as JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(self, mut s: Settings) -> Settings {
        if let Some(v) = self.limit {
            s.limit = v;
        }
        if let Some(v) = self.category {
            s.category = v;
        }
        if let Some(v) = self.concurrency {
            s.concurrency = v;
        }
        if let Some(v) = self.grouping {
            s.grouping = v;
        }
        if let Some(v) = self.timeout {
            s.timeout_secs = v;
        }
        if self.all_namespaces {
            s.namespace = None;
        } else if let Some(v) = self.namespace {
            s.namespace = Some(v);
        }
        if let Some(v) = self.on_batch_error {
            s.on_batch_error = v;
        }
        if let Some(v) = self.redirects {
            s.redirects = v;
        }
        if self.follow_redirects {
            s.follow_redirects = true;
        }
        if let Some(v) = self.content_format {
            s.content_format = v;
        }
        if let Some(v) = self.api_url {
            s.api_url = v;
        }
        s
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let show = cli.show;
    let json = cli.json;
    let settings = cli.apply(Settings::load().context("Failed to load settings")?);

    let client = MediaWikiClient::new(&settings.api_url, &settings.user_agent)?;
    let cancel = Cancel::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, draining in-flight batches");
                cancel.raise();
            }
        });
    }

    let report = pipeline::run(Arc::new(client), &settings, cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.histories)?);
    } else {
        print_table(&report, show);
    }
    print_summary(&report);

    println!("\nDone in {:.1}s", t0.elapsed().as_secs_f64());
    Ok(())
}

fn print_table(report: &RunReport, show: usize) {
    if report.histories.is_empty() {
        println!("No histories found.");
        return;
    }

    println!(
        "{:>3} | {:<40} | {:<8} | {:>7} | {:<16}",
        "#", "Article", "Status", "Actions", "Last updated"
    );
    println!("{}", "-".repeat(86));

    // Most recent first; histories are stored oldest first.
    for (i, h) in report.histories.iter().rev().take(show).enumerate() {
        println!(
            "{:>3} | {:<40} | {:<8} | {:>7} | {:<16}",
            i + 1,
            truncate(&h.document_title, 40),
            truncate(&h.status, 8),
            h.actions.len(),
            last_updated_label(h),
        );
    }
}

fn print_summary(report: &RunReport) {
    println!(
        "\n{} pages listed, {} selected, {} fetched.",
        report.enumerated, report.selected, report.fetched
    );
    println!(
        "Histories: {} aggregated, {} skipped (no template), {} failed (malformed template).",
        report.aggregated(),
        report.skipped,
        report.failed()
    );
    if report.failed_batches > 0 {
        println!(
            "Batches: {} failed ({} pages not fetched).",
            report.failed_batches, report.unfetched_ids
        );
    }
    if report.cancelled {
        println!("Run was cancelled before every batch was submitted.");
    }
    for f in report.failures.iter().take(10) {
        println!("  {}: {}", f.title, f.error);
    }
}

fn last_updated_label(h: &HistoryAggregate) -> String {
    match h.last_updated {
        LastUpdated::At(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        LastUpdated::Undated => "undated".into(),
        LastUpdated::NoHistory => "no history".into(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
