mod diff;
mod error;
mod extract;
mod fetcher;
mod history;
mod normalize;
mod notify;
mod pipeline;
mod settings;
mod sites;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;

use fetcher::{HttpFetcher, PageFetcher, SpiderFetcher};
use history::HistoryStore;
use notify::{DiscordWebhook, Notifier};
use pipeline::Pipeline;
use settings::{FetcherKind, Settings};

#[derive(Parser)]
#[command(name = "careers_watch", about = "Watch careers pages and announce new postings")]
struct Cli {
    /// Settings file (default: ./careers_watch.{toml,yaml,json} if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, diff, notify and record each site; sites run concurrently
    Run {
        #[arg(required = true)]
        sites: Vec<String>,
    },
    /// List known site profiles
    Sites,
    /// Show recorded history for a site
    History {
        site: String,
        /// Max postings to list from the last snapshot
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Fetch and extract without notifying or recording
    Inspect { site: String },
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
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run { sites } => run_sites(settings, &sites).await,
        Commands::Sites => {
            for site in sites::SITES {
                let url = settings
                    .career_page_url(site)
                    .map(String::from)
                    .unwrap_or_else(|e| format!("({})", e));
                let strategy = match site.strategy {
                    extract::Strategy::Listing(_) => "listing",
                    extract::Strategy::Links => "links",
                };
                println!("{:<10} {:<8} {}", site.key, strategy, url);
            }
            Ok(())
        }
        Commands::History { site, limit } => {
            let profile = sites::lookup(&site)?;
            let store = HistoryStore::new(&settings.history_dir);
            let history = store.load(profile.key)?;
            let Some(last) = history.last() else {
                let path = store.path(profile.key);
                println!("No history for {} at {}", profile.key, path.display());
                return Ok(());
            };

            println!("{} snapshots for {}", history.len(), profile.label);
            println!("Last run: {} ({} postings)", last.date, last.jobs.len());
            println!("{}", "-".repeat(80));
            for (identity, url) in last.jobs.iter().take(limit) {
                println!("  {:<48} {}", truncate(identity, 48), url);
            }
            if last.jobs.len() > limit {
                println!("  ... {} more", last.jobs.len() - limit);
            }
            Ok(())
        }
        Commands::Inspect { site } => {
            let profile = sites::lookup(&site)?;
            let fetcher = build_fetcher(&settings)?;
            let store = HistoryStore::new(&settings.history_dir);
            let report = Pipeline::new(&settings, profile, fetcher.as_ref(), None, &store)
                .inspect()
                .await?;

            println!("{} ({} bytes)", report.url, report.markup_len);
            if report.challenged {
                println!("Cloudflare challenge detected in page content");
            }
            println!("\n--- Selectors ---");
            for (css, count) in &report.selector_hits {
                println!("  {:>4}  {}", count, css);
            }
            println!("\n--- Candidates ({}) ---", report.candidates.len());
            for c in &report.candidates {
                println!("  {} -> {}", truncate(&c.text, 60), c.url);
            }
            println!("\n--- Postings ({}) ---", report.postings.len());
            for (identity, url) in &report.postings {
                println!("  {} -> {}", truncate(identity, 60), url);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// One task per site. Duplicate site keys are collapsed so a history file
/// never has two writers.
async fn run_sites(settings: Settings, keys: &[String]) -> anyhow::Result<()> {
    let mut profiles = Vec::new();
    for key in keys {
        let profile = sites::lookup(key)?;
        if !profiles.iter().any(|p: &&sites::SiteProfile| p.key == profile.key) {
            profiles.push(profile);
        }
    }

    let fetcher = build_fetcher(&settings)?;
    let notifier = build_notifier(&settings)?;
    let store = Arc::new(HistoryStore::new(&settings.history_dir));
    let settings = Arc::new(settings);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message(format!("Watching {} site(s)...", profiles.len()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut tasks = JoinSet::new();
    for profile in profiles {
        let settings = Arc::clone(&settings);
        let fetcher = Arc::clone(&fetcher);
        let notifier = notifier.clone();
        let store = Arc::clone(&store);

        tasks.spawn(async move {
            Pipeline::new(&settings, profile, fetcher.as_ref(), notifier.as_deref(), &store)
                .run()
                .await
                .map_err(|e| (profile.key, e))
        });
    }

    let total = tasks.len();
    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined.context("pipeline task panicked")? {
            Ok(report) => pb.println(report.to_string()),
            Err((site, e)) => {
                failed += 1;
                pb.println(format!("{}: FAILED: {}", site, e));
            }
        }
    }
    pb.finish_and_clear();

    if failed > 0 {
        anyhow::bail!("{} of {} runs failed", failed, total);
    }
    Ok(())
}

fn build_fetcher(settings: &Settings) -> anyhow::Result<Arc<dyn PageFetcher>> {
    let fetcher: Arc<dyn PageFetcher> = match settings.fetcher {
        FetcherKind::Spider => Arc::new(SpiderFetcher::new(settings.spider_api_key.clone())?),
        FetcherKind::Http => Arc::new(HttpFetcher::new()?),
    };
    Ok(fetcher)
}

fn build_notifier(settings: &Settings) -> anyhow::Result<Option<Arc<dyn Notifier>>> {
    let Some(url) = settings.webhook()? else {
        tracing::warn!("No webhook_url configured; new postings will only be logged");
        return Ok(None);
    };
    let notifier: Arc<dyn Notifier> = Arc::new(DiscordWebhook::new(
        url,
        settings.webhook_username.clone(),
        settings.webhook_avatar.clone(),
        settings.webhook_timeout(),
    )?);
    Ok(Some(notifier))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
