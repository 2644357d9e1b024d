use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

use podtrack::{
    FetchLimits, IngestOptions, IngestReport, Ingestor, JsonStore, ListeningStats, NoopReporter, Podcast,
    PodcastId, ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter, fetch_feed,
    human_seconds, logging,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");
static CHECK: Emoji<'_, '_> = Emoji("✔ ", "* ");

/// Track podcast feeds and how much of them you have heard
#[derive(Parser, Debug)]
#[command(name = "podtrack")]
#[command(about = "Track podcast feeds and your listening backlog")]
#[command(version)]
struct Args {
    /// Path of the JSON store
    #[arg(long, env = "PODTRACK_STORE", default_value = "podtrack.json", global = true)]
    store: PathBuf,

    /// Seconds to wait for each feed or audio fetch
    #[arg(
        long,
        env = "PODTRACK_TIMEOUT",
        default_value = "30",
        global = true,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Never download audio to measure episodes without a duration
    #[arg(long, global = true)]
    no_decode: bool,

    /// Maximum number of episodes resolved concurrently per podcast
    #[arg(short = 'c', long, default_value = "3", global = true)]
    concurrent: usize,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a podcast feed under a numeric id
    Add {
        id: PodcastId,
        feed_url: Url,
        /// Display name; taken from the feed title when omitted
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Subscribe to a podcast and fetch its episodes in the background
    Subscribe { id: PodcastId },
    /// Remove a subscription
    Unsubscribe { id: PodcastId },
    /// Fetch the latest episodes of one or all subscribed podcasts
    Refresh {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<PodcastId>,
        #[arg(short, long)]
        all: bool,
    },
    /// List stored episodes of a podcast, newest first
    Episodes { id: PodcastId },
    /// Mark an episode as listened
    Listen { id: PodcastId, guid: String },
    /// Mark an episode as not listened
    Unlisten { id: PodcastId, guid: String },
    /// Show unlistened episodes and time per subscription
    Stats,
}

/// Progress reporter using an indicatif spinner for terminal output
struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { podcast_id, url } => {
                self.bar.set_message(format!(
                    "{SEARCH}[{podcast_id}] Fetching feed: {}",
                    url.cyan()
                ));
            }

            ProgressEvent::FeedParsed {
                podcast_id,
                feed_title,
                entries,
            } => {
                self.bar.set_message(format!(
                    "{HEADPHONES}[{podcast_id}] {} • {} entries",
                    feed_title.bold().green(),
                    entries.to_string().cyan()
                ));
            }

            ProgressEvent::EpisodeNormalized {
                podcast_id,
                episode_title,
                duration_secs,
            } => {
                self.bar.set_message(format!(
                    "[{podcast_id}] {} ({})",
                    truncate_title(&episode_title, 40),
                    human_seconds(duration_secs).dimmed()
                ));
            }

            ProgressEvent::EpisodeSkipped {
                podcast_id,
                episode_title,
                error,
            } => {
                self.bar.println(format!(
                    "  {CROSS}[{podcast_id}] {} - {}",
                    truncate_title(&episode_title, 30).yellow(),
                    error.dimmed()
                ));
            }

            ProgressEvent::IngestCompleted {
                podcast_id,
                inserted,
                updated,
                skipped,
            } => {
                self.bar.println(format!(
                    "{SUCCESS}[{podcast_id}] {} new, {} updated, {} skipped",
                    inserted.to_string().green().bold(),
                    updated.to_string().cyan(),
                    if skipped > 0 {
                        skipped.to_string().yellow()
                    } else {
                        skipped.to_string().green()
                    }
                ));
            }

            ProgressEvent::IngestFailed { podcast_id, error } => {
                self.bar
                    .println(format!("{FAILURE}[{podcast_id}] {}", error.red()));
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

struct App {
    args: Args,
    store: Arc<JsonStore>,
    client: Arc<ReqwestClient>,
}

impl App {
    fn options(&self) -> IngestOptions {
        IngestOptions {
            decode_audio: !self.args.no_decode,
            fetch_timeout: Duration::from_secs(self.args.timeout),
            max_concurrent: self.args.concurrent,
        }
    }

    /// Run `f` with an ingestor, showing a spinner unless quiet
    async fn with_ingestor<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(Ingestor) -> Fut,
        Fut: Future<Output = T>,
    {
        let ingestor = Ingestor::new(self.client.clone(), self.store.clone(), self.options());

        if self.args.quiet {
            return f(ingestor.with_reporter(NoopReporter::shared())).await;
        }

        let spinner = Arc::new(SpinnerReporter::new());
        let reporter: SharedProgressReporter = spinner.clone();
        let result = f(ingestor.with_reporter(reporter)).await;
        spinner.finish();
        result
    }

    async fn add(&self, id: PodcastId, feed_url: Url, name: Option<String>) -> Result<()> {
        let name = match name {
            Some(name) => name,
            None => {
                let limits = FetchLimits::new(Duration::from_secs(self.args.timeout));
                fetch_feed(self.client.as_ref(), feed_url.as_str(), &limits)
                    .await
                    .context("Failed to read feed title; pass --name to skip")?
                    .title
            }
        };

        let podcast = Podcast { id, name, feed_url };
        self.store
            .update(|data| {
                data.put_podcast(podcast.clone());
                Ok(())
            })
            .await
            .context("Failed to save podcast")?;

        self.say(format!(
            "{SUCCESS}Added {} {}",
            podcast.name.bold().green(),
            format!("(#{id})").dimmed()
        ));
        Ok(())
    }

    async fn subscribe(&self, id: PodcastId) -> Result<()> {
        let added = self
            .store
            .update(|data| data.subscribe(id))
            .await
            .context("Failed to subscribe")?;

        if !added {
            self.say(format!("{CHECK}Already subscribed to #{id}"));
            return Ok(());
        }
        self.say(format!("{SUCCESS}Subscribed to #{id}"));

        // The refresh runs on its own; wait for it only so the process does not exit first
        self.with_ingestor(|ingestor| async move { ingestor.spawn_refresh(id).await })
            .await
            .context("Background refresh panicked")?;
        Ok(())
    }

    async fn unsubscribe(&self, id: PodcastId) -> Result<()> {
        let removed = self
            .store
            .update(|data| Ok(data.unsubscribe(id)))
            .await
            .context("Failed to unsubscribe")?;

        if removed {
            self.say(format!("{SUCCESS}Unsubscribed from #{id}"));
        } else {
            self.say(format!("{CHECK}Not subscribed to #{id}"));
        }
        Ok(())
    }

    async fn refresh(&self, id: PodcastId) -> Result<()> {
        let report = self
            .with_ingestor(|ingestor| async move { ingestor.ingest(id).await })
            .await
            .with_context(|| format!("Failed to refresh podcast #{id}"))?;

        self.print_report(&report);
        Ok(())
    }

    async fn refresh_all(&self) -> Result<()> {
        let ids = self.store.snapshot().await.subscriptions;
        if ids.is_empty() {
            self.say(format!("{CHECK}No subscriptions to refresh"));
            return Ok(());
        }

        let results = self
            .with_ingestor(|ingestor| async move { ingestor.refresh_all(ids).await })
            .await;

        let mut failed = 0;
        for (id, result) in &results {
            match result {
                Ok(report) => self.print_report(report),
                Err(e) => {
                    failed += 1;
                    if !self.args.quiet {
                        println!("  {CROSS}#{id} - {}", e.to_string().dimmed());
                    }
                }
            }
        }

        if !self.args.quiet {
            println!(
                "\n{PARTY}{} {} refreshed, {} failed",
                "Refresh complete:".bold().green(),
                (results.len() - failed).to_string().green().bold(),
                if failed > 0 {
                    failed.to_string().red().bold()
                } else {
                    failed.to_string().green()
                }
            );
        }

        if failed == results.len() {
            bail!("Every refresh failed");
        }
        Ok(())
    }

    async fn episodes(&self, id: PodcastId) -> Result<()> {
        let data = self.store.snapshot().await;
        let podcast = data.podcast(id)?;

        println!("{HEADPHONES}{}", podcast.name.bold().green());
        for episode in data.episodes_for(id) {
            let marker = if data.is_listened(id, &episode.guid) {
                CHECK.to_string().green()
            } else {
                "  ".normal()
            };
            println!(
                "  {marker}{} {} {}",
                episode.published_at.format("%Y-%m-%d").to_string().dimmed(),
                truncate_title(&episode.title, 60),
                human_seconds(episode.duration_secs).cyan()
            );
            println!("      {}", episode.guid.dimmed());
        }
        Ok(())
    }

    async fn listen(&self, id: PodcastId, guid: String) -> Result<()> {
        self.store
            .update(|data| data.mark_listened(id, &guid, Utc::now()))
            .await
            .context("Failed to mark episode listened")?;

        self.say(format!("{SUCCESS}Marked {} as listened", guid.cyan()));
        Ok(())
    }

    async fn unlisten(&self, id: PodcastId, guid: String) -> Result<()> {
        let removed = self
            .store
            .update(|data| Ok(data.unmark_listened(id, &guid)))
            .await
            .context("Failed to update listens")?;

        if removed {
            self.say(format!("{SUCCESS}Marked {} as not listened", guid.cyan()));
        } else {
            self.say(format!("{CHECK}{} was not marked listened", guid.cyan()));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<()> {
        let data = self.store.snapshot().await;

        for podcast in data.subscribed_podcasts() {
            let stats = ListeningStats::for_podcast(&data, podcast.id);
            println!(
                "  {HEADPHONES}{} {} unlistened of {}, {}",
                truncate_title(&podcast.name, 40).bold(),
                stats.unlistened_episodes.to_string().yellow(),
                stats.episodes,
                human_seconds(stats.unlistened_secs).cyan()
            );
        }

        let total = ListeningStats::for_subscriptions(&data);
        println!(
            "\n{PARTY}{} {} episodes, {}",
            "Backlog:".bold().green(),
            total.unlistened_episodes.to_string().yellow().bold(),
            human_seconds(total.unlistened_secs).cyan().bold()
        );
        Ok(())
    }

    fn print_report(&self, report: &IngestReport) {
        if self.args.quiet {
            return;
        }
        println!(
            "{HEADPHONES}{} {} stored",
            report.feed_title.bold().green(),
            report.stored().to_string().cyan()
        );
        for (title, error) in &report.skipped {
            println!("  {CROSS}{} - {}", title.yellow(), error.dimmed());
        }
    }

    fn say(&self, message: String) {
        if !self.args.quiet {
            println!("{message}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("warn")?;
    let args = Args::parse();

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podtrack".bold().magenta(),
            "- Podcast Tracker".dimmed()
        );
    }

    let store = JsonStore::open(&args.store)
        .with_context(|| format!("Failed to open store {}", args.store.display()))?;
    let client = ReqwestClient::with_timeout(Duration::from_secs(args.timeout))
        .context("Failed to build HTTP client")?;

    let app = App {
        args,
        store: Arc::new(store),
        client: Arc::new(client),
    };

    match &app.args.command {
        Command::Add { id, feed_url, name } => app.add(*id, feed_url.clone(), name.clone()).await,
        Command::Subscribe { id } => app.subscribe(*id).await,
        Command::Unsubscribe { id } => app.unsubscribe(*id).await,
        Command::Refresh { all: true, .. } => app.refresh_all().await,
        Command::Refresh { id: Some(id), .. } => app.refresh(*id).await,
        Command::Refresh { id: None, .. } => bail!("Pass a podcast id or --all"),
        Command::Episodes { id } => app.episodes(*id).await,
        Command::Listen { id, guid } => app.listen(*id, guid.clone()).await,
        Command::Unlisten { id, guid } => app.unlisten(*id, guid.clone()).await,
        Command::Stats => app.stats().await,
    }
}
