use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scraper::Html;
use tracing::{info, warn};

use group_leads::{
    extract_once, ExtractConfig, LeadRecord, MemberAccumulator, ProfileClassifier, ScrollWatcher,
    Strategy,
};

#[derive(Parser)]
#[command(name = "group_leads", about = "Member lead extraction from saved group-membership pages")]
struct Cli {
    /// TOML file overriding the extraction rules
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Page origin used to resolve root-relative links
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Row location strategies to run, in order (joined-anchor, structural-role)
    #[arg(long, global = true, value_delimiter = ',')]
    strategy: Vec<Strategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one saved page once and print its leads as JSON
    Extract {
        file: PathBuf,
        /// Write JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Scan saved scroll frames in order, accumulating leads across them
    Sweep {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Stop once this many leads are captured
        #[arg(short = 'n', long)]
        max_rows: Option<usize>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Feed scroll frames through the debounced watcher at a fixed pace
    Replay {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Delay between frames
        #[arg(long, default_value = "200")]
        interval_ms: u64,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show how URLs classify and which member key they resolve to
    Key {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let result = match cli.command {
        Commands::Extract { file, out } => {
            let markup = read_page(&file)?;
            let doc = Html::parse_document(&markup);
            let mut acc = MemberAccumulator::new(&config)?;
            let records = extract_once(&mut acc, &doc);
            info!("Extracted {} leads from {}", records.len(), file.display());
            write_records(&records, out.as_deref())
        }
        Commands::Sweep { files, max_rows, out } => {
            let records = sweep(&config, &files, max_rows)?;
            write_records(&records, out.as_deref())
        }
        Commands::Replay { files, interval_ms, out } => {
            let acc = MemberAccumulator::new(&config)?;
            let quiet = Duration::from_millis(config.watch.debounce_ms);
            let watcher = ScrollWatcher::spawn(acc, quiet);

            for path in &files {
                match read_page(path) {
                    Ok(markup) => {
                        watcher.notify(markup);
                    }
                    Err(e) => warn!("Skipping frame: {:#}", e),
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }

            let acc = watcher.finish().await?;
            info!("Replayed {} frames, {} leads captured", files.len(), acc.len());
            write_records(acc.records(), out.as_deref())
        }
        Commands::Key { urls } => {
            let classifier = ProfileClassifier::new(&config.site, &config.profile)?;
            println!("{:<60} | {:<7} | {}", "URL", "Profile", "Key");
            println!("{}", "-".repeat(100));
            for url in &urls {
                let accepted = if classifier.classify(url) { "yes" } else { "no" };
                println!(
                    "{:<60} | {:<7} | {}",
                    truncate(url, 60),
                    accepted,
                    classifier.canonical_key(url)
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        info!("Done in {}", format_duration(elapsed));
    }

    result
}

fn load_config(cli: &Cli) -> Result<ExtractConfig> {
    let mut config = match &cli.config {
        Some(path) => ExtractConfig::load(path)?,
        None => ExtractConfig::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.site.base_url = base_url.clone();
    }
    if !cli.strategy.is_empty() {
        config.rows.strategies = cli.strategy.clone();
    }
    config.validate()?;
    Ok(config)
}

fn read_page(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read page {}", path.display()))
}

/// Batch mode: every frame is scanned, in order, until the cap is reached.
fn sweep(config: &ExtractConfig, files: &[PathBuf], max_rows: Option<usize>) -> Result<Vec<LeadRecord>> {
    use indicatif::{ProgressBar, ProgressStyle};

    let mut acc = MemberAccumulator::new(config)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut scanned = 0usize;
    for path in files {
        match read_page(path) {
            Ok(markup) => {
                acc.collect_markup(&markup);
                scanned += 1;
            }
            Err(e) => warn!("Skipping frame: {:#}", e),
        }
        pb.set_message(format!("{} leads", acc.len()));
        pb.inc(1);

        if max_rows.is_some_and(|cap| acc.len() >= cap) {
            info!("Reached {} leads, stopping sweep", acc.len());
            break;
        }
    }

    pb.finish_and_clear();
    info!("Swept {} of {} frames, {} leads captured", scanned, files.len(), acc.len());
    Ok(acc.snapshot())
}

fn write_records(records: &[LeadRecord], out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    match out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_accumulates_across_frames() {
        let files = vec![
            PathBuf::from("tests/fixtures/scroll_frame_1.html"),
            PathBuf::from("tests/fixtures/scroll_frame_2.html"),
        ];
        let records = sweep(&ExtractConfig::default(), &files, None).unwrap();
        assert_eq!(records.len(), 5);
    }

    #[test]
    fn sweep_stops_at_cap() {
        let files = vec![
            PathBuf::from("tests/fixtures/scroll_frame_1.html"),
            PathBuf::from("tests/fixtures/scroll_frame_2.html"),
        ];
        let records = sweep(&ExtractConfig::default(), &files, Some(2)).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn sweep_skips_missing_frames() {
        let files = vec![
            PathBuf::from("tests/fixtures/does_not_exist.html"),
            PathBuf::from("tests/fixtures/scroll_frame_1.html"),
        ];
        let records = sweep(&ExtractConfig::default(), &files, None).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn cli_overrides_apply() {
        let cli = Cli::parse_from([
            "group_leads",
            "--strategy",
            "structural-role",
            "--base-url",
            "https://m.facebook.com",
            "key",
            "/user/100077788899",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.rows.strategies, vec![Strategy::StructuralRole]);
        assert_eq!(config.site.base_url, "https://m.facebook.com");
    }

    #[test]
    fn truncates_long_urls() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("abcdef", 2), "...");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
