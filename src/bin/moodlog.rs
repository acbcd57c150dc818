use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use moodcam::{
    config::MoodcamConfig,
    emotion::{Emotion, EmotionSample},
    statistics::{self, Statistics, Window},
    storage::RecordStore,
};
use serde::Serialize;
use tracing::warn;

/// Inspect a moodcam emotion log offline.
#[derive(Parser, Debug)]
#[command(name = "moodlog")]
#[command(about = "Summarize, tail and check moodcam emotion logs")]
struct Args {
    /// Log file (defaults to storage.path from the config)
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Path to moodcam configuration file
    #[arg(short = 'c', long, default_value = "moodcam.toml")]
    config: PathBuf,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Statistics over the whole log or its trailing rows
    Summary {
        /// Trailing rows to include; 0 means all
        #[arg(short, long, default_value_t = 0)]
        window: usize,
    },
    /// Print the most recent rows
    Tail {
        #[arg(short = 'n', long, default_value_t = 10)]
        rows: usize,

        /// IANA timezone for displayed timestamps
        #[arg(short, long, default_value = "UTC")]
        timezone: String,
    },
    /// Count readable and skipped rows
    Check,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    path: String,
    valid_rows: usize,
    skipped_rows: usize,
    first_timestamp: Option<String>,
    last_timestamp: Option<String>,
    out_of_order: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let path = match &args.log {
        Some(path) => path.clone(),
        None => load_config(&args.config)?.storage.path(),
    };
    let store = RecordStore::new(&path);

    match args.command {
        Command::Summary { window } => summary(&store, Window::from_rows(window), args.json).await,
        Command::Tail { rows, timezone } => {
            tail(&store, rows, resolve_timezone(&timezone), args.json).await
        }
        Command::Check => check(&store, args.json).await,
    }
}

fn load_config(config_path: &Path) -> Result<MoodcamConfig> {
    if config_path.exists() {
        MoodcamConfig::load_from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            config_path.display()
        );
        Ok(MoodcamConfig::default())
    }
}

fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

async fn summary(store: &RecordStore, window: Window, json: bool) -> Result<()> {
    let samples = store
        .load_all()
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;
    let stats = statistics::compute(window.apply(&samples));

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    match stats {
        Some(stats) => print!("{}", render_summary(&stats)),
        None => println!("No samples in {}", store.path().display()),
    }
    Ok(())
}

fn render_summary(stats: &Statistics) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Samples: {}\nSession: {:.1} min\n",
        stats.total_count,
        stats.session_minutes()
    ));
    if let Some(emotion) = stats.most_frequent() {
        out.push_str(&format!("Most frequent: {}\n", emotion));
    }

    out.push_str("\nEmotion    avg   count\n");
    for emotion in Emotion::ALL {
        let count = stats
            .emotion_distribution
            .get(&emotion)
            .copied()
            .unwrap_or(0);
        out.push_str(&format!(
            "{:<9} {:.3} {:>7}\n",
            emotion.as_str(),
            stats.average(emotion),
            count
        ));
    }

    if !stats.transitions.is_empty() {
        out.push_str("\nTransitions\n");
        for (from, row) in &stats.transitions {
            let targets = row
                .iter()
                .map(|(to, p)| format!("{} {:.2}", to, p))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{:<9} -> {}\n", from.as_str(), targets));
        }
    }
    out
}

async fn tail(store: &RecordStore, rows: usize, timezone: Tz, json: bool) -> Result<()> {
    let samples = store
        .load_recent(rows)
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }

    for sample in &samples {
        println!("{}", render_row(sample, &timezone));
    }
    Ok(())
}

fn render_row(sample: &EmotionSample, timezone: &Tz) -> String {
    format!(
        "{}  {:<8} {:.2}",
        sample
            .timestamp()
            .with_timezone(timezone)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        sample.dominant_emotion().as_str(),
        sample.confidence()
    )
}

async fn check(store: &RecordStore, json: bool) -> Result<()> {
    let report = store
        .load_report()
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    let out_of_order = report
        .samples
        .windows(2)
        .filter(|pair| pair[1].timestamp() < pair[0].timestamp())
        .count();
    let check = CheckReport {
        path: store.path().display().to_string(),
        valid_rows: report.samples.len(),
        skipped_rows: report.skipped_rows,
        first_timestamp: report.samples.first().map(|s| s.timestamp().to_rfc3339()),
        last_timestamp: report.samples.last().map(|s| s.timestamp().to_rfc3339()),
        out_of_order,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else {
        println!("{}", check.path);
        println!("  valid rows:   {}", check.valid_rows);
        println!("  skipped rows: {}", check.skipped_rows);
        println!("  out of order: {}", check.out_of_order);
        if let (Some(first), Some(last)) = (&check.first_timestamp, &check.last_timestamp) {
            println!("  span:         {} .. {}", first, last);
        }
    }
    Ok(())
}
