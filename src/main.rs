//! Command-line front end for the correction pipeline.

use std::{
    fs::read_to_string,
    io::{self, Read},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::warn;

use kosei::{
    cache::CorrectionCache,
    config::{RemoteConfig, Tunables},
    pipeline::{Corrector, RawText},
    quota::QuotaManager,
    remote::RemoteCorrector,
    tokenizer::LexiconTokenizer,
    Result,
};

#[derive(Debug, Parser)]
/// Corrects OCR misrecognition errors in Japanese text scanned from printed
/// books, so the text can be read aloud without glyph confusions, dropped
/// sokuon marks, or missing particles getting in the way.
#[command(name = "kosei", version)]
enum Args {
    /// Correct text from a file, or from stdin when no file is given.
    #[command(name = "correct")]
    Correct {
        /// Path to a UTF-8 text file; reads stdin when omitted.
        input: Option<PathBuf>,

        /// Run fully offline, without the remote model fallback.
        #[arg(long)]
        no_remote: bool,

        /// Print a JSON diagnostics record per line instead of plain text.
        #[arg(long)]
        diagnostics: bool,

        /// Genre hint passed to the remote model.
        #[arg(long, default_value = "economics textbook")]
        genre: String,

        /// Directory for the cache and quota files.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show how much of the daily remote-call budget is left.
    #[command(name = "quota")]
    Quota {
        /// Directory for the cache and quota files.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show correction-cache statistics, or clear the cache.
    #[command(name = "cache")]
    Cache {
        /// Drop every cached correction.
        #[arg(long)]
        clear: bool,

        /// Directory for the cache and quota files.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

/// Where persistent state lives unless overridden.
fn data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("kosei"))
        .ok_or_else(|| anyhow!("could not determine a data directory; pass --data-dir"))
}

fn open_cache(dir: &PathBuf, tunables: &Tunables) -> Arc<CorrectionCache> {
    Arc::new(CorrectionCache::open(
        &dir.join("corrections.json"),
        tunables.cache_size,
        tunables.cache_max_age_days,
    ))
}

fn open_quota(dir: &PathBuf, tunables: &Tunables) -> Arc<QuotaManager> {
    Arc::new(QuotaManager::open(
        &dir.join("quota.json"),
        tunables.quota_limit,
    ))
}

async fn cmd_correct(
    input: Option<PathBuf>,
    no_remote: bool,
    diagnostics: bool,
    genre: &str,
    data_dir_override: Option<PathBuf>,
) -> Result<()> {
    let text = match input {
        Some(path) => read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("could not read stdin")?;
            buf
        }
    };

    let tunables = Tunables::default();
    let remote = if no_remote {
        None
    } else {
        match RemoteConfig::from_env() {
            Ok(config) => {
                let dir = data_dir(data_dir_override)?;
                let cache = open_cache(&dir, &tunables);
                let quota = open_quota(&dir, &tunables);
                Some(RemoteCorrector::new(
                    config,
                    cache,
                    quota,
                    tunables.clone(),
                    genre,
                )?)
            }
            Err(err) => {
                warn!("{}; continuing offline", err);
                None
            }
        }
    };
    let corrector = Corrector::new(Arc::new(LexiconTokenizer::new()), tunables, remote);

    for line in text.lines() {
        if line.trim().is_empty() {
            println!();
            continue;
        }
        let result = corrector.correct(&RawText::plain(line)).await;
        if diagnostics {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            println!("{}", result.text);
        }
    }
    Ok(())
}

fn cmd_quota(data_dir_override: Option<PathBuf>) -> Result<()> {
    let tunables = Tunables::default();
    let dir = data_dir(data_dir_override)?;
    let status = open_quota(&dir, &tunables).status();
    println!(
        "{}/{} remote calls used, window resets at {}",
        status.count, status.limit, status.reset_at
    );
    Ok(())
}

fn cmd_cache(clear: bool, data_dir_override: Option<PathBuf>) -> Result<()> {
    let tunables = Tunables::default();
    let dir = data_dir(data_dir_override)?;
    let cache = open_cache(&dir, &tunables);
    if clear {
        cache.clear()?;
        println!("cache cleared");
    } else {
        let stats = cache.stats();
        println!("{} cached corrections", stats.entries);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let args: Args = Args::parse();
    match args {
        Args::Correct {
            input,
            no_remote,
            diagnostics,
            genre,
            data_dir,
        } => cmd_correct(input, no_remote, diagnostics, &genre, data_dir).await,
        Args::Quota { data_dir } => cmd_quota(data_dir),
        Args::Cache { clear, data_dir } => cmd_cache(clear, data_dir),
    }
}
