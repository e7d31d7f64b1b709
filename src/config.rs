use crate::services::DEFAULT_CONCURRENCY;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf};
use url::Url;

/// Output directory used when neither `--output` nor `BLOBSCAN_OUTPUT_DIR` is set.
pub const DEFAULT_OUTPUT_DIR: &str = "./loot_new";

/// What to do with the selected objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Download every selected object.
    Download,
    /// Print the distinct extensions in use.
    Extensions,
    /// Print one row per object.
    Table,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub account: String,
    pub container: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub search: String,
    pub regex: bool,
    pub mode: Mode,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub endpoint: Option<Url>,
    pub verify_checksums: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "List, filter and download objects from a public blob container"
)]
pub struct Args {
    /// Storage account name
    #[arg(long, short = 'a')]
    pub account: String,

    /// Container name
    #[arg(long, short = 'c')]
    pub container: String,

    /// File extensions to include (comma separated); wins over --exclude
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// File extensions to exclude (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Download files found
    #[arg(long)]
    pub download: bool,

    /// List files in a table (the default when no other mode is given)
    #[arg(long, visible_alias = "list")]
    pub show: bool,

    /// List all file extensions in use
    #[arg(long)]
    pub exts: bool,

    /// Directory to save files to (overrides BLOBSCAN_OUTPUT_DIR)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Interpret the search phrase as a regular expression
    #[arg(long)]
    pub regex: bool,

    /// Maximum parallel downloads (overrides BLOBSCAN_CONCURRENCY)
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Path-style blob endpoint, e.g. http://127.0.0.1:10000 (overrides BLOBSCAN_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Skip Content-MD5 verification of downloaded files
    #[arg(long)]
    pub no_verify: bool,

    /// Phrase to search for in object names
    #[arg(default_value = "")]
    pub search: String,
}

impl Args {
    /// Resolve the mode by priority: download, then extensions, then table.
    pub fn mode(&self) -> Mode {
        if self.download {
            Mode::Download
        } else if self.exts {
            Mode::Extensions
        } else {
            Mode::Table
        }
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse(), |key| env::var(key))
    }

    /// Merge parsed arguments with values from `lookup` (normally the
    /// process environment). Arguments win over the environment.
    pub fn from_args<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_output = match lookup("BLOBSCAN_OUTPUT_DIR") {
            Ok(value) => PathBuf::from(value),
            Err(env::VarError::NotPresent) => PathBuf::from(DEFAULT_OUTPUT_DIR),
            Err(err) => return Err(err).context("reading BLOBSCAN_OUTPUT_DIR"),
        };
        let env_concurrency = match lookup("BLOBSCAN_CONCURRENCY") {
            Ok(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing BLOBSCAN_CONCURRENCY value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_CONCURRENCY,
            Err(err) => return Err(err).context("reading BLOBSCAN_CONCURRENCY"),
        };
        let env_endpoint = match lookup("BLOBSCAN_ENDPOINT") {
            Ok(value) => Some(value),
            Err(env::VarError::NotPresent) => None,
            Err(err) => return Err(err).context("reading BLOBSCAN_ENDPOINT"),
        };

        // --- Merge ---
        let concurrency = args.concurrency.unwrap_or(env_concurrency);
        if concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        let endpoint = args
            .endpoint
            .clone()
            .or(env_endpoint)
            .map(|raw| Url::parse(&raw).with_context(|| format!("parsing endpoint `{}`", raw)))
            .transpose()?;

        let mode = args.mode();
        let cfg = Self {
            account: args.account,
            container: args.container,
            include: args.include,
            exclude: args.exclude,
            search: args.search,
            regex: args.regex,
            mode,
            output_dir: args.output.unwrap_or(env_output),
            concurrency,
            endpoint,
            verify_checksums: !args.no_verify,
        };

        Ok(cfg)
    }
}
