//! Routes a listing through the filters and into the selected mode.
//!
//! ## Pipeline
//! - **Extension filter**: `--include` if given, otherwise `--exclude`
//! - **Search**: applied only when the search phrase is non-empty
//! - **Mode** (first match wins)
//!   - `--download` → batch download into the output directory
//!   - `--exts`     → table of distinct extensions
//!   - default      → table of objects

use crate::{
    config::{AppConfig, Mode},
    handlers::{
        download_handlers::download_all,
        list_handlers::{show_extensions, show_table},
    },
    models::{ObjectCollection, PatternError},
    services::BatchReport,
};
use anyhow::{Context, Result};
use reqwest::Client;
use std::io::Write;

/// What a mode produced.
#[derive(Debug)]
pub enum Outcome {
    Listed { rows: usize },
    Downloaded(BatchReport),
}

/// Apply the configured extension filter and search to `objects`.
pub fn select(cfg: &AppConfig, objects: &ObjectCollection) -> Result<ObjectCollection, PatternError> {
    let mut selected = if !cfg.include.is_empty() {
        objects.include_extensions(cfg.include.iter().cloned())
    } else if !cfg.exclude.is_empty() {
        objects.exclude_extensions(cfg.exclude.iter().cloned())
    } else {
        objects.clone()
    };

    if !cfg.search.is_empty() {
        selected = selected.search(&cfg.search, cfg.regex)?;
    }

    tracing::debug!("Selected {} of {} objects", selected.len(), objects.len());
    Ok(selected)
}

/// Filter `objects` and run the configured mode, writing tables to `out`.
pub async fn dispatch<W: Write>(
    cfg: &AppConfig,
    http: Client,
    objects: &ObjectCollection,
    out: &mut W,
) -> Result<Outcome> {
    let selected = select(cfg, objects)?;

    match cfg.mode {
        Mode::Download => Ok(Outcome::Downloaded(
            download_all(cfg, http, selected).await,
        )),
        Mode::Extensions => {
            show_extensions(&selected, out).context("writing extension table")?;
            Ok(Outcome::Listed {
                rows: selected.all_extensions().len(),
            })
        }
        Mode::Table => {
            show_table(&selected, out).context("writing object table")?;
            Ok(Outcome::Listed {
                rows: selected.len(),
            })
        }
    }
}
