//! Document loader: walks the document root and extracts every supported file.
//!
//! Traversal is sorted by file name, so repeated loads of an unchanged tree
//! produce the same document order and therefore the same chunk IDs.
//!
//! Skipped without failing the load:
//!
//! - hidden entries (leading `.`), Office lock files (`~$...`), and the
//!   `node_modules`, `__pycache__` and `target` directories
//! - paths matching a configured exclude glob
//! - extensions with no registered extractor
//! - files larger than `max_file_size` bytes
//! - files whose extraction fails (logged with the path)
//! - files that yield no text
//!
//! A missing or unreadable root is the only hard error.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::DocumentsConfig;
use crate::extract::ExtractorRegistry;
use crate::models::Document;

/// Directory names never descended into.
const IGNORED_DIRS: &[&str] = &["node_modules", "__pycache__", "target"];

/// `doc_type` for files directly under the root.
pub const ROOT_DOC_TYPE: &str = "root_files";

/// Documents produced by one load pass, plus what was skipped.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped_large: usize,
    pub skipped_errors: usize,
    pub skipped_unsupported: usize,
    pub skipped_empty: usize,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.documents.len()
    }
}

pub fn load_documents(config: &DocumentsConfig, registry: &ExtractorRegistry) -> Result<LoadReport> {
    if !config.root.is_dir() {
        bail!(
            "document root does not exist or is not a directory: {}",
            config.root.display()
        );
    }
    let root = config
        .root
        .canonicalize()
        .with_context(|| format!("failed to resolve document root {}", config.root.display()))?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    info!(root = %root.display(), "loading documents");
    let mut report = LoadReport::default();

    let walker = WalkDir::new(&root)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                report.skipped_errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = relative_path(&root, path);
        if exclude_set.is_match(&relative) {
            debug!(path = %relative, "excluded by glob");
            continue;
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let Some(extractor) = registry.get(&extension) else {
            debug!(path = %relative, "unsupported extension");
            report.skipped_unsupported += 1;
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %relative, error = %e, "cannot stat file, skipping");
                report.skipped_errors += 1;
                continue;
            }
        };
        if metadata.len() > config.max_file_size {
            warn!(
                path = %relative,
                size = metadata.len(),
                max = config.max_file_size,
                "file exceeds size limit, skipping"
            );
            report.skipped_large += 1;
            continue;
        }

        let extraction = std::fs::read(path)
            .map_err(crate::extract::ExtractError::from)
            .and_then(|bytes| extractor.extract(&bytes));
        let extraction = match extraction {
            Ok(x) => x,
            Err(e) => {
                warn!(path = %relative, format = extractor.name(), error = %e, "extraction failed, skipping");
                report.skipped_errors += 1;
                continue;
            }
        };
        for warning in &extraction.warnings {
            warn!(path = %relative, "{}", warning);
        }
        if extraction.text.trim().is_empty() {
            debug!(path = %relative, "no text extracted");
            report.skipped_empty += 1;
            continue;
        }

        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        report.documents.push(Document {
            path: path.to_path_buf(),
            doc_type: doc_type(&relative),
            relative_path: relative,
            extension,
            size: metadata.len(),
            modified,
            text: extraction.text,
            errors: extraction.warnings,
        });
    }

    info!(
        loaded = report.loaded(),
        skipped_large = report.skipped_large,
        skipped_errors = report.skipped_errors,
        skipped_unsupported = report.skipped_unsupported,
        skipped_empty = report.skipped_empty,
        "document load complete"
    );
    Ok(report)
}

fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') || name.starts_with("~$") {
        return true;
    }
    entry.file_type().is_dir() && IGNORED_DIRS.contains(&name.as_ref())
}

/// `/`-separated path of `path` under `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// First directory under the root, or [`ROOT_DOC_TYPE`].
pub fn doc_type(relative_path: &str) -> String {
    match relative_path.split_once('/') {
        Some((top, _)) => top.to_string(),
        None => ROOT_DOC_TYPE.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid exclude glob '{}'", pattern))?);
    }
    Ok(builder.build()?)
}
