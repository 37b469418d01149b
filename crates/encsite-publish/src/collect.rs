//! Site tree walking: which files exist and which of them get sealed

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encsite_core::config::EncryptorConfig;
use tracing::debug;

/// Which files to pick up from the input tree
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Extensions (with dot, lowercase) that get encrypted
    pub extensions: Vec<String>,
    /// Glob patterns matched against each file and directory name
    pub exclude_patterns: Vec<String>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self::from(&EncryptorConfig::default())
    }
}

impl From<&EncryptorConfig> for CollectConfig {
    fn from(config: &EncryptorConfig) -> Self {
        Self {
            extensions: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }
}

/// Every regular file under `root` that survives the exclude patterns,
/// sorted for deterministic output.
pub fn collect_files(root: &Path, config: &CollectConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let exclude_matchers: Vec<glob::Pattern> = config
        .exclude_patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                debug!(pattern = %p, "ignoring bad exclude pattern: {e}");
                None
            }
        })
        .collect();
    collect_files_inner(root, &mut files, &exclude_matchers)?;
    files.sort();
    Ok(files)
}

fn collect_files_inner(dir: &Path, out: &mut Vec<PathBuf>, excludes: &[glob::Pattern]) -> Result<()> {
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("reading dir: {}", dir.display()))?
    {
        let entry = entry.context("reading dir entry")?;
        let path = entry.path();
        let meta = entry.metadata().context("stat dir entry")?;

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            debug!(path = %path.display(), "skipping non-UTF-8 name");
            continue;
        };

        if excludes.iter().any(|p| p.matches(name)) {
            continue;
        }
        // never published, whatever the configured patterns say
        if name == ".git" || name == "node_modules" {
            continue;
        }

        if meta.is_dir() {
            collect_files_inner(&path, out, excludes)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// True when the file's extension is on the publish list (case-insensitive).
pub fn should_encrypt(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = format!(".{}", ext.to_lowercase());
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}
