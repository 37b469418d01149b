//! Which requests the engine touches
//!
//! Evaluation order matters and is owned by the engine: origin check, then
//! the plain-path denylist, then key state, then the content pattern. This
//! module only answers the individual questions.

use std::borrow::Cow;

use encsite_core::config::{EngineConfig, SiteSection};
use percent_encoding::percent_decode_str;

#[derive(Debug, Clone)]
pub struct InterceptPolicy {
    /// Scope path with the trailing slash removed ("" for "/")
    scope_prefix: String,
    plain: Vec<String>,
    extensions: Vec<String>,
    asset_prefixes: Vec<String>,
}

impl InterceptPolicy {
    pub fn new(site: &SiteSection, engine: &EngineConfig) -> Self {
        let mut plain: Vec<String> = engine
            .plain_paths
            .iter()
            .chain(engine.plain_pages.iter())
            .cloned()
            .collect();
        for own in [&site.engine_script, &site.bootstrap_script] {
            if !plain.contains(own) {
                plain.push(own.clone());
            }
        }

        Self {
            scope_prefix: site.scope.trim_end_matches('/').to_string(),
            plain,
            extensions: engine
                .intercept_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            asset_prefixes: engine.asset_prefixes.clone(),
        }
    }

    /// Path relative to the engine scope, e.g. "/app/sw.js" → "/sw.js"
    /// under scope "/app/".
    pub fn scope_relative<'a>(&self, path: &'a str) -> &'a str {
        if self.scope_prefix.is_empty() {
            return path;
        }
        match path.strip_prefix(self.scope_prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Denylisted infrastructure or plain page, by absolute or scope-relative path.
    pub fn is_plain(&self, path: &str) -> bool {
        let relative = self.scope_relative(path);
        self.plain.iter().any(|p| p == path || p == relative)
    }

    /// Path matches the content pattern: a configured extension or asset prefix.
    pub fn is_content(&self, path: &str) -> bool {
        if self.asset_prefixes.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rsplit_once('.') {
            Some((_, ext)) => self.extensions.iter().any(|e| e == ext),
            None => false,
        }
    }
}

/// The request path as the file name on disk: percent-decoded UTF-8.
///
/// `None` when the decoded path is not UTF-8, holds a NUL, or has a `..`
/// segment (an encoded `%2F..` would otherwise survive URL normalization).
pub fn decode_path(path: &str) -> Option<Cow<'_, str>> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    if decoded.contains('\0') || decoded.split(['/', '\\']).any(|seg| seg == "..") {
        return None;
    }
    Some(decoded)
}

/// Markup documents get the bootstrap reference injected.
pub fn is_markup(path: &str) -> bool {
    path == "/" || path.ends_with(".html")
}
