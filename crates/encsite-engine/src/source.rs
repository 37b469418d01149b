//! Where ciphertext comes from
//!
//! The engine never talks to the network directly; it asks an [`AssetSource`]
//! for the bytes at `enc/<path>.enc`. [`OperatorSource`] covers the real
//! deployments (a local directory, the static host over HTTP) and the
//! in-memory service used by tests.

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use opendal::{ErrorKind, Operator};

use crate::error::UpstreamError;

pub trait AssetSource: Send + Sync {
    /// Fetch the raw bytes stored at `path` (relative to the site root).
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Bytes, UpstreamError>> + Send;
}

/// OpenDAL-backed asset source
#[derive(Debug, Clone)]
pub struct OperatorSource {
    op: Operator,
}

impl OperatorSource {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Serve ciphertext from a directory on disk (the encryptor's output).
    pub fn local_dir(root: &Path) -> Result<Self> {
        let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
        let op = Operator::new(builder)
            .with_context(|| format!("creating fs operator at {}", root.display()))?
            .layer(opendal::layers::LoggingLayer::default())
            .finish();
        Ok(Self::new(op))
    }

    /// Fetch ciphertext from the static host.
    pub fn http(endpoint: &str) -> Result<Self> {
        let builder = opendal::services::Http::default().endpoint(endpoint);
        let op = Operator::new(builder)
            .with_context(|| format!("creating http operator for {endpoint}"))?
            .layer(opendal::layers::LoggingLayer::default())
            .layer(
                opendal::layers::RetryLayer::new()
                    .with_max_times(3)
                    .with_jitter(),
            )
            .finish();
        Ok(Self::new(op))
    }

    /// Empty in-memory store; populate through [`OperatorSource::operator`].
    pub fn memory() -> Result<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .context("creating memory operator")?
            .finish();
        Ok(Self::new(op))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }
}

impl AssetSource for OperatorSource {
    async fn fetch(&self, path: &str) -> Result<Bytes, UpstreamError> {
        match self.op.read(path).await {
            Ok(buf) => Ok(buf.to_bytes()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(UpstreamError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(UpstreamError::Unreachable {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
