//! Key verification by probe decrypt
//!
//! Before a key is handed to a freshly registered engine it must open a
//! known asset. A key that cannot would make the engine clear itself on the
//! first request, so it is rejected here instead.

use encsite_crypto::{decrypt, encrypted_path_for};
use encsite_engine::AssetSource;
use tracing::{debug, warn};

use crate::error::VerifyError;

pub struct KeyProbe<S> {
    source: S,
    probe_asset: String,
}

impl<S: AssetSource> KeyProbe<S> {
    /// Probe `probe_path` (a content path such as "/index.html") under `enc_root`.
    pub fn new(source: S, enc_root: &str, probe_path: &str) -> Self {
        Self {
            source,
            probe_asset: encrypted_path_for(enc_root, probe_path),
        }
    }

    pub fn probe_asset(&self) -> &str {
        &self.probe_asset
    }

    pub async fn verify(&self, key: &str) -> Result<(), VerifyError> {
        let asset = self.source.fetch(&self.probe_asset).await.map_err(|e| {
            warn!(asset = %self.probe_asset, "probe fetch failed: {e}");
            VerifyError::from(e)
        })?;
        decrypt(&asset, key)?;
        debug!(asset = %self.probe_asset, "key verified");
        Ok(())
    }
}
