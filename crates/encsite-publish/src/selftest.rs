//! Encrypt/decrypt consistency check run before trusting a build host

use anyhow::Result;
use encsite_crypto::{decrypt, encrypt};
use tracing::debug;

fn samples() -> Vec<Vec<u8>> {
    vec![
        b"Hello World".to_vec(),
        vec![b'A'; 100],
        vec![b'B'; 1000],
        vec![b'C'; 10000],
        br#"{"test":"data","number":12345}"#.to_vec(),
    ]
}

/// Round-trip a handful of payloads under `passphrase`; returns the sizes checked.
pub fn self_test(passphrase: &str) -> Result<Vec<usize>> {
    let mut sizes = Vec::new();
    for (i, data) in samples().into_iter().enumerate() {
        let sealed = encrypt(&data, passphrase)?;
        let opened = decrypt(&sealed, passphrase)?;
        if opened != data {
            anyhow::bail!("self-test {} failed: decrypted data does not match", i + 1);
        }
        debug!(size = data.len(), "self-test passed");
        sizes.push(data.len());
    }
    Ok(sizes)
}
