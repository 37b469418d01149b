//! encsite-publish: the build-time half of the site
//!
//! Walks a plaintext site tree, seals every publishable file with the site
//! passphrase and writes `<out>/<relative-path>.enc`, optionally with an
//! [`EncryptionManifest`](encsite_crypto::EncryptionManifest). The output
//! directory is meant to be served as the site's `enc/` root.

pub mod audit;
pub mod collect;
pub mod encrypt;
pub mod selftest;

pub use audit::{verify_directory, VerifyReport};
pub use collect::{collect_files, should_encrypt, CollectConfig};
pub use encrypt::{
    encrypt_directory, encrypt_directory_with_progress, EncryptOptions, EncryptSummary, ProgressFn,
};
pub use selftest::self_test;
