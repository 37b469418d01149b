//! encsite-crypto: the asset codec shared by the encryptor, the engine and
//! bootstrap key verification
//!
//! Asset format (binary):
//! ```text
//! [8 bytes: "DRXENC01"][1 byte: IV length = 12][12 bytes: IV][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! Key: `AES-256 key = SHA-256(UTF-8(passphrase))`, so one passphrase always
//! opens every asset it sealed regardless of IV.

pub mod codec;
pub mod error;
pub mod kdf;
pub mod manifest;
pub mod mime;

pub use codec::{
    decrypt, decrypt_with_key, encrypt, encrypt_with_key, encrypted_path_for, parse_header,
    AssetHeader,
};
pub use error::{CodecError, FormatError};
pub use kdf::{derive_key, SiteKey};
pub use manifest::{EncryptionManifest, ManifestEntry};
pub use mime::mime_type_of;

/// Fixed magic literal opening every encrypted asset
pub const MAGIC: &[u8; 8] = b"DRXENC01";

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of an AES-256 key
pub const KEY_SIZE: usize = 32;

/// Size of the GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Bytes before the ciphertext: magic + IV length byte + IV
pub const HEADER_SIZE: usize = MAGIC.len() + 1 + IV_SIZE;
