//! DRXENC01 framing around AES-256-GCM
//!
//! ```text
//! offset 0..8    magic "DRXENC01"
//! offset 8       IV length, always 12
//! offset 9..21   IV
//! offset 21..    ciphertext || 16-byte tag
//! ```
//!
//! Decoding is all-or-nothing: plaintext is only returned after the tag
//! verifies.

use aes_gcm::{aead::Aead, Nonce};
use rand::RngCore;

use crate::error::{CodecError, FormatError};
use crate::kdf::{derive_key, SiteKey};
use crate::{HEADER_SIZE, IV_SIZE, MAGIC};

/// Parsed view of an asset's framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetHeader<'a> {
    pub iv: &'a [u8; IV_SIZE],
    pub ciphertext: &'a [u8],
}

/// Validate the framing of `asset` without touching the ciphertext.
pub fn parse_header(asset: &[u8]) -> Result<AssetHeader<'_>, FormatError> {
    if asset.len() < MAGIC.len() || &asset[..MAGIC.len()] != MAGIC {
        return Err(FormatError::BadMagic);
    }

    let iv_len = *asset.get(MAGIC.len()).ok_or(FormatError::Truncated {
        len: asset.len(),
        needed: HEADER_SIZE,
    })?;
    if iv_len as usize != IV_SIZE {
        return Err(FormatError::UnsupportedIvLength(iv_len));
    }

    if asset.len() < HEADER_SIZE {
        return Err(FormatError::Truncated {
            len: asset.len(),
            needed: HEADER_SIZE,
        });
    }

    let (head, ciphertext) = asset.split_at(HEADER_SIZE);
    let iv: &[u8; IV_SIZE] = head[MAGIC.len() + 1..]
        .try_into()
        .map_err(|_| FormatError::Truncated {
            len: asset.len(),
            needed: HEADER_SIZE,
        })?;

    Ok(AssetHeader { iv, ciphertext })
}

/// Seal `plaintext` under `passphrase`.
///
/// A fresh random IV is drawn on every call.
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, CodecError> {
    encrypt_with_key(&derive_key(passphrase), plaintext)
}

/// Seal `plaintext` under an already-derived key.
///
/// Returns `magic || 12 || iv || ciphertext || tag`.
pub fn encrypt_with_key(key: &SiteKey, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let sealed = key
        .cipher()
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CodecError::Encrypt)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + sealed.len());
    out.extend_from_slice(MAGIC);
    out.push(IV_SIZE as u8);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open an asset with `passphrase`.
pub fn decrypt(asset: &[u8], passphrase: &str) -> Result<Vec<u8>, CodecError> {
    decrypt_with_key(&derive_key(passphrase), asset)
}

/// Open an asset with an already-derived key.
pub fn decrypt_with_key(key: &SiteKey, asset: &[u8]) -> Result<Vec<u8>, CodecError> {
    let header = parse_header(asset)?;

    key.cipher()
        .decrypt(Nonce::from_slice(header.iv), header.ciphertext)
        .map_err(|_| CodecError::Crypto)
}

/// Location of the ciphertext counterpart of `content_path` under `enc_root`.
///
/// `("enc", "/index.html")` → `"enc/index.html.enc"`
pub fn encrypted_path_for(enc_root: &str, content_path: &str) -> String {
    let root = enc_root.trim_end_matches('/');
    let path = content_path.trim_start_matches('/');
    if root.is_empty() {
        format!("{path}.enc")
    } else {
        format!("{root}/{path}.enc")
    }
}
