//! Fingerprint extraction: fast content hash, optional cryptographic hash,
//! perceptual hashes, and the accurate-mode feature signature.
//!
//! The fast hash is always computed first so exact-tier matching works even
//! when image decoding fails. Perceptual variants are independent of each
//! other; any subset may be unavailable without aborting the rest.

pub mod perceptual;
pub mod signature;

use md5::{Digest, Md5};
use sha2::Sha256;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::db::FingerprintRecord;

pub use perceptual::{compute_hashes, hamming_distance, HashKind, PerceptualHash};
pub use signature::{luma_signature, signature_distance};

/// Why extraction produced less than a full fingerprint.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("truncated or unreadable file: {0}")]
    TruncatedRead(#[from] std::io::Error),
}

/// Caller-supplied extraction policy. Derived from the configured profile;
/// this module never decides the tradeoff itself.
#[derive(Debug, Clone)]
pub struct ExtractPolicy {
    /// Also compute SHA-256 for exact-tier confirmation.
    pub sha256: bool,
    /// Perceptual hash variants to compute, primary first.
    pub hash_kinds: Vec<HashKind>,
    /// Compute the feature-descriptor signature (accurate mode).
    pub signature: bool,
    /// Pre-downscale decode target to at most this many pixels per side.
    pub decode_limit: Option<u32>,
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        Self {
            sha256: true,
            hash_kinds: vec![HashKind::Gradient, HashKind::Mean],
            signature: false,
            decode_limit: None,
        }
    }
}

/// Extraction output: the record that was produced plus the failure, if any,
/// that made it partial.
#[derive(Debug)]
pub struct Extraction {
    pub record: FingerprintRecord,
    pub failure: Option<FingerprintError>,
}

impl Extraction {
    pub fn is_partial(&self) -> bool {
        self.failure.is_some()
    }
}

/// Fingerprint one file.
///
/// Errors only when the bytes cannot be read at all; a decode failure still
/// yields a usable record carrying the content hashes.
pub fn extract(file_id: i64, path: &Path, policy: &ExtractPolicy) -> Result<Extraction, FingerprintError> {
    let (fast_hash, sha256) = content_hashes(path, policy.sha256)?;

    let mut record = FingerprintRecord {
        file_id,
        fast_hash,
        sha256,
        perceptual: Vec::new(),
        signature: None,
    };

    let img = match decode_normalized(path, policy.decode_limit) {
        Ok(img) => img,
        Err(e) => {
            tracing::debug!("partial fingerprint for {}: {}", path.display(), e);
            return Ok(Extraction {
                record,
                failure: Some(e),
            });
        }
    };

    record.perceptual = compute_hashes(&img, &policy.hash_kinds);
    if policy.signature {
        record.signature = Some(luma_signature(&img));
    }

    Ok(Extraction {
        record,
        failure: None,
    })
}

/// Stream the file once, computing MD5 and optionally SHA-256.
fn content_hashes(path: &Path, with_sha256: bool) -> Result<(String, Option<String>), FingerprintError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut md5_hasher = Md5::new();
    let mut sha256_hasher = with_sha256.then(Sha256::new);

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        md5_hasher.update(&buffer[..bytes_read]);
        if let Some(ref mut h) = sha256_hasher {
            h.update(&buffer[..bytes_read]);
        }
    }

    let fast = format!("{:x}", md5_hasher.finalize());
    let sha = sha256_hasher.map(|h| format!("{:x}", h.finalize()));
    Ok((fast, sha))
}

/// Decode and normalize: guessed format, orientation-corrected, optionally
/// pre-downscaled for constrained policies.
fn decode_normalized(path: &Path, decode_limit: Option<u32>) -> Result<image::DynamicImage, FingerprintError> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    if reader.format().is_none() {
        return Err(FingerprintError::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        ));
    }

    let mut img = reader.decode()?;

    match exif_rotation(path) {
        90 => img = img.rotate90(),
        180 => img = img.rotate180(),
        270 => img = img.rotate270(),
        _ => {}
    }

    if let Some(limit) = decode_limit {
        if img.width() > limit || img.height() > limit {
            img = img.thumbnail(limit, limit);
        }
    }

    Ok(img)
}

/// Read EXIF orientation and convert to rotation degrees (0, 90, 180, 270).
fn exif_rotation(path: &Path) -> i32 {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return 0,
    };

    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(e) => e,
        Err(_) => return 0,
    };

    if let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        if let exif::Value::Short(ref v) = field.value {
            if let Some(&orientation) = v.first() {
                return match orientation {
                    6 => 90,
                    3 => 180,
                    8 => 270,
                    _ => 0,
                };
            }
        }
    }

    0
}
