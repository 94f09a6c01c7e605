//! Perceptual hash computation over a normalized raster.
//!
//! Each algorithm variant produces a fixed-width bit string; visually similar
//! images yield bit strings with small Hamming distance. Variants are
//! independent: one failing never aborts the others.

use img_hash::{HashAlg, HasherConfig};

/// Perceptual hash algorithm variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKind {
    Mean,
    Gradient,
    Dct,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Mean => "mean",
            HashKind::Gradient => "gradient",
            HashKind::Dct => "dct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mean" => Some(HashKind::Mean),
            "gradient" => Some(HashKind::Gradient),
            "dct" => Some(HashKind::Dct),
            _ => None,
        }
    }
}

/// A fixed-width perceptual hash bit string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceptualHash {
    pub kind: HashKind,
    pub bits: Vec<u8>,
}

impl PerceptualHash {
    /// Hamming distance to another hash of the same kind and width.
    /// `None` when kind or width differ (incomparable).
    pub fn distance(&self, other: &PerceptualHash) -> Option<u32> {
        if self.kind != other.kind {
            return None;
        }
        hamming_distance(&self.bits, &other.bits)
    }
}

/// Count of differing bits between two equal-length bit strings.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum())
}

/// Compute the requested hash variants from a decoded image.
///
/// The raster is thumbnailed before hashing; img_hash bundles its own copy of
/// the image crate, so pixels are re-wrapped into its buffer type.
pub fn compute_hashes(img: &image::DynamicImage, kinds: &[HashKind]) -> Vec<PerceptualHash> {
    let thumbnail = img.thumbnail(64, 64);
    let rgba = thumbnail.to_rgba8();
    let (width, height) = rgba.dimensions();

    let buffer = match img_hash::image::RgbaImage::from_raw(width, height, rgba.into_raw()) {
        Some(b) => b,
        None => {
            tracing::warn!("could not re-wrap {}x{} raster for hashing", width, height);
            return Vec::new();
        }
    };
    let hash_input = img_hash::image::DynamicImage::ImageRgba8(buffer);

    let mut hashes = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let config = match kind {
            HashKind::Mean => HasherConfig::new().hash_alg(HashAlg::Mean),
            HashKind::Gradient => HasherConfig::new().hash_alg(HashAlg::Gradient),
            HashKind::Dct => HasherConfig::new().hash_alg(HashAlg::Mean).preproc_dct(),
        };
        let hasher = config.hash_size(8, 8).to_hasher();
        let hash = hasher.hash_image(&hash_input);
        hashes.push(PerceptualHash {
            kind,
            bits: hash.as_bytes().to_vec(),
        });
    }
    hashes
}
