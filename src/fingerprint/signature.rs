//! Compact feature-descriptor signature for expensive fallback matching.
//!
//! A 16x16 grayscale grid of the normalized image, 256 bytes. Far coarser
//! than a real descriptor set but cheap to compare, and only computed in
//! accurate mode.

use image::DynamicImage;

pub const SIGNATURE_SIDE: u32 = 16;
pub const SIGNATURE_LEN: usize = (SIGNATURE_SIDE * SIGNATURE_SIDE) as usize;

/// Downsample to a fixed luma grid.
pub fn luma_signature(img: &DynamicImage) -> Vec<u8> {
    let small = img.resize_exact(
        SIGNATURE_SIDE,
        SIGNATURE_SIDE,
        image::imageops::FilterType::Triangle,
    );
    small.to_luma8().into_raw()
}

/// Mean absolute per-cell difference, normalized to [0, 1].
/// `None` when the signatures are not comparable.
pub fn signature_distance(a: &[u8], b: &[u8]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let total: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as i16 - *y as i16).unsigned_abs() as u64)
        .sum();
    Some(total as f64 / (a.len() as f64 * 255.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_shape() {
        let img = DynamicImage::new_rgb8(100, 60);
        let sig = luma_signature(&img);
        assert_eq!(sig.len(), SIGNATURE_LEN);
    }

    #[test]
    fn test_signature_distance_bounds() {
        let zeros = vec![0u8; SIGNATURE_LEN];
        let full = vec![255u8; SIGNATURE_LEN];
        assert_eq!(signature_distance(&zeros, &zeros), Some(0.0));
        assert_eq!(signature_distance(&zeros, &full), Some(1.0));
        assert_eq!(signature_distance(&zeros, &full[..10]), None);
    }
}
