//! Deterministic original selection.
//!
//! Members are ranked by: higher pixel resolution, earlier capture timestamp
//! (missing sorts last), larger byte size, better format quality, then path
//! as the final tiebreaker. The top-ranked member is the automatic original.

use std::cmp::Ordering;

use crate::db::FileRecord;

/// Fixed format-quality priority: lossless/RAW ahead of lossy. Lower is better.
pub fn format_priority(format: Option<&str>) -> u8 {
    let Some(format) = format else { return 4 };
    match format.to_ascii_lowercase().as_str() {
        "raw" | "cr2" | "nef" | "arw" | "dng" => 0,
        "tiff" | "png" | "bmp" => 1,
        "webp" | "heic" | "heif" | "avif" => 2,
        "jpeg" | "jpg" | "gif" => 3,
        _ => 4,
    }
}

/// Total order over group members; `Ordering::Less` means "better original".
pub fn compare(a: &FileRecord, b: &FileRecord) -> Ordering {
    // Higher resolution first; unknown dimensions rank as zero pixels.
    let pixels_a = a.pixel_count().unwrap_or(0);
    let pixels_b = b.pixel_count().unwrap_or(0);
    match pixels_b.cmp(&pixels_a) {
        Ordering::Equal => {}
        other => return other,
    }

    // Earlier capture time first; files with no timestamp sort last.
    match (a.taken_at, b.taken_at) {
        (Some(ta), Some(tb)) => match ta.cmp(&tb) {
            Ordering::Equal => {}
            other => return other,
        },
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => {}
    }

    // Larger byte size first.
    match b.size_bytes.cmp(&a.size_bytes) {
        Ordering::Equal => {}
        other => return other,
    }

    // Better format quality first.
    let fmt_a = format_priority(a.format.as_deref());
    let fmt_b = format_priority(b.format.as_deref());
    match fmt_a.cmp(&fmt_b) {
        Ordering::Equal => {}
        other => return other,
    }

    // Deterministic final tiebreaker.
    a.path.cmp(&b.path)
}

/// The automatic original among a group's members.
pub fn select_original(members: &[&FileRecord]) -> Option<i64> {
    members
        .iter()
        .min_by(|a, b| compare(a, b))
        .map(|f| f.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn file(id: i64, path: &str) -> FileRecord {
        FileRecord {
            id,
            path: path.to_string(),
            size_bytes: 1000,
            modified_at: None,
            width: Some(1000),
            height: Some(1000),
            taken_at: None,
            camera: None,
            format: Some("Jpeg".to_string()),
            missing: false,
        }
    }

    #[test]
    fn test_resolution_wins_over_everything() {
        let mut small = file(1, "/a.jpg");
        small.size_bytes = 999_999;
        let mut big = file(2, "/b.jpg");
        big.width = Some(4000);
        big.height = Some(3000);
        big.size_bytes = 1;

        assert_eq!(select_original(&[&small, &big]), Some(2));
    }

    #[test]
    fn test_earlier_capture_breaks_resolution_tie() {
        let mut early = file(1, "/z_late_path.jpg");
        early.taken_at = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0);
        let mut late = file(2, "/a_early_path.jpg");
        late.taken_at = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0);

        assert_eq!(select_original(&[&late, &early]), Some(1));
    }

    #[test]
    fn test_missing_timestamp_sorts_last() {
        let dated = {
            let mut f = file(1, "/b.jpg");
            f.taken_at = NaiveDate::from_ymd_opt(2022, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0);
            f
        };
        let undated = file(2, "/a.jpg");

        assert_eq!(select_original(&[&undated, &dated]), Some(1));
    }

    #[test]
    fn test_format_priority_table() {
        assert!(format_priority(Some("cr2")) < format_priority(Some("png")));
        assert!(format_priority(Some("Png")) < format_priority(Some("Jpeg")));
        assert!(format_priority(Some("jpeg")) < format_priority(None));
    }

    #[test]
    fn test_path_is_final_tiebreaker() {
        let a = file(1, "/photos/a.jpg");
        let b = file(2, "/photos/b.jpg");
        assert_eq!(select_original(&[&b, &a]), Some(1));
        // Fully deterministic regardless of input order.
        assert_eq!(select_original(&[&a, &b]), Some(1));
    }
}
