//! Image metadata extraction: dimensions and format from the image header,
//! capture details from EXIF. Everything here is best-effort; a photo with
//! no readable metadata still gets tracked.

use anyhow::Result;
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    /// Camera make and model joined, when EXIF carries either.
    pub camera: Option<String>,
    pub taken_at: Option<NaiveDateTime>,
}

pub fn extract_metadata(path: &Path) -> Result<ImageMetadata> {
    let mut metadata = ImageMetadata::default();

    if let Ok(reader) = image::ImageReader::open(path) {
        if let Some(format) = reader.format() {
            metadata.format = Some(format!("{:?}", format));
        }
    }

    // Open again: into_dimensions consumes the reader.
    if let Ok(reader) = image::ImageReader::open(path) {
        if let Ok((w, h)) = reader.into_dimensions() {
            metadata.width = Some(w);
            metadata.height = Some(h);
        }
    }

    if let Ok(file) = File::open(path) {
        let mut bufreader = BufReader::new(file);
        if let Ok(exif) = exif::Reader::new().read_from_container(&mut bufreader) {
            let make = string_field(&exif, exif::Tag::Make);
            let model = string_field(&exif, exif::Tag::Model);
            metadata.camera = match (make, model) {
                (Some(make), Some(model)) => Some(format!("{} {}", make, model)),
                (Some(s), None) | (None, Some(s)) => Some(s),
                (None, None) => None,
            };

            if let Some(raw) = string_field(&exif, exif::Tag::DateTimeOriginal) {
                // Unparseable timestamps are treated as absent, never as an
                // error for the whole file.
                metadata.taken_at = parse_exif_datetime(&raw);
                if metadata.taken_at.is_none() {
                    tracing::debug!("unparseable DateTimeOriginal {:?} in {}", raw, path.display());
                }
            }
        }
    }

    Ok(metadata)
}

fn string_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    exif.get_field(tag, exif::In::PRIMARY).map(|field| {
        field
            .display_value()
            .to_string()
            .trim_matches('"')
            .trim()
            .to_string()
    })
}

/// EXIF writes `2023:05:01 10:22:33`; some writers use ISO-style dashes.
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
