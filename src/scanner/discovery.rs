use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively find image files under a directory, filtered by extension.
/// Hidden directories are skipped. Results are sorted by path so repeated
/// scans visit files in the same order.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext_lower)) {
                images.push(path.to_path_buf());
            }
        }
    }

    images.sort();
    tracing::debug!("discovered {} images under {}", images.len(), directory.display());
    Ok(images)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_filters_by_extension() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("photo1.jpg")).unwrap();
        File::create(dir.path().join("photo2.PNG")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();
        File::create(dir.path().join("subdir/photo3.jpeg")).unwrap();

        let extensions = vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()];
        let images = discover_images(dir.path(), &extensions).unwrap();
        assert_eq!(images.len(), 3);
    }

    #[test]
    fn test_discover_skips_hidden_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        File::create(dir.path().join(".cache/thumb.jpg")).unwrap();
        File::create(dir.path().join("real.jpg")).unwrap();

        let images = discover_images(dir.path(), &["jpg".to_string()]).unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].ends_with("real.jpg"));
    }

    #[test]
    fn test_discover_is_deterministically_ordered() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("b.jpg")).unwrap();
        File::create(dir.path().join("a.jpg")).unwrap();
        File::create(dir.path().join("c.jpg")).unwrap();

        let first = discover_images(dir.path(), &["jpg".to_string()]).unwrap();
        let second = discover_images(dir.path(), &["jpg".to_string()]).unwrap();
        assert_eq!(first, second);
        assert!(first[0].ends_with("a.jpg"));
    }
}
