use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::container;
use crate::media::Media;
use crate::ThrottledProgress;

/// Camera cards keep photos under this folder.
pub const DCIM_DIR: &str = "DCIM";

/// Folder to scan: `root/DCIM` when present, else `root` itself.
pub fn scan_root(root: &Path) -> PathBuf {
    let dcim = root.join(DCIM_DIR);
    if dcim.is_dir() {
        dcim
    } else {
        root.to_path_buf()
    }
}

fn is_photo(path: &Path, filename: &str) -> bool {
    // macOS AppleDouble companions ("._IMG_0001.CR3") share the photo's extension
    if filename.starts_with("._") {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(container::is_supported_extension)
}

fn collect_recursive(dir: &Path, media: &mut Vec<Media>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_recursive(&path, media)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().into_owned();
        if !is_photo(&path, &filename) {
            debug!(path = %path.display(), "skipping non-photo file");
            continue;
        }
        let size = entry.metadata()?.len();
        media.push(Media::new(path, filename, size));
    }
    Ok(())
}

/// Find every supported photo below `root`, sorted by path.
pub fn scan_source(root: &Path, progress: &ThrottledProgress) -> anyhow::Result<Vec<Media>> {
    let dir = scan_root(root);
    if !dir.is_dir() {
        anyhow::bail!("source {} is not a directory", dir.display());
    }

    let mut media = Vec::new();
    collect_recursive(&dir, &mut media)?;
    media.sort_by(|a, b| a.path.cmp(&b.path));

    let total = media.len() as u64;
    progress.report("scan", total, total, &format!("Found {} photos in {}", total, dir.display()));
    Ok(media)
}
