use log::debug;
use std::path::{Path, PathBuf};

use crate::*;

/// File extensions picked up by `image_paths`.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "ppm"];

/// Anything that can turn a path into a decoded RGB image.
pub trait ImageSource {
    /// Fails with `ImageLoad` when the file is missing, undecodable or empty.
    fn load(&self, path: &Path) -> HbowResult<Image>;
}

/// Canonical dataset identifier of a path: its file name. Falls back to the input when it
/// has no file name component.
pub fn canonical_identifier<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Image files directly inside `dir`, sorted by path.
pub fn image_paths<P: AsRef<Path>>(dir: P) -> HbowResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in dir.as_ref().read_dir()? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    debug!(target: "hbow::source", "found {} images in {}", paths.len(), dir.as_ref().display());
    Ok(paths)
}

fn load_error(path: &Path, reason: String) -> HbowErr {
    HbowErr::ImageLoad {
        path: path.display().to_string(),
        reason,
    }
}

#[cfg(feature = "image")]
#[derive(Debug, Clone, Copy, Default)]
/// Pure-Rust decoder backed by the `image` crate.
pub struct ImageCrateSource;

#[cfg(feature = "image")]
impl ImageSource for ImageCrateSource {
    fn load(&self, path: &Path) -> HbowResult<Image> {
        let decoded = image::open(path).map_err(|e| load_error(path, e.to_string()))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        Image::from_rgb_bytes(width as usize, height as usize, rgb.as_raw())
            .map_err(|e| load_error(path, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_file_name() {
        assert_eq!(canonical_identifier("../olympus/pic.0164.jpg"), "pic.0164.jpg");
        assert_eq!(canonical_identifier("pic.0893.jpg"), "pic.0893.jpg");
        assert_eq!(canonical_identifier("/"), "/");
    }

    #[test]
    fn image_paths_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["b.jpg", "a.PNG", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = image_paths(dir.path())
            .unwrap()
            .iter()
            .map(canonical_identifier)
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg"]);
    }

    #[cfg(feature = "image")]
    #[test]
    fn image_crate_source_reports_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            ImageCrateSource.load(&missing),
            Err(HbowErr::ImageLoad { .. })
        ));
        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"not a png").unwrap();
        assert!(matches!(
            ImageCrateSource.load(&corrupt),
            Err(HbowErr::ImageLoad { .. })
        ));
    }

    #[cfg(feature = "image")]
    #[test]
    fn image_crate_source_decodes_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        let mut buf = image::RgbImage::new(3, 2);
        buf.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        buf.save(&path).unwrap();
        let img = ImageCrateSource.load(&path).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
        assert_eq!(img.pixel(2, 1), [10, 20, 30]);
    }
}
