//! Photo enumeration and decoding.
//!
//! The engine never walks the file system itself; it asks a `PhotoSource`
//! for the photos of an album and for decoded pixels. `DirectoryPhotoSource`
//! maps a gallery root laid out as one sub-directory per album:
//!
//! ```text
//! <root>/<album>/<file>   ->   photo id "<album>/<file>"
//! ```

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::semantic::{AlbumId, PhotoId};

/// File extensions recognized as photos (compared case-insensitively).
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

#[derive(Debug, thiserror::Error)]
pub enum PhotoSourceError {
    #[error("Photo or album not found: {0}")]
    NotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Failed to decode {photo_id}: {reason}")]
    Decode { photo_id: PhotoId, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supplies photo identifiers and decoded images to the engine.
pub trait PhotoSource: Send + Sync {
    fn list_albums(&self) -> Result<Vec<AlbumId>, PhotoSourceError>;

    /// Photos of one album, in a stable order.
    fn list_photos(&self, album_id: &AlbumId) -> Result<Vec<PhotoId>, PhotoSourceError>;

    /// Decode a photo. Blocking; callers run it off the async executor.
    fn decode(&self, photo_id: &PhotoId) -> Result<DynamicImage, PhotoSourceError>;
}

/// Albums are the sub-directories of a gallery root.
pub struct DirectoryPhotoSource {
    root: PathBuf,
}

impl DirectoryPhotoSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn album_dir(&self, album_id: &AlbumId) -> Result<PathBuf, PhotoSourceError> {
        check_component(album_id.as_str())?;
        Ok(self.root.join(album_id.as_str()))
    }

    fn photo_path(&self, photo_id: &PhotoId) -> Result<PathBuf, PhotoSourceError> {
        let (album, file) = photo_id
            .as_str()
            .split_once('/')
            .ok_or_else(|| PhotoSourceError::InvalidId(photo_id.to_string()))?;
        check_component(album)?;
        check_component(file)?;
        Ok(self.root.join(album).join(file))
    }
}

/// Reject anything that could escape the gallery root.
fn check_component(part: &str) -> Result<(), PhotoSourceError> {
    if part.is_empty()
        || part.starts_with('.')
        || part.contains('/')
        || part.contains('\\')
        || part.contains('\0')
    {
        return Err(PhotoSourceError::InvalidId(part.to_string()));
    }
    Ok(())
}

pub fn is_photo_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            PHOTO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn visible_name(entry: &std::fs::DirEntry) -> Option<String> {
    let name = entry.file_name().to_str()?.to_string();
    (!name.starts_with('.')).then_some(name)
}

impl PhotoSource for DirectoryPhotoSource {
    fn list_albums(&self) -> Result<Vec<AlbumId>, PhotoSourceError> {
        let mut albums = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = visible_name(&entry) {
                albums.push(AlbumId::new(name));
            }
        }
        albums.sort();
        Ok(albums)
    }

    fn list_photos(&self, album_id: &AlbumId) -> Result<Vec<PhotoId>, PhotoSourceError> {
        let dir = self.album_dir(album_id)?;
        if !dir.is_dir() {
            return Err(PhotoSourceError::NotFound(album_id.to_string()));
        }

        let mut photos = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() || !is_photo_file(&entry.path()) {
                continue;
            }
            if let Some(name) = visible_name(&entry) {
                photos.push(PhotoId::new(format!("{}/{}", album_id, name)));
            }
        }
        photos.sort();

        log::debug!("Album {} has {} photos", album_id, photos.len());
        Ok(photos)
    }

    fn decode(&self, photo_id: &PhotoId) -> Result<DynamicImage, PhotoSourceError> {
        let path = self.photo_path(photo_id)?;
        if !path.is_file() {
            return Err(PhotoSourceError::NotFound(photo_id.to_string()));
        }

        image::open(&path).map_err(|e| PhotoSourceError::Decode {
            photo_id: photo_id.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gallery() -> (tempfile::TempDir, DirectoryPhotoSource) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::create_dir_all(root.join("beach")).unwrap();
        std::fs::create_dir_all(root.join("city")).unwrap();
        std::fs::create_dir_all(root.join(".thumbnails")).unwrap();

        RgbImage::from_pixel(8, 6, Rgb([200, 180, 40]))
            .save(root.join("beach/b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
            .save(root.join("beach/a.jpeg"))
            .unwrap();
        std::fs::write(root.join("beach/notes.txt"), "not a photo").unwrap();
        std::fs::write(root.join("beach/broken.jpg"), "not really a jpeg").unwrap();
        std::fs::write(root.join("top-level.jpg"), "ignored").unwrap();

        let source = DirectoryPhotoSource::new(root.to_path_buf());
        (dir, source)
    }

    #[test]
    fn test_list_albums_skips_hidden_and_files() {
        let (_dir, source) = gallery();
        let albums = source.list_albums().unwrap();
        assert_eq!(albums, vec![AlbumId::from("beach"), AlbumId::from("city")]);
    }

    #[test]
    fn test_list_photos_filters_extensions() {
        let (_dir, source) = gallery();
        let photos = source.list_photos(&AlbumId::from("beach")).unwrap();
        assert_eq!(
            photos,
            vec![
                PhotoId::from("beach/a.jpeg"),
                PhotoId::from("beach/b.png"),
                PhotoId::from("beach/broken.jpg"),
            ]
        );
        assert!(source.list_photos(&AlbumId::from("city")).unwrap().is_empty());
    }

    #[test]
    fn test_list_photos_unknown_album() {
        let (_dir, source) = gallery();
        let result = source.list_photos(&AlbumId::from("forest"));
        assert!(matches!(result, Err(PhotoSourceError::NotFound(_))));
    }

    #[test]
    fn test_decode() {
        let (_dir, source) = gallery();
        let image = source.decode(&PhotoId::from("beach/b.png")).unwrap();
        assert_eq!((image.width(), image.height()), (8, 6));
    }

    #[test]
    fn test_decode_failures() {
        let (_dir, source) = gallery();

        let broken = source.decode(&PhotoId::from("beach/broken.jpg"));
        assert!(matches!(broken, Err(PhotoSourceError::Decode { .. })));

        let missing = source.decode(&PhotoId::from("beach/missing.jpg"));
        assert!(matches!(missing, Err(PhotoSourceError::NotFound(_))));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let (_dir, source) = gallery();
        for id in ["../etc/passwd", "beach/../../x.jpg", "beach", "/beach/a.png", "beach/"] {
            let result = source.decode(&PhotoId::from(id));
            assert!(
                matches!(result, Err(PhotoSourceError::InvalidId(_))),
                "{id} should be rejected"
            );
        }
        let result = source.list_photos(&AlbumId::from(".."));
        assert!(matches!(result, Err(PhotoSourceError::InvalidId(_))));
    }

    #[test]
    fn test_is_photo_file() {
        assert!(is_photo_file(Path::new("x/IMG_1.JPEG")));
        assert!(is_photo_file(Path::new("scan.tiff")));
        assert!(!is_photo_file(Path::new("movie.mp4")));
        assert!(!is_photo_file(Path::new("README")));
    }
}
