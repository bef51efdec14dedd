use std::{fs, io, time::SystemTime};

use api_types::ImageRecord;
use chrono::{DateTime, Utc};
use image::{ImageError, ImageReader};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

use super::{
    sidecar::ImageSidecar,
    storage::{StorageLayout, image_id, is_original_image},
};

/// Why a file in the storage directory did not produce a record.
#[derive(Debug, Error)]
pub enum ScanSkip {
    #[error("cannot read file: {0}")]
    Io(#[from] io::Error),
    #[error("unrecognised image container")]
    UnknownFormat,
    #[error("cannot decode image header: {0}")]
    Decode(#[from] ImageError),
}

#[derive(Debug)]
pub enum ScanEntry {
    Record(ImageRecord),
    Skipped { filename: String, reason: ScanSkip },
}

/// Enumerates the storage directory and derives one record per original image.
///
/// Nothing is cached: every call re-reads the directory and re-decodes every header,
/// so cost grows linearly with the number of stored images.
#[derive(Debug, Clone)]
pub struct CatalogScanner {
    layout: StorageLayout,
}

impl CatalogScanner {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// One entry per allow-listed original, in filename order. A storage directory
    /// that does not exist yet is an empty catalog.
    pub fn scan(&self) -> io::Result<Vec<ScanEntry>> {
        let root = self.layout.root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    let filename = e
                        .path()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if is_original_image(&filename) {
                        entries.push(ScanEntry::Skipped {
                            filename,
                            reason: ScanSkip::Io(e.into()),
                        });
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(filename) = entry.file_name().to_str() else {
                continue;
            };
            if !is_original_image(filename) {
                continue;
            }

            match self.describe(filename) {
                Ok(record) => entries.push(ScanEntry::Record(record)),
                Err(reason) => entries.push(ScanEntry::Skipped {
                    filename: filename.to_string(),
                    reason,
                }),
            }
        }

        Ok(entries)
    }

    /// The records from [`scan`](Self::scan); skipped files are logged and dropped.
    pub fn records(&self) -> io::Result<Vec<ImageRecord>> {
        let records = self
            .scan()?
            .into_iter()
            .filter_map(|entry| match entry {
                ScanEntry::Record(record) => Some(record),
                ScanEntry::Skipped { filename, reason } => {
                    warn!(%filename, %reason, "Skipping unreadable image");
                    None
                }
            })
            .collect();
        Ok(records)
    }

    /// Derive the record for one stored original from its stat info, decoded header
    /// and upload sidecar.
    pub fn describe(&self, filename: &str) -> Result<ImageRecord, ScanSkip> {
        let path = self.layout.original_path(filename);
        let metadata = fs::metadata(&path)?;

        let reader = ImageReader::open(&path)?.with_guessed_format()?;
        let format = reader.format().ok_or(ScanSkip::UnknownFormat)?;
        let (width, height) = reader.into_dimensions()?;

        let id = image_id(filename).to_string();
        let sidecar = match ImageSidecar::read(&self.layout.sidecar_path(&id)) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!(%filename, error = %e, "Ignoring unreadable sidecar");
                None
            }
        };
        let sidecar = sidecar.unwrap_or_else(|| ImageSidecar {
            title: title_from_id(&id),
            ..Default::default()
        });

        let updated_at = metadata.modified()?;
        let created_at = metadata.created().unwrap_or(updated_at);

        Ok(ImageRecord {
            filename: filename.to_string(),
            original_name: sidecar.original_name,
            title: sidecar.title,
            description: sidecar.description,
            url: self.layout.file_url(filename),
            thumbnail: self.layout.thumbnail_url(filename),
            size: metadata.len(),
            dimensions: ImageRecord::format_dimensions(width, height),
            mime_type: format.to_mime_type().to_string(),
            tags: sidecar.tags,
            created_at: to_utc(created_at),
            updated_at: to_utc(updated_at),
            id,
        })
    }
}

fn title_from_id(id: &str) -> String {
    id.replace(['-', '_'], " ")
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;

    fn scanner() -> (CatalogScanner, TempDir) {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path(), "http://localhost:3001");
        (CatalogScanner::new(layout), dir)
    }

    fn write_image(dir: &TempDir, name: &str, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))
            .save(dir.path().join(name))
            .unwrap();
    }

    fn records(entries: Vec<ScanEntry>) -> Vec<ImageRecord> {
        entries
            .into_iter()
            .filter_map(|e| match e {
                ScanEntry::Record(r) => Some(r),
                ScanEntry::Skipped { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let layout = StorageLayout::new("/nonexistent/gallery/uploads", "http://x");
        assert!(CatalogScanner::new(layout).scan().unwrap().is_empty());
    }

    #[test]
    fn test_lists_only_originals() {
        let (scanner, dir) = scanner();
        write_image(&dir, "a.png", 4, 3);
        write_image(&dir, "thumb_a.png", 4, 3);
        write_image(&dir, "b.jpg", 8, 6);
        fs::write(dir.path().join("a.meta.json"), b"{\"title\":\"A\"}").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let found = records(scanner.scan().unwrap());
        let names: Vec<_> = found.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);
    }

    #[test]
    fn test_record_derived_from_header_and_stat() {
        let (scanner, dir) = scanner();
        write_image(&dir, "Sunset_Beach-01.png", 64, 48);

        let record = scanner.describe("Sunset_Beach-01.png").unwrap();
        assert_eq!(record.id, "Sunset_Beach-01");
        assert_eq!(record.title, "Sunset Beach 01");
        assert_eq!(record.description, "");
        assert!(record.tags.is_empty());
        assert_eq!(record.original_name, None);
        assert_eq!(record.dimensions, "64x48");
        assert_eq!(record.mime_type, "image/png");
        assert_eq!(
            record.size,
            fs::metadata(dir.path().join("Sunset_Beach-01.png")).unwrap().len()
        );
        assert_eq!(
            record.url,
            "http://localhost:3001/uploads/Sunset_Beach-01.png"
        );
        assert_eq!(
            record.thumbnail,
            "http://localhost:3001/uploads/thumb_Sunset_Beach-01.png"
        );
    }

    #[test]
    fn test_mime_type_follows_content_not_extension() {
        let (scanner, dir) = scanner();
        // PNG bytes under a .jpg name.
        RgbImage::from_pixel(5, 7, Rgb([1, 2, 3]))
            .save_with_format(dir.path().join("liar.jpg"), image::ImageFormat::Png)
            .unwrap();

        let record = scanner.describe("liar.jpg").unwrap();
        assert_eq!(record.mime_type, "image/png");
        assert_eq!(record.dimensions, "5x7");
    }

    #[test]
    fn test_sidecar_overrides_derived_fields() {
        let (scanner, dir) = scanner();
        write_image(&dir, "abc.png", 2, 2);
        ImageSidecar {
            original_name: Some("Sunset-Beach.jpg".into()),
            title: "Sunset-Beach.jpg".into(),
            description: "Evening".into(),
            tags: vec!["sea".into()],
        }
        .write(&dir.path().join("abc.meta.json"))
        .unwrap();

        let record = scanner.describe("abc.png").unwrap();
        assert_eq!(record.title, "Sunset-Beach.jpg");
        assert_eq!(record.description, "Evening");
        assert_eq!(record.tags, vec!["sea"]);
        assert_eq!(record.original_name.as_deref(), Some("Sunset-Beach.jpg"));
    }

    #[test]
    fn test_broken_sidecar_falls_back_to_filename() {
        let (scanner, dir) = scanner();
        write_image(&dir, "my_photo.png", 2, 2);
        fs::write(dir.path().join("my_photo.meta.json"), b"[oops").unwrap();

        let record = scanner.describe("my_photo.png").unwrap();
        assert_eq!(record.title, "my photo");
    }

    #[test]
    fn test_corrupt_file_is_skipped_not_fatal() {
        let (scanner, dir) = scanner();
        write_image(&dir, "good.png", 3, 3);
        fs::write(dir.path().join("bad.jpg"), b"garbage").unwrap();

        let entries = scanner.scan().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| matches!(
            e,
            ScanEntry::Skipped { filename, .. } if filename == "bad.jpg"
        )));

        let listed = scanner.records().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
    }
}
