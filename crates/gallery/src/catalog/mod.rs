//! The image catalog: the storage directory is the only source of truth.
//!
//! [`CatalogService`] answers list/get/upload/delete by re-scanning the directory on
//! every call. Lookups by id are linear in the number of stored images, which is fine
//! for the small catalogs this serves; there is no index to go stale.

pub mod scanner;
pub mod sidecar;
pub mod storage;
pub mod thumbnail;

use std::{cmp::Reverse, fs, io};

use api_types::{ImageRecord, ListImagesQuery, ListImagesResponse};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GalleryConfig;
use scanner::{CatalogScanner, ScanSkip};
use sidecar::{ImageSidecar, SidecarError, parse_tags};
use storage::{
    StorageLayout, extension_for_content_type, has_image_extension, image_id, write_atomically,
};
use thumbnail::{ThumbnailError, ThumbnailOutcome, ThumbnailService};

pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];
pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("image not found")]
    NotFound,
    #[error("no image file provided")]
    MissingFile,
    #[error("more than one image file provided")]
    MultipleFiles,
    #[error("unsupported content type `{0}`")]
    UnsupportedContentType(String),
    #[error("file exceeds the {limit} byte upload limit")]
    FileTooLarge { limit: usize },
    #[error("uploaded file is not a readable image: {0}")]
    InvalidImage(String),
    #[error("thumbnail generation failed: {0}")]
    Thumbnail(#[from] ThumbnailError),
    #[error(transparent)]
    Sidecar(#[from] SidecarError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] JoinError),
}

impl From<ScanSkip> for CatalogError {
    fn from(skip: ScanSkip) -> Self {
        match skip {
            ScanSkip::Io(e) => CatalogError::Io(e),
            other => CatalogError::InvalidImage(other.to_string()),
        }
    }
}

/// Normalised listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: usize,
    pub limit: usize,
    pub search: String,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_SIZE,
            search: String::new(),
        }
    }
}

impl From<ListImagesQuery> for ListQuery {
    fn from(query: ListImagesQuery) -> Self {
        Self {
            page: positive_or(query.page.as_deref(), DEFAULT_PAGE),
            limit: positive_or(query.limit.as_deref(), DEFAULT_PAGE_SIZE),
            search: query.search.unwrap_or_default(),
        }
    }
}

fn positive_or(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(leading_integer)
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// The run of digits at the start of `raw`, ignoring surrounding whitespace and a
/// leading `+`. Trailing garbage is dropped, so `"2abc"` and `"2.5"` both give 2.
fn leading_integer(raw: &str) -> Option<usize> {
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    unsigned[..end].parse().ok()
}

/// An image received from a client, fully buffered and not yet stored.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub content_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogService {
    scanner: CatalogScanner,
    max_upload_bytes: usize,
}

impl CatalogService {
    pub fn new(layout: StorageLayout, max_upload_bytes: usize) -> Self {
        Self {
            scanner: CatalogScanner::new(layout),
            max_upload_bytes,
        }
    }

    pub fn from_config(config: &GalleryConfig) -> Self {
        Self::new(
            StorageLayout::new(&config.uploads_dir, config.public_base_url.clone()),
            config.max_upload_bytes,
        )
    }

    pub fn layout(&self) -> &StorageLayout {
        self.scanner.layout()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Rejects anything outside the image allow-list. Called on the declared type
    /// before a single byte of the upload is read.
    pub fn check_content_type(&self, content_type: &str) -> Result<(), CatalogError> {
        let normalized = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if ALLOWED_CONTENT_TYPES.contains(&normalized.as_str()) {
            Ok(())
        } else {
            Err(CatalogError::UnsupportedContentType(content_type.to_string()))
        }
    }

    /// One page of the filtered catalog, newest first.
    ///
    /// Missing thumbnails are generated on the way; a failure there is logged and the
    /// record is still listed. Offsets are recomputed from scratch on every call, so
    /// concurrent uploads or deletes can shift page boundaries between requests.
    pub async fn list(&self, query: ListQuery) -> Result<ListImagesResponse, CatalogError> {
        let scanner = self.scanner.clone();
        let records = tokio::task::spawn_blocking(move || -> io::Result<Vec<ImageRecord>> {
            let records = scanner.records()?;
            for record in &records {
                ensure_thumbnail_logged(scanner.layout(), &record.filename);
            }
            Ok(records)
        })
        .await??;

        Ok(paginate(filter_and_sort(records, &query.search), &query))
    }

    pub async fn get(&self, id: &str) -> Result<ImageRecord, CatalogError> {
        let scanner = self.scanner.clone();
        let records = tokio::task::spawn_blocking(move || scanner.records()).await??;

        records
            .into_iter()
            .find(|record| record.id == id)
            .ok_or(CatalogError::NotFound)
    }

    /// Validate, store and describe one uploaded image, generating its thumbnail.
    ///
    /// Once the original has been written, any failure removes it again together with
    /// its sidecar and thumbnail, so an error never leaves a listable file behind.
    pub async fn upload(&self, upload: NewImage) -> Result<ImageRecord, CatalogError> {
        self.check_content_type(&upload.content_type)?;
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(CatalogError::FileTooLarge {
                limit: self.max_upload_bytes,
            });
        }

        let filename = stored_filename(&upload.original_name, &upload.content_type);
        let sidecar = ImageSidecar {
            title: upload
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| upload.original_name.clone()),
            description: upload.description.unwrap_or_default(),
            tags: upload.tags.as_deref().map(parse_tags).unwrap_or_default(),
            original_name: Some(upload.original_name),
        };

        let scanner = self.scanner.clone();
        let bytes = upload.bytes;
        let record =
            tokio::task::spawn_blocking(move || store_upload(&scanner, &filename, &bytes, &sidecar))
                .await??;

        info!(id = %record.id, filename = %record.filename, size = record.size, "Stored uploaded image");
        Ok(record)
    }

    /// Removes the original, its thumbnail and its sidecar. A missing thumbnail is
    /// fine; an id that resolves to no original is not.
    pub async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let record = self.get(id).await?;
        let layout = self.layout();

        match tokio::fs::remove_file(layout.original_path(&record.filename)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CatalogError::NotFound),
            Err(e) => return Err(e.into()),
        }
        remove_if_exists(&layout.thumbnail_path(&record.filename)).await?;
        remove_if_exists(&layout.sidecar_path(&record.id)).await?;

        info!(id = %record.id, filename = %record.filename, "Deleted image");
        Ok(())
    }
}

fn ensure_thumbnail_logged(layout: &StorageLayout, filename: &str) {
    let source = layout.original_path(filename);
    let target = layout.thumbnail_path(filename);
    match ThumbnailService::ensure(&source, &target) {
        Ok(ThumbnailOutcome::Generated) => debug!(%filename, "Generated thumbnail"),
        Ok(ThumbnailOutcome::AlreadyPresent) => {}
        Err(e) => warn!(%filename, error = %e, "Thumbnail generation failed"),
    }
}

/// `<uuid>.<ext>`, keeping the client's extension only when it is an allowed image
/// extension so the stored file is always listable.
fn stored_filename(original_name: &str, content_type: &str) -> String {
    let extension = if has_image_extension(original_name) {
        std::path::Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
    } else {
        None
    };
    let extension = extension
        .or_else(|| extension_for_content_type(content_type).map(str::to_string))
        .unwrap_or_else(|| "jpg".to_string());

    format!("{}.{}", Uuid::new_v4(), extension)
}

fn store_upload(
    scanner: &CatalogScanner,
    filename: &str,
    bytes: &[u8],
    sidecar: &ImageSidecar,
) -> Result<ImageRecord, CatalogError> {
    let layout = scanner.layout();
    fs::create_dir_all(layout.root())?;
    write_atomically(&layout.original_path(filename), bytes)?;

    let result = describe_upload(scanner, filename, sidecar);
    if result.is_err() {
        discard_upload(layout, filename);
    }
    result
}

fn describe_upload(
    scanner: &CatalogScanner,
    filename: &str,
    sidecar: &ImageSidecar,
) -> Result<ImageRecord, CatalogError> {
    let layout = scanner.layout();
    sidecar.write(&layout.sidecar_path(image_id(filename)))?;
    let record = scanner.describe(filename)?;
    ThumbnailService::ensure(
        &layout.original_path(filename),
        &layout.thumbnail_path(filename),
    )
    .map_err(|e| match e {
        // The header parsed but the pixel data did not.
        ThumbnailError::DecodeError(detail) => CatalogError::InvalidImage(detail),
        other => CatalogError::Thumbnail(other),
    })?;
    Ok(record)
}

fn discard_upload(layout: &StorageLayout, filename: &str) {
    let paths = [
        layout.original_path(filename),
        layout.sidecar_path(image_id(filename)),
        layout.thumbnail_path(filename),
    ];
    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to clean up upload"),
        }
    }
}

async fn remove_if_exists(path: &std::path::Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Case-insensitive substring match over title, description and filename, then
/// newest first with ties broken by id so repeated listings are stable.
fn filter_and_sort(records: Vec<ImageRecord>, search: &str) -> Vec<ImageRecord> {
    let needle = search.to_lowercase();
    let mut records: Vec<_> = records
        .into_iter()
        .filter(|record| needle.is_empty() || matches_search(record, &needle))
        .collect();
    records.sort_by(|a, b| {
        Reverse(a.created_at)
            .cmp(&Reverse(b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

fn matches_search(record: &ImageRecord, needle: &str) -> bool {
    record.title.to_lowercase().contains(needle)
        || record.description.to_lowercase().contains(needle)
        || record.filename.to_lowercase().contains(needle)
}

fn paginate(records: Vec<ImageRecord>, query: &ListQuery) -> ListImagesResponse {
    let total = records.len();
    let offset = (query.page - 1).saturating_mul(query.limit);
    let images: Vec<_> = records
        .into_iter()
        .skip(offset)
        .take(query.limit)
        .collect();
    let has_more = offset.saturating_add(images.len()) < total;

    ListImagesResponse {
        total,
        page: query.page,
        total_pages: total.div_ceil(query.limit),
        has_more,
        images,
    }
}
