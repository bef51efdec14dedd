//! Naming rules for the storage directory.
//!
//! The directory is flat: originals (`<uuid>.<ext>`), their thumbnails
//! (`thumb_<uuid>.<ext>`, always JPEG bytes) and upload sidecars (`<uuid>.meta.json`).

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

pub const THUMBNAIL_PREFIX: &str = "thumb_";
pub const SIDECAR_SUFFIX: &str = ".meta.json";
/// URL path the storage directory is served under.
pub const STATIC_URL_PREFIX: &str = "/uploads";
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    public_base_url: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn original_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn thumbnail_path(&self, filename: &str) -> PathBuf {
        self.root.join(thumbnail_name(filename))
    }

    pub fn sidecar_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{SIDECAR_SUFFIX}"))
    }

    pub fn file_url(&self, filename: &str) -> String {
        format!("{}{STATIC_URL_PREFIX}/{filename}", self.public_base_url)
    }

    pub fn thumbnail_url(&self, filename: &str) -> String {
        self.file_url(&thumbnail_name(filename))
    }
}

pub fn thumbnail_name(filename: &str) -> String {
    format!("{THUMBNAIL_PREFIX}{filename}")
}

/// Originals only: an allow-listed image extension and no thumbnail prefix.
pub fn is_original_image(filename: &str) -> bool {
    !filename.starts_with(THUMBNAIL_PREFIX) && has_image_extension(filename)
}

/// Files the static route may hand out: originals and thumbnails, never sidecars
/// or the hidden temp files of an in-flight write.
pub fn is_public_file(filename: &str) -> bool {
    !filename.starts_with('.') && has_image_extension(filename)
}

pub fn has_image_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn image_id(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename)
}

pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Writes `bytes` to a temp file beside `target` and renames it into place, so
/// readers never observe a half-written file.
pub fn write_atomically(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| e.error)?;
    Ok(())
}
