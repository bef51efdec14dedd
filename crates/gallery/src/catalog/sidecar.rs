use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::storage::write_atomically;

/// Upload-time metadata kept next to the original so it survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSidecar {
    #[serde(default)]
    pub original_name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("sidecar io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed sidecar: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImageSidecar {
    /// `Ok(None)` when no sidecar exists for the image.
    pub fn read(path: &Path) -> Result<Option<Self>, SidecarError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn write(&self, path: &Path) -> Result<(), SidecarError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomically(path, &bytes)?;
        Ok(())
    }
}

/// Splits the comma-separated `tags` form field.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sidecar_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            ImageSidecar::read(&dir.path().join("nope.meta.json"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn sidecar_survives_a_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.meta.json");
        let sidecar = ImageSidecar {
            original_name: Some("Sunset-Beach.jpg".into()),
            title: "Sunset".into(),
            description: "Golden hour".into(),
            tags: vec!["beach".into(), "sky".into()],
        };
        sidecar.write(&path).unwrap();
        assert_eq!(ImageSidecar::read(&path).unwrap(), Some(sidecar));
    }

    #[test]
    fn malformed_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.meta.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            ImageSidecar::read(&path),
            Err(SidecarError::Json(_))
        ));
    }

    #[test]
    fn tags_are_trimmed_and_empties_dropped() {
        assert_eq!(parse_tags(" beach, sky ,,  "), vec!["beach", "sky"]);
        assert!(parse_tags("").is_empty());
    }
}
