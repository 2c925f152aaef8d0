//! Upload storage
//!
//! Uploaded files never keep their client-supplied names: each stored file
//! gets a UUID filename with an extension derived from the MIME type. Files
//! live in subdirectories of the upload root, one per purpose, and are
//! served back under `/uploads/`.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;

/// Subdirectory for vehicle photos
pub const PHOTOS_DIR: &str = "photos";
/// Subdirectory for vehicle registration documents
pub const DOCUMENTS_DIR: &str = "documents";
/// Subdirectory for user profile images
pub const PROFILES_DIR: &str = "profiles";

/// Create the upload root and its subdirectories
pub async fn ensure_upload_dirs(root: &Path) -> Result<()> {
    for subdir in [PHOTOS_DIR, DOCUMENTS_DIR, PROFILES_DIR] {
        let path = root.join(subdir);
        if !path.exists() {
            fs::create_dir_all(&path)
                .await
                .with_context(|| format!("Failed to create upload dir {}", path.display()))?;
        }
    }
    Ok(())
}

/// Store an uploaded file and return its generated filename
///
/// The caller has already checked the MIME type and size against config;
/// this only names and writes the bytes.
pub async fn store_file(
    config: &UploadConfig,
    subdir: &str,
    content_type: &str,
    data: &[u8],
) -> Result<String> {
    let filename = format!("{}.{}", Uuid::new_v4(), config.extension_for(content_type));
    let path = config.path.join(subdir).join(&filename);

    fs::write(&path, data)
        .await
        .with_context(|| format!("Failed to write upload {}", path.display()))?;

    Ok(filename)
}
