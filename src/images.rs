//! Profile image storage
//!
//! Each user owns a directory `<root>/<username>/` holding a single
//! `<username>.jpg`. Uploads are accepted only when their declared content
//! type is JPEG, PNG or GIF.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::ImageConfig;
use crate::observability::SecurityEvent;

/// Content types accepted for profile images
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// Extension every stored image gets
pub const IMAGE_EXTENSION: &str = "jpg";

/// Image storage failures
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{0} is not an image file. Please upload an image")]
    NotAnImageFile(String),

    #[error("image is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },

    #[error("invalid path segment '{0}'")]
    InvalidPath(String),

    #[error("image not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An uploaded file
#[derive(Debug, Clone)]
pub struct ProfileImage {
    /// Client-side file name
    pub file_name: String,
    /// Declared MIME type
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ProfileImage {
    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                ALLOWED_CONTENT_TYPES.contains(&essence.as_str())
            })
            .unwrap_or(false)
    }
}

/// Filesystem-backed profile image store
#[derive(Debug, Clone)]
pub struct ProfileImageStore {
    root: PathBuf,
    public_base_url: String,
    avatar_base_url: String,
    max_size: usize,
}

impl ProfileImageStore {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            root: config.root.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            avatar_base_url: config.avatar_base_url.trim_end_matches('/').to_string(),
            max_size: config.max_size,
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Placeholder avatar assigned before any upload
    pub fn temporary_url(&self, username: &str) -> String {
        format!("{}/{}", self.avatar_base_url, username)
    }

    /// URL under which a stored image is served
    pub fn profile_url(&self, username: &str) -> String {
        format!(
            "{}/user/image/{}/{}.{}",
            self.public_base_url, username, username, IMAGE_EXTENSION
        )
    }

    /// Validate and write an upload, replacing any previous image.
    ///
    /// Returns the public URL of the stored image.
    pub async fn save(&self, username: &str, image: &ProfileImage) -> Result<String, ImageError> {
        if !image.is_image() {
            return Err(ImageError::NotAnImageFile(image.file_name.clone()));
        }
        if image.bytes.len() > self.max_size {
            return Err(ImageError::TooLarge {
                size: image.bytes.len(),
                max: self.max_size,
            });
        }

        let folder = self.user_folder(username)?;
        tokio::fs::create_dir_all(&folder).await?;

        let target = folder.join(format!("{username}.{IMAGE_EXTENSION}"));
        match tokio::fs::remove_file(&target).await {
            Ok(()) => debug!(path = %target.display(), "Replaced previous profile image"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::write(&target, &image.bytes).await?;

        crate::security_event!(
            SecurityEvent::ProfileImageStored,
            username = %username,
            size = image.bytes.len(),
            "Profile image stored"
        );

        Ok(self.profile_url(username))
    }

    /// Read a stored file.
    pub async fn read(&self, username: &str, file_name: &str) -> Result<Vec<u8>, ImageError> {
        let path = self.user_folder(username)?.join(checked_segment(file_name)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(ImageError::NotFound(format!("{username}/{file_name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a user's directory. A missing directory is not an error.
    pub async fn remove_user_folder(&self, username: &str) -> Result<(), ImageError> {
        let folder = self.user_folder(username)?;
        match tokio::fs::remove_dir_all(&folder).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn user_folder(&self, username: &str) -> Result<PathBuf, ImageError> {
        Ok(self.root.join(checked_segment(username)?))
    }
}

// Usernames and file names become path components; anything that could
// leave the user's directory is refused.
fn checked_segment(segment: &str) -> Result<&str, ImageError> {
    let bad = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if bad {
        Err(ImageError::InvalidPath(segment.to_string()))
    } else {
        Ok(segment)
    }
}
