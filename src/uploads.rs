//! Avatar blob storage.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tokio::io::AsyncWriteExt;

use crate::error::AppError;

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
/// Stored avatars are cropped to this many pixels on each side.
pub const AVATAR_SIZE: u32 = 256;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Only jpg, jpeg and png images are allowed")]
    UnsupportedFormat,

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Uploaded file is larger than {} bytes", MAX_AVATAR_BYTES)]
    TooLarge,

    #[error("Uploaded file is not a readable image")]
    InvalidImage(#[source] image::ImageError),

    #[error("Image processing failed: {0}")]
    Processing(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io(e) => AppError::Internal(e.to_string()),
            UploadError::Processing(msg) => AppError::Internal(msg),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Store an image and return the public URL it is reachable at.
    async fn store(&self, file_name: &str, data: Bytes) -> Result<String, UploadError>;
}

/// Stores avatars as files in a local directory.
pub struct LocalAvatarStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalAvatarStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.into(),
        }
    }
}

#[async_trait]
impl AvatarStore for LocalAvatarStore {
    async fn store(&self, file_name: &str, data: Bytes) -> Result<String, UploadError> {
        if data.is_empty() {
            return Err(UploadError::Empty);
        }
        if data.len() > MAX_AVATAR_BYTES {
            return Err(UploadError::TooLarge);
        }
        let ext = allowed_extension(file_name).ok_or(UploadError::UnsupportedFormat)?;
        if !content_matches(&ext, &data) {
            return Err(UploadError::UnsupportedFormat);
        }

        let format = image_format(&ext);
        let data = tokio::task::spawn_blocking(move || crop_square(&data, format))
            .await
            .map_err(|e| UploadError::Processing(format!("crop task failed: {}", e)))??;

        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = sanitize_file_name(file_name, &ext);
        let mut name = format!("{}-{}", Utc::now().timestamp_millis(), stem);
        let mut file = loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&name))
                .await
            {
                Ok(file) => break file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    name = format!(
                        "{}-{}-{}",
                        Utc::now().timestamp_millis(),
                        &uuid::Uuid::now_v7().simple().to_string()[24..],
                        stem
                    );
                }
                Err(e) => return Err(e.into()),
            }
        };
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::info!(file = %name, bytes = data.len(), "Avatar stored");
        Ok(format!("{}/{}", self.public_url.trim_end_matches('/'), name))
    }
}

fn allowed_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn image_format(ext: &str) -> ImageFormat {
    match ext {
        "png" => ImageFormat::Png,
        _ => ImageFormat::Jpeg,
    }
}

/// Scale to cover `AVATAR_SIZE` square, crop the overflow around the
/// centre, and re-encode in the uploaded format.
fn crop_square(data: &[u8], format: ImageFormat) -> Result<Vec<u8>, UploadError> {
    let img = image::load_from_memory_with_format(data, format).map_err(UploadError::InvalidImage)?;
    let img = img.resize_to_fill(AVATAR_SIZE, AVATAR_SIZE, FilterType::Lanczos3);
    // JPEG has no alpha channel.
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format)
        .map_err(|e| UploadError::Processing(e.to_string()))?;
    Ok(out.into_inner())
}

/// Check the magic bytes agree with the claimed extension.
fn content_matches(ext: &str, data: &[u8]) -> bool {
    match ext {
        "png" => data.starts_with(b"\x89PNG\r\n\x1a\n"),
        "jpg" | "jpeg" => data.starts_with(&[0xFF, 0xD8, 0xFF]),
        _ => false,
    }
}

/// Keep only the final path component, whitespace runs become `-`, and
/// anything outside `[A-Za-z0-9._-]` is dropped.
pub fn sanitize_file_name(file_name: &str, ext: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let mut out = String::with_capacity(base.len());
    let mut in_space = false;
    for c in base.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        }
    }

    let out = out.trim_start_matches('.').to_string();
    if allowed_extension(&out).is_none() {
        format!("avatar.{}", ext)
    } else {
        out
    }
}

/// A stored name is a single, non-hidden path component.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 40])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        Bytes::from(out.into_inner())
    }

    #[test]
    fn sanitize_replaces_whitespace_and_strips_dirs() {
        assert_eq!(sanitize_file_name("my  cat photo.png", "png"), "my-cat-photo.png");
        assert_eq!(sanitize_file_name("../../etc/x.jpg", "jpg"), "x.jpg");
        assert_eq!(sanitize_file_name("фото.jpg", "jpg"), "avatar.jpg");
    }

    #[test]
    fn safe_names() {
        assert!(is_safe_name("1700000000000-a.png"));
        assert!(!is_safe_name("../secret"));
        assert!(!is_safe_name(".hidden"));
        assert!(!is_safe_name("a/b.png"));
        assert!(!is_safe_name(""));
    }

    #[tokio::test]
    async fn stores_png_and_returns_public_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(tmp.path(), "/uploads/");
        let url = store
            .store("Me.PNG", encoded(300, 300, ImageFormat::Png))
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with("-Me.PNG"));
        let name = url.trim_start_matches("/uploads/");
        let on_disk = std::fs::read(tmp.path().join(name)).unwrap();
        assert!(on_disk.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[tokio::test]
    async fn non_square_images_are_cropped_to_avatar_size() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(tmp.path(), "/uploads");
        for (name, format) in [("wide.png", ImageFormat::Png), ("tall.jpg", ImageFormat::Jpeg)] {
            let (w, h) = if name.starts_with("wide") { (640, 200) } else { (120, 480) };
            let url = store.store(name, encoded(w, h, format)).await.unwrap();
            let on_disk = std::fs::read(tmp.path().join(url.trim_start_matches("/uploads/"))).unwrap();
            let stored = image::load_from_memory_with_format(&on_disk, format).unwrap();
            assert_eq!((stored.width(), stored.height()), (AVATAR_SIZE, AVATAR_SIZE), "{}", name);
        }
    }

    #[tokio::test]
    async fn rejects_truncated_image_data() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(tmp.path(), "/uploads");
        let err = store
            .store("a.png", Bytes::from_static(b"\x89PNG\r\n\x1a\nnot really"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidImage(_)));
        let app: AppError = err.into();
        assert_eq!(app.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn same_name_twice_gets_distinct_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(tmp.path(), "/uploads");
        let jpeg = encoded(32, 32, ImageFormat::Jpeg);
        let a = store.store("a.jpg", jpeg.clone()).await.unwrap();
        let b = store.store("a.jpg", jpeg).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn rejects_disallowed_formats() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(tmp.path(), "/uploads");
        let png = encoded(8, 8, ImageFormat::Png);
        for name in ["a.gif", "a", "a.png.exe"] {
            let err = store
                .store(name, png.clone())
                .await
                .unwrap_err();
            assert!(matches!(err, UploadError::UnsupportedFormat), "{}", name);
        }
    }

    #[tokio::test]
    async fn rejects_content_that_lies_about_its_type() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(tmp.path(), "/uploads");
        let err = store
            .store("a.png", Bytes::from_static(b"<html>"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedFormat));
    }

    #[tokio::test]
    async fn rejects_empty_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalAvatarStore::new(tmp.path(), "/uploads");
        let err = store.store("a.png", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, UploadError::Empty));
        let app: AppError = err.into();
        assert_eq!(app.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
