use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::future::join_all;
use iced::widget::image::Handle;
use std::path::{Path, PathBuf};

/// Most images a single message can carry.
pub const MAX_IMAGES: usize = 3;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// An image attached to a message: the data URI sent to the backend plus a preview handle.
#[derive(Debug, Clone)]
pub struct Attachment {
    data_uri: String,
    preview: Handle,
}

impl Attachment {
    pub fn new(mime: &str, bytes: Vec<u8>) -> Self {
        let data_uri = format!("data:{};base64,{}", mime, STANDARD.encode(&bytes));

        Attachment {
            data_uri,
            preview: Handle::from_bytes(bytes),
        }
    }

    #[allow(dead_code)]
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let (_, bytes) = decode_data_uri(uri)?;

        Some(Attachment {
            data_uri: uri.to_string(),
            preview: Handle::from_bytes(bytes),
        })
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn preview(&self) -> &Handle {
        &self.preview
    }
}

impl PartialEq for Attachment {
    fn eq(&self, other: &Self) -> bool {
        self.data_uri == other.data_uri
    }
}

/// Splits a `data:<mime>;base64,<payload>` URI into its mime type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}

pub async fn encode_file(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a supported image", path.display()))?;

    tracing::debug!(
        "Encoded {} ({}, {} bytes)",
        path.display(),
        format.to_mime_type(),
        bytes.len()
    );

    Ok(Attachment::new(format.to_mime_type(), bytes))
}

/// Encodes up to [`MAX_IMAGES`] files concurrently, keeping selection order.
///
/// Files that cannot be read or are not images are logged and left out.
pub async fn encode_files(paths: Vec<PathBuf>) -> Vec<Attachment> {
    let selected: Vec<PathBuf> = paths.into_iter().take(MAX_IMAGES).collect();
    let results = join_all(selected.iter().map(|path| encode_file(path))).await;

    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                tracing::warn!("Skipping image: {:#}", e);
                None
            }
        })
        .collect()
}

/// Opens the native multi-file picker filtered to images. Cancelling yields no paths.
pub async fn pick_image_files() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title("Adicionar imagem")
        .add_filter("Imagens", IMAGE_EXTENSIONS)
        .pick_files()
        .await
        .map(|files| files.iter().map(|file| file.path().to_path_buf()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(4, 3, image::Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_encode_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "red.png");

        let attachment = encode_file(&path).await.unwrap();
        assert!(attachment.data_uri().starts_with("data:image/png;base64,"));

        let (mime, bytes) = decode_data_uri(attachment.data_uri()).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, std::fs::read(&path).unwrap());
    }

    #[tokio::test]
    async fn test_format_is_sniffed_not_taken_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_png(dir.path(), "red.png");
        let renamed = dir.path().join("photo.jpg");
        std::fs::rename(&png, &renamed).unwrap();

        let attachment = encode_file(&renamed).await.unwrap();
        assert!(attachment.data_uri().starts_with("data:image/png;"));
    }

    #[tokio::test]
    async fn test_non_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just some text").unwrap();

        assert!(encode_file(&path).await.is_err());
        assert!(encode_file(&dir.path().join("missing.png")).await.is_err());
    }

    #[tokio::test]
    async fn test_encode_files_caps_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, "nope").unwrap();

        let paths = vec![
            write_png(dir.path(), "a.png"),
            bad,
            write_png(dir.path(), "b.png"),
            write_png(dir.path(), "c.png"),
            write_png(dir.path(), "d.png"),
        ];

        // Only the first three selections are encoded; the broken one is dropped.
        let attachments = encode_files(paths).await;
        assert_eq!(attachments.len(), 2);
    }

    #[test]
    fn test_decode_rejects_malformed_uris() {
        assert!(decode_data_uri("image/png;base64,AAAA").is_none());
        assert!(decode_data_uri("data:image/png,AAAA").is_none());
        assert!(decode_data_uri("data:image/png;base64,***").is_none());
    }

    #[test]
    fn test_attachment_equality_by_uri() {
        let a = Attachment::new("image/png", vec![1, 2, 3]);
        let b = Attachment::from_data_uri(a.data_uri()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Attachment::new("image/png", vec![4]));
    }
}
