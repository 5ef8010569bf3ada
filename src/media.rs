//! Downloading the record's image into a transient local file.

use anyhow::{Context, bail};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::error::Error;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Anything larger needs a chunked upload, which is not supported.
pub const MAX_MEDIA_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const DEFAULT_MIME: &str = "image/jpeg";

const ALLOWED_MIME_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// An image on local disk. The file is removed when this is dropped.
#[derive(Debug)]
pub struct DownloadedImage {
    file: NamedTempFile,
    pub mime: &'static str,
    pub size: u64,
}

impl DownloadedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> String {
        format!("image.{}", extension_for(self.mime))
    }

    /// Remove the file now, reporting any failure.
    pub fn remove(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// Fetch `url` into a new temporary file under `dir`. A declared length over
/// `MAX_MEDIA_SIZE` fails with `Error::MediaTooLarge` before the body is read.
pub async fn download_image(
    http: &Client,
    url: &str,
    dir: &Path,
) -> anyhow::Result<DownloadedImage> {
    tracing::info!("Downloading image: {url}");

    let resp = http
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .context("image request failed")?;

    let status = resp.status();
    if !status.is_success() {
        bail!("image server returned {status}");
    }

    if let Some(size) = resp.content_length().filter(|len| *len > MAX_MEDIA_SIZE) {
        return Err(Error::MediaTooLarge {
            size,
            max: MAX_MEDIA_SIZE,
        }
        .into());
    }

    let header_mime = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mime = detect_mime(header_mime.as_deref(), url);

    let bytes = resp.bytes().await.context("failed to read image body")?;

    let mut file = tempfile::Builder::new()
        .prefix("notion-post-x-")
        .suffix(&format!(".{}", extension_for(mime)))
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    file.write_all(&bytes).context("failed to write image")?;
    file.flush().context("failed to write image")?;

    tracing::info!(
        "Image saved to {} ({} bytes, {mime})",
        file.path().display(),
        bytes.len()
    );
    Ok(DownloadedImage {
        file,
        mime,
        size: bytes.len() as u64,
    })
}

/// Prefer the server's content type, then the URL's extension, then JPEG.
fn detect_mime(content_type: Option<&str>, url: &str) -> &'static str {
    if let Some(header) = content_type {
        let essence = header.split(';').next().unwrap_or("").trim().to_lowercase();
        if let Some((mime, _)) = ALLOWED_MIME_TYPES.iter().find(|(m, _)| *m == essence) {
            return *mime;
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or("");
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    let ext = if ext == "jpeg" { "jpg".to_string() } else { ext };

    ALLOWED_MIME_TYPES
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(mime, _)| *mime)
        .unwrap_or(DEFAULT_MIME)
}

fn extension_for(mime: &str) -> &'static str {
    ALLOWED_MIME_TYPES
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
        .unwrap_or("jpg")
}
