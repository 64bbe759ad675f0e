//! Input resolution: turn a user-supplied path, URL or byte buffer into a
//! [`SourceFile`].
//!
//! This is where "file selection" happens, so this is where the local
//! acceptance ceiling is enforced: a file over the ceiling never becomes a
//! `SourceFile` and the pipeline never starts. The declared media type comes
//! from the file extension (or the HTTP `Content-Type` for URLs); PDF and
//! image magic bytes are used only when the extension says nothing useful.

use crate::error::OcrChunkError;
use crate::policy::SizePolicy;
use crate::source::SourceFile;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an accepted [`SourceFile`].
pub async fn resolve_input(
    input: &str,
    policy: &SizePolicy,
    timeout_secs: u64,
) -> Result<SourceFile, OcrChunkError> {
    if is_url(input) {
        download_url(input, policy, timeout_secs).await
    } else {
        resolve_local(Path::new(input), policy).await
    }
}

/// Wrap an in-memory buffer, deriving the media type from `name`.
pub fn from_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    policy: &SizePolicy,
) -> Result<SourceFile, OcrChunkError> {
    let name = name.into();
    policy.check_acceptance(&name, bytes.len() as u64)?;
    let media_type = detect_media_type(&name, &bytes);
    Ok(SourceFile::new(name, media_type, bytes))
}

/// Read a local file after checking its size against the ceiling.
async fn resolve_local(path: &Path, policy: &SizePolicy) -> Result<SourceFile, OcrChunkError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_error(path.to_path_buf(), e))?;
    if !metadata.is_file() {
        return Err(OcrChunkError::InvalidInput {
            input: path.display().to_string(),
        });
    }

    let name = display_name(path);
    policy.check_acceptance(&name, metadata.len())?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| io_error(path.to_path_buf(), e))?;
    let media_type = detect_media_type(&name, &bytes);
    debug!("Resolved local file: {} ({}, {} bytes)", path.display(), media_type, bytes.len());
    Ok(SourceFile::new(name, media_type, bytes))
}

/// Download a URL into memory and return it as a [`SourceFile`].
async fn download_url(
    url: &str,
    policy: &SizePolicy,
    timeout_secs: u64,
) -> Result<SourceFile, OcrChunkError> {
    info!("Downloading from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrChunkError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrChunkError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrChunkError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(OcrChunkError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = extract_filename(url);
    if let Some(len) = response.content_length() {
        policy.check_acceptance(&name, len)?;
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| OcrChunkError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    policy.check_acceptance(&name, bytes.len() as u64)?;

    let media_type = match content_type {
        Some(ct) if crate::source::MediaKind::from_media_type(&ct).is_some() => ct,
        _ => detect_media_type(&name, &bytes),
    };

    info!("Downloaded {} bytes as {}", bytes.len(), media_type);
    Ok(SourceFile::new(name, media_type, bytes.to_vec()))
}

/// Media type from the extension, falling back to magic bytes.
pub fn detect_media_type(name: &str, bytes: &[u8]) -> String {
    let guessed = mime_guess::from_path(name)
        .first()
        .map(|m| m.essence_str().to_string());
    if let Some(mime) = &guessed {
        if crate::source::MediaKind::from_media_type(mime).is_some() {
            return mime.clone();
        }
    }
    if bytes.starts_with(b"%PDF") {
        return "application/pdf".to_string();
    }
    if let Ok(format) = image::guess_format(bytes) {
        if let Some(mime) = image_format_mime(format) {
            return mime.to_string();
        }
    }
    guessed.unwrap_or_else(|| "application/octet-stream".to_string())
}

fn image_format_mime(format: image::ImageFormat) -> Option<&'static str> {
    match format {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn io_error(path: PathBuf, e: std::io::Error) -> OcrChunkError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrChunkError::PermissionDenied { path },
        _ => OcrChunkError::FileNotFound { path },
    }
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}
