//! Asset handling: downloads to disk and base64 transport encoding.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use shotforge_core::ImageSource;

/// Errors from asset download or encoding.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image file not found: {0}")]
    NotFound(PathBuf),
}

/// Write downloaded image bytes under `dir` with a timestamped name.
///
/// The file name embeds the backend request id so sibling jobs completing
/// within the same second do not collide.
pub async fn save_image_bytes(
    dir: &Path,
    request_id: &str,
    bytes: &[u8],
) -> Result<PathBuf, AssetError> {
    tokio::fs::create_dir_all(dir).await?;

    let ts = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = dir.join(format!("generated_image_{ts}_{request_id}.png"));
    tokio::fs::write(&path, bytes).await?;

    tracing::info!(path = %path.display(), "Image saved");
    Ok(path)
}

/// Encode a conditioning image to the base64 transport form Bria expects.
///
/// Remote sources are downloaded first; local sources are read from disk.
pub async fn encode_image_to_base64(source: &ImageSource) -> Result<String, AssetError> {
    let bytes = match source {
        ImageSource::Url(url) => {
            tracing::info!(url = %url, "Downloading conditioning image");
            let response = reqwest::get(url).await?.error_for_status()?;
            response.bytes().await?.to_vec()
        }
        ImageSource::File(path) => {
            if !path.exists() {
                return Err(AssetError::NotFound(path.clone()));
            }
            tracing::info!(path = %path.display(), "Reading conditioning image");
            tokio::fs::read(path).await?
        }
    };

    let encoded = BASE64.encode(&bytes);
    tracing::debug!(
        input_bytes = bytes.len(),
        encoded_chars = encoded.len(),
        "Encoded image to base64"
    );
    Ok(encoded)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encode_local_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        tokio::fs::write(&path, b"fake-png-bytes").await.unwrap();

        let encoded = encode_image_to_base64(&ImageSource::File(path)).await.unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), b"fake-png-bytes");
    }

    #[tokio::test]
    async fn encode_missing_file_is_not_found() {
        let err = encode_image_to_base64(&ImageSource::File("/no/such/file.png".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[tokio::test]
    async fn save_creates_dir_and_names_by_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("generated_images");

        let path = save_image_bytes(&nested, "req-42", b"imgdata").await.unwrap();

        assert!(path.starts_with(&nested));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("generated_image_"));
        assert!(name.contains("req-42"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"imgdata");
    }
}
