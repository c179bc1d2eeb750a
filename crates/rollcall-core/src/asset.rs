//! Detection model asset resolution.
//!
//! The classifier file is fetched from a configurable URL into a local cache
//! directory. When a SHA-256 checksum is configured, both cached and freshly
//! downloaded copies must match it.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default classifier: OpenCV's frontal-face Haar cascade.
pub const DEFAULT_CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/master/data/haarcascades/haarcascade_frontalface_default.xml";

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("download of {url} returned {status}")]
    Status { url: String, status: String },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("asset cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a model asset comes from and how to verify it.
#[derive(Debug, Clone)]
pub struct AssetSpec {
    pub url: String,
    /// Lowercase hex SHA-256 of the expected file contents.
    pub sha256: Option<String>,
    /// File name inside the cache directory.
    pub file_name: String,
}

impl AssetSpec {
    /// Spec whose cache file name is the last path segment of `url`.
    pub fn from_url(url: impl Into<String>, sha256: Option<String>) -> Self {
        let url = url.into();
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("model.bin")
            .to_string();
        Self {
            url,
            sha256: sha256.map(|s| s.trim().to_ascii_lowercase()),
            file_name,
        }
    }
}

/// Default cache directory: `$XDG_CACHE_HOME/rollcall`, else `~/.cache/rollcall`.
pub fn default_asset_dir() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        })
        .join("rollcall")
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn verify(path: &Path, data: &[u8], expected: Option<&str>) -> Result<(), AssetError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = sha256_hex(data);
    if actual != expected {
        return Err(AssetError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Return a verified local copy of the asset, downloading it if needed.
///
/// A cached copy that fails verification is discarded and fetched again.
pub async fn resolve(
    wanted: &AssetSpec,
    cache_dir: &Path,
    client: &reqwest::Client,
) -> Result<PathBuf, AssetError> {
    let path = cache_dir.join(&wanted.file_name);

    match tokio::fs::read(&path).await {
        Ok(cached) => match verify(&path, &cached, wanted.sha256.as_deref()) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "using cached model asset");
                return Ok(path);
            }
            Err(e) => {
                tracing::warn!(error = %e, "cached model asset rejected; downloading again");
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    tracing::info!(url = %wanted.url, "downloading model asset");
    let response = client.get(&wanted.url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AssetError::Status {
            url: wanted.url.clone(),
            status: status.to_string(),
        });
    }
    let body = response.bytes().await?;
    verify(&path, &body, wanted.sha256.as_deref())?;

    tokio::fs::create_dir_all(cache_dir).await?;
    let partial = cache_dir.join(format!("{}.part", wanted.file_name));
    tokio::fs::write(&partial, &body).await?;
    tokio::fs::rename(&partial, &path).await?;

    tracing::info!(path = %path.display(), bytes = body.len(), "model asset cached");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on the discard port; any fetch attempt fails fast.
    const UNREACHABLE: &str = "http://127.0.0.1:9/face.xml";

    #[test]
    fn test_spec_file_name_from_url() {
        let wanted = AssetSpec::from_url(DEFAULT_CASCADE_URL, None);
        assert_eq!(wanted.file_name, "haarcascade_frontalface_default.xml");
    }

    #[test]
    fn test_spec_checksum_normalized() {
        let wanted = AssetSpec::from_url(UNREACHABLE, Some(" ABCDEF ".into()));
        assert_eq!(wanted.sha256.as_deref(), Some("abcdef"));
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_resolve_uses_verified_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("face.xml"), b"abc").unwrap();
        let wanted = AssetSpec::from_url(UNREACHABLE, Some(sha256_hex(b"abc")));

        let path = resolve(&wanted, dir.path(), &reqwest::Client::new()).await.unwrap();
        assert_eq!(path, dir.path().join("face.xml"));
    }

    #[tokio::test]
    async fn test_resolve_uses_unchecked_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("face.xml"), b"anything").unwrap();
        let wanted = AssetSpec::from_url(UNREACHABLE, None);
        assert!(resolve(&wanted, dir.path(), &reqwest::Client::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolve_rejects_tampered_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("face.xml"), b"tampered").unwrap();
        let wanted = AssetSpec::from_url(UNREACHABLE, Some(sha256_hex(b"abc")));

        // The bad copy is not accepted, and the refetch cannot succeed.
        let result = resolve(&wanted, dir.path(), &reqwest::Client::new()).await;
        assert!(matches!(result, Err(AssetError::Download(_))));
    }

    /// Answer one GET with `body` and return the URL to fetch.
    async fn serve_file(body: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/face.xml")
    }

    #[tokio::test]
    async fn test_resolve_downloads_into_new_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("sub");
        let wanted = AssetSpec::from_url(serve_file(b"abc").await, Some(sha256_hex(b"abc")));

        let path = resolve(&wanted, &cache, &reqwest::Client::new()).await.unwrap();
        assert_eq!(path, cache.join("face.xml"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        assert!(!cache.join("face.xml.part").exists());
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_download() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("sub");
        let wanted = AssetSpec::from_url(serve_file(b"evil").await, Some(sha256_hex(b"abc")));

        let result = resolve(&wanted, &cache, &reqwest::Client::new()).await;
        assert!(matches!(result, Err(AssetError::ChecksumMismatch { .. })));
        assert!(!cache.join("face.xml").exists());
        assert!(!cache.join("face.xml.part").exists());
    }

    #[test]
    fn test_verify_mismatch() {
        let err = verify(Path::new("x"), b"abc", Some("00")).unwrap_err();
        assert!(matches!(err, AssetError::ChecksumMismatch { .. }));
    }
}
