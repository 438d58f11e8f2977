//! Remote artifact size probing and download
//!
//! `http(s)://` URLs go through `reqwest`; `file://` URLs are served from the
//! local filesystem (local mirrors, tests).

use std::path::{Path, PathBuf};
use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncWriteExt;
use url::Url;

use sidecar_core::prelude::*;

/// Progress is reported every this many bytes when the total is unknown
const PROGRESS_STEP_BYTES: u64 = 1024 * 1024;

/// Bytes received so far and the expected total, if known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received: u64,
    pub total: Option<u64>,
}

/// Fetches artifacts for the acquisition pipeline
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
}

impl ArtifactFetcher {
    /// `idle_timeout` bounds each wait for more bytes, not the whole
    /// transfer, so a slow but steady download never expires.
    pub fn new(
        connect_timeout: Duration,
        idle_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        Self::from_builder(
            reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .read_timeout(idle_timeout)
                .user_agent(user_agent),
        )
    }

    fn from_builder(builder: reqwest::ClientBuilder) -> Result<Self> {
        let client = builder
            .build()
            .map_err(|e| Error::download(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Size of the remote artifact, `None` when the server does not say.
    pub async fn remote_size(&self, url: &str) -> Result<Option<u64>> {
        let parsed = parse_url(url)?;
        match parsed.scheme() {
            "file" => {
                let path = local_path(&parsed)?;
                let meta = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| Error::download(format!("{}: {}", path.display(), e)))?;
                Ok(Some(meta.len()))
            }
            "http" | "https" => {
                debug!("HEAD {}", url);
                let response = self
                    .client
                    .head(url)
                    .send()
                    .await
                    .map_err(transfer_error)?;

                if !response.status().is_success() {
                    return Err(Error::download(format!(
                        "HEAD {} returned {}",
                        url,
                        response.status()
                    )));
                }

                // Read the header directly: a HEAD body is always empty.
                Ok(response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok()))
            }
            other => Err(Error::download(format!(
                "unsupported URL scheme '{}'",
                other
            ))),
        }
    }

    /// Download `url` to `dest`, reporting progress. Returns bytes written.
    ///
    /// A partially written `dest` is left behind on failure; the caller owns
    /// cleanup.
    pub async fn fetch<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let parsed = parse_url(url)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match parsed.scheme() {
            "file" => {
                let path = local_path(&parsed)?;
                let written = tokio::fs::copy(&path, dest)
                    .await
                    .map_err(|e| Error::download(format!("{}: {}", path.display(), e)))?;
                on_progress(DownloadProgress {
                    received: written,
                    total: Some(written),
                });
                Ok(written)
            }
            "http" | "https" => {
                info!("GET {}", url);
                let mut response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(transfer_error)?;

                if !response.status().is_success() {
                    return Err(Error::download(format!(
                        "GET {} returned {}",
                        url,
                        response.status()
                    )));
                }

                let total = response.content_length();
                let mut file = tokio::fs::File::create(dest).await?;
                let mut throttle = ProgressThrottle::default();
                let mut received = 0u64;

                while let Some(chunk) = response
                    .chunk()
                    .await
                    .map_err(transfer_error)?
                {
                    file.write_all(&chunk).await?;
                    received += chunk.len() as u64;
                    if throttle.should_report(received, total) {
                        on_progress(DownloadProgress { received, total });
                    }
                }
                file.flush().await?;

                if let Some(expected) = total {
                    if expected != received {
                        return Err(Error::download(format!(
                            "incomplete download: {} of {} bytes",
                            received, expected
                        )));
                    }
                }

                on_progress(DownloadProgress {
                    received,
                    total: Some(received),
                });
                info!("Downloaded {} bytes to {}", received, dest.display());
                Ok(received)
            }
            other => Err(Error::download(format!(
                "unsupported URL scheme '{}'",
                other
            ))),
        }
    }
}

/// File name of the artifact, taken from the last URL path segment
pub fn artifact_file_name(url: &str) -> Result<String> {
    let parsed = parse_url(url)?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::download(format!("no file name in URL {}", url)))?;

    let name = percent_decode_str(segment).decode_utf8_lossy().to_string();
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::download(format!("unusable file name in URL {}", url)));
    }
    Ok(name)
}

/// Flatten a reqwest error and its causes into one message, so a stalled
/// body reads as a timeout rather than a decode failure.
fn transfer_error(e: reqwest::Error) -> Error {
    let mut message = if e.is_timeout() {
        format!("timed out: {}", e)
    } else {
        e.to_string()
    };
    let mut source = std::error::Error::source(&e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::download(message)
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::download(format!("invalid URL '{}': {}", url, e)))
}

fn local_path(url: &Url) -> Result<PathBuf> {
    url.to_file_path()
        .map_err(|_| Error::download(format!("invalid file URL {}", url)))
}

/// Limits progress callbacks to whole-percent steps (or 1 MiB steps when
/// the total is unknown).
#[derive(Debug, Default)]
struct ProgressThrottle {
    last_percent: Option<u64>,
    last_bytes: u64,
}

impl ProgressThrottle {
    fn should_report(&mut self, received: u64, total: Option<u64>) -> bool {
        match total {
            Some(total) if total > 0 => {
                let percent = received.saturating_mul(100) / total;
                if self.last_percent != Some(percent) {
                    self.last_percent = Some(percent);
                    return true;
                }
                false
            }
            _ => {
                if received - self.last_bytes >= PROGRESS_STEP_BYTES {
                    self.last_bytes = received;
                    return true;
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> ArtifactFetcher {
        ArtifactFetcher::new(Duration::from_secs(5), Duration::from_secs(5), "sidecar-test")
            .unwrap()
    }

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(
            artifact_file_name("https://example.com/releases/v1/bridge.zip").unwrap(),
            "bridge.zip"
        );
        assert_eq!(
            artifact_file_name("https://example.com/dl/my%20tool.tar.gz?token=1").unwrap(),
            "my tool.tar.gz"
        );
        assert!(artifact_file_name("https://example.com/").is_err());
        assert!(artifact_file_name("not a url").is_err());
    }

    #[test]
    fn test_throttle_percent_steps() {
        let mut t = ProgressThrottle::default();
        assert!(t.should_report(1, Some(1000)));
        assert!(!t.should_report(5, Some(1000)));
        assert!(t.should_report(10, Some(1000)));
        assert!(!t.should_report(11, Some(1000)));
    }

    #[test]
    fn test_throttle_unknown_total() {
        let mut t = ProgressThrottle::default();
        assert!(!t.should_report(10, None));
        assert!(t.should_report(PROGRESS_STEP_BYTES, None));
        assert!(!t.should_report(PROGRESS_STEP_BYTES + 1, None));
    }

    #[tokio::test]
    async fn test_file_url_size_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("artifact.bin");
        std::fs::write(&source, vec![7u8; 4096]).unwrap();
        let url = file_url(&source);

        let fetcher = fetcher();
        assert_eq!(fetcher.remote_size(&url).await.unwrap(), Some(4096));

        let dest = dir.path().join("out").join("artifact.bin");
        let mut reports = Vec::new();
        let written = fetcher
            .fetch(&url, &dest, |p| reports.push(p))
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);
        assert_eq!(
            reports.last(),
            Some(&DownloadProgress {
                received: 4096,
                total: Some(4096)
            })
        );
    }

    #[tokio::test]
    async fn test_missing_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let url = file_url(&dir.path().join("missing.zip"));
        let result = fetcher().remote_size(&url).await;
        assert!(matches!(result, Err(Error::Download { .. })));
    }

    /// Serve one GET whose body is written one byte at a time with `pause`
    /// between writes, stopping after `sent` of `len` bytes.
    async fn trickle_server(len: usize, sent: usize, pause: Duration) -> String {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                len
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for _ in 0..sent {
                if socket.write_all(b"x").await.is_err() || socket.flush().await.is_err() {
                    return;
                }
                tokio::time::sleep(pause).await;
            }
            // Hold the connection open without sending the rest.
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        format!("http://{}/artifact.bin", addr)
    }

    fn local_fetcher(idle: Duration) -> ArtifactFetcher {
        ArtifactFetcher::from_builder(
            reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(5))
                .read_timeout(idle)
                .no_proxy(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_slow_steady_download_outlives_idle_timeout() {
        // 20 bytes at 100ms each takes ~2s, well past the 500ms idle limit.
        let url = trickle_server(20, 20, Duration::from_millis(100)).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.bin");

        let written = local_fetcher(Duration::from_millis(500))
            .fetch(&url, &dest, |_| {})
            .await
            .unwrap();

        assert_eq!(written, 20);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![b'x'; 20]);
    }

    #[tokio::test]
    async fn test_stalled_download_reports_timeout() {
        let url = trickle_server(20, 5, Duration::from_millis(10)).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("artifact.bin");

        let result = local_fetcher(Duration::from_millis(300))
            .fetch(&url, &dest, |_| {})
            .await;

        match result {
            Err(Error::Download { message }) => {
                assert!(message.contains("timed out"), "{}", message)
            }
            other => panic!("expected a download timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let result = fetcher().remote_size("ftp://example.com/a.zip").await;
        assert!(matches!(result, Err(Error::Download { .. })));
    }
}
