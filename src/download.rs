//! Streams a media URL to disk, reporting progress as it goes.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::{error, info};

const MAX_TITLE_CHARS: usize = 100;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadFormat {
    Video,
    Audio,
}

impl DownloadFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DownloadFormat::Video => "mp4",
            DownloadFormat::Audio => "mp3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub format: DownloadFormat,
    pub title: String,
    pub output_dir: PathBuf,
}

impl DownloadRequest {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", sanitize_title(&self.title), self.format.extension()))
    }

    /// Sibling file the body streams into before it is renamed into place.
    pub fn partial_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{}.part",
            sanitize_title(&self.title),
            self.format.extension()
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DownloadEvent {
    Progress {
        id: u64,
        downloaded: u64,
        total: Option<u64>,
        percent: Option<u8>,
    },
    Complete {
        id: u64,
        path: PathBuf,
    },
    Error {
        id: u64,
        message: String,
    },
}

/// Replaces anything but word characters and whitespace with `_` and caps
/// the length.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TITLE_CHARS)
        .collect();
    if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build download client")?;
        Ok(Self { client })
    }

    /// Downloads `request`, emitting progress events and exactly one
    /// terminal event. The output file only appears once the body is
    /// complete; on failure the partial file is removed and anything
    /// already at the output path is left alone.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
    ) -> Result<PathBuf> {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let path = request.output_path();
        let part = request.partial_path();
        info!("Download {} started: {} -> {}", id, request.url, path.display());

        let result = match self.stream_to(id, request, &part, &events).await {
            Ok(bytes) => fs::rename(&part, &path)
                .await
                .with_context(|| format!("Failed to move download into {}", path.display()))
                .map(|_| bytes),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                info!("Download {} complete ({} bytes)", id, bytes);
                let _ = events
                    .send(DownloadEvent::Complete {
                        id,
                        path: path.clone(),
                    })
                    .await;
                Ok(path)
            }
            Err(e) => {
                error!("Download {} failed: {:#}", id, e);
                if fs::metadata(&part).await.is_ok() {
                    let _ = fs::remove_file(&part).await;
                }
                let _ = events
                    .send(DownloadEvent::Error {
                        id,
                        message: format!("{:#}", e),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        id: u64,
        request: &DownloadRequest,
        path: &Path,
        events: &mpsc::Sender<DownloadEvent>,
    ) -> Result<u64> {
        let resp = self
            .client
            .get(&request.url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", request.url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("Server returned status {}", status);
        }
        let total = resp.content_length();

        fs::create_dir_all(&request.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", request.output_dir.display()))?;
        let mut file = fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let stream = resp
            .bytes_stream()
            .map(|result| result.map_err(std::io::Error::other));
        let mut reader = StreamReader::new(stream);
        let mut buf = vec![0u8; 64 * 1024];
        let mut downloaded = 0u64;
        loop {
            let n = reader.read(&mut buf).await.context("Download interrupted")?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            downloaded += n as u64;
            let percent = total
                .filter(|t| *t > 0)
                .map(|t| ((downloaded * 100) / t).min(100) as u8);
            let _ = events
                .send(DownloadEvent::Progress {
                    id,
                    downloaded,
                    total,
                    percent,
                })
                .await;
        }
        file.flush().await?;
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn serve(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = sock.write_all(head.as_bytes()).await;
                let _ = sock.write_all(body).await;
            }
        });
        format!("http://{}/media", addr)
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Rust: the \"good\" parts!"), "Rust_ the _good_ parts_");
        assert_eq!(sanitize_title(&"a".repeat(150)).len(), 100);
        assert_eq!(sanitize_title("///"), "___");
        assert_eq!(sanitize_title(""), "download");
    }

    #[tokio::test]
    async fn test_download_reports_progress_and_completion() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve("200 OK", b"0123456789").await;
        let request = DownloadRequest {
            url,
            format: DownloadFormat::Audio,
            title: "My clip".to_string(),
            output_dir: dir.path().join("out"),
        };
        let (tx, mut rx) = mpsc::channel(64);
        let path = Downloader::new("test").unwrap().download(&request, tx).await.unwrap();

        assert_eq!(path, dir.path().join("out").join("My clip.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        match events.iter().rev().nth(1) {
            Some(DownloadEvent::Progress {
                downloaded,
                total,
                percent,
                ..
            }) => {
                assert_eq!(*downloaded, 10);
                assert_eq!(*total, Some(10));
                assert_eq!(*percent, Some(100));
            }
            other => panic!("expected progress, got {:?}", other),
        }
        assert!(matches!(events.last(), Some(DownloadEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn test_failed_download_emits_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve("404 Not Found", b"").await;
        let request = DownloadRequest {
            url,
            format: DownloadFormat::Video,
            title: "missing".to_string(),
            output_dir: dir.path().to_path_buf(),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let result = Downloader::new("test").unwrap().download(&request, tx).await;
        assert!(result.is_err());
        match rx.recv().await {
            Some(DownloadEvent::Error { message, .. }) => assert!(message.contains("404")),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(!dir.path().join("missing.mp4").exists());
    }

    #[tokio::test]
    async fn test_failed_download_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("My Video.mp4");
        std::fs::write(&existing, b"earlier copy").unwrap();
        let url = serve("500 Internal Server Error", b"").await;
        let request = DownloadRequest {
            url,
            format: DownloadFormat::Video,
            title: "My Video".to_string(),
            output_dir: dir.path().to_path_buf(),
        };
        let (tx, _rx) = mpsc::channel(8);
        let result = Downloader::new("test").unwrap().download(&request, tx).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(&existing).unwrap(), b"earlier copy");
        assert!(!request.partial_path().exists());
    }

    #[tokio::test]
    async fn test_successful_download_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("My Video.mp4");
        std::fs::write(&existing, b"earlier copy").unwrap();
        let url = serve("200 OK", b"new body").await;
        let request = DownloadRequest {
            url,
            format: DownloadFormat::Video,
            title: "My Video".to_string(),
            output_dir: dir.path().to_path_buf(),
        };
        let (tx, _rx) = mpsc::channel(64);
        let path = Downloader::new("test").unwrap().download(&request, tx).await.unwrap();

        assert_eq!(path, existing);
        assert_eq!(std::fs::read(&existing).unwrap(), b"new body");
        assert!(!request.partial_path().exists());
    }
}
