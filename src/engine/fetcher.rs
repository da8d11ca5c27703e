use super::parser;
use super::pattern::BlockPattern;
use super::traits::ListSource;
use crate::error::FilterError;
use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::{redirect, Client};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListStatus {
    pub last_fetch: Option<SystemTime>,
    pub pattern_count: usize,
}

/// A named external block-list source and its on-disk cache.
#[derive(Debug)]
pub struct FilterList {
    pub name: String,
    pub url: String,
    pub cache_path: PathBuf,
    status: Mutex<ListStatus>,
    // Held for a whole download so overlapping refreshes take turns on the cache file
    fetch_lock: tokio::sync::Mutex<()>,
}

impl FilterList {
    pub fn new(name: impl Into<String>, url: impl Into<String>, cache_dir: &Path) -> Self {
        let name = name.into();
        let cache_path = cache_dir.join(format!("{}.txt", name));
        Self {
            name,
            url: url.into(),
            cache_path,
            status: Mutex::new(ListStatus::default()),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> ListStatus {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update_status(&self, f: impl FnOnce(&mut ListStatus)) {
        let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

/// Age of a cached file, `None` if it does not exist or has no usable mtime.
pub async fn cache_age(path: &Path) -> Option<Duration> {
    let meta = fs::metadata(path).await.ok()?;
    let modified = meta.modified().ok()?;
    Some(modified.elapsed().unwrap_or_default())
}

/// Downloads lists into their cache files and parses them.
pub struct ListFetcher {
    client: Client,
    max_age: Duration,
}

impl ListFetcher {
    pub fn new(user_agent: &str, max_age: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::limited(1))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, max_age })
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Refreshes the cache file of `list`.
    ///
    /// Returns `Ok(false)` without touching the network while the cache is
    /// younger than the max age (unless `force`), `Ok(true)` after a
    /// successful download. On failure the existing cache is left as is.
    ///
    /// Concurrent fetches of the same list run one after another; a
    /// non-forced one that waited finds the cache just written and skips.
    pub async fn fetch(&self, list: &FilterList, force: bool) -> Result<bool, FilterError> {
        let _turn = list.fetch_lock.lock().await;
        if !force {
            if let Some(age) = cache_age(&list.cache_path).await {
                if age < self.max_age {
                    debug!(
                        "Using cached '{}' (age: {} days)",
                        list.name,
                        age.as_secs() / 86_400
                    );
                    return Ok(false);
                }
            }
        }

        info!("Downloading filter list '{}' from {}", list.name, list.url);
        let resp = self.client.get(&list.url).send().await.map_err(|e| {
            if e.is_redirect() {
                FilterError::Redirect {
                    url: list.url.clone(),
                }
            } else {
                FilterError::Http {
                    url: list.url.clone(),
                    source: e,
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FilterError::Status {
                url: list.url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = self.write_atomically(list, resp).await?;
        list.update_status(|s| s.last_fetch = Some(SystemTime::now()));
        info!("Downloaded '{}' ({} bytes)", list.name, bytes);
        Ok(true)
    }

    /// Streams the body to a sibling `.part` file, then renames it over the
    /// cache path so readers never observe a partial file.
    async fn write_atomically(
        &self,
        list: &FilterList,
        resp: reqwest::Response,
    ) -> Result<u64, FilterError> {
        if let Some(parent) = list.cache_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FilterError::io(parent, e))?;
        }

        let part = list.cache_path.with_extension(format!(
            "{}.{}.part",
            std::process::id(),
            PART_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result = async {
            let mut file = fs::File::create(&part)
                .await
                .map_err(|e| FilterError::io(&part, e))?;
            let mut stream = resp.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| FilterError::Http {
                    url: list.url.clone(),
                    source: e,
                })?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| FilterError::io(&part, e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| FilterError::io(&part, e))?;
            drop(file);
            fs::rename(&part, &list.cache_path)
                .await
                .map_err(|e| FilterError::io(&list.cache_path, e))?;
            Ok(written)
        }
        .await;

        if result.is_err() {
            if let Err(e) = fs::remove_file(&part).await {
                debug!("Could not remove partial file {}: {}", part.display(), e);
            }
        }
        result
    }

    /// Reads the cached file of `list` and parses it into globs.
    pub async fn parse(&self, list: &FilterList) -> Result<Vec<BlockPattern>, FilterError> {
        let raw = fs::read(&list.cache_path)
            .await
            .map_err(|e| FilterError::io(&list.cache_path, e))?;
        let patterns = parser::parse_list(&String::from_utf8_lossy(&raw));

        list.update_status(|s| s.pattern_count = patterns.len());
        info!(
            "Extracted {} URL patterns from '{}'",
            patterns.len(),
            list.name
        );
        if patterns.is_empty() {
            warn!("Filter list '{}' produced no usable patterns", list.name);
        }
        Ok(patterns)
    }
}

#[async_trait::async_trait]
impl ListSource for ListFetcher {
    async fn fetch(&self, list: &FilterList, force: bool) -> Result<bool, FilterError> {
        ListFetcher::fetch(self, list, force).await
    }

    async fn parse(&self, list: &FilterList) -> Result<Vec<BlockPattern>, FilterError> {
        ListFetcher::parse(self, list).await
    }
}
