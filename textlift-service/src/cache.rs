//! Staging area for processed PDFs awaiting download.
//!
//! Tokens are fresh UUIDs; no locking discipline beyond the map itself.
//! Entries expire after the configured TTL, and the periodic sweep deletes
//! the backing files along with the map entries.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ServiceResult;

/// A processed PDF staged for pickup via `GET /download/{token}`.
#[derive(Debug, Clone)]
pub struct CachedFile {
    pub path: PathBuf,
    pub stored_at: Instant,
}

/// Process-wide token → file mapping backing the download endpoint.
pub struct DownloadCache {
    dir: PathBuf,
    ttl: Duration,
    entries: DashMap<String, CachedFile>,
}

impl DownloadCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> ServiceResult<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            ttl,
            entries: DashMap::new(),
        })
    }

    /// Copy `source` out of its scoped working directory and issue a token
    /// under which it stays resolvable until evicted.
    pub fn store(&self, source: &Path) -> ServiceResult<String> {
        let token = Uuid::new_v4().to_string();
        let dest = self.dir.join(format!("{token}.pdf"));

        std::fs::copy(source, &dest)?;
        self.entries.insert(
            token.clone(),
            CachedFile {
                path: dest,
                stored_at: Instant::now(),
            },
        );

        debug!(token = %token, "Staged searchable PDF for download");
        Ok(token)
    }

    /// Resolve a token to its staged file.
    pub fn resolve(&self, token: &str) -> Option<PathBuf> {
        self.entries.get(token).map(|entry| entry.path.clone())
    }

    /// Drop a token and its backing file.
    pub fn remove(&self, token: &str) {
        if let Some((_, cached)) = self.entries.remove(token) {
            if let Err(e) = std::fs::remove_file(&cached.path) {
                warn!(token = %token, error = %e, "Failed to remove cached file");
            }
        }
    }

    /// Evict entries older than the TTL along with their backing files.
    /// Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().stored_at.elapsed() >= self.ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let count = expired.len();
        for token in expired {
            self.remove(&token);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
