//! Raw page copies
//!
//! Listing pages land in `search_<hash8>_page_<n>.html`, where `hash8` is the
//! first 8 hex characters of the SHA-256 of the query. Detail pages land in
//! `details/record_<id>.html`. Writing is best effort: a failure is logged and
//! never interrupts the harvest.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Short stable name for a query
pub fn query_hash(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(8);
    hash
}

/// Writes fetched pages under a cache directory
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn listing_path(&self, query: &str, page: u32) -> PathBuf {
        self.dir
            .join(format!("search_{}_page_{}.html", query_hash(query), page))
    }

    pub fn detail_path(&self, record_id: &str) -> PathBuf {
        self.dir
            .join("details")
            .join(format!("record_{}.html", record_id))
    }

    pub fn store_listing(&self, query: &str, page: u32, content: &str) {
        write_best_effort(&self.listing_path(query, page), content);
    }

    pub fn store_detail(&self, record_id: &str, content: &str) {
        write_best_effort(&self.detail_path(record_id), content);
    }
}

fn write_best_effort(path: &Path, content: &str) {
    let result = path
        .parent()
        .map_or(Ok(()), |dir| std::fs::create_dir_all(dir))
        .and_then(|_| std::fs::write(path, content));

    match result {
        Ok(()) => tracing::trace!("Cached page at {}", path.display()),
        Err(e) => tracing::warn!("Failed to cache page at {}: {}", path.display(), e),
    }
}
