//! Content-addressed cache of last-known-good generated code.

use std::{fs, path::PathBuf};

use anyhow::Result;

use crate::config::{Config, PipelineConfig};
use crate::dataframe::DataFrame;

/// Fingerprint payload layout version. Bump when the normalized structure
/// changes so stale entries miss instead of colliding.
const FINGERPRINT_VERSION: u32 = 1;

/// File-backed code cache. One file per fingerprint; last writer wins.
#[derive(Debug, Clone)]
pub struct CodeCache {
    enabled: bool,
    length: usize,
    cache_path: PathBuf,
}

impl CodeCache {
    pub fn from_config(cfg: &Config) -> Self {
        let len = cfg.get_usize("CACHE_LENGTH").unwrap_or(100);
        let path = cfg.cache_path();
        let enabled = cfg.get_bool("ENABLE_CACHE");
        if enabled {
            let _ = fs::create_dir_all(&path);
        }
        Self { enabled, length: len, cache_path: path }
    }

    /// A cache that never hits and never stores.
    pub fn disabled() -> Self {
        Self { enabled: false, length: 0, cache_path: PathBuf::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Deterministic key over the query, the ordered per-dataset column
    /// names, and the cache-relevant config flags.
    pub fn fingerprint(
        &self,
        query: &str,
        dfs: &[DataFrame],
        config: &PipelineConfig,
    ) -> Result<String> {
        let mut schemas: Vec<Vec<String>> = Vec::with_capacity(dfs.len());
        for df in dfs {
            schemas.push(df.schema()?.into_iter().map(|c| c.name).collect());
        }
        let payload = serde_json::json!({
            "v": FINGERPRINT_VERSION,
            "query": query,
            "schemas": schemas,
            "direct_sql": config.direct_sql,
            "enforce_privacy": config.enforce_privacy,
            "serializer": config.serializer.as_str(),
        });
        let data = serde_json::to_vec(&payload)?;
        Ok(format!("{:x}", md5::compute(data)))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        fs::read_to_string(self.cache_path.join(key)).ok()
    }

    pub fn set(&self, key: &str, code: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        fs::write(self.cache_path.join(key), code)?;
        self.prune()?;
        Ok(())
    }

    fn prune(&self) -> Result<()> {
        let mut entries: Vec<_> = fs::read_dir(&self.cache_path)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
        if entries.len() > self.length {
            let to_delete = entries.len() - self.length;
            for entry in entries.iter().take(to_delete) {
                let _ = fs::remove_file(entry.path());
            }
        }
        Ok(())
    }
}
