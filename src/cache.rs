use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::config::Config;
use crate::domain::EndYear;
use crate::error::SchoolDataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheShape {
    Normalized,
    Tidy,
}

impl CacheShape {
    pub fn token(self) -> &'static str {
        match self {
            CacheShape::Normalized => "normalized",
            CacheShape::Tidy => "tidy",
        }
    }
}

/// Cache key: dataset kind token (subject included for assessments), end
/// year, output shape. File names derive from it deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub kind_token: String,
    pub year: EndYear,
    pub shape: CacheShape,
}

impl CacheKey {
    pub fn new(kind_token: impl Into<String>, year: EndYear, shape: CacheShape) -> Self {
        Self {
            kind_token: kind_token.into(),
            year,
            shape,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.json", self.kind_token, self.year, self.shape.token())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    written_at: DateTime<Utc>,
    kind: String,
    end_year: u16,
    shape: CacheShape,
    rows: Vec<T>,
}

pub enum CacheLookup<T> {
    Hit(Vec<T>),
    Miss,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatusEntry {
    pub file: String,
    pub written_at: DateTime<Utc>,
    pub age_days: i64,
    pub bytes: u64,
    pub expired: bool,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: Utf8PathBuf,
    max_age: Option<Duration>,
}

impl CacheStore {
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.cache_root.clone(),
            max_age: config.cache_max_age,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> Utf8PathBuf {
        self.root.join(key.file_name())
    }

    /// Read an entry. A stale or unreadable entry is reported as a miss
    /// variant, never an error; the pipeline just recomputes.
    pub fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
        let path = self.entry_path(key);
        if !path.as_std_path().exists() {
            return CacheLookup::Miss;
        }
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "cache entry unreadable");
                return CacheLookup::Miss;
            }
        };
        let envelope: CacheEnvelope<T> = match serde_json::from_str(&content) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "cache entry corrupt");
                return CacheLookup::Miss;
            }
        };
        if self.is_expired(envelope.written_at) {
            return CacheLookup::Expired;
        }
        CacheLookup::Hit(envelope.rows)
    }

    fn is_expired(&self, written_at: DateTime<Utc>) -> bool {
        let Some(max_age) = self.max_age else {
            return false;
        };
        let age = Utc::now().signed_duration_since(written_at);
        age.to_std().map(|age| age > max_age).unwrap_or(false)
    }

    /// Whole-file overwrite via temp file + rename; readers never observe a
    /// partial write.
    pub fn store<T: Serialize + Clone>(
        &self,
        key: &CacheKey,
        rows: &[T],
    ) -> Result<(), SchoolDataError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;

        let envelope = CacheEnvelope {
            written_at: Utc::now(),
            kind: key.kind_token.clone(),
            end_year: key.year.value(),
            shape: key.shape,
            rows: rows.to_vec(),
        };
        let content = serde_json::to_vec(&envelope)
            .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;

        let path = self.entry_path(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Remove entries, optionally restricted to one end year. Idempotent:
    /// clearing an empty or absent cache removes nothing and is not an
    /// error. Returns the number of files removed.
    pub fn clear(&self, year: Option<EndYear>) -> Result<usize, SchoolDataError> {
        let mut removed = 0;
        for (path, _) in self.entries()? {
            if let Some(year) = year {
                let matches_year = path
                    .file_name()
                    .map(|name| name.contains(&format!("_{}_", year.value())))
                    .unwrap_or(false);
                if !matches_year {
                    continue;
                }
            }
            fs::remove_file(path.as_std_path())
                .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;
            removed += 1;
        }
        tracing::debug!(removed, "cleared cache entries");
        Ok(removed)
    }

    pub fn status(&self) -> Result<Vec<CacheStatusEntry>, SchoolDataError> {
        let mut entries = Vec::new();
        for (path, metadata) in self.entries()? {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;
            let envelope: CacheEnvelope<serde_json::Value> = serde_json::from_str(&content)
                .map_err(|err| SchoolDataError::Cache {
                    path: path.to_string(),
                    detail: err.to_string(),
                })?;
            let age = Utc::now().signed_duration_since(envelope.written_at);
            entries.push(CacheStatusEntry {
                file: path
                    .file_name()
                    .unwrap_or_default()
                    .to_string(),
                written_at: envelope.written_at,
                age_days: age.num_days(),
                bytes: metadata.len(),
                expired: self.is_expired(envelope.written_at),
            });
        }
        entries.sort_by(|a, b| a.file.cmp(&b.file));
        Ok(entries)
    }

    fn entries(&self) -> Result<Vec<(Utf8PathBuf, fs::Metadata)>, SchoolDataError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let dir = fs::read_dir(self.root.as_std_path())
            .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;
        for entry in dir {
            let entry = entry.map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|_| SchoolDataError::Filesystem("non-utf8 cache path".to_string()))?;
            if path.extension() == Some("json") {
                let metadata = entry
                    .metadata()
                    .map_err(|err| SchoolDataError::Filesystem(err.to_string()))?;
                entries.push((path, metadata));
            }
        }
        Ok(entries)
    }
}
