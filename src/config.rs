use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;

use crate::error::SchoolDataError;

pub const DEFAULT_DOMAINS: [&str; 2] = ["https://www.cde.state.co.us", "https://cde.state.co.us"];

const DEFAULT_CACHE_MAX_AGE_DAYS: u64 = 30;

/// Pipeline settings. Everything that used to be ambient (cache location,
/// timeouts, host priority) is carried here so tests can substitute
/// isolated state.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_root: Utf8PathBuf,
    /// Base domains tried in order; the upstream authority has relocated
    /// hosting without updating all references, so every path is expanded
    /// against every domain.
    pub base_domains: Vec<String>,
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
    /// Entries older than this are treated as cache misses. `None` means
    /// entries never expire.
    pub cache_max_age: Option<Duration>,
    /// A genuine spreadsheet is never a few hundred bytes; smaller payloads
    /// fail with `TooSmall`.
    pub min_payload_bytes: usize,
}

impl Config {
    pub fn new() -> Result<Self, SchoolDataError> {
        Ok(Self::with_cache_root(default_cache_root()?))
    }

    pub fn with_cache_root(cache_root: Utf8PathBuf) -> Self {
        Self {
            cache_root,
            base_domains: DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
            probe_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(60),
            cache_max_age: Some(Duration::from_secs(DEFAULT_CACHE_MAX_AGE_DAYS * 24 * 60 * 60)),
            min_payload_bytes: 1024,
        }
    }

    pub fn never_expire(mut self) -> Self {
        self.cache_max_age = None;
        self
    }
}

pub fn default_cache_root() -> Result<Utf8PathBuf, SchoolDataError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("coschooldata")).ok()
        })
        .ok_or_else(|| SchoolDataError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::with_cache_root(Utf8PathBuf::from("/tmp/cache"));
        assert_eq!(config.base_domains.len(), 2);
        assert!(config.base_domains[0].contains("www."));
        assert!(config.cache_max_age.is_some());

        let config = config.never_expire();
        assert!(config.cache_max_age.is_none());
    }
}
