use serde::Serialize;

use crate::cache::{CacheKey, CacheLookup, CacheShape, CacheStatusEntry, CacheStore};
use crate::config::Config;
use crate::domain::{DatasetKind, EndYear, Subject};
use crate::error::SchoolDataError;
use crate::fetch::{HttpSourceClient, SourceClient, download_table};
use crate::normalize::{NormalizedRow, normalize_table};
use crate::registry;
use crate::sheet::parse_payload;
use crate::tidy::{TidyRow, tidy_rows};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub use_cache: bool,
    /// Force the network path and overwrite any cache entry.
    pub refresh: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            refresh: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchWarning {
    pub end_year: EndYear,
    pub message: String,
}

/// Combined result of a multi-year fetch. A failed year contributes no rows
/// and exactly one warning; it never aborts the batch.
#[derive(Debug, Clone, Serialize)]
pub struct MultiFetch<T> {
    pub rows: Vec<T>,
    pub warnings: Vec<FetchWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearRange {
    pub min_year: u16,
    pub max_year: u16,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessmentYears {
    pub years: Vec<u16>,
    pub note: String,
    pub assessment_system: String,
}

pub struct App<C: SourceClient> {
    config: Config,
    client: C,
    cache: CacheStore,
}

impl App<HttpSourceClient> {
    pub fn new(config: Config) -> Result<Self, SchoolDataError> {
        let client = HttpSourceClient::new(&config)?;
        Ok(Self::with_client(config, client))
    }
}

impl<C: SourceClient> App<C> {
    pub fn with_client(config: Config, client: C) -> Self {
        let cache = CacheStore::new(&config);
        Self {
            config,
            client,
            cache,
        }
    }

    pub fn client_ref(&self) -> &C {
        &self.client
    }

    pub fn fetch_enrollment(
        &self,
        year: EndYear,
        options: &FetchOptions,
    ) -> Result<Vec<NormalizedRow>, SchoolDataError> {
        self.fetch_normalized(DatasetKind::Enrollment, Subject::All, year, options)
    }

    pub fn fetch_enrollment_tidy(
        &self,
        year: EndYear,
        options: &FetchOptions,
    ) -> Result<Vec<TidyRow>, SchoolDataError> {
        self.fetch_tidy(DatasetKind::Enrollment, Subject::All, year, options)
    }

    pub fn fetch_enrollment_multi(
        &self,
        years: &[EndYear],
        options: &FetchOptions,
    ) -> MultiFetch<NormalizedRow> {
        self.fetch_multi(DatasetKind::Enrollment, Subject::All, years, options)
    }

    pub fn fetch_assessment(
        &self,
        year: EndYear,
        subject: Subject,
        options: &FetchOptions,
    ) -> Result<Vec<NormalizedRow>, SchoolDataError> {
        self.fetch_normalized(DatasetKind::Assessment, subject, year, options)
    }

    pub fn fetch_assessment_tidy(
        &self,
        year: EndYear,
        subject: Subject,
        options: &FetchOptions,
    ) -> Result<Vec<TidyRow>, SchoolDataError> {
        self.fetch_tidy(DatasetKind::Assessment, subject, year, options)
    }

    pub fn fetch_assessment_multi(
        &self,
        years: &[EndYear],
        subject: Subject,
        options: &FetchOptions,
    ) -> MultiFetch<NormalizedRow> {
        self.fetch_multi(DatasetKind::Assessment, subject, years, options)
    }

    pub fn available_years(&self) -> YearRange {
        YearRange {
            min_year: registry::ENROLLMENT_MIN_YEAR,
            max_year: registry::ENROLLMENT_MAX_YEAR,
            description: format!(
                "Colorado pupil membership, school years ending {} through {}",
                registry::ENROLLMENT_MIN_YEAR,
                registry::ENROLLMENT_MAX_YEAR
            ),
        }
    }

    pub fn available_assessment_years(&self) -> AssessmentYears {
        AssessmentYears {
            years: registry::ASSESSMENT_YEARS.to_vec(),
            note: format!(
                "{} is excluded: the spring statewide assessment was cancelled",
                registry::ASSESSMENT_EXCLUDED_YEAR
            ),
            assessment_system: "CMAS".to_string(),
        }
    }

    pub fn cache_status(&self) -> Result<Vec<CacheStatusEntry>, SchoolDataError> {
        self.cache.status()
    }

    pub fn clear_cache(&self, year: Option<EndYear>) -> Result<usize, SchoolDataError> {
        self.cache.clear(year)
    }

    fn fetch_normalized(
        &self,
        kind: DatasetKind,
        subject: Subject,
        year: EndYear,
        options: &FetchOptions,
    ) -> Result<Vec<NormalizedRow>, SchoolDataError> {
        registry::validate_year(kind, year)?;

        let key = CacheKey::new(kind_token(kind, subject), year, CacheShape::Normalized);
        if options.use_cache && !options.refresh {
            if let CacheLookup::Hit(rows) = self.cache.lookup(&key) {
                tracing::debug!(key = %key.file_name(), "cache hit");
                return Ok(rows);
            }
        }

        let rows = self.run_pipeline(kind, subject, year)?;
        if options.use_cache {
            self.cache.store(&key, &rows)?;
        }
        Ok(rows)
    }

    fn fetch_tidy(
        &self,
        kind: DatasetKind,
        subject: Subject,
        year: EndYear,
        options: &FetchOptions,
    ) -> Result<Vec<TidyRow>, SchoolDataError> {
        registry::validate_year(kind, year)?;

        let key = CacheKey::new(kind_token(kind, subject), year, CacheShape::Tidy);
        if options.use_cache && !options.refresh {
            if let CacheLookup::Hit(rows) = self.cache.lookup(&key) {
                tracing::debug!(key = %key.file_name(), "cache hit");
                return Ok(rows);
            }
        }

        let rows = tidy_rows(&self.fetch_normalized(kind, subject, year, options)?);
        if options.use_cache {
            self.cache.store(&key, &rows)?;
        }
        Ok(rows)
    }

    fn fetch_multi(
        &self,
        kind: DatasetKind,
        subject: Subject,
        years: &[EndYear],
        options: &FetchOptions,
    ) -> MultiFetch<NormalizedRow> {
        let mut rows = Vec::new();
        let mut warnings = Vec::new();
        for &year in years {
            match self.fetch_normalized(kind, subject, year, options) {
                Ok(fetched) => rows.extend(fetched),
                Err(err) => {
                    tracing::warn!(kind = %kind, year = %year, error = %err, "skipping year");
                    warnings.push(FetchWarning {
                        end_year: year,
                        message: err.to_string(),
                    });
                }
            }
        }
        MultiFetch { rows, warnings }
    }

    /// One full pass: resolve candidates, try each until a payload survives
    /// validation and parsing, then normalize. Exhaustion reports every
    /// attempted location so operators can spot an upstream reorganization.
    fn run_pipeline(
        &self,
        kind: DatasetKind,
        subject: Subject,
        year: EndYear,
    ) -> Result<Vec<NormalizedRow>, SchoolDataError> {
        let candidates = registry::resolve(&self.client, &self.config, kind, year)?;

        let mut attempts = Vec::new();
        for candidate in &candidates {
            let start = std::time::Instant::now();
            let outcome = download_table(&self.client, candidate, &self.config).and_then(
                |(bytes, format)| parse_payload(&bytes, format, kind, year, &candidate.url),
            );
            match outcome {
                Ok(raw) => {
                    tracing::info!(
                        url = %candidate.url,
                        latency_ms = start.elapsed().as_millis() as u64,
                        rows = raw.rows.len(),
                        "downloaded source table"
                    );
                    let mut rows = normalize_table(&raw);
                    if kind == DatasetKind::Assessment && subject != Subject::All {
                        rows.retain(|row| {
                            row.subject
                                .as_deref()
                                .is_some_and(|label| subject.matches_label(label))
                        });
                    }
                    return Ok(rows);
                }
                Err(err) => {
                    tracing::debug!(url = %candidate.url, error = %err, "candidate failed");
                    attempts.push(format!("{} ({err})", candidate.url));
                }
            }
        }

        Err(SchoolDataError::SourceUnavailable {
            kind,
            year,
            attempts,
        })
    }
}

fn kind_token(kind: DatasetKind, subject: Subject) -> String {
    match kind {
        DatasetKind::Enrollment => kind.token().to_string(),
        DatasetKind::Assessment => format!("{}-{}", kind.token(), subject.token()),
    }
}
