//! Fetch and normalize Colorado school data.
//!
//! The Colorado Department of Education publishes pupil membership and CMAS
//! assessment tables whose locations, file names, and column schemas drift
//! from year to year. This crate resolves a requested year to candidate
//! download locations (verified table first, live discovery as fallback),
//! validates payloads against disguised failures such as HTML error pages
//! served with a success status, maps era-specific column names onto one
//! canonical schema, and reshapes the result into a tidy long format with
//! clipped proportions. Results are cached on disk per (kind, year, shape).

pub mod app;
pub mod cache;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod registry;
pub mod sheet;
pub mod tidy;

pub use app::{App, AssessmentYears, FetchOptions, FetchWarning, MultiFetch, YearRange};
pub use config::Config;
pub use domain::{
    AggregationLevel, DatasetKind, DistrictCode, EndYear, SchoolCode, Subject,
};
pub use error::SchoolDataError;
pub use normalize::{MetricValue, NormalizedRow};
pub use tidy::{TidyRow, tidy_rows};
