use miette::Diagnostic;
use thiserror::Error;

use crate::domain::{DatasetKind, EndYear};

#[derive(Debug, Error, Diagnostic)]
pub enum SchoolDataError {
    #[error("source unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("unexpected payload from {url}: {detail}")]
    InvalidFormat { url: String, detail: String },

    #[error("payload from {url} is {bytes} bytes, below the {floor}-byte floor for a data file")]
    TooSmall {
        url: String,
        bytes: usize,
        floor: usize,
    },

    #[error("no usable source for {kind} {year}: {}", format_attempts(.attempts))]
    #[diagnostic(help(
        "if every attempt failed with a transport error the host may be down; \
         if verified locations failed with format errors the upstream site may have been reorganized"
    ))]
    SourceUnavailable {
        kind: DatasetKind,
        year: EndYear,
        attempts: Vec<String>,
    },

    #[error("end year {year} is outside the available range {min}-{max}")]
    YearOutOfRange { year: u16, min: u16, max: u16 },

    #[error("end year {year} has no published data: {reason}")]
    #[diagnostic(help("this year is a known gap in the source; retrying will not help"))]
    YearExcluded { year: u16, reason: String },

    #[error("failed to parse {url}: {detail}")]
    Parse { url: String, detail: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http client error: {0}")]
    Http(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("cache entry unreadable at {path}: {detail}")]
    Cache { path: String, detail: String },
}

fn format_attempts(attempts: &[String]) -> String {
    if attempts.is_empty() {
        "no candidates resolved".to_string()
    } else {
        attempts.join("; ")
    }
}
