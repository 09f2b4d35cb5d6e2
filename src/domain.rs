use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchoolDataError;

pub const CODE_WIDTH: usize = 4;

/// School-year end year: 2025 means the 2024-25 school year.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EndYear(pub u16);

impl EndYear {
    pub fn value(self) -> u16 {
        self.0
    }

    /// Short token used in upstream file names, e.g. "2024-25".
    pub fn short_token(self) -> String {
        let start = self.0 - 1;
        format!("{start}-{:02}", self.0 % 100)
    }

    /// Long token used on some upstream pages, e.g. "2024-2025".
    pub fn long_token(self) -> String {
        format!("{}-{}", self.0 - 1, self.0)
    }

    pub fn tokens(self) -> [String; 2] {
        [self.short_token(), self.long_token()]
    }
}

impl fmt::Display for EndYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for EndYear {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl FromStr for EndYear {
    type Err = SchoolDataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u16>()
            .map(Self)
            .map_err(|_| SchoolDataError::InvalidInput(format!("invalid end year: {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Enrollment,
    Assessment,
}

impl DatasetKind {
    pub fn token(self) -> &'static str {
        match self {
            DatasetKind::Enrollment => "enrollment",
            DatasetKind::Assessment => "assessment",
        }
    }

    /// Keywords a discovered link must carry to count as this kind.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            DatasetKind::Enrollment => &["membership", "enrollment", "pupil"],
            DatasetKind::Assessment => &["cmas", "assessment"],
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    All,
    Ela,
    Math,
    Science,
}

impl Subject {
    pub fn token(self) -> &'static str {
        match self {
            Subject::All => "all",
            Subject::Ela => "ela",
            Subject::Math => "math",
            Subject::Science => "science",
        }
    }

    /// Case-insensitive match against the content label found in source rows.
    pub fn matches_label(self, label: &str) -> bool {
        let label = label.to_lowercase();
        match self {
            Subject::All => true,
            Subject::Ela => label.contains("ela") || label.contains("english"),
            Subject::Math => label.contains("math"),
            Subject::Science => label.contains("science"),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for Subject {
    type Err = SchoolDataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(Subject::All),
            "ela" | "english" => Ok(Subject::Ela),
            "math" => Ok(Subject::Math),
            "science" => Ok(Subject::Science),
            other => Err(SchoolDataError::InvalidInput(format!(
                "invalid subject: {other}"
            ))),
        }
    }
}

/// Fixed-width district identifier. Leading zeros are significant and the
/// all-zero value is a placeholder, not a real district.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistrictCode(String);

/// Fixed-width school identifier with the same padding rules as [`DistrictCode`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchoolCode(String);

fn normalize_code(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|ch| ch.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.len() >= CODE_WIDTH {
        Some(digits)
    } else {
        Some(format!("{digits:0>width$}", width = CODE_WIDTH))
    }
}

impl DistrictCode {
    pub fn normalize(raw: &str) -> Option<Self> {
        normalize_code(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.chars().all(|ch| ch == '0')
    }
}

impl SchoolCode {
    pub fn normalize(raw: &str) -> Option<Self> {
        normalize_code(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.chars().all(|ch| ch == '0')
    }
}

impl fmt::Display for DistrictCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SchoolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Combined entity id: district code followed by school code.
pub fn entity_id(district: &DistrictCode, school: &SchoolCode) -> String {
    format!("{}{}", district.as_str(), school.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationLevel {
    State,
    District,
    School,
}

impl AggregationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationLevel::State => "state",
            AggregationLevel::District => "district",
            AggregationLevel::School => "school",
        }
    }

    pub fn is_state(self) -> bool {
        matches!(self, AggregationLevel::State)
    }

    pub fn is_district(self) -> bool {
        matches!(self, AggregationLevel::District)
    }

    pub fn is_school(self) -> bool {
        matches!(self, AggregationLevel::School)
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Xlsx,
    Xls,
    Csv,
}

impl FileKind {
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();
        let stem = lower.split(['?', '#']).next().unwrap_or(&lower);
        if stem.ends_with(".xlsx") {
            Some(FileKind::Xlsx)
        } else if stem.ends_with(".xls") {
            Some(FileKind::Xls)
        } else if stem.ends_with(".csv") {
            Some(FileKind::Csv)
        } else {
            None
        }
    }
}
