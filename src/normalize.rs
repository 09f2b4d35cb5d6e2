use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::classify;
use crate::domain::{
    AggregationLevel, DatasetKind, DistrictCode, EndYear, SchoolCode, entity_id,
};
use crate::sheet::RawTable;

/// Canonical column names. Raw labels drift year over year; everything
/// downstream speaks these.
pub mod field {
    pub const DISTRICT_CODE: &str = "district_code";
    pub const SCHOOL_CODE: &str = "school_code";
    pub const DISTRICT_NAME: &str = "district_name";
    pub const SCHOOL_NAME: &str = "school_name";
    pub const COUNTY: &str = "county";
    pub const GRADE: &str = "grade";
    pub const SUBJECT: &str = "subject";

    pub const TOTAL: &str = "total";
    pub const MALE: &str = "male";
    pub const FEMALE: &str = "female";
    pub const AM_INDIAN: &str = "am_indian";
    pub const ASIAN: &str = "asian";
    pub const BLACK: &str = "black";
    pub const HISPANIC: &str = "hispanic";
    pub const WHITE: &str = "white";
    pub const PAC_ISLANDER: &str = "pac_islander";
    pub const TWO_OR_MORE: &str = "two_or_more";

    pub const TOTAL_TESTED: &str = "total_tested";
    pub const DID_NOT_MEET: &str = "did_not_meet";
    pub const PARTIALLY_MET: &str = "partially_met";
    pub const APPROACHED: &str = "approached";
    pub const MET: &str = "met";
    pub const EXCEEDED: &str = "exceeded";
    pub const MEAN_SCALE_SCORE: &str = "mean_scale_score";
}

pub fn metric_fields(kind: DatasetKind) -> &'static [&'static str] {
    match kind {
        DatasetKind::Enrollment => &[
            field::TOTAL,
            field::MALE,
            field::FEMALE,
            field::AM_INDIAN,
            field::ASIAN,
            field::BLACK,
            field::HISPANIC,
            field::WHITE,
            field::PAC_ISLANDER,
            field::TWO_OR_MORE,
        ],
        DatasetKind::Assessment => &[
            field::TOTAL_TESTED,
            field::DID_NOT_MEET,
            field::PARTIALLY_MET,
            field::APPROACHED,
            field::MET,
            field::EXCEEDED,
            field::MEAN_SCALE_SCORE,
        ],
    }
}

/// A contiguous range of years sharing one column-naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatEra {
    EnrollmentLegacy,
    EnrollmentMiddle,
    EnrollmentCurrent,
    AssessmentLegacy,
    AssessmentCurrent,
}

impl FormatEra {
    pub fn for_year(kind: DatasetKind, year: EndYear) -> Self {
        match kind {
            DatasetKind::Enrollment => match year.value() {
                ..=2015 => FormatEra::EnrollmentLegacy,
                2016..=2021 => FormatEra::EnrollmentMiddle,
                _ => FormatEra::EnrollmentCurrent,
            },
            DatasetKind::Assessment => match year.value() {
                ..=2018 => FormatEra::AssessmentLegacy,
                _ => FormatEra::AssessmentCurrent,
            },
        }
    }

    fn rules(self) -> &'static [(&'static str, Regex)] {
        match self {
            FormatEra::EnrollmentLegacy => &ENROLLMENT_LEGACY_RULES,
            FormatEra::EnrollmentMiddle => &ENROLLMENT_MIDDLE_RULES,
            FormatEra::EnrollmentCurrent => &ENROLLMENT_CURRENT_RULES,
            FormatEra::AssessmentLegacy => &ASSESSMENT_LEGACY_RULES,
            FormatEra::AssessmentCurrent => &ASSESSMENT_CURRENT_RULES,
        }
    }
}

fn compile(rules: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    rules
        .iter()
        .map(|(field, pattern)| {
            let regex = Regex::new(&format!("(?i)^(?:{pattern})$")).expect("static field pattern");
            (*field, regex)
        })
        .collect()
}

// The legacy membership files label districts as organizations and shout in
// uppercase with stray punctuation.
static ENROLLMENT_LEGACY_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile(&[
        (field::DISTRICT_CODE, r"org(anization)?\.? ?(code|no\.?|number)"),
        (field::DISTRICT_CODE, r"district ?(code|no\.?|number)"),
        (field::DISTRICT_NAME, r"org(anization)?\.? ?name"),
        (field::DISTRICT_NAME, r"district ?name"),
        (field::SCHOOL_CODE, r"school ?(code|no\.?|number)"),
        (field::SCHOOL_NAME, r"school ?name"),
        (field::COUNTY, r"county( name)?"),
        (field::GRADE, r"grade( level)?"),
        (field::TOTAL, r"(pk-?12 )?total( (pk-?12|enrollment|membership))?"),
        (field::MALE, r"(total )?male"),
        (field::FEMALE, r"(total )?female"),
        (field::AM_INDIAN, r"(am\.?|amer\.?|american) ?indian.*"),
        (field::ASIAN, r"asian"),
        (field::BLACK, r"black.*"),
        (field::HISPANIC, r"hispanic.*"),
        (field::WHITE, r"white"),
        (field::PAC_ISLANDER, r"(native )?hawaiian.*|pacific islander"),
        (field::TWO_OR_MORE, r"two or more.*"),
    ])
});

static ENROLLMENT_MIDDLE_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile(&[
        (field::DISTRICT_CODE, r"district ?(code|no\.?|number)"),
        (field::DISTRICT_NAME, r"district ?name"),
        (field::SCHOOL_CODE, r"school ?(code|no\.?|number)"),
        (field::SCHOOL_NAME, r"school ?name"),
        (field::COUNTY, r"county( name)?"),
        (field::GRADE, r"grade( level)?"),
        (field::TOTAL, r"total( enrollment| membership)?"),
        (field::MALE, r"male"),
        (field::FEMALE, r"female"),
        (field::AM_INDIAN, r"american indian.*"),
        (field::ASIAN, r"asian"),
        (field::BLACK, r"black.*"),
        (field::HISPANIC, r"hispanic.*"),
        (field::WHITE, r"white"),
        (field::PAC_ISLANDER, r"(native )?hawaiian.*|pacific islander.*"),
        (field::TWO_OR_MORE, r"two or more.*"),
    ])
});

static ENROLLMENT_CURRENT_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile(&[
        (field::DISTRICT_CODE, r"district ?(code|no\.?|number|id)"),
        (field::DISTRICT_NAME, r"district ?name"),
        (field::SCHOOL_CODE, r"school ?(code|no\.?|number|id)"),
        (field::SCHOOL_NAME, r"school ?name"),
        (field::COUNTY, r"county( name)?"),
        (field::GRADE, r"grade( level)?"),
        (field::TOTAL, r"total( enrollment| membership| count)?"),
        (field::MALE, r"male( count)?"),
        (field::FEMALE, r"female( count)?"),
        (field::AM_INDIAN, r"american indian.*"),
        (field::ASIAN, r"asian( count)?"),
        (field::BLACK, r"black.*"),
        (field::HISPANIC, r"hispanic.*"),
        (field::WHITE, r"white( count)?"),
        (field::PAC_ISLANDER, r"(native )?hawaiian.*|pacific islander.*"),
        (field::TWO_OR_MORE, r"two or more.*"),
    ])
});

static ASSESSMENT_LEGACY_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile(&[
        (field::DISTRICT_CODE, r"district ?(code|no\.?|number)"),
        (field::DISTRICT_NAME, r"district ?name"),
        (field::SCHOOL_CODE, r"school ?(code|no\.?|number)"),
        (field::SCHOOL_NAME, r"school ?name"),
        (field::SUBJECT, r"content( area)?|subject"),
        (field::GRADE, r"(test ?/? ?)?grade( level)?"),
        (field::TOTAL_TESTED, r"(number of )?valid scores|number tested"),
        (
            field::DID_NOT_MEET,
            r"(number |# ?)?did not (yet )?meet( expectations)?( count)?",
        ),
        (
            field::PARTIALLY_MET,
            r"(number |# ?)?partially met( expectations)?( count)?",
        ),
        (
            field::APPROACHED,
            r"(number |# ?)?approached( expectations)?( count)?",
        ),
        (field::MET, r"(number |# ?)?met expectations( count)?"),
        (
            field::EXCEEDED,
            r"(number |# ?)?exceeded( expectations)?( count)?",
        ),
        (field::MEAN_SCALE_SCORE, r"mean scale score"),
    ])
});

static ASSESSMENT_CURRENT_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    compile(&[
        (field::DISTRICT_CODE, r"district ?(code|no\.?|number)"),
        (field::DISTRICT_NAME, r"district ?name"),
        (field::SCHOOL_CODE, r"school ?(code|no\.?|number)"),
        (field::SCHOOL_NAME, r"school ?name"),
        (field::SUBJECT, r"content( area)?|subject"),
        (field::GRADE, r"grade( level)?|test ?grade"),
        (
            field::TOTAL_TESTED,
            r"valid scores|total (records|tested)|number tested",
        ),
        (
            field::DID_NOT_MEET,
            r"(number |# ?)?did not yet meet( expectations)?( count)?",
        ),
        (
            field::PARTIALLY_MET,
            r"(number |# ?)?partially met( expectations)?( count)?",
        ),
        (
            field::APPROACHED,
            r"(number |# ?)?approached( expectations)?( count)?",
        ),
        (field::MET, r"(number |# ?)?met expectations( count)?"),
        (
            field::EXCEEDED,
            r"(number |# ?)?exceeded( expectations)?( count)?",
        ),
        (field::MEAN_SCALE_SCORE, r"mean scale score"),
    ])
});

/// Map raw headers to canonical fields: ordered rules, first match wins per
/// canonical field, each header claimed at most once. A field with no
/// matching header is simply absent; schemas omit columns unpredictably
/// across years and that must never fail normalization.
pub fn map_headers(headers: &[String], era: FormatEra) -> Vec<(usize, &'static str)> {
    let cleaned: Vec<String> = headers.iter().map(|header| clean_header(header)).collect();
    let mut claimed = vec![false; headers.len()];
    let mut bound: Vec<&'static str> = Vec::new();
    let mut mapping = Vec::new();

    for (field, regex) in era.rules() {
        if bound.contains(field) {
            continue;
        }
        let hit = cleaned
            .iter()
            .enumerate()
            .find(|(index, header)| !claimed[*index] && regex.is_match(header));
        if let Some((index, _)) = hit {
            claimed[index] = true;
            bound.push(*field);
            mapping.push((index, *field));
        }
    }
    mapping
}

fn clean_header(header: &str) -> String {
    header
        .replace(['_', '\n'], " ")
        .trim()
        .trim_end_matches(':')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A numeric cell after coercion. Suppression markers and unparseable text
/// become non-values that keep the original token for auditing; they are
/// never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Count(f64),
    Suppressed { raw: String },
    Missing,
}

impl MetricValue {
    pub fn as_count(&self) -> Option<f64> {
        match self {
            MetricValue::Count(value) => Some(*value),
            _ => None,
        }
    }
}

const SUPPRESSION_TOKENS: [&str; 6] = ["*", "**", "-", "--", "n/a", "na"];

static BELOW_FLOOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<\s*\d+$").expect("static pattern"));

pub fn coerce_count(raw: Option<&str>) -> MetricValue {
    let Some(raw) = raw else {
        return MetricValue::Missing;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return MetricValue::Missing;
    }

    let lowered = trimmed.to_lowercase();
    if SUPPRESSION_TOKENS.contains(&lowered.as_str()) || BELOW_FLOOR.is_match(&lowered) {
        return MetricValue::Suppressed {
            raw: trimmed.to_string(),
        };
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|ch| !matches!(ch, ',' | '%') && !ch.is_whitespace())
        .collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => MetricValue::Count(value),
        _ => MetricValue::Suppressed {
            raw: trimmed.to_string(),
        },
    }
}

/// A row in the canonical schema. Identifiers are fixed-width zero-padded
/// strings; metrics are nullable counts keyed by canonical field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub end_year: EndYear,
    pub kind: DatasetKind,
    pub district_code: Option<DistrictCode>,
    pub school_code: Option<SchoolCode>,
    pub district_name: Option<String>,
    pub school_name: Option<String>,
    pub county: Option<String>,
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub level: AggregationLevel,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl NormalizedRow {
    pub fn metric(&self, field: &str) -> Option<f64> {
        self.metrics.get(field).and_then(MetricValue::as_count)
    }

    pub fn entity_id(&self) -> Option<String> {
        match (&self.district_code, &self.school_code) {
            (Some(district), Some(school)) => Some(entity_id(district, school)),
            _ => None,
        }
    }
}

pub fn normalize_table(raw: &RawTable) -> Vec<NormalizedRow> {
    let era = FormatEra::for_year(raw.kind, raw.year);
    let mapping = map_headers(&raw.headers, era);
    let column = |field: &str| -> Option<usize> {
        mapping
            .iter()
            .find(|(_, bound)| *bound == field)
            .map(|(index, _)| *index)
    };

    let label = |row: &[Option<String>], field: &str| -> Option<String> {
        column(field)
            .and_then(|index| row.get(index).cloned().flatten())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let mut rows = Vec::with_capacity(raw.rows.len());
    for row in &raw.rows {
        let district_code = label(row, field::DISTRICT_CODE)
            .as_deref()
            .and_then(DistrictCode::normalize);
        let school_code = label(row, field::SCHOOL_CODE)
            .as_deref()
            .and_then(SchoolCode::normalize);
        let classification = classify(district_code.as_ref(), school_code.as_ref());

        let mut metrics = BTreeMap::new();
        for metric in metric_fields(raw.kind) {
            let value = match column(metric) {
                Some(index) => coerce_count(row.get(index).and_then(|cell| cell.as_deref())),
                None => MetricValue::Missing,
            };
            metrics.insert((*metric).to_string(), value);
        }

        rows.push(NormalizedRow {
            end_year: raw.year,
            kind: raw.kind,
            district_code,
            school_code,
            district_name: label(row, field::DISTRICT_NAME),
            school_name: label(row, field::SCHOOL_NAME),
            county: label(row, field::COUNTY),
            grade: label(row, field::GRADE),
            subject: label(row, field::SUBJECT),
            level: classification.level,
            metrics,
        });
    }

    tracing::debug!(
        kind = %raw.kind,
        year = %raw.year,
        rows = rows.len(),
        mapped = mapping.len(),
        "normalized raw table"
    );
    rows
}
