use serde::{Deserialize, Serialize};

use crate::domain::{
    AggregationLevel, DatasetKind, DistrictCode, EndYear, SchoolCode,
};
use crate::normalize::{NormalizedRow, field};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubgroupFamily {
    Total,
    Gender,
    RaceEthnicity,
    Proficiency,
}

#[derive(Debug, Clone, Copy)]
pub struct Subgroup {
    pub name: &'static str,
    pub field: &'static str,
    pub family: SubgroupFamily,
}

const fn subgroup(
    name: &'static str,
    field: &'static str,
    family: SubgroupFamily,
) -> Subgroup {
    Subgroup {
        name,
        field,
        family,
    }
}

/// Subgroups emitted per kind. Gender and race/ethnicity are independent
/// partitions of the same total; each relates only to the row total from
/// its own row, never across families.
pub fn subgroups(kind: DatasetKind) -> &'static [Subgroup] {
    const ENROLLMENT: &[Subgroup] = &[
        subgroup("total", field::TOTAL, SubgroupFamily::Total),
        subgroup("male", field::MALE, SubgroupFamily::Gender),
        subgroup("female", field::FEMALE, SubgroupFamily::Gender),
        subgroup("am_indian", field::AM_INDIAN, SubgroupFamily::RaceEthnicity),
        subgroup("asian", field::ASIAN, SubgroupFamily::RaceEthnicity),
        subgroup("black", field::BLACK, SubgroupFamily::RaceEthnicity),
        subgroup("hispanic", field::HISPANIC, SubgroupFamily::RaceEthnicity),
        subgroup("white", field::WHITE, SubgroupFamily::RaceEthnicity),
        subgroup(
            "pac_islander",
            field::PAC_ISLANDER,
            SubgroupFamily::RaceEthnicity,
        ),
        subgroup(
            "two_or_more",
            field::TWO_OR_MORE,
            SubgroupFamily::RaceEthnicity,
        ),
    ];
    const ASSESSMENT: &[Subgroup] = &[
        subgroup("total_tested", field::TOTAL_TESTED, SubgroupFamily::Total),
        subgroup(
            "did_not_meet",
            field::DID_NOT_MEET,
            SubgroupFamily::Proficiency,
        ),
        subgroup(
            "partially_met",
            field::PARTIALLY_MET,
            SubgroupFamily::Proficiency,
        ),
        subgroup("approached", field::APPROACHED, SubgroupFamily::Proficiency),
        subgroup("met", field::MET, SubgroupFamily::Proficiency),
        subgroup("exceeded", field::EXCEEDED, SubgroupFamily::Proficiency),
    ];
    match kind {
        DatasetKind::Enrollment => ENROLLMENT,
        DatasetKind::Assessment => ASSESSMENT,
    }
}

fn total_field(kind: DatasetKind) -> &'static str {
    match kind {
        DatasetKind::Enrollment => field::TOTAL,
        DatasetKind::Assessment => field::TOTAL_TESTED,
    }
}

/// One (entity, grade, subgroup) observation in long form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyRow {
    pub end_year: EndYear,
    pub district_code: Option<DistrictCode>,
    pub school_code: Option<SchoolCode>,
    pub district_name: Option<String>,
    pub school_name: Option<String>,
    pub grade: Option<String>,
    pub subject: Option<String>,
    pub level: AggregationLevel,
    pub family: SubgroupFamily,
    pub subgroup: String,
    pub count: Option<f64>,
    /// count / row total, in [0, 1] or absent; never negative, infinite,
    /// or NaN. Absent when the row total is not positive.
    pub pct: Option<f64>,
}

/// Reshape wide rows into one row per subgroup, with a clipped proportion
/// against the row's own total. Output ordering is deterministic.
pub fn tidy_rows(rows: &[NormalizedRow]) -> Vec<TidyRow> {
    let mut out = Vec::new();
    for row in rows {
        let total = row.metric(total_field(row.kind));
        for subgroup in subgroups(row.kind) {
            let count = row.metric(subgroup.field);
            out.push(TidyRow {
                end_year: row.end_year,
                district_code: row.district_code.clone(),
                school_code: row.school_code.clone(),
                district_name: row.district_name.clone(),
                school_name: row.school_name.clone(),
                grade: row.grade.clone(),
                subject: row.subject.clone(),
                level: row.level,
                family: subgroup.family,
                subgroup: subgroup.name.to_string(),
                count,
                pct: proportion(count, total),
            });
        }
    }
    sort_tidy(&mut out);
    out
}

fn proportion(count: Option<f64>, total: Option<f64>) -> Option<f64> {
    let count = count?;
    let total = total?;
    if total <= 0.0 {
        return None;
    }
    let pct = count / total;
    if !pct.is_finite() {
        return None;
    }
    // Minor upstream inconsistency (rounding, late corrections) can push a
    // subgroup past its published total.
    Some(pct.clamp(0.0, 1.0))
}

fn sort_tidy(rows: &mut [TidyRow]) {
    rows.sort_by(|a, b| {
        let key = |row: &TidyRow| {
            (
                row.end_year,
                row.district_code.clone(),
                row.school_code.clone(),
                row.grade.clone(),
                row.subject.clone(),
                row.subgroup.clone(),
            )
        };
        key(a).cmp(&key(b))
    });
}
