use crate::domain::{AggregationLevel, DistrictCode, SchoolCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_state: bool,
    pub is_district: bool,
    pub is_school: bool,
    pub level: AggregationLevel,
}

/// Derive the aggregation level from identifier presence. An all-zero code
/// is a placeholder and counts as missing; a naive presence check would tag
/// every district total as a school.
pub fn classify(
    district: Option<&DistrictCode>,
    school: Option<&SchoolCode>,
) -> Classification {
    let has_district = district.is_some_and(|code| !code.is_placeholder());
    let has_school = school.is_some_and(|code| !code.is_placeholder());

    let level = match (has_district, has_school) {
        (true, true) => AggregationLevel::School,
        (true, false) => AggregationLevel::District,
        (false, _) => AggregationLevel::State,
    };

    Classification {
        is_state: level.is_state(),
        is_district: level.is_district(),
        is_school: level.is_school(),
        level,
    }
}
