use scraper::{Html, Selector};
use url::Url;

use crate::config::Config;
use crate::domain::{DatasetKind, EndYear, FileKind};
use crate::error::SchoolDataError;
use crate::fetch::SourceClient;

pub const ENROLLMENT_MIN_YEAR: u16 = 2010;
pub const ENROLLMENT_MAX_YEAR: u16 = 2025;

/// CMAS administrations with published district/school summaries. 2020 is a
/// known gap: the spring administration was cancelled statewide.
pub const ASSESSMENT_YEARS: [u16; 8] = [2016, 2017, 2018, 2019, 2021, 2022, 2023, 2024];
pub const ASSESSMENT_EXCLUDED_YEAR: u16 = 2020;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    Verified,
    Discovered,
}

#[derive(Debug, Clone)]
pub struct SourceCandidate {
    pub url: String,
    pub file_kind: Option<FileKind>,
    pub origin: CandidateOrigin,
    /// Advisory probe result. `None` when the candidate was not probed.
    /// Unreachability is sometimes transient, so a `Some(false)` candidate
    /// is deprioritized but still tried.
    pub reachable: Option<bool>,
}

/// Reject structurally invalid years before any network activity. A known
/// gap gets a distinct error from "outside the range" so callers can tell
/// "do not retry" apart from "not found".
pub fn validate_year(kind: DatasetKind, year: EndYear) -> Result<(), SchoolDataError> {
    match kind {
        DatasetKind::Enrollment => {
            if !(ENROLLMENT_MIN_YEAR..=ENROLLMENT_MAX_YEAR).contains(&year.value()) {
                return Err(SchoolDataError::YearOutOfRange {
                    year: year.value(),
                    min: ENROLLMENT_MIN_YEAR,
                    max: ENROLLMENT_MAX_YEAR,
                });
            }
        }
        DatasetKind::Assessment => {
            if year.value() == ASSESSMENT_EXCLUDED_YEAR {
                return Err(SchoolDataError::YearExcluded {
                    year: year.value(),
                    reason: "the spring 2020 statewide assessment was cancelled".to_string(),
                });
            }
            let min = ASSESSMENT_YEARS[0];
            let max = ASSESSMENT_YEARS[ASSESSMENT_YEARS.len() - 1];
            if !ASSESSMENT_YEARS.contains(&year.value()) {
                return Err(SchoolDataError::YearOutOfRange {
                    year: year.value(),
                    min,
                    max,
                });
            }
        }
    }
    Ok(())
}

/// Verified paths, verbatim as published. Upstream naming is inconsistent
/// across years (delimiters drift, and the 2018-19 membership file name
/// carries the vendor's own spelling mistake); entries are corrected only
/// when the upstream file is.
fn verified_paths(kind: DatasetKind, year: EndYear) -> &'static [&'static str] {
    match (kind, year.value()) {
        (DatasetKind::Enrollment, 2025) => {
            &["/cdereval/2024-25_membership_grade_race_gender_byschool.xlsx"]
        }
        (DatasetKind::Enrollment, 2024) => {
            &["/cdereval/2023-24_membership_grade_race_gender_byschool.xlsx"]
        }
        (DatasetKind::Enrollment, 2023) => {
            &["/cdereval/2022-23membershipgraderacegenderbyschool.xlsx"]
        }
        (DatasetKind::Enrollment, 2022) => {
            &["/cdereval/2021-22_membership_grade_race_gender_byschool.xlsx"]
        }
        (DatasetKind::Enrollment, 2021) => {
            &["/cdereval/2020-21_membership_grade_race_gender_byschool.xlsx"]
        }
        (DatasetKind::Enrollment, 2020) => {
            &["/cdereval/2019-20_membership_grade_race_gender_byschool.xlsx"]
        }
        (DatasetKind::Enrollment, 2019) => {
            // "memebership" is upstream's typo, kept verbatim.
            &["/cdereval/2018-19_memebership_grade_race_gender_byschool.xlsx"]
        }
        (DatasetKind::Enrollment, 2018) => {
            &["/cdereval/2017-18_membership_grade_race_gender_byschool.xls"]
        }
        (DatasetKind::Enrollment, 2017) => &["/cdereval/2016-17membershipgradebyschool.xls"],
        (DatasetKind::Enrollment, 2016) => &["/cdereval/2015-16membershipgradebyschool.xls"],
        (DatasetKind::Assessment, 2024) => {
            &["/assessment/2024_cmas_ela_math_district_school_summary.xlsx"]
        }
        (DatasetKind::Assessment, 2023) => {
            &["/assessment/2023_cmas_ela_math_district_school_summary.xlsx"]
        }
        (DatasetKind::Assessment, 2022) => {
            &["/assessment/2022_cmas_ela_math_district_school_summary.xlsx"]
        }
        (DatasetKind::Assessment, 2021) => {
            &["/assessment/2021_cmas_ela_math_district_school_summary.xlsx"]
        }
        (DatasetKind::Assessment, 2019) => {
            &["/assessment/2019_cmas_elamath_districtschoolsummary.xlsx"]
        }
        (DatasetKind::Assessment, 2018) => {
            &["/assessment/2018_cmas_elamath_districtschoolsummary.xlsx"]
        }
        (DatasetKind::Assessment, 2017) => {
            &["/assessment/2017_cmas_elamath_districtschoolsummary.xlsx"]
        }
        (DatasetKind::Assessment, 2016) => {
            &["/assessment/2016_cmas_elamath_districtschoolsummary.xlsx"]
        }
        _ => &[],
    }
}

/// Index pages scraped when no verified entry exists for a year. Older
/// membership releases only live on the prior-year archive page.
fn index_paths(kind: DatasetKind) -> &'static [&'static str] {
    match kind {
        DatasetKind::Enrollment => &["/cdereval/rvprioryearpmdata", "/cdereval/pupilcurrent"],
        DatasetKind::Assessment => &["/assessment/cmas-dataandresults"],
    }
}

/// Resolve a year and kind to an ordered candidate list. Verified entries
/// win over discovery; probing reorders but never removes candidates.
pub fn resolve(
    client: &dyn SourceClient,
    config: &Config,
    kind: DatasetKind,
    year: EndYear,
) -> Result<Vec<SourceCandidate>, SchoolDataError> {
    validate_year(kind, year)?;

    let paths = verified_paths(kind, year);
    let mut candidates = if paths.is_empty() {
        discover(client, config, kind, year)
    } else {
        expand_paths(config, paths)
    };

    for candidate in &mut candidates {
        candidate.reachable = Some(client.probe(&candidate.url));
    }
    // Probed-good candidates first so the fetch loop short-circuits fast;
    // order is otherwise preserved and nothing is dropped.
    candidates.sort_by_key(|candidate| match candidate.reachable {
        Some(true) => 0u8,
        _ => 1,
    });

    tracing::debug!(
        kind = %kind,
        year = %year,
        count = candidates.len(),
        "resolved source candidates"
    );
    Ok(candidates)
}

fn expand_paths(config: &Config, paths: &[&str]) -> Vec<SourceCandidate> {
    let mut candidates = Vec::new();
    for domain in &config.base_domains {
        for path in paths {
            let url = format!("{}{}", domain.trim_end_matches('/'), path);
            candidates.push(SourceCandidate {
                file_kind: FileKind::from_path(&url),
                url,
                origin: CandidateOrigin::Verified,
                reachable: None,
            });
        }
    }
    candidates
}

fn discover(
    client: &dyn SourceClient,
    config: &Config,
    kind: DatasetKind,
    year: EndYear,
) -> Vec<SourceCandidate> {
    let mut candidates = Vec::new();
    for domain in &config.base_domains {
        for path in index_paths(kind) {
            let index_url = format!("{}{}", domain.trim_end_matches('/'), path);
            let html = match client.get_text(&index_url) {
                Ok(html) => html,
                Err(err) => {
                    tracing::debug!(url = %index_url, error = %err, "index page unavailable");
                    continue;
                }
            };
            candidates.extend(extract_links(&html, &index_url, kind, year));
        }
        if !candidates.is_empty() {
            break;
        }
    }
    dedupe(candidates)
}

/// Filter an index page's hyperlinks down to data files for one year and
/// kind. A link counts when its text or URL carries the year token (either
/// textual format) and at least one kind keyword.
pub fn extract_links(
    html: &str,
    base_url: &str,
    kind: DatasetKind,
    year: EndYear,
) -> Vec<SourceCandidate> {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let selector = Selector::parse("a[href]").expect("static selector");
    let tokens = year.tokens();

    let mut candidates = Vec::new();
    for element in Html::parse_document(html).select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        let url = absolute.to_string();
        let file_kind = FileKind::from_path(&url);
        if file_kind.is_none() {
            continue;
        }

        let text = element.text().collect::<String>();
        let haystack = format!("{} {}", url, text).to_lowercase();
        let has_year = tokens.iter().any(|token| haystack.contains(&token.to_lowercase()));
        let has_keyword = kind
            .keywords()
            .iter()
            .any(|keyword| haystack.contains(keyword));
        if has_year && has_keyword {
            candidates.push(SourceCandidate {
                url,
                file_kind,
                origin: CandidateOrigin::Discovered,
                reachable: None,
            });
        }
    }
    candidates
}

fn dedupe(candidates: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .collect()
}
