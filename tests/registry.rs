use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use coschooldata::config::Config;
use coschooldata::domain::{DatasetKind, EndYear};
use coschooldata::error::SchoolDataError;
use coschooldata::fetch::SourceClient;
use coschooldata::registry::{
    ASSESSMENT_YEARS, CandidateOrigin, ENROLLMENT_MAX_YEAR, ENROLLMENT_MIN_YEAR, resolve,
};

/// Serves a canned prior-year archive page; probes never succeed, which
/// must not remove any candidate.
struct ArchiveClient {
    archive_html: String,
    probe_ok: fn(&str) -> bool,
}

impl ArchiveClient {
    fn new() -> Self {
        let mut html = String::from("<html><body><ul>");
        for year in 2010..=2015u16 {
            html.push_str(&format!(
                r#"<li><a href="/cdereval/{short}membershipgradebyschool.xls">{long} Membership Grade by School</a></li>"#,
                short = EndYear(year).short_token(),
                long = EndYear(year).long_token(),
            ));
        }
        html.push_str("</ul></body></html>");
        Self {
            archive_html: html,
            probe_ok: |_| false,
        }
    }
}

impl SourceClient for ArchiveClient {
    fn probe(&self, url: &str) -> bool {
        (self.probe_ok)(url)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SchoolDataError> {
        Err(SchoolDataError::Unreachable {
            url: url.to_string(),
            message: "offline".to_string(),
        })
    }

    fn get_text(&self, _url: &str) -> Result<String, SchoolDataError> {
        Ok(self.archive_html.clone())
    }
}

fn config() -> Config {
    Config::with_cache_root(Utf8PathBuf::from("/tmp/unused"))
}

#[test]
fn every_enrollment_year_resolves_to_candidates() {
    let client = ArchiveClient::new();
    let config = config();
    for year in ENROLLMENT_MIN_YEAR..=ENROLLMENT_MAX_YEAR {
        let candidates =
            resolve(&client, &config, DatasetKind::Enrollment, EndYear(year)).unwrap();
        assert!(!candidates.is_empty(), "no candidates for {year}");
    }
}

#[test]
fn every_assessment_year_resolves_to_candidates() {
    let client = ArchiveClient::new();
    let config = config();
    for year in ASSESSMENT_YEARS {
        let candidates =
            resolve(&client, &config, DatasetKind::Assessment, EndYear(year)).unwrap();
        assert!(!candidates.is_empty(), "no candidates for {year}");
    }
}

#[test]
fn verified_years_expand_across_both_domains() {
    let client = ArchiveClient::new();
    let candidates = resolve(&client, &config(), DatasetKind::Enrollment, EndYear(2024)).unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|c| c.origin == CandidateOrigin::Verified));
    assert!(candidates.iter().any(|c| c.url.contains("//www.cde.state.co.us/")));
    assert!(candidates.iter().any(|c| c.url.contains("//cde.state.co.us/")));
}

#[test]
fn archive_years_come_from_discovery() {
    let client = ArchiveClient::new();
    let candidates = resolve(&client, &config(), DatasetKind::Enrollment, EndYear(2013)).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].origin, CandidateOrigin::Discovered);
    assert!(candidates[0].url.ends_with("2012-13membershipgradebyschool.xls"));
}

#[test]
fn failed_probes_reorder_but_never_drop_candidates() {
    let mut client = ArchiveClient::new();
    client.probe_ok = |url| !url.contains("//www.");
    let candidates = resolve(&client, &config(), DatasetKind::Enrollment, EndYear(2024)).unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].reachable, Some(true));
    assert!(!candidates[0].url.contains("//www."));
    assert_eq!(candidates[1].reachable, Some(false));
}

#[test]
fn invalid_years_are_rejected_without_candidates() {
    let client = ArchiveClient::new();
    let config = config();
    assert_matches!(
        resolve(&client, &config, DatasetKind::Enrollment, EndYear(2005)),
        Err(SchoolDataError::YearOutOfRange { year: 2005, .. })
    );
    assert_matches!(
        resolve(&client, &config, DatasetKind::Assessment, EndYear(2020)),
        Err(SchoolDataError::YearExcluded { .. })
    );
}
