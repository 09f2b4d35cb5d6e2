use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use coschooldata::app::{App, FetchOptions};
use coschooldata::config::Config;
use coschooldata::domain::{EndYear, Subject};
use coschooldata::error::SchoolDataError;
use coschooldata::fetch::SourceClient;
use coschooldata::AggregationLevel;

const ENROLLMENT_CSV: &str = "\
District Code,District Name,School Code,School Name,Grade Level,Total,Male,Female\n\
0880,Durango 9-R,0000,DISTRICT TOTALS,K,310,160,150\n\
0880,Durango 9-R,0001,Park Elementary,K,100,52,48\n";

const ASSESSMENT_CSV: &str = "\
District Code,School Code,Content,Grade,Valid Scores,Did Not Yet Meet Expectations,\
Partially Met Expectations,Approached Expectations,Met Expectations,Exceeded Expectations\n\
0880,0001,ELA,03,200,20,40,60,60,20\n\
0880,0001,Math,03,200,25,45,65,50,15\n";

const HTML_ERROR_PAGE: &str =
    "<html><head><title>Moved</title></head><body>This page has moved.</body></html>";

type Responder = Box<dyn Fn(&str) -> Result<Vec<u8>, SchoolDataError> + Send + Sync>;

struct ScriptedClient {
    responder: Responder,
    downloads: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(responder: Responder) -> Self {
        Self {
            responder,
            downloads: Mutex::new(Vec::new()),
        }
    }

    fn serving(payload: &'static str) -> Self {
        Self::new(Box::new(|_| Ok(payload.as_bytes().to_vec())))
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl SourceClient for ScriptedClient {
    fn probe(&self, _url: &str) -> bool {
        false
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SchoolDataError> {
        self.downloads.lock().unwrap().push(url.to_string());
        (self.responder)(url)
    }

    fn get_text(&self, url: &str) -> Result<String, SchoolDataError> {
        Err(SchoolDataError::Unreachable {
            url: url.to_string(),
            message: "offline".to_string(),
        })
    }
}

fn test_config(temp: &tempfile::TempDir) -> Config {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    let mut config = Config::with_cache_root(root);
    config.min_payload_bytes = 16;
    config
}

#[test]
fn end_to_end_enrollment_fetch() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(ENROLLMENT_CSV));

    let rows = app
        .fetch_enrollment(EndYear(2024), &FetchOptions::default())
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].level, AggregationLevel::District);
    assert_eq!(rows[1].level, AggregationLevel::School);
    assert_eq!(rows[1].entity_id().as_deref(), Some("08800001"));

    let tidy = app
        .fetch_enrollment_tidy(EndYear(2024), &FetchOptions::default())
        .unwrap();
    let male = tidy
        .iter()
        .find(|row| row.subgroup == "male" && row.level.is_school())
        .unwrap();
    assert_eq!(male.count, Some(52.0));
    assert_eq!(male.pct, Some(0.52));
}

#[test]
fn html_soft_failure_falls_through_to_next_candidate() {
    let temp = tempfile::tempdir().unwrap();
    let responder: Responder = Box::new(|url| {
        if url.contains("//www.") {
            Ok(HTML_ERROR_PAGE.as_bytes().to_vec())
        } else {
            Ok(ENROLLMENT_CSV.as_bytes().to_vec())
        }
    });
    let app = App::with_client(test_config(&temp), ScriptedClient::new(responder));

    let rows = app
        .fetch_enrollment(EndYear(2024), &FetchOptions::default())
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(app.client_ref().download_count(), 2);
}

#[test]
fn exhausted_candidates_report_every_attempt() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(HTML_ERROR_PAGE));

    let err = app
        .fetch_enrollment(EndYear(2024), &FetchOptions::default())
        .unwrap_err();
    match err {
        SchoolDataError::SourceUnavailable {
            kind,
            year,
            attempts,
        } => {
            assert_eq!(kind.token(), "enrollment");
            assert_eq!(year, EndYear(2024));
            assert_eq!(attempts.len(), 2);
            assert!(attempts.iter().all(|attempt| attempt.contains("HTML")));
        }
        other => panic!("expected SourceUnavailable, got {other:?}"),
    }
}

#[test]
fn multi_year_fetch_isolates_a_failed_year() {
    let temp = tempfile::tempdir().unwrap();
    let responder: Responder = Box::new(|url| {
        if url.contains("2022-23") {
            Err(SchoolDataError::Unreachable {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        } else {
            Ok(ENROLLMENT_CSV.as_bytes().to_vec())
        }
    });
    let app = App::with_client(test_config(&temp), ScriptedClient::new(responder));

    let result = app.fetch_enrollment_multi(
        &[EndYear(2024), EndYear(2023), EndYear(2022)],
        &FetchOptions::default(),
    );
    assert_eq!(result.rows.len(), 4);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].end_year, EndYear(2023));
}

#[test]
fn multi_year_fetch_warns_on_invalid_years_too() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(ENROLLMENT_CSV));

    let result = app.fetch_enrollment_multi(
        &[EndYear(2024), EndYear(1999)],
        &FetchOptions::default(),
    );
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].message.contains("outside the available range"));
}

#[test]
fn clearing_the_cache_re_invokes_the_network_path() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(ENROLLMENT_CSV));
    let options = FetchOptions::default();

    app.fetch_enrollment(EndYear(2024), &options).unwrap();
    let after_first = app.client_ref().download_count();

    app.fetch_enrollment(EndYear(2024), &options).unwrap();
    assert_eq!(app.client_ref().download_count(), after_first);

    let removed = app.clear_cache(Some(EndYear(2024))).unwrap();
    assert!(removed >= 1);

    app.fetch_enrollment(EndYear(2024), &options).unwrap();
    assert!(app.client_ref().download_count() > after_first);
}

#[test]
fn refresh_bypasses_a_fresh_cache_entry() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(ENROLLMENT_CSV));

    app.fetch_enrollment(EndYear(2024), &FetchOptions::default())
        .unwrap();
    let after_first = app.client_ref().download_count();

    let refresh = FetchOptions {
        use_cache: true,
        refresh: true,
    };
    app.fetch_enrollment(EndYear(2024), &refresh).unwrap();
    assert!(app.client_ref().download_count() > after_first);
}

#[test]
fn assessment_subject_filter() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(ASSESSMENT_CSV));

    let all = app
        .fetch_assessment(EndYear(2024), Subject::All, &FetchOptions::default())
        .unwrap();
    assert_eq!(all.len(), 2);

    let ela = app
        .fetch_assessment(EndYear(2024), Subject::Ela, &FetchOptions::default())
        .unwrap();
    assert_eq!(ela.len(), 1);
    assert_eq!(ela[0].subject.as_deref(), Some("ELA"));
}

#[test]
fn year_gap_errors_are_distinct_from_unavailability() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(ASSESSMENT_CSV));
    let options = FetchOptions::default();

    assert_matches!(
        app.fetch_assessment(EndYear(2020), Subject::All, &options),
        Err(SchoolDataError::YearExcluded { year: 2020, .. })
    );
    assert_matches!(
        app.fetch_assessment(EndYear(1999), Subject::All, &options),
        Err(SchoolDataError::YearOutOfRange { year: 1999, .. })
    );
    assert_eq!(app.client_ref().download_count(), 0);
}

#[test]
fn available_years_surface() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::with_client(test_config(&temp), ScriptedClient::serving(ENROLLMENT_CSV));

    let years = app.available_years();
    assert!(years.min_year <= years.max_year);
    assert!(years.description.contains("membership"));

    let assessment = app.available_assessment_years();
    assert!(!assessment.years.contains(&2020));
    assert!(assessment.note.contains("2020"));
    assert_eq!(assessment.assessment_system, "CMAS");
}
