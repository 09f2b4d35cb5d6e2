use coschooldata::domain::{DatasetKind, EndYear};
use coschooldata::fetch::PayloadFormat;
use coschooldata::normalize::{MetricValue, field, normalize_table};
use coschooldata::sheet::parse_payload;
use coschooldata::AggregationLevel;

fn normalize_csv(kind: DatasetKind, year: u16, body: &str) -> Vec<coschooldata::NormalizedRow> {
    let raw = parse_payload(
        body.as_bytes(),
        PayloadFormat::Csv,
        kind,
        EndYear(year),
        "https://example.test/table.csv",
    )
    .unwrap();
    normalize_table(&raw)
}

#[test]
fn middle_era_enrollment_file_normalizes() {
    let rows = normalize_csv(
        DatasetKind::Enrollment,
        2019,
        "2018-19 Pupil Membership,,,,,,,\n\
         District Code,District Name,School Code,School Name,Grade Level,Total,Male,Female\n\
         0000,STATE TOTALS,0000,STATE TOTALS,K,62000,31700,30300\n\
         0880,Durango 9-R,0000,DISTRICT TOTALS,K,310,160,150\n\
         0880,Durango 9-R,0001,Park Elementary,K,100,52,48\n",
    );
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0].level, AggregationLevel::State);
    assert_eq!(rows[1].level, AggregationLevel::District);
    assert_eq!(rows[2].level, AggregationLevel::School);

    let school = &rows[2];
    assert_eq!(school.district_code.as_ref().unwrap().as_str(), "0880");
    assert_eq!(school.school_code.as_ref().unwrap().as_str(), "0001");
    assert_eq!(school.entity_id().as_deref(), Some("08800001"));
    assert_eq!(school.metric(field::TOTAL), Some(100.0));
    assert_eq!(school.metric(field::MALE), Some(52.0));
}

#[test]
fn legacy_era_organization_labels_normalize() {
    let rows = normalize_csv(
        DatasetKind::Enrollment,
        2012,
        "ORG. CODE,ORGANIZATION NAME,SCHOOL CODE,SCHOOL NAME,GRADE,PK-12 TOTAL,TOTAL MALE,TOTAL FEMALE\n\
         880,DURANGO 9-R,1,PARK ELEMENTARY,KINDERGARTEN,95,50,45\n",
    );
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.district_code.as_ref().unwrap().as_str(), "0880");
    assert_eq!(row.district_name.as_deref(), Some("DURANGO 9-R"));
    assert_eq!(row.metric(field::TOTAL), Some(95.0));
    assert_eq!(row.metric(field::MALE), Some(50.0));
}

#[test]
fn suppression_markers_normalize_to_missing_not_zero() {
    let rows = normalize_csv(
        DatasetKind::Enrollment,
        2024,
        "District Code,District Name,School Code,School Name,Grade Level,Total,Male,Female\n\
         0880,Durango 9-R,0001,Park Elementary,1,*,--,<10\n\
         0880,Durango 9-R,0002,Animas High,2,N/A,\"1,204\",48\n",
    );

    let first = &rows[0];
    for metric in [field::TOTAL, field::MALE, field::FEMALE] {
        assert_eq!(first.metric(metric), None);
        assert!(matches!(
            first.metrics[metric],
            MetricValue::Suppressed { .. }
        ));
    }

    let second = &rows[1];
    assert_eq!(second.metric(field::TOTAL), None);
    assert_eq!(second.metric(field::MALE), Some(1204.0));
    assert_eq!(second.metric(field::FEMALE), Some(48.0));
}

#[test]
fn columns_missing_from_an_era_are_null_not_fatal() {
    let rows = normalize_csv(
        DatasetKind::Enrollment,
        2024,
        "District Code,School Code,Grade Level,Total\n\
         0880,0001,K,100\n",
    );
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.metric(field::TOTAL), Some(100.0));
    assert_eq!(row.metrics[field::MALE], MetricValue::Missing);
    assert_eq!(row.district_name, None);
}

#[test]
fn assessment_file_normalizes_with_subject_labels() {
    let rows = normalize_csv(
        DatasetKind::Assessment,
        2024,
        "District Code,District Name,School Code,School Name,Content,Grade,Valid Scores,\
         Did Not Yet Meet Expectations,Partially Met Expectations,Approached Expectations,\
         Met Expectations,Exceeded Expectations\n\
         0880,Durango 9-R,0001,Park Elementary,ELA,03,200,20,40,60,60,20\n\
         0880,Durango 9-R,0001,Park Elementary,Math,03,200,25,45,65,50,15\n",
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].subject.as_deref(), Some("ELA"));
    assert_eq!(rows[0].metric(field::TOTAL_TESTED), Some(200.0));
    assert_eq!(rows[0].metric(field::MET), Some(60.0));
    assert_eq!(rows[1].subject.as_deref(), Some("Math"));
    assert_eq!(rows[1].metric(field::DID_NOT_MEET), Some(25.0));
}
