use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};

use crate::domain::{DatasetKind, EndYear};
use crate::error::SchoolDataError;
use crate::fetch::PayloadFormat;

/// One source file exactly as parsed: uncontrolled headers, string cells.
/// No schema is guaranteed at this layer; it exists only long enough to be
/// normalized.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub kind: DatasetKind,
    pub year: EndYear,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

pub fn parse_payload(
    bytes: &[u8],
    format: PayloadFormat,
    kind: DatasetKind,
    year: EndYear,
    url: &str,
) -> Result<RawTable, SchoolDataError> {
    let grid = match format {
        PayloadFormat::Xlsx | PayloadFormat::Xls => parse_workbook(bytes, url)?,
        PayloadFormat::Csv => parse_delimited(bytes, url)?,
        PayloadFormat::Html | PayloadFormat::Unknown => {
            return Err(SchoolDataError::InvalidFormat {
                url: url.to_string(),
                detail: "payload is not a parseable table".to_string(),
            });
        }
    };

    // Upstream workbooks carry one or more title rows above the header.
    let header_index = locate_header(&grid).ok_or_else(|| SchoolDataError::Parse {
        url: url.to_string(),
        detail: "no header row found".to_string(),
    })?;

    let headers = grid[header_index]
        .iter()
        .map(|cell| cell.clone().unwrap_or_default())
        .collect::<Vec<_>>();
    let rows = grid
        .into_iter()
        .skip(header_index + 1)
        .filter(|row| row.iter().any(|cell| cell.is_some()))
        .collect();

    Ok(RawTable {
        kind,
        year,
        headers,
        rows,
    })
}

fn parse_workbook(bytes: &[u8], url: &str) -> Result<Vec<Vec<Option<String>>>, SchoolDataError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|err| SchoolDataError::Parse {
        url: url.to_string(),
        detail: err.to_string(),
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SchoolDataError::Parse {
            url: url.to_string(),
            detail: "workbook has no sheets".to_string(),
        })?
        .map_err(|err| SchoolDataError::Parse {
            url: url.to_string(),
            detail: err.to_string(),
        })?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn parse_delimited(bytes: &[u8], url: &str) -> Result<Vec<Vec<Option<String>>>, SchoolDataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| SchoolDataError::Parse {
            url: url.to_string(),
            detail: err.to_string(),
        })?;
        grid.push(
            record
                .iter()
                .map(|field| {
                    let trimmed = field.trim();
                    (!trimmed.is_empty()).then(|| trimmed.to_string())
                })
                .collect(),
        );
    }
    Ok(grid)
}

fn cell_to_string(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(value) => value.trim().to_string(),
        // Identifier columns come back as floats; an integral float must not
        // keep a ".0" tail or zero-padding would operate on the wrong digits.
        Data::Float(value) => {
            if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                format!("{}", *value as i64)
            } else {
                value.to_string()
            }
        }
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::Error(err) => format!("{err:?}"),
        Data::DateTime(value) => value.as_f64().to_string(),
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
    };
    (!text.is_empty()).then_some(text)
}

const HEADER_HINTS: [&str; 6] = ["district", "school", "organization", "grade", "county", "content"];
const HEADER_SCAN_ROWS: usize = 12;

fn locate_header(grid: &[Vec<Option<String>>]) -> Option<usize> {
    for (index, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let hits = row
            .iter()
            .flatten()
            .filter(|cell| {
                let cell = cell.to_lowercase();
                HEADER_HINTS.iter().any(|hint| cell.contains(hint))
            })
            .count();
        if hits >= 2 {
            return Some(index);
        }
    }
    None
}
