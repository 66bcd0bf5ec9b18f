use std::{io::Cursor, path::Path};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use time::{macros::datetime, macros::format_description, Date, Duration, PrimitiveDateTime};

/// A single decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    DateTime(PrimitiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn from_text(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    /// CSV fields carry no type, so numbers and dates are sniffed.
    fn from_csv_field(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Cell::Number(v);
        }
        match parse_naive_datetime(trimmed) {
            Some(dt) => Cell::DateTime(dt),
            None => Cell::Text(trimmed.to_string()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::from_text(s),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => {
                let serial = dt.as_f64();
                excel_serial_to_datetime(serial).map_or(Cell::Number(serial), Cell::DateTime)
            }
            Data::DateTimeIso(s) => parse_naive_datetime(s).map_or_else(|| Cell::from_text(s), Cell::DateTime),
            Data::DurationIso(s) => Cell::from_text(s),
            // Error cells (#N/A, #DIV/0!, ...) read as missing.
            _ => Cell::Empty,
        }
    }
}

/// How an attachment's bytes are laid out, decided from its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    /// xlsx, xlsm, xlsb, xls or ods; the container is sniffed from the bytes.
    Workbook,
    Csv,
}

impl SheetFormat {
    pub fn from_filename(filename: &str) -> Self {
        let is_csv = Path::new(filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            SheetFormat::Csv
        } else {
            SheetFormat::Workbook
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unreadable workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("unreadable csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Decodes the first worksheet (or the CSV body) into data rows of cells.
///
/// Rows where every cell is empty are dropped. The first remaining row is
/// the column header and is not returned.
pub fn decode_rows(format: SheetFormat, bytes: &[u8]) -> Result<Vec<Vec<Cell>>, DecodeError> {
    let rows = match format {
        SheetFormat::Workbook => decode_workbook(bytes)?,
        SheetFormat::Csv => decode_csv(bytes)?,
    };

    Ok(rows
        .into_iter()
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .skip(1)
        .collect())
}

fn decode_workbook(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, DecodeError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(DecodeError::NoWorksheet)??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn decode_csv(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, DecodeError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(Cell::from_csv_field).collect());
    }
    Ok(rows)
}

/// Converts a 1900-system Excel serial date to a naive date/time.
pub fn excel_serial_to_datetime(serial: f64) -> Option<PrimitiveDateTime> {
    const EXCEL_EPOCH: PrimitiveDateTime = datetime!(1899-12-30 0:00);

    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    EXCEL_EPOCH.checked_add(Duration::milliseconds(millis))
}

/// Parses the timezone-naive date/time layouts seen in day-anchor cells.
pub fn parse_naive_datetime(s: &str) -> Option<PrimitiveDateTime> {
    let s = s.trim();
    let date_time = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let date_time_t = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let date_hm = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let iso_date = format_description!("[year]-[month]-[day]");
    let us_date = format_description!("[month padding:none]/[day padding:none]/[year]");

    PrimitiveDateTime::parse(s, date_time)
        .or_else(|_| PrimitiveDateTime::parse(s, date_time_t))
        .or_else(|_| PrimitiveDateTime::parse(s, date_hm))
        .ok()
        .or_else(|| Date::parse(s, iso_date).ok().map(Date::midnight))
        .or_else(|| Date::parse(s, us_date).ok().map(Date::midnight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_are_typed_and_blank_rows_dropped() {
        let body = b",,\nmeter,date,h1\n,,\n42,2024-01-15,1.5\n  ,  ,  \nA-7,1/16/2024,n/a\n";
        let rows = decode_rows(SheetFormat::Csv, body).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Cell::Number(42.0));
        assert_eq!(rows[0][1], Cell::DateTime(datetime!(2024-01-15 0:00)));
        assert_eq!(rows[0][2], Cell::Number(1.5));
        assert_eq!(rows[1][0], Cell::Text("A-7".to_string()));
        assert_eq!(rows[1][1], Cell::DateTime(datetime!(2024-01-16 0:00)));
        assert_eq!(rows[1][2], Cell::Text("n/a".to_string()));
    }

    #[test]
    fn header_only_sheet_has_no_data_rows() {
        let rows = decode_rows(SheetFormat::Csv, b"meter,date,h1\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn csv_rows_may_differ_in_length() {
        let body = b"a,b\n1,2\n1,2,3,4\n";
        let rows = decode_rows(SheetFormat::Csv, body).unwrap();
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1].len(), 4);
    }

    const USAGE_XLSX: &[u8] = include_bytes!("../../fixtures/interval_usage.xlsx");

    #[test]
    fn workbook_rows_come_from_the_first_sheet() {
        let rows = decode_rows(SheetFormat::Workbook, USAGE_XLSX).unwrap();

        // Header dropped; rows for meters 42 and 43 and the totals line remain.
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Cell::Number(42.0));
        assert_eq!(rows[0][1], Cell::DateTime(datetime!(2024-01-15 0:00)));
        assert_eq!(rows[0].len(), 98);
        assert!(rows[0][2..].iter().all(|c| *c == Cell::Number(2.0)));

        assert_eq!(rows[1][0], Cell::Number(43.0));
        assert_eq!(rows[1][97], Cell::Empty);

        assert_eq!(rows[2][0], Cell::Text("Total".to_string()));
        assert!(rows.iter().all(|r| r[0] != Cell::Number(99.0)));
    }

    #[test]
    fn workbook_values_map_to_cells() {
        assert_eq!(Cell::from(&Data::Int(42)), Cell::Number(42.0));
        assert_eq!(Cell::from(&Data::Float(1.5)), Cell::Number(1.5));
        assert_eq!(Cell::from(&Data::String("  ".to_string())), Cell::Empty);
        assert_eq!(Cell::from(&Data::Error(calamine::CellErrorType::NA)), Cell::Empty);
        assert_eq!(Cell::from(&Data::Empty), Cell::Empty);
        assert_eq!(
            Cell::from(&Data::DateTimeIso("2024-01-15T00:00:00".to_string())),
            Cell::DateTime(datetime!(2024-01-15 0:00))
        );
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        let res = decode_rows(SheetFormat::Workbook, b"definitely not a spreadsheet");
        assert!(matches!(res, Err(DecodeError::Workbook(_))));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(SheetFormat::from_filename("usage.CSV"), SheetFormat::Csv);
        assert_eq!(SheetFormat::from_filename("usage.xlsx"), SheetFormat::Workbook);
        assert_eq!(SheetFormat::from_filename("usage"), SheetFormat::Workbook);
    }

    #[test]
    fn excel_serials() {
        assert_eq!(excel_serial_to_datetime(45306.0), Some(datetime!(2024-01-15 0:00)));
        assert_eq!(excel_serial_to_datetime(45306.5), Some(datetime!(2024-01-15 12:00)));
        assert_eq!(excel_serial_to_datetime(f64::NAN), None);
    }

    #[test]
    fn naive_datetime_layouts() {
        let midnight = Some(datetime!(2024-01-15 0:00));
        assert_eq!(parse_naive_datetime("2024-01-15"), midnight);
        assert_eq!(parse_naive_datetime("2024-01-15 00:00:00"), midnight);
        assert_eq!(parse_naive_datetime("2024-01-15T00:00:00"), midnight);
        assert_eq!(parse_naive_datetime("1/15/2024"), midnight);
        assert_eq!(parse_naive_datetime("Meter Number"), None);
    }
}
