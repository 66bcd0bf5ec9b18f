use meter_domain::domain::{RawReadingRow, SECONDS_PER_DAY, SUPPORTED_INTERVAL_COUNTS};
use time::PrimitiveDateTime;

use super::spreadsheet::{parse_naive_datetime, Cell};

/// Why a spreadsheet row produced no samples.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("unsupported interval count {0}")]
    UnsupportedIntervalCount(usize),
    #[error("day anchor is not a date: {0}")]
    InvalidDayAnchor(String),
    #[error("reading {index} is not a finite number: {value}")]
    InvalidReading { index: usize, value: String },
    #[error("local time {anchor} is ambiguous or skipped in {zone}")]
    AmbiguousTimestamp { anchor: PrimitiveDateTime, zone: String },
}

impl RowError {
    /// A row without a supported number of readings is expected noise
    /// (titles, totals) and is dropped without being reported.
    pub fn is_malformed(&self) -> bool {
        matches!(self, RowError::UnsupportedIntervalCount(_))
    }
}

impl Cell {
    fn sensor_key(&self) -> String {
        match self {
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::DateTime(dt) => dt.to_string(),
            Cell::Empty => String::new(),
        }
    }

    fn day_anchor(&self) -> Option<PrimitiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(s) => parse_naive_datetime(s),
            _ => None,
        }
    }

    fn reading(&self) -> Option<f64> {
        let v = match self {
            Cell::Number(v) => *v,
            Cell::Text(s) => s.parse::<f64>().ok()?,
            _ => return None,
        };
        v.is_finite().then_some(v)
    }

    fn describe(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::DateTime(dt) => dt.to_string(),
        }
    }
}

/// Interprets one row as a sensor's full-day reading.
///
/// Empty cells are dropped first. Of what remains, the first cell is the
/// sensor key, the second the day anchor and the rest are interval readings,
/// whose count must be a supported interval count. Readings are converted to
/// average power as `value * n / 24`.
pub fn parse_row(cells: &[Cell]) -> Result<RawReadingRow, RowError> {
    let present: Vec<&Cell> = cells.iter().filter(|c| !c.is_empty()).collect();

    let n = present.len().saturating_sub(2);
    if !SUPPORTED_INTERVAL_COUNTS.contains(&n) {
        return Err(RowError::UnsupportedIntervalCount(n));
    }

    let sensor_key = present[0].sensor_key();
    let day_anchor = present[1]
        .day_anchor()
        .ok_or_else(|| RowError::InvalidDayAnchor(present[1].describe()))?;

    let n_f = n as f64;
    let values = present[2..]
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            cell.reading()
                .map(|v| v * n_f / 24.0)
                .ok_or_else(|| RowError::InvalidReading {
                    index,
                    value: cell.describe(),
                })
        })
        .collect::<Result<Vec<f64>, RowError>>()?;

    Ok(RawReadingRow {
        sensor_key,
        day_anchor,
        interval_secs: SECONDS_PER_DAY / n as u32,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row(key: Cell, anchor: Cell, readings: usize, value: f64) -> Vec<Cell> {
        let mut cells = vec![key, anchor];
        cells.extend(std::iter::repeat(Cell::Number(value)).take(readings));
        cells
    }

    fn anchor() -> Cell {
        Cell::DateTime(datetime!(2024-01-15 0:00))
    }

    #[test]
    fn supported_interval_counts_parse() {
        for n in [24, 96] {
            let parsed = parse_row(&row(Cell::Number(42.0), anchor(), n, 1.0)).unwrap();
            assert_eq!(parsed.interval_count(), n);
            assert_eq!(parsed.interval_secs, 86_400 / n as u32);
            assert_eq!(parsed.sensor_key, "42");
            assert_eq!(parsed.day_anchor, datetime!(2024-01-15 0:00));
        }
    }

    #[test]
    fn other_interval_counts_are_rejected() {
        for n in [0, 23, 95, 97] {
            let res = parse_row(&row(Cell::Number(42.0), anchor(), n, 1.0));
            assert_eq!(res, Err(RowError::UnsupportedIntervalCount(n)));
            assert!(res.unwrap_err().is_malformed());
        }
        assert_eq!(parse_row(&[]), Err(RowError::UnsupportedIntervalCount(0)));
    }

    #[test]
    fn readings_convert_to_average_power() {
        let quarter_hourly = parse_row(&row(Cell::Number(7.0), anchor(), 96, 4.0)).unwrap();
        assert!(quarter_hourly.values.iter().all(|v| *v == 16.0));

        let hourly = parse_row(&row(Cell::Number(7.0), anchor(), 24, 4.0)).unwrap();
        assert!(hourly.values.iter().all(|v| *v == 4.0));
    }

    #[test]
    fn empty_cells_are_dropped_before_counting() {
        let mut cells = vec![Cell::Empty, Cell::Text("A-17".to_string()), Cell::Empty, anchor()];
        for i in 0..24 {
            cells.push(Cell::Number(i as f64));
            cells.push(Cell::Empty);
        }

        let parsed = parse_row(&cells).unwrap();
        assert_eq!(parsed.sensor_key, "A-17");
        assert_eq!(parsed.interval_count(), 24);
        assert_eq!(parsed.values[23], 23.0);
    }

    #[test]
    fn text_anchor_is_not_malformed() {
        let mut cells = vec![Cell::Text("Meter".to_string()), Cell::Text("Date".to_string())];
        cells.extend((0..96).map(|i| Cell::Text(format!("{i}:00"))));

        let err = parse_row(&cells).unwrap_err();
        assert_eq!(err, RowError::InvalidDayAnchor("Date".to_string()));
        assert!(!err.is_malformed());
    }

    #[test]
    fn non_numeric_reading_is_not_malformed() {
        let mut cells = row(Cell::Number(1.0), anchor(), 95, 1.0);
        cells.push(Cell::Text("n/a".to_string()));

        let err = parse_row(&cells).unwrap_err();
        assert!(matches!(err, RowError::InvalidReading { index: 95, .. }));
        assert!(!err.is_malformed());
    }

    #[test]
    fn textual_anchor_and_readings_are_accepted() {
        let mut cells = vec![Cell::Text("9001".to_string()), Cell::Text("2024-01-15".to_string())];
        cells.extend((0..24).map(|_| Cell::Text("2.5".to_string())));

        let parsed = parse_row(&cells).unwrap();
        assert_eq!(parsed.day_anchor, datetime!(2024-01-15 0:00));
        assert_eq!(parsed.values, vec![2.5; 24]);
    }
}
