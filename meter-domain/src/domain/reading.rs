use time::PrimitiveDateTime;

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Interval counts a full-day row may carry: hourly (24) and 15-minute (96).
pub const SUPPORTED_INTERVAL_COUNTS: [usize; 2] = [24, 96];

/// One spreadsheet row for one sensor on one calendar day.
///
/// `values` are already converted to average power, so their length is the
/// interval count of the row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReadingRow {
    pub sensor_key: String,
    pub day_anchor: PrimitiveDateTime,
    pub interval_secs: u32,
    pub values: Vec<f64>,
}

impl RawReadingRow {
    pub fn interval_count(&self) -> usize {
        self.values.len()
    }
}
