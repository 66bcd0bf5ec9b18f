mod reading;
mod sample;

pub use reading::{RawReadingRow, SECONDS_PER_DAY, SUPPORTED_INTERVAL_COUNTS};
pub use sample::{Sample, SampleSet};
