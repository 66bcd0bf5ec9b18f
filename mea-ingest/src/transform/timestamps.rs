use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use time_tz::{OffsetResult, PrimitiveDateTimeExt, TimeZone, Tz};

use super::row::RowError;
use meter_domain::domain::SECONDS_PER_DAY;

/// Timestamps for every interval of the day starting at `day_anchor`
/// (local wall-clock time in `tz`), each at the midpoint of its interval.
///
/// A local time that falls in a daylight-saving overlap or gap has no single
/// absolute instant, so the row is rejected rather than guessed.
pub fn reconstruct_timestamps(
    day_anchor: PrimitiveDateTime,
    interval_secs: u32,
    tz: &Tz,
) -> Result<Vec<OffsetDateTime>, RowError> {
    let day_start = match day_anchor.assume_timezone(tz) {
        OffsetResult::Some(dt) => dt,
        OffsetResult::Ambiguous(_, _) | OffsetResult::None => {
            return Err(RowError::AmbiguousTimestamp {
                anchor: day_anchor,
                zone: tz.name().to_string(),
            })
        }
    };

    if interval_secs == 0 {
        return Ok(Vec::new());
    }

    let n = SECONDS_PER_DAY / interval_secs;
    let step = i64::from(interval_secs);
    let first = day_start + Duration::seconds(step / 2);

    Ok((0..i64::from(n))
        .map(|k| first + Duration::seconds(k * step))
        .collect())
}
