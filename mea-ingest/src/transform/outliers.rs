use std::collections::HashMap;

use meter_domain::domain::SampleSet;

/// Keeps samples with `0 < value < percentile(values) * multiplier`, with the
/// percentile computed per sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierPolicy {
    pub percentile: f64,
    pub multiplier: f64,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        Self {
            percentile: 0.95,
            multiplier: 2.5,
        }
    }
}

/// Percentile `q` (0..=1) with linear interpolation between the two closest
/// ranks. `None` for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Removes non-positive values and per-sensor outliers in place. Returns
/// the number of samples removed.
pub fn filter_outliers(samples: &mut SampleSet, policy: &OutlierPolicy) -> usize {
    let mut by_sensor: HashMap<&str, Vec<f64>> = HashMap::new();
    for s in samples.iter() {
        by_sensor.entry(s.sensor_id.as_str()).or_default().push(s.value);
    }

    let limits: HashMap<String, f64> = by_sensor
        .into_iter()
        .filter_map(|(id, values)| {
            percentile(&values, policy.percentile).map(|p| (id.to_string(), p * policy.multiplier))
        })
        .collect();

    let before = samples.len();
    samples.retain(|s| {
        let limit = limits.get(&s.sensor_id).copied().unwrap_or(f64::NEG_INFINITY);
        s.value > 0.0 && s.value < limit
    });
    before - samples.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_domain::domain::Sample;
    use time::macros::datetime;

    fn set(sensor: &str, values: &[f64]) -> SampleSet {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample {
                sensor_id: sensor.to_string(),
                ts: datetime!(2024-01-15 09:07:30 UTC) + time::Duration::minutes(15 * i as i64),
                value: *v,
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn values(set: &SampleSet) -> Vec<f64> {
        set.iter().map(|s| s.value).collect()
    }

    #[test]
    fn percentile_interpolates_linearly() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(2.5));
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 1.0), Some(4.0));
        assert_eq!(percentile(&[7.0], 0.95), Some(7.0));
        assert_eq!(percentile(&[], 0.95), None);

        let p = percentile(&[1.0, 1.0, 1.0, 1.0, 1.0, 100.0], 0.95).unwrap();
        assert!((p - 75.25).abs() < 1e-9);
    }

    #[test]
    fn spike_above_limit_is_removed() {
        let mut readings = vec![1.0; 40];
        readings.push(100.0);
        let mut samples = set("mea_1", &readings);

        // p95 is 1.0, so the limit is 2.5
        let removed = filter_outliers(&mut samples, &OutlierPolicy::default());

        assert_eq!(removed, 1);
        assert_eq!(values(&samples), vec![1.0; 40]);
    }

    #[test]
    fn short_series_keeps_spike_under_interpolated_limit() {
        // p95 interpolates to 75.25, so the limit is 188.125 and 100 survives.
        let mut samples = set("mea_1", &[1.0, 1.0, 1.0, 1.0, 1.0, 100.0]);
        let removed = filter_outliers(&mut samples, &OutlierPolicy::default());
        assert_eq!(removed, 0);
    }

    #[test]
    fn non_positive_values_are_always_removed() {
        let mut samples = set("mea_1", &[0.0, -1.0, 2.0, 3.0, 0.0]);
        filter_outliers(&mut samples, &OutlierPolicy::default());
        assert_eq!(values(&samples), vec![2.0, 3.0]);
    }

    #[test]
    fn limits_are_computed_per_sensor() {
        let mut samples = set("mea_small", &[1.0; 20]);
        samples.extend(set("mea_big", &[100.0; 20]).into_inner());

        filter_outliers(&mut samples, &OutlierPolicy::default());

        // 100.0 would be an outlier against mea_small, not against itself.
        assert_eq!(samples.len(), 40);
    }

    #[test]
    fn value_equal_to_limit_is_removed() {
        let mut samples = set("mea_1", &[2.0; 10]);
        let policy = OutlierPolicy {
            percentile: 0.95,
            multiplier: 1.0,
        };
        assert_eq!(filter_outliers(&mut samples, &policy), 10);
    }
}
