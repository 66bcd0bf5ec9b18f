use time::OffsetDateTime;

/// One reconstructed reading, in average-power units at the midpoint of its
/// interval.
///
/// With the `serde` feature the field names serialize as the `id,ts,val`
/// columns of the CSV output, with `ts` as integer epoch seconds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sample {
    #[cfg_attr(feature = "serde", serde(rename = "id"))]
    pub sensor_id: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::timestamp"))]
    pub ts: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(rename = "val"))]
    pub value: f64,
}

/// All samples extracted from one attachment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Sample) -> bool,
    {
        self.samples.retain(keep);
    }

    pub fn into_inner(self) -> Vec<Sample> {
        self.samples
    }
}

impl From<Vec<Sample>> for SampleSet {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl Extend<Sample> for SampleSet {
    fn extend<I: IntoIterator<Item = Sample>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
