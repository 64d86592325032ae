use super::*;

/// What a record without a value contributes to the average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingValuePolicy {
    /// Counted as a sample with value 0.
    #[default]
    Zero,
    /// Counted in the totals but left out of the average.
    Exclude,
}

impl std::str::FromStr for MissingValuePolicy {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(Self::Zero),
            "exclude" => Ok(Self::Exclude),
            other => Err(crate::error::ConfigError::UnknownValue {
                option: "missing_value",
                value: other.to_string(),
            }),
        }
    }
}

/// Running aggregate of one `(key, window)` cell.
///
/// `samples` is the denominator of the average; it differs from `count` only
/// when records without a value are excluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    pub count: i64,
    pub sum: f64,
    pub samples: i64,
    pub category_counts: BTreeMap<String, i64>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the aggregate.
    pub fn add(&mut self, category: &str, value: Option<f64>, policy: MissingValuePolicy) {
        self.count += 1;
        match (value, policy) {
            (Some(v), _) => {
                self.sum += v;
                self.samples += 1;
            }
            (None, MissingValuePolicy::Zero) => self.samples += 1,
            (None, MissingValuePolicy::Exclude) => {}
        }
        *self.category_counts.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Fold another partial aggregate of the same cell into this one.
    pub fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.sum += other.sum;
        self.samples += other.samples;
        for (category, n) in &other.category_counts {
            *self.category_counts.entry(category.clone()).or_insert(0) += n;
        }
    }

    /// `sum / samples`, or 0 when nothing contributed a value.
    pub fn average(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum / self.samples as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Combine two partial aggregates. Associative and commutative, with
/// [`Accumulator::default`] as identity.
pub fn merge_states(a: &Accumulator, b: &Accumulator) -> Accumulator {
    let mut merged = a.clone();
    merged.merge(b);
    merged
}

/// The finalized output of one closed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult<K = SchoolId> {
    pub key: K,
    pub window_start: EventTime,
    pub window_end: EventTime,
    pub count: i64,
    pub average: f64,
    pub category_breakdown: BTreeMap<String, i64>,
}

impl<K> AggregateResult<K> {
    /// Turn the final state of a closed window into its result.
    pub fn finalize(id: WindowId<K>, acc: Accumulator) -> Self {
        let average = acc.average();
        Self {
            key: id.key,
            window_start: id.window.start,
            window_end: id.window.end,
            count: acc.count,
            average,
            category_breakdown: acc.category_counts,
        }
    }
}
