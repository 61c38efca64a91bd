use serde::Serialize;

/// A named series of columns carrying exactly one row of values.
///
/// Columns and values are paired by position when the sample is encoded, so
/// their order is part of the contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    name: String,
    columns: Vec<&'static str>,
    points: [Vec<f64>; 1],
}

impl MetricSample {
    /// Build a sample named `<hostname>.<family>`.
    ///
    /// # Panics
    ///
    /// Panics if `columns` and `values` differ in length.
    pub fn new(
        hostname: &str,
        family: &str,
        columns: Vec<&'static str>,
        values: Vec<f64>,
    ) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "sample {hostname}.{family}: column/value count mismatch",
        );

        Self {
            name: format!("{hostname}.{family}"),
            columns,
            points: [values],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// The single row of values.
    pub fn values(&self) -> &[f64] {
        &self.points[0]
    }

    /// Iterate `(column, value)` pairs in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.columns.iter().copied().zip(self.values().iter().copied())
    }
}

/// Ordered samples produced by one tick.
pub type Batch = Vec<MetricSample>;

/// Truncate a ratio to an integer percentage, as the CPU, memory and
/// filesystem families report it. A zero denominator yields 0.
pub fn truncated_percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    ((part as f64 / total as f64) * 100.0).trunc()
}

/// Round half-up to two decimal places, as load averages are reported.
pub fn round_load(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}
