use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, SimResult};

/// Histogram configuration for a [`Tally`].
///
/// Observations are clamped into `[min, max]` (each bound optional) and then
/// binned by `floor(value / bin_size)`. The bin map is sparse; [`Tally::histogram`]
/// densifies it on read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramSpec {
    pub bin_size: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl HistogramSpec {
    pub fn new(bin_size: f64) -> Self {
        Self {
            bin_size,
            min: None,
            max: None,
        }
    }

    pub fn with_bounds(self, min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..self
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(lo) = self.min {
            v = v.max(lo);
        }
        if let Some(hi) = self.max {
            v = v.min(hi);
        }
        v
    }

    fn bin_of(&self, value: f64) -> i64 {
        (self.clamp(value) / self.bin_size).floor() as i64
    }
}

/// One dense histogram bin covering `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub low: f64,
    pub high: f64,
    pub weight: f64,
}

/// Collects weighted observations and exposes count, min, max, mean,
/// variance, standard deviation and an optional binned histogram.
///
/// # Semantics
///
/// - `count` and `sum` accumulate by weight; `min`/`max` track raw values and
///   ignore the weight entirely.
/// - `variance` is the population formula, clamped at zero to absorb float
///   cancellation.
///
/// Queues use pairs of tallies to separate *gross* (whole-run) from *net*
/// (busy-period) statistics; the tally itself is agnostic to that split.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tally {
    count: f64,
    sum: f64,
    sum_sq: f64,
    min: Option<f64>,
    max: Option<f64>,
    spec: Option<HistogramSpec>,
    bins: BTreeMap<i64, f64>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tally that additionally accumulates a histogram per `spec`.
    pub fn with_histogram(spec: HistogramSpec) -> Self {
        Self {
            spec: Some(spec),
            ..Self::default()
        }
    }

    /// Records `value` with the given `weight`.
    ///
    /// Rejects negative (or NaN) weights; zero weight is allowed and only
    /// touches min/max.
    pub fn add(&mut self, value: f64, weight: f64) -> SimResult<()> {
        if !(weight >= 0.0) {
            return Err(EngineError::InvalidArgument(format!(
                "tally weight must be non-negative, got {weight}"
            ))
            .into());
        }
        self.accumulate(value, weight);
        Ok(())
    }

    /// Records `value` with weight 1.
    pub fn observe(&mut self, value: f64) {
        self.accumulate(value, 1.0);
    }

    fn accumulate(&mut self, value: f64, weight: f64) {
        self.count += weight;
        self.sum += value * weight;
        self.sum_sq += value * value * weight;

        // First observation initializes both bounds.
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));

        if let Some(spec) = self.spec {
            *self.bins.entry(spec.bin_of(value)).or_insert(0.0) += weight;
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn mean(&self) -> f64 {
        if self.count > 0.0 { self.sum / self.count } else { 0.0 }
    }

    /// Population variance. Zero until the tally has seen two distinct values.
    pub fn variance(&self) -> f64 {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if self.count > 0.0 && hi > lo => {
                ((self.sum_sq - self.sum * self.sum / self.count) / self.count).max(0.0)
            }
            _ => 0.0,
        }
    }

    pub fn stdev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// The dense, range-ordered histogram.
    ///
    /// Empty bins between the lowest and highest observed bin are filled in,
    /// so consumers can plot a contiguous range. Returns an empty vector when
    /// no histogram was configured or nothing was observed yet.
    pub fn histogram(&self) -> Vec<HistogramBin> {
        let Some(spec) = self.spec else {
            return Vec::new();
        };
        let (Some(&first), Some(&last)) =
            (self.bins.keys().next(), self.bins.keys().next_back())
        else {
            return Vec::new();
        };

        (first..=last)
            .map(|bin| HistogramBin {
                low: bin as f64 * spec.bin_size,
                high: (bin + 1) as f64 * spec.bin_size,
                weight: self.bins.get(&bin).copied().unwrap_or(0.0),
            })
            .collect()
    }

    /// Wipes all accumulated state. The histogram configuration survives.
    pub fn reset(&mut self) {
        let spec = self.spec;
        *self = Self {
            spec,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_adds_keep_sum_and_count_consistent() {
        let mut t = Tally::new();
        let obs = [(2.0, 1.0), (4.0, 3.0), (10.0, 0.5)];
        for (v, w) in obs {
            t.add(v, w).unwrap();
        }

        let count: f64 = obs.iter().map(|(_, w)| w).sum();
        let sum: f64 = obs.iter().map(|(v, w)| v * w).sum();
        assert_eq!(t.count(), count);
        assert_eq!(t.sum(), sum);
        assert!(t.min().unwrap() <= t.mean());
        assert!(t.mean() <= t.max().unwrap());
        assert!(t.variance() >= 0.0);
    }

    #[test]
    fn min_max_ignore_weight() {
        let mut t = Tally::new();
        t.add(5.0, 0.0).unwrap();
        t.add(1.0, 2.0).unwrap();
        assert_eq!(t.min(), Some(1.0));
        assert_eq!(t.max(), Some(5.0));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut t = Tally::new();
        assert!(t.add(1.0, -0.5).is_err());
        assert_eq!(t.count(), 0.0);
    }

    #[test]
    fn variance_zero_for_constant_observations() {
        let mut t = Tally::new();
        t.observe(7.0);
        t.observe(7.0);
        t.observe(7.0);
        assert_eq!(t.variance(), 0.0);
        assert_eq!(t.mean(), 7.0);
    }

    #[test]
    fn histogram_fills_gaps_to_contiguous_range() {
        let mut t = Tally::with_histogram(HistogramSpec::new(1.0).with_bounds(0.0, 10.0));
        for v in [0.5, 1.5, 1.5, 8.7] {
            t.observe(v);
        }

        let bins = t.histogram();
        assert_eq!(bins.len(), 9); // [0,1) through [8,9), gaps filled
        assert_eq!(bins[0].weight, 1.0);
        assert_eq!(bins[1].weight, 2.0);
        assert_eq!(bins[8].weight, 1.0);
        assert_eq!(bins[2].weight, 0.0);
        assert_eq!(bins[0].low, 0.0);
        assert_eq!(bins[8].high, 9.0);
    }

    #[test]
    fn histogram_clamps_outliers_into_bounds() {
        let mut t = Tally::with_histogram(HistogramSpec::new(1.0).with_bounds(0.0, 10.0));
        t.observe(-3.0);
        t.observe(42.0);

        let bins = t.histogram();
        assert_eq!(bins.first().unwrap().low, 0.0);
        // 42 clamps to 10, landing in [10, 11).
        assert_eq!(bins.last().unwrap().weight, 1.0);
        assert_eq!(bins.last().unwrap().low, 10.0);
    }

    #[test]
    fn reset_clears_state_but_keeps_histogram_spec() {
        let mut t = Tally::with_histogram(HistogramSpec::new(2.0));
        t.observe(3.0);
        t.reset();

        assert_eq!(t.count(), 0.0);
        assert_eq!(t.min(), None);
        assert!(t.histogram().is_empty());
        t.observe(3.0);
        assert_eq!(t.histogram().len(), 1);
    }
}
