//! Rolling and expanding window structures for causal time-series statistics.
//!
//! Every structure here only ever sees values pushed so far, so a statistic
//! read on day t can never depend on anything after t.

use crate::domain::stats::quantile::percentile_sorted;
use std::collections::VecDeque;

/// A fixed-size rolling window of values with an O(1) running sum.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    data: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RollingWindow {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Push a value; returns the evicted oldest value when the window was full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let removed = if self.data.len() >= self.capacity {
            let old = self.data.pop_front();
            if let Some(v) = old {
                self.sum -= v;
            }
            old
        } else {
            None
        };

        self.data.push_back(value);
        self.sum += value;
        removed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            // Recompute to avoid drift from long add/subtract chains
            Some(self.data.iter().sum::<f64>() / self.data.len() as f64)
        }
    }

    /// Sample standard deviation; `None` below two values.
    pub fn std_dev(&self) -> Option<f64> {
        if self.data.len() < 2 {
            return None;
        }
        let mean = self.sum / self.data.len() as f64;
        let ss: f64 = self.data.iter().map(|v| (v - mean).powi(2)).sum();
        Some((ss / (self.data.len() - 1) as f64).sqrt())
    }
}

/// Day-indexed trailing window that tolerates missing days.
///
/// Holds `(day_index, value)` pairs and evicts by day distance rather than by
/// count, so gaps in the series shrink the effective sample instead of
/// stretching the window backwards in time.
#[derive(Debug, Clone)]
pub struct TrailingDayWindow {
    span_days: usize,
    data: VecDeque<(usize, f64)>,
}

impl TrailingDayWindow {
    pub fn new(span_days: usize) -> Self {
        Self {
            span_days: span_days.max(1),
            data: VecDeque::new(),
        }
    }

    /// Advance to `day_index`, evicting entries older than the span, and
    /// optionally record a value for that day.
    pub fn advance(&mut self, day_index: usize, value: Option<f64>) {
        while let Some(&(d, _)) = self.data.front() {
            if d + self.span_days <= day_index {
                self.data.pop_front();
            } else {
                break;
            }
        }
        if let Some(v) = value {
            self.data.push_back((day_index, v));
        }
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().map(|(_, v)| v).sum::<f64>() / self.data.len() as f64)
    }
}

/// Welford accumulator over every value seen so far.
#[derive(Debug, Clone, Default)]
pub struct ExpandingMoments {
    count: usize,
    mean: f64,
    m2: f64,
}

impl ExpandingMoments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation (n - 1).
    pub fn std_dev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.m2 / (self.count - 1) as f64).sqrt())
    }
}

/// Sorted multiset of every value seen so far, for expanding percentiles.
#[derive(Debug, Clone, Default)]
pub struct ExpandingQuantiles {
    sorted: Vec<f64>,
}

impl ExpandingQuantiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-finite values are ignored.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let pos = self.sorted.partition_point(|v| *v < value);
        self.sorted.insert(pos, value);
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn quantile(&self, q: f64) -> Option<f64> {
        percentile_sorted(&self.sorted, q)
    }
}
