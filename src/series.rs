//! Fixed-Frequency Time Series
//!
//! A [`TimeIndex`] is an immutable, strictly increasing, evenly spaced list of
//! UTC timestamps. Series built on the same index share it through an `Arc`,
//! so cloning a series or checking alignment against its source is cheap.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::SeriesError;

/// Power series in watts.
pub type PowerSeries = TimeSeries<f64>;

// ===================== TIME RANGE =====================

/// Inclusive time range sampled at a fixed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Self {
        Self { start, end, step }
    }

    /// Build the index covering this range, both ends included.
    pub fn index(&self) -> Result<TimeIndex, SeriesError> {
        TimeIndex::regular(self.start, self.end, self.step)
    }
}

// ===================== TIME INDEX =====================

#[derive(Debug, Clone)]
pub struct TimeIndex {
    stamps: Arc<[DateTime<Utc>]>,
    step: Duration,
}

impl TimeIndex {
    /// Evenly spaced timestamps from `start` to `end` inclusive.
    pub fn regular(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Self, SeriesError> {
        if step <= Duration::zero() {
            return Err(SeriesError::NonPositiveStep);
        }
        if end < start {
            return Err(SeriesError::InvertedRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        let mut stamps = Vec::new();
        let mut t = start;
        while t <= end {
            stamps.push(t);
            t += step;
        }
        Ok(Self { stamps: stamps.into(), step })
    }

    /// Wrap existing timestamps, checking order and spacing against `step`.
    pub fn from_timestamps(
        stamps: Vec<DateTime<Utc>>,
        step: Duration,
    ) -> Result<Self, SeriesError> {
        if step <= Duration::zero() {
            return Err(SeriesError::NonPositiveStep);
        }
        for (i, pair) in stamps.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            if gap <= Duration::zero() {
                return Err(SeriesError::NotIncreasing { position: i + 1 });
            }
            if gap != step {
                return Err(SeriesError::IrregularStep {
                    position: i + 1,
                    expected_secs: step.num_seconds(),
                    found_secs: gap.num_seconds(),
                });
            }
        }
        Ok(Self { stamps: stamps.into(), step })
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Step length in hours, used to turn unit-step sums into watt-hours.
    pub fn step_hours(&self) -> f64 {
        self.step.num_seconds() as f64 / 3600.0
    }

    pub fn first(&self) -> Option<DateTime<Utc>> {
        self.stamps.first().copied()
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.stamps.last().copied()
    }

    pub fn as_slice(&self) -> &[DateTime<Utc>] {
        &self.stamps
    }

    pub fn iter(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.stamps.iter().copied()
    }

    /// Position of the first differing timestamp, `None` when identical.
    fn first_difference(&self, other: &TimeIndex) -> Option<usize> {
        if Arc::ptr_eq(&self.stamps, &other.stamps) {
            return None;
        }
        let shared = self.len().min(other.len());
        (0..shared)
            .find(|&i| self.stamps[i] != other.stamps[i])
            .or_else(|| (self.len() != other.len()).then_some(shared))
    }

    /// Fail unless both indices hold the same timestamps.
    pub fn ensure_same(&self, other: &TimeIndex) -> Result<(), SeriesError> {
        match self.first_difference(other) {
            None => Ok(()),
            Some(pos) => Err(SeriesError::Misaligned {
                left: self.len(),
                right: other.len(),
                first_difference: Some(pos),
            }),
        }
    }
}

impl PartialEq for TimeIndex {
    fn eq(&self, other: &Self) -> bool {
        self.step == other.step && self.first_difference(other).is_none()
    }
}

// ===================== TIME SERIES =====================

/// Values sampled on a [`TimeIndex`]; immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    index: TimeIndex,
    values: Vec<T>,
}

impl<T> TimeSeries<T> {
    pub fn new(index: TimeIndex, values: Vec<T>) -> Result<Self, SeriesError> {
        if index.len() != values.len() {
            return Err(SeriesError::LengthMismatch { index: index.len(), values: values.len() });
        }
        Ok(Self { index, values })
    }

    /// Build a series by evaluating `f` at every timestamp.
    pub fn from_fn(index: TimeIndex, f: impl FnMut(DateTime<Utc>) -> T) -> Self {
        let values = index.iter().map(f).collect();
        Self { index, values }
    }

    /// Fallible variant of [`TimeSeries::from_fn`]; stops at the first error.
    pub fn try_from_fn<E>(
        index: TimeIndex,
        f: impl FnMut(DateTime<Utc>) -> Result<T, E>,
    ) -> Result<Self, E> {
        let values = index.iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Self { index, values })
    }

    pub fn index(&self) -> &TimeIndex {
        &self.index
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, &T)> + '_ {
        self.index.iter().zip(self.values.iter())
    }

    /// New series on the same index.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> TimeSeries<U> {
        TimeSeries { index: self.index.clone(), values: self.values.iter().map(f).collect() }
    }

    /// Fail unless `other` shares this series' timestamps exactly.
    pub fn ensure_aligned<U>(&self, other: &TimeSeries<U>) -> Result<(), SeriesError> {
        self.index.ensure_same(&other.index)
    }
}

impl TimeSeries<f64> {
    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

// ===================== TESTS =====================
