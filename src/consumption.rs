//! Household Consumption Profiles
//!
//! Deterministic demand series sampled on a caller-supplied [`TimeIndex`].

use chrono::{Datelike, Timelike};
use chrono_tz::Tz;

use crate::series::{PowerSeries, TimeIndex, TimeSeries};

// ===================== CASE STUDY PROFILE =====================

/// Hourly winter demand (W), December to February
const WINTER: [f64; 24] = [
    682.8230953, 561.0062893, 387.4213836, 334.591195, 364.7798742, 374.3, 384.0826487,
    493.081761, 679.245283, 681.7610063, 727.0440252, 711.9496855, 729.5597484, 759.7484277,
    769.8113208, 767.2955975, 880.5031447, 1091.823899, 1122.012579, 1081.0, 1041.509434,
    996.2264151, 903.1446541, 832.7044025,
];

/// Hourly shoulder-season demand (W), March to May and September to November
const AVERAGE: [f64; 24] = [
    460.7151931, 308.1419624, 265.5532359, 240.5010438, 263.0480167, 245.5114823, 270.5636743,
    375.782881, 503.5490605, 508.559499, 503.5490605, 483.5073069, 503.5490605, 483.5073069,
    458.4551148, 481.0020877, 546.1377871, 648.8517745, 731.5240084, 722.7, 713.9874739,
    681.4196242, 611.2734864, 558.6638831,
];

/// Hourly summer demand (W), June to August
const SUMMER: [f64; 24] = [
    322.9741931, 286.7924528, 284.2767296, 249.0566038, 251.572327, 236.0, 221.3836478,
    314.4654088, 437.7358491, 447.7987421, 430.1886792, 442.7672956, 455.3459119, 394.9685535,
    379.8742138, 407.5471698, 440.2515723, 500.6289308, 533.3333333, 538.3647799, 535.8490566,
    525.7, 515.7232704, 454.6504296,
];

// ===================== PROVIDERS =====================

/// Source of household demand.
pub trait ConsumptionProvider {
    /// Demand (W) at every timestamp of `index`.
    fn consumption(&self, index: &TimeIndex) -> PowerSeries;
}

/// Season of the household profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Average,
    Summer,
}

impl Season {
    pub fn of_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            6..=8 => Season::Summer,
            _ => Season::Average,
        }
    }

    fn profile(self) -> &'static [f64; 24] {
        match self {
            Season::Winter => &WINTER,
            Season::Average => &AVERAGE,
            Season::Summer => &SUMMER,
        }
    }
}

/// Seasonal 24-hour profile indexed by local hour of day.
#[derive(Debug, Clone, Copy)]
pub struct SeasonalProfile {
    pub timezone: Tz,
    /// Multiplier applied to every value
    pub scale: f64,
}

impl SeasonalProfile {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone, scale: 1.0 }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

impl ConsumptionProvider for SeasonalProfile {
    fn consumption(&self, index: &TimeIndex) -> PowerSeries {
        TimeSeries::from_fn(index.clone(), |t| {
            let local = t.with_timezone(&self.timezone);
            let hour = local.hour() as usize;
            Season::of_month(local.month()).profile()[hour] * self.scale
        })
    }
}

/// Flat demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantConsumption(pub f64);

impl ConsumptionProvider for ConstantConsumption {
    fn consumption(&self, index: &TimeIndex) -> PowerSeries {
        TimeSeries::from_fn(index.clone(), |_| self.0)
    }
}

// ===================== TESTS =====================
