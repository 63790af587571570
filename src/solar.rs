//! Solar Position Calculation Module
//!
//! Site description and the sun-position context used by the weather
//! providers. Uses the NREL SPA (Solar Position Algorithm) for high-precision
//! apparent zenith and azimuth.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use solar_positioning::{spa, time::DeltaT, types::RefractionCorrection};

use crate::error::WeatherError;

// ===================== SITE =====================

/// A PV installation site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Label used in reports and persisted optimum rows
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Latitude in degrees, north positive
    pub latitude: f64,
    /// Longitude in degrees, east positive
    pub longitude: f64,
    /// Altitude above sea level in meters
    #[serde(default)]
    pub altitude_m: f64,
    /// Local time zone, used for the consumption profile's hour of day
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

fn default_site_name() -> String {
    "site".to_string()
}

fn default_timezone() -> Tz {
    chrono_tz::UTC
}

impl Site {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            altitude_m: 0.0,
            timezone: chrono_tz::UTC,
        }
    }

    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = altitude_m;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }
}

// ===================== SUN POSITION =====================

/// Topocentric sun position at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    /// Refraction-corrected zenith angle in degrees
    pub apparent_zenith: f64,
    /// Azimuth in degrees clockwise from north
    pub azimuth: f64,
}

impl SunPosition {
    /// Apparent elevation above the horizon in degrees.
    pub fn elevation(&self) -> f64 {
        90.0 - self.apparent_zenith
    }
}

// ===================== SOLAR CALCULATION CONTEXT =====================

/// Context for solar position calculations at one site.
#[derive(Debug, Clone, Copy)]
pub struct SolarCalc {
    /// Observer latitude in degrees
    pub lat: f64,
    /// Observer longitude in degrees
    pub lon: f64,
    /// Observer altitude in meters
    pub alt: f64,
    /// Delta-T correction for TT-UT1 difference
    pub delta_t: f64,
    /// Atmospheric refraction correction
    pub refr: Option<RefractionCorrection>,
}

impl SolarCalc {
    /// Build a context for `site`, estimating Delta-T around `reference`.
    ///
    /// Delta-T drifts by well under a second per year, so one estimate covers
    /// any study period.
    pub fn for_site(site: &Site, reference: DateTime<Utc>) -> Result<Self, WeatherError> {
        let delta_t = DeltaT::estimate_from_date(reference.year(), reference.month()).map_err(
            |e| WeatherError::SolarPosition {
                timestamp: reference.to_rfc3339(),
                message: e.to_string(),
            },
        )?;

        Ok(Self {
            lat: site.latitude,
            lon: site.longitude,
            alt: site.altitude_m,
            delta_t,
            refr: Some(RefractionCorrection::standard()),
        })
    }

    /// Get the solar position at a given time.
    pub fn position(&self, t: DateTime<Utc>) -> Result<SunPosition, WeatherError> {
        let pos = spa::solar_position(
            t.with_timezone(&chrono_tz::UTC),
            self.lat,
            self.lon,
            self.alt,
            self.delta_t,
            self.refr,
        )
        .map_err(|e| WeatherError::SolarPosition {
            timestamp: t.to_rfc3339(),
            message: e.to_string(),
        })?;

        Ok(SunPosition { apparent_zenith: pos.zenith_angle(), azimuth: pos.azimuth() })
    }
}

// ===================== TESTS =====================
