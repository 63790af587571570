//! Irradiance Models
//!
//! Ineichen-Perez clear-sky irradiance, plane-of-array transposition for the
//! front face and a view-factor estimate of rear-face irradiance for bifacial
//! modules.
//!
//! References:
//! - Ineichen, P. and Perez, R. (2002). "A new airmass independent formulation
//!   for the Linke turbidity coefficient"
//! - Marion, B. et al. (2017). "A practical irradiance model for bifacial PV
//!   modules"

use std::f64::consts::PI;

// ===================== CONSTANTS =====================

/// Solar constant (Total Solar Irradiance) in W/m²
/// Latest value from SORCE/TIM measurements
const SOLAR_CONSTANT: f64 = 1361.0;

/// Default Linke turbidity factor for clear atmosphere
/// Typical values: 2-3 for very clear, 4-6 for industrial areas
pub const DEFAULT_LINKE_TURBIDITY: f64 = 3.0;

/// Default ground albedo (mixed grass/soil)
pub const DEFAULT_ALBEDO: f64 = 0.25;

// ===================== IRRADIANCE RESULTS =====================

/// Horizontal irradiance components (W/m²)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClearSkyIrradiance {
    /// Global Horizontal Irradiance
    pub ghi: f64,
    /// Direct Normal Irradiance
    pub dni: f64,
    /// Diffuse Horizontal Irradiance
    pub dhi: f64,
}

/// Irradiance breakdown on the front face of a tilted panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoaIrradiance {
    /// Plane-of-Array irradiance (W/m²) - total on tilted panel
    pub poa: f64,
    /// POA beam component (W/m²)
    pub beam: f64,
    /// POA sky diffuse component (W/m²)
    pub sky_diffuse: f64,
    /// POA ground reflected component (W/m²)
    pub ground_diffuse: f64,
    /// Angle of incidence (degrees)
    pub aoi_deg: f64,
}

// ===================== GEOMETRY =====================

/// Cosine of the angle between sun rays and the panel normal.
///
/// Negative when the sun is behind the panel.
pub fn cos_angle_of_incidence(
    sun_zenith_deg: f64,
    sun_azimuth_deg: f64,
    panel_tilt_deg: f64,
    panel_azimuth_deg: f64,
) -> f64 {
    let zenith = sun_zenith_deg.to_radians();
    let tilt = panel_tilt_deg.to_radians();
    let delta_az = (sun_azimuth_deg - panel_azimuth_deg).to_radians();

    (zenith.cos() * tilt.cos() + zenith.sin() * tilt.sin() * delta_az.cos()).clamp(-1.0, 1.0)
}

/// Angle of incidence in degrees (0 = sun perpendicular to panel)
pub fn angle_of_incidence(
    sun_zenith_deg: f64,
    sun_azimuth_deg: f64,
    panel_tilt_deg: f64,
    panel_azimuth_deg: f64,
) -> f64 {
    cos_angle_of_incidence(sun_zenith_deg, sun_azimuth_deg, panel_tilt_deg, panel_azimuth_deg)
        .acos()
        .to_degrees()
}

// ===================== ATMOSPHERIC CALCULATIONS =====================

/// Calculate absolute air mass (pressure-corrected)
///
/// Uses Kasten-Young (1989) relative air mass model combined with
/// International Standard Atmosphere (ISA) pressure correction.
pub fn air_mass(sun_zenith_deg: f64, altitude_m: f64) -> f64 {
    if sun_zenith_deg >= 90.0 {
        return f64::INFINITY;
    }

    let am_relative = 1.0
        / (sun_zenith_deg.to_radians().cos()
            + 0.50572 * (96.07995 - sun_zenith_deg).powf(-1.6364));

    // P / P0 = (1 - 2.25577e-5 * h)^5.25588, valid in the troposphere
    let pressure_ratio =
        if altitude_m.abs() < 1e-5 { 1.0 } else { (1.0 - 2.25577e-5 * altitude_m).powf(5.25588) };

    am_relative * pressure_ratio
}

/// Calculate extraterrestrial irradiance corrected for Earth-Sun distance
///
/// Uses Spencer (1971) formula for orbital eccentricity correction
///
/// # Arguments
/// * `day_of_year` - Day of year (1-366)
///
/// # Returns
/// Extraterrestrial irradiance in W/m²
pub fn extraterrestrial_irradiance(day_of_year: u32) -> f64 {
    let b = 2.0 * PI * (day_of_year as f64 - 1.0) / 365.0;

    let eccentricity_correction = 1.000110
        + 0.034221 * b.cos()
        + 0.001280 * b.sin()
        + 0.000719 * (2.0 * b).cos()
        + 0.000077 * (2.0 * b).sin();

    SOLAR_CONSTANT * eccentricity_correction
}

// ===================== INEICHEN-PEREZ CLEAR SKY MODEL =====================

/// Clear-sky irradiance using the Ineichen-Perez model
///
/// # Arguments
/// * `sun_zenith_deg` - Apparent sun zenith in degrees
/// * `altitude_m` - Site altitude in meters
/// * `day_of_year` - Day of year (1-366)
/// * `linke_turbidity` - Linke turbidity factor (typical 2-7)
///
/// # Returns
/// GHI, DNI and DHI in W/m², all zero with the sun at or below the horizon
pub fn clear_sky(
    sun_zenith_deg: f64,
    altitude_m: f64,
    day_of_year: u32,
    linke_turbidity: f64,
) -> ClearSkyIrradiance {
    if sun_zenith_deg >= 90.0 {
        return ClearSkyIrradiance::default();
    }

    let am = air_mass(sun_zenith_deg, altitude_m);
    if !am.is_finite() || am <= 0.0 {
        return ClearSkyIrradiance::default();
    }

    let i0 = extraterrestrial_irradiance(day_of_year);
    let cos_zenith = sun_zenith_deg.to_radians().cos();

    // Coefficients drift outside the troposphere
    let alt = altitude_m.clamp(-500.0, 11000.0);

    let fh1 = (-alt / 8000.0).exp();
    let fh2 = (-alt / 1250.0).exp();
    let tl = (linke_turbidity - 0.15 * alt / 1000.0).max(1.0);

    let cg1 = 5.09e-5 * alt + 0.868;
    let cg2 = 3.92e-5 * alt + 0.0387;

    let attenuation = -cg2 * am * (fh1 + fh2 * (tl - 1.0));

    let b = 0.664 + 0.163 / fh1;
    let dni = (b * i0 * attenuation.exp()).clamp(0.0, i0);

    let ghi_raw = (cg1 * i0 * cos_zenith * (attenuation * 1.1).exp()).max(0.0);

    // GHI cannot be less than the direct beam component hitting the ground
    let direct_horizontal = dni * cos_zenith;
    let ghi = ghi_raw.max(direct_horizontal);
    let dhi = (ghi - direct_horizontal).max(0.0);

    ClearSkyIrradiance { ghi, dni, dhi }
}

// ===================== PLANE OF ARRAY IRRADIANCE =====================

/// Front-face plane-of-array irradiance with an isotropic sky
///
/// # Arguments
/// * `sky` - Horizontal irradiance components
/// * `sun_zenith_deg` - Apparent sun zenith in degrees
/// * `sun_azimuth_deg` - Sun azimuth in degrees
/// * `panel_tilt_deg` - Panel tilt from horizontal in degrees
/// * `panel_azimuth_deg` - Panel azimuth in degrees
/// * `albedo` - Ground reflectance (0-1)
pub fn plane_of_array(
    sky: ClearSkyIrradiance,
    sun_zenith_deg: f64,
    sun_azimuth_deg: f64,
    panel_tilt_deg: f64,
    panel_azimuth_deg: f64,
    albedo: f64,
) -> PoaIrradiance {
    let cos_aoi =
        cos_angle_of_incidence(sun_zenith_deg, sun_azimuth_deg, panel_tilt_deg, panel_azimuth_deg);
    let cos_tilt = panel_tilt_deg.to_radians().cos();

    let beam = if cos_aoi > 0.0 && sun_zenith_deg < 90.0 { sky.dni * cos_aoi } else { 0.0 };
    let sky_diffuse = sky.dhi * (1.0 + cos_tilt) / 2.0;
    let ground_diffuse = sky.ghi * albedo * (1.0 - cos_tilt) / 2.0;

    PoaIrradiance {
        poa: beam + sky_diffuse + ground_diffuse,
        beam,
        sky_diffuse,
        ground_diffuse,
        aoi_deg: cos_aoi.acos().to_degrees(),
    }
}

/// Rear-face irradiance of a panel row (W/m²)
///
/// Beam light reaches the rear only when the sun is behind the panel. Ground
/// reflections are reduced by the row shade at ground coverage ratio `gcr`.
pub fn rear_irradiance(
    sky: ClearSkyIrradiance,
    sun_zenith_deg: f64,
    sun_azimuth_deg: f64,
    panel_tilt_deg: f64,
    panel_azimuth_deg: f64,
    albedo: f64,
    gcr: f64,
) -> f64 {
    let cos_aoi =
        cos_angle_of_incidence(sun_zenith_deg, sun_azimuth_deg, panel_tilt_deg, panel_azimuth_deg);
    let cos_tilt = panel_tilt_deg.to_radians().cos();

    let beam = if cos_aoi < 0.0 && sun_zenith_deg < 90.0 { sky.dni * -cos_aoi } else { 0.0 };
    let sky_diffuse = sky.dhi * (1.0 - cos_tilt) / 2.0;
    let ground = sky.ghi * albedo * (1.0 + cos_tilt) / 2.0 * (1.0 - gcr.clamp(0.0, 1.0));

    beam + sky_diffuse + ground
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraterrestrial_irradiance_range() {
        // Should vary by ~3.3% over the year
        let min = (1..=366).map(extraterrestrial_irradiance).fold(f64::INFINITY, f64::min);
        let max = (1..=366).map(extraterrestrial_irradiance).fold(f64::NEG_INFINITY, f64::max);

        // Perihelion (early January) above aphelion (early July)
        assert!(extraterrestrial_irradiance(3) > extraterrestrial_irradiance(185));
        assert!(min > 1300.0 && min < 1350.0);
        assert!(max > 1380.0 && max < 1420.0);
    }

    #[test]
    fn test_air_mass_typical_values() {
        assert!((air_mass(0.0, 0.0) - 1.0).abs() < 0.01);

        let am_30 = air_mass(30.0, 0.0);
        assert!(am_30 > 1.1 && am_30 < 1.2, "AM at 30° zenith was {}", am_30);

        let am_60 = air_mass(60.0, 0.0);
        assert!(am_60 > 1.9 && am_60 < 2.1, "AM at 60° zenith was {}", am_60);

        assert!(air_mass(85.0, 0.0) > 10.0);
        assert!(air_mass(95.0, 0.0).is_infinite());
    }

    #[test]
    fn test_air_mass_altitude_correction() {
        let am_sea = air_mass(45.0, 0.0);
        let am_mountain = air_mass(45.0, 3000.0);

        assert!(am_mountain < am_sea);
        assert!(am_mountain > am_sea * 0.5);
    }

    #[test]
    fn test_angle_of_incidence() {
        // Sun overhead, flat panel
        assert!(angle_of_incidence(0.0, 180.0, 0.0, 180.0).abs() < 0.1);

        // Sun at 45° elevation from south, panel tilted 45° facing south
        assert!(angle_of_incidence(45.0, 180.0, 45.0, 180.0).abs() < 0.1);

        // cos(AOI) = cos(45°)*cos(45°) + sin(45°)*sin(45°)*cos(90°) = 0.5
        let aoi = angle_of_incidence(45.0, 90.0, 45.0, 180.0);
        assert!((aoi - 60.0).abs() < 1.0, "AOI was {}, expected ~60°", aoi);

        // Sun behind panel: cos = 0.25 - 0.75
        let behind = cos_angle_of_incidence(60.0, 0.0, 60.0, 180.0);
        assert!((behind + 0.5).abs() < 1e-12, "cos(AOI) was {}, expected -0.5", behind);

        // Grazing: the two terms cancel up to rounding
        assert!(cos_angle_of_incidence(45.0, 0.0, 45.0, 180.0).abs() < 1e-12);
    }

    #[test]
    fn test_clear_sky_consistency() {
        let sky = clear_sky(30.0, 0.0, 172, 3.0);

        assert!(sky.dni > 500.0 && sky.dni < 1100.0, "DNI was {}", sky.dni);
        assert!(sky.dhi > 0.0, "DHI was {} (must be positive)", sky.dhi);
        assert!(sky.ghi > 500.0 && sky.ghi < 1200.0, "GHI was {}", sky.ghi);

        // GHI = DNI * cos(zenith) + DHI
        let expected = sky.dni * 30.0_f64.to_radians().cos() + sky.dhi;
        assert!((sky.ghi - expected).abs() < 1.0, "GHI {} != DNI*cos + DHI {}", sky.ghi, expected);

        assert_eq!(clear_sky(95.0, 0.0, 172, 3.0), ClearSkyIrradiance::default());
    }

    #[test]
    fn test_clear_sky_turbidity_effect() {
        let clear = clear_sky(30.0, 0.0, 172, 2.0);
        let hazy = clear_sky(30.0, 0.0, 172, 5.0);

        assert!(clear.dni > hazy.dni);
    }

    #[test]
    fn test_clear_sky_winter_low_sun() {
        // Helsinki area, January noon: elevation ~11°
        let sky = clear_sky(79.08, 0.0, 26, 3.0);

        assert!(sky.dni > 600.0 && sky.dni < 700.0, "DNI {} out of range", sky.dni);
        assert!(sky.ghi > 120.0 && sky.ghi < 170.0, "GHI {} out of range", sky.ghi);
    }

    #[test]
    fn test_poa_flat_panel_matches_ghi() {
        let sky = ClearSkyIrradiance { ghi: 800.0, dni: 800.0, dhi: 100.0 };
        let poa = plane_of_array(sky, 30.0, 180.0, 0.0, 180.0, 0.2);

        // Flat panel: beam * cos(zenith) + full sky dome, no ground view
        let expected = 800.0 * 30.0_f64.to_radians().cos() + 100.0;
        assert!((poa.poa - expected).abs() < 1e-9, "POA {} != {}", poa.poa, expected);
        assert_eq!(poa.ground_diffuse, 0.0);
    }

    #[test]
    fn test_poa_flat_panel_ignores_azimuth() {
        let sky = clear_sky(40.0, 0.0, 172, 3.0);
        let south = plane_of_array(sky, 40.0, 150.0, 0.0, 180.0, 0.2);
        let north = plane_of_array(sky, 40.0, 150.0, 0.0, 0.0, 0.2);

        assert!((south.poa - north.poa).abs() < 1e-9);
    }

    #[test]
    fn test_poa_winter_tilted_panel_boost() {
        // Low winter sun straight onto a 35° south panel
        let sky = clear_sky(79.08, 0.0, 26, 3.0);
        let poa = plane_of_array(sky, 79.08, 172.5, 35.0, 180.0, 0.2);

        assert!(
            poa.aoi_deg > 43.0 && poa.aoi_deg < 46.0,
            "AOI {} should be ~44°",
            poa.aoi_deg
        );
        assert!(poa.poa > sky.ghi * 3.0, "POA {} should be much higher than GHI {}", poa.poa, sky.ghi);
    }

    #[test]
    fn test_poa_sun_behind_panel_has_no_beam() {
        let sky = clear_sky(45.0, 0.0, 172, 3.0);
        let poa = plane_of_array(sky, 45.0, 0.0, 60.0, 180.0, 0.2);

        assert_eq!(poa.beam, 0.0);
        assert!(poa.poa > 0.0, "Diffuse light still reaches the front");
    }

    #[test]
    fn test_rear_irradiance_vertical_panel_sees_beam_from_behind() {
        let sky = clear_sky(45.0, 0.0, 172, 3.0);
        let behind = rear_irradiance(sky, 45.0, 0.0, 90.0, 180.0, 0.2, 0.1);
        let facing = rear_irradiance(sky, 45.0, 180.0, 90.0, 180.0, 0.2, 0.1);

        assert!(behind > facing, "Rear {} should gain beam when sun is behind", behind);
    }

    #[test]
    fn test_rear_irradiance_flat_panel_only_sees_ground() {
        let sky = ClearSkyIrradiance { ghi: 800.0, dni: 800.0, dhi: 100.0 };
        let rear = rear_irradiance(sky, 30.0, 180.0, 0.0, 180.0, 0.25, 0.2);

        assert!((rear - 800.0 * 0.25 * 0.8).abs() < 1e-9, "Rear was {}", rear);
    }

    #[test]
    fn test_rear_irradiance_scales_with_albedo() {
        let sky = clear_sky(40.0, 0.0, 172, 3.0);
        let grass = rear_irradiance(sky, 40.0, 180.0, 30.0, 180.0, 0.2, 0.1);
        let snow = rear_irradiance(sky, 40.0, 180.0, 30.0, 180.0, 0.8, 0.1);

        assert!(snow > grass * 2.0, "Snow {} vs grass {}", snow, grass);
    }

    #[test]
    fn test_edge_case_extreme_altitude() {
        let sky = clear_sky(45.0, 11000.0, 172, 3.0);
        assert!(sky.ghi.is_finite() && sky.ghi > 0.0);

        let low = clear_sky(45.0, -430.0, 172, 3.0);
        assert!(low.ghi.is_finite() && low.ghi > 0.0);
        assert!(air_mass(45.0, -430.0) > air_mass(45.0, 0.0));
    }
}
