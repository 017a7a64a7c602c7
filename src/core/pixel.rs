use super::geometry::Geometry;
use crate::types::{AotError, AotResult, SpectralBands, View};
use std::sync::Arc;

/// Sea-level ceiling for surface pressure in hPa
pub const SEA_LEVEL_PRESSURE: f64 = 1013.25;

/// Water-vapour column applied to every record (g/cm²). Not retrieved.
pub const DEFAULT_WATER_VAPOUR: f64 = 2.5;

/// One pixel, or one member of a superpixel ensemble, ready for inversion.
///
/// Records are immutable; the surface reflectance estimated for a trial AOT
/// is written into a separate [`SurfaceEstimate`] owned by whoever evaluates
/// the cost function.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelRecord {
    pub nadir: Geometry,
    /// Equal to `nadir` for single-view sensors
    pub forward: Geometry,
    /// Surface pressure in hPa, at most [`SEA_LEVEL_PRESSURE`]
    pub surface_pressure: f64,
    /// Ozone column in Dobson Units
    pub ozone_du: f64,
    pub water_vapour: f64,
    pub bands: Arc<SpectralBands>,
    pub toa_nadir: Vec<f64>,
    /// Equal to `toa_nadir` for single-view sensors
    pub toa_forward: Vec<f64>,
}

impl PixelRecord {
    /// Record of a single-view sensor; the forward view mirrors nadir.
    pub fn single_view(
        geometry: Geometry,
        surface_pressure: f64,
        ozone: f64,
        bands: Arc<SpectralBands>,
        toa: Vec<f64>,
    ) -> AotResult<Self> {
        let toa_forward = toa.clone();
        Self::dual_view(geometry, geometry, surface_pressure, ozone, bands, toa, toa_forward)
    }

    /// Record of a dual-view sensor.
    ///
    /// Surface pressure is clamped to sea level and ozone normalised to DU.
    pub fn dual_view(
        nadir: Geometry,
        forward: Geometry,
        surface_pressure: f64,
        ozone: f64,
        bands: Arc<SpectralBands>,
        toa_nadir: Vec<f64>,
        toa_forward: Vec<f64>,
    ) -> AotResult<Self> {
        if toa_nadir.len() != bands.len() || toa_forward.len() != bands.len() {
            return Err(AotError::InconsistentInputs(format!(
                "record has {}/{} TOA channels, run has {}",
                toa_nadir.len(),
                toa_forward.len(),
                bands.len()
            )));
        }

        Ok(Self {
            nadir,
            forward,
            surface_pressure: clamp_surface_pressure(surface_pressure),
            ozone_du: normalize_ozone(ozone),
            water_vapour: DEFAULT_WATER_VAPOUR,
            bands,
            toa_nadir,
            toa_forward,
        })
    }

    pub fn n_channels(&self) -> usize {
        self.bands.len()
    }

    pub fn geometry(&self, view: View) -> &Geometry {
        match view {
            View::Nadir => &self.nadir,
            View::Forward => &self.forward,
        }
    }

    pub fn toa(&self, view: View) -> &[f64] {
        match view {
            View::Nadir => &self.toa_nadir,
            View::Forward => &self.toa_forward,
        }
    }
}

/// Surface reflectance and diffuse fraction per view and channel, as
/// produced by a LUT inversion at one trial AOT.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceEstimate {
    /// `[view][channel]`
    pub reflectance: [Vec<f64>; 2],
    /// `[view][channel]`
    pub diffuse_fraction: [Vec<f64>; 2],
}

impl SurfaceEstimate {
    pub fn new(n_channels: usize) -> Self {
        Self {
            reflectance: [vec![0.0; n_channels], vec![0.0; n_channels]],
            diffuse_fraction: [vec![0.0; n_channels], vec![0.0; n_channels]],
        }
    }

    pub fn n_channels(&self) -> usize {
        self.reflectance[0].len()
    }

    pub fn reflectance(&self, view: View) -> &[f64] {
        &self.reflectance[view.index()]
    }

    pub fn diffuse_fraction(&self, view: View) -> &[f64] {
        &self.diffuse_fraction[view.index()]
    }

    /// Resize for a new channel count; values are left for the next
    /// inversion to overwrite.
    pub fn reset(&mut self, n_channels: usize) {
        for v in self.reflectance.iter_mut().chain(self.diffuse_fraction.iter_mut()) {
            v.clear();
            v.resize(n_channels, 0.0);
        }
    }
}

/// Convert an ozone column to Dobson Units.
///
/// Values below 1 are taken to be atm·cm (conversion factor 1000); anything
/// else is assumed to already be DU.
pub fn normalize_ozone(ozone: f64) -> f64 {
    if ozone < 1.0 {
        ozone * 1000.0
    } else {
        ozone
    }
}

pub fn clamp_surface_pressure(pressure: f64) -> f64 {
    pressure.min(SEA_LEVEL_PRESSURE)
}

/// TOA radiance to reflectance, `L·π / (E0·cos(sza))`
pub fn radiance_to_reflectance(radiance: f64, sza_deg: f64, solar_flux: f64) -> f64 {
    radiance * std::f64::consts::PI / (solar_flux * sza_deg.to_radians().cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bands() -> Arc<SpectralBands> {
        SpectralBands::new(vec![550.0, 670.0], vec![20.0, 20.0]).unwrap().shared()
    }

    #[test]
    fn test_ozone_normalization() {
        assert_abs_diff_eq!(normalize_ozone(0.35), 350.0, epsilon = 1e-9);
        assert_abs_diff_eq!(normalize_ozone(0.0), 0.0);
        assert_eq!(normalize_ozone(1.0), 1.0);
        assert_eq!(normalize_ozone(320.0), 320.0);
        // Idempotent once in DU
        assert_eq!(normalize_ozone(normalize_ozone(320.0)), 320.0);
    }

    #[test]
    fn test_pressure_clamped_to_sea_level() {
        let geom = Geometry::from_zenith_angles(30.0, 0.0, 10.0, 90.0);
        let record = PixelRecord::single_view(geom, 1030.0, 0.3, bands(), vec![0.1, 0.2]).unwrap();
        assert_eq!(record.surface_pressure, SEA_LEVEL_PRESSURE);
        assert_abs_diff_eq!(record.ozone_du, 300.0, epsilon = 1e-9);
        assert_eq!(record.water_vapour, DEFAULT_WATER_VAPOUR);
        assert_eq!(record.toa(View::Forward), record.toa(View::Nadir));
        assert_eq!(record.geometry(View::Forward), record.geometry(View::Nadir));
    }

    #[test]
    fn test_channel_count_mismatch_rejected() {
        let geom = Geometry::from_zenith_angles(30.0, 0.0, 10.0, 90.0);
        let result = PixelRecord::single_view(geom, 1000.0, 300.0, bands(), vec![0.1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_radiance_to_reflectance() {
        // With E0 = pi the conversion reduces to L / cos(sza)
        let rho = radiance_to_reflectance(50.0, 60.0, std::f64::consts::PI);
        assert_abs_diff_eq!(rho, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_surface_estimate_reset() {
        let mut est = SurfaceEstimate::new(2);
        est.reflectance[0][1] = 0.3;
        est.reset(4);
        assert_eq!(est.n_channels(), 4);
        assert!(est.reflectance(View::Nadir).iter().all(|&v| v == 0.0));
    }
}
