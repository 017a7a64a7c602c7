use super::{AerosolLut, GasTable, FALLBACK_MAX_AOT};
use crate::core::geometry::Geometry;
use crate::core::pixel::{PixelRecord, SurfaceEstimate};
use crate::types::{AotError, AotResult, View};
use ndarray::Array6;
use num_traits::Float;
use std::borrow::Cow;
use std::f64::consts::PI;

/// Returned by `max_aot` when path reflectance already exceeds TOA at the
/// first AOT node
const MIN_MAX_AOT: f64 = 0.005;

/// Number of interpolation axes besides the channel
const N_AXES: usize = 5;

/// Atmospheric terms tabulated at one node
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AtmosphericTerms {
    /// Path reflectance (normalised, multiplied by π/cos(sza) on use)
    pub path_reflectance: f32,
    /// Product of downward and upward transmission
    pub transmission: f32,
    /// Spherical albedo of the atmosphere at ground level
    pub spherical_albedo: f32,
    /// Direct fraction of the downward irradiance
    pub direct_fraction: f32,
}

/// Coordinates of one table node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LutNode {
    pub pressure: f64,
    pub vza: f64,
    pub sza: f64,
    pub razi: f64,
    pub aot: f64,
}

/// Strictly increasing axis vectors of a gridded table
#[derive(Debug, Clone, PartialEq)]
pub struct LutAxes {
    /// Surface pressure in hPa
    pub pressure: Vec<f64>,
    pub vza: Vec<f64>,
    pub sza: Vec<f64>,
    pub razi: Vec<f64>,
    pub aot: Vec<f64>,
}

impl LutAxes {
    fn validate(&self) -> AotResult<()> {
        let named = [
            ("pressure", &self.pressure),
            ("vza", &self.vza),
            ("sza", &self.sza),
            ("razi", &self.razi),
            ("aot", &self.aot),
        ];
        for (name, axis) in named {
            if axis.is_empty() {
                return Err(AotError::Lut(format!("axis '{}' is empty", name)));
            }
            if axis.windows(2).any(|w| !(w[1] > w[0])) {
                return Err(AotError::Lut(format!("axis '{}' is not strictly increasing", name)));
            }
        }
        Ok(())
    }

    /// Table shape `(channel, aot, pressure, razi, sza, vza)`
    fn shape(&self, n_channels: usize) -> (usize, usize, usize, usize, usize, usize) {
        (
            n_channels,
            self.aot.len(),
            self.pressure.len(),
            self.razi.len(),
            self.sza.len(),
            self.vza.len(),
        )
    }
}

/// Bracketing nodes and weight of `x` on a monotonic axis.
///
/// Coordinates outside the axis are clamped to the first/last node.
pub(crate) fn axis_position<T: Float>(axis: &[T], x: T) -> (usize, usize, T) {
    let last = axis.len() - 1;
    if last == 0 || x <= axis[0] {
        return (0, 0, T::zero());
    }
    if x >= axis[last] {
        return (last, last, T::zero());
    }
    // First node strictly above x
    let hi = axis.partition_point(|&a| a <= x).min(last);
    let lo = hi - 1;
    let w = (x - axis[lo]) / (axis[hi] - axis[lo]);
    (lo, hi, w)
}

/// In-memory radiative-transfer table with multilinear interpolation
#[derive(Debug, Clone)]
pub struct GriddedLut {
    axes: LutAxes,
    /// Centre wavelength of each channel in nm
    wavelengths: Vec<f64>,
    /// `(channel, aot, pressure, razi, sza, vza)`
    table: Array6<AtmosphericTerms>,
    /// Per-channel gaseous transmission used when no gas table is loaded
    gas_transmission: Vec<f64>,
    gas_table: Option<GasTable>,
    solar_irradiance: Option<f64>,
}

impl GriddedLut {
    pub fn new(axes: LutAxes, wavelengths: Vec<f64>, table: Array6<AtmosphericTerms>) -> AotResult<Self> {
        axes.validate()?;
        let expected = axes.shape(wavelengths.len());
        if table.dim() != expected {
            return Err(AotError::Lut(format!(
                "table shape {:?} does not match axes {:?}",
                table.dim(),
                expected
            )));
        }
        let n_channels = wavelengths.len();
        Ok(Self {
            axes,
            wavelengths,
            table,
            gas_transmission: vec![1.0; n_channels],
            gas_table: None,
            solar_irradiance: None,
        })
    }

    /// Build a table by evaluating `f(channel, node)` at every node
    pub fn from_fn<F>(axes: LutAxes, wavelengths: Vec<f64>, f: F) -> AotResult<Self>
    where
        F: Fn(usize, LutNode) -> AtmosphericTerms,
    {
        axes.validate()?;
        let shape = axes.shape(wavelengths.len());
        let table = Array6::from_shape_fn(shape, |(c, ia, ip, ir, is, iv)| {
            f(
                c,
                LutNode {
                    pressure: axes.pressure[ip],
                    vza: axes.vza[iv],
                    sza: axes.sza[is],
                    razi: axes.razi[ir],
                    aot: axes.aot[ia],
                },
            )
        });
        Self::new(axes, wavelengths, table)
    }

    pub fn with_gas_transmission(mut self, gas_transmission: Vec<f64>) -> AotResult<Self> {
        if gas_transmission.len() != self.wavelengths.len() {
            return Err(AotError::Lut(format!(
                "{} gas transmission values for {} channels",
                gas_transmission.len(),
                self.wavelengths.len()
            )));
        }
        if gas_transmission.iter().any(|&t| !(t > 0.0)) {
            return Err(AotError::Lut("gas transmission must be positive".to_string()));
        }
        self.gas_transmission = gas_transmission;
        Ok(self)
    }

    /// Replace the constant gas transmission with a table evaluated per view
    pub fn with_gas_table(mut self, table: GasTable) -> AotResult<Self> {
        if table.n_channels() != self.wavelengths.len() {
            return Err(AotError::Lut(format!(
                "gas table has {} channels, LUT has {}",
                table.n_channels(),
                self.wavelengths.len()
            )));
        }
        self.gas_table = Some(table);
        Ok(self)
    }

    pub fn with_solar_irradiance(mut self, irradiance: f64) -> Self {
        self.solar_irradiance = Some(irradiance);
        self
    }

    pub fn axes(&self) -> &LutAxes {
        &self.axes
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn solar_irradiance(&self) -> Option<f64> {
        self.solar_irradiance
    }

    /// Interpolated terms for one channel
    pub fn terms(&self, channel: usize, pressure: f64, geometry: &Geometry, aot: f64) -> AtmosphericTerms {
        // Axis order matches the table layout after the channel index
        let positions = [
            axis_position(&self.axes.aot, aot),
            axis_position(&self.axes.pressure, pressure),
            axis_position(&self.axes.razi, geometry.razi),
            axis_position(&self.axes.sza, geometry.sza),
            axis_position(&self.axes.vza, geometry.vza),
        ];

        let mut acc = [0.0f64; 4];
        for corner in 0..(1usize << N_AXES) {
            let mut weight = 1.0;
            let mut idx = [0usize; N_AXES];
            for (axis, &(lo, hi, w)) in positions.iter().enumerate() {
                if corner & (1 << axis) == 0 {
                    idx[axis] = lo;
                    weight *= 1.0 - w;
                } else {
                    idx[axis] = hi;
                    weight *= w;
                }
            }
            if weight == 0.0 {
                continue;
            }
            let t = &self.table[[channel, idx[0], idx[1], idx[2], idx[3], idx[4]]];
            acc[0] += weight * t.path_reflectance as f64;
            acc[1] += weight * t.transmission as f64;
            acc[2] += weight * t.spherical_albedo as f64;
            acc[3] += weight * t.direct_fraction as f64;
        }

        AtmosphericTerms {
            path_reflectance: acc[0] as f32,
            transmission: acc[1] as f32,
            spherical_albedo: acc[2] as f32,
            direct_fraction: acc[3] as f32,
        }
    }

    fn path_reflectance(&self, channel: usize, pressure: f64, geometry: &Geometry, aot: f64) -> f64 {
        self.terms(channel, pressure, geometry, aot).path_reflectance as f64 * PI / geometry.cos_sza()
    }

    /// Gaseous transmission of every channel along one view's path
    pub fn gas_transmission(&self, record: &PixelRecord, view: View) -> Cow<'_, [f64]> {
        match &self.gas_table {
            Some(table) => Cow::Owned(table.transmission(
                record.geometry(view).air_mass(),
                record.water_vapour,
                record.ozone_du / 1000.0,
            )),
            None => Cow::Borrowed(self.gas_transmission.as_slice()),
        }
    }

    fn in_range(axis: &[f64], x: f64) -> bool {
        match (axis.first(), axis.last()) {
            (Some(&lo), Some(&hi)) => x >= lo && x <= hi,
            _ => false,
        }
    }
}

impl AerosolLut for GriddedLut {
    fn invert(&self, record: &PixelRecord, aot: f64, out: &mut SurfaceEstimate) {
        let n = record.n_channels().min(self.wavelengths.len());
        if out.n_channels() != record.n_channels() {
            out.reset(record.n_channels());
        }

        for view in View::ALL {
            let geometry = record.geometry(view);
            let cos_sza = geometry.cos_sza();
            let toa = record.toa(view);
            let gas = self.gas_transmission(record, view);
            let v = view.index();

            for c in 0..n {
                let t = self.terms(c, record.surface_pressure, geometry, aot);
                let rho_path = t.path_reflectance as f64 * PI / cos_sza;
                let transmission = t.transmission as f64 / cos_sza;
                let toa_corr = toa[c] / gas[c];
                let x = (toa_corr - rho_path) / transmission;
                out.reflectance[v][c] = x / (1.0 + t.spherical_albedo as f64 * x);
                out.diffuse_fraction[v][c] = 1.0 - t.direct_fraction as f64;
            }
        }
    }

    fn is_inside_domain(&self, record: &PixelRecord) -> bool {
        let g = &record.nadir;
        Self::in_range(&self.axes.vza, g.vza)
            && Self::in_range(&self.axes.sza, g.sza)
            && Self::in_range(&self.axes.razi, g.razi)
    }

    fn max_aot(&self, record: &PixelRecord) -> Option<f64> {
        let geometry = &record.nadir;
        let pressure = record.surface_pressure;
        let toa = record.toa(View::Nadir).first()? / self.gas_transmission(record, View::Nadir).first()?;
        let aot_axis = &self.axes.aot;

        let mut i = 0;
        let mut rho1 = self.path_reflectance(0, pressure, geometry, aot_axis[0]);
        let mut rho0 = rho1;
        while i + 1 < aot_axis.len() && rho1 < toa {
            rho0 = rho1;
            i += 1;
            rho1 = self.path_reflectance(0, pressure, geometry, aot_axis[i]);
        }

        if i == 0 {
            return Some(MIN_MAX_AOT);
        }
        if rho1 < toa {
            return Some(FALLBACK_MAX_AOT);
        }
        Some(aot_axis[i - 1] + (aot_axis[i] - aot_axis[i - 1]) * (toa - rho0) / (rho1 - rho0))
    }

    fn n_channels(&self) -> Option<usize> {
        Some(self.wavelengths.len())
    }
}
