use super::geometry::Geometry;
use super::pixel::{radiance_to_reflectance, PixelRecord};
use crate::types::{AotError, AotResult, Mask, Raster, SpectralBands};
use ndarray::{s, ArrayView2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Scale applied after the radiance to reflectance conversion
const RADIANCE_SCALE: f64 = 0.01;

/// How the geometry fields express sun and view positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleConvention {
    Zenith,
    Elevation,
}

/// Physical quantity held by the channel fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelUnits {
    Reflectance,
    Radiance,
}

/// Where the NDVI used by darkest-pixel selection comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NdviSource {
    /// Supplied NDVI field
    Band,
    /// `(nir - red) / (nir + red)` from two nadir channels
    Channels { red: usize, nir: usize },
}

/// Field layout of the inputs and how a record is built from one sample.
///
/// A flat sample holds the geometry fields (sza, saa, vza, vaa per view,
/// nadir first), the channel fields (nadir channels, then forward), surface
/// pressure and ozone.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    pub dual_view: bool,
    pub angles: AngleConvention,
    pub units: ChannelUnits,
    pub bands: Arc<SpectralBands>,
    pub ndvi: NdviSource,
    /// Field value marking missing data
    pub input_no_data: Option<f32>,
}

impl RecordLayout {
    pub fn n_views(&self) -> usize {
        if self.dual_view {
            2
        } else {
            1
        }
    }

    pub fn n_geometry_fields(&self) -> usize {
        4 * self.n_views()
    }

    pub fn n_channel_fields(&self) -> usize {
        self.bands.len() * self.n_views()
    }

    /// Length of a flat sample
    pub fn n_fields(&self) -> usize {
        self.n_geometry_fields() + self.n_channel_fields() + 2
    }

    fn geometry(&self, angles: &[f64]) -> Geometry {
        match self.angles {
            AngleConvention::Zenith => Geometry::from_zenith_angles(angles[0], angles[1], angles[2], angles[3]),
            AngleConvention::Elevation => {
                Geometry::from_elevation_angles(angles[0], angles[1], angles[2], angles[3])
            }
        }
    }

    fn toa(&self, values: &[f64], sza: f64) -> Vec<f64> {
        match self.units {
            ChannelUnits::Reflectance => values.to_vec(),
            ChannelUnits::Radiance => values
                .iter()
                .map(|&l| radiance_to_reflectance(l, sza, std::f64::consts::PI) * RADIANCE_SCALE)
                .collect(),
        }
    }

    /// Build a record from a flat sample (single pixel or block mean).
    ///
    /// Dual-view radiances of both views are converted with the forward
    /// view's solar zenith.
    pub fn build_record(&self, values: &[f64]) -> AotResult<PixelRecord> {
        if values.len() != self.n_fields() {
            return Err(AotError::InconsistentInputs(format!(
                "sample has {} fields, layout expects {}",
                values.len(),
                self.n_fields()
            )));
        }
        let n = self.bands.len();
        let (angles, rest) = values.split_at(self.n_geometry_fields());
        let (channels, ancillary) = rest.split_at(self.n_channel_fields());
        let (pressure, ozone) = (ancillary[0], ancillary[1]);

        let nadir = self.geometry(&angles[..4]);
        if self.dual_view {
            let forward = self.geometry(&angles[4..8]);
            let toa_nadir = self.toa(&channels[..n], forward.sza);
            let toa_forward = self.toa(&channels[n..], forward.sza);
            PixelRecord::dual_view(nadir, forward, pressure, ozone, self.bands.clone(), toa_nadir, toa_forward)
        } else {
            let toa_nadir = self.toa(&channels[..n], nadir.sza);
            PixelRecord::single_view(nadir, pressure, ozone, self.bands.clone(), toa_nadir)
        }
    }
}

/// Scene-sized input rasters, all of one shape
#[derive(Debug, Clone)]
pub struct SceneInputs {
    pub geometry: Vec<Raster>,
    pub channels: Vec<Raster>,
    pub surface_pressure: Raster,
    pub ozone: Raster,
    pub ndvi: Option<Raster>,
    pub valid: Mask,
}

impl SceneInputs {
    pub fn new(
        geometry: Vec<Raster>,
        channels: Vec<Raster>,
        surface_pressure: Raster,
        ozone: Raster,
        ndvi: Option<Raster>,
        valid: Mask,
    ) -> AotResult<Self> {
        let dim = valid.dim();
        let shapes_match = geometry.iter().chain(&channels).all(|a| a.dim() == dim)
            && surface_pressure.dim() == dim
            && ozone.dim() == dim
            && ndvi.as_ref().map_or(true, |a| a.dim() == dim);
        if !shapes_match {
            return Err(AotError::InconsistentInputs(format!(
                "input rasters do not all have the mask shape {:?}",
                dim
            )));
        }
        Ok(Self {
            geometry,
            channels,
            surface_pressure,
            ozone,
            ndvi,
            valid,
        })
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.valid.dim()
    }

    /// Check field counts against a layout
    pub fn check_layout(&self, layout: &RecordLayout) -> AotResult<()> {
        if self.geometry.len() != layout.n_geometry_fields() {
            return Err(AotError::InconsistentInputs(format!(
                "{} geometry fields, expected {}",
                self.geometry.len(),
                layout.n_geometry_fields()
            )));
        }
        if self.channels.len() != layout.n_channel_fields() {
            return Err(AotError::InconsistentInputs(format!(
                "{} channel fields, expected {}",
                self.channels.len(),
                layout.n_channel_fields()
            )));
        }
        match layout.ndvi {
            NdviSource::Band if self.ndvi.is_none() => Err(AotError::InconsistentInputs(
                "NDVI band required but not supplied".to_string(),
            )),
            NdviSource::Channels { red, nir } if red.max(nir) >= layout.bands.len() => {
                Err(AotError::InconsistentInputs(format!(
                    "NDVI channels {}/{} out of range for {} channels",
                    red,
                    nir,
                    layout.bands.len()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Window of `size × size` samples starting at (row, col)
    pub fn block(&self, row: usize, col: usize, size: usize) -> InputBlock<'_> {
        let (rows, cols) = (row..row + size, col..col + size);
        InputBlock {
            geometry: self.geometry.iter().map(|a| a.slice(s![rows.clone(), cols.clone()])).collect(),
            channels: self.channels.iter().map(|a| a.slice(s![rows.clone(), cols.clone()])).collect(),
            surface_pressure: self.surface_pressure.slice(s![rows.clone(), cols.clone()]),
            ozone: self.ozone.slice(s![rows.clone(), cols.clone()]),
            ndvi: self.ndvi.as_ref().map(|a| a.slice(s![rows.clone(), cols.clone()])),
            valid: self.valid.slice(s![rows, cols]),
        }
    }

    /// The whole scene as one block
    pub fn as_block(&self) -> InputBlock<'_> {
        InputBlock {
            geometry: self.geometry.iter().map(|a| a.view()).collect(),
            channels: self.channels.iter().map(|a| a.view()).collect(),
            surface_pressure: self.surface_pressure.view(),
            ozone: self.ozone.view(),
            ndvi: self.ndvi.as_ref().map(|a| a.view()),
            valid: self.valid.view(),
        }
    }
}

/// Borrowed window of the scene inputs processed as one output pixel
#[derive(Debug, Clone)]
pub struct InputBlock<'a> {
    geometry: Vec<ArrayView2<'a, f32>>,
    channels: Vec<ArrayView2<'a, f32>>,
    surface_pressure: ArrayView2<'a, f32>,
    ozone: ArrayView2<'a, f32>,
    ndvi: Option<ArrayView2<'a, f32>>,
    valid: ArrayView2<'a, bool>,
}

impl<'a> InputBlock<'a> {
    pub fn dim(&self) -> (usize, usize) {
        self.valid.dim()
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    pub fn is_masked_valid(&self, row: usize, col: usize) -> bool {
        self.valid[[row, col]]
    }

    /// Read all fields of one sample into `out` (length
    /// [`RecordLayout::n_fields`]).
    ///
    /// Returns false when the sample is masked, or any field is non-finite
    /// or equal to the no-data value.
    pub fn read_sample(&self, row: usize, col: usize, layout: &RecordLayout, out: &mut [f64]) -> bool {
        if !self.valid[[row, col]] {
            return false;
        }
        let fields = self
            .geometry
            .iter()
            .chain(&self.channels)
            .chain(std::iter::once(&self.surface_pressure))
            .chain(std::iter::once(&self.ozone));

        let mut ok = true;
        for (slot, field) in out.iter_mut().zip(fields) {
            let v = field[[row, col]];
            ok &= v.is_finite() && layout.input_no_data.map_or(true, |nd| v != nd);
            *slot = v as f64;
        }
        ok
    }

    /// NDVI of one sample, `None` when it cannot be computed
    pub fn ndvi(&self, row: usize, col: usize, layout: &RecordLayout) -> Option<f64> {
        let value = match layout.ndvi {
            NdviSource::Band => self.ndvi.as_ref()?[[row, col]] as f64,
            NdviSource::Channels { red, nir } => {
                let red = *self.channels.get(red)?.get((row, col))? as f64;
                let nir = *self.channels.get(nir)?.get((row, col))? as f64;
                (nir - red) / (nir + red)
            }
        };
        value.is_finite().then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::View;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn layout(dual_view: bool) -> RecordLayout {
        RecordLayout {
            dual_view,
            angles: AngleConvention::Zenith,
            units: ChannelUnits::Reflectance,
            bands: SpectralBands::new(vec![670.0, 870.0], vec![20.0, 20.0]).unwrap().shared(),
            ndvi: NdviSource::Channels { red: 0, nir: 1 },
            input_no_data: Some(-999.0),
        }
    }

    fn scene(n: usize) -> SceneInputs {
        let field = |v: f32| Array2::from_elem((n, n), v);
        SceneInputs::new(
            vec![field(30.0), field(100.0), field(10.0), field(40.0)],
            vec![field(0.05), field(0.3)],
            field(1000.0),
            field(0.3),
            None,
            Array2::from_elem((n, n), true),
        )
        .unwrap()
    }

    #[test]
    fn test_field_counts() {
        assert_eq!(layout(false).n_fields(), 4 + 2 + 2);
        assert_eq!(layout(true).n_fields(), 8 + 4 + 2);
    }

    #[test]
    fn test_read_sample_and_build_record() {
        let scene = scene(4);
        let lay = layout(false);
        scene.check_layout(&lay).unwrap();
        let block = scene.block(1, 1, 2);
        assert_eq!(block.dim(), (2, 2));

        let mut values = vec![0.0; lay.n_fields()];
        assert!(block.read_sample(0, 0, &lay, &mut values));
        let record = lay.build_record(&values).unwrap();
        assert_abs_diff_eq!(record.nadir.razi, 120.0);
        assert_abs_diff_eq!(record.ozone_du, 300.0, epsilon = 1e-4);
        assert_abs_diff_eq!(record.toa(View::Nadir)[1], 0.3, epsilon = 1e-7);
    }

    #[test]
    fn test_no_data_and_nan_invalidate() {
        let mut scene = scene(2);
        scene.channels[1][[0, 1]] = -999.0;
        scene.ozone[[1, 0]] = f32::NAN;
        scene.valid[[1, 1]] = false;
        let lay = layout(false);
        let block = scene.as_block();
        let mut values = vec![0.0; lay.n_fields()];
        assert!(block.read_sample(0, 0, &lay, &mut values));
        assert!(!block.read_sample(0, 1, &lay, &mut values));
        assert!(!block.read_sample(1, 0, &lay, &mut values));
        assert!(!block.read_sample(1, 1, &lay, &mut values));
    }

    #[test]
    fn test_ndvi_from_channels() {
        let scene = scene(2);
        let lay = layout(false);
        let ndvi = scene.as_block().ndvi(0, 0, &lay).unwrap();
        assert_abs_diff_eq!(ndvi, 0.25 / 0.35, epsilon = 1e-6);

        let band_layout = RecordLayout {
            ndvi: NdviSource::Band,
            ..lay
        };
        assert!(scene.check_layout(&band_layout).is_err());
        assert_eq!(scene.as_block().ndvi(0, 0, &band_layout), None);
    }

    #[test]
    fn test_radiance_elevation_record() {
        let lay = RecordLayout {
            angles: AngleConvention::Elevation,
            units: ChannelUnits::Radiance,
            ..layout(true)
        };
        // Nadir: sun elevation 30 (sza 60); forward: sun elevation 40 (sza 50)
        let values = [
            30.0, 0.0, 80.0, 0.0, 40.0, 0.0, 35.0, 0.0, 10.0, 20.0, 10.0, 20.0, 1013.0, 300.0,
        ];
        let record = lay.build_record(&values).unwrap();
        assert_abs_diff_eq!(record.nadir.sza, 60.0);
        assert_abs_diff_eq!(record.forward.sza, 50.0);
        assert_abs_diff_eq!(record.forward.vza, 55.0);

        // Both views are converted with the forward solar zenith
        let cos_fwd = 50f64.to_radians().cos();
        assert_abs_diff_eq!(record.toa(View::Nadir)[0], 0.1 / cos_fwd, epsilon = 1e-9);
        assert_abs_diff_eq!(record.toa(View::Nadir)[0], 0.15557, epsilon = 1e-5);
        assert_abs_diff_eq!(record.toa(View::Forward)[0], 0.1 / cos_fwd, epsilon = 1e-9);
        assert_abs_diff_eq!(record.toa(View::Forward)[1], 0.2 / cos_fwd, epsilon = 1e-9);
    }

    #[test]
    fn test_single_view_radiance_uses_own_sun() {
        let lay = RecordLayout {
            angles: AngleConvention::Elevation,
            units: ChannelUnits::Radiance,
            ..layout(false)
        };
        let values = [30.0, 0.0, 80.0, 0.0, 10.0, 20.0, 1013.0, 300.0];
        let record = lay.build_record(&values).unwrap();
        assert_abs_diff_eq!(record.toa(View::Nadir)[1], 0.4, epsilon = 1e-9);
        assert_eq!(record.toa(View::Nadir), record.toa(View::Forward));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = SceneInputs::new(
            vec![Array2::zeros((3, 3))],
            vec![],
            Array2::zeros((2, 2)),
            Array2::zeros((2, 2)),
            None,
            Array2::from_elem((2, 2), true),
        );
        assert!(matches!(result, Err(AotError::InconsistentInputs(_))));
    }
}
