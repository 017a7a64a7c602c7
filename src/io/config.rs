//! Retrieval configuration
//!
//! A [`RetrievalConfig`] is plain data loaded from JSON (or built from an
//! instrument preset). [`RetrievalConfig::validate`] checks it once and
//! produces the immutable [`RetrievalSetup`] shared by all workers.

use super::spectra::{ReferenceSpectra, DEFAULT_VEGETATION_COLUMN};
use crate::core::block::{AngleConvention, ChannelUnits, NdviSource, RecordLayout};
use crate::core::superpixel::{SelectionStrategy, SelectorParams, SuperpixelSelector};
use crate::core::surface_model::{normalize_weights, AngularModel, SpectralModel, SurfaceModel, SurfaceModelKind};
use crate::types::{AotError, AotResult, SpectralBands};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default block size in pixels
pub const DEFAULT_SCALE: usize = 9;
/// Default value written to output rasters for rejected or failed blocks
pub const DEFAULT_OUTPUT_NO_DATA: f32 = -1.0;

/// Sensors with built-in presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Meris,
    Vgt,
    Aatsr,
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instrument::Meris => write!(f, "MERIS"),
            Instrument::Vgt => write!(f, "VGT"),
            Instrument::Aatsr => write!(f, "AATSR"),
        }
    }
}

fn default_scale() -> usize {
    DEFAULT_SCALE
}

fn default_vegetation_column() -> usize {
    DEFAULT_VEGETATION_COLUMN
}

fn default_output_no_data() -> f32 {
    DEFAULT_OUTPUT_NO_DATA
}

/// Processing-run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub instrument: Option<Instrument>,
    /// Channel centre wavelengths in nm
    pub band_centers: Vec<f32>,
    /// Channel widths in nm
    pub band_widths: Vec<f32>,
    /// Per-channel fit weights, normalised at validation
    pub fit_weights: Vec<f64>,
    pub dual_view: bool,
    pub angles: AngleConvention,
    pub units: ChannelUnits,
    pub ndvi: NdviSource,
    pub surface_model: SurfaceModelKind,
    #[serde(default)]
    pub selector: SelectorParams,
    /// Block size; the output has one pixel per `scale × scale` block
    #[serde(default = "default_scale")]
    pub scale: usize,
    /// Reference spectra table, required by the spectral model
    #[serde(default)]
    pub surface_spectra: Option<PathBuf>,
    #[serde(default = "default_vegetation_column")]
    pub vegetation_column: usize,
    /// Input value marking missing data
    #[serde(default)]
    pub input_no_data: Option<f32>,
    #[serde(default = "default_output_no_data")]
    pub output_no_data: f32,
    /// Also produce fit-residual and curvature rasters
    #[serde(default)]
    pub diagnostics: bool,
}

impl RetrievalConfig {
    /// Preset for a supported instrument. The spectral presets still need
    /// `surface_spectra` before validation.
    pub fn for_instrument(instrument: Instrument) -> Self {
        let (centers, widths, weights): (Vec<f32>, Vec<f32>, Vec<f64>) = match instrument {
            Instrument::Meris => (
                vec![
                    412.5, 442.5, 490.0, 510.0, 560.0, 620.0, 665.0, 681.25, 708.75, 753.75, 761.875, 778.75,
                    865.0, 885.0, 900.0,
                ],
                vec![10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 7.5, 10.0, 7.5, 3.75, 15.0, 20.0, 10.0, 20.0],
                vec![1.0, 1.0, 1.0, 1.0, 0.2, 1.0, 1.0, 1.0, 0.5, 0.5, 0.0, 0.5, 0.5, 0.5, 0.0],
            ),
            Instrument::Vgt => (
                vec![450.0, 645.0, 835.0, 1665.0],
                vec![40.0, 70.0, 110.0, 170.0],
                vec![1.0, 1.0, 0.5, 0.1],
            ),
            Instrument::Aatsr => (
                vec![550.0, 670.0, 870.0, 1600.0],
                vec![20.0, 20.0, 20.0, 60.0],
                vec![1.5, 1.0, 1.0, 1.55],
            ),
        };

        let aatsr = instrument == Instrument::Aatsr;
        let ndvi = match instrument {
            Instrument::Meris => NdviSource::Channels { red: 6, nir: 12 },
            Instrument::Vgt | Instrument::Aatsr => NdviSource::Channels { red: 1, nir: 2 },
        };

        Self {
            instrument: Some(instrument),
            band_centers: centers,
            band_widths: widths,
            fit_weights: weights,
            dual_view: aatsr,
            angles: if aatsr { AngleConvention::Elevation } else { AngleConvention::Zenith },
            units: if aatsr { ChannelUnits::Radiance } else { ChannelUnits::Reflectance },
            ndvi,
            surface_model: if aatsr { SurfaceModelKind::Angular } else { SurfaceModelKind::Spectral },
            selector: SelectorParams {
                strategy: if aatsr { SelectionStrategy::Averaging } else { SelectionStrategy::DarkestN },
                ..SelectorParams::default()
            },
            scale: DEFAULT_SCALE,
            surface_spectra: None,
            vegetation_column: DEFAULT_VEGETATION_COLUMN,
            input_no_data: None,
            output_no_data: DEFAULT_OUTPUT_NO_DATA,
            diagnostics: false,
        }
    }

    /// Load from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> AotResult<Self> {
        log::info!("Loading retrieval configuration from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(json: &str) -> AotResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> AotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate and build the run setup, reading the reference spectra from
    /// `surface_spectra` when the spectral model is selected
    pub fn validate(&self) -> AotResult<RetrievalSetup> {
        let spectra = match (self.surface_model, &self.surface_spectra) {
            (SurfaceModelKind::Spectral, Some(path)) => {
                Some(ReferenceSpectra::from_file(path, self.vegetation_column)?)
            }
            (SurfaceModelKind::Spectral, None) => {
                return Err(AotError::Config(
                    "spectral surface model requires 'surface_spectra'".to_string(),
                ))
            }
            (SurfaceModelKind::Angular, _) => None,
        };
        self.validate_with_spectra(spectra.as_ref())
    }

    /// Validate with reference spectra supplied by the caller
    pub fn validate_with_spectra(&self, spectra: Option<&ReferenceSpectra>) -> AotResult<RetrievalSetup> {
        let bands = SpectralBands::new(self.band_centers.clone(), self.band_widths.clone())
            .map_err(|e| AotError::Config(e.to_string()))?
            .shared();

        if self.fit_weights.len() != bands.len() {
            return Err(AotError::Config(format!(
                "{} fit weights for {} channels",
                self.fit_weights.len(),
                bands.len()
            )));
        }
        if self.scale == 0 {
            return Err(AotError::Config("scale must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.selector.min_coverage) {
            return Err(AotError::Config(format!(
                "min_coverage {} outside [0, 1]",
                self.selector.min_coverage
            )));
        }
        if let NdviSource::Channels { red, nir } = self.ndvi {
            if red.max(nir) >= bands.len() {
                return Err(AotError::Config(format!(
                    "NDVI channels {}/{} out of range for {} channels",
                    red,
                    nir,
                    bands.len()
                )));
            }
        }

        let weights = normalize_weights(&self.fit_weights)?;
        let model: Arc<dyn SurfaceModel> = match self.surface_model {
            SurfaceModelKind::Angular => {
                if !self.dual_view {
                    return Err(AotError::Config("angular surface model requires dual-view inputs".to_string()));
                }
                Arc::new(AngularModel::new(weights.clone())?)
            }
            SurfaceModelKind::Spectral => {
                let spectra = spectra.ok_or_else(|| {
                    AotError::Config("spectral surface model requires reference spectra".to_string())
                })?;
                let resampled = spectra
                    .resample(&bands)
                    .map_err(|e| AotError::Config(e.to_string()))?;
                Arc::new(SpectralModel::new(weights.clone(), resampled)?)
            }
        };

        let layout = RecordLayout {
            dual_view: self.dual_view,
            angles: self.angles,
            units: self.units,
            bands,
            ndvi: self.ndvi,
            input_no_data: self.input_no_data,
        };

        log::info!(
            "Retrieval setup: {} channels, {} view(s), {} model, {:?} selection, {}x{} blocks",
            layout.bands.len(),
            layout.n_views(),
            self.surface_model,
            self.selector.strategy,
            self.scale,
            self.scale
        );

        Ok(RetrievalSetup {
            scale: self.scale,
            selector: SuperpixelSelector::new(self.selector, layout),
            model,
            weights,
            output_no_data: self.output_no_data,
            diagnostics: self.diagnostics,
        })
    }
}

/// Validated, immutable run setup shared by all block retrievals
#[derive(Debug, Clone)]
pub struct RetrievalSetup {
    pub scale: usize,
    pub selector: SuperpixelSelector,
    pub model: Arc<dyn SurfaceModel>,
    /// Normalised fit weights
    pub weights: Vec<f64>,
    pub output_no_data: f32,
    pub diagnostics: bool,
}

impl RetrievalSetup {
    pub fn layout(&self) -> &RecordLayout {
        self.selector.layout()
    }

    pub fn n_channels(&self) -> usize {
        self.layout().bands.len()
    }
}
