use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Real-valued raster sample (reflectance, angle, pressure, ...)
pub type RasterValue = f32;

/// 2D raster array (rows x cols)
pub type Raster = Array2<RasterValue>;

/// 2D boolean mask (rows x cols)
pub type Mask = Array2<bool>;

/// Viewing direction of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    Nadir,
    Forward,
}

impl View {
    /// Both views, nadir first
    pub const ALL: [View; 2] = [View::Nadir, View::Forward];

    pub fn index(self) -> usize {
        match self {
            View::Nadir => 0,
            View::Forward => 1,
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::Nadir => write!(f, "nadir"),
            View::Forward => write!(f, "forward"),
        }
    }
}

/// Spectral channel set of one processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralBands {
    /// Channel centre wavelengths in nm
    pub centers: Vec<f32>,
    /// Channel widths in nm
    pub widths: Vec<f32>,
}

impl SpectralBands {
    pub fn new(centers: Vec<f32>, widths: Vec<f32>) -> AotResult<Self> {
        if centers.len() != widths.len() || centers.is_empty() {
            return Err(AotError::InconsistentInputs(format!(
                "{} band centres but {} band widths",
                centers.len(),
                widths.len()
            )));
        }
        Ok(Self { centers, widths })
    }

    /// Number of spectral channels (`nSpecWvl`)
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Outcome of the AOT retrieval for one block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Retrieved aerosol optical thickness
    pub aot: f64,
    /// Uncertainty derived from the cost-function curvature
    pub aot_uncertainty: f64,
    /// True when the retrieval collapsed to the lower AOT bound
    pub failed: bool,
    /// Cost-function value at the retrieved AOT
    pub fit_residual: f64,
    /// Quadratic coefficient of the parabola fitted around the minimum
    pub curvature: f64,
}

/// Error types for AOT retrieval
#[derive(Debug, thiserror::Error)]
pub enum AotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inconsistent inputs: {0}")]
    InconsistentInputs(String),

    #[error("Surface spectra error: {0}")]
    Spectra(String),

    #[error("Lookup table error: {0}")]
    Lut(String),

    #[error("Retrieval cancelled")]
    Cancelled,
}

/// Result type for AOT retrieval operations
pub type AotResult<T> = Result<T, AotError>;
