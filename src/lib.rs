//! aotinv: Aerosol Optical Thickness retrieval by LUT inversion
//!
//! Retrieves AOT from top-of-atmosphere reflectances by inverting a
//! precomputed radiative-transfer lookup table. Each `scale × scale` block
//! of a scene is reduced to an ensemble of pixel records, a surface
//! reflectance model is fitted for every trial AOT, and the AOT minimising
//! the total misfit is searched with Brent's method. Uncertainties come from
//! the curvature of the cost around the minimum.

pub mod types;
pub mod core;
pub mod optim;
pub mod lut;
pub mod io;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{AotError, AotResult, Mask, Raster, RetrievalResult, SpectralBands, View};

pub use crate::core::{
    AotCostFunction, AotProduct, CancellationToken, Geometry, PixelRecord, PointRetrieval, SceneInputs,
    SceneRetrieval, SurfaceEstimate,
};
pub use io::{Instrument, RetrievalConfig, RetrievalSetup};
pub use lut::{AerosolLut, GriddedLut};
