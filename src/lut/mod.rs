//! Atmospheric lookup-table service
//!
//! The retrieval engine only needs three things from a radiative-transfer
//! table: the inversion of TOA reflectance to surface reflectance at a trial
//! AOT, a domain predicate, and an upper AOT bound. Tables are read-only
//! after load and shared across workers.

pub mod gas;
pub mod gridded;

pub use gas::GasTable;
pub use gridded::{AtmosphericTerms, GriddedLut, LutAxes, LutNode};

use crate::core::pixel::{PixelRecord, SurfaceEstimate};

/// AOT bound used when a table cannot answer the max-AOT query
pub const FALLBACK_MAX_AOT: f64 = 2.0;

/// Contract between the retrieval engine and an atmospheric LUT
pub trait AerosolLut: Send + Sync {
    /// Invert the record's TOA reflectances at `aot`, writing surface
    /// reflectance and diffuse fraction for every view and channel into `out`.
    fn invert(&self, record: &PixelRecord, aot: f64, out: &mut SurfaceEstimate);

    /// Whether the record's geometry lies inside the tabulated domain
    fn is_inside_domain(&self, record: &PixelRecord) -> bool;

    /// Largest AOT the table can represent for this record, `None` when the
    /// table does not support the query
    fn max_aot(&self, _record: &PixelRecord) -> Option<f64> {
        None
    }

    /// Channel count of the table, when known, for setup validation
    fn n_channels(&self) -> Option<usize> {
        None
    }
}
