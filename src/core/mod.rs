//! Core AOT retrieval modules

pub mod geometry;
pub mod pixel;
pub mod block;
pub mod superpixel;
pub mod surface_model;
pub mod cost;
pub mod retrieval;
pub mod scene;

// Re-export main types
pub use geometry::{relative_azimuth, Geometry};
pub use pixel::{normalize_ozone, radiance_to_reflectance, PixelRecord, SurfaceEstimate};
pub use block::{AngleConvention, ChannelUnits, InputBlock, NdviSource, RecordLayout, SceneInputs};
pub use superpixel::{RejectReason, Selection, SelectionStrategy, SelectorParams, SuperpixelSelector};
pub use surface_model::{AngularModel, SpectralModel, SurfaceModel, SurfaceModelKind};
pub use cost::{AotCostFunction, MemberFit};
pub use retrieval::{PointRetrieval, RetrievalState};
pub use scene::{AotProduct, BlockOutcome, CancellationToken, SceneRetrieval, SceneStatistics};
