//! Derivative-free minimisers used by the retrieval
//!
//! - [`brent`]: bounded 1-D minimisation (golden section + parabolic
//!   interpolation), used for the AOT search and for line minimisation
//! - [`bracket_minimum`]: downhill bracketing of a 1-D minimum
//! - [`powell`]: direction-set minimisation of a multivariate function
//!
//! All routines own their scratch buffers for the duration of a call, so
//! concurrent calls from different workers never share state.

pub mod bracket;
pub mod brent;
pub mod powell;

pub use bracket::{bracket_minimum, Bracket};
pub use brent::{brent, BrentMinimum};
pub use powell::{powell, PowellMinimum};
