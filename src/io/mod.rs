//! Configuration and file readers

pub mod config;
pub mod lut_file;
pub mod spectra;

pub use config::{Instrument, RetrievalConfig, RetrievalSetup};
pub use lut_file::{read_gas_table, read_momo_lut};
pub use spectra::{ChannelSpectra, ReferenceSpectra};
