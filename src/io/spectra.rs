//! Reference surface spectra (soil and vegetation)
//!
//! Text table, whitespace separated, one sample per line: wavelength, soil
//! reflectance, then one or more vegetation columns. Lines starting with
//! `#` or `*` are comments. Wavelengths below 100 are taken to be µm.

use crate::types::{AotError, AotResult, SpectralBands};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column holding the default vegetation spectrum
pub const DEFAULT_VEGETATION_COLUMN: usize = 2;

/// Full-resolution reference spectra
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSpectra {
    /// Sample wavelengths in nm, increasing
    pub wavelengths: Vec<f64>,
    pub soil: Vec<f64>,
    pub vegetation: Vec<f64>,
}

/// Reference spectra averaged onto a channel set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpectra {
    pub soil: Vec<f64>,
    pub vegetation: Vec<f64>,
}

impl ReferenceSpectra {
    pub fn from_file<P: AsRef<Path>>(path: P, vegetation_column: usize) -> AotResult<Self> {
        log::info!("Reading surface spectra from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text, vegetation_column)
    }

    pub fn parse(text: &str, vegetation_column: usize) -> AotResult<Self> {
        if vegetation_column < 2 {
            return Err(AotError::Spectra(format!(
                "vegetation column {} overlaps wavelength/soil columns",
                vegetation_column
            )));
        }

        let mut wavelengths = Vec::new();
        let mut soil = Vec::new();
        let mut vegetation = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('*') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let field = |i: usize| -> AotResult<f64> {
                let raw = fields.get(i).ok_or_else(|| {
                    AotError::Spectra(format!("line {}: missing column {}", lineno + 1, i))
                })?;
                raw.parse::<f64>().map_err(|e| {
                    AotError::Spectra(format!("line {}: column {}: {}", lineno + 1, i, e))
                })
            };

            let mut wvl = field(0)?;
            if wvl < 100.0 {
                wvl *= 1000.0;
            }
            wavelengths.push(wvl);
            soil.push(field(1)?);
            vegetation.push(field(vegetation_column)?);
        }

        if wavelengths.len() < 2 {
            return Err(AotError::Spectra("surface spectra table has fewer than 2 samples".to_string()));
        }
        if wavelengths.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AotError::Spectra("surface spectra wavelengths are not increasing".to_string()));
        }

        log::debug!(
            "Surface spectra: {} samples, {:.1}-{:.1} nm",
            wavelengths.len(),
            wavelengths[0],
            wavelengths[wavelengths.len() - 1]
        );
        Ok(Self { wavelengths, soil, vegetation })
    }

    /// Average the spectra over `[centre - width/2, centre + width/2)` of
    /// every channel.
    ///
    /// A window without samples falls back to linear interpolation at the
    /// channel centre. A window reaching outside the table is an error.
    pub fn resample(&self, bands: &SpectralBands) -> AotResult<ChannelSpectra> {
        let n = self.wavelengths.len();
        if n < 2 || self.soil.len() != n || self.vegetation.len() != n {
            return Err(AotError::Spectra(format!(
                "surface spectra need at least 2 samples of equal length, got {} wavelengths, {} soil, {} vegetation",
                n,
                self.soil.len(),
                self.vegetation.len()
            )));
        }
        let first = self.wavelengths[0];
        let last = self.wavelengths[n - 1];
        let mut soil = Vec::with_capacity(bands.len());
        let mut vegetation = Vec::with_capacity(bands.len());

        for (&centre, &width) in bands.centers.iter().zip(&bands.widths) {
            let lo = centre as f64 - width as f64 / 2.0;
            let hi = centre as f64 + width as f64 / 2.0;
            if lo < first || hi > last {
                return Err(AotError::Spectra(format!(
                    "channel {:.1} nm (width {:.1}) exceeds spectra range {:.1}-{:.1} nm",
                    centre, width, first, last
                )));
            }

            let mut count = 0usize;
            let (mut s, mut v) = (0.0, 0.0);
            for (i, &wvl) in self.wavelengths.iter().enumerate() {
                if wvl >= lo && wvl < hi {
                    s += self.soil[i];
                    v += self.vegetation[i];
                    count += 1;
                }
            }

            if count > 0 {
                soil.push(s / count as f64);
                vegetation.push(v / count as f64);
            } else {
                soil.push(self.interpolate(&self.soil, centre as f64));
                vegetation.push(self.interpolate(&self.vegetation, centre as f64));
            }
        }

        Ok(ChannelSpectra { soil, vegetation })
    }

    fn interpolate(&self, values: &[f64], x: f64) -> f64 {
        let hi = self
            .wavelengths
            .partition_point(|&w| w <= x)
            .clamp(1, self.wavelengths.len() - 1);
        let lo = hi - 1;
        let w = (x - self.wavelengths[lo]) / (self.wavelengths[hi] - self.wavelengths[lo]);
        values[lo] * (1.0 - w) + values[hi] * w
    }
}
