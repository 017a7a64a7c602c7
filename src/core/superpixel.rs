use super::block::{InputBlock, RecordLayout};
use super::pixel::PixelRecord;
use crate::lut::AerosolLut;
use crate::types::AotResult;
use serde::{Deserialize, Serialize};

/// How a block is reduced to an ensemble of records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// One record from the mean of all valid samples
    Averaging,
    /// One record per sample among the most vegetated ones
    DarkestN,
}

/// Selector parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorParams {
    pub strategy: SelectionStrategy,
    /// Rank from the top of the NDVI distribution that sets the threshold
    pub darkest_n: usize,
    /// Blocks whose NDVI threshold is not above this are rejected
    pub ndvi_threshold: f64,
    /// Fraction of the block that must be valid for averaging
    pub min_coverage: f64,
}

impl Default for SelectorParams {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::DarkestN,
            darkest_n: 10,
            ndvi_threshold: 0.1,
            min_coverage: 0.95,
        }
    }
}

/// Why a block produced no ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Too few valid samples
    InsufficientCoverage,
    /// NDVI threshold at or below the vegetation limit
    NotVegetated,
    /// No candidate survived the validity and domain checks
    EmptyEnsemble,
    /// Averaged record outside the LUT domain
    OutsideLutDomain,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::InsufficientCoverage => "insufficient valid coverage",
            RejectReason::NotVegetated => "not vegetated",
            RejectReason::EmptyEnsemble => "empty ensemble",
            RejectReason::OutsideLutDomain => "outside LUT domain",
        };
        write!(f, "{}", text)
    }
}

/// Result of selecting a block
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Ensemble(Vec<PixelRecord>),
    Rejected(RejectReason),
}

impl Selection {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Selection::Rejected(_))
    }
}

/// Reduces an input block to the records the retrieval is run on
#[derive(Debug, Clone)]
pub struct SuperpixelSelector {
    params: SelectorParams,
    layout: RecordLayout,
}

impl SuperpixelSelector {
    pub fn new(params: SelectorParams, layout: RecordLayout) -> Self {
        Self { params, layout }
    }

    pub fn params(&self) -> &SelectorParams {
        &self.params
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn select(&self, block: &InputBlock<'_>, lut: &dyn AerosolLut) -> AotResult<Selection> {
        match self.params.strategy {
            SelectionStrategy::Averaging => self.select_average(block, lut),
            SelectionStrategy::DarkestN => self.select_darkest(block, lut),
        }
    }

    fn select_average(&self, block: &InputBlock<'_>, lut: &dyn AerosolLut) -> AotResult<Selection> {
        let n_fields = self.layout.n_fields();
        let mut sample = vec![0.0; n_fields];
        let mut sum = vec![0.0; n_fields];
        let mut count = 0usize;

        let (rows, cols) = block.dim();
        for r in 0..rows {
            for c in 0..cols {
                if block.read_sample(r, c, &self.layout, &mut sample) {
                    sum.iter_mut().zip(&sample).for_each(|(s, v)| *s += v);
                    count += 1;
                }
            }
        }

        if !(count as f64 > self.params.min_coverage * block.len() as f64) {
            return Ok(Selection::Rejected(RejectReason::InsufficientCoverage));
        }

        sum.iter_mut().for_each(|s| *s /= count as f64);
        let record = self.layout.build_record(&sum)?;
        if !lut.is_inside_domain(&record) {
            return Ok(Selection::Rejected(RejectReason::OutsideLutDomain));
        }
        Ok(Selection::Ensemble(vec![record]))
    }

    fn select_darkest(&self, block: &InputBlock<'_>, lut: &dyn AerosolLut) -> AotResult<Selection> {
        let n = self.params.darkest_n;
        if block.len() <= n {
            return Ok(Selection::Rejected(RejectReason::InsufficientCoverage));
        }

        let (rows, cols) = block.dim();
        // Masked samples sort to the bottom
        let mut ndvi: Vec<f64> = Vec::with_capacity(block.len());
        for r in 0..rows {
            for c in 0..cols {
                let value = if block.is_masked_valid(r, c) {
                    block.ndvi(r, c, &self.layout).unwrap_or(-1.0)
                } else {
                    -1.0
                };
                ndvi.push(value);
            }
        }
        ndvi.sort_by(f64::total_cmp);
        let threshold = ndvi[ndvi.len() - 1 - n];
        if !(threshold > self.params.ndvi_threshold) {
            return Ok(Selection::Rejected(RejectReason::NotVegetated));
        }

        let mut sample = vec![0.0; self.layout.n_fields()];
        let mut ensemble = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                if !block.is_masked_valid(r, c) {
                    continue;
                }
                match block.ndvi(r, c, &self.layout) {
                    Some(v) if v >= threshold => {}
                    _ => continue,
                }
                if !block.read_sample(r, c, &self.layout, &mut sample) {
                    continue;
                }
                let record = self.layout.build_record(&sample)?;
                if lut.is_inside_domain(&record) {
                    ensemble.push(record);
                }
            }
        }

        if ensemble.is_empty() {
            return Ok(Selection::Rejected(RejectReason::EmptyEnsemble));
        }
        log::trace!("darkest-pixel ensemble: {} members, NDVI >= {:.3}", ensemble.len(), threshold);
        Ok(Selection::Ensemble(ensemble))
    }
}
