use super::block::{InputBlock, SceneInputs};
use super::cost::AotCostFunction;
use super::retrieval::PointRetrieval;
use super::superpixel::{RejectReason, Selection};
use crate::io::config::RetrievalSetup;
use crate::lut::AerosolLut;
use crate::types::{AotError, AotResult, Raster, RetrievalResult};
use ndarray::Array2;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Shared flag to stop a scene retrieval between blocks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What happened to one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockOutcome {
    Retrieved(RetrievalResult),
    Rejected(RejectReason),
}

impl BlockOutcome {
    /// Successful retrieval, if any
    pub fn retrieved(&self) -> Option<&RetrievalResult> {
        match self {
            BlockOutcome::Retrieved(r) if !r.failed => Some(r),
            _ => None,
        }
    }
}

/// Output rasters, one pixel per block
#[derive(Debug, Clone, PartialEq)]
pub struct AotProduct {
    pub aot: Raster,
    pub aot_uncertainty: Raster,
    /// Present when diagnostics are enabled
    pub fit_residual: Option<Raster>,
    /// Present when diagnostics are enabled
    pub curvature: Option<Raster>,
}

/// Counts of block outcomes in a scene run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStatistics {
    pub retrieved: usize,
    pub failed: usize,
    pub rejected: usize,
}

/// Retrieval over a whole scene, one independent block at a time
pub struct SceneRetrieval {
    setup: Arc<RetrievalSetup>,
    lut: Arc<dyn AerosolLut>,
    cancel: CancellationToken,
}

impl SceneRetrieval {
    pub fn new(setup: Arc<RetrievalSetup>, lut: Arc<dyn AerosolLut>) -> AotResult<Self> {
        if let Some(n) = lut.n_channels() {
            if n != setup.n_channels() {
                return Err(AotError::Config(format!(
                    "LUT has {} channels, configuration has {}",
                    n,
                    setup.n_channels()
                )));
            }
        }
        Ok(Self {
            setup,
            lut,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn setup(&self) -> &RetrievalSetup {
        &self.setup
    }

    /// Select and retrieve one block. Each call owns its cost function and
    /// optimiser state.
    pub fn retrieve_block(&self, block: &InputBlock<'_>) -> AotResult<BlockOutcome> {
        let ensemble = match self.setup.selector.select(block, self.lut.as_ref())? {
            Selection::Ensemble(records) => records,
            Selection::Rejected(reason) => return Ok(BlockOutcome::Rejected(reason)),
        };

        let cost = AotCostFunction::new(&ensemble, self.lut.as_ref(), self.setup.model.as_ref());
        let mut retrieval = PointRetrieval::new(cost);
        Ok(BlockOutcome::Retrieved(retrieval.retrieve()))
    }

    /// Retrieve every complete block of the scene
    pub fn run(&self, inputs: &SceneInputs) -> AotResult<AotProduct> {
        inputs.check_layout(self.setup.layout())?;

        let scale = self.setup.scale;
        let (rows, cols) = inputs.dim();
        let (out_rows, out_cols) = (rows / scale, cols / scale);
        let n_blocks = out_rows * out_cols;
        log::info!(
            "Retrieving AOT for {}x{} blocks of {}x{} pixels",
            out_rows,
            out_cols,
            scale,
            scale
        );

        let completed = AtomicUsize::new(0);
        let report_every = (n_blocks / 10).max(1);

        let process = |index: usize| -> AotResult<BlockOutcome> {
            if self.cancel.is_cancelled() {
                return Err(AotError::Cancelled);
            }
            let (r, c) = (index / out_cols, index % out_cols);
            let block = inputs.block(r * scale, c * scale, scale);
            let outcome = self.retrieve_block(&block)?;

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % report_every == 0 || done == n_blocks {
                let progress = done as f32 / n_blocks as f32 * 100.0;
                log::info!("AOT retrieval progress: {}/{} blocks ({:.1}%)", done, n_blocks, progress);
            }
            Ok(outcome)
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<BlockOutcome> = (0..n_blocks).into_par_iter().map(process).collect::<AotResult<_>>()?;
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<BlockOutcome> = (0..n_blocks).map(process).collect::<AotResult<_>>()?;

        let product = self.assemble(&outcomes, out_rows, out_cols);
        let stats = statistics(&outcomes);
        log::info!(
            "✅ AOT retrieval completed: {} retrieved, {} failed, {} rejected",
            stats.retrieved,
            stats.failed,
            stats.rejected
        );
        Ok(product)
    }

    fn assemble(&self, outcomes: &[BlockOutcome], rows: usize, cols: usize) -> AotProduct {
        let no_data = self.setup.output_no_data;
        let mut aot = Array2::from_elem((rows, cols), no_data);
        let mut aot_uncertainty = Array2::from_elem((rows, cols), no_data);
        let mut fit_residual = self.setup.diagnostics.then(|| Array2::from_elem((rows, cols), no_data));
        let mut curvature = self.setup.diagnostics.then(|| Array2::from_elem((rows, cols), no_data));

        for (index, outcome) in outcomes.iter().enumerate() {
            let Some(result) = outcome.retrieved() else {
                continue;
            };
            let pos = [index / cols, index % cols];
            aot[pos] = result.aot as f32;
            aot_uncertainty[pos] = result.aot_uncertainty as f32;
            if let Some(raster) = fit_residual.as_mut() {
                raster[pos] = result.fit_residual as f32;
            }
            if let Some(raster) = curvature.as_mut() {
                raster[pos] = result.curvature as f32;
            }
        }

        AotProduct {
            aot,
            aot_uncertainty,
            fit_residual,
            curvature,
        }
    }
}

/// Tally block outcomes
pub fn statistics(outcomes: &[BlockOutcome]) -> SceneStatistics {
    outcomes.iter().fold(SceneStatistics::default(), |mut acc, outcome| {
        match outcome {
            BlockOutcome::Retrieved(r) if r.failed => acc.failed += 1,
            BlockOutcome::Retrieved(_) => acc.retrieved += 1,
            BlockOutcome::Rejected(_) => acc.rejected += 1,
        }
        acc
    })
}
