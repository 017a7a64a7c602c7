use super::pixel::{PixelRecord, SurfaceEstimate};
use super::surface_model::SurfaceModel;
use crate::lut::{AerosolLut, FALLBACK_MAX_AOT};
use crate::optim::{powell, PowellMinimum};
use crate::types::View;

/// Surface reflectance floor below which the inversion is penalised
pub const SDR_LOWER_LIMIT: f64 = 5.0e-6;
/// Weight of the negative-reflectance penalty
pub const NEGATIVE_SDR_PENALTY: f64 = 1000.0;
/// Added to a non-zero penalty so the cost never flattens out
const PENALTY_EPSILON: f64 = 1.0e-8;
/// Relative tolerance of the surface-parameter fit
pub const SURFACE_FIT_FTOL: f64 = 2.0e-3;

/// Penalty for atmospheric over-correction.
///
/// For every channel whose nadir reflectance is below [`SDR_LOWER_LIMIT`],
/// the squared distance of both views to the floor is added.
pub fn negative_reflectance_penalty(estimate: &SurfaceEstimate) -> f64 {
    let nadir = estimate.reflectance(View::Nadir);
    let mut penalty = 0.0;
    for view in View::ALL {
        let sdr = estimate.reflectance(view);
        for (ch, &nadir_sdr) in nadir.iter().enumerate() {
            if nadir_sdr < SDR_LOWER_LIMIT {
                penalty += (sdr[ch] - SDR_LOWER_LIMIT).powi(2) * NEGATIVE_SDR_PENALTY;
            }
        }
    }
    penalty
}

/// Surface fit of one ensemble member at a fixed AOT
#[derive(Debug, Clone, PartialEq)]
pub struct MemberFit {
    /// LUT-derived surface reflectance and diffuse fraction
    pub surface: SurfaceEstimate,
    /// Fitted model parameters, `None` when the penalty short-circuited the fit
    pub parameters: Option<Vec<f64>>,
    /// Model reflectance at the fitted parameters `[view][channel]`
    pub modelled: Option<[Vec<f64>; 2]>,
    pub cost: f64,
}

enum SurfaceFit {
    Penalised(f64),
    Fitted(PowellMinimum),
}

impl SurfaceFit {
    fn cost(&self) -> f64 {
        match self {
            SurfaceFit::Penalised(cost) => *cost,
            SurfaceFit::Fitted(min) => min.fmin,
        }
    }
}

/// Scalar cost of a trial AOT for one ensemble.
///
/// Holds its own LUT scratch, so one instance must serve one block at a
/// time. The LUT and surface model are shared read-only.
pub struct AotCostFunction<'a> {
    ensemble: &'a [PixelRecord],
    lut: &'a dyn AerosolLut,
    model: &'a dyn SurfaceModel,
    scratch: SurfaceEstimate,
    evaluations: usize,
}

impl<'a> AotCostFunction<'a> {
    pub fn new(ensemble: &'a [PixelRecord], lut: &'a dyn AerosolLut, model: &'a dyn SurfaceModel) -> Self {
        let n_channels = ensemble.first().map(PixelRecord::n_channels).unwrap_or(0);
        Self {
            ensemble,
            lut,
            model,
            scratch: SurfaceEstimate::new(n_channels),
            evaluations: 0,
        }
    }

    pub fn ensemble(&self) -> &[PixelRecord] {
        self.ensemble
    }

    /// Number of `evaluate` calls so far
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Total cost at `aot`: sum of the member costs
    pub fn evaluate(&mut self, aot: f64) -> f64 {
        self.evaluations += 1;
        let ensemble = self.ensemble;
        ensemble.iter().map(|member| self.member_cost(member, aot)).sum()
    }

    fn member_cost(&mut self, member: &PixelRecord, aot: f64) -> f64 {
        self.fit_member(member, aot).cost()
    }

    /// Invert `member` into the scratch estimate and fit the surface model
    /// unless the inversion is penalised
    fn fit_member(&mut self, member: &PixelRecord, aot: f64) -> SurfaceFit {
        self.lut.invert(member, aot, &mut self.scratch);
        let penalty = negative_reflectance_penalty(&self.scratch);
        if penalty > 0.0 {
            return SurfaceFit::Penalised(penalty + PENALTY_EPSILON);
        }

        let target = &self.scratch;
        let model = self.model;
        SurfaceFit::Fitted(powell(&model.initial_parameters(), SURFACE_FIT_FTOL, |p| {
            model.residual(p, target)
        }))
    }

    /// Per-member surface fits at `aot`, for diagnostics
    pub fn surface_fit(&mut self, aot: f64) -> Vec<MemberFit> {
        let ensemble = self.ensemble;
        ensemble
            .iter()
            .map(|member| {
                let fit = self.fit_member(member, aot);
                let surface = self.scratch.clone();
                match fit {
                    SurfaceFit::Penalised(cost) => MemberFit {
                        surface,
                        parameters: None,
                        modelled: None,
                        cost,
                    },
                    SurfaceFit::Fitted(min) => {
                        let modelled = self.model.modelled_reflectance(&min.p, &surface);
                        MemberFit {
                            surface,
                            parameters: Some(min.p),
                            modelled: Some(modelled),
                            cost: min.fmin,
                        }
                    }
                }
            })
            .collect()
    }

    /// Upper AOT bound, taken from the member with the lowest nadir TOA in
    /// channel 0
    pub fn max_aot(&self) -> f64 {
        let darkest = self.ensemble.iter().fold(None::<&PixelRecord>, |best, m| match best {
            Some(b) if b.toa(View::Nadir)[0] <= m.toa(View::Nadir)[0] => Some(b),
            _ => Some(m),
        });
        darkest
            .and_then(|m| self.lut.max_aot(m))
            .unwrap_or(FALLBACK_MAX_AOT)
    }
}
