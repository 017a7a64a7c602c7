use super::cost::AotCostFunction;
use crate::optim::brent;
use crate::types::RetrievalResult;
use nalgebra::{Matrix3, Vector3};

/// Lower end of the AOT search interval
pub const MIN_AOT: f64 = 0.001;
/// Retrievals at or below this AOT collapsed to the lower bound
pub const FAILURE_AOT: f64 = 0.01;
/// Fractional tolerance of the AOT search
pub const AOT_TOLERANCE: f64 = 5.0e-6;
/// Curvature substituted for a non-convex three-point fit
pub const CURVATURE_FLOOR: f64 = 1.0e-4;
/// Upper bound assumed when evaluating at a prescribed AOT
const PRESCRIBED_MAX_AOT: f64 = 2.0;

/// Progress of one block's retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalState {
    NotStarted,
    Optimizing,
    Succeeded,
    Failed,
}

/// Quadratic coefficient `a` of the parabola `a·x² + b·x + c` through three
/// points. Returns 0 when the abscissas do not determine a parabola.
pub fn quadratic_coefficient(x: [f64; 3], y: [f64; 3]) -> f64 {
    let design = Matrix3::new(
        x[0] * x[0], x[0], 1.0,
        x[1] * x[1], x[1], 1.0,
        x[2] * x[2], x[2], 1.0,
    );
    let rhs = Vector3::new(y[0], y[1], y[2]);
    match design.lu().solve(&rhs) {
        Some(coeffs) if coeffs[0].is_finite() => coeffs[0],
        _ => 0.0,
    }
}

/// AOT uncertainty from the fit residual and the cost curvature.
///
/// Curvatures below `CURVATURE_FLOOR`, including flat and concave fits, are
/// raised to the floor.
pub fn aot_uncertainty(residual: f64, curvature: f64) -> f64 {
    let a = curvature.max(CURVATURE_FLOOR);
    (residual.max(0.0) / 0.8 * 2.0 / a).sqrt() + 0.03
}

/// Retrieval of one block: outer AOT search, classification and
/// curvature-based uncertainty
pub struct PointRetrieval<'a> {
    cost: AotCostFunction<'a>,
    state: RetrievalState,
}

impl<'a> PointRetrieval<'a> {
    pub fn new(cost: AotCostFunction<'a>) -> Self {
        Self {
            cost,
            state: RetrievalState::NotStarted,
        }
    }

    pub fn state(&self) -> RetrievalState {
        self.state
    }

    pub fn cost_function(&mut self) -> &mut AotCostFunction<'a> {
        &mut self.cost
    }

    /// Run with the AOT bound of the ensemble's darkest member
    pub fn retrieve(&mut self) -> RetrievalResult {
        let max_aot = self.cost.max_aot();
        self.run(max_aot)
    }

    /// Search `[MIN_AOT, max_aot]` for the AOT minimising the cost
    pub fn run(&mut self, max_aot: f64) -> RetrievalResult {
        self.state = RetrievalState::Optimizing;

        let cost = &mut self.cost;
        let min = brent(MIN_AOT, 0.5 * max_aot, max_aot, AOT_TOLERANCE, |aot| cost.evaluate(aot));
        let failed = min.x <= FAILURE_AOT;
        let curvature = self.curvature(min.x, min.fx, max_aot);

        self.state = if failed {
            RetrievalState::Failed
        } else {
            RetrievalState::Succeeded
        };
        log::trace!(
            "AOT search: x = {:.5}, f = {:.3e}, a = {:.3e}, {} cost evaluations{}",
            min.x,
            min.fx,
            curvature,
            self.cost.evaluations(),
            if failed { " (failed)" } else { "" }
        );

        RetrievalResult {
            aot: min.x,
            aot_uncertainty: aot_uncertainty(min.fx, curvature),
            failed,
            fit_residual: min.fx,
            curvature,
        }
    }

    /// Cost and uncertainty at a prescribed AOT; never classified as failed
    pub fn evaluate_at(&mut self, aot: f64) -> RetrievalResult {
        self.state = RetrievalState::Optimizing;
        let residual = self.cost.evaluate(aot);
        let curvature = self.curvature(aot, residual, PRESCRIBED_MAX_AOT);
        self.state = RetrievalState::Succeeded;

        RetrievalResult {
            aot,
            aot_uncertainty: aot_uncertainty(residual, curvature),
            failed: false,
            fit_residual: residual,
            curvature,
        }
    }

    /// Quadratic coefficient of the parabola through the cost at
    /// `0.33·max`, the optimum and `0.66·max`
    fn curvature(&mut self, opt_aot: f64, opt_residual: f64, max_aot: f64) -> f64 {
        let low = 0.33 * max_aot;
        let high = 0.66 * max_aot;
        let f_low = self.cost.evaluate(low);
        let f_high = self.cost.evaluate(high);
        quadratic_coefficient([low, opt_aot, high], [f_low, opt_residual, f_high])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quadratic_coefficient() {
        let f = |x: f64| 3.0 * x * x - 2.0 * x + 0.5;
        let x = [0.2, 0.45, 0.8];
        assert_abs_diff_eq!(quadratic_coefficient(x, x.map(f)), 3.0, epsilon = 1e-9);

        let g = |x: f64| -0.5 * x * x + x;
        assert_abs_diff_eq!(quadratic_coefficient(x, x.map(g)), -0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_system_gives_zero() {
        assert_eq!(quadratic_coefficient([0.33, 0.33, 0.66], [1.0, 1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_uncertainty_floor() {
        // Negative or zero curvature uses the floor, never a negative root
        let floored = aot_uncertainty(0.01, -5.0);
        assert_abs_diff_eq!(floored, (0.01f64 / 0.8 * 2.0 / 1e-4).sqrt() + 0.03, epsilon = 1e-12);
        assert_eq!(aot_uncertainty(0.01, 0.0), floored);
        assert!(floored.is_finite());

        // Small positive curvature is floored too
        assert_abs_diff_eq!(aot_uncertainty(0.01, 1e-6), floored, epsilon = 1e-12);
        assert_abs_diff_eq!(aot_uncertainty(0.01, 1e-6), 15.8414, epsilon = 1e-4);
        assert_abs_diff_eq!(aot_uncertainty(0.01, CURVATURE_FLOOR), floored);

        assert_abs_diff_eq!(aot_uncertainty(0.0, 2.0), 0.03);
        assert_abs_diff_eq!(aot_uncertainty(0.4, 2.0), 0.5f64.sqrt() + 0.03, epsilon = 1e-12);
    }
}
