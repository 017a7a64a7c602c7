use super::pixel::SurfaceEstimate;
use crate::io::spectra::ChannelSpectra;
use crate::types::{AotError, AotResult, View};
use serde::{Deserialize, Serialize};

/// Weight of the quadratic box-constraint penalties
const CONSTRAINT_PENALTY: f64 = 1000.0;

/// Surface reflectance model fitted by the inner optimiser
pub trait SurfaceModel: Send + Sync + std::fmt::Debug {
    /// Starting point of the fit
    fn initial_parameters(&self) -> Vec<f64>;

    /// Weighted squared misfit between the model at `p` and the LUT-derived
    /// surface reflectance in `target`, plus constraint penalties
    fn residual(&self, p: &[f64], target: &SurfaceEstimate) -> f64;

    /// Model reflectance at `p`, `[view][channel]`
    fn modelled_reflectance(&self, p: &[f64], target: &SurfaceEstimate) -> [Vec<f64>; 2];
}

/// Which surface model a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceModelKind {
    /// Multi-view model with one spectral endmember and view-dependent anisotropy
    Angular,
    /// Soil/vegetation mixture of reference spectra
    Spectral,
}

impl std::fmt::Display for SurfaceModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceModelKind::Angular => write!(f, "angular"),
            SurfaceModelKind::Spectral => write!(f, "spectral"),
        }
    }
}

/// Scale fit weights so that they sum to one
pub fn normalize_weights(weights: &[f64]) -> AotResult<Vec<f64>> {
    if weights.iter().any(|&w| !w.is_finite() || w < 0.0) {
        return Err(AotError::Config("fit weights must be finite and non-negative".to_string()));
    }
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0) {
        return Err(AotError::Config("fit weights sum to zero".to_string()));
    }
    Ok(weights.iter().map(|w| w / sum).collect())
}

fn lower_bound_penalty(x: f64, bound: f64) -> f64 {
    if x < bound {
        (bound - x).powi(2) * CONSTRAINT_PENALTY
    } else {
        0.0
    }
}

fn upper_bound_penalty(x: f64, bound: f64) -> f64 {
    if x > bound {
        (bound - x).powi(2) * CONSTRAINT_PENALTY
    } else {
        0.0
    }
}

/// Angular (dual-view) surface model.
///
/// Parameters: one total-reflectance scale per channel followed by the nadir
/// and forward anisotropy factors. Direct and diffuse parts per channel and
/// view:
///
/// ```text
/// direct  = (1 - DF·d) · p[n + view] · p[ch]
/// g       = (1 - γ) · p[ch]
/// diffuse = (DF·d + g·(1 - DF·d)) · γ · p[ch] / (1 - g)
/// ```
///
/// where `d` is the LUT diffuse fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct AngularModel {
    weights: Vec<f64>,
}

impl AngularModel {
    /// Fraction of diffuse light that sees the anisotropic surface
    pub const DF: f64 = 0.3;
    pub const GAMMA: f64 = 0.35;

    const MIN_CHANNEL_SCALE: f64 = 0.01;
    const NADIR_FACTOR_RANGE: (f64, f64) = (0.2, 0.6);
    const MIN_FORWARD_FACTOR: f64 = 0.2;

    /// `weights` are taken as given; normalise them beforehand.
    pub fn new(weights: Vec<f64>) -> AotResult<Self> {
        if weights.len() < 2 {
            return Err(AotError::Config(format!(
                "angular model needs at least 2 channels, got {}",
                weights.len()
            )));
        }
        Ok(Self { weights })
    }

    pub fn n_channels(&self) -> usize {
        self.weights.len()
    }

    fn model_value(&self, p: &[f64], channel: usize, view: usize, diffuse_fraction: f64) -> f64 {
        let n = self.n_channels();
        let scale = p[channel];
        let df = Self::DF * diffuse_fraction;
        let direct = (1.0 - df) * p[n + view] * scale;
        let g = (1.0 - Self::GAMMA) * scale;
        let diffuse = (df + g * (1.0 - df)) * Self::GAMMA * scale / (1.0 - g);
        direct + diffuse
    }
}

impl SurfaceModel for AngularModel {
    fn initial_parameters(&self) -> Vec<f64> {
        let mut p = vec![0.1; self.n_channels()];
        p.extend_from_slice(&[0.5, 0.3]);
        p
    }

    fn residual(&self, p: &[f64], target: &SurfaceEstimate) -> f64 {
        let n = self.n_channels();
        let mut resid = 0.0;
        for (ch, &w) in self.weights.iter().enumerate() {
            for view in View::ALL {
                let v = view.index();
                let model = self.model_value(p, ch, v, target.diffuse_fraction[v][ch]);
                let k = target.reflectance[v][ch] - model;
                resid += w * k * k;
            }
        }

        let (lo, hi) = Self::NADIR_FACTOR_RANGE;
        resid
            + lower_bound_penalty(p[0], Self::MIN_CHANNEL_SCALE)
            + lower_bound_penalty(p[1], Self::MIN_CHANNEL_SCALE)
            + lower_bound_penalty(p[n], lo)
            + upper_bound_penalty(p[n], hi)
            + lower_bound_penalty(p[n + 1], Self::MIN_FORWARD_FACTOR)
    }

    fn modelled_reflectance(&self, p: &[f64], target: &SurfaceEstimate) -> [Vec<f64>; 2] {
        View::ALL.map(|view| {
            let v = view.index();
            (0..self.n_channels())
                .map(|ch| self.model_value(p, ch, v, target.diffuse_fraction[v][ch]))
                .collect()
        })
    }
}

/// Spectral mixture model: `p[0]·vegetation + p[1]·soil`, fitted against
/// the nadir view
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralModel {
    weights: Vec<f64>,
    spectra: ChannelSpectra,
}

impl SpectralModel {
    pub fn new(weights: Vec<f64>, spectra: ChannelSpectra) -> AotResult<Self> {
        if spectra.soil.len() != weights.len() || spectra.vegetation.len() != weights.len() {
            return Err(AotError::Config(format!(
                "reference spectra cover {} channels, run has {}",
                spectra.soil.len(),
                weights.len()
            )));
        }
        Ok(Self { weights, spectra })
    }

    pub fn spectra(&self) -> &ChannelSpectra {
        &self.spectra
    }

    fn model_value(&self, p: &[f64], channel: usize) -> f64 {
        p[0] * self.spectra.vegetation[channel] + p[1] * self.spectra.soil[channel]
    }
}

impl SurfaceModel for SpectralModel {
    fn initial_parameters(&self) -> Vec<f64> {
        vec![0.9, 0.1]
    }

    fn residual(&self, p: &[f64], target: &SurfaceEstimate) -> f64 {
        let sdr = target.reflectance(View::Nadir);
        let resid: f64 = self
            .weights
            .iter()
            .enumerate()
            .map(|(ch, &w)| {
                let k = sdr[ch] - self.model_value(p, ch);
                w * k * k
            })
            .sum();

        resid + lower_bound_penalty(p[0], 0.0) + lower_bound_penalty(p[1], 0.0)
    }

    fn modelled_reflectance(&self, p: &[f64], _target: &SurfaceEstimate) -> [Vec<f64>; 2] {
        let spectrum: Vec<f64> = (0..self.weights.len()).map(|ch| self.model_value(p, ch)).collect();
        [spectrum.clone(), spectrum]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::powell;
    use approx::assert_abs_diff_eq;

    fn estimate(reflectance: [Vec<f64>; 2], diffuse: [Vec<f64>; 2]) -> SurfaceEstimate {
        SurfaceEstimate {
            reflectance,
            diffuse_fraction: diffuse,
        }
    }

    #[test]
    fn test_normalize_weights() {
        let w = normalize_weights(&[1.5, 1.0, 1.0, 1.55]).unwrap();
        assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[0], 1.5 / 5.05, epsilon = 1e-12);
        assert!(normalize_weights(&[0.0, 0.0]).is_err());
        assert!(normalize_weights(&[1.0, -0.5]).is_err());
    }

    #[test]
    fn test_angular_initial_vector() {
        let model = AngularModel::new(vec![0.25; 4]).unwrap();
        assert_eq!(model.initial_parameters(), vec![0.1, 0.1, 0.1, 0.1, 0.5, 0.3]);
        assert!(AngularModel::new(vec![1.0]).is_err());
    }

    #[test]
    fn test_angular_residual_zero_at_model() {
        let model = AngularModel::new(vec![0.25; 4]).unwrap();
        let p = [0.05, 0.08, 0.2, 0.3, 0.4, 0.35];
        let diffuse = [vec![0.2, 0.3, 0.25, 0.1], vec![0.3, 0.35, 0.3, 0.15]];
        let mut target = estimate([vec![0.0; 4], vec![0.0; 4]], diffuse);
        target.reflectance = model.modelled_reflectance(&p, &target);
        assert_abs_diff_eq!(model.residual(&p, &target), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_angular_model_value() {
        let model = AngularModel::new(vec![0.5, 0.5]).unwrap();
        let p = [0.2, 0.1, 0.5, 0.3];
        let target = estimate([vec![0.0; 2], vec![0.0; 2]], [vec![0.4, 0.4], vec![0.4, 0.4]]);
        let m = model.modelled_reflectance(&p, &target);
        let df = 0.3 * 0.4;
        let g = 0.65 * 0.2;
        let expected = (1.0 - df) * 0.5 * 0.2 + (df + g * (1.0 - df)) * 0.35 * 0.2 / (1.0 - g);
        assert_abs_diff_eq!(m[0][0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_angular_constraint_penalties() {
        let model = AngularModel::new(vec![0.25; 4]).unwrap();
        let target = estimate([vec![0.1; 4], vec![0.1; 4]], [vec![0.2; 4], vec![0.2; 4]]);
        let inside = [0.1, 0.1, 0.1, 0.1, 0.4, 0.3];
        let base = model.residual(&inside, &target);

        let mut p = inside;
        p[4] = 0.7;
        assert!(model.residual(&p, &target) - base > 9.9);

        let mut p = inside;
        p[0] = -0.09;
        let penalised = model.residual(&p, &target);
        assert!(penalised >= 1000.0 * 0.1f64.powi(2));

        // Channel 2 and 3 scales are unconstrained
        let mut p = inside;
        p[2] = -0.09;
        assert!(model.residual(&p, &target) < 1.0);
    }

    #[test]
    fn test_spectral_fit_recovers_fractions() {
        let spectra = ChannelSpectra {
            soil: vec![0.1, 0.15, 0.2, 0.25],
            vegetation: vec![0.05, 0.08, 0.4, 0.3],
        };
        let model = SpectralModel::new(normalize_weights(&[1.0, 1.0, 0.5, 0.1]).unwrap(), spectra).unwrap();
        let truth = [0.6, 0.3];
        let mut target = SurfaceEstimate::new(4);
        let m = model.modelled_reflectance(&truth, &target);
        target.reflectance = m;

        let fit = powell(&model.initial_parameters(), 1e-10, |p| model.residual(p, &target));
        assert!(fit.fmin < 1e-10);
        assert_abs_diff_eq!(fit.p[0], 0.6, epsilon = 1e-3);
        assert_abs_diff_eq!(fit.p[1], 0.3, epsilon = 1e-3);
    }

    #[test]
    fn test_spectral_nonnegativity_penalty() {
        let spectra = ChannelSpectra {
            soil: vec![0.1, 0.2],
            vegetation: vec![0.3, 0.1],
        };
        let model = SpectralModel::new(vec![0.5, 0.5], spectra).unwrap();
        let target = SurfaceEstimate::new(2);
        assert_abs_diff_eq!(model.residual(&[0.0, 0.0], &target), 0.0);
        let r = model.residual(&[-0.1, 0.0], &target);
        assert!(r >= 1000.0 * 0.01);
    }

    #[test]
    fn test_spectral_channel_mismatch() {
        let spectra = ChannelSpectra {
            soil: vec![0.1],
            vegetation: vec![0.3],
        };
        assert!(matches!(SpectralModel::new(vec![0.5, 0.5], spectra), Err(AotError::Config(_))));
    }
}
