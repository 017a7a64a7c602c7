use super::bracket::bracket_minimum;
use super::brent::brent;
use ndarray::Array2;

/// Maximum number of Powell iterations
const ITMAX: usize = 1000;
/// Keeps the relative convergence test meaningful when the minimum is 0
const TINY: f64 = 1.0e-25;
/// Fractional tolerance of the line minimisation
const LINMIN_TOL: f64 = 2.0e-4;

/// Result of a multivariate minimisation
#[derive(Debug, Clone, PartialEq)]
pub struct PowellMinimum {
    /// Location of the minimum
    pub p: Vec<f64>,
    /// Function value at `p`
    pub fmin: f64,
    pub iterations: usize,
    /// False when `ITMAX` was reached; `p`/`fmin` then hold the best point found
    pub converged: bool,
}

/// Minimise `f` starting at `start` with Powell's direction-set method.
///
/// The initial directions are the unit vectors. An iteration ends when the
/// decrease of `f` falls below the fractional tolerance `ftol`.
pub fn powell<F>(start: &[f64], ftol: f64, mut f: F) -> PowellMinimum
where
    F: FnMut(&[f64]) -> f64,
{
    let n = start.len();
    let mut p = start.to_vec();
    let mut fret = f(&p);
    if n == 0 {
        return PowellMinimum {
            p,
            fmin: fret,
            iterations: 0,
            converged: true,
        };
    }

    // Direction set, one direction per column
    let mut xi = Array2::<f64>::eye(n);
    let mut pt = p.clone();
    let mut ptt = vec![0.0; n];
    let mut xit = vec![0.0; n];

    for iter in 1..=ITMAX {
        let fp = fret;
        let mut ibig = 0;
        let mut del = 0.0;

        for i in 0..n {
            xit.iter_mut().zip(xi.column(i)).for_each(|(t, &d)| *t = d);
            let fptt = fret;
            fret = line_minimize(&mut p, &mut xit, &mut f);
            if fptt - fret > del {
                del = fptt - fret;
                ibig = i;
            }
        }

        if 2.0 * (fp - fret).abs() <= ftol * (fp.abs() + fret.abs()) + TINY {
            return PowellMinimum {
                p,
                fmin: fret,
                iterations: iter,
                converged: true,
            };
        }

        // Extrapolated point and average direction moved
        for j in 0..n {
            ptt[j] = 2.0 * p[j] - pt[j];
            xit[j] = p[j] - pt[j];
            pt[j] = p[j];
        }

        let fptt = f(&ptt);
        if fptt < fp {
            let t = 2.0 * (fp - 2.0 * fret + fptt) * (fp - fret - del).powi(2)
                - del * (fp - fptt).powi(2);
            if t < 0.0 {
                fret = line_minimize(&mut p, &mut xit, &mut f);
                for j in 0..n {
                    xi[[j, ibig]] = xi[[j, n - 1]];
                    xi[[j, n - 1]] = xit[j];
                }
            }
        }
    }

    log::debug!("powell: no convergence after {} iterations (f = {})", ITMAX, fret);
    PowellMinimum {
        p,
        fmin: fret,
        iterations: ITMAX,
        converged: false,
    }
}

/// Minimise `f` along `direction` from `p`. On return `p` holds the
/// minimum and `direction` the actual displacement.
fn line_minimize<F>(p: &mut [f64], direction: &mut [f64], f: &mut F) -> f64
where
    F: FnMut(&[f64]) -> f64,
{
    let (alpha, fmin) = {
        let origin: &[f64] = p;
        let dir: &[f64] = direction;
        let mut trial = vec![0.0; origin.len()];
        let mut along = |alpha: f64| {
            for ((t, &o), &d) in trial.iter_mut().zip(origin).zip(dir) {
                *t = o + alpha * d;
            }
            f(&trial)
        };

        let br = bracket_minimum(0.0, 1.0, &mut along);
        let min = brent(br.ax, br.bx, br.cx, LINMIN_TOL, &mut along);
        (min.x, min.fx)
    };

    for (pj, dj) in p.iter_mut().zip(direction.iter_mut()) {
        *dj *= alpha;
        *pj += *dj;
    }
    fmin
}
