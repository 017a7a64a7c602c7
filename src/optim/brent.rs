/// Maximum number of Brent iterations
const ITMAX: usize = 100;
/// Golden-section ratio (3 - sqrt(5)) / 2
const CGOLD: f64 = 0.381_966_0;
/// Protects against a zero fractional tolerance at x = 0
const ZEPS: f64 = 1.0e-10;

/// Result of a 1-D minimisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrentMinimum {
    /// Abscissa of the minimum
    pub x: f64,
    /// Function value at `x`
    pub fx: f64,
    pub iterations: usize,
    /// False when `ITMAX` was reached before the tolerance was met
    pub converged: bool,
}

/// Minimise `f` on the interval spanned by `ax` and `cx`, starting at `bx`.
///
/// Brent's method: parabolic interpolation through the three best points
/// when it is well behaved, golden-section steps otherwise. `tol` is the
/// fractional precision of the abscissa.
///
/// When a trial point ties with the current best, the smaller abscissa is
/// kept; a flat function therefore converges to the lower end of the
/// interval.
pub fn brent<F>(ax: f64, bx: f64, cx: f64, tol: f64, mut f: F) -> BrentMinimum
where
    F: FnMut(f64) -> f64,
{
    let mut a = ax.min(cx);
    let mut b = ax.max(cx);

    let mut x = bx;
    let mut w = bx;
    let mut v = bx;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;

    // d: step taken on the last iteration, e: step before that
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iter in 1..=ITMAX {
        let xm = 0.5 * (a + b);
        let tol1 = tol * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;

        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return BrentMinimum {
                x,
                fx,
                iterations: iter,
                converged: true,
            };
        }

        let golden_step = |x: f64| if x >= xm { a - x } else { b - x };

        if e.abs() > tol1 {
            // Trial parabolic fit
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let etemp = e;
            e = d;

            if p.abs() >= (0.5 * q * etemp).abs() || p <= q * (a - x) || p >= q * (b - x) {
                e = golden_step(x);
                d = CGOLD * e;
            } else {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
            }
        } else {
            e = golden_step(x);
            d = CGOLD * e;
        }

        let u = if d.abs() >= tol1 { x + d } else { x + tol1.copysign(d) };
        let fu = f(u);

        if fu < fx || (fu == fx && u < x) {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    log::debug!("brent: no convergence after {} iterations (x = {}, f = {})", ITMAX, x, fx);
    BrentMinimum {
        x,
        fx,
        iterations: ITMAX,
        converged: false,
    }
}
