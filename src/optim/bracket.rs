/// Default ratio by which successive intervals are magnified
const GOLD: f64 = 1.618_034;
/// Maximum magnification allowed for a parabolic-fit step
const GLIMIT: f64 = 100.0;
/// Prevents division by zero in the parabolic extrapolation
const TINY: f64 = 1.0e-20;
/// Guard against functions that keep decreasing forever
const MAX_STEPS: usize = 500;

/// Three abscissas with `fb <= fa` and `fb <= fc`, `bx` between `ax` and `cx`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub ax: f64,
    pub bx: f64,
    pub cx: f64,
    pub fa: f64,
    pub fb: f64,
    pub fc: f64,
}

/// Search downhill from the distinct points `ax`, `bx` until a minimum of
/// `f` is bracketed.
pub fn bracket_minimum<F>(ax: f64, bx: f64, mut f: F) -> Bracket
where
    F: FnMut(f64) -> f64,
{
    let mut ax = ax;
    let mut bx = bx;
    let mut fa = f(ax);
    let mut fb = f(bx);
    if fb > fa {
        std::mem::swap(&mut ax, &mut bx);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut cx = bx + GOLD * (bx - ax);
    let mut fc = f(cx);

    let mut steps = 0;
    while fb > fc {
        steps += 1;
        if steps > MAX_STEPS || !fc.is_finite() {
            log::trace!("bracket: giving up after {} steps at x = {}", steps, cx);
            break;
        }

        // Parabolic extrapolation from a, b, c
        let r = (bx - ax) * (fb - fc);
        let q = (bx - cx) * (fb - fa);
        let denom = (q - r).abs().max(TINY).copysign(q - r);
        let mut u = bx - ((bx - cx) * q - (bx - ax) * r) / (2.0 * denom);
        let ulim = bx + GLIMIT * (cx - bx);
        let mut fu;

        if (bx - u) * (u - cx) > 0.0 {
            // u between b and c
            fu = f(u);
            if fu < fc {
                return Bracket { ax: bx, bx: u, cx, fa: fb, fb: fu, fc };
            } else if fu > fb {
                return Bracket { ax, bx, cx: u, fa, fb, fc: fu };
            }
            u = cx + GOLD * (cx - bx);
            fu = f(u);
        } else if (cx - u) * (u - ulim) > 0.0 {
            // u between c and its allowed limit
            fu = f(u);
            if fu < fc {
                bx = cx;
                cx = u;
                u = cx + GOLD * (cx - bx);
                fb = fc;
                fc = fu;
                fu = f(u);
            }
        } else if (u - ulim) * (ulim - cx) >= 0.0 {
            u = ulim;
            fu = f(u);
        } else {
            u = cx + GOLD * (cx - bx);
            fu = f(u);
        }

        ax = bx;
        bx = cx;
        cx = u;
        fa = fb;
        fb = fc;
        fc = fu;
    }

    Bracket { ax, bx, cx, fa, fb, fc }
}
