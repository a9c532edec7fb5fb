//! Numerical integration for component evaluation.
//!
//! Two tools live here: an adaptive Simpson quadrature used for
//! line-of-sight integrals through 3D components, and a `k x k` sub-pixel
//! averaging helper used by the model builder near steep intensity peaks.
//!
//! The quadrature reports non-convergence instead of failing: the best
//! estimate is always returned and the caller decides whether to warn.

/// Tolerances and subdivision budget for adaptive quadrature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureSpec {
    /// Relative tolerance on the whole-interval result.
    pub rel_tol: f64,
    /// Absolute tolerance floor, for integrals near zero.
    pub abs_tol: f64,
    /// Maximum number of interval subdivisions before giving up.
    pub max_intervals: usize,
}

impl Default for QuadratureSpec {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-8,
            max_intervals: 1000,
        }
    }
}

/// Result of one adaptive integration.
#[derive(Debug, Clone, Copy)]
pub struct Quadrature {
    pub value: f64,
    /// False when the subdivision budget ran out before the tolerance was met.
    pub converged: bool,
    /// Number of subdivisions performed.
    pub intervals: usize,
}

#[inline]
fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

struct Segment {
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    estimate: f64,
    tol: f64,
    depth: u32,
}

// Initial uniform split of the interval. Midpoint sampling on these seed
// segments is what lets the subdivision find a peak that is narrow
// compared to the full interval.
const SEED_SEGMENTS: usize = 8;
const MAX_DEPTH: u32 = 48;

/// Adaptive Simpson integration of `f` over `[a, b]`.
///
/// Segments are refined until the local Richardson error estimate meets the
/// per-segment share of the tolerance, the recursion depth limit is hit, or
/// the subdivision budget is exhausted (in which case the partial refinement
/// is summed and `converged` is false).
pub fn adaptive_simpson<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64, spec: &QuadratureSpec) -> Quadrature {
    if !(b > a) {
        return Quadrature {
            value: 0.0,
            converged: true,
            intervals: 0,
        };
    }

    // Seed pass: uniform segments give both a scale estimate for the
    // relative tolerance and sample density near the interval center.
    let step = (b - a) / SEED_SEGMENTS as f64;
    let mut seeds = Vec::with_capacity(SEED_SEGMENTS);
    let mut coarse_total = 0.0;
    for k in 0..SEED_SEGMENTS {
        let sa = a + k as f64 * step;
        let sb = if k + 1 == SEED_SEGMENTS { b } else { sa + step };
        let sm = 0.5 * (sa + sb);
        let (fa, fm, fb) = (f(sa), f(sm), f(sb));
        let estimate = simpson(sa, sb, fa, fm, fb);
        coarse_total += estimate;
        seeds.push((sa, sb, fa, fm, fb, estimate));
    }

    let tol_total = spec.abs_tol.max(spec.rel_tol * coarse_total.abs());
    let tol_seg = tol_total / SEED_SEGMENTS as f64;

    let mut stack: Vec<Segment> = seeds
        .into_iter()
        .map(|(sa, sb, fa, fm, fb, estimate)| Segment {
            a: sa,
            b: sb,
            fa,
            fm,
            fb,
            estimate,
            tol: tol_seg,
            depth: 0,
        })
        .collect();

    let mut total = 0.0;
    let mut intervals = 0usize;
    let mut converged = true;

    while let Some(seg) = stack.pop() {
        if intervals >= spec.max_intervals {
            // Budget exhausted: fold in the unrefined estimates.
            converged = false;
            total += seg.estimate;
            for rest in stack.drain(..) {
                total += rest.estimate;
            }
            break;
        }
        intervals += 1;

        let m = 0.5 * (seg.a + seg.b);
        let lm = 0.5 * (seg.a + m);
        let rm = 0.5 * (m + seg.b);
        let flm = f(lm);
        let frm = f(rm);
        let left = simpson(seg.a, m, seg.fa, flm, seg.fm);
        let right = simpson(m, seg.b, seg.fm, frm, seg.fb);
        let err = left + right - seg.estimate;

        if err.abs() <= 15.0 * seg.tol || seg.depth >= MAX_DEPTH {
            // Richardson extrapolation of the two-panel result
            total += left + right + err / 15.0;
        } else {
            let half_tol = 0.5 * seg.tol;
            stack.push(Segment {
                a: seg.a,
                b: m,
                fa: seg.fa,
                fm: flm,
                fb: seg.fm,
                estimate: left,
                tol: half_tol,
                depth: seg.depth + 1,
            });
            stack.push(Segment {
                a: m,
                b: seg.b,
                fa: seg.fm,
                fm: frm,
                fb: seg.fb,
                estimate: right,
                tol: half_tol,
                depth: seg.depth + 1,
            });
        }
    }

    Quadrature {
        value: total,
        converged,
        intervals,
    }
}

/// Average `f` over a unit pixel centered at `(x, y)` using a `k x k` grid
/// of sub-sample centers. `k <= 1` degenerates to a single center sample.
pub fn subpixel_average<F: Fn(f64, f64) -> f64>(f: F, x: f64, y: f64, k: usize) -> f64 {
    if k <= 1 {
        return f(x, y);
    }
    let inv = 1.0 / k as f64;
    let mut sum = 0.0;
    for sj in 0..k {
        let dy = (sj as f64 + 0.5) * inv - 0.5;
        for si in 0..k {
            let dx = (si as f64 + 0.5) * inv - 0.5;
            sum += f(x + dx, y + dy);
        }
    }
    sum * inv * inv
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn exponential_tail_integral() {
        let h = 10.0;
        let spec = QuadratureSpec::default();
        let result = adaptive_simpson(&|s: f64| (-s.abs() / h).exp(), -80.0, 80.0, &spec);
        let exact = 2.0 * h * (1.0 - (-8.0f64).exp());
        assert!(result.converged);
        assert_relative_eq!(result.value, exact, max_relative = 1e-6);
    }

    #[test]
    fn gaussian_integral() {
        let spec = QuadratureSpec::default();
        let result = adaptive_simpson(&|s: f64| (-0.5 * s * s).exp(), -40.0, 40.0, &spec);
        assert!(result.converged);
        assert_relative_eq!(result.value, (2.0 * PI).sqrt(), max_relative = 1e-6);
    }

    #[test]
    fn narrow_peak_in_wide_interval() {
        // Peak width 0.1 inside a +/-1000 interval; the subdivision has to
        // find it rather than average it away.
        let sigma = 0.1;
        let spec = QuadratureSpec::default();
        let result = adaptive_simpson(
            &|s: f64| (-0.5 * (s / sigma) * (s / sigma)).exp(),
            -1000.0,
            1000.0,
            &spec,
        );
        // The tolerance is taken relative to the coarse seed estimate,
        // which overshoots badly for a peak this narrow, so only ask for
        // what that scaling guarantees.
        let exact = sigma * (2.0 * PI).sqrt();
        assert!(result.converged);
        assert_relative_eq!(result.value, exact, max_relative = 1e-4);
    }

    #[test]
    fn budget_exhaustion_is_reported() {
        let spec = QuadratureSpec {
            rel_tol: 1e-14,
            abs_tol: 1e-16,
            max_intervals: 4,
        };
        let result = adaptive_simpson(&|s: f64| 1.0 / (1e-3 + s.abs()), -1.0, 1.0, &spec);
        assert!(!result.converged);
        assert!(result.value.is_finite());
        assert!(result.value > 0.0);
    }

    #[test]
    fn empty_interval_is_zero() {
        let spec = QuadratureSpec::default();
        let result = adaptive_simpson(&|_| 1.0, 3.0, 3.0, &spec);
        assert_eq!(result.value, 0.0);
        assert!(result.converged);
    }

    #[test]
    fn subpixel_average_of_linear_field_is_center_value() {
        // A k x k grid of symmetric offsets averages any affine function
        // back to its central value.
        let f = |x: f64, y: f64| 2.0 * x + 3.0 * y + 1.0;
        for k in [1, 3, 5] {
            assert_relative_eq!(subpixel_average(f, 10.0, 20.0, k), 81.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn subpixel_average_smooths_curvature() {
        // For f = x^2 the pixel average exceeds the center sample by the
        // second moment of the sample grid.
        let f = |x: f64, _y: f64| x * x;
        let k = 5;
        let avg = subpixel_average(f, 0.0, 0.0, k);
        // Sum of ((i + 0.5)/k - 0.5)^2 over the grid, divided by k^2
        let mut expected = 0.0;
        for i in 0..k {
            let d = (i as f64 + 0.5) / k as f64 - 0.5;
            expected += d * d;
        }
        expected /= k as f64;
        assert_relative_eq!(avg, expected, epsilon = 1e-15);
    }
}
