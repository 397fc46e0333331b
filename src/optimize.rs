//! Internal numerical helpers for constrained weight optimization
//!
//! The allocation methods in [`crate::sizing`] and the efficient frontier in
//! [`crate::analytics`] all solve small box-constrained problems on the unit
//! simplex. A projected gradient descent is sufficient at portfolio sizes
//! (tens of assets); no external solver is pulled in.

use ndarray::{Array1, Array2};

/// Convergence tolerance for the simplex projection
const PROJECTION_EPS: f64 = 1e-12;

/// Project `w` onto `{ w : sum(w) = 1, lo <= w_i <= hi }` in place.
///
/// When `n * hi < 1` the box is infeasible; the upper bound is relaxed to
/// `1 / n` so a valid allocation always exists.
pub(crate) fn project_capped_simplex(w: &mut Array1<f64>, lo: f64, hi: f64) {
    let n = w.len();
    if n == 0 {
        return;
    }

    let hi = hi.max(1.0 / n as f64);

    for _ in 0..100 {
        w.mapv_inplace(|x| x.clamp(lo, hi));
        let deficit = 1.0 - w.sum();
        if deficit.abs() < PROJECTION_EPS {
            return;
        }

        // Distribute the deficit across components not pinned at a bound in
        // the direction of the adjustment.
        let free: Vec<usize> = (0..n)
            .filter(|&i| {
                if deficit > 0.0 {
                    w[i] < hi - PROJECTION_EPS
                } else {
                    w[i] > lo + PROJECTION_EPS
                }
            })
            .collect();

        if free.is_empty() {
            // Fully pinned; fall back to a uniform rescale.
            let sum = w.sum();
            if sum > 0.0 {
                w.mapv_inplace(|x| x / sum);
            }
            return;
        }

        let share = deficit / free.len() as f64;
        for i in free {
            w[i] += share;
        }
    }

    // Final clamp after the iteration budget.
    w.mapv_inplace(|x| x.clamp(lo, hi));
    let sum = w.sum();
    if sum > 0.0 {
        w.mapv_inplace(|x| x / sum);
    }
}

/// Minimize an objective with gradient `grad` over the capped simplex.
///
/// Starts from equal weights and runs a fixed number of projected gradient
/// steps; adequate for the convex quadratics used here.
pub(crate) fn projected_gradient_descent<F>(
    n: usize,
    grad: F,
    lo: f64,
    hi: f64,
    iterations: usize,
    step: f64,
) -> Array1<f64>
where
    F: Fn(&Array1<f64>) -> Array1<f64>,
{
    let mut w = Array1::from_elem(n, 1.0 / n as f64);
    project_capped_simplex(&mut w, lo, hi);

    for _ in 0..iterations {
        let g = grad(&w);
        w = &w - &(g * step);
        project_capped_simplex(&mut w, lo, hi);
    }

    w
}

/// Whether a covariance matrix is too degenerate to optimize over
///
/// Flat assets (zero variance) and non-finite entries both qualify; callers
/// fall back to equal weighting in that case.
pub(crate) fn is_degenerate(cov: &Array2<f64>) -> bool {
    if cov.nrows() == 0 || cov.nrows() != cov.ncols() {
        return true;
    }

    if cov.iter().any(|v| !v.is_finite()) {
        return true;
    }

    (0..cov.nrows()).any(|i| cov[[i, i]] < 1e-12)
}

/// Equal weights over `n` assets
pub(crate) fn equal_weights(n: usize) -> Array1<f64> {
    Array1::from_elem(n, 1.0 / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_projection_sums_to_one() {
        let mut w = array![0.9, 0.6, 0.1, 0.0, 0.0];
        project_capped_simplex(&mut w, 0.0, 0.4);

        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w.iter().all(|&x| x >= -1e-9 && x <= 0.4 + 1e-9));
    }

    #[test]
    fn test_projection_relaxes_infeasible_bounds() {
        // 3 assets with hi = 0.2 cannot sum to 1; bound relaxes to 1/3.
        let mut w = array![1.0, 0.0, 0.0];
        project_capped_simplex(&mut w, 0.0, 0.2);

        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_descent_minimum_variance() {
        // Second asset has much lower variance; it should dominate.
        let cov = array![[0.04, 0.0], [0.0, 0.0025]];
        let w = projected_gradient_descent(
            2,
            |w| cov.dot(w) * 2.0,
            0.0,
            1.0,
            500,
            0.5,
        );

        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w[1] > w[0]);
    }

    #[test]
    fn test_degenerate_detection() {
        let flat = array![[0.04, 0.0], [0.0, 0.0]];
        assert!(is_degenerate(&flat));

        let ok = array![[0.04, 0.001], [0.001, 0.02]];
        assert!(!is_degenerate(&ok));

        let nan = array![[f64::NAN, 0.0], [0.0, 0.01]];
        assert!(is_degenerate(&nan));
    }
}
