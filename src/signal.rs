//! Signal utilities for the linear-predictive-coding forecast
//!
//! Implements the autocorrelation method of LPC fitting:
//!
//! 1. Autocorrelation of the (normalized) series via forward/inverse FFT of
//!    the squared magnitude spectrum, zero-padded to the next power of two so
//!    the circular correlation equals the linear one.
//! 2. Yule-Walker normal equations as a symmetric positive-definite Toeplitz
//!    system, solved by Cholesky decomposition.
//!
//! A singular or non-positive-definite system (perfectly periodic or
//! near-constant windows) returns `None`; the predictor falls back to a
//! repeat-last residual rather than failing the step.

use num_complex::Complex;
use rustfft::FftPlanner;

/// Diagonal pivot floor below which the Cholesky factorization is treated as
/// singular.
const CHOLESKY_PIVOT_FLOOR: f64 = 1e-12;

// ============================================================================
// Autocorrelation via FFT
// ============================================================================

/// Autocorrelation `r[0..=max_lag]` of `series`.
///
/// Zero-pads to the next power of two at or above `2·len − 1`, computes the
/// forward FFT, squares the magnitude spectrum, and inverse-transforms. The
/// result is the unnormalized lag-domain autocorrelation
/// `r[k] = Σ_i x[i]·x[i+k]`; the Yule-Walker solve is scale-invariant so no
/// further normalization is applied.
pub fn autocorrelation(series: &[f64], max_lag: usize) -> Vec<f64> {
    let n = series.len();
    if n == 0 {
        return vec![0.0; max_lag + 1];
    }

    let fft_size = (2 * n - 1).next_power_of_two();
    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(fft_size);
    let inverse = planner.plan_fft_inverse(fft_size);

    let mut buffer: Vec<Complex<f64>> = series
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_size)
        .collect();

    forward.process(&mut buffer);

    // Squared magnitude spectrum; phase is discarded
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }

    inverse.process(&mut buffer);

    // rustfft leaves the inverse unscaled
    let scale = 1.0 / fft_size as f64;
    (0..=max_lag.min(n - 1))
        .map(|k| buffer[k].re * scale)
        .chain(std::iter::repeat(0.0))
        .take(max_lag + 1)
        .collect()
}

// ============================================================================
// Cholesky Solve
// ============================================================================

/// Solve `A·x = rhs` for symmetric positive-definite `A` (row-major, n×n)
/// via Cholesky decomposition. Returns `None` when a pivot collapses, which
/// the caller treats as a recoverable numerical degeneracy.
pub fn cholesky_solve(matrix: &[f64], n: usize, rhs: &[f64]) -> Option<Vec<f64>> {
    debug_assert_eq!(matrix.len(), n * n);
    debug_assert_eq!(rhs.len(), n);

    // Lower-triangular factor L with A = L·Lᵀ
    let mut l = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= CHOLESKY_PIVOT_FLOOR {
                    return None;
                }
                l[i * n + i] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    // Forward substitution: L·y = rhs
    let mut y = vec![0.0f64; n];
    for i in 0..n {
        let mut sum = rhs[i];
        for k in 0..i {
            sum -= l[i * n + k] * y[k];
        }
        y[i] = sum / l[i * n + i];
    }

    // Back substitution: Lᵀ·x = y
    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[k * n + i] * x[k];
        }
        x[i] = sum / l[i * n + i];
    }

    Some(x)
}

// ============================================================================
// LPC Coefficient Fit
// ============================================================================

/// Fit linear predictive coefficients to `series` by the autocorrelation
/// method.
///
/// Returns the coefficient vector `b` with `b[0] = 1` and `series.len() − 2`
/// further entries, chosen so the one-step-ahead forecast of `x[n]` is
/// `−Σ_{j>=1} b[j]·x[n−j]`. Returns `None` on a degenerate system (zero
/// autocorrelation energy or a singular Toeplitz matrix).
pub fn lpc_coefficients(series: &[f64]) -> Option<Vec<f64>> {
    let m = series.len();
    if m < 2 {
        return None;
    }
    let order = m - 2;
    if order == 0 {
        return Some(vec![1.0]);
    }

    let r = autocorrelation(series, order);
    if r[0] <= CHOLESKY_PIVOT_FLOOR {
        return None;
    }

    // Yule-Walker: Σ_j a[j]·r[|i−j|] = −r[i], i = 1..=order
    let mut matrix = vec![0.0f64; order * order];
    for i in 0..order {
        for j in 0..order {
            matrix[i * order + j] = r[i.abs_diff(j)];
        }
    }
    let rhs: Vec<f64> = (1..=order).map(|i| -r[i]).collect();

    let a = cholesky_solve(&matrix, order, &rhs)?;

    let mut b = Vec::with_capacity(order + 1);
    b.push(1.0);
    b.extend(a);
    Some(b)
}

/// One-step-ahead forecast of the final entry of `series` from the entries
/// before it, using coefficients from [`lpc_coefficients`].
pub fn lpc_forecast(series: &[f64], b: &[f64]) -> f64 {
    let n = series.len() - 1; // index being predicted
    let mut acc = 0.0;
    for (j, &coeff) in b.iter().enumerate().skip(1) {
        if j > n {
            break;
        }
        acc -= coeff * series[n - j];
    }
    acc
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autocorrelation_matches_direct_computation() {
        let series = [1.0, 2.0, 3.0, 4.0];
        let r = autocorrelation(&series, 3);

        for (k, &rk) in r.iter().enumerate() {
            let direct: f64 = (0..series.len() - k).map(|i| series[i] * series[i + k]).sum();
            assert!(
                (rk - direct).abs() < 1e-9,
                "lag {k}: fft {rk} vs direct {direct}"
            );
        }
    }

    #[test]
    fn autocorrelation_lag_zero_is_energy() {
        let series = [0.5, -1.5, 2.5];
        let r = autocorrelation(&series, 0);
        let energy: f64 = series.iter().map(|x| x * x).sum();
        assert!((r[0] - energy).abs() < 1e-9);
    }

    #[test]
    fn cholesky_solves_known_system() {
        // A = [[4,2],[2,3]], x = [1,2] => rhs = [8,8]
        let matrix = [4.0, 2.0, 2.0, 3.0];
        let rhs = [8.0, 8.0];
        let x = cholesky_solve(&matrix, 2, &rhs).expect("SPD system must solve");
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn cholesky_rejects_singular_matrix() {
        // Rank-1 matrix
        let matrix = [1.0, 1.0, 1.0, 1.0];
        let rhs = [1.0, 1.0];
        assert!(cholesky_solve(&matrix, 2, &rhs).is_none());
    }

    #[test]
    fn lpc_recovers_ar1_coefficient() {
        // Noise-free AR(1): x[n] = 0.6·x[n-1]
        let mut series = vec![1.0f64];
        for _ in 1..24 {
            let next = 0.6 * series[series.len() - 1];
            series.push(next);
        }

        let b = lpc_coefficients(&series).expect("AR(1) series must fit");
        assert!(
            (b[1] + 0.6).abs() < 0.05,
            "b[1] should approximate -0.6, got {}",
            b[1]
        );
        // Remaining coefficients are near zero for a pure AR(1)
        for &c in &b[2..] {
            assert!(c.abs() < 0.05, "higher-order coefficient not small: {c}");
        }
    }

    #[test]
    fn lpc_forecast_tracks_ar1_series() {
        let mut series = vec![1.0f64];
        for _ in 1..24 {
            let next = 0.6 * series[series.len() - 1];
            series.push(next);
        }
        let b = lpc_coefficients(&series).expect("fit");
        let forecast = lpc_forecast(&series, &b);
        let actual = series[series.len() - 1];
        assert!(
            (forecast - actual).abs() < 0.01,
            "forecast {forecast} vs actual {actual}"
        );
    }

    #[test]
    fn lpc_rejects_all_zero_series() {
        let series = vec![0.0f64; 16];
        assert!(lpc_coefficients(&series).is_none());
    }

    #[test]
    fn lpc_trivial_orders() {
        assert!(lpc_coefficients(&[1.0]).is_none());
        // Two points: order zero, bare b[0]
        let b = lpc_coefficients(&[1.0, 2.0]).expect("order-0 fit");
        assert_eq!(b, vec![1.0]);
    }
}
