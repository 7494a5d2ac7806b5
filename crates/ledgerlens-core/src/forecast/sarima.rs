//! Seasonal ARIMA(1,1,1)(1,1,1)[7]
//!
//! The series is differenced once at lag 1 and once at lag 7:
//!
//! ```text
//! w_t = y_t - y_{t-1} - y_{t-7} + y_{t-8}
//! ```
//!
//! and `w` follows
//!
//! ```text
//! (1 - phi B)(1 - PHI B^7) w_t = (1 + theta B)(1 + THETA B^7) e_t
//! ```
//!
//! Coefficients are fitted by conditional sum of squares with pre-sample
//! values set to zero. Each coefficient is searched as `tanh(x)` so it stays
//! inside the unit interval. A search that drifts onto the boundary
//! (`|coefficient| > 1 - 1e-6`) is treated as non-convergence.
//!
//! A history the differencing removes entirely, such as a constant or an
//! exactly repeating week, leaves no residual variance. Those fits are
//! rejected and callers fall back to a simpler model.

use serde::{Deserialize, Serialize};

use super::optimize::{nelder_mead, Tolerance};
use crate::error::{Error, Result};

pub const PERIOD: usize = 7;
pub const ORDER: [usize; 3] = [1, 1, 1];
pub const SEASONAL_ORDER: [usize; 4] = [1, 1, 1, PERIOD];

/// Lags consumed by differencing
const DIFF_LAGS: usize = PERIOD + 1;

/// Four ARMA coefficients plus the innovation variance
const N_PARAMS: usize = 5;

/// Initial simplex edge in the unconstrained space
const SEARCH_STEP: f64 = 0.5;

/// Distance from the unit circle below which a coefficient is on the boundary
const BOUNDARY_MARGIN: f64 = 1e-6;

/// ARMA coefficients of the differenced series
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SarimaParams {
    pub ar: f64,
    pub seasonal_ar: f64,
    pub ma: f64,
    pub seasonal_ma: f64,
}

impl SarimaParams {
    fn from_unconstrained(x: &[f64]) -> Self {
        Self {
            ar: x[0].tanh(),
            seasonal_ar: x[1].tanh(),
            ma: x[2].tanh(),
            seasonal_ma: x[3].tanh(),
        }
    }

    /// Largest coefficient magnitude
    pub fn max_abs(&self) -> f64 {
        [self.ar, self.seasonal_ar, self.ma, self.seasonal_ma]
            .iter()
            .fold(0.0, |m, c| m.max(c.abs()))
    }

    /// One-step prediction of `w[t]` from past values and past innovations
    fn predict(&self, w: &[f64], e: &[f64], t: usize) -> f64 {
        self.ar * lag(w, t, 1) + self.seasonal_ar * lag(w, t, PERIOD)
            - self.ar * self.seasonal_ar * lag(w, t, PERIOD + 1)
            + self.ma * lag(e, t, 1)
            + self.seasonal_ma * lag(e, t, PERIOD)
            + self.ma * self.seasonal_ma * lag(e, t, PERIOD + 1)
    }

    /// Coefficients of the full AR polynomial in `B`, differencing included
    fn ar_polynomial(&self) -> Vec<f64> {
        let ar = [1.0, -self.ar];
        let seasonal_ar = seasonal(-self.seasonal_ar);
        let diff = [1.0, -1.0];
        let seasonal_diff = seasonal(-1.0);
        poly_mul(&poly_mul(&ar, &seasonal_ar), &poly_mul(&diff, &seasonal_diff))
    }

    fn ma_polynomial(&self) -> Vec<f64> {
        poly_mul(&[1.0, self.ma], &seasonal(self.seasonal_ma))
    }
}

/// `v[t - k]`, or zero before the start of the series
fn lag(v: &[f64], t: usize, k: usize) -> f64 {
    if t >= k {
        v[t - k]
    } else {
        0.0
    }
}

/// `1 + c B^7`
fn seasonal(c: f64) -> Vec<f64> {
    let mut p = vec![0.0; PERIOD + 1];
    p[0] = 1.0;
    p[PERIOD] = c;
    p
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `(1 - B)(1 - B^7) y`
pub fn seasonal_difference(y: &[f64]) -> Vec<f64> {
    (DIFF_LAGS..y.len())
        .map(|t| y[t] - y[t - 1] - y[t - PERIOD] + y[t - PERIOD - 1])
        .collect()
}

fn residuals(w: &[f64], params: &SarimaParams) -> Vec<f64> {
    let mut e = Vec::with_capacity(w.len());
    for t in 0..w.len() {
        let r = w[t] - params.predict(w, &e, t);
        e.push(r);
    }
    e
}

fn sum_of_squares(w: &[f64], params: &SarimaParams) -> f64 {
    residuals(w, params).iter().map(|r| r * r).sum()
}

fn ensure_interior(params: &SarimaParams) -> Result<()> {
    if params.max_abs() > 1.0 - BOUNDARY_MARGIN {
        return Err(Error::Training(format!(
            "CSS search ended on the unit circle: {:?}",
            params
        )));
    }
    Ok(())
}

/// A fitted seasonal model with the history needed to forecast from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarimaFit {
    pub params: SarimaParams,
    /// Innovation variance, SSE / n
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    /// Optimizer iterations used
    pub iterations: usize,
    history: Vec<f64>,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
}

impl SarimaFit {
    /// Fit on a daily series.
    ///
    /// Fails on non-finite input, too-short series, a search that does not
    /// converge within `max_iterations` or ends on the unit circle, or (near)
    /// zero residual variance.
    pub fn fit(y: &[f64], max_iterations: usize) -> Result<Self> {
        if y.iter().any(|v| !v.is_finite()) {
            return Err(Error::Training("series contains non-finite values".into()));
        }
        let required = DIFF_LAGS + 2 * N_PARAMS;
        if y.len() < required {
            return Err(Error::Training(format!(
                "seasonal model needs {} observations, got {}",
                required,
                y.len()
            )));
        }

        let w = seasonal_difference(y);
        let objective = |x: &[f64]| sum_of_squares(&w, &SarimaParams::from_unconstrained(x));
        let min = nelder_mead(objective, &[0.0; 4], SEARCH_STEP, max_iterations, Tolerance::default());

        if !min.converged {
            return Err(Error::Training(format!(
                "CSS search did not converge in {} iterations",
                max_iterations
            )));
        }
        if !min.value.is_finite() {
            return Err(Error::Training("CSS objective is not finite".into()));
        }

        let n = w.len() as f64;
        let sigma2 = min.value / n;
        if !sigma2.is_finite() || sigma2 <= 1e-10 {
            return Err(Error::Training(format!(
                "degenerate residual variance {}",
                sigma2
            )));
        }

        let params = SarimaParams::from_unconstrained(&min.x);
        ensure_interior(&params)?;
        let log_likelihood = -n / 2.0 * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = N_PARAMS as f64;

        Ok(Self {
            params,
            sigma2,
            log_likelihood,
            aic: -2.0 * log_likelihood + 2.0 * k,
            bic: -2.0 * log_likelihood + k * n.ln(),
            iterations: min.iterations,
            residuals: residuals(&w, &params),
            history: y.to_vec(),
            differenced: w,
        })
    }

    /// Point forecasts and their standard errors for the next `horizon` days
    pub fn forecast(&self, horizon: usize) -> Vec<(f64, f64)> {
        let n_w = self.differenced.len();
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        for t in n_w..n_w + horizon {
            let next = self.params.predict(&w, &e, t);
            w.push(next);
            e.push(0.0);
        }

        let mut y = self.history.clone();
        for step in 0..horizon {
            let t = y.len();
            let next = w[n_w + step] + y[t - 1] + y[t - PERIOD] - y[t - PERIOD - 1];
            y.push(next);
        }

        let psi = self.psi_weights(horizon);
        let mut variance = 0.0;
        y[self.history.len()..]
            .iter()
            .zip(&psi)
            .map(|(&mean, &weight)| {
                variance += self.sigma2 * weight * weight;
                (mean, variance.sqrt())
            })
            .collect()
    }

    /// MA(inf) weights of the undifferenced process
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        let ar = self.params.ar_polynomial();
        let ma = self.params.ma_polynomial();
        let mut psi: Vec<f64> = Vec::with_capacity(count);
        for j in 0..count {
            let mut value = if j == 0 { 1.0 } else { ma.get(j).copied().unwrap_or(0.0) };
            for i in 1..=j.min(ar.len() - 1) {
                value -= ar[i] * psi[j - i];
            }
            psi.push(value);
        }
        psi
    }

    /// Number of observations the fit saw after differencing
    pub fn n_obs(&self) -> usize {
        self.differenced.len()
    }
}
