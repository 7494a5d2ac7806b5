//! Derivative-free minimization (Nelder-Mead simplex)

/// Result of a minimization run
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Stopping rule for [`nelder_mead`]
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Largest coordinate spread of the simplex
    pub x_abs: f64,
    /// Largest objective spread, relative to the best value
    pub f_rel: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            x_abs: 1e-6,
            f_rel: 1e-10,
        }
    }
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimize `f` from `x0` with an initial simplex of edge `step`.
///
/// Non-finite objective values are treated as `+inf`. Stops after
/// `max_iterations` with `converged = false` if the tolerance is not met.
pub fn nelder_mead<F>(f: F, x0: &[f64], step: f64, max_iterations: usize, tol: Tolerance) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let n = x0.len();
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((x0.to_vec(), eval(x0)));
    for i in 0..n {
        let mut x = x0.to_vec();
        x[i] += step;
        let v = eval(&x);
        simplex.push((x, v));
    }

    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = simplex[0].1;
        let f_spread = simplex.iter().map(|(_, v)| (v - best).abs()).fold(0.0, f64::max);
        let x_spread = simplex
            .iter()
            .skip(1)
            .flat_map(|(x, _)| x.iter().zip(&simplex[0].0).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        if x_spread <= tol.x_abs || (best.is_finite() && f_spread <= tol.f_rel * best.abs().max(1e-300))
        {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|(x, _)| x[j]).sum::<f64>() / n as f64)
            .collect();
        let worst = simplex[n].clone();
        let toward = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&worst.0)
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let reflected = toward(REFLECT);
        let f_reflected = eval(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = toward(REFLECT * EXPAND);
            let f_expanded = eval(&expanded);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }

        if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let contracted = if f_reflected < worst.1 {
            // outside
            let x = toward(REFLECT * CONTRACT);
            let v = eval(&x);
            (v <= f_reflected).then_some((x, v))
        } else {
            // inside
            let x = toward(-CONTRACT);
            let v = eval(&x);
            (v < worst.1).then_some((x, v))
        };

        match contracted {
            Some(point) => simplex[n] = point,
            None => {
                let anchor = simplex[0].0.clone();
                for (x, v) in simplex.iter_mut().skip(1) {
                    for (xi, ai) in x.iter_mut().zip(&anchor) {
                        *xi = ai + SHRINK * (*xi - ai);
                    }
                    *v = eval(x);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (x, value) = simplex.swap_remove(0);
    Minimum {
        x,
        value,
        iterations,
        converged,
    }
}
