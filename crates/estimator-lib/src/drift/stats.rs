//! Statistical tests used by the drift report

/// Arithmetic mean, `None` for an empty sample
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Largest `n*m` for which the K-S p-value is computed exactly
pub const KS_EXACT_MAX_PRODUCT: usize = 10_000;

/// Two-sample Kolmogorov-Smirnov test
///
/// Returns `(statistic, p_value)`. Small samples (`n*m` up to
/// [`KS_EXACT_MAX_PRODUCT`]) get the exact p-value, larger ones the
/// asymptotic Kolmogorov distribution with effective size `n*m/(n+m)`.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Option<(f64, f64)> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let a = sorted(a);
    let b = sorted(b);
    let (n, m) = (a.len(), b.len());

    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < n && j < m {
        let x = a[i].min(b[j]);
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }
        let diff = (i as f64 / n as f64 - j as f64 / m as f64).abs();
        d = d.max(diff);
    }

    let p = if n.saturating_mul(m) <= KS_EXACT_MAX_PRODUCT {
        ks_exact_p_value(n, m, d)
    } else {
        let en = ((n * m) as f64 / (n + m) as f64).sqrt();
        kolmogorov_q((en + 0.12 + 0.11 / en) * d)
    };
    Some((d, p))
}

/// Exact two-sided p-value `P(D >= d)` for samples of size `n` and `m`
///
/// Walks the lattice of merged orderings from `(0, 0)` to `(n, m)`, where
/// every ordering is equally likely, and accumulates the probability of
/// never touching a point with `|i/n - j/m| >= d`.
fn ks_exact_p_value(n: usize, m: usize, d: f64) -> f64 {
    const TOLERANCE: f64 = 1e-9;
    if d <= TOLERANCE {
        return 1.0;
    }
    let outside = |i: usize, j: usize| {
        (i as f64 / n as f64 - j as f64 / m as f64).abs() >= d - TOLERANCE
    };

    let mut previous = vec![0.0f64; m + 1];
    let mut current = vec![0.0f64; m + 1];
    for i in 0..=n {
        for j in 0..=m {
            let reach = if i == 0 && j == 0 {
                1.0
            } else {
                let mut p = 0.0;
                if i > 0 {
                    let (rest_a, rest_b) = ((n - i + 1) as f64, (m - j) as f64);
                    p += previous[j] * rest_a / (rest_a + rest_b);
                }
                if j > 0 {
                    let (rest_a, rest_b) = ((n - i) as f64, (m - j + 1) as f64);
                    p += current[j - 1] * rest_b / (rest_a + rest_b);
                }
                p
            };
            current[j] = if outside(i, j) { 0.0 } else { reach };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    (1.0 - previous[m]).clamp(0.0, 1.0)
}

/// Survival function of the Kolmogorov distribution
fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sign = 1.0;
    let mut sum = 0.0;
    let mut previous_term = 0.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = sign * 2.0 * (a2 * k * k).exp();
        sum += term;
        if term.abs() <= 1e-10 * previous_term || term.abs() <= 1e-12 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous_term = term.abs();
    }
    // Series failed to converge, which only happens for tiny lambda
    1.0
}

/// First Wasserstein distance between two empirical distributions
pub fn wasserstein_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let a = sorted(a);
    let b = sorted(b);
    let mut all: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    all.sort_by(|x, y| x.total_cmp(y));

    let (n, m) = (a.len() as f64, b.len() as f64);
    let mut distance = 0.0;
    for window in all.windows(2) {
        let (x, next) = (window[0], window[1]);
        let cdf_a = a.partition_point(|v| *v <= x) as f64 / n;
        let cdf_b = b.partition_point(|v| *v <= x) as f64 / m;
        distance += (cdf_a - cdf_b).abs() * (next - x);
    }
    Some(distance)
}
