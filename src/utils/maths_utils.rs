use argminmax::ArgMinMax;
use itertools::iproduct;
use statrs::statistics::Statistics;

pub fn get_max(vec: &[f64]) -> f64 {
    let max_index: usize = vec.argmax();
    vec[max_index]
}

pub fn get_min(vec: &[f64]) -> f64 {
    let min_index: usize = vec.argmin();
    vec[min_index]
}

/// Index of the value closest to `target`. `None` for an empty slice.
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    if values.is_empty() {
        return None;
    }
    let distances: Vec<f64> = values.iter().map(|v| (v - target).abs()).collect();
    Some(distances.argmin())
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Row-major square matrix times vector
pub fn mat_vec(matrix: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    matrix.iter().map(|row| dot(row, v)).collect()
}

/// wᵀ Σ w
pub fn quad_form(matrix: &[Vec<f64>], w: &[f64]) -> f64 {
    dot(w, &mat_vec(matrix, w))
}

/// Largest absolute row sum. Upper bound on the spectral radius (Gershgorin),
/// used as a Lipschitz constant for gradient steps.
pub fn max_abs_row_sum(matrix: &[Vec<f64>]) -> f64 {
    matrix
        .iter()
        .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Simple returns between consecutive closes. Non-finite returns (e.g. from a
/// zero close) are dropped.
pub fn pct_change(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| w[1] / w[0] - 1.0)
        .filter(|r| r.is_finite())
        .collect()
}

/// Annualized volatility of daily closes: sample std of simple returns × √days.
/// `None` when fewer than two returns are available.
pub fn annualized_volatility(closes: &[f64], days_per_year: f64) -> Option<f64> {
    let returns = pct_change(closes);
    if returns.len() < 2 {
        return None;
    }
    let sd = returns.iter().std_dev();
    sd.is_finite().then(|| sd * days_per_year.sqrt())
}

/// Sample mean and sample standard deviation (ddof = 1)
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    (values.iter().mean(), values.iter().std_dev())
}

/// Sample covariance matrix (ddof = 1) of equally long return columns
pub fn sample_covariance(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let means: Vec<f64> = columns.iter().map(|c| c.iter().mean()).collect();
    let mut cov = vec![vec![0.0; n]; n];
    for (i, j) in iproduct!(0..n, 0..n) {
        if j < i {
            cov[i][j] = cov[j][i];
            continue;
        }
        let obs = columns[i].len().min(columns[j].len());
        if obs < 2 {
            cov[i][j] = f64::NAN;
            continue;
        }
        let sum: f64 = (0..obs)
            .map(|t| (columns[i][t] - means[i]) * (columns[j][t] - means[j]))
            .sum();
        cov[i][j] = sum / (obs as f64 - 1.0);
    }
    cov
}

/// `count` evenly spaced values from `start` to `end` inclusive (single precision)
pub fn linspace_f32(start: f64, end: f64, count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![start as f32],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| (start + step * i as f64) as f32).collect()
        }
    }
}

/// Divides each element by the plain sum so the result sums to 1.0.
/// A zero sum leaves the vector unchanged.
pub fn normalize_sum(vec: &[f64]) -> Vec<f64> {
    let sum: f64 = vec.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec.to_vec();
    }
    vec.iter().map(|&x| x / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_index_picks_closest_strike() {
        let strikes = [90.0, 95.0, 100.0, 105.0];
        assert_eq!(nearest_index(&strikes, 101.0), Some(2));
        assert_eq!(nearest_index(&strikes, 10.0), Some(0));
        assert_eq!(nearest_index(&[], 10.0), None);
    }

    #[test]
    fn annualized_volatility_needs_two_returns() {
        assert_eq!(annualized_volatility(&[100.0, 101.0], 252.0), None);
        let vol = annualized_volatility(&[100.0, 101.0, 100.0, 102.0], 252.0).unwrap();
        assert!(vol > 0.0);
    }

    #[test]
    fn covariance_is_symmetric_and_matches_variance() {
        let a = vec![0.01, -0.02, 0.03, 0.00];
        let b = vec![0.02, -0.01, 0.01, 0.01];
        let cov = sample_covariance(&[a.clone(), b]);
        assert!((cov[0][1] - cov[1][0]).abs() < 1e-15);
        let (_, sd) = mean_and_std(&a);
        assert!((cov[0][0] - sd * sd).abs() < 1e-15);
    }

    #[test]
    fn linspace_hits_both_ends() {
        let t = linspace_f32(0.0, 1.0, 5);
        assert_eq!(t, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn normalize_sum_handles_zero() {
        assert_eq!(normalize_sum(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(normalize_sum(&[1.0, 3.0]), vec![0.25, 0.75]);
    }
}
