use itertools::{Itertools, MinMaxResult};
use ordered_float::OrderedFloat;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Standard deviation with divisor `N` (population convention).
pub fn population_std(x: &[f64]) -> f64 {
    let m = mean(x);
    let sum_sq: f64 = x.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / x.len() as f64).sqrt()
}

/// Standardized version of `x`: `(x - mean) / std`, population std.
///
/// A constant input has zero standard deviation and every output value is NaN.
///
/// ```
/// use foxfit_utils::stats::standardize;
/// let z = standardize(&[1.0, -1.0, 0.0]);
/// let expected = [1.22474487, -1.22474487, 0.0];
/// assert!(z.iter().zip(expected).all(|(a, b)| (a - b).abs() < 1e-6));
/// ```
pub fn standardize(x: &[f64]) -> Vec<f64> {
    let m = mean(x);
    let sd = population_std(x);
    x.iter().map(|v| (v - m) / sd).collect()
}

/// Pearson's R: mean of the product of the deviations divided by the
/// product of the (population) standard deviations.
///
/// Panics if the slices differ in length.
///
/// ```
/// use foxfit_utils::stats::pearson_r;
/// let r = pearson_r(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]);
/// assert!((r - -1.0).abs() < 1e-5);
/// ```
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    assert_eq!(x.len(), y.len(), "pearson_r needs sequences of equal length");
    let mx = mean(x);
    let my = mean(y);
    let cov = x
        .iter()
        .zip(y)
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / x.len() as f64;
    cov / (population_std(x) * population_std(y))
}

/// Quantile by linear interpolation between order statistics, the
/// default of pandas and R (type 7). `sorted` must be ascending.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Ascending copy of `x`, NaN sorted last.
pub fn sorted(x: &[f64]) -> Vec<f64> {
    let mut out: Vec<OrderedFloat<f64>> = x.iter().copied().map(OrderedFloat).collect();
    out.sort();
    out.into_iter().map(|v| v.0).collect()
}

/// One row of a `describe()` table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

/// Count, mean, sample std (ddof 1), min, quartiles and max of `values`.
pub fn describe(name: &str, values: &[f64]) -> ColumnSummary {
    let (min, max) = match values.iter().copied().minmax() {
        MinMaxResult::NoElements => (f64::NAN, f64::NAN),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };
    let ordered = sorted(values);
    ColumnSummary {
        name: name.to_string(),
        count: values.len(),
        mean: values.iter().mean(),
        std: values.iter().std_dev(),
        min,
        q25: quantile_sorted(&ordered, 0.25),
        q50: quantile_sorted(&ordered, 0.5),
        q75: quantile_sorted(&ordered, 0.75),
        max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reference_r(x: &[f64], y: &[f64]) -> f64 {
        x.iter().covariance(y.iter()) / (x.iter().std_dev() * y.iter().std_dev())
    }

    #[test]
    fn test_standardize_example() {
        let z = standardize(&[1.0, -1.0, 0.0]);
        let expected = [1.22474487, -1.22474487, 0.0];
        for (a, b) in z.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_standardize_constant_is_nan() {
        let z = standardize(&[3.0, 3.0, 3.0]);
        assert!(z.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_pearson_r_perfect_negative() {
        let r = pearson_r(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]);
        assert!((r + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_pearson_r_perfect_positive_after_affine_map() {
        let x = [0.5, 1.5, 2.0, 7.0];
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v - 2.0).collect();
        assert!((pearson_r(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_r_zero_variance_is_not_finite() {
        let r = pearson_r(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]);
        assert!(!r.is_finite());
    }

    #[test]
    #[should_panic]
    fn test_pearson_r_length_mismatch() {
        pearson_r(&[1.0, 2.0], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_population_std_divides_by_n() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&v) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_matches_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_sorted(&v, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile_sorted(&v, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile_sorted(&v, 0.75) - 3.25).abs() < 1e-12);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn test_describe() {
        let summary = describe("groupsize", &[4.0, 2.0, 8.0, 6.0]);
        assert_eq!(summary.name, "groupsize");
        assert_eq!(summary.count, 4);
        assert!((summary.mean - 5.0).abs() < 1e-12);
        // sample std: sqrt(20 / 3)
        assert!((summary.std - (20.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 8.0);
        assert!((summary.q25 - 3.5).abs() < 1e-12);
        assert!((summary.q50 - 5.0).abs() < 1e-12);
        assert!((summary.q75 - 6.5).abs() < 1e-12);
    }

    fn non_constant() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(-1000.0f64..1000.0, 2..60)
            .prop_filter("needs spread", |v| population_std(v) > 1e-3)
    }

    fn paired() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
        (2usize..60)
            .prop_flat_map(|n| {
                (
                    prop::collection::vec(-1000.0f64..1000.0, n),
                    prop::collection::vec(-1000.0f64..1000.0, n),
                )
            })
            .prop_filter("needs spread", |(x, y)| {
                population_std(x) > 1e-3 && population_std(y) > 1e-3
            })
    }

    proptest! {
        #[test]
        fn standardized_has_zero_mean_unit_std(x in non_constant()) {
            let z = standardize(&x);
            prop_assert_eq!(z.len(), x.len());
            prop_assert!(mean(&z).abs() < 1e-6);
            prop_assert!((population_std(&z) - 1.0).abs() < 1e-6);
        }

        #[test]
        fn standardize_is_idempotent(x in non_constant()) {
            let once = standardize(&x);
            let twice = standardize(&once);
            for (a, b) in once.iter().zip(twice.iter()) {
                prop_assert!((a - b).abs() < 1e-6);
            }
        }

        #[test]
        fn pearson_r_matches_reference((x, y) in paired()) {
            let r = pearson_r(&x, &y);
            prop_assert!((r - reference_r(&x, &y)).abs() < 1e-5);
            prop_assert!(r >= -1.0 - 1e-9 && r <= 1.0 + 1e-9);
        }

        #[test]
        fn pearson_r_is_symmetric((x, y) in paired()) {
            prop_assert_eq!(pearson_r(&x, &y), pearson_r(&y, &x));
        }
    }
}
