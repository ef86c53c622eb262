//! Order statistics over sale samples.

/// A statistic together with the number of observations behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistic {
    pub value: f64,
    pub sample: usize,
}

/// Median of `values`, averaging the two middle values of an even sample.
///
/// Returns `None` for an empty sample. Sorts `values` in place.
#[must_use]
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        f64::midpoint(values[mid - 1], values[mid])
    } else {
        values[mid]
    })
}

/// Quantile `q` (in `[0, 1]`) of `values` with linear interpolation
/// between closest ranks.
///
/// Returns `None` for an empty sample. Sorts `values` in place.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn median_of_odd_and_even_samples() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn quantile_interpolates_between_ranks() {
        let mut values = [100.0, 200.0, 300.0, 400.0, 500.0];
        assert_eq!(quantile(&mut values, 0.75), Some(400.0));

        let mut values = [100.0, 200.0, 300.0, 400.0];
        assert!((quantile(&mut values, 0.75).unwrap() - 325.0).abs() < 1e-9);
        assert_eq!(quantile(&mut values, 0.0), Some(100.0));
        assert_eq!(quantile(&mut values, 1.0), Some(400.0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn quantile_stays_within_sample_range(
            mut values in prop::collection::vec(0.0_f64..10_000.0, 1..50),
            q in 0.0_f64..=1.0,
        ) {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let value = quantile(&mut values, q).unwrap();
            prop_assert!(value >= min - 1e-9 && value <= max + 1e-9);
        }
    }
}
