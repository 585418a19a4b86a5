use crate::error::{Ratio, Undefined, safe_ratio};

/// Jain's fairness index `(Σx)² / (n·Σx²)` over one metric's per-node values.
///
/// 1.0 when every node sees the same value, 1/n when a single node gets
/// everything. Empty input is `MissingData`; an all-zero vector is a
/// `DivisionByZero`.
pub fn jain_index(values: &[f64]) -> Ratio {
    if values.is_empty() {
        return Err(Undefined::MissingData("no per-node values"));
    }
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|x| x * x).sum();
    safe_ratio(sum * sum, values.len() as f64 * sum_sq, "sum of squares")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equal_values_are_perfectly_fair() {
        assert_eq!(jain_index(&[100.0, 100.0, 100.0]), Ok(1.0));
    }

    #[test]
    fn known_imbalances() {
        assert!((jain_index(&[100.0, 50.0]).unwrap() - 0.9).abs() < 1e-12);
        assert!((jain_index(&[100.0, 0.0]).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn all_zero_and_empty_are_undefined() {
        assert_eq!(
            jain_index(&[0.0, 0.0]),
            Err(Undefined::DivisionByZero("sum of squares"))
        );
        assert!(matches!(jain_index(&[]), Err(Undefined::MissingData(_))));
    }

    proptest! {
        #[test]
        fn constant_vector_scores_one(c in 1e-6f64..1e9, n in 1usize..32) {
            let j = jain_index(&vec![c; n]).unwrap();
            prop_assert!((j - 1.0).abs() < 1e-9);
        }

        #[test]
        fn single_nonzero_entry_scores_one_over_n(c in 1e-6f64..1e9, n in 1usize..32, pos in 0usize..32) {
            let mut values = vec![0.0; n];
            values[pos % n] = c;
            let j = jain_index(&values).unwrap();
            prop_assert!((j - 1.0 / n as f64).abs() < 1e-9);
        }

        #[test]
        fn index_stays_within_bounds(values in prop::collection::vec(0.0f64..1e6, 1..20)) {
            prop_assume!(values.iter().any(|v| *v > 1e-3));
            let n = values.len() as f64;
            let j = jain_index(&values).unwrap();
            prop_assert!(j <= 1.0 + 1e-9);
            prop_assert!(j >= 1.0 / n - 1e-9);
        }
    }
}
