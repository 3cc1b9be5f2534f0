//! Dense Gaussian elimination with partial pivoting.

use crate::error::{Result, SimError};

use super::matrix::Matrix;
use super::PIVOT_EPSILON;

/// Solve `A x = b`.
///
/// For each column the row with the largest absolute pivot among the
/// unprocessed rows is swapped into place before elimination. Fails with
/// [`SimError::SingularMatrix`] when that pivot is below [`PIVOT_EPSILON`].
pub fn solve_linear(a: &Matrix, b: &[f64]) -> Result<Vec<f64>> {
    let n = a.size();
    debug_assert_eq!(b.len(), n);

    let mut lu = a.clone();
    let mut rhs = b.to_vec();

    for k in 0..n {
        // Find pivot
        let mut max_val = lu.get(k, k).abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let val = lu.get(i, k).abs();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        if !(max_val >= PIVOT_EPSILON) {
            return Err(SimError::SingularMatrix);
        }

        if max_row != k {
            lu.swap_rows(k, max_row);
            rhs.swap(k, max_row);
        }

        // Eliminate
        let pivot = lu.get(k, k);
        for i in (k + 1)..n {
            let factor = lu.get(i, k) / pivot;
            if factor == 0.0 {
                continue;
            }
            lu.set(i, k, 0.0);
            for j in (k + 1)..n {
                lu.add(i, j, -factor * lu.get(k, j));
            }
            rhs[i] -= factor * rhs[k];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let tail: f64 = ((i + 1)..n).map(|j| lu.get(i, j) * x[j]).sum();
        x[i] = (rhs[i] - tail) / lu.get(i, i);
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_solve_2x2() {
        let a = Matrix::from_rows(&[vec![2.0, 1.0], vec![1.0, 3.0]]);
        let x = solve_linear(&a, &[3.0, 5.0]).unwrap();
        assert_abs_diff_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_requires_pivoting() {
        // Zero on the leading diagonal, as produced by voltage-source rows
        let a = Matrix::from_rows(&[
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 1.0],
            vec![0.0, 1.0, 1.0],
        ]);
        let b = [2.0, 4.0, 5.0];
        let x = solve_linear(&a, &b).unwrap();
        let ax = a.mul_vec(&x);
        for (lhs, rhs) in ax.iter().zip(b.iter()) {
            assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_all_zero_matrix_is_singular() {
        let a = Matrix::zeros(3);
        let err = solve_linear(&a, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, SimError::SingularMatrix));
    }

    #[test]
    fn test_rank_deficient_is_singular() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert!(matches!(
            solve_linear(&a, &[1.0, 1.0]),
            Err(SimError::SingularMatrix)
        ));
    }

    #[test]
    fn test_nan_pivot_is_singular() {
        let a = Matrix::from_rows(&[vec![f64::NAN]]);
        assert!(solve_linear(&a, &[1.0]).is_err());
    }

    #[test]
    fn test_empty_system() {
        let x = solve_linear(&Matrix::zeros(0), &[]).unwrap();
        assert!(x.is_empty());
    }
}
