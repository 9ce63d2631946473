//! Dense numerics primitives.
//!
//! Small dense helpers shared by the passes, plus the LDL^T factorization
//! used to solve the per-step control subsystems.

pub mod ldlt;

pub use ldlt::{DenseLdlt, LdltError};

use nalgebra::{DMatrix, DVector};

/// Infinity norm of a vector (0 for an empty vector).
#[inline]
pub fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()))
}

/// L1 norm of a vector.
#[inline]
pub fn l1_norm(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

/// Symmetrize a square matrix in place: M <- (M + M^T) / 2.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    debug_assert_eq!(m.nrows(), m.ncols());
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

/// Scale the rows of `m` by the entries of `d`: returns diag(d) * m.
pub fn row_scale(d: &DVector<f64>, m: &DMatrix<f64>) -> DMatrix<f64> {
    debug_assert_eq!(d.len(), m.nrows());
    let mut out = m.clone();
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            out[(i, j)] *= d[i];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norms() {
        let v = DVector::from_vec(vec![1.0, -3.0, 2.0]);
        assert_eq!(inf_norm(&v), 3.0);
        assert_eq!(l1_norm(&v), 6.0);
        assert_eq!(inf_norm(&DVector::zeros(0)), 0.0);
    }

    #[test]
    fn test_symmetrize() {
        let mut m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        symmetrize(&mut m);
        assert_eq!(m[(0, 1)], 3.0);
        assert_eq!(m[(1, 0)], 3.0);
    }

    #[test]
    fn test_row_scale() {
        let d = DVector::from_vec(vec![2.0, 3.0]);
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let s = row_scale(&d, &m);
        assert_eq!(s[(0, 0)], 2.0);
        assert_eq!(s[(1, 1)], 3.0);
    }
}
