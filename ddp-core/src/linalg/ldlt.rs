//! Dense LDL^T factorization with a positive-definiteness probe.
//!
//! Computes A = L D L^T with unit-lower-triangular L and diagonal D for a
//! symmetric matrix A. The backward pass factors the regularized control
//! Hessian with this routine; a non-positive pivot is reported as a
//! factorization failure so the driver can raise the regularization and
//! retry.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// LDL^T factorization errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LdltError {
    /// Encountered a non-positive (or non-finite) pivot.
    #[error("factorization failed: non-positive pivot at index {pivot}")]
    NotPositiveDefinite {
        /// Index of the offending pivot
        pivot: usize,
    },

    /// The input matrix is not square.
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare {
        /// Row count
        rows: usize,
        /// Column count
        cols: usize,
    },
}

/// Factored form of a symmetric positive definite matrix.
#[derive(Debug, Clone)]
pub struct DenseLdlt {
    n: usize,
    /// Strictly lower triangle of L (unit diagonal implied).
    l: DMatrix<f64>,
    /// Diagonal D.
    d: DVector<f64>,
}

impl DenseLdlt {
    /// Factor a symmetric matrix. Only the lower triangle of `a` is read.
    pub fn factor(a: &DMatrix<f64>) -> Result<Self, LdltError> {
        if a.nrows() != a.ncols() {
            return Err(LdltError::NotSquare {
                rows: a.nrows(),
                cols: a.ncols(),
            });
        }
        let n = a.nrows();
        let mut l = DMatrix::<f64>::zeros(n, n);
        let mut d = DVector::<f64>::zeros(n);

        for j in 0..n {
            let mut dj = a[(j, j)];
            for k in 0..j {
                dj -= l[(j, k)] * l[(j, k)] * d[k];
            }
            if !(dj.is_finite() && dj > 0.0) {
                return Err(LdltError::NotPositiveDefinite { pivot: j });
            }
            d[j] = dj;
            for i in (j + 1)..n {
                let mut lij = a[(i, j)];
                for k in 0..j {
                    lij -= l[(i, k)] * l[(j, k)] * d[k];
                }
                l[(i, j)] = lij / dj;
            }
        }

        Ok(Self { n, l, d })
    }

    /// Dimension of the factored matrix.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve A X = B in place for a multi-column right-hand side.
    pub fn solve_in_place(&self, b: &mut DMatrix<f64>) {
        debug_assert_eq!(b.nrows(), self.n);
        for col in 0..b.ncols() {
            // Forward substitution: L z = b
            for i in 0..self.n {
                let mut zi = b[(i, col)];
                for k in 0..i {
                    zi -= self.l[(i, k)] * b[(k, col)];
                }
                b[(i, col)] = zi;
            }
            // Diagonal scaling: D w = z
            for i in 0..self.n {
                b[(i, col)] /= self.d[i];
            }
            // Back substitution: L^T x = w
            for i in (0..self.n).rev() {
                let mut xi = b[(i, col)];
                for k in (i + 1)..self.n {
                    xi -= self.l[(k, i)] * b[(k, col)];
                }
                b[(i, col)] = xi;
            }
        }
    }

    /// Solve A x = b for a single right-hand side.
    pub fn solve_vec(&self, b: &DVector<f64>) -> DVector<f64> {
        let mut rhs = DMatrix::from_column_slice(self.n, 1, b.as_slice());
        self.solve_in_place(&mut rhs);
        rhs.column(0).clone_owned()
    }

    /// Solve A X = B, returning the solution.
    pub fn solve_mat(&self, b: &DMatrix<f64>) -> DMatrix<f64> {
        let mut rhs = b.clone();
        self.solve_in_place(&mut rhs);
        rhs
    }
}
