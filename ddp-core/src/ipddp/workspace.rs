//! Pre-allocated solver workspace.
//!
//! Allocated once on first initialize and reused across iterations. The
//! backward pass has exclusive access; parallel line-search workers
//! operate on their own trial trajectories and never touch it.

#![allow(non_snake_case)]

use nalgebra::{DMatrix, DVector};

use crate::linalg::DenseLdlt;

/// Combined-constraint scratch and the per-step factorization cache.
#[derive(Debug)]
pub struct IpddpWorkspace {
    horizon: usize,
    state_dim: usize,
    control_dim: usize,
    total_dual_dim: usize,

    /// Cached factorizations of the regularized Q_uu blocks.
    pub ldlt_cache: Vec<Option<DenseLdlt>>,
    /// Per-step cache validity; invalidated on any trajectory or
    /// regularization update.
    pub ldlt_valid: Vec<bool>,

    /// Combined dual vector over all constraints at one step.
    pub y_comb: DVector<f64>,
    /// Combined slack vector.
    pub s_comb: DVector<f64>,
    /// Combined residual vector.
    pub g_comb: DVector<f64>,
    /// Stacked constraint state Jacobian (total_dual, n_x).
    pub G_x_comb: DMatrix<f64>,
    /// Stacked constraint control Jacobian (total_dual, n_u).
    pub G_u_comb: DMatrix<f64>,
}

impl Default for IpddpWorkspace {
    fn default() -> Self {
        Self {
            horizon: 0,
            state_dim: 0,
            control_dim: 0,
            total_dual_dim: 0,
            ldlt_cache: Vec::new(),
            ldlt_valid: Vec::new(),
            y_comb: DVector::zeros(0),
            s_comb: DVector::zeros(0),
            g_comb: DVector::zeros(0),
            G_x_comb: DMatrix::zeros(0, 0),
            G_u_comb: DMatrix::zeros(0, 0),
        }
    }
}

impl IpddpWorkspace {
    /// Size (or resize) all storage for the given problem dimensions.
    /// A no-op when the dimensions are unchanged.
    pub fn ensure(
        &mut self,
        horizon: usize,
        state_dim: usize,
        control_dim: usize,
        total_dual_dim: usize,
    ) {
        if self.horizon == horizon
            && self.state_dim == state_dim
            && self.control_dim == control_dim
            && self.total_dual_dim == total_dual_dim
            && !self.ldlt_valid.is_empty()
        {
            return;
        }

        self.horizon = horizon;
        self.state_dim = state_dim;
        self.control_dim = control_dim;
        self.total_dual_dim = total_dual_dim;

        self.ldlt_cache = vec![None; horizon];
        self.ldlt_valid = vec![false; horizon];

        self.y_comb = DVector::zeros(total_dual_dim);
        self.s_comb = DVector::zeros(total_dual_dim);
        self.g_comb = DVector::zeros(total_dual_dim);
        self.G_x_comb = DMatrix::zeros(total_dual_dim, state_dim);
        self.G_u_comb = DMatrix::zeros(total_dual_dim, control_dim);
    }

    /// Mark every cached factorization stale.
    pub fn invalidate_factorizations(&mut self) {
        for valid in &mut self.ldlt_valid {
            *valid = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_sizes_storage() {
        let mut ws = IpddpWorkspace::default();
        ws.ensure(5, 4, 2, 3);
        assert_eq!(ws.ldlt_cache.len(), 5);
        assert!(ws.ldlt_valid.iter().all(|v| !v));
        assert_eq!(ws.y_comb.len(), 3);
        assert_eq!(ws.G_x_comb.shape(), (3, 4));
        assert_eq!(ws.G_u_comb.shape(), (3, 2));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut ws = IpddpWorkspace::default();
        ws.ensure(3, 2, 1, 0);
        ws.ldlt_valid[2] = true;
        ws.ensure(3, 2, 1, 0);
        assert!(ws.ldlt_valid[2], "unchanged dimensions must not reallocate");
        ws.ensure(4, 2, 1, 0);
        assert_eq!(ws.ldlt_valid.len(), 4);
        assert!(ws.ldlt_valid.iter().all(|v| !v));
    }

    #[test]
    fn test_invalidate_factorizations() {
        let mut ws = IpddpWorkspace::default();
        ws.ensure(3, 2, 1, 0);
        ws.ldlt_valid[1] = true;
        ws.invalidate_factorizations();
        assert!(ws.ldlt_valid.iter().all(|v| !v));
    }
}
