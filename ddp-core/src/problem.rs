//! Problem capability contracts.
//!
//! A trajectory-optimization problem is assembled from three collaborator
//! contracts: a [`DynamicalSystem`] (the discrete shooting map and its
//! derivatives), an [`crate::Objective`] (stage and terminal costs), and any
//! number of named [`Constraint`]s. Implementations must be `Send + Sync`
//! so derivative precomputation and line-search trials can be fanned out
//! across threads against a shared, immutable iterate.

use nalgebra::{DMatrix, DVector};

/// Discrete-time dynamical system supplied by the user.
///
/// `jacobians` returns the *continuous-time* Jacobians (F_x, F_u); the
/// backward pass forms the discrete linearization A = I + dt*F_x,
/// B = dt*F_u itself. `discrete_dynamics` is the exact shooting map used
/// for rollouts, so forward-pass trajectories satisfy
/// x_{t+1} = f(x_t, u_t) to machine precision.
pub trait DynamicalSystem: Send + Sync {
    /// State dimension n_x.
    fn state_dim(&self) -> usize;

    /// Control dimension n_u.
    fn control_dim(&self) -> usize;

    /// Discrete dynamics x' = f(x, u) at absolute time `t_abs`.
    fn discrete_dynamics(&self, x: &DVector<f64>, u: &DVector<f64>, t_abs: f64) -> DVector<f64>;

    /// Continuous-time Jacobians (dF/dx, dF/du), shapes (n_x, n_x) and (n_x, n_u).
    fn jacobians(&self, x: &DVector<f64>, u: &DVector<f64>, t_abs: f64)
        -> (DMatrix<f64>, DMatrix<f64>);

    /// Second-order dynamics tensors (F_xx, F_uu, F_ux), one matrix per
    /// state row: F_xx[i] is (n_x, n_x), F_uu[i] is (n_u, n_u), F_ux[i] is
    /// (n_u, n_x).
    ///
    /// The default returns empty tensors; such a system can only be solved
    /// in iLQR mode (`use_ilqr = true`).
    fn hessians(
        &self,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        _t_abs: f64,
    ) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
        (Vec::new(), Vec::new(), Vec::new())
    }
}

/// Inequality constraint g(x, u) <= 0 supplied by the user.
///
/// The raw evaluation is compared against a constant upper bound; the
/// residual used internally is g(x, u) = evaluate(x, u) - upper_bound(),
/// so g <= 0 is the feasible region.
pub trait Constraint: Send + Sync {
    /// Number of scalar constraint rows (dual dimension m_i).
    fn dual_dim(&self) -> usize;

    /// Raw constraint value, length `dual_dim()`.
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;

    /// Constant upper bound vector, length `dual_dim()`.
    fn upper_bound(&self) -> DVector<f64>;

    /// Jacobian of `evaluate` with respect to the state, shape (m_i, n_x).
    fn state_jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64>;

    /// Jacobian of `evaluate` with respect to the control, shape (m_i, n_u).
    fn control_jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64>;
}
