//! Interior-point DDP solver.
//!
//! The strategy is split the way the recursion is structured:
//! - [`backward`]: the Riccati-like sweep with barrier-augmented KKT
//!   reduction producing control, dual and slack gains;
//! - [`forward`]: primal-dual rollouts under fraction-to-boundary and a
//!   filter acceptance test;
//! - [`barrier`]: barrier-parameter update strategies;
//! - [`workspace`]: pre-allocated scratch and the per-step factorization
//!   cache;
//! - [`solver`]: the driver loop coupling the passes through the
//!   regularization and barrier state.

pub mod backward;
pub mod barrier;
pub mod filter;
pub mod forward;
pub mod solver;
pub mod workspace;

pub use filter::{Filter, FilterPoint};
pub use forward::ForwardPassResult;
pub use solver::IpddpSolver;
pub use workspace::IpddpWorkspace;

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

/// Gains and multipliers retained on the context between solves so a
/// subsequent warm-started solve can reuse them. Indexed per time step;
/// dual/slack stores are keyed by constraint name.
#[derive(Debug, Clone, Default)]
#[allow(non_snake_case)]
pub struct WarmStartData {
    /// Control feedforward gains.
    pub k_u: Vec<DVector<f64>>,
    /// Control feedback gains.
    pub K_u: Vec<DMatrix<f64>>,
    /// Dual variables y per constraint and step.
    pub y: BTreeMap<String, Vec<DVector<f64>>>,
    /// Slack variables s per constraint and step.
    pub s: BTreeMap<String, Vec<DVector<f64>>>,
}
