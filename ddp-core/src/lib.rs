//! ddp-core: constrained differential dynamic programming for trajectory optimization
//!
//! This library solves finite-horizon, discrete-time, constrained nonlinear
//! trajectory-optimization problems
//!
//! ```text
//! minimize    phi(x_N) + sum_t l_t(x_t, u_t)
//! subject to  x_{t+1} = f_t(x_t, u_t),  x_0 given,
//!             g_t(x_t, u_t) <= 0
//! ```
//!
//! and returns a locally optimal state/control trajectory together with
//! time-varying feedback gains suitable for closed-loop tracking.
//!
//! # Algorithm
//!
//! The built-in solver is **interior-point DDP (IPDDP)**:
//!
//! - A second-order backward Riccati-like recursion with barrier-augmented
//!   KKT reduction produces control, dual and slack gains.
//! - A primal-dual forward rollout with fraction-to-boundary safeguards,
//!   separate primal/dual step lengths and a filter line search proposes
//!   new iterates.
//! - A regularization and barrier-parameter loop couples the two passes.
//!
//! Additional solver strategies can be plugged in through the process-wide
//! registry ([`register_solver`]).
//!
//! # Example
//!
//! ```ignore
//! use ddp_core::{Cddp, CddpOptions};
//!
//! let mut solver = Cddp::new(x0, x_goal, 100, 0.05, system, objective, CddpOptions::default());
//! solver.add_path_constraint("control_bounds", constraint);
//!
//! let solution = solver.solve("IPDDP")?;
//! println!("{}: {} iterations, J = {}", solution.status, solution.iterations_completed,
//!          solution.final_objective);
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // DDP recursions need many parameters

pub mod context;
pub mod error;
pub mod ipddp;
pub mod linalg;
pub mod objective;
pub mod options;
pub mod problem;
pub mod registry;
pub mod solution;
pub mod solver;

pub use context::{Cddp, SolverPhase};
pub use error::CddpError;
pub use ipddp::IpddpSolver;
pub use objective::Objective;
pub use options::{
    BarrierOptions, BarrierStrategy, CddpOptions, FilterOptions, IpddpAlgorithmOptions,
    LineSearchOptions, RegularizationOptions,
};
pub use problem::{Constraint, DynamicalSystem};
pub use registry::{is_solver_registered, register_solver, registered_solvers};
pub use solution::{IterationHistory, Solution, SolveStatus};
pub use solver::SolverAlgorithm;
