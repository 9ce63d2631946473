//! Typed solve results.
//!
//! The solution is a plain record whose fields correspond one-to-one with
//! the documented output keys; optional iteration history is a sum type
//! rather than key presence.

use std::fmt;

use nalgebra::{DMatrix, DVector};

/// Terminal status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Scaled KKT error within tolerance.
    OptimalSolutionFound,
    /// Progress stalled with acceptable-level infeasibility.
    AcceptableSolutionFound,
    /// Iteration cap reached.
    MaxIterationsReached,
    /// CPU-time cap reached.
    MaxCpuTimeReached,
    /// Regularization saturated without meeting tolerance.
    RegularizationLimitReached,
    /// The requested solver name is not registered.
    UnknownSolver,
}

impl SolveStatus {
    /// True for the two converged statuses.
    pub fn converged(&self) -> bool {
        matches!(
            self,
            SolveStatus::OptimalSolutionFound | SolveStatus::AcceptableSolutionFound
        )
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::OptimalSolutionFound => "OptimalSolutionFound",
            SolveStatus::AcceptableSolutionFound => "AcceptableSolutionFound",
            SolveStatus::MaxIterationsReached => "MaxIterationsReached",
            SolveStatus::MaxCpuTimeReached => "MaxCpuTimeReached",
            SolveStatus::RegularizationLimitReached => "RegularizationLimitReached_NotConverged",
            SolveStatus::UnknownSolver => "UnknownSolver",
        };
        f.write_str(s)
    }
}

/// Per-iteration history arrays, all of uniform length (one entry for the
/// initial point plus one per accepted iteration).
#[derive(Debug, Clone, Default)]
pub struct IterationHistory {
    /// Objective value J.
    pub objective: Vec<f64>,
    /// Merit function M = J - mu * sum(log s).
    pub merit_function: Vec<f64>,
    /// Accepted primal step length.
    pub step_length_primal: Vec<f64>,
    /// Accepted dual step length.
    pub step_length_dual: Vec<f64>,
    /// Dual infeasibility max_t ||Q_u||_inf.
    pub dual_infeasibility: Vec<f64>,
    /// Primal infeasibility max_t ||g + s||_inf.
    pub primal_infeasibility: Vec<f64>,
    /// Complementary infeasibility max_t ||y.*s - mu||_inf.
    pub complementary_infeasibility: Vec<f64>,
    /// Barrier parameter mu.
    pub barrier_mu: Vec<f64>,
}

impl IterationHistory {
    pub(crate) fn push(
        &mut self,
        objective: f64,
        merit: f64,
        alpha_pr: f64,
        alpha_du: f64,
        inf_du: f64,
        inf_pr: f64,
        inf_comp: f64,
        mu: f64,
    ) {
        self.objective.push(objective);
        self.merit_function.push(merit);
        self.step_length_primal.push(alpha_pr);
        self.step_length_dual.push(alpha_du);
        self.dual_infeasibility.push(inf_du);
        self.primal_infeasibility.push(inf_pr);
        self.complementary_infeasibility.push(inf_comp);
        self.barrier_mu.push(mu);
    }
}

/// Result of a solve. Always well-formed: an unknown solver name yields a
/// record with empty trajectories and an explanatory status message.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Name of the solver that produced this record.
    pub solver_name: String,
    /// Terminal status.
    pub status: SolveStatus,
    /// Human-readable termination reason.
    pub status_message: String,
    /// Number of iterations completed.
    pub iterations_completed: usize,
    /// Wall-clock solve time in milliseconds.
    pub solve_time_ms: f64,
    /// Final objective value.
    pub final_objective: f64,
    /// Last accepted primal step length.
    pub final_step_length: f64,
    /// Time stamps t * dt, length N + 1.
    pub time_points: Vec<f64>,
    /// State trajectory, length N + 1.
    pub state_trajectory: Vec<DVector<f64>>,
    /// Control trajectory, length N.
    pub control_trajectory: Vec<DVector<f64>>,
    /// Control feedback gains K_u per step, each (n_u, n_x).
    pub control_feedback_gains: Vec<DMatrix<f64>>,
    /// Final Hessian regularization rho.
    pub final_regularization: f64,
    /// Final barrier parameter mu.
    pub final_barrier_parameter_mu: f64,
    /// Final primal infeasibility.
    pub final_primal_infeasibility: f64,
    /// Final dual infeasibility.
    pub final_dual_infeasibility: f64,
    /// Final complementary infeasibility.
    pub final_complementary_infeasibility: f64,
    /// Iteration history when requested via `return_iteration_info`.
    pub history: Option<IterationHistory>,
}

impl Solution {
    /// Empty record for an unregistered solver name.
    pub(crate) fn unknown_solver(solver_name: &str) -> Self {
        Self {
            solver_name: solver_name.to_string(),
            status: SolveStatus::UnknownSolver,
            status_message: format!(
                "UnknownSolver - no solver registered for '{}'",
                solver_name
            ),
            iterations_completed: 0,
            solve_time_ms: 0.0,
            final_objective: 0.0,
            final_step_length: 1.0,
            time_points: Vec::new(),
            state_trajectory: Vec::new(),
            control_trajectory: Vec::new(),
            control_feedback_gains: Vec::new(),
            final_regularization: 0.0,
            final_barrier_parameter_mu: 0.0,
            final_primal_infeasibility: 0.0,
            final_dual_infeasibility: 0.0,
            final_complementary_infeasibility: 0.0,
            history: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(
            SolveStatus::RegularizationLimitReached.to_string(),
            "RegularizationLimitReached_NotConverged"
        );
        assert_eq!(SolveStatus::UnknownSolver.to_string(), "UnknownSolver");
        assert!(SolveStatus::OptimalSolutionFound.converged());
        assert!(!SolveStatus::MaxIterationsReached.converged());
    }

    #[test]
    fn test_unknown_solver_record_shape() {
        let s = Solution::unknown_solver("NoSuchSolver");
        assert_eq!(s.status, SolveStatus::UnknownSolver);
        assert!(s.status_message.contains("UnknownSolver"));
        assert!(s.status_message.contains("NoSuchSolver"));
        assert!(s.state_trajectory.is_empty());
        assert!(s.control_trajectory.is_empty());
        assert!(s.time_points.is_empty());
    }
}
