//! Solver context.
//!
//! [`Cddp`] owns the problem definition (system, objective, constraint
//! stores), the current primal trajectory, the regularization state and
//! the options, and dispatches `solve()` to a registered strategy. The
//! iterate fields are public so strategies (including externally
//! registered ones) can read the accepted iterate and publish metrics.

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::error::CddpError;
use crate::ipddp::WarmStartData;
use crate::objective::Objective;
use crate::options::CddpOptions;
use crate::problem::{Constraint, DynamicalSystem};
use crate::registry;
use crate::solution::{Solution, SolveStatus};

/// Lifecycle of the context across a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverPhase {
    /// Problem mutated since the last initialization.
    Uninitialized,
    /// A strategy is iterating.
    Solving,
    /// The last solve terminated with the given status.
    Terminated(SolveStatus),
}

/// Constrained-DDP solver context.
pub struct Cddp {
    initial_state: DVector<f64>,
    reference_state: DVector<f64>,
    horizon: usize,
    timestep: f64,
    system: Option<Box<dyn DynamicalSystem>>,
    objective: Option<Box<dyn Objective>>,
    options: CddpOptions,
    path_constraints: BTreeMap<String, Box<dyn Constraint>>,
    terminal_constraints: BTreeMap<String, Box<dyn Constraint>>,
    total_dual_dim: usize,
    initialized: bool,
    phase: SolverPhase,
    user_provided_trajectory: bool,

    /// State trajectory, length horizon + 1 once initialized.
    pub states: Vec<DVector<f64>>,
    /// Control trajectory, length horizon.
    pub controls: Vec<DVector<f64>>,
    /// Current objective value.
    pub cost: f64,
    /// Current merit function value (cost plus barrier terms).
    pub merit_function: f64,
    /// Primal infeasibility max_t ||g + s||_inf.
    pub inf_pr: f64,
    /// Dual infeasibility max_t ||Q_u||_inf.
    pub inf_du: f64,
    /// Complementary infeasibility max_t ||y.*s - mu||_inf.
    pub inf_comp: f64,
    /// Largest feedforward component from the last backward pass.
    pub step_norm: f64,
    /// Last accepted primal step length.
    pub alpha_pr: f64,
    /// Last accepted dual step length.
    pub alpha_du: f64,
    /// Hessian regularization rho.
    pub regularization: f64,
    /// Symmetric counter for the terminal Hessian (kept for variant
    /// compatibility; the IPDDP core does not consume it).
    pub terminal_regularization: f64,
    /// Step-size ladder tried by line searches.
    pub alphas: Vec<f64>,

    warm_start_data: Option<WarmStartData>,
}

impl Cddp {
    /// Configure a new solver context.
    pub fn new(
        initial_state: DVector<f64>,
        reference_state: DVector<f64>,
        horizon: usize,
        timestep: f64,
        system: Box<dyn DynamicalSystem>,
        objective: Box<dyn Objective>,
        options: CddpOptions,
    ) -> Self {
        let alphas = options.line_search.ladder();
        let alpha_pr = options.line_search.initial_step_size;
        let regularization = options.regularization.initial_value;
        Self {
            initial_state,
            reference_state,
            horizon,
            timestep,
            system: Some(system),
            objective: Some(objective),
            options,
            path_constraints: BTreeMap::new(),
            terminal_constraints: BTreeMap::new(),
            total_dual_dim: 0,
            initialized: false,
            phase: SolverPhase::Uninitialized,
            user_provided_trajectory: false,
            states: Vec::new(),
            controls: Vec::new(),
            cost: f64::INFINITY,
            merit_function: f64::INFINITY,
            inf_pr: f64::INFINITY,
            inf_du: f64::INFINITY,
            inf_comp: f64::INFINITY,
            step_norm: 0.0,
            alpha_pr,
            alpha_du: 0.0,
            regularization,
            terminal_regularization: regularization,
            alphas,
            warm_start_data: None,
        }
    }

    // --- accessors ---

    /// Initial state x_0.
    pub fn initial_state(&self) -> &DVector<f64> {
        &self.initial_state
    }

    /// Reference state x_ref.
    pub fn reference_state(&self) -> &DVector<f64> {
        &self.reference_state
    }

    /// Number of control intervals N.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Integration step dt.
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    /// Solver options.
    pub fn options(&self) -> &CddpOptions {
        &self.options
    }

    /// The dynamical system. Panics if called before one is set; the
    /// configuration check in `solve()` guarantees presence.
    pub fn system(&self) -> &dyn DynamicalSystem {
        self.system.as_deref().expect("dynamical system not set")
    }

    /// The objective. Same presence guarantee as [`Cddp::system`].
    pub fn objective(&self) -> &dyn Objective {
        self.objective.as_deref().expect("objective not set")
    }

    /// State dimension of the configured system.
    pub fn state_dim(&self) -> usize {
        self.system().state_dim()
    }

    /// Control dimension of the configured system.
    pub fn control_dim(&self) -> usize {
        self.system().control_dim()
    }

    /// Named path-constraint store.
    pub fn path_constraints(&self) -> &BTreeMap<String, Box<dyn Constraint>> {
        &self.path_constraints
    }

    /// Named terminal-constraint store.
    pub fn terminal_constraints(&self) -> &BTreeMap<String, Box<dyn Constraint>> {
        &self.terminal_constraints
    }

    /// Total dual dimension over all stored constraints.
    pub fn total_dual_dim(&self) -> usize {
        self.total_dual_dim
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    /// Gains and multipliers retained from the last solve, for warm starts.
    pub fn warm_start_data(&self) -> Option<&WarmStartData> {
        self.warm_start_data.as_ref()
    }

    pub(crate) fn take_warm_start_data(&mut self) -> Option<WarmStartData> {
        self.warm_start_data.take()
    }

    pub(crate) fn store_warm_start_data(&mut self, data: WarmStartData) {
        self.warm_start_data = Some(data);
    }

    // --- mutation ---

    /// Replace the dynamical system; dimensions may change.
    pub fn set_dynamical_system(&mut self, system: Box<dyn DynamicalSystem>) {
        self.system = Some(system);
        self.mark_uninitialized();
    }

    /// Replace the objective.
    pub fn set_objective(&mut self, objective: Box<dyn Objective>) {
        self.objective = Some(objective);
        self.mark_uninitialized();
    }

    /// Change the initial state.
    pub fn set_initial_state(&mut self, initial_state: DVector<f64>) {
        if let Some(first) = self.states.first_mut() {
            if first.len() == initial_state.len() {
                *first = initial_state.clone();
            }
        }
        self.initial_state = initial_state;
    }

    /// Change the reference state.
    pub fn set_reference_state(&mut self, reference_state: DVector<f64>) {
        self.reference_state = reference_state;
    }

    /// Change the horizon; trajectory storage is resized at the next solve.
    pub fn set_horizon(&mut self, horizon: usize) {
        self.horizon = horizon;
        self.mark_uninitialized();
    }

    /// Change the timestep.
    pub fn set_timestep(&mut self, timestep: f64) {
        self.timestep = timestep;
    }

    /// Replace the options; the step ladder is rebuilt.
    pub fn set_options(&mut self, options: CddpOptions) {
        self.alphas = options.line_search.ladder();
        self.alpha_pr = options.line_search.initial_step_size;
        self.options = options;
    }

    /// Add a named path constraint. Replacing an existing name updates the
    /// total dual dimension accordingly.
    pub fn add_path_constraint(&mut self, name: impl Into<String>, constraint: Box<dyn Constraint>) {
        let name = name.into();
        if let Some(old) = self.path_constraints.get(&name) {
            self.total_dual_dim -= old.dual_dim();
        }
        self.total_dual_dim += constraint.dual_dim();
        self.path_constraints.insert(name, constraint);
        self.mark_uninitialized();
    }

    /// Remove a path constraint; returns whether it existed.
    pub fn remove_path_constraint(&mut self, name: &str) -> bool {
        match self.path_constraints.remove(name) {
            Some(c) => {
                self.total_dual_dim -= c.dual_dim();
                self.mark_uninitialized();
                true
            }
            None => false,
        }
    }

    /// Add a named terminal constraint.
    pub fn add_terminal_constraint(
        &mut self,
        name: impl Into<String>,
        constraint: Box<dyn Constraint>,
    ) {
        let name = name.into();
        if let Some(old) = self.terminal_constraints.get(&name) {
            self.total_dual_dim -= old.dual_dim();
        }
        self.total_dual_dim += constraint.dual_dim();
        self.terminal_constraints.insert(name, constraint);
        self.mark_uninitialized();
    }

    /// Remove a terminal constraint; returns whether it existed.
    pub fn remove_terminal_constraint(&mut self, name: &str) -> bool {
        match self.terminal_constraints.remove(name) {
            Some(c) => {
                self.total_dual_dim -= c.dual_dim();
                self.mark_uninitialized();
                true
            }
            None => false,
        }
    }

    /// Provide an initial trajectory. A dimension mismatch against the
    /// current horizon is warned about, not rejected; the next solve
    /// resizes as needed.
    pub fn set_initial_trajectory(&mut self, states: Vec<DVector<f64>>, controls: Vec<DVector<f64>>) {
        if states.len() != self.horizon + 1 || controls.len() != self.horizon {
            eprintln!(
                "warning: initial trajectory dimensions ({} states, {} controls) do not match horizon {}",
                states.len(),
                controls.len(),
                self.horizon
            );
        }
        self.states = states;
        self.controls = controls;
        self.user_provided_trajectory = true;
        if let Some(first) = self.states.first() {
            self.initial_state = first.clone();
        }
    }

    /// Whether the current trajectory came from the caller rather than
    /// from initialization.
    pub(crate) fn user_provided_trajectory(&self) -> bool {
        self.user_provided_trajectory
    }

    fn mark_uninitialized(&mut self) {
        self.initialized = false;
        self.phase = SolverPhase::Uninitialized;
    }

    // --- solving ---

    /// Solve with the named strategy. Returns `Err` only for
    /// configuration errors; an unknown solver name yields a well-formed
    /// `UnknownSolver` solution.
    pub fn solve(&mut self, solver_type: &str) -> Result<Solution, CddpError> {
        self.initialize_problem_if_necessary()?;

        let Some(mut solver) = registry::create_solver(solver_type) else {
            if self.options.verbose {
                eprintln!(
                    "solver '{}' not found; externally registered: {:?}, built-in: [\"IPDDP\"]",
                    solver_type,
                    registry::registered_solvers()
                );
            }
            self.phase = SolverPhase::Terminated(SolveStatus::UnknownSolver);
            return Ok(Solution::unknown_solver(solver_type));
        };

        self.phase = SolverPhase::Solving;
        if let Err(e) = solver.initialize(self) {
            self.phase = SolverPhase::Uninitialized;
            return Err(e);
        }
        let solution = solver.solve(self);
        self.phase = SolverPhase::Terminated(solution.status);
        Ok(solution)
    }

    /// Validate configuration and size the trajectory storage.
    pub(crate) fn initialize_problem_if_necessary(&mut self) -> Result<(), CddpError> {
        if self.initialized {
            return Ok(());
        }

        let system = self.system.as_deref().ok_or(CddpError::MissingSystem)?;
        let objective = self.objective.as_deref().ok_or(CddpError::MissingObjective)?;
        if self.horizon == 0 {
            return Err(CddpError::ZeroHorizon);
        }

        let state_dim = system.state_dim();
        let control_dim = system.control_dim();
        if self.initial_state.len() != state_dim {
            return Err(CddpError::DimensionMismatch {
                what: "initial state",
                expected: state_dim,
                actual: self.initial_state.len(),
            });
        }

        if let Some(obj_ref) = objective.reference_state() {
            if obj_ref.len() != self.reference_state.len()
                || (&obj_ref - &self.reference_state).norm() > 1e-6
            {
                return Err(CddpError::ReferenceStateMismatch);
            }
        }

        // Warm start keeps compatible trajectories, truncating on a
        // shrunk horizon; anything else is rebuilt from zeros.
        let preserve = self.options.warm_start
            && self.states.len() > self.horizon
            && self.controls.len() >= self.horizon
            && self.states[0].len() == state_dim
            && self.controls.first().map(|u| u.len()) == Some(control_dim);

        if self.states.len() != self.horizon + 1 || self.controls.len() != self.horizon {
            if preserve {
                self.states.truncate(self.horizon + 1);
                self.controls.truncate(self.horizon);
            } else {
                self.states = vec![DVector::zeros(state_dim); self.horizon + 1];
                self.controls = vec![DVector::zeros(control_dim); self.horizon];
                self.user_provided_trajectory = false;
            }
        } else if self.states[0].len() != state_dim
            || self.controls.first().map(|u| u.len()) != Some(control_dim)
        {
            self.states = vec![DVector::zeros(state_dim); self.horizon + 1];
            self.controls = vec![DVector::zeros(control_dim); self.horizon];
            self.user_provided_trajectory = false;
        }
        self.states[0] = self.initial_state.clone();

        self.cost = f64::INFINITY;
        self.merit_function = f64::INFINITY;
        self.inf_pr = f64::INFINITY;
        self.inf_du = f64::INFINITY;
        self.inf_comp = f64::INFINITY;
        self.regularization = self.options.regularization.initial_value;
        self.terminal_regularization = self.options.regularization.initial_value;

        self.initialized = true;
        Ok(())
    }

    // --- regularization controller ---

    /// Multiply rho by the update factor, clamped to the maximum.
    pub fn increase_regularization(&mut self) {
        let opts = &self.options.regularization;
        self.regularization = (self.regularization * opts.update_factor).min(opts.max_value);
    }

    /// Divide rho by the update factor, clamped to the minimum.
    pub fn decrease_regularization(&mut self) {
        let opts = &self.options.regularization;
        self.regularization = (self.regularization / opts.update_factor).max(opts.min_value);
    }

    /// Whether rho has saturated at its maximum.
    pub fn is_regularization_limit_reached(&self) -> bool {
        self.regularization >= self.options.regularization.max_value
    }

    /// Terminal-Hessian counterpart of [`Cddp::increase_regularization`].
    pub fn increase_terminal_regularization(&mut self) {
        let opts = &self.options.regularization;
        self.terminal_regularization =
            (self.terminal_regularization * opts.update_factor).min(opts.max_value);
    }

    /// Terminal-Hessian counterpart of [`Cddp::decrease_regularization`].
    pub fn decrease_terminal_regularization(&mut self) {
        let opts = &self.options.regularization;
        self.terminal_regularization =
            (self.terminal_regularization / opts.update_factor).max(opts.min_value);
    }

    /// Whether the terminal counter has saturated.
    pub fn is_terminal_regularization_limit_reached(&self) -> bool {
        self.terminal_regularization >= self.options.regularization.max_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    struct Lin;

    impl DynamicalSystem for Lin {
        fn state_dim(&self) -> usize {
            2
        }
        fn control_dim(&self) -> usize {
            1
        }
        fn discrete_dynamics(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            _t: f64,
        ) -> DVector<f64> {
            DVector::from_vec(vec![x[0] + 0.1 * x[1], x[1] + 0.1 * u[0]])
        }
        fn jacobians(
            &self,
            _x: &DVector<f64>,
            _u: &DVector<f64>,
            _t: f64,
        ) -> (DMatrix<f64>, DMatrix<f64>) {
            (
                DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
                DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            )
        }
    }

    struct Quad;

    impl Objective for Quad {
        fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, _i: usize) -> f64 {
            0.5 * (x.dot(x) + u.dot(u))
        }
        fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
            0.5 * x.dot(x)
        }
        fn running_cost_gradients(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            _i: usize,
        ) -> (DVector<f64>, DVector<f64>) {
            (x.clone(), u.clone())
        }
        fn running_cost_hessians(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            _i: usize,
        ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
            (
                DMatrix::identity(x.len(), x.len()),
                DMatrix::identity(u.len(), u.len()),
                DMatrix::zeros(u.len(), x.len()),
            )
        }
        fn final_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
            x.clone()
        }
        fn final_cost_hessian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::identity(x.len(), x.len())
        }
    }

    struct UnitBound;

    impl Constraint for UnitBound {
        fn dual_dim(&self) -> usize {
            2
        }
        fn evaluate(&self, _x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![u[0], -u[0]])
        }
        fn upper_bound(&self) -> DVector<f64> {
            DVector::from_vec(vec![1.0, 1.0])
        }
        fn state_jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::zeros(2, 2)
        }
        fn control_jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(2, 1, &[1.0, -1.0])
        }
    }

    fn make_context() -> Cddp {
        Cddp::new(
            DVector::zeros(2),
            DVector::zeros(2),
            10,
            0.1,
            Box::new(Lin),
            Box::new(Quad),
            CddpOptions::default(),
        )
    }

    #[test]
    fn test_dual_dim_bookkeeping() {
        let mut ctx = make_context();
        assert_eq!(ctx.total_dual_dim(), 0);
        ctx.add_path_constraint("bounds", Box::new(UnitBound));
        assert_eq!(ctx.total_dual_dim(), 2);
        ctx.add_path_constraint("bounds", Box::new(UnitBound)); // replace
        assert_eq!(ctx.total_dual_dim(), 2);
        assert!(ctx.remove_path_constraint("bounds"));
        assert_eq!(ctx.total_dual_dim(), 0);
        assert!(!ctx.remove_path_constraint("bounds"));
    }

    #[test]
    fn test_initialize_sizes_trajectory() {
        let mut ctx = make_context();
        ctx.initialize_problem_if_necessary().unwrap();
        assert_eq!(ctx.states.len(), 11);
        assert_eq!(ctx.controls.len(), 10);
        assert_eq!(ctx.states[0], DVector::zeros(2));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let mut ctx = make_context();
        ctx.set_horizon(0);
        assert!(matches!(
            ctx.initialize_problem_if_necessary(),
            Err(CddpError::ZeroHorizon)
        ));
    }

    #[test]
    fn test_initial_state_dimension_checked() {
        let mut ctx = make_context();
        ctx.set_initial_state(DVector::zeros(3));
        assert!(matches!(
            ctx.initialize_problem_if_necessary(),
            Err(CddpError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_regularization_clamps() {
        let mut ctx = make_context();
        for _ in 0..40 {
            ctx.increase_regularization();
        }
        assert!(ctx.is_regularization_limit_reached());
        assert_eq!(ctx.regularization, 1e8);
        for _ in 0..80 {
            ctx.decrease_regularization();
        }
        assert_eq!(ctx.regularization, 1e-8);
    }

    #[test]
    fn test_unknown_solver_solution() {
        let mut ctx = make_context();
        let solution = ctx.solve("NoSuchSolver").unwrap();
        assert_eq!(solution.status, SolveStatus::UnknownSolver);
        assert!(solution.status_message.contains("UnknownSolver"));
        assert!(solution.state_trajectory.is_empty());
        assert_eq!(ctx.phase(), SolverPhase::Terminated(SolveStatus::UnknownSolver));
    }
}
