//! Solver settings.
//!
//! One flat options tree consumed by the context and the solver
//! strategies. All values have sensible defaults; drivers typically
//! override `tolerance`, `max_iterations` and the barrier scales.

/// Barrier-parameter update strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierStrategy {
    /// mu <- max(mu_min, kappa_mu * mu) every iteration.
    Monotonic,
    /// IPOPT-style update gated on the KKT error E <= kappa_eps * mu.
    Ipopt,
    /// Adaptive reduction factor chosen from the ratio E / mu.
    #[default]
    Adaptive,
}

/// Line-search step ladder configuration.
#[derive(Debug, Clone)]
pub struct LineSearchOptions {
    /// Number of ladder entries tried per pass.
    pub max_iterations: usize,
    /// First (largest) step length.
    pub initial_step_size: f64,
    /// Smallest step length; appended when the geometric sequence would
    /// fall below it.
    pub min_step_size: f64,
    /// Geometric reduction factor between ladder entries.
    pub step_reduction_factor: f64,
}

impl Default for LineSearchOptions {
    fn default() -> Self {
        Self {
            max_iterations: 11,
            initial_step_size: 1.0,
            min_step_size: 1e-4,
            step_reduction_factor: 0.5,
        }
    }
}

impl LineSearchOptions {
    /// Build the step-size ladder: a geometric sequence from
    /// `initial_step_size`, clamped so `min_step_size` is always tried.
    pub fn ladder(&self) -> Vec<f64> {
        let mut alphas = Vec::with_capacity(self.max_iterations + 1);
        let mut alpha = self.initial_step_size;
        for i in 0..self.max_iterations {
            alphas.push(alpha);
            alpha *= self.step_reduction_factor;
            if alpha < self.min_step_size && i < self.max_iterations - 1 {
                alphas.push(self.min_step_size);
                break;
            }
        }
        if alphas.is_empty() {
            alphas.push(self.initial_step_size);
        }
        alphas
    }
}

/// Hessian regularization controller configuration.
#[derive(Debug, Clone)]
pub struct RegularizationOptions {
    /// Starting value of rho.
    pub initial_value: f64,
    /// Multiplicative update factor (multiplied on failure, divided on
    /// success).
    pub update_factor: f64,
    /// Lower clamp for rho.
    pub min_value: f64,
    /// Upper clamp for rho; reaching it terminates the solve.
    pub max_value: f64,
}

impl Default for RegularizationOptions {
    fn default() -> Self {
        Self {
            initial_value: 1e-6,
            update_factor: 10.0,
            min_value: 1e-8,
            max_value: 1e8,
        }
    }
}

/// Barrier-parameter configuration.
#[derive(Debug, Clone)]
pub struct BarrierOptions {
    /// Update strategy.
    pub strategy: BarrierStrategy,
    /// Initial barrier parameter mu.
    pub mu_initial: f64,
    /// Lower clamp for mu.
    pub mu_min_value: f64,
    /// Linear reduction factor kappa_mu.
    pub mu_update_factor: f64,
    /// Superlinear exponent theta_mu (mu^theta_mu branch).
    pub mu_update_power: f64,
    /// Minimum fraction-to-boundary coefficient tau_min.
    pub min_fraction_to_boundary: f64,
}

impl Default for BarrierOptions {
    fn default() -> Self {
        Self {
            strategy: BarrierStrategy::Adaptive,
            mu_initial: 1e-1,
            mu_min_value: 1e-8,
            mu_update_factor: 0.2,
            mu_update_power: 1.2,
            min_fraction_to_boundary: 0.99,
        }
    }
}

/// Filter line-search acceptance thresholds.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// s_M: merit must improve by at least this multiple of the trial
    /// violation.
    pub merit_acceptance_threshold: f64,
    /// gamma_theta: required relative violation decrease.
    pub violation_acceptance_threshold: f64,
    /// theta_max: above this violation only violation progress counts.
    pub max_violation_threshold: f64,
    /// Below this violation the Armijo test on the merit applies.
    pub min_violation_for_armijo_check: f64,
    /// eta_A: Armijo constant.
    pub armijo_constant: f64,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            merit_acceptance_threshold: 1e-4,
            violation_acceptance_threshold: 1e-4,
            max_violation_threshold: 1e4,
            min_violation_for_armijo_check: 1e-7,
            armijo_constant: 1e-4,
        }
    }
}

/// IPDDP-specific scales.
#[derive(Debug, Clone)]
pub struct IpddpAlgorithmOptions {
    /// Scale for dual-variable initialization (clamped to
    /// [0.01 * scale, 100 * scale]).
    pub dual_var_init_scale: f64,
    /// Floor for slack-variable initialization.
    pub slack_var_init_scale: f64,
}

impl Default for IpddpAlgorithmOptions {
    fn default() -> Self {
        Self {
            dual_var_init_scale: 1e-1,
            slack_var_init_scale: 1e-2,
        }
    }
}

/// Top-level solver options.
#[derive(Debug, Clone)]
pub struct CddpOptions {
    /// KKT/optimality tolerance.
    pub tolerance: f64,
    /// Cost-change tolerance for the acceptable-solution exit.
    pub acceptable_tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// CPU-time cap in seconds (0 disables the check).
    pub max_cpu_time: f64,
    /// Print the per-iteration table and summary.
    pub verbose: bool,
    /// Print backward/forward internals.
    pub debug: bool,
    /// Drop second-order dynamics tensors from the Q expansions.
    pub use_ilqr: bool,
    /// Parallelize derivative precomputation and line-search trials.
    pub enable_parallel: bool,
    /// Worker thread count (0 lets the thread pool decide).
    pub num_threads: usize,
    /// Record per-iteration history arrays in the solution.
    pub return_iteration_info: bool,
    /// Reuse trajectories, gains and multipliers from a previous solve.
    pub warm_start: bool,
    /// s_max in the IPOPT dual-infeasibility scaling.
    pub termination_scaling_max_factor: f64,
    /// Line-search ladder settings.
    pub line_search: LineSearchOptions,
    /// Regularization controller settings.
    pub regularization: RegularizationOptions,
    /// Barrier settings.
    pub barrier: BarrierOptions,
    /// Filter settings.
    pub filter: FilterOptions,
    /// IPDDP-specific scales.
    pub ipddp: IpddpAlgorithmOptions,
}

impl Default for CddpOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            acceptable_tolerance: 1e-4,
            max_iterations: 500,
            max_cpu_time: 0.0,
            verbose: false,
            debug: false,
            use_ilqr: false,
            enable_parallel: false,
            num_threads: 0,
            return_iteration_info: false,
            warm_start: false,
            termination_scaling_max_factor: 100.0,
            line_search: LineSearchOptions::default(),
            regularization: RegularizationOptions::default(),
            barrier: BarrierOptions::default(),
            filter: FilterOptions::default(),
            ipddp: IpddpAlgorithmOptions::default(),
        }
    }
}
