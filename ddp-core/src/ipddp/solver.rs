//! IPDDP driver.
//!
//! Couples the backward and forward passes through the regularization and
//! barrier state: initialization (cold, or two-tier warm start),
//! derivative precomputation, the iteration loop, convergence checks and
//! solution assembly.

#![allow(non_snake_case)]

use std::collections::BTreeMap;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::context::Cddp;
use crate::error::CddpError;
use crate::linalg::{inf_norm, l1_norm};
use crate::solution::{IterationHistory, Solution, SolveStatus};
use crate::solver::SolverAlgorithm;

use super::backward::backward_pass;
use super::barrier;
use super::filter::{Filter, FilterPoint};
use super::forward::perform_forward_pass;
use super::workspace::IpddpWorkspace;
use super::WarmStartData;

/// Below this horizon the per-step work is too small to amortize fork-join.
const MIN_HORIZON_FOR_PARALLEL: usize = 50;

/// Interior-point DDP strategy.
pub struct IpddpSolver {
    pub(crate) mu: f64,
    pub(crate) k_u: Vec<DVector<f64>>,
    pub(crate) K_u: Vec<DMatrix<f64>>,
    pub(crate) dV: [f64; 2],

    // Per-constraint, per-step stores.
    pub(crate) Y: BTreeMap<String, Vec<DVector<f64>>>,
    pub(crate) S: BTreeMap<String, Vec<DVector<f64>>>,
    pub(crate) G: BTreeMap<String, Vec<DVector<f64>>>,
    pub(crate) k_y: BTreeMap<String, Vec<DVector<f64>>>,
    pub(crate) K_y: BTreeMap<String, Vec<DMatrix<f64>>>,
    pub(crate) k_s: BTreeMap<String, Vec<DVector<f64>>>,
    pub(crate) K_s: BTreeMap<String, Vec<DMatrix<f64>>>,

    // Precomputed derivatives.
    pub(crate) F_x: Vec<DMatrix<f64>>,
    pub(crate) F_u: Vec<DMatrix<f64>>,
    pub(crate) F_xx: Vec<Vec<DMatrix<f64>>>,
    pub(crate) F_uu: Vec<Vec<DMatrix<f64>>>,
    pub(crate) F_ux: Vec<Vec<DMatrix<f64>>>,
    pub(crate) G_x: BTreeMap<String, Vec<DMatrix<f64>>>,
    pub(crate) G_u: BTreeMap<String, Vec<DMatrix<f64>>>,

    pub(crate) filter: Filter,
    pub(crate) workspace: IpddpWorkspace,
}

impl Default for IpddpSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IpddpSolver {
    /// Fresh solver state.
    pub fn new() -> Self {
        Self {
            mu: 1e-1,
            k_u: Vec::new(),
            K_u: Vec::new(),
            dV: [0.0, 0.0],
            Y: BTreeMap::new(),
            S: BTreeMap::new(),
            G: BTreeMap::new(),
            k_y: BTreeMap::new(),
            K_y: BTreeMap::new(),
            k_s: BTreeMap::new(),
            K_s: BTreeMap::new(),
            F_x: Vec::new(),
            F_u: Vec::new(),
            F_xx: Vec::new(),
            F_uu: Vec::new(),
            F_ux: Vec::new(),
            G_x: BTreeMap::new(),
            G_u: BTreeMap::new(),
            filter: Filter::new(),
            workspace: IpddpWorkspace::default(),
        }
    }

    fn zero_gains(&mut self, horizon: usize, state_dim: usize, control_dim: usize) {
        self.k_u = vec![DVector::zeros(control_dim); horizon];
        self.K_u = vec![DMatrix::zeros(control_dim, state_dim); horizon];
        self.dV = [0.0, 0.0];
    }

    /// Total dual dimension over the path constraints.
    fn total_dual_dim(ctx: &Cddp) -> usize {
        ctx.path_constraints().values().map(|c| c.dual_dim()).sum()
    }

    /// Size the per-constraint stores for the current constraint set.
    fn initialize_constraint_storage(&mut self, ctx: &Cddp) {
        let horizon = ctx.horizon();
        let state_dim = ctx.state_dim();
        let control_dim = ctx.control_dim();

        self.Y.clear();
        self.S.clear();
        self.G.clear();
        self.k_y.clear();
        self.K_y.clear();
        self.k_s.clear();
        self.K_s.clear();
        self.G_x.clear();
        self.G_u.clear();

        for (name, c) in ctx.path_constraints() {
            let d = c.dual_dim();
            let vec_store = || vec![DVector::zeros(d); horizon];
            self.Y.insert(name.clone(), vec_store());
            self.S.insert(name.clone(), vec_store());
            self.G.insert(name.clone(), vec_store());
            self.k_y.insert(name.clone(), vec_store());
            self.k_s.insert(name.clone(), vec_store());
            self.K_y
                .insert(name.clone(), vec![DMatrix::zeros(d, state_dim); horizon]);
            self.K_s
                .insert(name.clone(), vec![DMatrix::zeros(d, state_dim); horizon]);
            self.G_x
                .insert(name.clone(), vec![DMatrix::zeros(d, state_dim); horizon]);
            self.G_u
                .insert(name.clone(), vec![DMatrix::zeros(d, control_dim); horizon]);
        }
    }

    /// Re-roll the trajectory from x_0 under the current controls,
    /// evaluating cost and constraint residuals along the way.
    fn evaluate_trajectory(&mut self, ctx: &mut Cddp) {
        let horizon = ctx.horizon();
        let dt = ctx.timestep();
        let mut states = ctx.states.clone();
        states[0] = ctx.initial_state().clone();
        let mut cost = 0.0;
        {
            let system = ctx.system();
            let objective = ctx.objective();
            for t in 0..horizon {
                let u = &ctx.controls[t];
                cost += objective.running_cost(&states[t], u, t);
                for (name, c) in ctx.path_constraints() {
                    self.G.get_mut(name).expect("constraint storage initialized")[t] =
                        c.evaluate(&states[t], u) - c.upper_bound();
                }
                states[t + 1] = system.discrete_dynamics(&states[t], u, t as f64 * dt);
            }
            cost += objective.terminal_cost(&states[horizon]);
        }
        ctx.states = states;
        ctx.cost = cost;
    }

    /// Evaluate cost and residuals on the trajectory as provided, without
    /// re-rolling the dynamics (warm starts keep the caller's states).
    fn evaluate_trajectory_warm(&mut self, ctx: &mut Cddp) {
        let horizon = ctx.horizon();
        let mut cost = 0.0;
        {
            let objective = ctx.objective();
            for t in 0..horizon {
                let x = &ctx.states[t];
                let u = &ctx.controls[t];
                cost += objective.running_cost(x, u, t);
                for (name, c) in ctx.path_constraints() {
                    self.G.get_mut(name).expect("constraint storage initialized")[t] =
                        c.evaluate(x, u) - c.upper_bound();
                }
            }
            cost += objective.terminal_cost(&ctx.states[horizon]);
        }
        ctx.cost = cost;
    }

    /// Cold dual/slack initialization:
    /// s_i = max(slack_scale, -g_i), y_i = clamp(mu / s_i,
    /// 0.01 * dual_scale, 100 * dual_scale).
    fn initialize_dual_slack(&mut self, ctx: &mut Cddp) {
        let horizon = ctx.horizon();
        let mu = self.mu;
        let slack_scale = ctx.options().ipddp.slack_var_init_scale;
        let dual_scale = ctx.options().ipddp.dual_var_init_scale;

        for (name, c) in ctx.path_constraints() {
            let d = c.dual_dim();
            for t in 0..horizon {
                let g = c.evaluate(&ctx.states[t], &ctx.controls[t]) - c.upper_bound();
                let mut s = DVector::zeros(d);
                let mut y = DVector::zeros(d);
                for i in 0..d {
                    s[i] = slack_scale.max(-g[i]);
                    let yi = if s[i] < 1e-12 { mu / 1e-12 } else { mu / s[i] };
                    y[i] = yi.clamp(0.01 * dual_scale, 100.0 * dual_scale);
                }
                self.G.get_mut(name).expect("constraint storage initialized")[t] = g;
                self.S.get_mut(name).expect("constraint storage initialized")[t] = s;
                self.Y.get_mut(name).expect("constraint storage initialized")[t] = y;
            }
        }
        let cost = ctx.objective().evaluate(&ctx.states, &ctx.controls);
        ctx.cost = cost;
    }

    /// Warm dual/slack initialization: reuse `existing` values where they
    /// are positive and carry enough slack for the current residuals,
    /// falling back to the cold formula elsewhere. Residuals must already
    /// be evaluated into `self.G`.
    fn initialize_dual_slack_warm(
        &mut self,
        ctx: &Cddp,
        existing: Option<(
            &BTreeMap<String, Vec<DVector<f64>>>,
            &BTreeMap<String, Vec<DVector<f64>>>,
        )>,
    ) {
        let horizon = ctx.horizon();
        let mu = self.mu;
        let slack_scale = ctx.options().ipddp.slack_var_init_scale;
        let dual_scale = ctx.options().ipddp.dual_var_init_scale;
        let mut preserved = 0usize;
        let mut reinitialized = 0usize;

        for (name, c) in ctx.path_constraints() {
            let d = c.dual_dim();
            for t in 0..horizon {
                let g = self.G[name][t].clone();

                let mut reuse = None;
                if let Some((y_old, s_old)) = existing {
                    if let (Some(y_traj), Some(s_traj)) = (y_old.get(name), s_old.get(name)) {
                        if y_traj.len() > t
                            && s_traj.len() > t
                            && y_traj[t].len() == d
                            && s_traj[t].len() == d
                        {
                            let feasible = (0..d).all(|i| {
                                y_traj[t][i] > 1e-12
                                    && s_traj[t][i] > 1e-12
                                    && s_traj[t][i] >= 0.1 * slack_scale.max(-g[i])
                            });
                            if feasible {
                                reuse = Some((y_traj[t].clone(), s_traj[t].clone()));
                            }
                        }
                    }
                }

                let (y, s) = match reuse {
                    Some(pair) => {
                        preserved += 1;
                        pair
                    }
                    None => {
                        reinitialized += 1;
                        let mut s = DVector::zeros(d);
                        let mut y = DVector::zeros(d);
                        for i in 0..d {
                            s[i] = slack_scale.max(-g[i]);
                            let yi = if s[i] < 1e-12 { mu / 1e-12 } else { mu / s[i] };
                            y[i] = yi.clamp(0.01 * dual_scale, 100.0 * dual_scale);
                        }
                        (y, s)
                    }
                };
                self.Y.get_mut(name).expect("constraint storage initialized")[t] = y;
                self.S.get_mut(name).expect("constraint storage initialized")[t] = s;
            }
        }

        if ctx.options().verbose && !ctx.path_constraints().is_empty() {
            eprintln!(
                "warm start: {} dual/slack entries preserved, {} reinitialized, mu = {:.2e}",
                preserved, reinitialized, mu
            );
        }
    }

    /// Merit and infeasibility of the current iterate, and a filter reset
    /// seeded with it.
    pub(crate) fn reset_filter(&mut self, ctx: &mut Cddp) {
        let horizon = ctx.horizon();
        let mu = self.mu;
        let mut merit = ctx.cost;
        let mut inf_pr = 0.0_f64;
        let mut violation = 0.0_f64;
        let mut inf_comp = 0.0_f64;

        for name in ctx.path_constraints().keys() {
            for t in 0..horizon {
                let s = &self.S[name][t];
                let g = &self.G[name][t];
                let y = &self.Y[name][t];

                merit -= mu * s.iter().map(|&v| v.ln()).sum::<f64>();

                let r_primal = g + s;
                inf_pr = inf_pr.max(inf_norm(&r_primal));
                violation += l1_norm(&r_primal);

                let comp = (0..s.len())
                    .map(|i| (y[i] * s[i] - mu).abs())
                    .fold(0.0_f64, f64::max);
                inf_comp = inf_comp.max(comp);
            }
        }

        ctx.merit_function = merit;
        ctx.inf_pr = inf_pr;
        ctx.inf_comp = inf_comp;
        self.filter.reset(FilterPoint::new(merit, violation));
    }

    /// Largest (signed) constraint residual over the horizon.
    fn max_constraint_violation(&self, ctx: &Cddp) -> f64 {
        let mut violation = 0.0_f64;
        for name in ctx.path_constraints().keys() {
            for g in &self.G[name] {
                violation = g.iter().fold(violation, |acc, &v| acc.max(v));
            }
        }
        violation
    }

    /// Precompute dynamics Jacobians (and Hessians unless iLQR) for every
    /// step, fanning out over the horizon for long problems.
    fn precompute_dynamics_derivatives(&mut self, ctx: &Cddp, pool: Option<&rayon::ThreadPool>) {
        let horizon = ctx.horizon();
        let dt = ctx.timestep();
        let use_ilqr = ctx.options().use_ilqr;

        let compute = |t: usize| {
            let x = &ctx.states[t];
            let u = &ctx.controls[t];
            let (fx, fu) = ctx.system().jacobians(x, u, t as f64 * dt);
            let (fxx, fuu, fux) = if use_ilqr {
                (Vec::new(), Vec::new(), Vec::new())
            } else {
                ctx.system().hessians(x, u, t as f64 * dt)
            };
            (fx, fu, fxx, fuu, fux)
        };

        let results: Vec<_> = match pool {
            Some(pool) if horizon >= MIN_HORIZON_FOR_PARALLEL => {
                pool.install(|| (0..horizon).into_par_iter().map(compute).collect())
            }
            _ => (0..horizon).map(compute).collect(),
        };

        self.F_x.clear();
        self.F_u.clear();
        self.F_xx.clear();
        self.F_uu.clear();
        self.F_ux.clear();
        for (fx, fu, fxx, fuu, fux) in results {
            self.F_x.push(fx);
            self.F_u.push(fu);
            self.F_xx.push(fxx);
            self.F_uu.push(fuu);
            self.F_ux.push(fux);
        }
    }

    /// Precompute constraint Jacobians for every step and constraint.
    fn precompute_constraint_jacobians(&mut self, ctx: &Cddp, pool: Option<&rayon::ThreadPool>) {
        if ctx.path_constraints().is_empty() {
            return;
        }
        let horizon = ctx.horizon();

        let compute = |t: usize| {
            let x = &ctx.states[t];
            let u = &ctx.controls[t];
            ctx.path_constraints()
                .values()
                .map(|c| (c.state_jacobian(x, u), c.control_jacobian(x, u)))
                .collect::<Vec<_>>()
        };

        let results: Vec<Vec<_>> = match pool {
            Some(pool) if horizon >= MIN_HORIZON_FOR_PARALLEL => {
                pool.install(|| (0..horizon).into_par_iter().map(compute).collect())
            }
            _ => (0..horizon).map(compute).collect(),
        };

        let names: Vec<String> = ctx.path_constraints().keys().cloned().collect();
        for (t, per_constraint) in results.into_iter().enumerate() {
            for (name, (gx, gu)) in names.iter().zip(per_constraint) {
                self.G_x.get_mut(name).expect("constraint storage initialized")[t] = gx;
                self.G_u.get_mut(name).expect("constraint storage initialized")[t] = gu;
            }
        }
    }

    fn check_convergence(&self, ctx: &Cddp, dJ: f64, iter: usize) -> Option<SolveStatus> {
        let opts = ctx.options();
        let scaled_inf_du = barrier::scaled_dual_infeasibility(self, ctx);
        let metric = scaled_inf_du.max(ctx.inf_pr).max(ctx.inf_comp);

        if metric <= opts.tolerance {
            if opts.verbose {
                eprintln!(
                    "converged: scaled KKT metric {:.2e} within tolerance (scaled inf_du {:.2e})",
                    metric, scaled_inf_du
                );
            }
            return Some(SolveStatus::OptimalSolutionFound);
        }

        if dJ.abs() < opts.acceptable_tolerance && iter > 10 {
            let acceptable = opts.acceptable_tolerance.sqrt();
            if ctx.inf_pr < acceptable && ctx.inf_comp < acceptable {
                if opts.verbose {
                    eprintln!("converged: cost change {:.2e} with acceptable infeasibility", dJ.abs());
                }
                return Some(SolveStatus::AcceptableSolutionFound);
            }
        }

        if iter >= 1 && ctx.step_norm < opts.tolerance * 10.0 && ctx.inf_pr < 1e-4 {
            if opts.verbose {
                eprintln!("converged: small step norm {:.2e} with feasibility", ctx.step_norm);
            }
            return Some(SolveStatus::AcceptableSolutionFound);
        }

        None
    }

    fn print_iteration(&self, iter: usize, ctx: &Cddp, alpha_du: f64) {
        if iter == 0 {
            println!(
                "{:>4} {:>13} {:>9} {:>9} {:>9} {:>7} {:>9} {:>7} {:>9} {:>9}",
                "iter", "objective", "inf_pr", "inf_du", "inf_comp", "lg(mu)", "||d||", "lg(rg)", "alpha_du", "alpha_pr"
            );
        }
        println!(
            "{:>4} {:>13.6e} {:>9.2e} {:>9.2e} {:>9.2e} {:>7.1} {:>9.2e} {:>7.1} {:>9.6} {:>9.6}",
            iter,
            ctx.cost,
            ctx.inf_pr,
            ctx.inf_du,
            ctx.inf_comp,
            self.mu.log10(),
            ctx.step_norm,
            ctx.regularization.log10(),
            alpha_du,
            ctx.alpha_pr,
        );
    }

    fn print_summary(&self, solution: &Solution) {
        println!("\n========================================");
        println!("           IPDDP Solution Summary");
        println!("========================================");
        println!("Status: {}", solution.status_message);
        println!("Iterations: {}", solution.iterations_completed);
        println!("Solve Time: {:.2} ms", solution.solve_time_ms);
        println!("Final Cost: {:.6}", solution.final_objective);
        println!("Final Barrier mu: {:.2e}", solution.final_barrier_parameter_mu);
        println!("========================================\n");
    }
}

impl SolverAlgorithm for IpddpSolver {
    fn name(&self) -> &str {
        "IPDDP"
    }

    fn initialize(&mut self, ctx: &mut Cddp) -> Result<(), CddpError> {
        ctx.initialize_problem_if_necessary()?;

        let opts = ctx.options().clone();
        let horizon = ctx.horizon();
        let state_dim = ctx.state_dim();
        let control_dim = ctx.control_dim();
        let constrained = !ctx.path_constraints().is_empty();

        self.workspace
            .ensure(horizon, state_dim, control_dim, Self::total_dual_dim(ctx));
        self.workspace.invalidate_factorizations();
        self.filter = Filter::new();

        if opts.warm_start {
            let stash = ctx.take_warm_start_data();
            let gains_valid = stash.as_ref().is_some_and(|w| {
                w.k_u.len() >= horizon
                    && w.K_u.len() >= horizon
                    && w.k_u.iter().take(horizon).all(|k| k.len() == control_dim)
                    && w.K_u
                        .iter()
                        .take(horizon)
                        .all(|K| K.shape() == (control_dim, state_dim))
            });

            if gains_valid {
                let stash = stash.expect("checked above");
                if opts.verbose {
                    eprintln!("warm start: reusing control gains");
                }
                self.k_u = stash.k_u[..horizon].to_vec();
                self.K_u = stash.K_u[..horizon].to_vec();
                self.dV = [0.0, 0.0];
                self.mu = if constrained {
                    opts.barrier.mu_initial * 0.1
                } else {
                    1e-8
                };
                ctx.step_norm = 0.0;
                self.initialize_constraint_storage(ctx);
                self.evaluate_trajectory_warm(ctx);
                self.initialize_dual_slack_warm(ctx, Some((&stash.y, &stash.s)));
                self.reset_filter(ctx);
                return Ok(());
            }

            // Warm start with a provided trajectory but no usable solver
            // state: pick mu from how infeasible the trajectory is.
            if opts.verbose {
                eprintln!("warm start: using provided trajectory");
            }
            self.zero_gains(horizon, state_dim, control_dim);
            self.initialize_constraint_storage(ctx);
            self.evaluate_trajectory_warm(ctx);
            self.mu = if !constrained {
                1e-8
            } else {
                let violation = self.max_constraint_violation(ctx);
                if violation <= opts.tolerance {
                    opts.tolerance * 0.01
                } else if violation <= 0.1 {
                    opts.tolerance
                } else {
                    opts.barrier.mu_initial * 0.1
                }
            };
            ctx.regularization = opts.regularization.initial_value;
            ctx.step_norm = 0.0;
            self.initialize_dual_slack_warm(ctx, None);
            self.reset_filter(ctx);
            return Ok(());
        }

        // Cold start: interpolate from x_0 toward x_ref unless the caller
        // provided a trajectory.
        if !ctx.user_provided_trajectory() {
            let x0 = ctx.initial_state().clone();
            let x_ref = ctx.reference_state().clone();
            if x_ref.len() == x0.len() && horizon > 0 {
                for t in 0..=horizon {
                    let blend = t as f64 / horizon as f64;
                    ctx.states[t] = &x0 + blend * (&x_ref - &x0);
                }
            }
            for u in &mut ctx.controls {
                u.fill(0.0);
            }
            if opts.verbose {
                eprintln!("cold start: interpolated initial trajectory");
            }
        } else if opts.verbose {
            eprintln!("cold start: using provided initial trajectory");
        }

        self.zero_gains(horizon, state_dim, control_dim);
        self.initialize_constraint_storage(ctx);
        self.mu = if constrained { opts.barrier.mu_initial } else { 1e-8 };
        self.initialize_dual_slack(ctx);
        ctx.regularization = opts.regularization.initial_value;
        ctx.step_norm = 0.0;
        self.evaluate_trajectory(ctx);
        self.reset_filter(ctx);
        Ok(())
    }

    fn solve(&mut self, ctx: &mut Cddp) -> Solution {
        let opts = ctx.options().clone();
        let horizon = ctx.horizon();
        let dt = ctx.timestep();

        let pool = if opts.enable_parallel {
            rayon::ThreadPoolBuilder::new()
                .num_threads(opts.num_threads)
                .build()
                .ok()
        } else {
            None
        };

        let mut history = if opts.return_iteration_info {
            Some(IterationHistory::default())
        } else {
            None
        };
        if let Some(h) = history.as_mut() {
            h.push(
                ctx.cost,
                ctx.merit_function,
                1.0,
                1.0,
                ctx.inf_du,
                ctx.inf_pr,
                ctx.inf_comp,
                self.mu,
            );
        }
        if opts.verbose {
            self.print_iteration(0, ctx, ctx.alpha_du);
        }

        let start = Instant::now();
        let mut iter = 0usize;
        let mut status = SolveStatus::MaxIterationsReached;
        let mut dJ = 0.0;
        let mut last_alpha_du = 0.0;

        'main: while iter < opts.max_iterations {
            iter += 1;

            if opts.max_cpu_time > 0.0 && start.elapsed().as_secs_f64() > opts.max_cpu_time {
                status = SolveStatus::MaxCpuTimeReached;
                if opts.verbose {
                    eprintln!("maximum CPU time reached");
                }
                break;
            }

            self.precompute_dynamics_derivatives(ctx, pool.as_ref());
            self.precompute_constraint_jacobians(ctx, pool.as_ref());

            // Backward pass, escalating rho until the factorizations hold.
            loop {
                if backward_pass(self, ctx) {
                    break;
                }
                ctx.increase_regularization();
                self.workspace.invalidate_factorizations();
                if ctx.is_regularization_limit_reached() {
                    status = SolveStatus::RegularizationLimitReached;
                    if opts.verbose {
                        eprintln!("regularization limit reached");
                    }
                    break 'main;
                }
            }

            let best = perform_forward_pass(self, ctx, pool.as_ref());

            if best.success {
                if opts.debug {
                    eprintln!(
                        "[forward] cost: {:.4e} alpha: {:.4} cv: {:.4e}",
                        best.cost, best.alpha_pr, best.constraint_violation
                    );
                }
                ctx.states = best.state_trajectory;
                ctx.controls = best.control_trajectory;
                if let Some(y) = best.dual_trajectory {
                    self.Y = y;
                }
                if let Some(s) = best.slack_trajectory {
                    self.S = s;
                }
                if let Some(g) = best.constraint_eval_trajectory {
                    self.G = g;
                }

                dJ = ctx.cost - best.cost;
                ctx.cost = best.cost;
                ctx.merit_function = best.merit_function;
                ctx.alpha_pr = best.alpha_pr;
                ctx.alpha_du = best.alpha_du;
                last_alpha_du = best.alpha_du;
                self.filter
                    .push(FilterPoint::new(best.merit_function, best.constraint_violation));

                if let Some(h) = history.as_mut() {
                    h.push(
                        ctx.cost,
                        ctx.merit_function,
                        ctx.alpha_pr,
                        ctx.alpha_du,
                        ctx.inf_du,
                        ctx.inf_pr,
                        ctx.inf_comp,
                        self.mu,
                    );
                }

                ctx.decrease_regularization();
                self.workspace.invalidate_factorizations();
            } else {
                ctx.increase_regularization();
                self.workspace.invalidate_factorizations();
                if ctx.is_regularization_limit_reached() {
                    status = SolveStatus::RegularizationLimitReached;
                    if opts.verbose {
                        eprintln!("regularization limit reached");
                    }
                    break;
                }
            }

            if let Some(terminal) = self.check_convergence(ctx, dJ, iter) {
                status = terminal;
                break;
            }

            if opts.verbose {
                self.print_iteration(iter, ctx, last_alpha_du);
            }

            barrier::update_barrier(self, ctx);
        }

        let solve_time_ms = start.elapsed().as_secs_f64() * 1e3;

        ctx.store_warm_start_data(WarmStartData {
            k_u: self.k_u.clone(),
            K_u: self.K_u.clone(),
            y: self.Y.clone(),
            s: self.S.clone(),
        });

        let solution = Solution {
            solver_name: self.name().to_string(),
            status,
            status_message: status.to_string(),
            iterations_completed: iter,
            solve_time_ms,
            final_objective: ctx.cost,
            final_step_length: ctx.alpha_pr,
            time_points: (0..=horizon).map(|t| t as f64 * dt).collect(),
            state_trajectory: ctx.states.clone(),
            control_trajectory: ctx.controls.clone(),
            control_feedback_gains: self.K_u.clone(),
            final_regularization: ctx.regularization,
            final_barrier_parameter_mu: self.mu,
            final_primal_infeasibility: ctx.inf_pr,
            final_dual_infeasibility: ctx.inf_du,
            final_complementary_infeasibility: ctx.inf_comp,
            history,
        };

        if opts.verbose {
            self.print_summary(&solution);
        }
        solution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::Objective;
    use crate::options::CddpOptions;
    use crate::problem::{Constraint, DynamicalSystem};

    struct Integrator {
        dt: f64,
    }

    impl DynamicalSystem for Integrator {
        fn state_dim(&self) -> usize {
            2
        }
        fn control_dim(&self) -> usize {
            1
        }
        fn discrete_dynamics(&self, x: &DVector<f64>, u: &DVector<f64>, _t: f64) -> DVector<f64> {
            DVector::from_vec(vec![x[0] + self.dt * x[1], x[1] + self.dt * u[0]])
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
        fn hessians(
            &self,
            _x: &DVector<f64>,
            _u: &DVector<f64>,
            _t: f64,
        ) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
            (
                vec![DMatrix::zeros(2, 2); 2],
                vec![DMatrix::zeros(1, 1); 2],
                vec![DMatrix::zeros(1, 2); 2],
            )
        }
    }

    struct Regulator;

    impl Objective for Regulator {
        fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, _i: usize) -> f64 {
            0.5 * (x.dot(x) + 0.1 * u.dot(u))
        }
        fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
            5.0 * x.dot(x)
        }
        fn running_cost_gradients(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            _i: usize,
        ) -> (DVector<f64>, DVector<f64>) {
            (x.clone(), 0.1 * u)
        }
        fn running_cost_hessians(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            _i: usize,
        ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
            (
                DMatrix::identity(x.len(), x.len()),
                0.1 * DMatrix::identity(u.len(), u.len()),
                DMatrix::zeros(u.len(), x.len()),
            )
        }
        fn final_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
            10.0 * x
        }
        fn final_cost_hessian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            10.0 * DMatrix::identity(x.len(), x.len())
        }
    }

    /// Loose box on the control, |u| <= limit.
    struct LooseBound {
        limit: f64,
    }

    impl Constraint for LooseBound {
        fn dual_dim(&self) -> usize {
            2
        }
        fn evaluate(&self, _x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![u[0], -u[0]])
        }
        fn upper_bound(&self) -> DVector<f64> {
            DVector::from_vec(vec![self.limit, self.limit])
        }
        fn state_jacobian(&self, x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::zeros(2, x.len())
        }
        fn control_jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(2, 1, &[1.0, -1.0])
        }
    }

    fn make_context(horizon: usize, limit: f64, options: CddpOptions) -> Cddp {
        let mut ctx = Cddp::new(
            DVector::from_vec(vec![1.0, 0.0]),
            DVector::zeros(2),
            horizon,
            0.1,
            Box::new(Integrator { dt: 0.1 }),
            Box::new(Regulator),
            options,
        );
        ctx.add_path_constraint("bound", Box::new(LooseBound { limit }));
        ctx
    }

    #[test]
    fn test_cold_dual_slack_initialization_bounds() {
        let mut ctx = make_context(10, 0.5, CddpOptions::default());
        ctx.initialize_problem_if_necessary().unwrap();
        let mut solver = IpddpSolver::new();
        solver.initialize(&mut ctx).unwrap();

        let opts = ctx.options().clone();
        let lo = 0.01 * opts.ipddp.dual_var_init_scale;
        let hi = 100.0 * opts.ipddp.dual_var_init_scale;
        for t in 0..10 {
            let s = &solver.S["bound"][t];
            let y = &solver.Y["bound"][t];
            for i in 0..2 {
                assert!(s[i] >= opts.ipddp.slack_var_init_scale);
                assert!(y[i] >= lo && y[i] <= hi, "y = {} outside clamp", y[i]);
            }
        }
    }

    #[test]
    fn test_warm_start_preserves_dual_slack_after_horizon_shrink() {
        let horizon = 10;
        // Bounds loose enough that no slack collapses toward zero, so the
        // warm-start feasibility re-check keeps every entry.
        let mut ctx = make_context(horizon, 10.0, CddpOptions::default());
        let first = ctx.solve("IPDDP").unwrap();
        assert!(first.status.converged());

        let stash = ctx.warm_start_data().expect("stash stored").clone();

        let mut warm_opts = CddpOptions::default();
        warm_opts.warm_start = true;
        ctx.set_options(warm_opts);
        ctx.set_horizon(horizon - 1);
        ctx.initialize_problem_if_necessary().unwrap();

        let mut solver = IpddpSolver::new();
        solver.initialize(&mut ctx).unwrap();

        assert_eq!(solver.mu, ctx.options().barrier.mu_initial * 0.1);
        for t in 0..(horizon - 1) {
            assert_eq!(solver.Y["bound"][t], stash.y["bound"][t], "y changed at t={}", t);
            assert_eq!(solver.S["bound"][t], stash.s["bound"][t], "s changed at t={}", t);
            assert_eq!(solver.k_u[t], stash.k_u[t]);
            assert_eq!(solver.K_u[t], stash.K_u[t]);
        }
    }
}
