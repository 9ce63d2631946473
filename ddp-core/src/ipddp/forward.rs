//! Forward pass.
//!
//! Rolls the gains forward at a trial step length, enforcing the
//! fraction-to-boundary rule on slacks, searching a separate dual step
//! length over the ladder, and accepting or rejecting under the filter.
//! Trials at different step lengths are independent; with parallelism
//! enabled they are fanned out and the successful trial with the lowest
//! merit is selected.

#![allow(non_snake_case)]

use std::collections::BTreeMap;

use nalgebra::DVector;
use rayon::prelude::*;

use crate::context::Cddp;
use crate::linalg::l1_norm;

use super::solver::IpddpSolver;

/// Outcome of a single trial rollout.
#[derive(Debug, Clone)]
pub struct ForwardPassResult {
    /// Whether the trial passed feasibility and acceptance.
    pub success: bool,
    /// Trial objective J'.
    pub cost: f64,
    /// Trial merit M' = J' - mu * sum(log s').
    pub merit_function: f64,
    /// Trial violation theta' = sum ||g' + s'||_1.
    pub constraint_violation: f64,
    /// Primal step length used.
    pub alpha_pr: f64,
    /// Dual step length used.
    pub alpha_du: f64,
    /// Trial state trajectory.
    pub state_trajectory: Vec<DVector<f64>>,
    /// Trial control trajectory.
    pub control_trajectory: Vec<DVector<f64>>,
    /// Trial duals (constrained problems only).
    pub dual_trajectory: Option<BTreeMap<String, Vec<DVector<f64>>>>,
    /// Trial slacks.
    pub slack_trajectory: Option<BTreeMap<String, Vec<DVector<f64>>>>,
    /// Trial constraint residuals.
    pub constraint_eval_trajectory: Option<BTreeMap<String, Vec<DVector<f64>>>>,
}

impl ForwardPassResult {
    fn rejected(alpha: f64) -> Self {
        Self {
            success: false,
            cost: f64::INFINITY,
            merit_function: f64::INFINITY,
            constraint_violation: f64::INFINITY,
            alpha_pr: alpha,
            alpha_du: 0.0,
            state_trajectory: Vec::new(),
            control_trajectory: Vec::new(),
            dual_trajectory: None,
            slack_trajectory: None,
            constraint_eval_trajectory: None,
        }
    }
}

/// Try the step ladder and return the best accepted trial (or a rejected
/// placeholder when every step length fails).
pub(crate) fn perform_forward_pass(
    solver: &IpddpSolver,
    ctx: &Cddp,
    pool: Option<&rayon::ThreadPool>,
) -> ForwardPassResult {
    match pool {
        None => {
            // Serial: the ladder is ordered largest-first, take the first
            // accepted trial.
            for &alpha in &ctx.alphas {
                let result = forward_pass(solver, ctx, alpha);
                if result.success {
                    return result;
                }
            }
            ForwardPassResult::rejected(*ctx.alphas.last().unwrap_or(&0.0))
        }
        Some(pool) => {
            let results: Vec<ForwardPassResult> = pool.install(|| {
                ctx.alphas
                    .par_iter()
                    .map(|&alpha| forward_pass(solver, ctx, alpha))
                    .collect()
            });
            let mut best = ForwardPassResult::rejected(*ctx.alphas.last().unwrap_or(&0.0));
            for result in results {
                if result.success && result.merit_function < best.merit_function {
                    best = result;
                }
            }
            best
        }
    }
}

/// Single trial rollout at primal step length `alpha`.
pub(crate) fn forward_pass(solver: &IpddpSolver, ctx: &Cddp, alpha: f64) -> ForwardPassResult {
    let horizon = ctx.horizon();
    let timestep = ctx.timestep();
    let opts = ctx.options();
    let system = ctx.system();
    let objective = ctx.objective();
    let mu = solver.mu;
    let tau = opts.barrier.min_fraction_to_boundary.max(1.0 - mu);

    let mut result = ForwardPassResult::rejected(alpha);
    let mut X_new = ctx.states.clone();
    let mut U_new = ctx.controls.clone();
    X_new[0] = ctx.initial_state().clone();

    let constraint_set = ctx.path_constraints();

    if constraint_set.is_empty() {
        // Standard DDP rollout with an expected-vs-actual reduction test.
        let mut cost_new = 0.0;
        for t in 0..horizon {
            let delta_x = &X_new[t] - &ctx.states[t];
            U_new[t] = &ctx.controls[t] + alpha * &solver.k_u[t] + &solver.K_u[t] * &delta_x;
            let x_next = system.discrete_dynamics(&X_new[t], &U_new[t], t as f64 * timestep);
            if x_next.iter().any(|v| !v.is_finite()) {
                return result;
            }
            cost_new += objective.running_cost(&X_new[t], &U_new[t], t);
            X_new[t + 1] = x_next;
        }
        cost_new += objective.terminal_cost(&X_new[horizon]);
        if !cost_new.is_finite() {
            return result;
        }

        let dJ = ctx.cost - cost_new;
        let expected = -alpha * (solver.dV[0] + 0.5 * alpha * solver.dV[1]);
        let reduction_ratio = if expected > 0.0 {
            dJ / expected
        } else {
            dJ.signum()
        };

        result.success = reduction_ratio > 1e-6;
        result.cost = cost_new;
        result.merit_function = cost_new;
        result.constraint_violation = 0.0;
        result.alpha_du = 1.0;
        result.state_trajectory = X_new;
        result.control_trajectory = U_new;
        return result;
    }

    // Constrained rollout: slacks and controls move at the primal step
    // length, duals get their own step length below.
    let mut S_new = solver.S.clone();
    let mut G_new = solver.G.clone();

    for t in 0..horizon {
        let delta_x = &X_new[t] - &ctx.states[t];

        for (name, c) in constraint_set {
            let s_old = &solver.S[name][t];
            let s_trial =
                s_old + alpha * &solver.k_s[name][t] + &solver.K_s[name][t] * &delta_x;
            for i in 0..c.dual_dim() {
                if s_trial[i] < (1.0 - tau) * s_old[i] {
                    return result; // slack fraction-to-boundary violated
                }
            }
            S_new.get_mut(name).expect("slack storage initialized")[t] = s_trial;
        }

        U_new[t] = &ctx.controls[t] + alpha * &solver.k_u[t] + &solver.K_u[t] * &delta_x;
        let x_next = system.discrete_dynamics(&X_new[t], &U_new[t], t as f64 * timestep);
        if x_next.iter().any(|v| !v.is_finite()) {
            return result;
        }
        X_new[t + 1] = x_next;
    }

    // Separate dual step length from the ladder.
    let mut Y_new = None;
    let mut alpha_du = 0.0;
    'ladder: for &alpha_y in &ctx.alphas {
        let mut trial = solver.Y.clone();
        for t in 0..horizon {
            let delta_x = &X_new[t] - &ctx.states[t];
            for (name, c) in constraint_set {
                let y_old = &solver.Y[name][t];
                let y_trial =
                    y_old + alpha_y * &solver.k_y[name][t] + &solver.K_y[name][t] * &delta_x;
                for i in 0..c.dual_dim() {
                    if y_trial[i] < (1.0 - tau) * y_old[i] {
                        continue 'ladder;
                    }
                }
                trial.get_mut(name).expect("dual storage initialized")[t] = y_trial;
            }
        }
        Y_new = Some(trial);
        alpha_du = alpha_y;
        break;
    }
    let Some(Y_new) = Y_new else {
        return result; // no feasible dual step length
    };

    // Trial cost, residuals, merit and violation.
    let mut cost_new = 0.0;
    let mut merit_new = 0.0;
    let mut violation_new = 0.0;
    for t in 0..horizon {
        cost_new += objective.running_cost(&X_new[t], &U_new[t], t);
        for (name, c) in constraint_set {
            let g_trial = c.evaluate(&X_new[t], &U_new[t]) - c.upper_bound();
            let s_trial = &S_new[name][t];
            merit_new -= mu * s_trial.iter().map(|&si| si.ln()).sum::<f64>();
            violation_new += l1_norm(&(&g_trial + s_trial));
            G_new.get_mut(name).expect("residual storage initialized")[t] = g_trial;
        }
    }
    cost_new += objective.terminal_cost(&X_new[horizon]);
    merit_new += cost_new;

    if !merit_new.is_finite() || !violation_new.is_finite() {
        return result;
    }

    // Filter acceptance.
    let expected_improvement = alpha * solver.dV[0];
    let violation_old = solver.filter.latest().map_or(0.0, |p| p.violation);
    let merit_old = ctx.merit_function;
    let fopts = &opts.filter;

    let mut accept = false;
    if violation_new > fopts.max_violation_threshold {
        if violation_new < (1.0 - fopts.violation_acceptance_threshold) * violation_old {
            accept = true;
        }
    } else if violation_new.max(violation_old) < fopts.min_violation_for_armijo_check
        && expected_improvement < 0.0
    {
        if merit_new < merit_old + fopts.armijo_constant * expected_improvement {
            accept = true;
        }
    } else if merit_new < merit_old - fopts.merit_acceptance_threshold * violation_new
        || violation_new < (1.0 - fopts.violation_acceptance_threshold) * violation_old
    {
        accept = true;
    }

    // A trial dominated by any stored filter point is never taken.
    if accept && solver.filter.dominates(merit_new, violation_new) {
        accept = false;
    }

    if accept {
        result.success = true;
        result.cost = cost_new;
        result.merit_function = merit_new;
        result.constraint_violation = violation_new;
        result.alpha_du = alpha_du;
        result.state_trajectory = X_new;
        result.control_trajectory = U_new;
        result.dual_trajectory = Some(Y_new);
        result.slack_trajectory = Some(S_new);
        result.constraint_eval_trajectory = Some(G_new);
    }
    result
}
