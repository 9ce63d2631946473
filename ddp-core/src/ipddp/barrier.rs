//! Barrier-parameter updates.
//!
//! Three selectable strategies drive mu toward zero along the central
//! path; the filter is reset whenever mu changes. With an empty
//! constraint store there is no barrier and these are no-ops.

use crate::context::Cddp;
use crate::linalg::l1_norm;
use crate::options::BarrierStrategy;

use super::solver::IpddpSolver;

/// IPOPT-scaled dual infeasibility:
/// sd = max(s_max, (||y||_1 + ||s||_1) / (m + n)) / s_max, returns
/// inf_du / sd.
pub(crate) fn scaled_dual_infeasibility(solver: &IpddpSolver, ctx: &Cddp) -> f64 {
    if ctx.path_constraints().is_empty() {
        return ctx.inf_du;
    }

    let s_max = ctx.options().termination_scaling_max_factor;
    let horizon = ctx.horizon();

    let mut y_l1 = 0.0;
    let mut s_l1 = 0.0;
    let mut total_dual = 0usize;
    for name in ctx.path_constraints().keys() {
        if let (Some(y_traj), Some(s_traj)) = (solver.Y.get(name), solver.S.get(name)) {
            for t in 0..horizon.min(y_traj.len()) {
                y_l1 += l1_norm(&y_traj[t]);
                s_l1 += l1_norm(&s_traj[t]);
                total_dual += y_traj[t].len();
            }
        }
    }

    let m_plus_n = total_dual + ctx.control_dim() * horizon;
    let average = if m_plus_n > 0 {
        (y_l1 + s_l1) / m_plus_n as f64
    } else {
        0.0
    };
    let sd = s_max.max(average) / s_max;
    ctx.inf_du / sd
}

/// Apply the configured barrier update after an iteration.
pub(crate) fn update_barrier(solver: &mut IpddpSolver, ctx: &mut Cddp) {
    if ctx.path_constraints().is_empty() {
        return;
    }

    let opts = ctx.options().clone();
    let barrier = &opts.barrier;

    match barrier.strategy {
        BarrierStrategy::Monotonic => {
            solver.mu = barrier.mu_min_value.max(barrier.mu_update_factor * solver.mu);
            solver.reset_filter(ctx);
        }
        BarrierStrategy::Ipopt => {
            let error = scaled_dual_infeasibility(solver, ctx)
                .max(ctx.inf_pr)
                .max(ctx.inf_comp);
            let kappa_epsilon = 10.0;
            if error <= kappa_epsilon * solver.mu {
                let linear = barrier.mu_update_factor * solver.mu;
                let superlinear = solver.mu.powf(barrier.mu_update_power);
                solver.mu = (opts.tolerance / 10.0).max(linear.min(superlinear));
                solver.reset_filter(ctx);
            }
        }
        BarrierStrategy::Adaptive => {
            let error = scaled_dual_infeasibility(solver, ctx)
                .max(ctx.inf_pr)
                .max(ctx.inf_comp);
            let threshold = (barrier.mu_update_factor * solver.mu).max(2.0 * solver.mu);
            if error <= threshold {
                // Reduce more aggressively the better the KKT system is
                // already satisfied relative to mu.
                let mut reduction_factor = barrier.mu_update_factor;
                if solver.mu > 1e-12 {
                    let ratio = error / solver.mu;
                    if ratio < 0.01 {
                        reduction_factor = barrier.mu_update_factor * 0.1;
                    } else if ratio < 0.1 {
                        reduction_factor = barrier.mu_update_factor * 0.3;
                    } else if ratio < 0.5 {
                        reduction_factor = barrier.mu_update_factor * 0.6;
                    }
                }

                let linear = reduction_factor * solver.mu;
                let superlinear = solver.mu.powf(barrier.mu_update_power);
                solver.mu = (opts.tolerance / 100.0).max(linear.min(superlinear));
                solver.reset_filter(ctx);
            }
        }
    }
}
