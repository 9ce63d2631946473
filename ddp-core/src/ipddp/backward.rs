//! Backward pass.
//!
//! Riccati-like sweep from t = N-1 down to 0 computing the control
//! feedforward/feedback gains and, for constrained problems, the dual and
//! slack update gains through the barrier-augmented KKT reduction. The
//! sweep is strictly sequential (data dependency through V_x, V_xx).
//!
//! A non-positive-definite factorization aborts the sweep and returns
//! `false` without mutating the accepted trajectory; the driver raises
//! the regularization and retries.

#![allow(non_snake_case)]

use nalgebra::{DMatrix, DVector};

use crate::context::Cddp;
use crate::linalg::{inf_norm, row_scale, symmetrize, DenseLdlt};

use super::solver::IpddpSolver;

/// Run the backward sweep. Updates the gains and the termination metrics
/// (inf_du, inf_pr, inf_comp, step_norm) on success.
pub(crate) fn backward_pass(solver: &mut IpddpSolver, ctx: &mut Cddp) -> bool {
    let horizon = ctx.horizon();
    let state_dim = ctx.state_dim();
    let control_dim = ctx.control_dim();
    let timestep = ctx.timestep();
    let reg = ctx.regularization;
    let use_ilqr = ctx.options().use_ilqr;
    let debug = ctx.options().debug;
    let mu = solver.mu;

    let objective = ctx.objective();

    // Terminal cost expansion.
    let x_final = &ctx.states[horizon];
    let mut V_x = objective.final_cost_gradient(x_final);
    let mut V_xx = objective.final_cost_hessian(x_final);
    symmetrize(&mut V_xx);

    solver.dV = [0.0, 0.0];
    let mut inf_du = 0.0_f64;
    let mut inf_pr = 0.0_f64;
    let mut inf_comp = 0.0_f64;
    let mut step_norm = 0.0_f64;

    let constrained = !ctx.path_constraints().is_empty();

    if !constrained {
        for t in (0..horizon).rev() {
            let x = &ctx.states[t];
            let u = &ctx.controls[t];

            let A = DMatrix::identity(state_dim, state_dim) + timestep * &solver.F_x[t];
            let B = timestep * &solver.F_u[t];

            let (l_x, l_u) = objective.running_cost_gradients(x, u, t);
            let (l_xx, l_uu, l_ux) = objective.running_cost_hessians(x, u, t);

            let Vxx_A = &V_xx * &A;
            let Vxx_B = &V_xx * &B;
            let Q_x = &l_x + A.tr_mul(&V_x);
            let Q_u = &l_u + B.tr_mul(&V_x);
            let mut Q_xx = &l_xx + A.tr_mul(&Vxx_A);
            let mut Q_ux = &l_ux + B.tr_mul(&Vxx_A);
            let mut Q_uu = &l_uu + B.tr_mul(&Vxx_B);

            if !use_ilqr && solver.F_xx[t].len() == state_dim {
                for i in 0..state_dim {
                    let w = timestep * V_x[i];
                    Q_xx += &solver.F_xx[t][i] * w;
                    Q_ux += &solver.F_ux[t][i] * w;
                    Q_uu += &solver.F_uu[t][i] * w;
                }
            }

            // Regularize. This is the factored block, so the value-function
            // propagation below sees the same regularized Q_uu.
            symmetrize(&mut Q_uu);
            for i in 0..control_dim {
                Q_uu[(i, i)] += reg;
            }

            let ws = &mut solver.workspace;
            let need_recompute = !ws.ldlt_valid[t]
                || ws.ldlt_cache[t].as_ref().map(DenseLdlt::dim) != Some(control_dim);
            if need_recompute {
                match DenseLdlt::factor(&Q_uu) {
                    Ok(f) => {
                        ws.ldlt_cache[t] = Some(f);
                        ws.ldlt_valid[t] = true;
                    }
                    Err(_) => {
                        ws.ldlt_valid[t] = false;
                        if debug {
                            eprintln!("backward pass failed at t = {t} (Q_uu not positive definite)");
                        }
                        return false;
                    }
                }
            }
            let ldlt = ws.ldlt_cache[t].as_ref().expect("factorization cached above");

            let k_u = -ldlt.solve_vec(&Q_u);
            let K_u = -ldlt.solve_mat(&Q_ux);

            let Q_uu_k = &Q_uu * &k_u;
            V_x = &Q_x + K_u.tr_mul(&Q_u) + Q_ux.tr_mul(&k_u) + K_u.tr_mul(&Q_uu_k);
            V_xx = &Q_xx + K_u.tr_mul(&Q_ux) + Q_ux.tr_mul(&K_u) + K_u.tr_mul(&(&Q_uu * &K_u));
            symmetrize(&mut V_xx);

            solver.dV[0] += k_u.dot(&Q_u);
            solver.dV[1] += 0.5 * k_u.dot(&Q_uu_k);

            inf_du = inf_du.max(inf_norm(&Q_u));
            step_norm = step_norm.max(inf_norm(&k_u));

            solver.k_u[t] = k_u;
            solver.K_u[t] = K_u;
        }
    } else {
        let total_dual_dim = solver.workspace.y_comb.len();

        for t in (0..horizon).rev() {
            let x = &ctx.states[t];
            let u = &ctx.controls[t];

            let A = DMatrix::identity(state_dim, state_dim) + timestep * &solver.F_x[t];
            let B = timestep * &solver.F_u[t];

            // Assemble the combined dual/slack/residual vectors and the
            // stacked constraint Jacobians for this step.
            {
                let ws = &mut solver.workspace;
                let mut offset = 0;
                for (name, c) in ctx.path_constraints() {
                    let d = c.dual_dim();
                    ws.y_comb.rows_mut(offset, d).copy_from(&solver.Y[name][t]);
                    ws.s_comb.rows_mut(offset, d).copy_from(&solver.S[name][t]);
                    ws.g_comb.rows_mut(offset, d).copy_from(&solver.G[name][t]);
                    ws.G_x_comb
                        .view_mut((offset, 0), (d, state_dim))
                        .copy_from(&solver.G_x[name][t]);
                    ws.G_u_comb
                        .view_mut((offset, 0), (d, control_dim))
                        .copy_from(&solver.G_u[name][t]);
                    offset += d;
                }
            }
            let ws = &solver.workspace;

            let (l_x, l_u) = objective.running_cost_gradients(x, u, t);
            let (l_xx, l_uu, l_ux) = objective.running_cost_hessians(x, u, t);

            let Vxx_A = &V_xx * &A;
            let Vxx_B = &V_xx * &B;
            let mut Q_x = &l_x + ws.G_x_comb.tr_mul(&ws.y_comb) + A.tr_mul(&V_x);
            let mut Q_u = &l_u + ws.G_u_comb.tr_mul(&ws.y_comb) + B.tr_mul(&V_x);
            let mut Q_xx = &l_xx + A.tr_mul(&Vxx_A);
            let mut Q_ux = &l_ux + B.tr_mul(&Vxx_A);
            let mut Q_uu = &l_uu + B.tr_mul(&Vxx_B);

            if !use_ilqr && solver.F_xx[t].len() == state_dim {
                for i in 0..state_dim {
                    let w = timestep * V_x[i];
                    Q_xx += &solver.F_xx[t][i] * w;
                    Q_ux += &solver.F_ux[t][i] * w;
                    Q_uu += &solver.F_uu[t][i] * w;
                }
            }

            // Sigma = diag(y / s) and the interior-point residuals.
            let sigma =
                DVector::from_fn(total_dual_dim, |i, _| ws.y_comb[i] / ws.s_comb[i]);
            let r_primal = &ws.g_comb + &ws.s_comb;
            let r_comp = DVector::from_fn(total_dual_dim, |i, _| {
                ws.y_comb[i] * ws.s_comb[i] - mu
            });
            let rhat = DVector::from_fn(total_dual_dim, |i, _| {
                ws.y_comb[i] * r_primal[i] - r_comp[i]
            });
            let s_inv_rhat =
                DVector::from_fn(total_dual_dim, |i, _| rhat[i] / ws.s_comb[i]);

            let sigma_G_x = row_scale(&sigma, &ws.G_x_comb);
            let sigma_G_u = row_scale(&sigma, &ws.G_u_comb);
            let Gu_s_inv_rhat = ws.G_u_comb.tr_mul(&s_inv_rhat);
            let Gu_sigma_Gx = ws.G_u_comb.tr_mul(&sigma_G_x);
            let Gu_sigma_Gu = ws.G_u_comb.tr_mul(&sigma_G_u);

            // Regularized, constraint-reduced control block.
            let mut Q_uu_reg = Q_uu.clone();
            symmetrize(&mut Q_uu_reg);
            Q_uu_reg += &Gu_sigma_Gu;
            for i in 0..control_dim {
                Q_uu_reg[(i, i)] += reg;
            }

            let ldlt = match DenseLdlt::factor(&Q_uu_reg) {
                Ok(f) => f,
                Err(_) => {
                    if debug {
                        eprintln!("backward pass failed at t = {t} (Q_uu not positive definite)");
                    }
                    return false;
                }
            };

            // One multi-RHS solve for [k_u | K_u].
            let mut kK = DMatrix::zeros(control_dim, 1 + state_dim);
            kK.column_mut(0).copy_from(&(&Q_u + &Gu_s_inv_rhat));
            kK.view_mut((0, 1), (control_dim, state_dim))
                .copy_from(&(&Q_ux + &Gu_sigma_Gx));
            ldlt.solve_in_place(&mut kK);
            kK = -kK;

            let k_u = kK.column(0).clone_owned();
            let K_u = kK.columns(1, state_dim).clone_owned();

            // Dependent dual and slack gains.
            let Gu_k = &ws.G_u_comb * &k_u;
            let k_y_full = DVector::from_fn(total_dual_dim, |i, _| {
                (rhat[i] + ws.y_comb[i] * Gu_k[i]) / ws.s_comb[i]
            });
            let Gx_plus_GuK = &ws.G_x_comb + &ws.G_u_comb * &K_u;
            let K_y_full = row_scale(&sigma, &Gx_plus_GuK);
            let k_s_full = -(&r_primal + &Gu_k);
            let K_s_full = -Gx_plus_GuK;

            {
                let mut offset = 0;
                for (name, c) in ctx.path_constraints() {
                    let d = c.dual_dim();
                    let store = |m: &mut std::collections::BTreeMap<String, Vec<DVector<f64>>>,
                                 v: &DVector<f64>| {
                        m.get_mut(name).expect("constraint storage initialized")[t] =
                            v.rows(offset, d).clone_owned();
                    };
                    store(&mut solver.k_y, &k_y_full);
                    store(&mut solver.k_s, &k_s_full);
                    solver.K_y.get_mut(name).expect("constraint storage initialized")[t] =
                        K_y_full.view((offset, 0), (d, state_dim)).clone_owned();
                    solver.K_s.get_mut(name).expect("constraint storage initialized")[t] =
                        K_s_full.view((offset, 0), (d, state_dim)).clone_owned();
                    offset += d;
                }
            }

            // Fold the constraint reduction into the Q expansions before
            // propagating the value function.
            Q_u += &Gu_s_inv_rhat;
            Q_x += ws.G_x_comb.tr_mul(&s_inv_rhat);
            Q_xx += ws.G_x_comb.tr_mul(&sigma_G_x);
            Q_ux += &Gu_sigma_Gx;
            Q_uu += &Gu_sigma_Gu;

            let Q_uu_k = &Q_uu * &k_u;
            solver.dV[0] += k_u.dot(&Q_u);
            solver.dV[1] += 0.5 * k_u.dot(&Q_uu_k);

            V_x = &Q_x + K_u.tr_mul(&Q_u) + Q_ux.tr_mul(&k_u) + K_u.tr_mul(&Q_uu_k);
            V_xx = &Q_xx + K_u.tr_mul(&Q_ux) + Q_ux.tr_mul(&K_u) + K_u.tr_mul(&(&Q_uu * &K_u));
            symmetrize(&mut V_xx);

            inf_du = inf_du.max(inf_norm(&Q_u));
            inf_pr = inf_pr.max(inf_norm(&r_primal));
            inf_comp = inf_comp.max(inf_norm(&r_comp));
            step_norm = step_norm.max(inf_norm(&k_u));

            solver.k_u[t] = k_u;
            solver.K_u[t] = K_u;
        }
    }

    ctx.inf_du = inf_du;
    ctx.inf_pr = if constrained { inf_pr } else { 0.0 };
    ctx.inf_comp = if constrained { inf_comp } else { 0.0 };
    ctx.step_norm = step_norm;

    if debug {
        eprintln!(
            "[backward] inf_du: {:.2e} inf_pr: {:.2e} inf_comp: {:.2e} ||d||: {:.2e} dV: [{:.3e}, {:.3e}]",
            ctx.inf_du, ctx.inf_pr, ctx.inf_comp, ctx.step_norm, solver.dV[0], solver.dV[1]
        );
    }
    true
}
