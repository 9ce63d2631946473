//! Shared test fixtures: small dynamics models, cost functionals and a
//! control box constraint. These live in test code; the library itself
//! only defines the capability contracts.

use ddp_core::{Constraint, DynamicalSystem, Objective};
use nalgebra::{DMatrix, DVector};

/// Double integrator, Euler-discretized: position and velocity, one
/// acceleration input.
pub struct DoubleIntegrator {
    pub dt: f64,
}

impl DynamicalSystem for DoubleIntegrator {
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

/// Kinematic car: state (x, y, heading, speed), controls (steering angle,
/// acceleration), Euler-discretized.
pub struct CarKinematics {
    pub dt: f64,
    pub wheelbase: f64,
}

impl DynamicalSystem for CarKinematics {
    fn state_dim(&self) -> usize {
        4
    }

    fn control_dim(&self) -> usize {
        2
    }

    fn discrete_dynamics(&self, x: &DVector<f64>, u: &DVector<f64>, _t: f64) -> DVector<f64> {
        let (theta, v) = (x[2], x[3]);
        let (delta, a) = (u[0], u[1]);
        DVector::from_vec(vec![
            x[0] + self.dt * v * theta.cos(),
            x[1] + self.dt * v * theta.sin(),
            x[2] + self.dt * v * delta.tan() / self.wheelbase,
            x[3] + self.dt * a,
        ])
    }

    fn jacobians(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _t: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let (theta, v) = (x[2], x[3]);
        let delta = u[0];
        let sec2 = 1.0 / delta.cos().powi(2);

        let f_x = DMatrix::from_row_slice(
            4,
            4,
            &[
                0.0, 0.0, -v * theta.sin(), theta.cos(),
                0.0, 0.0, v * theta.cos(), theta.sin(),
                0.0, 0.0, 0.0, delta.tan() / self.wheelbase,
                0.0, 0.0, 0.0, 0.0,
            ],
        );
        let f_u = DMatrix::from_row_slice(
            4,
            2,
            &[
                0.0, 0.0,
                0.0, 0.0,
                v * sec2 / self.wheelbase, 0.0,
                0.0, 1.0,
            ],
        );
        (f_x, f_u)
    }
}

/// Quadratic regulator cost toward a reference state:
/// l = 0.5 (x - r)^T Q (x - r) + 0.5 u^T R u, phi = 0.5 (x - r)^T Qf (x - r).
pub struct QuadraticObjective {
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
    pub qf: DMatrix<f64>,
    pub reference: DVector<f64>,
}

impl Objective for QuadraticObjective {
    fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, _index: usize) -> f64 {
        let dx = x - &self.reference;
        0.5 * (dx.dot(&(&self.q * &dx)) + u.dot(&(&self.r * u)))
    }

    fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
        let dx = x - &self.reference;
        0.5 * dx.dot(&(&self.qf * &dx))
    }

    fn running_cost_gradients(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _index: usize,
    ) -> (DVector<f64>, DVector<f64>) {
        (&self.q * (x - &self.reference), &self.r * u)
    }

    fn running_cost_hessians(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _index: usize,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        (self.q.clone(), self.r.clone(), DMatrix::zeros(u.len(), x.len()))
    }

    fn final_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.qf * (x - &self.reference)
    }

    fn final_cost_hessian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
        self.qf.clone()
    }

    fn reference_state(&self) -> Option<DVector<f64>> {
        Some(self.reference.clone())
    }
}

/// Car-parking cost: quadratic control effort plus pseudo-Huber pulls on
/// position along the way and on the full state at the end.
pub struct CarParkingObjective {
    pub goal: DVector<f64>,
    cu: DVector<f64>,
    cf: DVector<f64>,
    pf: DVector<f64>,
    cx: DVector<f64>,
    px: DVector<f64>,
}

impl CarParkingObjective {
    pub fn new(goal: DVector<f64>) -> Self {
        Self {
            goal,
            cu: DVector::from_vec(vec![1e-2, 1e-4]),
            cf: DVector::from_vec(vec![0.1, 0.1, 1.0, 0.3]),
            pf: DVector::from_vec(vec![0.01, 0.01, 0.01, 1.0]),
            cx: DVector::from_vec(vec![1e-3, 1e-3]),
            px: DVector::from_vec(vec![0.1, 0.1]),
        }
    }

    /// Smooth absolute value sabs(v, p) = sqrt(v^2 + p^2) - p.
    fn sabs(v: f64, p: f64) -> f64 {
        (v * v + p * p).sqrt() - p
    }

    fn sabs_grad(v: f64, p: f64) -> f64 {
        v / (v * v + p * p).sqrt()
    }

    fn sabs_hess(v: f64, p: f64) -> f64 {
        let s = v * v + p * p;
        p * p / (s * s.sqrt())
    }
}

impl Objective for CarParkingObjective {
    fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, _index: usize) -> f64 {
        let lu: f64 = (0..2).map(|i| self.cu[i] * u[i] * u[i]).sum();
        let lx: f64 = (0..2)
            .map(|i| self.cx[i] * Self::sabs(x[i], self.px[i]))
            .sum();
        lu + lx
    }

    fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
        let lf: f64 = (0..4)
            .map(|i| self.cf[i] * Self::sabs(x[i] - self.goal[i], self.pf[i]))
            .sum();
        let lx: f64 = (0..2)
            .map(|i| self.cx[i] * Self::sabs(x[i], self.px[i]))
            .sum();
        lf + lx
    }

    fn running_cost_gradients(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _index: usize,
    ) -> (DVector<f64>, DVector<f64>) {
        let mut l_x = DVector::zeros(4);
        for i in 0..2 {
            l_x[i] = self.cx[i] * Self::sabs_grad(x[i], self.px[i]);
        }
        let l_u = DVector::from_vec(vec![2.0 * self.cu[0] * u[0], 2.0 * self.cu[1] * u[1]]);
        (l_x, l_u)
    }

    fn running_cost_hessians(
        &self,
        x: &DVector<f64>,
        _u: &DVector<f64>,
        _index: usize,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let mut l_xx = DMatrix::zeros(4, 4);
        for i in 0..2 {
            l_xx[(i, i)] = self.cx[i] * Self::sabs_hess(x[i], self.px[i]);
        }
        let l_uu = DMatrix::from_diagonal(&DVector::from_vec(vec![
            2.0 * self.cu[0],
            2.0 * self.cu[1],
        ]));
        (l_xx, l_uu, DMatrix::zeros(2, 4))
    }

    fn final_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut g = DVector::zeros(4);
        for i in 0..4 {
            g[i] = self.cf[i] * Self::sabs_grad(x[i] - self.goal[i], self.pf[i]);
        }
        for i in 0..2 {
            g[i] += self.cx[i] * Self::sabs_grad(x[i], self.px[i]);
        }
        g
    }

    fn final_cost_hessian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(4, 4);
        for i in 0..4 {
            h[(i, i)] = self.cf[i] * Self::sabs_hess(x[i] - self.goal[i], self.pf[i]);
        }
        for i in 0..2 {
            h[(i, i)] += self.cx[i] * Self::sabs_hess(x[i], self.px[i]);
        }
        h
    }

    fn reference_state(&self) -> Option<DVector<f64>> {
        Some(self.goal.clone())
    }
}

/// Box bounds on the control vector: lower <= u <= upper, expressed as
/// [u; -u] <= [upper; -lower].
pub struct ControlBoxConstraint {
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl ControlBoxConstraint {
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Self {
        assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }
}

impl Constraint for ControlBoxConstraint {
    fn dual_dim(&self) -> usize {
        2 * self.upper.len()
    }

    fn evaluate(&self, _x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let n = u.len();
        let mut v = DVector::zeros(2 * n);
        for i in 0..n {
            v[i] = u[i];
            v[n + i] = -u[i];
        }
        v
    }

    fn upper_bound(&self) -> DVector<f64> {
        let n = self.upper.len();
        let mut b = DVector::zeros(2 * n);
        for i in 0..n {
            b[i] = self.upper[i];
            b[n + i] = -self.lower[i];
        }
        b
    }

    fn state_jacobian(&self, x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::zeros(self.dual_dim(), x.len())
    }

    fn control_jacobian(&self, _x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64> {
        let n = u.len();
        let mut j = DMatrix::zeros(2 * n, n);
        for i in 0..n {
            j[(i, i)] = 1.0;
            j[(n + i, i)] = -1.0;
        }
        j
    }
}

/// Finite-horizon discrete LQR via the backward Riccati recursion.
/// Returns the gain sequence K_t (u = -K_t x) and the value matrices P_t.
pub fn discrete_lqr(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    qf: &DMatrix<f64>,
    horizon: usize,
) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
    let mut p = vec![DMatrix::zeros(a.nrows(), a.ncols()); horizon + 1];
    let mut k = vec![DMatrix::zeros(b.ncols(), a.nrows()); horizon];
    p[horizon] = qf.clone();
    for t in (0..horizon).rev() {
        let bp = b.transpose() * &p[t + 1];
        let s = r + &bp * b;
        let s_inv = s.try_inverse().expect("R + B'PB must be invertible");
        k[t] = &s_inv * (&bp * a);
        p[t] = q + a.transpose() * &p[t + 1] * a - a.transpose() * &p[t + 1] * b * &k[t];
    }
    (k, p)
}
