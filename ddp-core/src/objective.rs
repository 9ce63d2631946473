//! Objective contract.

use nalgebra::{DMatrix, DVector};

/// Cost functional supplied by the user: stage cost l(x, u) with first and
/// second derivatives plus a terminal cost phi(x_N) with gradient and
/// Hessian.
pub trait Objective: Send + Sync {
    /// Stage cost l(x, u) at time index `index`.
    fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, index: usize) -> f64;

    /// Terminal cost phi(x_N).
    fn terminal_cost(&self, x: &DVector<f64>) -> f64;

    /// Total trajectory cost. The default sums stage costs and adds the
    /// terminal cost.
    fn evaluate(&self, states: &[DVector<f64>], controls: &[DVector<f64>]) -> f64 {
        let mut cost = 0.0;
        for (t, u) in controls.iter().enumerate() {
            cost += self.running_cost(&states[t], u, t);
        }
        if let Some(last) = states.last() {
            cost += self.terminal_cost(last);
        }
        cost
    }

    /// Stage cost gradients (l_x, l_u).
    fn running_cost_gradients(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        index: usize,
    ) -> (DVector<f64>, DVector<f64>);

    /// Stage cost Hessians (l_xx, l_uu, l_ux); l_ux has shape (n_u, n_x).
    fn running_cost_hessians(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        index: usize,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>);

    /// Terminal cost gradient phi_x.
    fn final_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Terminal cost Hessian phi_xx.
    fn final_cost_hessian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Reference state the objective steers toward, if it has one. When
    /// present it must agree with the context's reference state; the
    /// mismatch is a configuration error.
    fn reference_state(&self) -> Option<DVector<f64>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sq;

    impl Objective for Sq {
        fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, _index: usize) -> f64 {
            0.5 * (x.dot(x) + u.dot(u))
        }
        fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
            x.dot(x)
        }
        fn running_cost_gradients(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            _index: usize,
        ) -> (DVector<f64>, DVector<f64>) {
            (x.clone(), u.clone())
        }
        fn running_cost_hessians(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            _index: usize,
        ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
            (
                DMatrix::identity(x.len(), x.len()),
                DMatrix::identity(u.len(), u.len()),
                DMatrix::zeros(u.len(), x.len()),
            )
        }
        fn final_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
            2.0 * x
        }
        fn final_cost_hessian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            2.0 * DMatrix::identity(x.len(), x.len())
        }
    }

    #[test]
    fn test_default_evaluate_sums_stages_and_terminal() {
        let obj = Sq;
        let states = vec![
            DVector::from_vec(vec![1.0]),
            DVector::from_vec(vec![2.0]),
        ];
        let controls = vec![DVector::from_vec(vec![1.0])];
        // 0.5*(1 + 1) + 2^2 = 5
        assert_eq!(obj.evaluate(&states, &controls), 5.0);
    }
}
