//! Discretisation of `ẋ = A x + B u` over one step
//! Location: src/dynamics/integrator.rs
//!
//! Exact mode integrates from `0` to `dt` with the input interpolated linearly from `u0` to
//! `u1` by solving the augmented system
//!
//! ```text
//!   [ x(dt)   ]       [ A·dt  B·dt  0 ] [ x0      ]
//!   [ u(dt)   ] = exp [ 0     0     I ] [ u0      ]
//!   [ u1 - u0 ]       [ 0     0     0 ] [ u1 - u0 ]
//! ```
//!
//! which gives `x(dt) = Ad x0 + Bd0 u0 + Bd1 u1`. With `u0 = u1` this is exact zero-order hold.
//!
//! The exponential itself comes from nalgebra; the rest of the crate stays on ndarray and
//! converts only here.

use crate::config::IntegrationMode;
use crate::error::{DynamicsErrorBuilder, DynamicsResult};
use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

pub(crate) fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

pub(crate) fn to_dvector(v: ArrayView1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// `exp(A)` for a square matrix; non-finite input or output is a numeric degeneracy
pub fn matrix_exponential(a: ArrayView2<f64>) -> DynamicsResult<Array2<f64>> {
    let builder = || DynamicsErrorBuilder::new("integrator", "matrix_exponential");
    if !a.is_square() {
        return Err(builder().configuration(format!("matrix is {:?}, expected square", a.dim())));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(builder().degenerate("matrix_exponential", "input contains NaN or infinity"));
    }

    let exp = to_dmatrix(a).exp();
    if exp.iter().any(|v| !v.is_finite()) {
        return Err(builder().degenerate("matrix_exponential", "result overflowed"));
    }
    Ok(from_dmatrix(&exp))
}

/// Continuous-time linear system
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousSystem {
    /// `n x n` state matrix
    pub a: Array2<f64>,
    /// `n x m` input matrix
    pub b: Array2<f64>,
}

/// Discrete-time system for one fixed `dt`
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteSystem {
    pub ad: Array2<f64>,
    pub bd0: Array2<f64>,
    pub bd1: Array2<f64>,
}

impl DiscreteSystem {
    pub fn apply(&self, x: ArrayView1<f64>, u0: ArrayView1<f64>, u1: ArrayView1<f64>) -> Array1<f64> {
        self.ad.dot(&x) + self.bd0.dot(&u0) + self.bd1.dot(&u1)
    }
}

impl ContinuousSystem {
    pub fn new(a: Array2<f64>, b: Array2<f64>) -> DynamicsResult<Self> {
        let builder = || DynamicsErrorBuilder::new("integrator", "new");
        if !a.is_square() {
            return Err(builder().configuration(format!("state matrix is {:?}, expected square", a.dim())));
        }
        if b.nrows() != a.nrows() {
            return Err(builder().length_mismatch("input matrix rows", a.nrows(), b.nrows()));
        }
        Ok(Self { a, b })
    }

    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.b.ncols()
    }

    /// Van Loan discretisation for a linearly interpolated input
    pub fn discretize(&self, dt: f64) -> DynamicsResult<DiscreteSystem> {
        let n = self.state_dim();
        let m = self.input_dim();

        let mut augmented = Array2::<f64>::zeros((n + 2 * m, n + 2 * m));
        augmented.slice_mut(s![..n, ..n]).assign(&(&self.a * dt));
        augmented.slice_mut(s![..n, n..n + m]).assign(&(&self.b * dt));
        augmented
            .slice_mut(s![n..n + m, n + m..])
            .assign(&Array2::<f64>::eye(m));

        let exp = matrix_exponential(augmented.view())?;

        let ad = exp.slice(s![..n, ..n]).to_owned();
        let bd1 = exp.slice(s![..n, n + m..]).to_owned();
        let bd0 = &exp.slice(s![..n, n..n + m]) - &bd1;

        Ok(DiscreteSystem { ad, bd0, bd1 })
    }

    /// `ẋ` at state `x` under input `u`
    pub fn derivative(&self, x: ArrayView1<f64>, u: ArrayView1<f64>) -> Array1<f64> {
        self.a.dot(&x) + self.b.dot(&u)
    }

    /// Single explicit step, `x + dt (A x + B u0)`
    pub fn step_euler(&self, x: ArrayView1<f64>, u0: ArrayView1<f64>, dt: f64) -> Array1<f64> {
        &x + &(self.derivative(x, u0) * dt)
    }

    pub fn step_exact(
        &self,
        x: ArrayView1<f64>,
        u0: ArrayView1<f64>,
        u1: ArrayView1<f64>,
        dt: f64,
    ) -> DynamicsResult<Array1<f64>> {
        // exp(0) = I, so a zero step is the input itself
        if dt == 0.0 {
            return Ok(x.to_owned());
        }
        Ok(self.discretize(dt)?.apply(x, u0, u1))
    }

    pub fn step(
        &self,
        mode: IntegrationMode,
        x: ArrayView1<f64>,
        u0: ArrayView1<f64>,
        u1: ArrayView1<f64>,
        dt: f64,
    ) -> DynamicsResult<Array1<f64>> {
        match mode {
            IntegrationMode::Exact => self.step_exact(x, u0, u1, dt),
            IntegrationMode::Approximate => Ok(self.step_euler(x, u0, dt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_matrix_close(got: &Array2<f64>, want: &Array2<f64>, tol: f64) {
        assert_eq!(got.dim(), want.dim());
        for (g, w) in got.iter().zip(want.iter()) {
            assert!((g - w).abs() <= tol * w.abs().max(1.0), "{} vs {}\n{:?}", g, w, got);
        }
    }

    #[test]
    fn test_exponential_of_zero_is_identity() {
        let result = matrix_exponential(Array2::<f64>::zeros((6, 6)).view()).unwrap();
        assert_matrix_close(&result, &Array2::eye(6), 1e-15);
    }

    #[test]
    fn test_exponential_of_diagonal() {
        for &d in &[1e-3_f64, 0.1, 0.5, 1.5, 4.0, 20.0, -30.0] {
            let a = array![[d, 0.0], [0.0, -d / 2.0]];
            let want = array![[d.exp(), 0.0], [0.0, (-d / 2.0).exp()]];
            assert_matrix_close(&matrix_exponential(a.view()).unwrap(), &want, 1e-12);
        }
    }

    #[test]
    fn test_exponential_of_rotation_generator() {
        let t: f64 = 2.5;
        let a = array![[0.0, -t], [t, 0.0]];
        let want = array![[t.cos(), -t.sin()], [t.sin(), t.cos()]];
        assert_matrix_close(&matrix_exponential(a.view()).unwrap(), &want, 1e-12);
    }

    #[test]
    fn test_exponential_rejects_bad_input() {
        let nan = array![[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(matrix_exponential(nan.view()).unwrap_err().is_numeric());
        assert!(!matrix_exponential(Array2::<f64>::zeros((2, 3)).view()).unwrap_err().is_numeric());
    }

    #[test]
    fn test_zero_step_is_identity() {
        let sys = ContinuousSystem::new(array![[0.0, 1.0], [-4.0, -0.5]], array![[0.0], [1.0]]).unwrap();
        let d = sys.discretize(0.0).unwrap();
        assert_matrix_close(&d.ad, &Array2::eye(2), 1e-15);
        assert!(d.bd0.iter().chain(d.bd1.iter()).all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn test_scalar_decay_with_constant_input() {
        // ẋ = -a x + u: x(t) = e^{-at} x0 + (1 - e^{-at}) u / a
        let a = 2.0;
        let dt: f64 = 0.3;
        let sys = ContinuousSystem::new(array![[-a]], array![[1.0]]).unwrap();
        let x = sys
            .step_exact(array![1.0].view(), array![3.0].view(), array![3.0].view(), dt)
            .unwrap();
        let want = (-a * dt).exp() + (1.0 - (-a * dt).exp()) * 3.0 / a;
        assert!((x[0] - want).abs() < 1e-13);
    }

    #[test]
    fn test_ramp_input_on_integrator() {
        // ẋ = u with u ramping 0 -> 2 over dt=1: x(1) = x0 + 1
        let sys = ContinuousSystem::new(array![[0.0]], array![[1.0]]).unwrap();
        let x = sys
            .step_exact(array![0.5].view(), array![0.0].view(), array![2.0].view(), 1.0)
            .unwrap();
        assert!((x[0] - 1.5).abs() < 1e-13);
    }

    #[test]
    fn test_euler_step() {
        let sys = ContinuousSystem::new(array![[0.0, 1.0], [0.0, 0.0]], array![[0.0], [2.0]]).unwrap();
        let x = sys.step(IntegrationMode::Approximate, array![1.0, 3.0].view(), array![1.0].view(), array![9.0].view(), 0.1).unwrap();
        assert!((x[0] - 1.3).abs() < 1e-15);
        assert!((x[1] - 3.2).abs() < 1e-15);
    }

    #[test]
    fn test_shape_validation() {
        assert!(ContinuousSystem::new(Array2::zeros((2, 3)), Array2::zeros((2, 1))).is_err());
        assert!(ContinuousSystem::new(Array2::zeros((2, 2)), Array2::zeros((3, 1))).is_err());
    }
}
