use anyhow::Result;
use nalgebra::{DMatrix, DVector};

/// Evaluates the vector field (flow) or map function of a system.
/// x: current state
/// t: current time
/// params: caller-defined parameters, forwarded untouched
/// Returns dx/dt for a flow or x_{n+1} for a map.
pub trait VectorField<P: ?Sized> {
    fn evaluate(&self, x: &DVector<f64>, t: f64, params: &P) -> Result<DVector<f64>>;
}

impl<P: ?Sized, F> VectorField<P> for F
where
    F: Fn(&DVector<f64>, f64, &P) -> Result<DVector<f64>>,
{
    fn evaluate(&self, x: &DVector<f64>, t: f64, params: &P) -> Result<DVector<f64>> {
        self(x, t, params)
    }
}

/// Evaluates the Jacobian of a `VectorField` with respect to the state.
/// Must return a `dim x dim` matrix consistent with the vector field.
pub trait JacobianField<P: ?Sized> {
    fn jacobian(&self, x: &DVector<f64>, t: f64, params: &P) -> Result<DMatrix<f64>>;
}

impl<P: ?Sized, F> JacobianField<P> for F
where
    F: Fn(&DVector<f64>, f64, &P) -> Result<DMatrix<f64>>,
{
    fn jacobian(&self, x: &DVector<f64>, t: f64, params: &P) -> Result<DMatrix<f64>> {
        self(x, t, params)
    }
}

/// A trait for solvers that can step a system and its tangent bundle forward.
pub trait Steppable {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    fn step<P, F>(
        &self,
        field: &F,
        params: &P,
        t: &mut f64,
        state: &mut DVector<f64>,
        dt: f64,
    ) -> Result<()>
    where
        P: ?Sized,
        F: VectorField<P> + ?Sized;

    /// Maps a `dim x k` bundle of deviation vectors through one step of the
    /// linearized dynamics, given the Jacobian at the pre-step state.
    fn tangent_step(&self, jacobian: &DMatrix<f64>, bundle: &DMatrix<f64>, dt: f64)
        -> DMatrix<f64>;
}

/// Represents a dynamical system (Flow or Map) together with its state and clock.
pub trait DynamicalSystem {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    fn time(&self) -> f64;

    /// Fixed step size; maps conventionally use 1.
    fn dt(&self) -> f64;

    fn state(&self) -> &DVector<f64>;

    /// Advances state and time by exactly one step.
    fn step(&mut self) -> Result<()>;

    /// Image of `bundle` under the one-step tangent map at the current state and time.
    /// Must be called before `step` moves the state.
    fn tangent_step(&self, bundle: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Independent copy of state and time. Dynamics and parameters may be shared.
    fn duplicate(&self) -> Self
    where
        Self: Sized;

    /// Applies `step` `n_steps` times. With `keep_trajectory` the visited states are
    /// returned as an `(n_steps + 1) x dim` matrix whose first row is the starting state.
    fn advance(&mut self, n_steps: usize, keep_trajectory: bool) -> Result<Option<DMatrix<f64>>> {
        if !keep_trajectory {
            for _ in 0..n_steps {
                self.step()?;
            }
            return Ok(None);
        }

        let mut trajectory = DMatrix::zeros(n_steps + 1, self.dimension());
        trajectory.row_mut(0).tr_copy_from(self.state());
        for i in 1..=n_steps {
            self.step()?;
            trajectory.row_mut(i).tr_copy_from(self.state());
        }
        Ok(Some(trajectory))
    }
}
