use crate::error::DynamicsError;
use crate::solvers::{DiscreteMap, Rk4};
use crate::traits::{DynamicalSystem, JacobianField, Steppable, VectorField};
use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// A system instance: owned state and clock, plus shared read-only dynamics.
///
/// `S` selects how time is stepped (`Rk4` for flows, `DiscreteMap` for maps),
/// `F`/`J` are the vector field and its Jacobian, `P` the parameters handed to both.
pub struct System<S, F, J, P> {
    state: DVector<f64>,
    t: f64,
    dt: f64,
    stepper: S,
    field: Arc<F>,
    jacobian: Arc<J>,
    params: Arc<P>,
}

/// Flow `dx/dt = f(x, t)` integrated with fixed-step RK4.
pub type ContinuousSystem<F, J, P> = System<Rk4, F, J, P>;

/// Map `x_{n+1} = f(x_n, t_n)`.
pub type DiscreteSystem<F, J, P> = System<DiscreteMap, F, J, P>;

impl<S, F, J, P> System<S, F, J, P> {
    pub fn with_stepper(
        stepper: S,
        x0: DVector<f64>,
        t0: f64,
        field: F,
        jacobian: J,
        dt: f64,
        params: P,
    ) -> Self {
        Self {
            state: x0,
            t: t0,
            dt,
            stepper,
            field: Arc::new(field),
            jacobian: Arc::new(jacobian),
            params: Arc::new(params),
        }
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Replaces the state. The dimension is fixed at construction.
    pub fn set_state(&mut self, state: DVector<f64>) -> Result<(), DynamicsError> {
        if state.len() != self.state.len() {
            return Err(DynamicsError::ShapeMismatch {
                context: "Replacement state",
                expected: (self.state.len(), 1),
                found: (state.len(), 1),
            });
        }
        self.state = state;
        Ok(())
    }

    pub fn set_time(&mut self, t: f64) {
        self.t = t;
    }
}

impl<F, J, P> System<Rk4, F, J, P> {
    pub fn new(x0: DVector<f64>, t0: f64, field: F, jacobian: J, dt: f64, params: P) -> Self {
        Self::with_stepper(Rk4, x0, t0, field, jacobian, dt, params)
    }
}

impl<F, J, P> System<DiscreteMap, F, J, P> {
    pub fn new(x0: DVector<f64>, t0: f64, field: F, jacobian: J, dt: f64, params: P) -> Self {
        Self::with_stepper(DiscreteMap, x0, t0, field, jacobian, dt, params)
    }
}

// Manual impl: dynamics and parameters are shared, so they need not be `Clone`.
impl<S: Clone, F, J, P> Clone for System<S, F, J, P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            t: self.t,
            dt: self.dt,
            stepper: self.stepper.clone(),
            field: Arc::clone(&self.field),
            jacobian: Arc::clone(&self.jacobian),
            params: Arc::clone(&self.params),
        }
    }
}

impl<S: std::fmt::Debug, F, J, P> std::fmt::Debug for System<S, F, J, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("stepper", &self.stepper)
            .field("state", &self.state)
            .field("t", &self.t)
            .field("dt", &self.dt)
            .finish_non_exhaustive()
    }
}

impl<S, F, J, P> DynamicalSystem for System<S, F, J, P>
where
    S: Steppable + Clone,
    F: VectorField<P>,
    J: JacobianField<P>,
{
    fn dimension(&self) -> usize {
        self.state.len()
    }

    fn time(&self) -> f64 {
        self.t
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn state(&self) -> &DVector<f64> {
        &self.state
    }

    fn step(&mut self) -> Result<()> {
        self.stepper.step(
            self.field.as_ref(),
            self.params.as_ref(),
            &mut self.t,
            &mut self.state,
            self.dt,
        )
    }

    fn tangent_step(&self, bundle: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let dim = self.dimension();
        if bundle.nrows() != dim {
            return Err(DynamicsError::ShapeMismatch {
                context: "Tangent bundle",
                expected: (dim, bundle.ncols()),
                found: bundle.shape(),
            }
            .into());
        }
        let jacobian = self.jacobian.jacobian(&self.state, self.t, &self.params)?;
        if jacobian.shape() != (dim, dim) {
            return Err(DynamicsError::ShapeMismatch {
                context: "Jacobian",
                expected: (dim, dim),
                found: jacobian.shape(),
            }
            .into());
        }
        Ok(self.stepper.tangent_step(&jacobian, bundle, self.dt))
    }

    fn duplicate(&self) -> Self {
        self.clone()
    }
}
