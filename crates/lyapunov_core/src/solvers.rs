use crate::error::DynamicsError;
use crate::traits::{Steppable, VectorField};
use anyhow::Result;
use nalgebra::{DMatrix, DVector};

/// Classic Runge-Kutta 4th Order Solver.
///
/// The tangent bundle is advanced with the same RK4 weights applied to the linear
/// equation `dW/dt = J W`, with `J` frozen at the pre-step state and time rather
/// than re-evaluated at each stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4;

impl Steppable for Rk4 {
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
        F: VectorField<P> + ?Sized,
    {
        let half = 0.5 * dt;
        let t0 = *t;

        // k1 = f(t, y)
        let k1 = evaluate_field(field, state, t0, params)?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        let k2 = evaluate_field(field, &(&*state + &k1 * half), t0 + half, params)?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        let k3 = evaluate_field(field, &(&*state + &k2 * half), t0 + half, params)?;

        // k4 = f(t + dt, y + dt*k3)
        let k4 = evaluate_field(field, &(&*state + &k3 * dt), t0 + dt, params)?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        *state += (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0);
        *t = t0 + dt;
        Ok(())
    }

    fn tangent_step(
        &self,
        jacobian: &DMatrix<f64>,
        bundle: &DMatrix<f64>,
        dt: f64,
    ) -> DMatrix<f64> {
        let half = 0.5 * dt;
        let k1 = jacobian * bundle;
        let k2 = jacobian * (bundle + &k1 * half);
        let k3 = jacobian * (bundle + &k2 * half);
        let k4 = jacobian * (bundle + &k3 * dt);
        bundle + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
    }
}

/// Discrete Map Stepper
/// Just evaluates x_{n+1} = f(x_n).
/// dt is treated as 1 iteration regardless of value, but we track t as t + dt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscreteMap;

impl Steppable for DiscreteMap {
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
        F: VectorField<P> + ?Sized,
    {
        *state = evaluate_field(field, state, *t, params)?;
        *t += dt;
        Ok(())
    }

    fn tangent_step(
        &self,
        jacobian: &DMatrix<f64>,
        bundle: &DMatrix<f64>,
        _dt: f64,
    ) -> DMatrix<f64> {
        jacobian * bundle
    }
}

fn evaluate_field<P, F>(field: &F, x: &DVector<f64>, t: f64, params: &P) -> Result<DVector<f64>>
where
    P: ?Sized,
    F: VectorField<P> + ?Sized,
{
    let out = field.evaluate(x, t, params)?;
    if out.len() != x.len() {
        return Err(DynamicsError::ShapeMismatch {
            context: "Vector field output",
            expected: (x.len(), 1),
            found: (out.len(), 1),
        }
        .into());
    }
    Ok(out)
}
