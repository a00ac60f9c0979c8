use super::{validate_exponent_count, validate_system};
use crate::linalg::{identity_columns, normalize_columns, thin_qr_positive};
use crate::traits::DynamicalSystem;
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExponentSettings {
    /// Steps discarded before accumulation starts.
    pub n_forward: usize,
    /// Steps over which log-growth is accumulated.
    pub n_compute: usize,
    /// Record the running estimate after every step.
    pub keep_history: bool,
}

impl Default for ExponentSettings {
    fn default() -> Self {
        Self {
            n_forward: 1_000,
            n_compute: 10_000,
            keep_history: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaximalExponent {
    pub value: f64,
    /// `history[i]` is the estimate after `i + 1` steps.
    pub history: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExponentSpectrum {
    /// Exponents in the order the deviation vectors were seeded (largest first).
    pub exponents: Vec<f64>,
    /// `history[i][j]` is the estimate of exponent `j` after `i + 1` steps.
    pub history: Option<Vec<Vec<f64>>>,
}

impl ExponentSpectrum {
    /// Kaplan-Yorke (Lyapunov) dimension `k + S_k / |lambda_{k+1}|`, where `S_k` is the
    /// largest non-negative partial sum of the ordered exponents.
    ///
    /// If every partial sum of the tracked exponents stays non-negative, the number of
    /// tracked exponents is returned; the true dimension is at least that.
    pub fn kaplan_yorke_dimension(&self) -> f64 {
        let mut ordered = self.exponents.clone();
        ordered.sort_by(|a, b| b.total_cmp(a));

        let mut partial = 0.0;
        for (k, &lambda) in ordered.iter().enumerate() {
            if partial + lambda < 0.0 {
                return k as f64 + partial / lambda.abs();
            }
            partial += lambda;
        }
        ordered.len() as f64
    }
}

/// Maximal Lyapunov exponent from a single renormalized deviation vector.
///
/// The system is first advanced `n_forward` steps. A random unit vector is then
/// pushed through the tangent map for `n_compute` steps, accumulating `ln ||w||`
/// before each renormalization.
pub fn mlce<S, R>(system: &mut S, settings: &ExponentSettings, rng: &mut R) -> Result<MaximalExponent>
where
    S: DynamicalSystem,
    R: Rng + ?Sized,
{
    validate_system(system)?;
    if settings.n_compute == 0 {
        bail!("Lyapunov computation requires at least one integration step.");
    }

    let dim = system.dimension();
    let dt = system.dt();
    debug!(
        dim,
        n_forward = settings.n_forward,
        n_compute = settings.n_compute,
        "estimating maximal Lyapunov exponent"
    );

    system.advance(settings.n_forward, false)?;

    let mut w = DMatrix::from_fn(dim, 1, |_, _| rng.gen::<f64>());
    normalize_columns(&mut w)?;

    let mut accum = 0.0;
    let mut history = settings
        .keep_history
        .then(|| Vec::with_capacity(settings.n_compute));

    for i in 1..=settings.n_compute {
        w = system.tangent_step(&w)?;
        system.step()?;
        let norms = normalize_columns(&mut w)?;
        accum += norms[0].ln();
        if let Some(history) = history.as_mut() {
            history.push(accum / (i as f64 * dt));
        }
    }

    let value = accum / (settings.n_compute as f64 * dt);
    debug!(value, "maximal Lyapunov exponent estimated");
    Ok(MaximalExponent { value, history })
}

/// `mlce` seeded from the thread-local generator.
pub fn mlce_default_rng<S: DynamicalSystem>(
    system: &mut S,
    settings: &ExponentSettings,
) -> Result<MaximalExponent> {
    mlce(system, settings, &mut rand::thread_rng())
}

/// The `p` leading Lyapunov exponents.
///
/// The bundle starts as the first `p` canonical basis vectors. After every tangent
/// step it is re-orthonormalized by QR and `ln |R[j, j]|` is accumulated per exponent.
pub fn lce<S: DynamicalSystem>(
    system: &mut S,
    p: usize,
    settings: &ExponentSettings,
) -> Result<ExponentSpectrum> {
    validate_system(system)?;
    let dim = system.dimension();
    validate_exponent_count(p, dim)?;
    if settings.n_compute == 0 {
        bail!("Lyapunov computation requires at least one integration step.");
    }

    let dt = system.dt();
    debug!(
        dim,
        p,
        n_forward = settings.n_forward,
        n_compute = settings.n_compute,
        "estimating Lyapunov spectrum"
    );

    system.advance(settings.n_forward, false)?;

    let mut bundle = identity_columns(dim, p);
    let mut accum = vec![0.0; p];
    let mut history = settings
        .keep_history
        .then(|| Vec::with_capacity(settings.n_compute));

    for i in 1..=settings.n_compute {
        let image = system.tangent_step(&bundle)?;
        system.step()?;
        let (q, r) = thin_qr_positive(image)?;
        for (j, value) in accum.iter_mut().enumerate() {
            *value += r[(j, j)].abs().ln();
        }
        bundle = q;
        if let Some(history) = history.as_mut() {
            let elapsed = i as f64 * dt;
            history.push(accum.iter().map(|value| value / elapsed).collect());
        }
    }

    let total_time = settings.n_compute as f64 * dt;
    for value in &mut accum {
        *value /= total_time;
    }
    debug!(exponents = ?accum, "Lyapunov spectrum estimated");

    Ok(ExponentSpectrum {
        exponents: accum,
        history,
    })
}
