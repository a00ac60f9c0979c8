use super::{validate_exponent_count, validate_system};
use crate::linalg::{
    identity_columns, normalize_columns, random_upper_triangular, solve_upper, thin_qr_positive,
};
use crate::traits::DynamicalSystem;
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClvSettings {
    /// Number of covariant vectors.
    pub p: usize,
    /// Transient steps discarded before the bundle is seeded.
    pub n_forward: usize,
    /// Steps for the orthonormal bundle to settle onto the backward Lyapunov vectors.
    pub n_a: usize,
    /// Recording window; `n_b + 1` bases are returned.
    pub n_b: usize,
    /// Steps whose R factors drive the backward convergence of the coefficient matrix.
    pub n_c: usize,
    pub keep_trajectory: bool,
    /// Keep a copy of the system as it was at the start of the recording window.
    pub keep_snapshot: bool,
}

impl Default for ClvSettings {
    fn default() -> Self {
        Self {
            p: 1,
            n_forward: 1_000,
            n_a: 1_000,
            n_b: 1_000,
            n_c: 1_000,
            keep_trajectory: false,
            keep_snapshot: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CovariantVectors<S> {
    /// One `dim x p` basis per recorded step, in chronological order. Columns are unit vectors.
    pub vectors: Vec<DMatrix<f64>>,
    /// `(n_b + 1) x dim` states aligned with `vectors`.
    pub trajectory: Option<DMatrix<f64>>,
    /// The system at the first recorded step.
    pub snapshot: Option<S>,
}

/// Covariant Lyapunov vectors over a recording window of `n_b` steps.
///
/// Forward pass: after `n_forward` discarded steps the canonical bundle is QR-iterated
/// for `n_a` steps, then for `n_b` steps storing `Q` and `R`, then for `n_c` steps
/// storing only `R`. Backward pass: a random upper-triangular coefficient matrix is
/// pulled back through the `n_c` stored factors, then through the window, where each
/// `Q A` (column-normalized) is a covariant basis.
pub fn clv<S, R>(system: &mut S, settings: &ClvSettings, rng: &mut R) -> Result<CovariantVectors<S>>
where
    S: DynamicalSystem,
    R: Rng + ?Sized,
{
    validate_system(system)?;
    let dim = system.dimension();
    let p = settings.p;
    validate_exponent_count(p, dim)?;

    debug!(
        dim,
        p,
        n_forward = settings.n_forward,
        n_a = settings.n_a,
        n_b = settings.n_b,
        n_c = settings.n_c,
        "computing covariant Lyapunov vectors"
    );

    system.advance(settings.n_forward, false)?;

    let mut bundle = identity_columns(dim, p);
    for _ in 0..settings.n_a {
        let image = system.tangent_step(&bundle)?;
        bundle = thin_qr_positive(image)?.0;
        system.step()?;
    }

    let mut trajectory = settings.keep_trajectory.then(|| {
        let mut rows = DMatrix::zeros(settings.n_b + 1, dim);
        rows.row_mut(0).tr_copy_from(system.state());
        rows
    });
    let snapshot = settings.keep_snapshot.then(|| system.duplicate());

    let mut phi = Vec::with_capacity(settings.n_b + 1);
    let mut r_window = Vec::with_capacity(settings.n_b);
    phi.push(bundle.clone());
    for i in 1..=settings.n_b {
        let image = system.tangent_step(&bundle)?;
        let (q, r) = thin_qr_positive(image)?;
        phi.push(q.clone());
        r_window.push(r);
        bundle = q;
        system.step()?;
        if let Some(rows) = trajectory.as_mut() {
            rows.row_mut(i).tr_copy_from(system.state());
        }
    }
    debug!(stored = phi.len(), "recording window stored");

    let mut r_backward = Vec::with_capacity(settings.n_c);
    for _ in 0..settings.n_c {
        let image = system.tangent_step(&bundle)?;
        let (q, r) = thin_qr_positive(image)?;
        r_backward.push(r);
        bundle = q;
        system.step()?;
    }

    let mut coefficients = random_upper_triangular(p, rng);
    for r in r_backward.iter().rev() {
        coefficients = pull_back(r, coefficients)?;
    }
    drop(r_backward);

    let mut vectors = Vec::with_capacity(settings.n_b + 1);
    vectors.push(covariant_basis(&phi[settings.n_b], &coefficients)?);
    for (q, r) in phi[..settings.n_b].iter().rev().zip(r_window.iter().rev()) {
        coefficients = pull_back(r, coefficients)?;
        vectors.push(covariant_basis(q, &coefficients)?);
    }
    drop(r_window);
    drop(phi);
    vectors.reverse();

    debug!(bases = vectors.len(), "covariant Lyapunov vectors computed");
    Ok(CovariantVectors {
        vectors,
        trajectory,
        snapshot,
    })
}

/// `clv` seeded from the thread-local generator.
pub fn clv_default_rng<S: DynamicalSystem>(
    system: &mut S,
    settings: &ClvSettings,
) -> Result<CovariantVectors<S>> {
    clv(system, settings, &mut rand::thread_rng())
}

/// Growth rates of each covariant direction, replayed from `snapshot` over the window.
///
/// `vectors[k]` must be the basis at the snapshot's state after `k` steps, as returned
/// by `clv` with `keep_snapshot`. The snapshot itself is left untouched.
pub fn covariant_exponents<S: DynamicalSystem>(
    snapshot: &S,
    vectors: &[DMatrix<f64>],
) -> Result<Vec<f64>> {
    validate_system(snapshot)?;
    if vectors.len() < 2 {
        bail!("At least two covariant bases are required to measure growth rates.");
    }

    let mut replay = snapshot.duplicate();
    let steps = vectors.len() - 1;
    let mut accum = vec![0.0; vectors[0].ncols()];
    for basis in &vectors[..steps] {
        let mut image = replay.tangent_step(basis)?;
        replay.step()?;
        let norms = normalize_columns(&mut image)?;
        for (value, norm) in accum.iter_mut().zip(norms.iter()) {
            *value += norm.ln();
        }
    }

    let total_time = steps as f64 * replay.dt();
    Ok(accum.into_iter().map(|value| value / total_time).collect())
}

fn pull_back(r: &DMatrix<f64>, mut coefficients: DMatrix<f64>) -> Result<DMatrix<f64>> {
    normalize_columns(&mut coefficients)?;
    Ok(solve_upper(r, &coefficients)?)
}

fn covariant_basis(q: &DMatrix<f64>, coefficients: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let mut basis = q * coefficients;
    normalize_columns(&mut basis)?;
    Ok(basis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::exponents::{lce, ExponentSettings};
    use crate::analysis::test_systems::{henon_map, linear_flow, lorenz_flow};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::DVector;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(p: usize, n_b: usize) -> ClvSettings {
        ClvSettings {
            p,
            n_forward: 100,
            n_a: 200,
            n_b,
            n_c: 200,
            keep_trajectory: true,
            keep_snapshot: true,
        }
    }

    #[test]
    fn rejects_invalid_vector_counts() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut system = henon_map();
        let zero = ClvSettings {
            p: 0,
            ..settings(1, 10)
        };
        assert!(clv(&mut system, &zero, &mut rng).is_err());
        let too_many = ClvSettings {
            p: 3,
            ..settings(1, 10)
        };
        let err = clv(&mut system, &too_many, &mut rng).expect_err("p exceeds dimension");
        assert!(err.to_string().contains("2-dimensional"));
    }

    #[test]
    fn returns_window_plus_one_unit_bases_aligned_with_trajectory() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut system = henon_map();
        let result = clv(&mut system, &settings(2, 300), &mut rng).unwrap();

        assert_eq!(result.vectors.len(), 301);
        let trajectory = result.trajectory.expect("trajectory requested");
        assert_eq!(trajectory.shape(), (301, 2));

        let snapshot = result.snapshot.expect("snapshot requested");
        assert_eq!(snapshot.state()[0], trajectory[(0, 0)]);
        assert_eq!(snapshot.state()[1], trajectory[(0, 1)]);
        let mut replay = snapshot.duplicate();
        replay.advance(300 + 200, false).unwrap();
        assert_eq!(replay.state(), system.state());

        for basis in &result.vectors {
            assert_eq!(basis.shape(), (2, 2));
            for column in basis.column_iter() {
                assert_relative_eq!(column.norm(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn optional_outputs_are_omitted_when_not_requested() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut system = henon_map();
        let quiet = ClvSettings {
            keep_trajectory: false,
            keep_snapshot: false,
            ..settings(1, 20)
        };
        let result = clv(&mut system, &quiet, &mut rng).unwrap();
        assert_eq!(result.vectors.len(), 21);
        assert!(result.trajectory.is_none());
        assert!(result.snapshot.is_none());
    }

    #[test]
    fn default_rng_entry_point_returns_unit_bases() {
        let mut system = henon_map();
        let quiet = ClvSettings {
            keep_trajectory: false,
            keep_snapshot: false,
            ..settings(2, 50)
        };
        let result = clv_default_rng(&mut system, &quiet).unwrap();
        assert_eq!(result.vectors.len(), 51);
        for basis in &result.vectors {
            assert_eq!(basis.shape(), (2, 2));
            for column in basis.column_iter() {
                assert_relative_eq!(column.norm(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn vectors_are_carried_onto_each_other_by_the_tangent_map() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut system = henon_map();
        let result = clv(&mut system, &settings(2, 500), &mut rng).unwrap();
        let mut replay = result.snapshot.expect("snapshot requested");

        for k in 0..500 {
            let mut image = replay.tangent_step(&result.vectors[k]).unwrap();
            replay.step().unwrap();
            normalize_columns(&mut image).unwrap();
            for j in 0..2 {
                let alignment = image.column(j).dot(&result.vectors[k + 1].column(j));
                assert_abs_diff_eq!(alignment, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn growth_rates_match_spectrum_on_henon_map() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut system = henon_map();
        let result = clv(&mut system, &settings(2, 2_000), &mut rng).unwrap();
        let snapshot = result.snapshot.expect("snapshot requested");
        let rates = covariant_exponents(&snapshot, &result.vectors).unwrap();

        let mut reference = snapshot.duplicate();
        let spectrum = lce(
            &mut reference,
            2,
            &ExponentSettings {
                n_forward: 0,
                n_compute: 2_000,
                keep_history: false,
            },
        )
        .unwrap();

        assert_abs_diff_eq!(
            rates.iter().sum::<f64>(),
            spectrum.exponents.iter().sum::<f64>(),
            epsilon = 2e-2
        );
        assert_abs_diff_eq!(rates[0], 0.419, epsilon = 5e-2);
        assert_abs_diff_eq!(rates[1], -1.623, epsilon = 5e-2);
    }

    #[test]
    fn linear_flow_vectors_are_eigenvectors() {
        let mut rng = StdRng::seed_from_u64(13);
        let a = DMatrix::from_row_slice(2, 2, &[-0.2, 2.0, 0.0, -1.5]);
        let mut system = linear_flow(a, 0.01);
        let clv_settings = ClvSettings {
            p: 2,
            n_forward: 0,
            n_a: 100,
            n_b: 50,
            n_c: 2_000,
            keep_trajectory: false,
            keep_snapshot: false,
        };
        let result = clv(&mut system, &clv_settings, &mut rng).unwrap();

        let slow = DVector::from_vec(vec![1.0, 0.0]);
        let fast = DVector::from_vec(vec![2.0, -1.3]).normalize();
        for basis in &result.vectors {
            assert_abs_diff_eq!(basis.column(0).dot(&slow).abs(), 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(basis.column(1).dot(&fast).abs(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn lorenz_vectors_are_finite_unit_columns() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut system = lorenz_flow();
        let clv_settings = ClvSettings {
            p: 3,
            n_forward: 1_000,
            n_a: 1_000,
            n_b: 200,
            n_c: 1_000,
            keep_trajectory: false,
            keep_snapshot: false,
        };
        let result = clv(&mut system, &clv_settings, &mut rng).unwrap();
        assert_eq!(result.vectors.len(), 201);
        for basis in &result.vectors {
            for column in basis.column_iter() {
                assert_relative_eq!(column.norm(), 1.0, epsilon = 1e-12);
            }
            assert!(basis.iter().all(|value| value.is_finite()));
        }
    }

    #[test]
    fn covariant_exponents_requires_two_bases() {
        let snapshot = henon_map();
        let err = covariant_exponents(&snapshot, &[DMatrix::identity(2, 2)])
            .expect_err("a single basis has no growth");
        assert!(err.to_string().contains("At least two"));
    }
}
