//! Dense helpers shared by the exponent and CLV routines.

use crate::error::DynamicsError;
use nalgebra::linalg::QR;
use nalgebra::{DMatrix, DVector};
use rand::Rng;

/// Thin QR of a `dim x k` bundle with the sign of each column chosen so that
/// `diag(R)` is non-negative. Returns `(Q, R)` with `Q: dim x k`, `R: k x k`.
pub fn thin_qr_positive(bundle: DMatrix<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), DynamicsError> {
    let (dim, k) = bundle.shape();
    if k > dim {
        return Err(DynamicsError::ShapeMismatch {
            context: "Tangent bundle",
            expected: (dim, dim),
            found: (dim, k),
        });
    }
    let (mut q, mut r) = QR::new(bundle).unpack();
    for i in 0..k {
        let diag = r[(i, i)];
        if !diag.is_finite() {
            return Err(DynamicsError::NonFinite("orthonormalization"));
        }
        if diag == 0.0 {
            return Err(DynamicsError::SingularTriangular("orthonormalization"));
        }
        if diag < 0.0 {
            q.column_mut(i).neg_mut();
            for col in i..k {
                r[(i, col)] = -r[(i, col)];
            }
        }
    }
    Ok((q, r))
}

/// Scales every column to unit Euclidean norm and returns the original norms.
pub fn normalize_columns(matrix: &mut DMatrix<f64>) -> Result<DVector<f64>, DynamicsError> {
    let mut norms = DVector::zeros(matrix.ncols());
    for (col, mut column) in matrix.column_iter_mut().enumerate() {
        let norm = column.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(DynamicsError::DegenerateColumn { column: col });
        }
        column /= norm;
        norms[col] = norm;
    }
    Ok(norms)
}

/// Back-substitution for `R X = B` with `R` upper triangular.
pub fn solve_upper(r: &DMatrix<f64>, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>, DynamicsError> {
    if r.nrows() != rhs.nrows() || !r.is_square() {
        return Err(DynamicsError::ShapeMismatch {
            context: "Upper-triangular factor",
            expected: (rhs.nrows(), rhs.nrows()),
            found: r.shape(),
        });
    }
    r.solve_upper_triangular(rhs)
        .ok_or(DynamicsError::SingularTriangular("backward substitution"))
}

/// First `k` columns of the `dim x dim` identity.
pub fn identity_columns(dim: usize, k: usize) -> DMatrix<f64> {
    DMatrix::identity(dim, k)
}

/// Upper-triangular `p x p` matrix with entries drawn uniformly from `[0, 1)`.
pub fn random_upper_triangular<R: Rng + ?Sized>(p: usize, rng: &mut R) -> DMatrix<f64> {
    DMatrix::from_fn(p, p, |i, j| if i <= j { rng.gen::<f64>() } else { 0.0 })
}
