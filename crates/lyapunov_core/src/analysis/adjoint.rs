use crate::error::DynamicsError;
use crate::linalg::normalize_columns;
use anyhow::{anyhow, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How an adjoint basis was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjointMethod {
    /// `V^T Theta = I` was solved directly; `Theta^T V` is diagonal.
    DirectSolve,
    /// Column `j` is the least-significant right singular vector of the other
    /// columns of `V`, hence orthogonal to them.
    SvdFallback,
}

#[derive(Debug, Clone)]
pub struct AdjointBasis {
    /// `dim x p`, unit columns.
    pub vectors: DMatrix<f64>,
    pub method: AdjointMethod,
}

/// Adjoint (dual) bases of a sequence of covariant bases.
pub fn adjoints(clvs: &[DMatrix<f64>]) -> Result<Vec<AdjointBasis>> {
    let bases = clvs
        .iter()
        .map(adjoint_basis)
        .collect::<Result<Vec<_>>>()?;
    let fallbacks = bases
        .iter()
        .filter(|basis| basis.method == AdjointMethod::SvdFallback)
        .count();
    debug!(bases = bases.len(), fallbacks, "adjoint vectors computed");
    Ok(bases)
}

/// Adjoint basis of a single `dim x p` covariant basis.
///
/// Square, well-conditioned bases are inverted directly. Anything else (including
/// every `p < dim` basis) goes through the per-column SVD construction.
pub fn adjoint_basis(clv: &DMatrix<f64>) -> Result<AdjointBasis> {
    let reason = match direct_adjoint(clv) {
        Ok(vectors) => {
            return Ok(AdjointBasis {
                vectors,
                method: AdjointMethod::DirectSolve,
            })
        }
        Err(reason) => reason,
    };

    match reason {
        // Expected whenever fewer vectors than dimensions are tracked.
        FallbackReason::NotSquare => debug!(
            shape = ?clv.shape(),
            "partial basis, using SVD adjoint construction"
        ),
        FallbackReason::IllConditioned => warn!(
            shape = ?clv.shape(),
            "covariant basis is numerically singular, using SVD fallback"
        ),
    }
    Ok(AdjointBasis {
        vectors: svd_adjoint(clv)?,
        method: AdjointMethod::SvdFallback,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackReason {
    NotSquare,
    IllConditioned,
}

fn direct_adjoint(clv: &DMatrix<f64>) -> Result<DMatrix<f64>, FallbackReason> {
    let (dim, p) = clv.shape();
    if dim != p || dim == 0 {
        return Err(FallbackReason::NotSquare);
    }

    let singular_values = clv.singular_values();
    let largest = singular_values.max();
    let smallest = singular_values.min();
    if !(smallest > largest * dim as f64 * f64::EPSILON) {
        return Err(FallbackReason::IllConditioned);
    }

    let mut theta = clv
        .transpose()
        .lu()
        .solve(&DMatrix::identity(dim, dim))
        .ok_or(FallbackReason::IllConditioned)?;
    if theta.iter().any(|value| !value.is_finite()) {
        return Err(FallbackReason::IllConditioned);
    }
    normalize_columns(&mut theta).map_err(|_| FallbackReason::IllConditioned)?;
    Ok(theta)
}

fn svd_adjoint(clv: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (dim, p) = clv.shape();
    let mut theta = DMatrix::zeros(dim, p);

    for j in 0..p {
        let direction = if p == 1 {
            clv.column(0).clone_owned()
        } else {
            orthogonal_to_others(clv, j)?
        };
        let norm = direction.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(DynamicsError::DegenerateColumn { column: j }.into());
        }
        theta.set_column(j, &(direction / norm));
    }

    Ok(theta)
}

/// Right singular vector of least singular value of the matrix whose rows are the
/// columns of `clv` other than `skip`.
fn orthogonal_to_others(clv: &DMatrix<f64>, skip: usize) -> Result<DVector<f64>> {
    let (dim, p) = clv.shape();
    // Zero rows pad the system to at least `dim x dim` so the thin SVD still
    // exposes the null space.
    let mut others = DMatrix::zeros(dim.max(p - 1), dim);
    for (row, col) in (0..p).filter(|&col| col != skip).enumerate() {
        others.row_mut(row).tr_copy_from(&clv.column(col));
    }

    let svd = others.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| anyhow!("SVD did not return right singular vectors."))?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, _)| idx)
        .ok_or_else(|| anyhow!("SVD returned no singular values."))?;
    Ok(v_t.row(smallest).transpose())
}
