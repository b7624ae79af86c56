//! Dense linear solves for the stepping pipeline.
//!
//! Two in-place kernels, both zero-allocation on borrowed data: a Cholesky
//! factorization for the symmetric positive-definite reduced solve, and a
//! partially-pivoted LU for the (symmetric indefinite) KKT systems that
//! equality constraints produce.

use nalgebra::{DMatrix, DVector};

use crate::solver::SolverError;

/// In-place Cholesky (LLᵀ) factorization. Overwrites the lower triangle of
/// `m` with L; the upper triangle is left unchanged.
///
/// # Errors
///
/// Returns [`SolverError::NotPositiveDefinite`] if a diagonal pivot is not
/// strictly positive — for the reduced mass matrix this signals a singular
/// or non-physical system (e.g. a massless subtree).
pub fn cholesky_in_place(m: &mut DMatrix<f64>) -> Result<(), SolverError> {
    let n = m.nrows();
    for j in 0..n {
        let mut diag = m[(j, j)];
        for k in 0..j {
            diag -= m[(j, k)] * m[(j, k)];
        }
        if diag <= 0.0 {
            return Err(SolverError::NotPositiveDefinite);
        }
        let ljj = diag.sqrt();
        m[(j, j)] = ljj;

        for i in (j + 1)..n {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= m[(i, k)] * m[(j, k)];
            }
            m[(i, j)] = sum / ljj;
        }
    }
    Ok(())
}

/// Solve `L·Lᵀ·x = b` in place, with L stored in the lower triangle of `l`.
/// On entry `x` contains `b`; on exit the solution.
pub fn cholesky_solve_in_place(l: &DMatrix<f64>, x: &mut DVector<f64>) {
    let n = l.nrows();

    // Forward substitution: L·y = b
    for j in 0..n {
        for k in 0..j {
            x[j] -= l[(j, k)] * x[k];
        }
        x[j] /= l[(j, j)];
    }

    // Back substitution: Lᵀ·z = y
    for j in (0..n).rev() {
        for k in (j + 1)..n {
            x[j] -= l[(k, j)] * x[k];
        }
        x[j] /= l[(j, j)];
    }
}

/// Factor `A = P·L·U` in place with partial pivoting; `piv` receives the
/// row swaps. O(n³/3). Used for KKT systems, which are symmetric but
/// indefinite (zero diagonal block), so Cholesky does not apply.
///
/// # Errors
///
/// Returns [`SolverError::SingularSystem`] when the best available pivot
/// is below `1e-12` — redundant constraints produce exactly this.
pub fn lu_factor_in_place(a: &mut DMatrix<f64>, piv: &mut [usize]) -> Result<(), SolverError> {
    let n = a.nrows();
    for k in 0..n {
        let mut max_val = a[(k, k)].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let v = a[(i, k)].abs();
            if v > max_val {
                max_val = v;
                max_row = i;
            }
        }
        if max_val < 1.0e-12 {
            return Err(SolverError::SingularSystem);
        }
        piv[k] = max_row;

        if max_row != k {
            for j in 0..n {
                let tmp = a[(k, j)];
                a[(k, j)] = a[(max_row, j)];
                a[(max_row, j)] = tmp;
            }
        }

        for i in (k + 1)..n {
            a[(i, k)] /= a[(k, k)];
            for j in (k + 1)..n {
                a[(i, j)] -= a[(i, k)] * a[(k, j)];
            }
        }
    }
    Ok(())
}

/// Solve `P·L·U·x = b` from precomputed factors; non-destructive on
/// `a`/`piv`, so multiple right-hand sides can reuse one factorization.
pub fn lu_solve_factored(a: &DMatrix<f64>, piv: &[usize], x: &mut DVector<f64>) {
    let n = a.nrows();

    for k in 0..n {
        if piv[k] != k {
            x.swap_rows(k, piv[k]);
        }
    }

    // Forward substitution (L·y = Pb, unit diagonal)
    for i in 1..n {
        for k in 0..i {
            x[i] -= a[(i, k)] * x[k];
        }
    }

    // Back substitution (U·x = y)
    for i in (0..n).rev() {
        for k in (i + 1)..n {
            x[i] -= a[(i, k)] * x[k];
        }
        x[i] /= a[(i, i)];
    }
}

/// Convenience wrapper: solve a symmetric positive-definite system,
/// consuming a copy of the matrix.
pub fn solve_spd(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
    let mut l = a.clone();
    cholesky_in_place(&mut l)?;
    let mut x = b.clone();
    cholesky_solve_in_place(&l, &mut x);
    Ok(x)
}

/// Convenience wrapper: solve a general square system via pivoted LU.
pub fn solve_lu(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
    let mut lu = a.clone();
    let mut piv = vec![0usize; a.nrows()];
    lu_factor_in_place(&mut lu, &mut piv)?;
    let mut x = b.clone();
    lu_solve_factored(&lu, &piv, &mut x);
    Ok(x)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd_matrix(n: usize, seed: u64) -> DMatrix<f64> {
        // Deterministic pseudo-random entries via a simple LCG.
        let mut state = seed;
        let mut next = || -> f64 {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1);
            ((state >> 33) as f64) / f64::from(u32::MAX) - 0.5
        };
        let a = DMatrix::from_fn(n, n, |_, _| next());
        a.transpose() * &a + DMatrix::identity(n, n) * (n as f64)
    }

    #[test]
    fn test_cholesky_matches_nalgebra() {
        for &n in &[1, 2, 5, 12] {
            let m = spd_matrix(n, 17 + n as u64);
            let rhs = DVector::from_fn(n, |i, _| (i as f64 + 1.0) * 0.7);

            let chol_ref = m.clone().cholesky().expect("reference cholesky failed");
            let x_ref = chol_ref.solve(&rhs);

            let x = solve_spd(&m, &rhs).unwrap();
            for i in 0..n {
                assert_relative_eq!(x[i], x_ref[i], epsilon = 1e-11);
            }
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let mut m = DMatrix::identity(3, 3);
        m[(1, 1)] = -1.0;
        assert!(cholesky_in_place(&mut m).is_err());
    }

    #[test]
    fn test_lu_solves_kkt_shape() {
        // A small saddle-point system: [[H, Gᵀ], [G, 0]].
        let h = spd_matrix(3, 5);
        let g = DMatrix::from_row_slice(1, 3, &[1.0, -1.0, 0.5]);
        let n = 4;
        let mut kkt = DMatrix::zeros(n, n);
        kkt.view_mut((0, 0), (3, 3)).copy_from(&h);
        kkt.view_mut((0, 3), (3, 1)).copy_from(&g.transpose());
        kkt.view_mut((3, 0), (1, 3)).copy_from(&g);

        let b = DVector::from_row_slice(&[1.0, 2.0, 3.0, 0.25]);
        let x = solve_lu(&kkt, &b).unwrap();
        let residual = &kkt * &x - &b;
        assert_relative_eq!(residual.norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_lu_rejects_singular() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_row_slice(&[1.0, 1.0]);
        assert!(solve_lu(&a, &b).is_err());
    }
}
