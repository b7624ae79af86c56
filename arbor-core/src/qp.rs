//! Quadratic-program collaborator boundary.
//!
//! The solver depends only on the [`QpSolver`] trait — the consumed
//! interface of an external convex QP backend: set the objective
//! `½xᵀHx + cᵀx`, the inequality system `Ax ≥ b`, optionally an equality
//! system, solve, and read the primal solution. [`ActiveSetQp`] is a dense
//! primal active-set reference backend that makes the crate
//! self-contained and testable; it is not a tuned solver and any backend
//! honoring the trait can replace it.

use nalgebra::{DMatrix, DVector};

use crate::linalg;

/// Consumed interface of a convex QP backend.
///
/// Dimensions are set explicitly before the corresponding matrices; a
/// backend may use them to pre-allocate. `solve` returns `false` on
/// infeasibility or non-convergence — the caller must treat the primal
/// solution as garbage in that case.
pub trait QpSolver {
    /// Number of primal variables `n`.
    fn set_num_variables(&mut self, n: usize);
    /// Objective matrix `H` (symmetric positive definite, `n × n`).
    fn set_objective_matrix(&mut self, h: &DMatrix<f64>);
    /// Objective vector `c`.
    fn set_objective_vector(&mut self, c: &DVector<f64>);
    /// Number of inequality rows `m`.
    fn set_num_inequalities(&mut self, m: usize);
    /// Inequality matrix `A` with `Ax ≥ b` (`m × n`).
    fn set_inequality_matrix(&mut self, a: &DMatrix<f64>);
    /// Inequality right-hand side `b`.
    fn set_inequality_vector(&mut self, b: &DVector<f64>);
    /// Number of equality rows.
    fn set_num_equalities(&mut self, m: usize);
    /// Equality matrix `G` with `Gx = g`.
    fn set_equality_matrix(&mut self, g: &DMatrix<f64>);
    /// Equality right-hand side `g`.
    fn set_equality_vector(&mut self, g: &DVector<f64>);
    /// Run the solve; `true` on success.
    fn solve(&mut self) -> bool;
    /// Primal solution of the last successful solve.
    fn primal_solution(&self) -> &DVector<f64>;
}

/// Dense primal active-set reference backend.
///
/// Solves the equality-constrained subproblem for the current working set
/// via a KKT system, then exchanges working-set rows: the most violated
/// inequality enters, a row with a negative multiplier leaves. For the
/// strictly convex, small-row-count programs the stepping pipeline
/// produces this converges in a handful of exchanges.
#[derive(Debug)]
pub struct ActiveSetQp {
    n: usize,
    objective: DMatrix<f64>,
    objective_vec: DVector<f64>,
    ineq: DMatrix<f64>,
    ineq_vec: DVector<f64>,
    eq: DMatrix<f64>,
    eq_vec: DVector<f64>,
    solution: DVector<f64>,
}

impl Default for ActiveSetQp {
    fn default() -> Self {
        Self {
            n: 0,
            objective: DMatrix::zeros(0, 0),
            objective_vec: DVector::zeros(0),
            ineq: DMatrix::zeros(0, 0),
            ineq_vec: DVector::zeros(0),
            eq: DMatrix::zeros(0, 0),
            eq_vec: DVector::zeros(0),
            solution: DVector::zeros(0),
        }
    }
}

/// Feasibility tolerance on inequality rows.
const FEAS_TOL: f64 = 1.0e-9;
/// Multiplier tolerance for dropping a working-set row.
const MULT_TOL: f64 = 1.0e-10;

impl ActiveSetQp {
    /// Create an empty backend; dimensions come from the setters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve the KKT system for the working set `active`, returning the
    /// primal point and the working-set multipliers.
    fn solve_working_set(&self, active: &[usize]) -> Option<(DVector<f64>, DVector<f64>)> {
        let ne = self.eq.nrows();
        let na = active.len();
        let dim = self.n + ne + na;

        let mut kkt = DMatrix::zeros(dim, dim);
        let mut rhs = DVector::zeros(dim);
        kkt.view_mut((0, 0), (self.n, self.n))
            .copy_from(&self.objective);
        for i in 0..self.n {
            rhs[i] = -self.objective_vec[i];
        }
        for r in 0..ne {
            for c in 0..self.n {
                kkt[(self.n + r, c)] = self.eq[(r, c)];
                kkt[(c, self.n + r)] = self.eq[(r, c)];
            }
            rhs[self.n + r] = self.eq_vec[r];
        }
        for (k, &row) in active.iter().enumerate() {
            for c in 0..self.n {
                kkt[(self.n + ne + k, c)] = self.ineq[(row, c)];
                kkt[(c, self.n + ne + k)] = self.ineq[(row, c)];
            }
            rhs[self.n + ne + k] = self.ineq_vec[row];
        }

        let sol = linalg::solve_lu(&kkt, &rhs).ok()?;
        let x = sol.rows(0, self.n).into_owned();
        let lambda = sol.rows(self.n + ne, na).into_owned();
        Some((x, lambda))
    }
}

impl QpSolver for ActiveSetQp {
    fn set_num_variables(&mut self, n: usize) {
        self.n = n;
        self.objective = DMatrix::zeros(n, n);
        self.objective_vec = DVector::zeros(n);
        self.ineq = DMatrix::zeros(0, n);
        self.ineq_vec = DVector::zeros(0);
        self.eq = DMatrix::zeros(0, n);
        self.eq_vec = DVector::zeros(0);
        self.solution = DVector::zeros(n);
    }

    fn set_objective_matrix(&mut self, h: &DMatrix<f64>) {
        self.objective = h.clone();
    }

    fn set_objective_vector(&mut self, c: &DVector<f64>) {
        self.objective_vec = c.clone();
    }

    fn set_num_inequalities(&mut self, m: usize) {
        self.ineq = DMatrix::zeros(m, self.n);
        self.ineq_vec = DVector::zeros(m);
    }

    fn set_inequality_matrix(&mut self, a: &DMatrix<f64>) {
        self.ineq = a.clone();
    }

    fn set_inequality_vector(&mut self, b: &DVector<f64>) {
        self.ineq_vec = b.clone();
    }

    fn set_num_equalities(&mut self, m: usize) {
        self.eq = DMatrix::zeros(m, self.n);
        self.eq_vec = DVector::zeros(m);
    }

    fn set_equality_matrix(&mut self, g: &DMatrix<f64>) {
        self.eq = g.clone();
    }

    fn set_equality_vector(&mut self, g: &DVector<f64>) {
        self.eq_vec = g.clone();
    }

    fn solve(&mut self) -> bool {
        let m = self.ineq.nrows();
        let mut active: Vec<usize> = Vec::new();
        let max_iters = 4 * (m + self.eq.nrows() + 8);

        for _ in 0..max_iters {
            let Some((x, lambda)) = self.solve_working_set(&active) else {
                return false;
            };

            // Most violated inactive inequality enters the working set.
            let mut worst: Option<(usize, f64)> = None;
            for row in 0..m {
                if active.contains(&row) {
                    continue;
                }
                let slack = (self.ineq.row(row) * &x)[0] - self.ineq_vec[row];
                if slack < -FEAS_TOL && worst.is_none_or(|(_, s)| slack < s) {
                    worst = Some((row, slack));
                }
            }
            if let Some((row, _)) = worst {
                active.push(row);
                continue;
            }

            // Feasible: a negative multiplier means its row blocks the
            // optimum and leaves the working set.
            let mut drop: Option<(usize, f64)> = None;
            for (k, &l) in lambda.iter().enumerate() {
                if l < -MULT_TOL && drop.is_none_or(|(_, best)| l < best) {
                    drop = Some((k, l));
                }
            }
            match drop {
                Some((k, _)) => {
                    active.swap_remove(k);
                }
                None => {
                    self.solution = x;
                    return true;
                }
            }
        }
        false
    }

    fn primal_solution(&self) -> &DVector<f64> {
        &self.solution
    }
}
