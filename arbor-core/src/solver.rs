//! Semi-implicit reduced-coordinate time stepper.
//!
//! Each step assembles mass/stiffness/force in maximal coordinates,
//! reduces them through the tree Jacobian, folds in implicit joint
//! stiffness/damping, assembles whatever constraints are present, and
//! branches on the constraint classes:
//!
//! - no constraints — Cholesky solve of the SPD reduced system,
//! - equalities only — a symmetric-indefinite KKT solve (pivoted LU),
//! - any active inequalities — the external QP collaborator.
//!
//! All scratch buffers are owned by the [`Solver`] and resized/zeroed at
//! the top of every step; nothing outside the step call ever sees them.
//! Failures surface as [`SolverError`] — a failed QP or a non-finite
//! solution aborts the step rather than scattering garbage state.

use nalgebra::{DMatrix, DVector};

use crate::deformable::Deformable;
use crate::linalg;
use crate::qp::QpSolver;
use crate::world::World;

/// Per-step numerical failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// Step size is zero, negative, or non-finite.
    InvalidTimestep,
    /// The reduced mass matrix is not positive definite (singular or
    /// non-physical system).
    NotPositiveDefinite,
    /// A linear system (KKT or working-set) is singular — typically
    /// redundant constraints.
    SingularSystem,
    /// The QP collaborator reported failure; its primal is not used.
    QpFailed,
    /// The solve produced non-finite velocities.
    NonFinite,
    /// `World::init` has not run.
    Uninitialized,
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimestep => write!(f, "timestep is zero, negative, or non-finite"),
            Self::NotPositiveDefinite => {
                write!(f, "reduced mass matrix is not positive definite")
            }
            Self::SingularSystem => write!(f, "singular constraint system"),
            Self::QpFailed => write!(f, "quadratic-program solve failed"),
            Self::NonFinite => write!(f, "solve produced non-finite velocities"),
            Self::Uninitialized => write!(f, "world is not initialized"),
        }
    }
}

impl std::error::Error for SolverError {}

/// Recorded trajectory: one row per step, `[q; q̇]` in traversal order.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Time stamps, starting at `tspan[0]`.
    pub t: Vec<f64>,
    /// State rows of length `2·nr`.
    pub y: Vec<DVector<f64>>,
}

fn resize_mat(m: &mut DMatrix<f64>, rows: usize, cols: usize) {
    if m.nrows() != rows || m.ncols() != cols {
        *m = DMatrix::zeros(rows, cols);
    } else {
        m.fill(0.0);
    }
}

fn resize_vec(v: &mut DVector<f64>, len: usize) {
    if v.len() != len {
        *v = DVector::zeros(len);
    } else {
        v.fill(0.0);
    }
}

/// The stepping engine. Owns every scratch buffer; hold one per world.
#[derive(Debug)]
#[allow(non_snake_case)] // buffer names follow the dynamics formulation
pub struct Solver {
    // Maximal-coordinate aggregates.
    M: DMatrix<f64>,
    K: DMatrix<f64>,
    Dm: DMatrix<f64>,
    f: DVector<f64>,
    // Reduction.
    J: DMatrix<f64>,
    Jdot: DMatrix<f64>,
    Mtilde: DMatrix<f64>,
    ftilde: DVector<f64>,
    fr: DVector<f64>,
    // Reduced joint stiffness/damping.
    fsr: DVector<f64>,
    Ksr: DMatrix<f64>,
    fdr: DVector<f64>,
    Ddr: DMatrix<f64>,
    // Equality constraints.
    Gm: DMatrix<f64>,
    Gmdot: DMatrix<f64>,
    gm: DVector<f64>,
    Gr: DMatrix<f64>,
    Grdot: DMatrix<f64>,
    gr: DVector<f64>,
    G: DMatrix<f64>,
    g: DVector<f64>,
    rhsG: DVector<f64>,
    // Inequality constraints (full rows; sliced by the active set).
    Cm: DMatrix<f64>,
    cm: DVector<f64>,
    Cr: DMatrix<f64>,
    crdot: DVector<f64>,
    cr: DVector<f64>,
    C: DMatrix<f64>,
    rhsC: DVector<f64>,
    rows_m: Vec<usize>,
    rows_r: Vec<usize>,
    // State slices.
    qdot1: DVector<f64>,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    /// Create a solver with empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            M: DMatrix::zeros(0, 0),
            K: DMatrix::zeros(0, 0),
            Dm: DMatrix::zeros(0, 0),
            f: DVector::zeros(0),
            J: DMatrix::zeros(0, 0),
            Jdot: DMatrix::zeros(0, 0),
            Mtilde: DMatrix::zeros(0, 0),
            ftilde: DVector::zeros(0),
            fr: DVector::zeros(0),
            fsr: DVector::zeros(0),
            Ksr: DMatrix::zeros(0, 0),
            fdr: DVector::zeros(0),
            Ddr: DMatrix::zeros(0, 0),
            Gm: DMatrix::zeros(0, 0),
            Gmdot: DMatrix::zeros(0, 0),
            gm: DVector::zeros(0),
            Gr: DMatrix::zeros(0, 0),
            Grdot: DMatrix::zeros(0, 0),
            gr: DVector::zeros(0),
            G: DMatrix::zeros(0, 0),
            g: DVector::zeros(0),
            rhsG: DVector::zeros(0),
            Cm: DMatrix::zeros(0, 0),
            cm: DVector::zeros(0),
            Cr: DMatrix::zeros(0, 0),
            crdot: DVector::zeros(0),
            cr: DVector::zeros(0),
            C: DMatrix::zeros(0, 0),
            rhsC: DVector::zeros(0),
            rows_m: Vec::new(),
            rows_r: Vec::new(),
            qdot1: DVector::zeros(0),
        }
    }

    /// Pre-size every buffer for the world's current dimensions. `step`
    /// does the same lazily; calling this after `World::init` just fronts
    /// the allocations.
    pub fn reset(&mut self, world: &World) {
        let (nr, nm) = (world.nr, world.nm);
        resize_mat(&mut self.M, nm, nm);
        resize_mat(&mut self.K, nm, nm);
        resize_mat(&mut self.Dm, nm, nm);
        resize_vec(&mut self.f, nm);
        resize_mat(&mut self.J, nm, nr);
        resize_mat(&mut self.Jdot, nm, nr);
        resize_mat(&mut self.Mtilde, nr, nr);
        resize_vec(&mut self.ftilde, nr);
        resize_vec(&mut self.fr, nr);
        resize_vec(&mut self.fsr, nr);
        resize_mat(&mut self.Ksr, nr, nr);
        resize_vec(&mut self.fdr, nr);
        resize_mat(&mut self.Ddr, nr, nr);
        resize_mat(&mut self.Gm, world.nem, nm);
        resize_mat(&mut self.Gmdot, world.nem, nm);
        resize_vec(&mut self.gm, world.nem);
        resize_mat(&mut self.Gr, world.ner, nr);
        resize_mat(&mut self.Grdot, world.ner, nr);
        resize_vec(&mut self.gr, world.ner);
        let ne = world.nem + world.ner;
        resize_mat(&mut self.G, ne, nr);
        resize_vec(&mut self.g, ne);
        resize_vec(&mut self.rhsG, ne);
        resize_mat(&mut self.Cm, world.nim, nm);
        resize_vec(&mut self.cm, world.nim);
        resize_mat(&mut self.Cr, world.nir, nr);
        resize_vec(&mut self.crdot, world.nir);
        resize_vec(&mut self.cr, world.nir);
        self.rows_m.clear();
        self.rows_r.clear();
    }

    /// Advance the world by one step of size `world.h`.
    ///
    /// On error the world's state is untouched — nothing is scattered.
    pub fn step(&mut self, world: &mut World, qp: &mut dyn QpSolver) -> Result<(), SolverError> {
        if !world.is_initialized() {
            return Err(SolverError::Uninitialized);
        }
        let h = world.h;
        if !(h.is_finite() && h > 0.0) {
            return Err(SolverError::InvalidTimestep);
        }
        let nr = world.nr;
        let (nem, ner) = (world.nem, world.ner);
        let ne = nem + ner;
        let gravity = world.gravity;

        self.reset(world);

        // Maximal mass, stiffness, damping, and force from bodies,
        // deformables, and soft bodies.
        for joint in &world.joints {
            world.bodies[joint.body].compute_mass_grav(&gravity, &mut self.M, &mut self.f);
        }
        let mut deformables = std::mem::take(&mut world.deformables);
        for deformable in &mut deformables {
            match deformable {
                Deformable::PointSpring(spring) => {
                    spring.accumulate(&world.bodies, &mut self.f, &mut self.K, &mut self.Dm);
                }
                Deformable::SerialSpring(spring) => {
                    spring.compute_mass(&gravity, &mut self.M, &mut self.f);
                    spring.compute_force_stiffness_damping(
                        &mut self.f,
                        &mut self.K,
                        &mut self.Dm,
                    );
                }
            }
        }
        world.deformables = deformables;
        for soft in &world.soft_bodies {
            soft.compute_mass(&gravity, &mut self.M);
            soft.compute_force(&gravity, &mut self.f);
            soft.compute_stiffness(&mut self.K);
        }

        // Reduced joint stiffness/damping contributions.
        world.compute_force_stiffness(&mut self.fsr, &mut self.Ksr);
        world.compute_force_damping(&mut self.fdr, &mut self.Ddr);

        // Reduced Jacobian and its rate.
        world.compute_jacobian(&mut self.J, &mut self.Jdot);

        let y0 = world.gather_dofs();
        let q0 = y0.rows(0, nr).into_owned();
        let qdot0 = y0.rows(nr, nr).into_owned();

        // Reduced, symmetrized effective mass and force:
        //   M̃ = ½(A + Aᵀ), A = Jᵀ(M - h²K)J
        //   fr = Jᵀ(f - M·J̇·q̇₀) + fsr
        //   f̃ = M̃·q̇₀ + h·fr
        // then the implicit terms: M̃ += h·Ddr - h²·Ksr (+ h·JᵀDmJ).
        let a = self.J.transpose() * (&self.M - h * h * &self.K) * &self.J;
        self.Mtilde = 0.5 * (&a + a.transpose());
        let bias = &self.f - &self.M * (&self.Jdot * &qdot0);
        self.fr = self.J.transpose() * bias + &self.fsr;
        self.ftilde = &self.Mtilde * &qdot0 + h * &self.fr;
        self.Mtilde += h * &self.Ddr - h * h * &self.Ksr;
        if !world.deformables.is_empty() {
            self.Mtilde += h * (self.J.transpose() * &self.Dm * &self.J);
        }

        // Equality constraint assembly: G = [Gm·J; Gr], bias -k_eq·g (the
        // explicit time derivative of every shipped constraint is zero).
        if ne > 0 {
            for con in &world.constraints {
                con.fill_eq_m(
                    &world.bodies,
                    &world.deformables,
                    &world.soft_bodies,
                    &mut self.Gm,
                    &mut self.Gmdot,
                    &mut self.gm,
                );
                con.fill_eq_r(&world.joints, &mut self.Gr, &mut self.Grdot, &mut self.gr);
            }
            self.G
                .view_mut((0, 0), (nem, nr))
                .copy_from(&(&self.Gm * &self.J));
            self.G.view_mut((nem, 0), (ner, nr)).copy_from(&self.Gr);
            self.g.rows_mut(0, nem).copy_from(&self.gm);
            self.g.rows_mut(nem, ner).copy_from(&self.gr);
            self.rhsG = -world.stabilization_eq * &self.g;
        }

        // Inequality assembly: full rows, then the active-set slice.
        // The active set is recomputed from scratch every step.
        let ni_total = world.nim + world.nir;
        let mut n_active = 0;
        if ni_total > 0 {
            for con in &world.constraints {
                con.fill_ineq_m(&world.bodies, &mut self.Cm, &mut self.cm);
                con.fill_ineq_r(&world.joints, &mut self.Cr, &mut self.crdot, &mut self.cr);
                con.active_rows(
                    &world.joints,
                    world.limit_tolerance,
                    &mut self.rows_m,
                    &mut self.rows_r,
                );
            }
            n_active = self.rows_m.len() + self.rows_r.len();
            if n_active > 0 {
                resize_mat(&mut self.C, n_active, nr);
                resize_vec(&mut self.rhsC, n_active);
                for (i, &row) in self.rows_m.iter().enumerate() {
                    self.C
                        .row_mut(i)
                        .copy_from(&(self.Cm.row(row) * &self.J));
                    self.rhsC[i] = -world.stabilization_ineq * self.cm[row];
                }
                let offset = self.rows_m.len();
                for (i, &row) in self.rows_r.iter().enumerate() {
                    self.C.row_mut(offset + i).copy_from(&self.Cr.row(row));
                    self.rhsC[offset + i] = -world.stabilization_ineq * self.cr[row];
                }
            }
        }

        // Branch on active constraint classes.
        if ne == 0 && n_active == 0 {
            self.qdot1 = linalg::solve_spd(&self.Mtilde, &self.ftilde)?;
        } else if n_active == 0 {
            // Symmetric KKT: [[M̃, Gᵀ], [G, 0]]·[q̇₁; λ] = [f̃; rhsG].
            let dim = nr + ne;
            let mut kkt = DMatrix::zeros(dim, dim);
            let mut rhs = DVector::zeros(dim);
            kkt.view_mut((0, 0), (nr, nr)).copy_from(&self.Mtilde);
            kkt.view_mut((0, nr), (nr, ne)).copy_from(&self.G.transpose());
            kkt.view_mut((nr, 0), (ne, nr)).copy_from(&self.G);
            rhs.rows_mut(0, nr).copy_from(&self.ftilde);
            rhs.rows_mut(nr, ne).copy_from(&self.rhsG);

            let sol = linalg::solve_lu(&kkt, &rhs)?;
            self.qdot1 = sol.rows(0, nr).into_owned();

            // Multipliers scaled by 1/h become constraint forces on the
            // bodies/joints (diagnostics only).
            let lambda_m = sol.rows(nr, nem).into_owned();
            let lambda_r = sol.rows(nr + nem, ner).into_owned();
            let wrench = self.Gm.transpose() * lambda_m / h;
            let tau_con = self.Gr.transpose() * lambda_r / h;
            world.scatter_force_eq_m(&wrench);
            world.scatter_tau_con(&tau_con);
        } else {
            // Convex QP: min ½q̇ᵀM̃q̇ - f̃ᵀq̇ s.t. C·q̇ ≥ rhsC (and the
            // equality system when present), via the external collaborator.
            qp.set_num_variables(nr);
            qp.set_objective_matrix(&self.Mtilde);
            qp.set_objective_vector(&(-&self.ftilde));
            qp.set_num_inequalities(n_active);
            qp.set_inequality_matrix(&self.C);
            qp.set_inequality_vector(&self.rhsC);
            qp.set_num_equalities(ne);
            if ne > 0 {
                qp.set_equality_matrix(&self.G);
                qp.set_equality_vector(&self.rhsG);
            }
            if !qp.solve() {
                return Err(SolverError::QpFailed);
            }
            self.qdot1 = qp.primal_solution().clone();
        }

        if self.qdot1.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite);
        }

        // Integrate and scatter.
        let qddot = (&self.qdot1 - &qdot0) / h;
        let q1 = &q0 + h * &self.qdot1;

        let mut yk = DVector::zeros(2 * nr);
        yk.rows_mut(0, nr).copy_from(&q1);
        yk.rows_mut(nr, nr).copy_from(&self.qdot1);
        let mut ydotk = DVector::zeros(2 * nr);
        ydotk.rows_mut(0, nr).copy_from(&self.qdot1);
        ydotk.rows_mut(nr, nr).copy_from(&qddot);

        world.scatter_dofs(&yk);
        world.scatter_ddofs(&ydotk);
        world.time += h;
        world.compute_energy();
        Ok(())
    }

    /// Run the world's full time span, collecting the trajectory.
    pub fn simulate(
        &mut self,
        world: &mut World,
        qp: &mut dyn QpSolver,
    ) -> Result<Trajectory, SolverError> {
        let nsteps = world.num_steps();
        let mut trajectory = Trajectory {
            t: Vec::with_capacity(nsteps + 1),
            y: Vec::with_capacity(nsteps + 1),
        };
        trajectory.t.push(world.time);
        trajectory.y.push(world.gather_dofs());
        for _ in 0..nsteps {
            self.step(world, qp)?;
            trajectory.t.push(world.time);
            trajectory.y.push(world.gather_dofs());
        }
        Ok(trajectory)
    }
}
