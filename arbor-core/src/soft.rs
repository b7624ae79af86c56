//! Soft-body (FEM) collaborator boundary.
//!
//! The engine treats soft bodies as a black box: an implementation owns
//! its own discretization and material model and exposes only DOF
//! bookkeeping, mass/force/stiffness/Jacobian contributions in the shared
//! maximal/reduced coordinates, and the attachment records the
//! soft-body-attachment constraint consumes. Nothing in this crate
//! re-derives FEM internals.

use nalgebra::{DMatrix, DVector, Vector3};

use crate::world::Energy;

/// One node of a soft body welded to a rigid body.
#[derive(Debug, Clone, Copy)]
pub struct SoftAttachment {
    /// Maximal offset of the attached node's 3 coordinates.
    pub node_idx_m: usize,
    /// Rigid body the node is welded to.
    pub body: usize,
    /// Attachment point in the rigid body's frame.
    pub r: Vector3<f64>,
}

/// Contract consumed from an external FEM solver.
///
/// Implementations reserve their DOFs in [`SoftBody::count_dofs`] (3
/// maximal and 3 reduced coordinates per node, contiguous), then fill the
/// caller-sized aggregates at those offsets. The gather/scatter pair must
/// use identical offsets and ordering — the solver round-trips state
/// through the flat vector every step.
pub trait SoftBody: std::fmt::Debug {
    /// Reserve maximal and reduced slots; called once during world init.
    fn count_dofs(&mut self, nm: &mut usize, nr: &mut usize);

    /// Copy node positions/velocities into the flat state vector.
    fn gather_dofs(&self, y: &mut DVector<f64>, nr: usize);
    /// Copy node velocities/accelerations into the flat derivative vector.
    fn gather_ddofs(&self, ydot: &mut DVector<f64>, nr: usize);
    /// Read node positions/velocities back; implementations refresh any
    /// derived state here.
    fn scatter_dofs(&mut self, y: &DVector<f64>, nr: usize);
    /// Read node velocities/accelerations back.
    fn scatter_ddofs(&mut self, ydot: &DVector<f64>, nr: usize);

    /// Add lumped mass blocks into the maximal mass matrix.
    fn compute_mass(&self, gravity: &Vector3<f64>, m: &mut DMatrix<f64>);
    /// Add internal + gravity forces into the maximal force vector.
    fn compute_force(&self, gravity: &Vector3<f64>, f: &mut DVector<f64>);
    /// Add the force tangent into the maximal stiffness matrix (force
    /// tangent convention: the solver folds it in as `-h²K`).
    fn compute_stiffness(&self, k: &mut DMatrix<f64>);
    /// Fill this body's block of the reduced Jacobian (identity for plain
    /// nodal DOFs).
    fn compute_jacobian(&self, j: &mut DMatrix<f64>);

    /// Accumulate kinetic + potential energy.
    fn compute_energies(&self, gravity: &Vector3<f64>, energy: &mut Energy);

    /// Nodes welded to rigid bodies; one 3-row equality constraint block
    /// is generated per record.
    fn attachments(&self) -> &[SoftAttachment];
    /// World position and velocity of the attachment node `i` (index into
    /// [`SoftBody::attachments`]).
    fn attachment_state(&self, i: usize) -> (Vector3<f64>, Vector3<f64>);
}

/// Minimal lumped-node implementation used by tests and as a reference
/// for the DOF bookkeeping half of the contract. It has no elasticity —
/// free nodes just fall — which is exactly enough to exercise the
/// attachment constraint and gather/scatter paths.
#[derive(Debug, Clone, Default)]
pub struct LumpedNodes {
    /// Node world positions.
    pub x: Vec<Vector3<f64>>,
    /// Node world velocities.
    pub v: Vec<Vector3<f64>>,
    /// Node accelerations.
    pub a: Vec<Vector3<f64>>,
    /// Per-node mass.
    pub mass: f64,
    /// Maximal offset of node 0.
    pub idx_m: usize,
    /// Reduced offset of node 0.
    pub idx_r: usize,
    /// Welded nodes.
    pub welds: Vec<SoftAttachment>,
}

impl LumpedNodes {
    /// Create from initial node positions; welds are appended afterwards
    /// with node indices local to this body.
    #[must_use]
    pub fn new(x: Vec<Vector3<f64>>, mass: f64) -> Self {
        let n = x.len();
        Self {
            x,
            v: vec![Vector3::zeros(); n],
            a: vec![Vector3::zeros(); n],
            mass,
            idx_m: 0,
            idx_r: 0,
            welds: Vec::new(),
        }
    }

    /// Weld local node `node` to `body` at body-frame point `r`. The
    /// maximal offset in the record is resolved during `count_dofs`.
    pub fn weld(&mut self, node: usize, body: usize, r: Vector3<f64>) {
        self.welds.push(SoftAttachment {
            node_idx_m: node,
            body,
            r,
        });
    }
}

impl SoftBody for LumpedNodes {
    fn count_dofs(&mut self, nm: &mut usize, nr: &mut usize) {
        self.idx_m = *nm;
        self.idx_r = *nr;
        *nm += 3 * self.x.len();
        *nr += 3 * self.x.len();
        // Resolve weld records from local node indices to maximal offsets.
        for weld in &mut self.welds {
            weld.node_idx_m = self.idx_m + 3 * weld.node_idx_m;
        }
    }

    fn gather_dofs(&self, y: &mut DVector<f64>, nr: usize) {
        for (i, (x, v)) in self.x.iter().zip(&self.v).enumerate() {
            for c in 0..3 {
                y[self.idx_r + 3 * i + c] = x[c];
                y[nr + self.idx_r + 3 * i + c] = v[c];
            }
        }
    }

    fn gather_ddofs(&self, ydot: &mut DVector<f64>, nr: usize) {
        for (i, (v, a)) in self.v.iter().zip(&self.a).enumerate() {
            for c in 0..3 {
                ydot[self.idx_r + 3 * i + c] = v[c];
                ydot[nr + self.idx_r + 3 * i + c] = a[c];
            }
        }
    }

    fn scatter_dofs(&mut self, y: &DVector<f64>, nr: usize) {
        for (i, (x, v)) in self.x.iter_mut().zip(&mut self.v).enumerate() {
            for c in 0..3 {
                x[c] = y[self.idx_r + 3 * i + c];
                v[c] = y[nr + self.idx_r + 3 * i + c];
            }
        }
    }

    fn scatter_ddofs(&mut self, ydot: &DVector<f64>, nr: usize) {
        for (i, (v, a)) in self.v.iter_mut().zip(&mut self.a).enumerate() {
            for c in 0..3 {
                v[c] = ydot[self.idx_r + 3 * i + c];
                a[c] = ydot[nr + self.idx_r + 3 * i + c];
            }
        }
    }

    fn compute_mass(&self, _gravity: &Vector3<f64>, m: &mut DMatrix<f64>) {
        for i in 0..3 * self.x.len() {
            m[(self.idx_m + i, self.idx_m + i)] += self.mass;
        }
    }

    fn compute_force(&self, gravity: &Vector3<f64>, f: &mut DVector<f64>) {
        for i in 0..self.x.len() {
            for c in 0..3 {
                f[self.idx_m + 3 * i + c] += self.mass * gravity[c];
            }
        }
    }

    fn compute_stiffness(&self, _k: &mut DMatrix<f64>) {
        // No elasticity.
    }

    fn compute_jacobian(&self, j: &mut DMatrix<f64>) {
        for i in 0..3 * self.x.len() {
            j[(self.idx_m + i, self.idx_r + i)] = 1.0;
        }
    }

    fn compute_energies(&self, gravity: &Vector3<f64>, energy: &mut Energy) {
        for (x, v) in self.x.iter().zip(&self.v) {
            energy.kinetic += 0.5 * self.mass * v.norm_squared();
            energy.potential -= self.mass * gravity.dot(x);
        }
    }

    fn attachments(&self) -> &[SoftAttachment] {
        &self.welds
    }

    fn attachment_state(&self, i: usize) -> (Vector3<f64>, Vector3<f64>) {
        let node = (self.welds[i].node_idx_m - self.idx_m) / 3;
        (self.x[node], self.v[node])
    }
}
