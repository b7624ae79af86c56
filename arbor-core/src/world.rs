//! The world: exclusive owner of every simulation entity.
//!
//! Bodies, joints, deformables, soft bodies, and constraints live in plain
//! `Vec`s; every cross-reference is a `usize` handle into them. Joints are
//! stored in topological order (a parent always precedes its children), so
//! every traversal is a forward or reverse index loop — there are no
//! intrusive links and no pointer chasing.
//!
//! [`World::init`] runs exactly once per topology: it validates the tree,
//! assigns contiguous reduced/maximal offsets in a single creation-order
//! pass (joints, then deformable nodes, then soft bodies), creates the
//! automatic attachment constraints, and performs the initial kinematic
//! update. The counters (`nr`, `nm`, `nem`, `ner`, `nim`, `nir`) are fixed
//! for the lifetime of the world afterwards.

use std::collections::HashMap;

use arbor_types::SimError;
use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Vector3};

use crate::body::Body;
use crate::constraint::Constraint;
use crate::deformable::{Deformable, PointSpring, SerialSpring, SpringNode};
use crate::joint::{Joint, JointKind, SplineCurve, SplineSurface};
use crate::se3::{self, SpatialVector};
use crate::soft::SoftBody;

/// Kinetic + potential energy of the assembly, recomputed per step for
/// diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Energy {
    /// Kinetic energy.
    pub kinetic: f64,
    /// Potential energy (gravitational + elastic).
    pub potential: f64,
}

impl Energy {
    /// Total mechanical energy.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.kinetic + self.potential
    }
}

/// Owner of all entities and global DOF bookkeeping.
#[derive(Debug)]
pub struct World {
    /// Rigid bodies, one per joint.
    pub bodies: Vec<Body>,
    /// Joints in topological order.
    pub joints: Vec<Joint>,
    /// Springs.
    pub deformables: Vec<Deformable>,
    /// Soft bodies (external FEM collaborators).
    pub soft_bodies: Vec<Box<dyn SoftBody>>,
    /// Constraints, including the automatic attachment constraints.
    pub constraints: Vec<Constraint>,

    /// Gravity vector.
    pub gravity: Vector3<f64>,
    /// Step size (seconds).
    pub h: f64,
    /// Simulated time span.
    pub tspan: [f64; 2],
    /// Current simulation time.
    pub time: f64,

    /// Total reduced coordinates.
    pub nr: usize,
    /// Total maximal coordinates.
    pub nm: usize,
    /// Equality rows in maximal coordinates.
    pub nem: usize,
    /// Equality rows in reduced coordinates.
    pub ner: usize,
    /// Inequality rows in maximal coordinates.
    pub nim: usize,
    /// Inequality rows in reduced coordinates.
    pub nir: usize,

    /// Equality stabilization gain.
    pub stabilization_eq: f64,
    /// Inequality stabilization gain.
    pub stabilization_ineq: f64,
    /// Inequality activation tolerance.
    pub limit_tolerance: f64,

    /// Last computed energy.
    pub energy: Energy,

    body_names: HashMap<String, usize>,
    joint_names: HashMap<String, usize>,
    initialized: bool,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new(gravity: Vector3<f64>, h: f64, tspan: [f64; 2]) -> Self {
        Self {
            bodies: Vec::new(),
            joints: Vec::new(),
            deformables: Vec::new(),
            soft_bodies: Vec::new(),
            constraints: Vec::new(),
            gravity,
            h,
            tspan,
            time: tspan[0],
            nr: 0,
            nm: 0,
            nem: 0,
            ner: 0,
            nim: 0,
            nir: 0,
            stabilization_eq: 100.0,
            stabilization_ineq: 5.0,
            limit_tolerance: 0.0,
            energy: Energy::default(),
            body_names: HashMap::new(),
            joint_names: HashMap::new(),
            initialized: false,
        }
    }

    /// Whether [`World::init`] has run.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of integration steps covering the time span.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn num_steps(&self) -> usize {
        ((self.tspan[1] - self.tspan[0]) / self.h).round() as usize
    }

    // ==================== Factories ====================

    /// Add a cuboid body placed at `e_ji` relative to its (future) joint.
    pub fn add_body(
        &mut self,
        name: impl Into<String>,
        density: f64,
        sides: Vector3<f64>,
        e_ji: Matrix4<f64>,
    ) -> Result<usize, SimError> {
        let name = name.into();
        if !(density.is_finite() && density > 0.0) {
            return Err(SimError::invalid_mass(format!(
                "body {name}: density {density} must be positive"
            )));
        }
        if sides.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(SimError::invalid_mass(format!(
                "body {name}: sides must be positive"
            )));
        }
        let mut body = Body::new(name.clone(), density, sides);
        body.e_ji = e_ji;
        body.compute_inertia();
        let handle = self.bodies.len();
        self.bodies.push(body);
        self.body_names.insert(name, handle);
        Ok(handle)
    }

    fn add_joint(
        &mut self,
        name: String,
        kind: JointKind,
        body: usize,
        e_pj0: Matrix4<f64>,
        parent: Option<usize>,
    ) -> Result<usize, SimError> {
        if body >= self.bodies.len() {
            return Err(SimError::InvalidBody(body));
        }
        let handle = self.joints.len();
        if let Some(p) = parent {
            if p >= handle {
                return Err(SimError::NotTopological { joint: handle, parent: p });
            }
        }
        let mut joint = Joint::new(name.clone(), kind, body, parent);
        joint.e_pj0 = e_pj0;
        self.joints.push(joint);
        self.joint_names.insert(name, handle);
        Ok(handle)
    }

    /// Add a revolute joint about `axis` (normalized here).
    pub fn add_joint_revolute(
        &mut self,
        name: impl Into<String>,
        body: usize,
        axis: Vector3<f64>,
        e_pj0: Matrix4<f64>,
        q0: f64,
        parent: Option<usize>,
    ) -> Result<usize, SimError> {
        let name = name.into();
        let norm = axis.norm();
        if norm < 1.0e-12 {
            return Err(SimError::ZeroAxis { joint_name: name });
        }
        let handle = self.add_joint(
            name,
            JointKind::Revolute { axis: axis / norm },
            body,
            e_pj0,
            parent,
        )?;
        self.joints[handle].q[0] = q0;
        Ok(handle)
    }

    /// Add a fixed (0 DOF) joint.
    pub fn add_joint_fixed(
        &mut self,
        name: impl Into<String>,
        body: usize,
        e_pj0: Matrix4<f64>,
        parent: Option<usize>,
    ) -> Result<usize, SimError> {
        self.add_joint(name.into(), JointKind::Fixed, body, e_pj0, parent)
    }

    /// Add a spline-curve joint riding the given control frames.
    pub fn add_joint_spline_curve(
        &mut self,
        name: impl Into<String>,
        body: usize,
        frames: Vec<Matrix4<f64>>,
        e_pj0: Matrix4<f64>,
        parent: Option<usize>,
    ) -> Result<usize, SimError> {
        let name = name.into();
        let curve = SplineCurve::new(&name, frames)?;
        self.add_joint(name, JointKind::SplineCurve(curve), body, e_pj0, parent)
    }

    /// Add a spline-surface joint over a 4×4 patch of control twists.
    pub fn add_joint_spline_surface(
        &mut self,
        name: impl Into<String>,
        body: usize,
        grid: [[SpatialVector; 4]; 4],
        e_pj0: Matrix4<f64>,
        parent: Option<usize>,
    ) -> Result<usize, SimError> {
        self.add_joint(
            name.into(),
            JointKind::SplineSurface(SplineSurface::new(grid)),
            body,
            e_pj0,
            parent,
        )
    }

    /// Add a point-to-point spring-damper. `None` body anchors that end to
    /// the world (its `r` is then a world point).
    pub fn add_point_spring(
        &mut self,
        body0: Option<usize>,
        r0: Vector3<f64>,
        body1: Option<usize>,
        r1: Vector3<f64>,
        stiffness: f64,
        damping: f64,
    ) -> usize {
        self.deformables.push(Deformable::PointSpring(PointSpring {
            body0,
            body1,
            r0,
            r1,
            stiffness,
            damping,
            rest_length: 0.0,
            length: 0.0,
        }));
        self.deformables.len() - 1
    }

    /// Add a serial spring of `n_nodes` point masses between two
    /// attachment points. The attachment equality constraint is created
    /// during init.
    #[allow(clippy::too_many_arguments)]
    pub fn add_serial_spring(
        &mut self,
        mass: f64,
        n_nodes: usize,
        body0: Option<usize>,
        r0: Vector3<f64>,
        body1: Option<usize>,
        r1: Vector3<f64>,
        stiffness: f64,
        damping: f64,
    ) -> usize {
        let nodes = (0..n_nodes.max(2))
            .map(|_| SpringNode {
                x: Vector3::zeros(),
                v: Vector3::zeros(),
                a: Vector3::zeros(),
                mass: 0.0,
                idx_m: 0,
                idx_r: 0,
            })
            .collect();
        self.deformables.push(Deformable::SerialSpring(SerialSpring {
            body0,
            body1,
            r0,
            r1,
            nodes,
            stiffness,
            damping,
            rest_length: 0.0,
            mass,
        }));
        self.deformables.len() - 1
    }

    /// Add an external soft body. Its attachment constraint is created
    /// during init.
    pub fn add_soft_body(&mut self, soft: Box<dyn SoftBody>) -> usize {
        self.soft_bodies.push(soft);
        self.soft_bodies.len() - 1
    }

    /// Add a loop-closure constraint between body-frame points.
    pub fn add_constraint_loop(
        &mut self,
        body_a: usize,
        body_b: usize,
        ra: Vector3<f64>,
        rb: Vector3<f64>,
    ) -> usize {
        self.constraints.push(Constraint::Loop {
            body_a,
            body_b,
            ra,
            rb,
            idx_em: 0,
        });
        self.constraints.len() - 1
    }

    /// Add a joint-limit constraint on a revolute joint.
    pub fn add_constraint_joint_limit(&mut self, joint: usize, lower: f64, upper: f64) -> usize {
        self.constraints.push(Constraint::JointLimit {
            joint,
            lower,
            upper,
            idx_ir: 0,
        });
        self.constraints.len() - 1
    }

    /// Look up a body handle by name.
    #[must_use]
    pub fn body(&self, name: &str) -> Option<usize> {
        self.body_names.get(name).copied()
    }

    /// Look up a joint handle by name.
    #[must_use]
    pub fn joint(&self, name: &str) -> Option<usize> {
        self.joint_names.get(name).copied()
    }

    // ==================== Init ====================

    /// Validate the topology, assign DOF indices, create automatic
    /// attachment constraints, and run the initial kinematic update.
    pub fn init(&mut self) -> Result<(), SimError> {
        // Topology checks: valid handles, topological order, unique body
        // ownership.
        let mut owner = vec![usize::MAX; self.bodies.len()];
        for (i, joint) in self.joints.iter().enumerate() {
            if joint.body >= self.bodies.len() {
                return Err(SimError::InvalidBody(joint.body));
            }
            if let Some(p) = joint.parent {
                if p >= i {
                    return Err(SimError::NotTopological { joint: i, parent: p });
                }
            }
            if owner[joint.body] != usize::MAX {
                return Err(SimError::BodyOwnedTwice {
                    body: joint.body,
                    first: owner[joint.body],
                    second: i,
                });
            }
            owner[joint.body] = i;
        }

        // Contiguous index assignment in creation order: joints (with
        // their bodies' 6 maximal slots), then deformable nodes, then
        // soft bodies.
        self.nr = 0;
        self.nm = 0;
        for i in 0..self.joints.len() {
            self.joints[i].children.clear();
            self.joints[i].idx_r = self.nr;
            self.nr += self.joints[i].ndof;
            let bidx = self.joints[i].body;
            let body = &mut self.bodies[bidx];
            body.count_dofs(&mut self.nm);
            body.joint = i;
            body.ad_ij = se3::adjoint(&se3::inverse(&body.e_ji));
            if let Some(p) = self.joints[i].parent {
                self.joints[p].children.push(i);
            }
        }

        // Kinematics must be current before springs are laid out.
        self.update();

        let mut deformables = std::mem::take(&mut self.deformables);
        for (d, deformable) in deformables.iter_mut().enumerate() {
            match deformable {
                Deformable::PointSpring(spring) => {
                    if spring.rest_length == 0.0 {
                        let x0 = match spring.body0 {
                            Some(b) => self.bodies[b].point_world(&spring.r0),
                            None => spring.r0,
                        };
                        let x1 = match spring.body1 {
                            Some(b) => self.bodies[b].point_world(&spring.r1),
                            None => spring.r1,
                        };
                        spring.rest_length = (x1 - x0).norm();
                        if spring.rest_length == 0.0 {
                            tracing::warn!(
                                "point spring {d} with coincident endpoints; rest length forced to 1"
                            );
                            spring.rest_length = 1.0;
                        }
                    }
                }
                Deformable::SerialSpring(spring) => {
                    spring.count_dofs(&mut self.nm, &mut self.nr);
                    spring.init(&self.bodies);
                    self.constraints.push(Constraint::AttachSpring {
                        deformable: d,
                        idx_em: 0,
                    });
                }
            }
        }
        self.deformables = deformables;

        for s in 0..self.soft_bodies.len() {
            self.soft_bodies[s].count_dofs(&mut self.nm, &mut self.nr);
            self.constraints.push(Constraint::AttachSoftBody {
                soft: s,
                idx_em: 0,
            });
        }

        // Constraint row offsets in a single pass.
        self.nem = 0;
        self.ner = 0;
        self.nim = 0;
        self.nir = 0;
        let mut constraints = std::mem::take(&mut self.constraints);
        for con in &mut constraints {
            con.assign_rows(
                &self.soft_bodies,
                &mut self.nem,
                &mut self.ner,
                &mut self.nim,
                &mut self.nir,
            );
        }
        self.constraints = constraints;

        self.initialized = true;
        Ok(())
    }

    // ==================== Kinematics ====================

    /// Root-first forward kinematics: refresh every joint's local
    /// transform and twist, and every body's world pose, adjoints, and
    /// twist. Order matters — each joint composes onto its already-updated
    /// parent.
    pub fn update(&mut self) {
        for i in 0..self.joints.len() {
            let (e_wp, v_parent) = match self.joints[i].parent {
                Some(p) => (self.joints[p].e_wj, self.joints[p].v),
                None => (Matrix4::identity(), SpatialVector::zeros()),
            };
            let joint = &mut self.joints[i];
            joint.update_self();
            joint.compose(&e_wp, &v_parent);
            let body = joint.body;
            let e_wj = joint.e_wj;
            let v = joint.v;
            self.bodies[body].update(&e_wj, &v);

            // Adjoint from the parent body's frame (world at a root).
            let e_ip = match self.joints[i].parent {
                Some(p) => {
                    let pb = self.joints[p].body;
                    self.bodies[body].e_iw * self.bodies[pb].e_wi
                }
                None => self.bodies[body].e_iw,
            };
            self.bodies[body].ad_ip = se3::adjoint(&e_ip);
        }
    }

    /// Fill the reduced Jacobian and its time derivative (`nm × nr`,
    /// pre-sized and zeroed by the caller).
    ///
    /// Each joint writes its own `Ad_ij·S` block, then walks its strict
    /// ancestors copying the parent body's already-placed columns through
    /// the body-to-body adjoint — moving any ancestor joint moves this
    /// body. The `Jdot` cross-blocks pick up the adjoint derivative
    /// `Ȧd_ip = -Ad_iw(Ȧd_wi·Ad_iw·Ad_wp - Ȧd_wp)`.
    pub fn compute_jacobian(&self, j: &mut DMatrix<f64>, jdot: &mut DMatrix<f64>) {
        for ji in 0..self.joints.len() {
            let joint = &self.joints[ji];
            let body = &self.bodies[joint.body];
            if joint.ndof > 0 {
                let own = body.ad_ij * &joint.s;
                let own_dot = body.ad_ij * &joint.sdot;
                j.view_mut((body.idx_m, joint.idx_r), (6, joint.ndof))
                    .copy_from(&own);
                jdot.view_mut((body.idx_m, joint.idx_r), (6, joint.ndof))
                    .copy_from(&own_dot);
            }

            let Some(parent) = joint.parent else { continue };
            let pbody = &self.bodies[self.joints[parent].body];
            let ad_ip = body.ad_ip;
            let addot_ip =
                -body.ad_iw * (body.addot_wi * body.ad_iw * pbody.ad_wi - pbody.addot_wi);

            let mut ancestor = Some(parent);
            while let Some(a) = ancestor {
                let aj = &self.joints[a];
                if aj.ndof > 0 {
                    let jp = j
                        .view((pbody.idx_m, aj.idx_r), (6, aj.ndof))
                        .into_owned();
                    let jdotp = jdot
                        .view((pbody.idx_m, aj.idx_r), (6, aj.ndof))
                        .into_owned();
                    j.view_mut((body.idx_m, aj.idx_r), (6, aj.ndof))
                        .copy_from(&(ad_ip * &jp));
                    jdot.view_mut((body.idx_m, aj.idx_r), (6, aj.ndof))
                        .copy_from(&(ad_ip * jdotp + addot_ip * jp));
                }
                ancestor = aj.parent;
            }
        }

        for deformable in &self.deformables {
            if let Deformable::SerialSpring(spring) = deformable {
                spring.compute_jacobian(j, jdot);
            }
        }
        for soft in &self.soft_bodies {
            soft.compute_jacobian(j);
        }
    }

    /// O(n) transpose-Jacobian product `x = Jᵀy` without forming `J`.
    ///
    /// Joints are visited tip-to-root (reverse topological order),
    /// accumulating each child's contribution before applying the joint's
    /// own adjoint and motion subspace; deformable and soft-body blocks
    /// are identity and copy straight through.
    #[must_use]
    pub fn jacobian_transpose_product(&self, y: &DVector<f64>) -> DVector<f64> {
        let mut x = DVector::zeros(self.nr);
        let mut alpha = vec![SpatialVector::zeros(); self.joints.len()];

        for i in (0..self.joints.len()).rev() {
            let joint = &self.joints[i];
            let body = &self.bodies[joint.body];
            let mut yi: SpatialVector = y.fixed_rows::<6>(body.idx_m).into_owned();
            for &c in &joint.children {
                yi += alpha[c];
            }
            alpha[i] = body.ad_ip.transpose() * yi;
            if joint.ndof > 0 {
                let block = (body.ad_ij * &joint.s).transpose() * yi;
                x.rows_mut(joint.idx_r, joint.ndof).copy_from(&block);
            }
        }

        for deformable in &self.deformables {
            if let Deformable::SerialSpring(spring) = deformable {
                for node in &spring.nodes {
                    for c in 0..3 {
                        x[node.idx_r + c] = y[node.idx_m + c];
                    }
                }
            }
        }
        // Soft-body blocks are identity as well; route through the dense
        // Jacobian contract to stay agnostic of their internal layout.
        if !self.soft_bodies.is_empty() {
            let mut j = DMatrix::zeros(self.nm, self.nr);
            for soft in &self.soft_bodies {
                soft.compute_jacobian(&mut j);
            }
            x += j.transpose() * y;
        }
        x
    }

    // ==================== Force assembly ====================

    /// Accumulate joint stiffness forces `τ - Kr·q` and the diagonal
    /// stiffness blocks (force-tangent convention). Prescribed joints are
    /// externally driven and contribute nothing.
    pub fn compute_force_stiffness(&self, fr: &mut DVector<f64>, kr: &mut DMatrix<f64>) {
        for joint in &self.joints {
            if joint.prescribed {
                continue;
            }
            for d in 0..joint.ndof {
                let row = joint.idx_r + d;
                fr[row] += joint.tau[d] - joint.stiffness * joint.q[d];
                kr[(row, row)] -= joint.stiffness;
            }
        }
    }

    /// Accumulate joint damping forces `-Dr·q̇` and the diagonal damping
    /// blocks (`f = -D·q̇` convention).
    pub fn compute_force_damping(&self, fr: &mut DVector<f64>, dr: &mut DMatrix<f64>) {
        for joint in &self.joints {
            if joint.prescribed {
                continue;
            }
            for d in 0..joint.ndof {
                let row = joint.idx_r + d;
                fr[row] -= joint.damping * joint.qdot[d];
                dr[(row, row)] += joint.damping;
            }
        }
    }

    // ==================== Gather / scatter ====================

    /// Gather `[q; q̇]` into a fresh state vector of length `2·nr`.
    #[must_use]
    pub fn gather_dofs(&self) -> DVector<f64> {
        let mut y = DVector::zeros(2 * self.nr);
        for joint in &self.joints {
            for d in 0..joint.ndof {
                y[joint.idx_r + d] = joint.q[d];
                y[self.nr + joint.idx_r + d] = joint.qdot[d];
            }
        }
        for deformable in &self.deformables {
            if let Deformable::SerialSpring(spring) = deformable {
                spring.gather_dofs(&mut y, self.nr);
            }
        }
        for soft in &self.soft_bodies {
            soft.gather_dofs(&mut y, self.nr);
        }
        y
    }

    /// Gather `[q̇; q̈]` into a fresh derivative vector of length `2·nr`.
    #[must_use]
    pub fn gather_ddofs(&self) -> DVector<f64> {
        let mut ydot = DVector::zeros(2 * self.nr);
        for joint in &self.joints {
            for d in 0..joint.ndof {
                ydot[joint.idx_r + d] = joint.qdot[d];
                ydot[self.nr + joint.idx_r + d] = joint.qddot[d];
            }
        }
        for deformable in &self.deformables {
            if let Deformable::SerialSpring(spring) = deformable {
                spring.gather_ddofs(&mut ydot, self.nr);
            }
        }
        for soft in &self.soft_bodies {
            soft.gather_ddofs(&mut ydot, self.nr);
        }
        ydot
    }

    /// Scatter `[q; q̇]` from a state vector without refreshing
    /// kinematics. Used to batch several scatters before one update.
    pub fn scatter_dofs_no_update(&mut self, y: &DVector<f64>) {
        let nr = self.nr;
        for joint in &mut self.joints {
            for d in 0..joint.ndof {
                joint.q[d] = y[joint.idx_r + d];
                joint.qdot[d] = y[nr + joint.idx_r + d];
            }
        }
        for deformable in &mut self.deformables {
            if let Deformable::SerialSpring(spring) = deformable {
                spring.scatter_dofs(y, nr);
            }
        }
        for soft in &mut self.soft_bodies {
            soft.scatter_dofs(y, nr);
        }
    }

    /// Scatter `[q; q̇]` and refresh kinematics.
    pub fn scatter_dofs(&mut self, y: &DVector<f64>) {
        self.scatter_dofs_no_update(y);
        self.update();
    }

    /// Scatter `[q̇; q̈]` from a derivative vector.
    pub fn scatter_ddofs(&mut self, ydot: &DVector<f64>) {
        let nr = self.nr;
        for joint in &mut self.joints {
            for d in 0..joint.ndof {
                joint.qdot[d] = ydot[joint.idx_r + d];
                joint.qddot[d] = ydot[nr + joint.idx_r + d];
            }
        }
        for deformable in &mut self.deformables {
            if let Deformable::SerialSpring(spring) = deformable {
                spring.scatter_ddofs(ydot, nr);
            }
        }
        for soft in &mut self.soft_bodies {
            soft.scatter_ddofs(ydot, nr);
        }
    }

    /// Scatter reduced constraint torques onto the joints (diagnostic).
    pub fn scatter_tau_con(&mut self, tau: &DVector<f64>) {
        for joint in &mut self.joints {
            for d in 0..joint.ndof {
                joint.tau_con[d] = tau[joint.idx_r + d];
            }
        }
    }

    /// Scatter maximal constraint wrenches onto the bodies (diagnostic).
    pub fn scatter_force_eq_m(&mut self, wrench: &DVector<f64>) {
        for body in &mut self.bodies {
            body.wrench_con = wrench.fixed_rows::<6>(body.idx_m).into_owned();
        }
    }

    // ==================== Energy ====================

    /// Recompute kinetic + potential energy of the whole assembly.
    pub fn compute_energy(&mut self) -> Energy {
        let mut energy = Energy::default();
        for joint in &self.joints {
            self.bodies[joint.body].compute_energies(&self.gravity, &mut energy);
            energy.potential += 0.5 * joint.stiffness * joint.q.dot(&joint.q);
        }
        for deformable in &self.deformables {
            match deformable {
                Deformable::PointSpring(spring) => {
                    spring.compute_energies(&self.bodies, &mut energy);
                }
                Deformable::SerialSpring(spring) => {
                    spring.compute_energies(&self.gravity, &mut energy);
                }
            }
        }
        for soft in &self.soft_bodies {
            soft.compute_energies(&self.gravity, &mut energy);
        }
        self.energy = energy;
        energy
    }
}

/// Shorthand for a transform from a rotation and translation, used by the
/// scene builders.
#[must_use]
pub fn frame(r: Matrix3<f64>, p: Vector3<f64>) -> Matrix4<f64> {
    se3::rp_to_e(&r, &p)
}
