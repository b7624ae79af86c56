//! Springs between bodies: a point-to-point spring-damper and a serial
//! node-chain spring.
//!
//! Both contribute force, stiffness, and damping in maximal coordinates;
//! the serial chain additionally owns reduced DOFs (3 per node, identity
//! Jacobian) and is tied to its bodies by an equality constraint that the
//! world creates at init.
//!
//! The force law is a two-point elastic law linearized for implicit
//! integration: the returned stiffness is the (symmetrized) consistent
//! tangent of the force at the current state, and the returned damping
//! matrix follows the `f = -D·v` convention, so the solver folds them in
//! as `-h²K` and `+hD` respectively.

use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, SMatrix, SVector, Vector3};

use crate::body::Body;
use crate::se3::{self, SpatialVector};
use crate::world::Energy;

/// Stacked two-body quantity: `[body0 (6), body1 (6)]`.
pub type Vector12 = SVector<f64, 12>;
/// Stacked two-body block matrix.
pub type Matrix12 = SMatrix<f64, 12, 12>;

/// Closed set of deformable attachments.
#[derive(Debug, Clone)]
pub enum Deformable {
    /// Massless point-to-point spring-damper acting directly on two bodies.
    PointSpring(PointSpring),
    /// Chain of point masses between two attachment points.
    SerialSpring(SerialSpring),
}

/// A point-to-point spring-damper between two bodies (either end may be
/// anchored to the world instead).
#[derive(Debug, Clone)]
pub struct PointSpring {
    /// First body handle, or `None` for a world anchor.
    pub body0: Option<usize>,
    /// Second body handle, or `None` for a world anchor.
    pub body1: Option<usize>,
    /// Attachment point in body0's frame (world frame if anchored).
    pub r0: Vector3<f64>,
    /// Attachment point in body1's frame (world frame if anchored).
    pub r1: Vector3<f64>,
    /// Stiffness `K`; scalar force `K·(l-L)/L` along the spring.
    pub stiffness: f64,
    /// Viscous damping on the lengthening rate.
    pub damping: f64,
    /// Rest length `L`. Zero at build time means "use the initial length",
    /// resolved during world init.
    pub rest_length: f64,
    /// Current length (updated by every force evaluation).
    pub length: f64,
}

/// One point mass of a serial spring chain.
#[derive(Debug, Clone)]
pub struct SpringNode {
    /// World position.
    pub x: Vector3<f64>,
    /// World velocity.
    pub v: Vector3<f64>,
    /// World acceleration (from the integrator; diagnostic).
    pub a: Vector3<f64>,
    /// Lumped mass.
    pub mass: f64,
    /// Offset in the maximal vector (3 slots).
    pub idx_m: usize,
    /// Offset in the reduced vector (3 slots).
    pub idx_r: usize,
}

/// A serial chain of `n` point masses whose end nodes are constrained to
/// attachment points on two bodies.
#[derive(Debug, Clone)]
pub struct SerialSpring {
    /// First body handle, or `None` for a world anchor.
    pub body0: Option<usize>,
    /// Second body handle, or `None` for a world anchor.
    pub body1: Option<usize>,
    /// Attachment point in body0's frame (world frame if anchored).
    pub r0: Vector3<f64>,
    /// Attachment point in body1's frame (world frame if anchored).
    pub r1: Vector3<f64>,
    /// Chain nodes, end to end.
    pub nodes: Vec<SpringNode>,
    /// Stiffness of the whole chain.
    pub stiffness: f64,
    /// Per-segment damping.
    pub damping: f64,
    /// Total rest length; zero means "use the initial length".
    pub rest_length: f64,
    /// Total chain mass, lumped uniformly onto the nodes.
    pub mass: f64,
}

/// Scalar spring force: `fs = K·(l-L)/L + c·l̇`. Positive is tension.
fn scalar_force(stiffness: f64, damping: f64, l: f64, rest: f64, ldot: f64) -> f64 {
    stiffness * (l - rest) / rest + damping * ldot
}

impl PointSpring {
    /// Evaluate force, consistent tangent stiffness, and damping matrix in
    /// the two bodies' stacked maximal coordinates.
    ///
    /// Let `fn = ∂l/∂E` (the 12-dim length gradient over both body
    /// twists). The force is `f = -fs·fn` with `fs` the scalar tension;
    /// the stiffness is `K = -sym(fn·(∂fs/∂E)ᵀ + fs·∂fn/∂E)` where
    /// `∂fn/∂E` splits into the rank-one term `-fn·fnᵀ/l` and a geometric
    /// curvature block matrix; the damping matrix is the rank-one
    /// `c·fn·fnᵀ`.
    #[must_use]
    pub fn compute_fkd(
        &self,
        e0: &Matrix4<f64>,
        e1: &Matrix4<f64>,
        phi0: &SpatialVector,
        phi1: &SpatialVector,
    ) -> (Vector12, Matrix12, Matrix12, f64) {
        let x0 = se3::transform_point(e0, &self.r0);
        let x1 = se3::transform_point(e1, &self.r1);
        let dx = x1 - x0;
        let l = dx.norm();

        let r0mat = se3::rotation(e0);
        let r1mat = se3::rotation(e1);
        let g0 = se3::gamma(&self.r0);
        let g1 = se3::gamma(&self.r1);

        // Lengthening rate from the two attachment-point velocities.
        let v0 = r0mat * (g0 * phi0);
        let v1 = r1mat * (g1 * phi1);
        let dir = dx / l;
        let ldot = dir.dot(&(v1 - v0));

        // Length gradient fn = ∂l/∂E over [φ0, φ1].
        let fn0 = -(g0.transpose() * (r0mat.transpose() * dir));
        let fn1 = g1.transpose() * (r1mat.transpose() * dir);
        let mut fgrad = Vector12::zeros();
        fgrad.fixed_rows_mut::<6>(0).copy_from(&fn0);
        fgrad.fixed_rows_mut::<6>(6).copy_from(&fn1);

        let fs = scalar_force(self.stiffness, self.damping, l, self.rest_length, ldot);
        let force = -fs * fgrad;

        // Geometric curvature: (1/l)·∂fx/∂E with fx = l·fn, i.e. the
        // wrench pattern [r×u, u] for u0 = R0ᵀ(x0-x1), u1 = R1ᵀ(x1-x0).
        let p0 = se3::translation(e0);
        let p1 = se3::translation(e1);
        let r0b = se3::bracket3(&self.r0);
        let r1b = se3::bracket3(&self.r1);
        let rel10 = r1mat.transpose() * r0mat;
        let rel01 = rel10.transpose();

        let du0_w0 = se3::bracket3(&(r0mat.transpose() * (p0 - x1)));
        let du0_v0 = Matrix3::identity();
        let du0_w1 = rel01 * r1b;
        let du0_v1 = -rel01;
        let du1_w1 = se3::bracket3(&(r1mat.transpose() * (p1 - x0)));
        let du1_v1 = Matrix3::identity();
        let du1_w0 = rel10 * r0b;
        let du1_v0 = -rel10;

        let mut kn1 = Matrix12::zeros();
        let mut set = |row: usize, col: usize, m: &Matrix3<f64>| {
            kn1.fixed_view_mut::<3, 3>(row, col).copy_from(m);
        };
        // Linear rows carry ∂u; rotational rows are r̂·(linear rows).
        set(3, 0, &du0_w0);
        set(0, 0, &(r0b * du0_w0));
        set(3, 3, &du0_v0);
        set(0, 3, &(r0b * du0_v0));
        set(3, 6, &du0_w1);
        set(0, 6, &(r0b * du0_w1));
        set(3, 9, &du0_v1);
        set(0, 9, &(r0b * du0_v1));
        set(9, 0, &du1_w0);
        set(6, 0, &(r1b * du1_w0));
        set(9, 3, &du1_v0);
        set(6, 3, &(r1b * du1_v0));
        set(9, 6, &du1_w1);
        set(6, 6, &(r1b * du1_w1));
        set(9, 9, &du1_v1);
        set(6, 9, &(r1b * du1_v1));
        kn1 /= l;

        // ∂fn/∂E = -fn·fnᵀ/l + kn1.
        let kn = -(fgrad * fgrad.transpose()) / l + kn1;

        // Elastic scalar tangent: ∂fs/∂E = (K/L)·fn.
        let dfs = (self.stiffness / self.rest_length) * fgrad;
        let k_raw = fgrad * dfs.transpose() + fs * kn;
        let k = -0.5 * (k_raw + k_raw.transpose());

        // Damping matrix: l̇ = fnᵀ·[φ0, φ1], so D = c·fn·fnᵀ.
        let d = self.damping * (fgrad * fgrad.transpose());

        (force, k, d, l)
    }

    /// Resolve body transforms/twists, with identity/zero for world
    /// anchors.
    fn endpoint_state(
        &self,
        bodies: &[Body],
    ) -> (Matrix4<f64>, Matrix4<f64>, SpatialVector, SpatialVector) {
        let (e0, phi0) = match self.body0 {
            Some(b) => (bodies[b].e_wi, bodies[b].phi),
            None => (Matrix4::identity(), SpatialVector::zeros()),
        };
        let (e1, phi1) = match self.body1 {
            Some(b) => (bodies[b].e_wi, bodies[b].phi),
            None => (Matrix4::identity(), SpatialVector::zeros()),
        };
        (e0, e1, phi0, phi1)
    }

    /// Accumulate force and tangents into the maximal aggregates at the
    /// two bodies' blocks. World-anchored ends contribute nothing.
    pub fn accumulate(
        &mut self,
        bodies: &[Body],
        f: &mut DVector<f64>,
        k: &mut DMatrix<f64>,
        d: &mut DMatrix<f64>,
    ) {
        let (e0, e1, phi0, phi1) = self.endpoint_state(bodies);
        let (force, kmat, dmat, l) = self.compute_fkd(&e0, &e1, &phi0, &phi1);
        self.length = l;

        let idx = [
            self.body0.map(|b| bodies[b].idx_m),
            self.body1.map(|b| bodies[b].idx_m),
        ];
        for (a, ia) in idx.iter().enumerate() {
            let Some(row) = ia else { continue };
            for c in 0..6 {
                f[row + c] += force[6 * a + c];
            }
            for (b, ib) in idx.iter().enumerate() {
                let Some(col) = ib else { continue };
                for r in 0..6 {
                    for c in 0..6 {
                        k[(row + r, col + c)] += kmat[(6 * a + r, 6 * b + c)];
                        d[(row + r, col + c)] += dmat[(6 * a + r, 6 * b + c)];
                    }
                }
            }
        }
    }

    /// Elastic potential energy `½·K·(l-L)²/L`, consistent with the
    /// scalar force law.
    pub fn compute_energies(&self, bodies: &[Body], energy: &mut Energy) {
        let (e0, e1, _, _) = self.endpoint_state(bodies);
        let x0 = se3::transform_point(&e0, &self.r0);
        let x1 = se3::transform_point(&e1, &self.r1);
        let stretch = (x1 - x0).norm() - self.rest_length;
        energy.potential += 0.5 * self.stiffness * stretch * stretch / self.rest_length;
    }
}

impl SerialSpring {
    /// Per-segment rest length.
    fn segment_rest(&self) -> f64 {
        self.rest_length / (self.nodes.len() - 1) as f64
    }

    /// Reserve reduced and maximal slots for every node.
    pub fn count_dofs(&mut self, nm: &mut usize, nr: &mut usize) {
        for node in &mut self.nodes {
            node.idx_m = *nm;
            *nm += 3;
            node.idx_r = *nr;
            *nr += 3;
        }
    }

    /// World positions of the two attachment points.
    fn anchor_points(&self, bodies: &[Body]) -> (Vector3<f64>, Vector3<f64>) {
        let x0 = match self.body0 {
            Some(b) => bodies[b].point_world(&self.r0),
            None => self.r0,
        };
        let x1 = match self.body1 {
            Some(b) => bodies[b].point_world(&self.r1),
            None => self.r1,
        };
        (x0, x1)
    }

    /// Place nodes on the segment between the attachment points, lump the
    /// mass, and resolve a zero rest length to the initial length.
    /// Requires body kinematics to be current.
    pub fn init(&mut self, bodies: &[Body]) {
        let (x0, x1) = self.anchor_points(bodies);
        let n = self.nodes.len();
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let t = i as f64 / (n - 1) as f64;
            node.x = (1.0 - t) * x0 + t * x1;
            node.v = Vector3::zeros();
            node.a = Vector3::zeros();
            node.mass = self.mass / n as f64;
        }
        if self.rest_length == 0.0 {
            self.rest_length = (x1 - x0).norm();
            if self.rest_length == 0.0 {
                tracing::warn!("serial spring with coincident endpoints; rest length forced to 1");
                self.rest_length = 1.0;
            }
        }
    }

    /// Node mass blocks and gravity into the maximal aggregates.
    pub fn compute_mass(&self, gravity: &Vector3<f64>, m: &mut DMatrix<f64>, f: &mut DVector<f64>) {
        for node in &self.nodes {
            for k in 0..3 {
                m[(node.idx_m + k, node.idx_m + k)] += node.mass;
                f[node.idx_m + k] += node.mass * gravity[k];
            }
        }
    }

    /// Segment spring-damper forces and their 3×3 consistent tangent
    /// blocks, accumulated at the node blocks. Same sign conventions as
    /// [`PointSpring::compute_fkd`].
    pub fn compute_force_stiffness_damping(
        &self,
        f: &mut DVector<f64>,
        k: &mut DMatrix<f64>,
        d: &mut DMatrix<f64>,
    ) {
        let rest = self.segment_rest();
        for w in self.nodes.windows(2) {
            let (n0, n1) = (&w[0], &w[1]);
            let dx = n1.x - n0.x;
            let l = dx.norm();
            let dir = dx / l;
            let ldot = dir.dot(&(n1.v - n0.v));
            let fs = scalar_force(self.stiffness, self.damping, l, rest, ldot);

            // Tension pulls the nodes together.
            for c in 0..3 {
                f[n0.idx_m + c] += fs * dir[c];
                f[n1.idx_m + c] -= fs * dir[c];
            }

            // Force tangent of the two-point law:
            // ∂f0/∂x1 = (K/L)·ddᵀ + fs/l·(I - ddᵀ), ∂f0/∂x0 its negative.
            let ddt = dir * dir.transpose();
            let kb = (self.stiffness / rest) * ddt
                + (fs / l) * (Matrix3::identity() - ddt);
            // Damping matrix blocks (f = -D·v convention): +c·ddᵀ on the
            // diagonal, -c·ddᵀ on the coupling.
            let db = self.damping * ddt;

            let (i0, i1) = (n0.idx_m, n1.idx_m);
            for r in 0..3 {
                for c in 0..3 {
                    k[(i0 + r, i0 + c)] -= kb[(r, c)];
                    k[(i1 + r, i1 + c)] -= kb[(r, c)];
                    k[(i0 + r, i1 + c)] += kb[(r, c)];
                    k[(i1 + r, i0 + c)] += kb[(r, c)];

                    d[(i0 + r, i0 + c)] += db[(r, c)];
                    d[(i1 + r, i1 + c)] += db[(r, c)];
                    d[(i0 + r, i1 + c)] -= db[(r, c)];
                    d[(i1 + r, i0 + c)] -= db[(r, c)];
                }
            }
        }
    }

    /// Identity Jacobian blocks: node coordinates are their own reduced
    /// DOFs.
    pub fn compute_jacobian(&self, j: &mut DMatrix<f64>, _jdot: &mut DMatrix<f64>) {
        for node in &self.nodes {
            for c in 0..3 {
                j[(node.idx_m + c, node.idx_r + c)] = 1.0;
            }
        }
    }

    /// Copy node state into the flat state vector at fixed offsets.
    pub fn gather_dofs(&self, y: &mut DVector<f64>, nr: usize) {
        for node in &self.nodes {
            for c in 0..3 {
                y[node.idx_r + c] = node.x[c];
                y[nr + node.idx_r + c] = node.v[c];
            }
        }
    }

    /// Copy node rates into the flat derivative vector.
    pub fn gather_ddofs(&self, ydot: &mut DVector<f64>, nr: usize) {
        for node in &self.nodes {
            for c in 0..3 {
                ydot[node.idx_r + c] = node.v[c];
                ydot[nr + node.idx_r + c] = node.a[c];
            }
        }
    }

    /// Read node state back from the flat state vector.
    pub fn scatter_dofs(&mut self, y: &DVector<f64>, nr: usize) {
        for node in &mut self.nodes {
            for c in 0..3 {
                node.x[c] = y[node.idx_r + c];
                node.v[c] = y[nr + node.idx_r + c];
            }
        }
    }

    /// Read node rates back from the flat derivative vector.
    pub fn scatter_ddofs(&mut self, ydot: &DVector<f64>, nr: usize) {
        for node in &mut self.nodes {
            for c in 0..3 {
                node.v[c] = ydot[node.idx_r + c];
                node.a[c] = ydot[nr + node.idx_r + c];
            }
        }
    }

    /// Node kinetic + gravitational energy plus segment elastic energy.
    pub fn compute_energies(&self, gravity: &Vector3<f64>, energy: &mut Energy) {
        for node in &self.nodes {
            energy.kinetic += 0.5 * node.mass * node.v.norm_squared();
            energy.potential -= node.mass * gravity.dot(&node.x);
        }
        let rest = self.segment_rest();
        for w in self.nodes.windows(2) {
            let stretch = (w[1].x - w[0].x).norm() - rest;
            energy.potential += 0.5 * self.stiffness * stretch * stretch / rest;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_spring() -> PointSpring {
        PointSpring {
            body0: Some(0),
            body1: Some(1),
            r0: Vector3::new(0.5, 0.0, 0.2),
            r1: Vector3::new(-0.3, 0.4, 0.0),
            stiffness: 50.0,
            damping: 2.0,
            rest_length: 1.5,
            length: 0.0,
        }
    }

    fn sample_state() -> (Matrix4<f64>, Matrix4<f64>, SpatialVector, SpatialVector) {
        let e0 = se3::rp_to_e(
            &se3::aa_to_mat(&Vector3::new(0.1, 0.9, -0.2), 0.7),
            &Vector3::new(0.0, 0.0, 0.0),
        );
        let e1 = se3::rp_to_e(
            &se3::aa_to_mat(&Vector3::new(-0.4, 0.2, 1.0), -0.4),
            &Vector3::new(2.0, 0.5, -0.3),
        );
        let phi0 = SpatialVector::new(0.2, -0.1, 0.3, 0.5, 0.0, -0.2);
        let phi1 = SpatialVector::new(-0.3, 0.2, 0.1, 0.1, 0.4, 0.2);
        (e0, e1, phi0, phi1)
    }

    /// Perturb a transform by a body-frame twist.
    fn perturb(e: &Matrix4<f64>, delta: &SpatialVector) -> Matrix4<f64> {
        e * se3::exp(delta)
    }

    #[test]
    fn test_force_is_negative_length_gradient() {
        let spring = sample_spring();
        let (e0, e1, phi0, phi1) = sample_state();
        let (force, _, _, l) = spring.compute_fkd(&e0, &e1, &phi0, &phi1);

        // Finite-difference the elastic energy over body0's twist; with
        // zero velocities the force is -∂V/∂E.
        let zero = SpatialVector::zeros();
        let (f_static, _, _, _) = spring.compute_fkd(&e0, &e1, &zero, &zero);
        let eps = 1e-7;
        for k in 0..6 {
            let mut delta = SpatialVector::zeros();
            delta[k] = eps;
            let energy = |e0p: &Matrix4<f64>| {
                let x0 = se3::transform_point(e0p, &spring.r0);
                let x1 = se3::transform_point(&e1, &spring.r1);
                let s = (x1 - x0).norm() - spring.rest_length;
                0.5 * spring.stiffness * s * s / spring.rest_length
            };
            let fd = (energy(&perturb(&e0, &delta)) - energy(&perturb(&e0, &(-delta)))) / (2.0 * eps);
            assert_relative_eq!(f_static[k], -fd, epsilon = 1e-5);
        }
        assert!(l > 0.0);
        let _ = force;
    }

    #[test]
    fn test_stiffness_matches_symmetrized_force_jacobian() {
        let spring = sample_spring();
        let (e0, e1, _, _) = sample_state();
        let zero = SpatialVector::zeros();
        let (_, k, _, _) = spring.compute_fkd(&e0, &e1, &zero, &zero);

        let eps = 1e-6;
        let mut jac = Matrix12::zeros();
        for col in 0..12 {
            let mut delta = SpatialVector::zeros();
            delta[col % 6] = eps;
            let (e0p, e1p) = if col < 6 {
                (perturb(&e0, &delta), e1)
            } else {
                (e0, perturb(&e1, &delta))
            };
            let (e0m, e1m) = if col < 6 {
                (perturb(&e0, &(-delta)), e1)
            } else {
                (e0, perturb(&e1, &(-delta)))
            };
            let (fp, _, _, _) = spring.compute_fkd(&e0p, &e1p, &zero, &zero);
            let (fm, _, _, _) = spring.compute_fkd(&e0m, &e1m, &zero, &zero);
            let dcol = (fp - fm) / (2.0 * eps);
            jac.column_mut(col).copy_from(&dcol);
        }
        let sym = 0.5 * (jac + jac.transpose());
        for r in 0..12 {
            for c in 0..12 {
                assert_relative_eq!(k[(r, c)], sym[(r, c)], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_damping_matches_velocity_jacobian() {
        let spring = sample_spring();
        let (e0, e1, phi0, phi1) = sample_state();
        let (_, _, d, _) = spring.compute_fkd(&e0, &e1, &phi0, &phi1);

        // D = -∂f/∂φ must hold exactly (the force is linear in φ).
        let eps = 1e-6;
        for col in 0..12 {
            let mut dphi0 = phi0;
            let mut dphi1 = phi1;
            if col < 6 {
                dphi0[col] += eps;
            } else {
                dphi1[col - 6] += eps;
            }
            let (fp, _, _, _) = spring.compute_fkd(&e0, &e1, &dphi0, &dphi1);
            let (f0, _, _, _) = spring.compute_fkd(&e0, &e1, &phi0, &phi1);
            let dcol = (fp - f0) / eps;
            for r in 0..12 {
                assert_relative_eq!(d[(r, col)], -dcol[r], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_damping_dissipates() {
        // Power fed by the damping part of the force must be non-positive.
        let spring = PointSpring {
            damping: 3.0,
            stiffness: 0.0,
            ..sample_spring()
        };
        let (e0, e1, phi0, phi1) = sample_state();
        let (force, _, _, _) = spring.compute_fkd(&e0, &e1, &phi0, &phi1);
        let mut phi = Vector12::zeros();
        phi.fixed_rows_mut::<6>(0).copy_from(&phi0);
        phi.fixed_rows_mut::<6>(6).copy_from(&phi1);
        assert!(force.dot(&phi) <= 1e-12);
    }

    #[test]
    fn test_serial_spring_layout() {
        let mut spring = SerialSpring {
            body0: None,
            body1: None,
            r0: Vector3::zeros(),
            r1: Vector3::new(3.0, 0.0, 0.0),
            nodes: (0..4)
                .map(|_| SpringNode {
                    x: Vector3::zeros(),
                    v: Vector3::zeros(),
                    a: Vector3::zeros(),
                    mass: 0.0,
                    idx_m: 0,
                    idx_r: 0,
                })
                .collect(),
            stiffness: 10.0,
            damping: 0.0,
            rest_length: 0.0,
            mass: 2.0,
        };
        let mut nm = 6;
        let mut nr = 1;
        spring.count_dofs(&mut nm, &mut nr);
        assert_eq!(nm, 18);
        assert_eq!(nr, 13);

        spring.init(&[]);
        assert_relative_eq!(spring.rest_length, 3.0, epsilon = 1e-12);
        assert_relative_eq!(spring.nodes[1].x.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(spring.nodes[0].mass, 0.5, epsilon = 1e-12);

        // Gather/scatter round trip is bit-exact.
        let mut y = DVector::zeros(2 * nr);
        spring.gather_dofs(&mut y, nr);
        let mut clone = spring.clone();
        clone.scatter_dofs(&y, nr);
        for (a, b) in spring.nodes.iter().zip(clone.nodes.iter()) {
            assert_eq!(a.x, b.x);
            assert_eq!(a.v, b.v);
        }
    }

    #[test]
    fn test_serial_spring_segment_forces_balance() {
        let mut spring = SerialSpring {
            body0: None,
            body1: None,
            r0: Vector3::zeros(),
            r1: Vector3::new(2.0, 0.0, 0.0),
            nodes: (0..3)
                .map(|_| SpringNode {
                    x: Vector3::zeros(),
                    v: Vector3::zeros(),
                    a: Vector3::zeros(),
                    mass: 0.0,
                    idx_m: 0,
                    idx_r: 0,
                })
                .collect(),
            stiffness: 10.0,
            damping: 0.5,
            rest_length: 0.0,
            mass: 1.0,
        };
        let mut nm = 0;
        let mut nr = 0;
        spring.count_dofs(&mut nm, &mut nr);
        spring.init(&[]);
        // Stretch the middle node off axis.
        spring.nodes[1].x += Vector3::new(0.0, 0.3, 0.0);

        let mut f = DVector::zeros(nm);
        let mut k = DMatrix::zeros(nm, nm);
        let mut d = DMatrix::zeros(nm, nm);
        spring.compute_force_stiffness_damping(&mut f, &mut k, &mut d);

        // Internal forces sum to zero.
        for c in 0..3 {
            let total: f64 = (0..3).map(|n| f[3 * n + c]).sum();
            assert_relative_eq!(total, 0.0, epsilon = 1e-12);
        }
        // Tangents are symmetric.
        for r in 0..nm {
            for c in 0..nm {
                assert_relative_eq!(k[(r, c)], k[(c, r)], epsilon = 1e-12);
                assert_relative_eq!(d[(r, c)], d[(c, r)], epsilon = 1e-12);
            }
        }
    }
}
