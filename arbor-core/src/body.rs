//! Rigid bodies: inertia, cached frames/adjoints, maximal-coordinate
//! mass and force assembly.
//!
//! A body's frame sits at its center of mass, aligned with the principal
//! axes, so the 6×6 spatial inertia in the body frame is diagonal:
//! `diag(Ixx, Iyy, Izz, m, m, m)`. Everything pose-dependent (world
//! transforms, adjoints, twist) is recomputed by the world's kinematic
//! update; this module only defines the per-body pieces.

use nalgebra::{DMatrix, DVector, Matrix4, Matrix6, Vector3, Vector6};

use crate::se3::{self, SpatialVector};
use crate::world::Energy;

/// A rigid cuboid link owned by exactly one joint.
#[derive(Debug, Clone)]
pub struct Body {
    /// Optional name for lookup and diagnostics.
    pub name: String,
    /// Uniform density.
    pub density: f64,
    /// Cuboid side lengths.
    pub sides: Vector3<f64>,
    /// Spatial inertia 6-vector `[Ixx, Iyy, Izz, m, m, m]` at the body
    /// frame. Populated once by [`Body::compute_inertia`].
    pub inertia: Vector6<f64>,

    /// Body frame relative to the owning joint frame (fixed at build time).
    pub e_ji: Matrix4<f64>,

    // Pose-dependent state, refreshed by the kinematic update.
    /// World transform of the body frame.
    pub e_wi: Matrix4<f64>,
    /// Inverse world transform.
    pub e_iw: Matrix4<f64>,
    /// Adjoint of `E_ij` (joint → body); constant, cached at init.
    pub ad_ij: Matrix6<f64>,
    /// Adjoint of the world transform.
    pub ad_wi: Matrix6<f64>,
    /// Adjoint of the inverse world transform.
    pub ad_iw: Matrix6<f64>,
    /// Adjoint from the parent body's frame to this one; identity at a root.
    pub ad_ip: Matrix6<f64>,
    /// Time derivative of `ad_wi`: `Ad(E_wi) · ad(φ)`.
    pub addot_wi: Matrix6<f64>,
    /// Body twist (spatial velocity in the body frame).
    pub phi: SpatialVector,

    /// Offset of this body's 6 maximal coordinates in the global maximal
    /// vector; assigned once during world init.
    pub idx_m: usize,
    /// Owning joint handle; assigned during world init.
    pub joint: usize,
    /// Constraint wrench scattered back after an equality solve
    /// (diagnostic only; never read by the stepping pipeline).
    pub wrench_con: SpatialVector,
}

impl Body {
    /// Create a cuboid body. The joint-relative frame and inertia are
    /// filled in by the world factory.
    #[must_use]
    pub fn new(name: impl Into<String>, density: f64, sides: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            density,
            sides,
            inertia: Vector6::zeros(),
            e_ji: Matrix4::identity(),
            e_wi: Matrix4::identity(),
            e_iw: Matrix4::identity(),
            ad_ij: Matrix6::identity(),
            ad_wi: Matrix6::identity(),
            ad_iw: Matrix6::identity(),
            ad_ip: Matrix6::identity(),
            addot_wi: Matrix6::zeros(),
            phi: SpatialVector::zeros(),
            idx_m: 0,
            joint: 0,
            wrench_con: SpatialVector::zeros(),
        }
    }

    /// Populate the spatial inertia from shape and density. Called once at
    /// construction.
    pub fn compute_inertia(&mut self) {
        self.inertia = se3::inertia_cuboid(&self.sides, self.density);
    }

    /// Body mass.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.inertia[3]
    }

    /// Reserve this body's 6 maximal-coordinate slots.
    pub fn count_dofs(&mut self, nm: &mut usize) {
        self.idx_m = *nm;
        *nm += 6;
    }

    /// Refresh world transforms, adjoints and twist from the owning
    /// joint's world frame and joint-frame twist. `ad_ip` is filled
    /// separately by the world traversal (it needs the parent body).
    pub fn update(&mut self, e_wj: &Matrix4<f64>, joint_twist: &SpatialVector) {
        self.e_wi = e_wj * self.e_ji;
        self.e_iw = se3::inverse(&self.e_wi);
        self.ad_wi = se3::adjoint(&self.e_wi);
        self.ad_iw = se3::adjoint(&self.e_iw);
        self.phi = self.ad_ij * joint_twist;
        self.addot_wi = self.ad_wi * se3::ad(&self.phi);
    }

    /// Write this body's 6×6 spatial-inertia block into the global maximal
    /// mass matrix and add its Coriolis + gravity wrench into the global
    /// maximal force vector, at `idx_m`. Mutating the caller-supplied
    /// aggregates is the contract; the caller pre-sizes them to `nm`.
    pub fn compute_mass_grav(
        &self,
        gravity: &Vector3<f64>,
        m: &mut DMatrix<f64>,
        f: &mut DVector<f64>,
    ) {
        let row = self.idx_m;
        for k in 0..6 {
            m[(row + k, row + k)] += self.inertia[k];
        }

        // Coriolis wrench: ad(φ)ᵀ · M · φ.
        let m_phi = SpatialVector::from_fn(|k, _| self.inertia[k] * self.phi[k]);
        let f_cor = se3::ad(&self.phi).transpose() * m_phi;

        // Gravity expressed in the body frame: [0, m·Rᵀg].
        let r_wi = se3::rotation(&self.e_wi);
        let g_body = r_wi.transpose() * gravity * self.mass();

        for k in 0..3 {
            f[row + k] += f_cor[k];
            f[row + 3 + k] += f_cor[3 + k] + g_body[k];
        }
    }

    /// Accumulate kinetic and gravitational potential energy.
    pub fn compute_energies(&self, gravity: &Vector3<f64>, energy: &mut Energy) {
        for k in 0..6 {
            energy.kinetic += 0.5 * self.inertia[k] * self.phi[k] * self.phi[k];
        }
        let com = se3::translation(&self.e_wi);
        energy.potential -= self.mass() * gravity.dot(&com);
    }

    /// World-frame position of a body-frame point.
    #[must_use]
    pub fn point_world(&self, r: &Vector3<f64>) -> Vector3<f64> {
        se3::transform_point(&self.e_wi, r)
    }

    /// World-frame velocity of a body-frame point: `R · Γ(r) · φ`.
    #[must_use]
    pub fn point_velocity_world(&self, r: &Vector3<f64>) -> Vector3<f64> {
        se3::rotation(&self.e_wi) * (se3::gamma(r) * self.phi)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_inertia_and_mass() {
        let mut body = Body::new("link", 2.0, Vector3::new(1.0, 2.0, 3.0));
        body.compute_inertia();
        assert_relative_eq!(body.mass(), 12.0, epsilon = 1e-12);
        // Ixx = m (sy² + sz²) / 12
        assert_relative_eq!(body.inertia[0], 13.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mass_grav_block_placement() {
        let mut body = Body::new("link", 1.0, Vector3::new(10.0, 1.0, 1.0));
        body.compute_inertia();
        body.idx_m = 6;

        let mut m = DMatrix::zeros(12, 12);
        let mut f = DVector::zeros(12);
        let gravity = Vector3::new(0.0, -9.81, 0.0);
        body.compute_mass_grav(&gravity, &mut m, &mut f);

        // Block lands at the body's offset, nothing before it.
        assert_relative_eq!(m[(0, 0)], 0.0, epsilon = 1e-15);
        assert_relative_eq!(m[(9, 9)], body.mass(), epsilon = 1e-12);
        // At rest in the identity pose, the force is pure gravity.
        assert_relative_eq!(f[10], body.mass() * -9.81, epsilon = 1e-12);
        assert_relative_eq!(f[6], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_point_velocity_matches_twist() {
        let mut body = Body::new("link", 1.0, Vector3::new(1.0, 1.0, 1.0));
        body.compute_inertia();
        // Spin about z at 2 rad/s: a point at x = 1 moves at 2 in +y.
        body.phi = SpatialVector::new(0.0, 0.0, 2.0, 0.0, 0.0, 0.0);
        let v = body.point_velocity_world(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(v.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(v.x, 0.0, epsilon = 1e-15);
    }
}
