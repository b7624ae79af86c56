//! Joints: one degree-of-freedom group per node of the kinematic tree.
//!
//! A joint owns its generalized state (`q`, `qdot`, `qddot`), its motion
//! subspace `S` (6×ndof) and its time derivative, and the local transform
//! `Q(q)` that [`Joint::update_self`] refreshes. Tree-level traversals
//! (kinematics, Jacobians, gather/scatter) are driven by the `World`,
//! which owns the joints in topological order — joints hold plain `usize`
//! handles, never pointers.

use arbor_types::SimError;
use nalgebra::{DVector, Matrix4, Matrix6, Matrix6xX, Vector3};

use crate::se3::{self, SpatialVector};

/// Closed set of joint variants.
#[derive(Debug, Clone)]
pub enum JointKind {
    /// Rigid attachment, 0 DOF.
    Fixed,
    /// Rotation about a fixed unit axis in the joint frame, 1 DOF.
    Revolute {
        /// Rotation axis (unit length).
        axis: Vector3<f64>,
    },
    /// 1 DOF riding a closed cubic B-spline of SE(3) control frames.
    SplineCurve(SplineCurve),
    /// 2 DOF over a bicubic patch of se(3) control twists.
    SplineSurface(SplineSurface),
}

impl JointKind {
    /// Number of degrees of freedom of this variant.
    #[must_use]
    pub fn ndof(&self) -> usize {
        match self {
            Self::Fixed => 0,
            Self::Revolute { .. } | Self::SplineCurve(_) => 1,
            Self::SplineSurface(_) => 2,
        }
    }
}

/// Cyclic cubic B-spline of SE(3) control frames, cumulative-exponential
/// form. The joint coordinate runs over `[0, n)` and wraps.
#[derive(Debug, Clone)]
pub struct SplineCurve {
    /// Control frames `F_0..F_{n-1}`.
    frames: Vec<Matrix4<f64>>,
    /// Cached relative twists `d_i = log(F_{i-1}⁻¹ · F_i)`, cyclic.
    twists: Vec<SpatialVector>,
}

/// Cumulative cubic B-spline basis and its first two derivatives at local
/// parameter `s ∈ [0, 1)`.
fn cumulative_basis(s: f64) -> ([f64; 3], [f64; 3], [f64; 3]) {
    let s2 = s * s;
    let s3 = s2 * s;
    let b = [
        (s3 - 3.0 * s2 + 3.0 * s + 5.0) / 6.0,
        (-2.0 * s3 + 3.0 * s2 + 3.0 * s + 1.0) / 6.0,
        s3 / 6.0,
    ];
    let db = [
        (s2 - 2.0 * s + 1.0) / 2.0,
        (-2.0 * s2 + 2.0 * s + 1.0) / 2.0,
        s2 / 2.0,
    ];
    let ddb = [s - 1.0, 1.0 - 2.0 * s, s];
    (b, db, ddb)
}

impl SplineCurve {
    /// Build from control frames; at least four are required for a cubic.
    pub fn new(name: &str, frames: Vec<Matrix4<f64>>) -> Result<Self, SimError> {
        if frames.len() < 4 {
            return Err(SimError::TooFewControlFrames {
                joint_name: name.to_string(),
                required: 4,
                given: frames.len(),
            });
        }
        let n = frames.len();
        let twists = (0..n)
            .map(|i| {
                let prev = &frames[(i + n - 1) % n];
                se3::log(&(se3::inverse(prev) * frames[i]))
            })
            .collect();
        Ok(Self { frames, twists })
    }

    /// Number of control frames (the coordinate period).
    #[must_use]
    pub fn period(&self) -> usize {
        self.frames.len()
    }

    /// Evaluate the local transform `Q`, the motion subspace column `S`,
    /// and `∂S/∂q` at coordinate `q`.
    ///
    /// With `X_j = exp(b̃_j(s) d_j)`, the cumulative form is
    /// `Q = F_{k-1} X_1 X_2 X_3` and the body-frame subspace works out to
    /// `S = b̃₃' d₃ + b̃₂' Ad(X₃⁻¹) d₂ + b̃₁' Ad(X₃⁻¹X₂⁻¹) d₁`; the
    /// derivative of each adjoint factor contributes an `ad(·)` term.
    fn eval(&self, q: f64) -> (Matrix4<f64>, SpatialVector, SpatialVector) {
        let n = self.frames.len();
        let qn = q.rem_euclid(n as f64);
        let mut k = qn.floor() as usize;
        if k >= n {
            k = 0; // qn == n can occur from rounding at the wrap point
        }
        let s = qn - k as f64;

        let base = &self.frames[(k + n - 1) % n];
        let d1 = self.twists[k];
        let d2 = self.twists[(k + 1) % n];
        let d3 = self.twists[(k + 2) % n];

        let (b, db, ddb) = cumulative_basis(s);

        let x1 = se3::exp(&(b[0] * d1));
        let x2 = se3::exp(&(b[1] * d2));
        let x3 = se3::exp(&(b[2] * d3));
        let q_local = base * x1 * x2 * x3;

        let a2 = se3::adjoint(&se3::inverse(&x3));
        let a1 = a2 * se3::adjoint(&se3::inverse(&x2));

        let a2_d2 = a2 * d2;
        let a1_d1 = a1 * d1;
        let s_col = db[2] * d3 + db[1] * a2_d2 + db[0] * a1_d1;

        let da2 = -db[2] * se3::ad(&d3) * a2;
        let da1 = -(db[2] * se3::ad(&d3) + db[1] * se3::ad(&a2_d2)) * a1;
        let ds_col = ddb[2] * d3 + ddb[1] * a2_d2 + db[1] * (da2 * d2) + ddb[0] * a1_d1
            + db[0] * (da1 * d1);

        (q_local, s_col, ds_col)
    }
}

/// Bicubic B-spline patch of se(3) control twists: `Q(q) = exp(ĉ(q))`
/// with `c(q₀, q₁) = Σᵢⱼ bᵢ(q₀) bⱼ(q₁) cᵢⱼ`. Coordinates nominally live in
/// `[0, 1]`; the polynomial basis extrapolates smoothly outside.
#[derive(Debug, Clone)]
pub struct SplineSurface {
    /// 4×4 grid of control twists.
    grid: [[SpatialVector; 4]; 4],
}

/// Uniform cubic B-spline basis (matrix form) and first derivative.
fn bspline_basis(u: f64) -> ([f64; 4], [f64; 4]) {
    // Rows of B weight [1, u, u², u³]; columns index the control points.
    const B: [[f64; 4]; 4] = [
        [1.0 / 6.0, 4.0 / 6.0, 1.0 / 6.0, 0.0],
        [-3.0 / 6.0, 0.0, 3.0 / 6.0, 0.0],
        [3.0 / 6.0, -6.0 / 6.0, 3.0 / 6.0, 0.0],
        [-1.0 / 6.0, 3.0 / 6.0, -3.0 / 6.0, 1.0 / 6.0],
    ];
    let powers = [1.0, u, u * u, u * u * u];
    let dpowers = [0.0, 1.0, 2.0 * u, 3.0 * u * u];
    let mut b = [0.0; 4];
    let mut db = [0.0; 4];
    for i in 0..4 {
        for j in 0..4 {
            b[i] += powers[j] * B[j][i];
            db[i] += dpowers[j] * B[j][i];
        }
    }
    (b, db)
}

impl SplineSurface {
    /// Build from a 4×4 grid of control twists.
    #[must_use]
    pub fn new(grid: [[SpatialVector; 4]; 4]) -> Self {
        Self { grid }
    }

    /// Interpolated twist and its two partials at `(q0, q1)`.
    fn coeff(&self, q0: f64, q1: f64) -> (SpatialVector, SpatialVector, SpatialVector) {
        let (b0, db0) = bspline_basis(q0);
        let (b1, db1) = bspline_basis(q1);
        let mut c = SpatialVector::zeros();
        let mut dc0 = SpatialVector::zeros();
        let mut dc1 = SpatialVector::zeros();
        for i in 0..4 {
            for j in 0..4 {
                let ctrl = &self.grid[i][j];
                c += b0[i] * b1[j] * ctrl;
                dc0 += db0[i] * b1[j] * ctrl;
                dc1 += b0[i] * db1[j] * ctrl;
            }
        }
        (c, dc0, dc1)
    }

    /// Motion subspace columns at `(q0, q1)`: `S_k = dexp(c) · ∂c/∂q_k`.
    fn subspace(&self, q0: f64, q1: f64) -> (SpatialVector, SpatialVector) {
        let (c, dc0, dc1) = self.coeff(q0, q1);
        let j = se3::dexp(&c);
        (j * dc0, j * dc1)
    }

    /// Local transform at `(q0, q1)`.
    fn transform(&self, q0: f64, q1: f64) -> Matrix4<f64> {
        se3::exp(&self.coeff(q0, q1).0)
    }
}

/// Step used for the spline-surface `S̊` central difference.
const SURFACE_FD_STEP: f64 = 1.0e-5;

/// One node of the kinematic tree.
#[derive(Debug, Clone)]
pub struct Joint {
    /// Name for lookup and diagnostics.
    pub name: String,
    /// Variant payload.
    pub kind: JointKind,
    /// Handle of the owned body.
    pub body: usize,
    /// Parent joint handle; `None` marks a root (identity world frame,
    /// zero inherited velocity).
    pub parent: Option<usize>,
    /// Child joint handles, filled during world init.
    pub children: Vec<usize>,

    /// Degrees of freedom.
    pub ndof: usize,
    /// Generalized position.
    pub q: DVector<f64>,
    /// Generalized velocity.
    pub qdot: DVector<f64>,
    /// Generalized acceleration (from the integrator).
    pub qddot: DVector<f64>,
    /// Applied torque.
    pub tau: DVector<f64>,
    /// Constraint torque scattered back after a solve (diagnostic).
    pub tau_con: DVector<f64>,
    /// Per-DOF stiffness `Kr` pulling `q` to zero.
    pub stiffness: f64,
    /// Per-DOF damping `Dr`.
    pub damping: f64,
    /// Externally driven: skipped by stiffness/damping force assembly.
    pub prescribed: bool,

    /// Offset of this joint's DOFs in the reduced vector.
    pub idx_r: usize,

    /// Joint frame relative to the parent joint frame at `q = 0`.
    pub e_pj0: Matrix4<f64>,

    // Refreshed by update.
    /// Local joint transform `Q(q)`.
    pub q_local: Matrix4<f64>,
    /// Motion subspace, 6×ndof.
    pub s: Matrix6xX<f64>,
    /// Time derivative of the motion subspace.
    pub sdot: Matrix6xX<f64>,
    /// Parent-relative transform `E_pj = E_pj0 · Q`.
    pub e_pj: Matrix4<f64>,
    /// Inverse of `e_pj`.
    pub e_jp: Matrix4<f64>,
    /// Adjoint of `e_jp`, used to pull the parent twist down.
    pub ad_jp: Matrix6<f64>,
    /// World transform of the joint frame.
    pub e_wj: Matrix4<f64>,
    /// Joint twist `V = S·q̇ + Ad_jp·V_parent`.
    pub v: SpatialVector,
}

impl Joint {
    /// Create a joint of the given kind. `e_pj0` and state start at
    /// identity/zero; the world factory fills in placement.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: JointKind, body: usize, parent: Option<usize>) -> Self {
        let ndof = kind.ndof();
        Self {
            name: name.into(),
            kind,
            body,
            parent,
            children: Vec::new(),
            ndof,
            q: DVector::zeros(ndof),
            qdot: DVector::zeros(ndof),
            qddot: DVector::zeros(ndof),
            tau: DVector::zeros(ndof),
            tau_con: DVector::zeros(ndof),
            stiffness: 0.0,
            damping: 0.0,
            prescribed: false,
            idx_r: 0,
            e_pj0: Matrix4::identity(),
            q_local: Matrix4::identity(),
            s: Matrix6xX::zeros(ndof),
            sdot: Matrix6xX::zeros(ndof),
            e_pj: Matrix4::identity(),
            e_jp: Matrix4::identity(),
            ad_jp: Matrix6::identity(),
            e_wj: Matrix4::identity(),
            v: SpatialVector::zeros(),
        }
    }

    /// Refresh `Q`, `S` and `S̊` from the current `q`/`qdot`. The
    /// parent-relative and world quantities are composed afterwards by the
    /// world's root-first traversal.
    pub fn update_self(&mut self) {
        match &self.kind {
            JointKind::Fixed => {
                self.q_local = Matrix4::identity();
            }
            JointKind::Revolute { axis } => {
                self.q_local = se3::rp_to_e(&se3::aa_to_mat(axis, self.q[0]), &Vector3::zeros());
                self.s
                    .column_mut(0)
                    .copy_from(&se3::spatial(axis, &Vector3::zeros()));
                // Constant axis in the joint frame: S̊ = 0.
            }
            JointKind::SplineCurve(curve) => {
                let (q_local, s_col, ds_col) = curve.eval(self.q[0]);
                self.q_local = q_local;
                self.s.column_mut(0).copy_from(&s_col);
                self.sdot.column_mut(0).copy_from(&(ds_col * self.qdot[0]));
            }
            JointKind::SplineSurface(surface) => {
                let (q0, q1) = (self.q[0], self.q[1]);
                self.q_local = surface.transform(q0, q1);
                let (s0, s1) = surface.subspace(q0, q1);
                self.s.column_mut(0).copy_from(&s0);
                self.s.column_mut(1).copy_from(&s1);

                // S̊ = Σ_l ∂S/∂q_l · q̇_l by central differences; the
                // analytic second derivative of the exponential tangent
                // buys nothing at these step sizes.
                let e = SURFACE_FD_STEP;
                let (p0a, p1a) = surface.subspace(q0 + e, q1);
                let (m0a, m1a) = surface.subspace(q0 - e, q1);
                let (p0b, p1b) = surface.subspace(q0, q1 + e);
                let (m0b, m1b) = surface.subspace(q0, q1 - e);
                let inv = 1.0 / (2.0 * e);
                let sdot0 =
                    (p0a - m0a) * inv * self.qdot[0] + (p0b - m0b) * inv * self.qdot[1];
                let sdot1 =
                    (p1a - m1a) * inv * self.qdot[0] + (p1b - m1b) * inv * self.qdot[1];
                self.sdot.column_mut(0).copy_from(&sdot0);
                self.sdot.column_mut(1).copy_from(&sdot1);
            }
        }
    }

    /// Compose parent-relative and world transforms and the joint twist
    /// from an already-updated parent frame. Pass identity/zero at a root.
    pub fn compose(&mut self, e_wp: &Matrix4<f64>, v_parent: &SpatialVector) {
        self.e_pj = self.e_pj0 * self.q_local;
        self.e_jp = se3::inverse(&self.e_pj);
        self.ad_jp = se3::adjoint(&self.e_jp);
        self.e_wj = e_wp * self.e_pj;

        self.v = &self.s * &self.qdot;
        if self.parent.is_some() {
            self.v += self.ad_jp * v_parent;
        }
    }
}
