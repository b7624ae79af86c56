//! Equality and inequality constraints.
//!
//! A closed variant set: revolute joint limits (inequality, reduced
//! coordinates), loop closure between two bodies, serial-spring end
//! attachment, and soft-body node attachment (all equality, maximal
//! coordinates). Every variant reports fixed row counts at init; row
//! offsets are assigned in one pass. Inequality rows participate in a
//! solve only while active, and the active set is recomputed from scratch
//! every step.
//!
//! Sign conventions: an equality block fills `g = (attached point) -
//! (attaching point)` with Jacobian rows `∂g/∂(coordinates)`; an
//! inequality row fills the slack `c ≥ 0` with its row pointing in the
//! direction that increases the slack.

use nalgebra::{DMatrix, DVector};

use crate::body::Body;
use crate::deformable::Deformable;
use crate::joint::Joint;
use crate::se3;
use crate::soft::SoftBody;

/// Closed set of constraint variants.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Revolute joint limit `lower ≤ q ≤ upper`: one inequality row in
    /// reduced coordinates, signed toward the nearer bound.
    JointLimit {
        /// Constrained joint handle.
        joint: usize,
        /// Lower limit (rad).
        lower: f64,
        /// Upper limit (rad).
        upper: f64,
        /// Row offset among reduced inequality rows.
        idx_ir: usize,
    },
    /// Loop closure: a body-frame point on `body_a` coincides with one on
    /// `body_b` (3 equality rows, maximal).
    Loop {
        /// First body handle.
        body_a: usize,
        /// Second body handle.
        body_b: usize,
        /// Attachment point in `body_a`'s frame.
        ra: nalgebra::Vector3<f64>,
        /// Attachment point in `body_b`'s frame.
        rb: nalgebra::Vector3<f64>,
        /// Row offset among maximal equality rows.
        idx_em: usize,
    },
    /// Serial-spring end nodes tied to their bodies' attachment points
    /// (6 equality rows, maximal). Created automatically at world init.
    AttachSpring {
        /// Handle of the serial spring in the deformable list.
        deformable: usize,
        /// Row offset among maximal equality rows.
        idx_em: usize,
    },
    /// Soft-body nodes welded to rigid bodies (3 equality rows per
    /// attachment, maximal). Created automatically at world init.
    AttachSoftBody {
        /// Handle into the soft-body list.
        soft: usize,
        /// Row offset among maximal equality rows.
        idx_em: usize,
    },
}

impl Constraint {
    /// Row counts `(nem, ner, nim, nir)` of this constraint.
    #[must_use]
    pub fn rows(&self, soft_bodies: &[Box<dyn SoftBody>]) -> (usize, usize, usize, usize) {
        match self {
            Self::JointLimit { .. } => (0, 0, 0, 1),
            Self::Loop { .. } => (3, 0, 0, 0),
            Self::AttachSpring { .. } => (6, 0, 0, 0),
            Self::AttachSoftBody { soft, .. } => {
                (3 * soft_bodies[*soft].attachments().len(), 0, 0, 0)
            }
        }
    }

    /// Assign this constraint's row offsets, advancing the counters.
    pub fn assign_rows(
        &mut self,
        soft_bodies: &[Box<dyn SoftBody>],
        nem: &mut usize,
        _ner: &mut usize,
        _nim: &mut usize,
        nir: &mut usize,
    ) {
        match self {
            Self::JointLimit { idx_ir, .. } => {
                *idx_ir = *nir;
                *nir += 1;
            }
            Self::Loop { idx_em, .. } => {
                *idx_em = *nem;
                *nem += 3;
            }
            Self::AttachSpring { idx_em, .. } => {
                *idx_em = *nem;
                *nem += 6;
            }
            Self::AttachSoftBody { soft, idx_em } => {
                *idx_em = *nem;
                *nem += 3 * soft_bodies[*soft].attachments().len();
            }
        }
    }

    /// Fill a 3-row point-attachment block: body point minus free point.
    ///
    /// `gm`/`gmdot` get `R·Γ(r)` and `R·ω̂·Γ(r)` at the body's columns and
    /// `-I` at the free point's columns; `g` gets the world-space gap.
    #[allow(clippy::too_many_arguments)]
    fn fill_point_attachment(
        row: usize,
        body: Option<&Body>,
        r: &nalgebra::Vector3<f64>,
        point_col: usize,
        point_x: &nalgebra::Vector3<f64>,
        gm: &mut DMatrix<f64>,
        gmdot: &mut DMatrix<f64>,
        g: &mut DVector<f64>,
    ) {
        let anchor = match body {
            Some(b) => {
                let rot = se3::rotation(&b.e_wi);
                let block = rot * se3::gamma(r);
                let w = se3::bracket3(&se3::angular(&b.phi));
                let block_dot = rot * w * se3::gamma(r);
                for i in 0..3 {
                    for c in 0..6 {
                        gm[(row + i, b.idx_m + c)] = block[(i, c)];
                        gmdot[(row + i, b.idx_m + c)] = block_dot[(i, c)];
                    }
                }
                b.point_world(r)
            }
            None => *r,
        };
        for i in 0..3 {
            gm[(row + i, point_col + i)] = -1.0;
            g[row + i] = anchor[i] - point_x[i];
        }
    }

    /// Fill maximal equality Jacobian rows, their time derivatives, and
    /// the constraint values. The buffers are pre-sized `nem × nm` / `nem`
    /// by the solver.
    pub fn fill_eq_m(
        &self,
        bodies: &[Body],
        deformables: &[Deformable],
        soft_bodies: &[Box<dyn SoftBody>],
        gm: &mut DMatrix<f64>,
        gmdot: &mut DMatrix<f64>,
        g: &mut DVector<f64>,
    ) {
        match self {
            Self::JointLimit { .. } => {}
            Self::Loop {
                body_a,
                body_b,
                ra,
                rb,
                idx_em,
            } => {
                let a = &bodies[*body_a];
                let b = &bodies[*body_b];
                let rot_a = se3::rotation(&a.e_wi);
                let rot_b = se3::rotation(&b.e_wi);
                let ga = rot_a * se3::gamma(ra);
                let gb = rot_b * se3::gamma(rb);
                let ga_dot = rot_a * se3::bracket3(&se3::angular(&a.phi)) * se3::gamma(ra);
                let gb_dot = rot_b * se3::bracket3(&se3::angular(&b.phi)) * se3::gamma(rb);
                for i in 0..3 {
                    for c in 0..6 {
                        gm[(idx_em + i, a.idx_m + c)] = ga[(i, c)];
                        gm[(idx_em + i, b.idx_m + c)] = -gb[(i, c)];
                        gmdot[(idx_em + i, a.idx_m + c)] = ga_dot[(i, c)];
                        gmdot[(idx_em + i, b.idx_m + c)] = -gb_dot[(i, c)];
                    }
                }
                let gap = a.point_world(ra) - b.point_world(rb);
                for i in 0..3 {
                    g[idx_em + i] = gap[i];
                }
            }
            Self::AttachSpring { deformable, idx_em } => {
                let Deformable::SerialSpring(spring) = &deformables[*deformable] else {
                    return;
                };
                let first = &spring.nodes[0];
                let last = &spring.nodes[spring.nodes.len() - 1];
                Self::fill_point_attachment(
                    *idx_em,
                    spring.body0.map(|b| &bodies[b]),
                    &spring.r0,
                    first.idx_m,
                    &first.x,
                    gm,
                    gmdot,
                    g,
                );
                Self::fill_point_attachment(
                    *idx_em + 3,
                    spring.body1.map(|b| &bodies[b]),
                    &spring.r1,
                    last.idx_m,
                    &last.x,
                    gm,
                    gmdot,
                    g,
                );
            }
            Self::AttachSoftBody { soft, idx_em } => {
                let sb = &soft_bodies[*soft];
                for (i, att) in sb.attachments().iter().enumerate() {
                    let (x, _) = sb.attachment_state(i);
                    Self::fill_point_attachment(
                        *idx_em + 3 * i,
                        Some(&bodies[att.body]),
                        &att.r,
                        att.node_idx_m,
                        &x,
                        gm,
                        gmdot,
                        g,
                    );
                }
            }
        }
    }

    /// Fill reduced equality rows. No shipped variant produces any; the
    /// plumbing exists because the solver assembles `G = [Gm·J; Gr]`.
    pub fn fill_eq_r(
        &self,
        _joints: &[Joint],
        _gr: &mut DMatrix<f64>,
        _grdot: &mut DMatrix<f64>,
        _g: &mut DVector<f64>,
    ) {
    }

    /// Fill maximal inequality rows. No shipped variant produces any.
    pub fn fill_ineq_m(&self, _bodies: &[Body], _cm: &mut DMatrix<f64>, _c: &mut DVector<f64>) {}

    /// Fill reduced inequality rows: the full (unsliced) Jacobian, slack
    /// value, and slack rate. For a joint limit the row is signed toward
    /// the nearer bound, so the slack and its rate are
    /// `(q - lower, q̇)` or `(upper - q, -q̇)`.
    pub fn fill_ineq_r(
        &self,
        joints: &[Joint],
        cr: &mut DMatrix<f64>,
        crdot: &mut DVector<f64>,
        c: &mut DVector<f64>,
    ) {
        if let Self::JointLimit {
            joint,
            lower,
            upper,
            idx_ir,
        } = self
        {
            let j = &joints[*joint];
            let q = j.q[0];
            let qdot = j.qdot[0];
            if q - lower <= upper - q {
                cr[(*idx_ir, j.idx_r)] = 1.0;
                c[*idx_ir] = q - lower;
                crdot[*idx_ir] = qdot;
            } else {
                cr[(*idx_ir, j.idx_r)] = -1.0;
                c[*idx_ir] = upper - q;
                crdot[*idx_ir] = -qdot;
            }
        }
    }

    /// Append this constraint's currently active inequality rows. A row is
    /// active when its slack is at or below the activation tolerance.
    pub fn active_rows(
        &self,
        joints: &[Joint],
        tolerance: f64,
        _rows_m: &mut Vec<usize>,
        rows_r: &mut Vec<usize>,
    ) {
        if let Self::JointLimit {
            joint,
            lower,
            upper,
            idx_ir,
        } = self
        {
            let q = joints[*joint].q[0];
            let slack = (q - lower).min(upper - q);
            if slack <= tolerance {
                rows_r.push(*idx_ir);
            }
        }
    }
}
