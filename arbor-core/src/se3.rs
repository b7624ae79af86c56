//! SE(3)/se(3) spatial algebra kernel.
//!
//! Pure functions over rigid transforms and 6D spatial vectors used by every
//! other module: adjoint maps, brackets, the exponential/logarithm pair, the
//! right tangent of the exponential, and closed-form cuboid inertia. No
//! pipeline state dependencies.
//!
//! Conventions:
//! - A transform `E_ab` is a 4×4 homogeneous matrix mapping coordinates in
//!   frame `b` to frame `a`. Its top-left 3×3 block is orthonormal and its
//!   last row is `[0, 0, 0, 1]`.
//! - Spatial vectors are `[angular (3), linear (3)]`, Featherstone ordering.
//!   Motion vectors are `[ω, v]`, force vectors `[τ, f]`.

use nalgebra::{Matrix3, Matrix4, Matrix6, SMatrix, Vector3, Vector6};

/// 6D spatial vector: `[angular (3), linear (3)]`.
pub type SpatialVector = Vector6<f64>;

/// 3×6 point-velocity map, see [`gamma`].
pub type Matrix3x6 = SMatrix<f64, 3, 6>;

/// Below this rotation angle (or axis norm) the closed forms switch to
/// their series expansions.
const SMALL_ANGLE: f64 = 1.0e-6;

/// 3×3 skew-symmetric matrix of a 3-vector: `bracket3(v) * x == v × x`.
#[inline]
#[must_use]
pub fn bracket3(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Inverse of [`bracket3`]: extract the 3-vector from a skew matrix.
#[inline]
#[must_use]
pub fn unbracket3(m: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(m[(2, 1)], m[(0, 2)], m[(1, 0)])
}

/// 4×4 homogeneous form of a twist: `[[ω̂, v], [0, 0]]`.
#[inline]
#[must_use]
pub fn bracket6(xi: &SpatialVector) -> Matrix4<f64> {
    let mut m = Matrix4::zeros();
    m.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&bracket3(&angular(xi)));
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(&linear(xi));
    m
}

/// Angular half of a spatial vector.
#[inline]
#[must_use]
pub fn angular(xi: &SpatialVector) -> Vector3<f64> {
    Vector3::new(xi[0], xi[1], xi[2])
}

/// Linear half of a spatial vector.
#[inline]
#[must_use]
pub fn linear(xi: &SpatialVector) -> Vector3<f64> {
    Vector3::new(xi[3], xi[4], xi[5])
}

/// Stack angular and linear parts into a spatial vector.
#[inline]
#[must_use]
pub fn spatial(w: &Vector3<f64>, v: &Vector3<f64>) -> SpatialVector {
    SpatialVector::new(w.x, w.y, w.z, v.x, v.y, v.z)
}

/// Rigid-transform inverse via the rotation transpose and `-Rᵀp` — never a
/// full 4×4 matrix inversion.
#[must_use]
pub fn inverse(e: &Matrix4<f64>) -> Matrix4<f64> {
    let r = rotation(e);
    let p = translation(e);
    let rt = r.transpose();
    rp_to_e(&rt, &(-(rt * p)))
}

/// Rotation block of a transform.
#[inline]
#[must_use]
pub fn rotation(e: &Matrix4<f64>) -> Matrix3<f64> {
    e.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Translation column of a transform.
#[inline]
#[must_use]
pub fn translation(e: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(e[(0, 3)], e[(1, 3)], e[(2, 3)])
}

/// Assemble a transform from a rotation block and a translation.
#[must_use]
pub fn rp_to_e(r: &Matrix3<f64>, p: &Vector3<f64>) -> Matrix4<f64> {
    let mut e = Matrix4::identity();
    e.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
    e.fixed_view_mut::<3, 1>(0, 3).copy_from(p);
    e
}

/// Split a transform into its rotation block and translation.
#[must_use]
pub fn e_to_rp(e: &Matrix4<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    (rotation(e), translation(e))
}

/// Transform a point through a rigid transform.
#[inline]
#[must_use]
pub fn transform_point(e: &Matrix4<f64>, x: &Vector3<f64>) -> Vector3<f64> {
    rotation(e) * x + translation(e)
}

/// 6×6 adjoint of a transform: maps a spatial motion vector expressed in
/// the source frame to the destination frame.
///
/// `Ad(E_ab) = [[R, 0], [p̂R, R]]` for `E_ab = [[R, p], [0, 1]]`.
#[must_use]
pub fn adjoint(e: &Matrix4<f64>) -> Matrix6<f64> {
    let r = rotation(e);
    let pr = bracket3(&translation(e)) * r;
    let mut ad = Matrix6::zeros();
    ad.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    ad.fixed_view_mut::<3, 3>(3, 0).copy_from(&pr);
    ad.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
    ad
}

/// 6×6 "little adjoint" of a twist: `ad(ξ) = [[ω̂, 0], [v̂, ω̂]]`.
///
/// Satisfies `ad(ξ)·η == spatial_cross_motion(ξ, η)` and generates the
/// derivative of [`adjoint`] along a trajectory:
/// `d/dt Ad(E_wi) = Ad(E_wi) · ad(φ_i)` for body twist `φ_i`.
#[must_use]
pub fn ad(xi: &SpatialVector) -> Matrix6<f64> {
    let wb = bracket3(&angular(xi));
    let vb = bracket3(&linear(xi));
    let mut m = Matrix6::zeros();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(&wb);
    m.fixed_view_mut::<3, 3>(3, 0).copy_from(&vb);
    m.fixed_view_mut::<3, 3>(3, 3).copy_from(&wb);
    m
}

/// Spatial cross product for motion vectors: `v ×ₘ s`.
#[inline]
#[must_use]
pub fn spatial_cross_motion(v: &SpatialVector, s: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let vl = linear(v);
    let sw = angular(s);
    let sl = linear(s);
    spatial(&w.cross(&sw), &(w.cross(&sl) + vl.cross(&sw)))
}

/// Spatial cross product for force vectors: `v ×* f`, the dual of
/// [`spatial_cross_motion`] (`ad(v)ᵀ f == -(v ×* f)`).
#[inline]
#[must_use]
pub fn spatial_cross_force(v: &SpatialVector, f: &SpatialVector) -> SpatialVector {
    let w = angular(v);
    let vl = linear(v);
    let fw = angular(f);
    let fl = linear(f);
    spatial(&(w.cross(&fw) + vl.cross(&fl)), &w.cross(&fl))
}

/// 3×6 map from a body twist to the world-rate of a body-frame point `r`
/// (up to the body rotation): `ẋ_w = R · gamma(r) · φ` with
/// `gamma(r) = [-r̂, I]`.
#[must_use]
pub fn gamma(r: &Vector3<f64>) -> Matrix3x6 {
    let mut g = Matrix3x6::zeros();
    g.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-bracket3(r)));
    g.fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&Matrix3::identity());
    g
}

/// Axis-angle to rotation matrix (Rodrigues' formula).
///
/// The axis need not be pre-normalized. Contract for the degenerate case:
/// an axis with norm below `1e-12` yields the identity rotation for any
/// angle, keeping the function total.
#[must_use]
pub fn aa_to_mat(axis: &Vector3<f64>, angle: f64) -> Matrix3<f64> {
    let n = axis.norm();
    if n < 1.0e-12 {
        return Matrix3::identity();
    }
    let k = bracket3(&(axis / n));
    Matrix3::identity() + angle.sin() * k + (1.0 - angle.cos()) * (k * k)
}

/// Closed-form spatial inertia of a uniform-density cuboid, about its
/// center of mass in the principal frame: `[Ixx, Iyy, Izz, m, m, m]`.
#[must_use]
pub fn inertia_cuboid(sides: &Vector3<f64>, density: f64) -> Vector6<f64> {
    let mass = density * sides.x * sides.y * sides.z;
    let c = mass / 12.0;
    Vector6::new(
        c * (sides.y * sides.y + sides.z * sides.z),
        c * (sides.x * sides.x + sides.z * sides.z),
        c * (sides.x * sides.x + sides.y * sides.y),
        mass,
        mass,
        mass,
    )
}

/// SO(3) exponential: rotation matrix of the rotation vector `w`.
#[must_use]
pub fn exp3(w: &Vector3<f64>) -> Matrix3<f64> {
    aa_to_mat(w, w.norm())
}

/// SE(3) exponential of a twist `ξ = [ω, v]`.
///
/// `exp(ξ) = [[exp3(ω), V(ω)v], [0, 1]]` with the standard left Jacobian
/// `V(ω) = I + (1-cosθ)/θ² ω̂ + (θ-sinθ)/θ³ ω̂²`.
#[must_use]
pub fn exp(xi: &SpatialVector) -> Matrix4<f64> {
    let w = angular(xi);
    let v = linear(xi);
    let theta = w.norm();
    let wb = bracket3(&w);
    let (a, b) = if theta < SMALL_ANGLE {
        // Series: (1-cosθ)/θ² and (θ-sinθ)/θ³.
        (0.5 - theta * theta / 24.0, 1.0 / 6.0 - theta * theta / 120.0)
    } else {
        let t2 = theta * theta;
        ((1.0 - theta.cos()) / t2, (theta - theta.sin()) / (t2 * theta))
    };
    let vmat = Matrix3::identity() + a * wb + b * (wb * wb);
    rp_to_e(&exp3(&w), &(vmat * v))
}

/// SO(3) logarithm: rotation vector of a rotation matrix.
///
/// Handles the θ → π branch by extracting the axis from the diagonal of
/// `(R + I)/2` instead of the vanishing skew part.
#[must_use]
pub fn log3(r: &Matrix3<f64>) -> Vector3<f64> {
    let cos_theta = ((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();
    if theta < SMALL_ANGLE {
        // R ≈ I + ω̂: the skew part is the answer to first order.
        return unbracket3(&(0.5 * (r - r.transpose())));
    }
    if (std::f64::consts::PI - theta) < 1.0e-6 {
        // Near π the skew part of R degenerates; use B = (R + I)/2, whose
        // diagonal is cos²(of axis components) structure: B = I·cosθ-ish +
        // (1-cosθ) aaᵀ, so the largest diagonal picks a stable axis.
        let b = 0.5 * (r + Matrix3::identity());
        let k = (0..3)
            .max_by(|&i, &j| {
                b[(i, i)]
                    .partial_cmp(&b[(j, j)])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(0);
        let mut axis = Vector3::new(b[(0, k)], b[(1, k)], b[(2, k)]);
        axis /= axis.norm();
        // Fix the sign from an off-diagonal skew remnant.
        let skew = unbracket3(&(0.5 * (r - r.transpose())));
        if skew.dot(&axis) < 0.0 {
            axis = -axis;
        }
        return theta * axis;
    }
    theta / (2.0 * theta.sin()) * unbracket3(&(r - r.transpose()))
}

/// SE(3) logarithm: twist `ξ = [ω, v]` with `exp(ξ) == E`.
#[must_use]
pub fn log(e: &Matrix4<f64>) -> SpatialVector {
    let w = log3(&rotation(e));
    let theta = w.norm();
    let wb = bracket3(&w);
    let vinv = if theta < SMALL_ANGLE {
        Matrix3::identity() - 0.5 * wb + (wb * wb) / 12.0
    } else {
        let half = 0.5 * theta;
        // V⁻¹ = I - ω̂/2 + (1/θ² - cot(θ/2)/(2θ)) ω̂²
        let coeff = (1.0 - half * half.cos() / half.sin()) / (theta * theta);
        Matrix3::identity() - 0.5 * wb + coeff * (wb * wb)
    };
    spatial(&w, &(vinv * translation(e)))
}

/// SO(3) left Jacobian `J_l(ω)` of the exponential.
fn jac3_left(w: &Vector3<f64>) -> Matrix3<f64> {
    let theta = w.norm();
    let wb = bracket3(w);
    let (a, b) = if theta < SMALL_ANGLE {
        (0.5 - theta * theta / 24.0, 1.0 / 6.0 - theta * theta / 120.0)
    } else {
        let t2 = theta * theta;
        ((1.0 - theta.cos()) / t2, (theta - theta.sin()) / (t2 * theta))
    };
    Matrix3::identity() + a * wb + b * (wb * wb)
}

/// Coupling block `Q(ξ)` of the SE(3) left Jacobian (Barfoot's closed
/// form, adapted to `[ω, v]` ordering).
fn jac6_coupling(w: &Vector3<f64>, v: &Vector3<f64>) -> Matrix3<f64> {
    let theta = w.norm();
    let wb = bracket3(w);
    let vb = bracket3(v);
    let wv = wb * vb;
    let vw = vb * wb;
    let wvw = wb * vb * wb;

    let (c1, c2, c3) = if theta < SMALL_ANGLE {
        let t2 = theta * theta;
        (
            1.0 / 6.0 - t2 / 120.0,   // (θ - sinθ)/θ³
            -1.0 / 24.0 + t2 / 720.0, // (1 - θ²/2 - cosθ)/θ⁴
            -1.0 / 120.0,             // ½(c2 - 3(θ - sinθ - θ³/6)/θ⁵)
        )
    } else {
        let t2 = theta * theta;
        let t4 = t2 * t2;
        let a = (theta - theta.sin()) / (t2 * theta);
        let b = (1.0 - 0.5 * t2 - theta.cos()) / t4;
        let c = 0.5 * (b - 3.0 * (theta - theta.sin() - t2 * theta / 6.0) / (t4 * theta));
        (a, b, c)
    };

    0.5 * vb + c1 * (wv + vw + wvw) - c2 * (wb * wb * vb + vb * wb * wb - 3.0 * wvw)
        - c3 * (wvw * wb + wb * wvw)
}

/// 6×6 right tangent (right Jacobian) of the SE(3) exponential.
///
/// For `Q(q) = exp(ĉ(q))`, the body-frame motion subspace is
/// `vee(Q⁻¹ ∂Q/∂q) = dexp(c) · ∂c/∂q`. Uses `J_r(ξ) = J_l(-ξ)`.
#[must_use]
pub fn dexp(xi: &SpatialVector) -> Matrix6<f64> {
    let w = -angular(xi);
    let v = -linear(xi);
    let jl = jac3_left(&w);
    let q = jac6_coupling(&w, &v);
    let mut j = Matrix6::zeros();
    j.fixed_view_mut::<3, 3>(0, 0).copy_from(&jl);
    j.fixed_view_mut::<3, 3>(3, 0).copy_from(&q);
    j.fixed_view_mut::<3, 3>(3, 3).copy_from(&jl);
    j
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_transform() -> Matrix4<f64> {
        let r = aa_to_mat(&Vector3::new(0.3, -1.2, 0.5), 1.1);
        rp_to_e(&r, &Vector3::new(2.0, -0.7, 4.3))
    }

    fn assert_mat4_eq(a: &Matrix4<f64>, b: &Matrix4<f64>, eps: f64) {
        for i in 0..4 {
            for j in 0..4 {
                assert_relative_eq!(a[(i, j)], b[(i, j)], epsilon = eps);
            }
        }
    }

    #[test]
    fn test_inverse_identities() {
        let e = sample_transform();
        assert_mat4_eq(&inverse(&inverse(&e)), &e, 1e-12);
        assert_mat4_eq(&(e * inverse(&e)), &Matrix4::identity(), 1e-12);
    }

    #[test]
    fn test_bracket3_is_cross_product() {
        let v = Vector3::new(1.0, -2.0, 0.5);
        let x = Vector3::new(-0.3, 0.8, 2.0);
        let lhs = bracket3(&v) * x;
        let rhs = v.cross(&x);
        assert_relative_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_aa_to_mat_zero_angle_is_identity() {
        let r = aa_to_mat(&Vector3::new(0.2, 0.4, -0.1), 0.0);
        assert_relative_eq!((r - Matrix3::identity()).norm(), 0.0, epsilon = 1e-15);
        // Degenerate axis contract: identity for any angle.
        let r = aa_to_mat(&Vector3::zeros(), 2.0);
        assert_relative_eq!((r - Matrix3::identity()).norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_aa_to_mat_orthonormal() {
        let r = aa_to_mat(&Vector3::new(1.0, 2.0, 3.0), 0.7);
        assert_relative_eq!(
            (r * r.transpose() - Matrix3::identity()).norm(),
            0.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_adjoint_transforms_twists() {
        // Ad(E) applied to a twist must match conjugation by E:
        // (Ad(E)ξ)^ == E ξ̂ E⁻¹.
        let e = sample_transform();
        let xi = SpatialVector::new(0.1, -0.4, 0.2, 1.0, 0.0, -2.0);
        let lhs = bracket6(&(adjoint(&e) * xi));
        let rhs = e * bracket6(&xi) * inverse(&e);
        assert_relative_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ad_matches_spatial_cross() {
        let a = SpatialVector::new(0.1, 0.2, -0.3, 1.0, -1.0, 0.5);
        let b = SpatialVector::new(-0.7, 0.4, 0.9, 0.2, 0.8, -1.5);
        let lhs = ad(&a) * b;
        let rhs = spatial_cross_motion(&a, &b);
        assert_relative_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-15);
        // Force cross product is the negative transpose action.
        let lhs = ad(&a).transpose() * b;
        let rhs = -spatial_cross_force(&a, &b);
        assert_relative_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_gamma_point_velocity() {
        // ẋ = ω × r + v for a body-frame point r under twist [ω, v].
        let r = Vector3::new(0.5, -1.0, 2.0);
        let xi = SpatialVector::new(0.3, 0.1, -0.2, 1.0, 2.0, 3.0);
        let lhs = gamma(&r) * xi;
        let rhs = angular(&xi).cross(&r) + linear(&xi);
        assert_relative_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_exp_log_round_trip() {
        for scale in [1.0e-8, 0.1, 1.0, 2.5] {
            let xi = scale * SpatialVector::new(0.4, -0.2, 0.8, 1.5, -0.3, 0.9);
            let back = log(&exp(&xi));
            assert_relative_eq!((back - xi).norm(), 0.0, epsilon = 1e-9 * scale.max(1.0));
        }
    }

    #[test]
    fn test_log_near_pi() {
        let axis = Vector3::new(1.0, 0.0, 0.0);
        let theta = std::f64::consts::PI - 1e-9;
        let w = log3(&aa_to_mat(&axis, theta));
        assert_relative_eq!(w.norm(), theta, epsilon = 1e-6);
        assert_relative_eq!(w.x / w.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_dexp_matches_finite_difference() {
        let c = SpatialVector::new(0.4, -0.7, 0.3, 1.2, 0.5, -0.8);
        let j = dexp(&c);
        let eps = 1e-6;
        for k in 0..6 {
            let mut dc = SpatialVector::zeros();
            dc[k] = eps;
            // vee(log(Q⁻¹ Q(c+δ))) / ε ≈ dexp(c) δ/ε
            let q0 = exp(&c);
            let fd = log(&(inverse(&q0) * exp(&(c + dc)))) / eps;
            let an = j.column(k).into_owned();
            assert_relative_eq!((fd - an).norm(), 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_inertia_cuboid() {
        let sides = Vector3::new(10.0, 1.0, 1.0);
        let i = inertia_cuboid(&sides, 1.0);
        assert_relative_eq!(i[3], 10.0, epsilon = 1e-12); // mass
        assert_relative_eq!(i[0], 10.0 * 2.0 / 12.0, epsilon = 1e-12);
        assert_relative_eq!(i[1], 10.0 * 101.0 / 12.0, epsilon = 1e-12);
        assert_relative_eq!(i[2], 10.0 * 101.0 / 12.0, epsilon = 1e-12);
    }
}
