//! Geometric models produced by the bundled estimators.
//!
//! Euclidean transformations in 2D and 3D, planar homographies, pinhole
//! cameras, and point/dual quadrics. Projective models are defined up to scale;
//! the `normalized` helpers pick a canonical representative for comparisons.

use nalgebra::{
    Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, Translation2, Translation3,
    UnitComplex, UnitQuaternion, Vector2, Vector3, Vector4,
};

/// Rotation + translation in the plane: `y = R(angle) x + t`.
#[derive(Clone, Debug, PartialEq)]
pub struct EuclideanTransform2D {
    pub rotation: UnitComplex<f64>,
    pub translation: Translation2<f64>,
}

impl EuclideanTransform2D {
    pub fn new(angle: f64, translation: Vector2<f64>) -> Self {
        Self {
            rotation: UnitComplex::new(angle),
            translation: Translation2::from(translation),
        }
    }

    pub fn identity() -> Self {
        Self::new(0.0, Vector2::zeros())
    }

    /// Rotation angle in radians, in `(-pi, pi]`.
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn transform_point(&self, p: &Point2<f64>) -> Point2<f64> {
        self.translation * (self.rotation * p)
    }

    /// Homogeneous 3x3 matrix of the transformation.
    pub fn to_matrix3(&self) -> Matrix3<f64> {
        let mut m = self.rotation.to_rotation_matrix().to_homogeneous();
        m[(0, 2)] = self.translation.vector.x;
        m[(1, 2)] = self.translation.vector.y;
        m
    }
}

/// Rigid transform in 3D (rotation + translation).
#[derive(Clone, Debug, PartialEq)]
pub struct RigidTransform {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Translation3<f64>,
}

impl RigidTransform {
    pub fn new(rotation: UnitQuaternion<f64>, translation: Translation3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rt(r: Matrix3<f64>, t: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix_unchecked(r);
        Self::new(
            UnitQuaternion::from_rotation_matrix(&rot),
            Translation3::from(t),
        )
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.translation * (self.rotation * p)
    }

    /// Homogeneous matrix `[R | t]`, translation applied after rotation.
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        self.translation.to_homogeneous() * self.rotation.to_homogeneous()
    }
}

/// Planar projective transformation represented by a 3x3 matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Map a point; `None` when it lands on the line at infinity.
    pub fn transform_point(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        let q = self.h * p.to_homogeneous();
        (q.z.abs() > f64::EPSILON).then(|| Point2::new(q.x / q.z, q.y / q.z))
    }

    /// Unit Frobenius norm, largest-magnitude entry positive.
    pub fn normalized(&self) -> Matrix3<f64> {
        canonical_scale(self.h)
    }
}

/// Pinhole camera `x ~ P X` with a 3x4 projection matrix `P = K [R | t]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PinholeCamera {
    pub p: Matrix3x4<f64>,
}

/// Factors of a pinhole camera: intrinsics `K` (upper triangular, `K[2,2] = 1`,
/// positive diagonal), rotation `R` and translation `t`.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraDecomposition {
    pub intrinsics: Matrix3<f64>,
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl PinholeCamera {
    pub fn new(p: Matrix3x4<f64>) -> Self {
        Self { p }
    }

    pub fn from_parts(intrinsics: &Matrix3<f64>, rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Self {
        let mut rt = Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation.matrix());
        rt.set_column(3, translation);
        Self::new(intrinsics * rt)
    }

    /// Project a world point; `None` for points on the principal plane.
    pub fn project(&self, x: &Point3<f64>) -> Option<Point2<f64>> {
        let q = self.p * x.to_homogeneous();
        (q.z.abs() > f64::EPSILON).then(|| Point2::new(q.x / q.z, q.y / q.z))
    }

    /// Unit Frobenius norm with a non-negative `P[2,3]`.
    pub fn normalized(&self) -> Matrix3x4<f64> {
        let norm = self.p.norm();
        if norm <= f64::EPSILON {
            return self.p;
        }
        let sign = if self.p[(2, 3)] < 0.0 { -1.0 } else { 1.0 };
        self.p * (sign / norm)
    }

    /// Camera centre in world coordinates, `-R^T t`.
    pub fn center(&self) -> Option<Point3<f64>> {
        let m = self.p.fixed_view::<3, 3>(0, 0).into_owned();
        let p4: Vector3<f64> = self.p.column(3).into_owned();
        m.try_inverse().map(|inv| Point3::from(-(inv * p4)))
    }

    /// RQ decomposition of the left 3x3 block into `K R`.
    pub fn decompose(&self) -> Option<CameraDecomposition> {
        let m = self.p.fixed_view::<3, 3>(0, 0).into_owned();
        let p4: Vector3<f64> = self.p.column(3).into_owned();
        let m_inv = m.try_inverse()?;

        // M^-1 = Q U  =>  M = U^-1 Q^T, with U^-1 upper triangular.
        let qr = m_inv.qr();
        let mut k = qr.r().try_inverse()?;
        let mut r = qr.q().transpose();

        for i in 0..3 {
            if k[(i, i)] < 0.0 {
                k.column_mut(i).neg_mut();
                r.row_mut(i).neg_mut();
            }
        }

        // A reflection means the whole matrix carries a negative scale.
        let sign = if r.determinant() < 0.0 { -1.0 } else { 1.0 };
        r *= sign;

        let k_inv = k.try_inverse()?;
        let translation = k_inv * (p4 * sign);
        let scale = k[(2, 2)];
        if scale.abs() <= f64::EPSILON {
            return None;
        }
        Some(CameraDecomposition {
            intrinsics: k / scale,
            rotation: Rotation3::from_matrix_unchecked(r),
            translation,
        })
    }
}

/// Plane `a x + b y + c z + d = 0` as a homogeneous 4-vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub v: Vector4<f64>,
}

impl Plane {
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            v: Vector4::new(a, b, c, d),
        }
    }

    /// Plane through `point` with normal `normal`.
    pub fn from_point_normal(point: &Point3<f64>, normal: &Vector3<f64>) -> Self {
        Self::new(normal.x, normal.y, normal.z, -normal.dot(&point.coords))
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.v.xyz()
    }

    /// Unit-norm homogeneous vector, `None` for the null vector.
    pub fn unit_vector(&self) -> Option<Vector4<f64>> {
        let n = self.v.norm();
        (n > f64::EPSILON).then(|| self.v / n)
    }

    /// Signed Euclidean distance from `p`, `None` for degenerate normals.
    pub fn signed_distance(&self, p: &Point3<f64>) -> Option<f64> {
        let n = self.normal().norm();
        (n > f64::EPSILON).then(|| self.v.dot(&p.to_homogeneous()) / n)
    }
}

/// Point quadric: points `x` with `x^T Q x = 0`, `Q` symmetric 4x4.
#[derive(Clone, Debug, PartialEq)]
pub struct Quadric {
    pub q: Matrix4<f64>,
}

/// Dual quadric: planes `pi` with `pi^T Q* pi = 0` (tangent planes of a quadric).
#[derive(Clone, Debug, PartialEq)]
pub struct DualQuadric {
    pub q: Matrix4<f64>,
}

/// Symmetric matrix from the ten independent entries
/// `[a, b, c, d, e, f, g, h, i, j]`:
///
/// ```text
/// | a d f g |
/// | d b e h |
/// | f e c i |
/// | g h i j |
/// ```
pub fn symmetric_from_params(p: &[f64; 10]) -> Matrix4<f64> {
    Matrix4::new(
        p[0], p[3], p[5], p[6], //
        p[3], p[1], p[4], p[7], //
        p[5], p[4], p[2], p[8], //
        p[6], p[7], p[8], p[9],
    )
}

/// Coefficients of `v^T Q v` with respect to the parameters of
/// [`symmetric_from_params`].
pub fn symmetric_design_row(v: &Vector4<f64>) -> [f64; 10] {
    [
        v.x * v.x,
        v.y * v.y,
        v.z * v.z,
        2.0 * v.x * v.y,
        2.0 * v.y * v.z,
        2.0 * v.x * v.z,
        2.0 * v.x * v.w,
        2.0 * v.y * v.w,
        2.0 * v.z * v.w,
        v.w * v.w,
    ]
}

impl Quadric {
    pub fn new(q: Matrix4<f64>) -> Self {
        Self {
            q: 0.5 * (q + q.transpose()),
        }
    }

    /// Sphere with the given centre and radius.
    pub fn sphere(center: &Point3<f64>, radius: f64) -> Self {
        let c = center.coords;
        let mut q = Matrix4::identity();
        q[(0, 3)] = -c.x;
        q[(1, 3)] = -c.y;
        q[(2, 3)] = -c.z;
        q[(3, 0)] = -c.x;
        q[(3, 1)] = -c.y;
        q[(3, 2)] = -c.z;
        q[(3, 3)] = c.norm_squared() - radius * radius;
        Self::new(q)
    }

    /// Algebraic value `x^T Q x` at `p`.
    pub fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let x = p.to_homogeneous();
        x.dot(&(self.q * x))
    }

    pub fn normalized(&self) -> Matrix4<f64> {
        canonical_scale(self.q)
    }

    /// Dual of a non-degenerate quadric, `Q^-1` up to scale.
    pub fn dual(&self) -> Option<DualQuadric> {
        self.q.try_inverse().map(DualQuadric::new)
    }
}

impl DualQuadric {
    pub fn new(q: Matrix4<f64>) -> Self {
        Self {
            q: 0.5 * (q + q.transpose()),
        }
    }

    /// Algebraic value `pi^T Q* pi` for `plane`.
    pub fn evaluate(&self, plane: &Plane) -> f64 {
        plane.v.dot(&(self.q * plane.v))
    }

    pub fn normalized(&self) -> Matrix4<f64> {
        canonical_scale(self.q)
    }

    /// Point quadric whose tangent planes this dual describes.
    pub fn primal(&self) -> Option<Quadric> {
        self.q.try_inverse().map(Quadric::new)
    }
}

/// Unit Frobenius norm, sign fixed by the largest-magnitude entry.
fn canonical_scale<const R: usize, const C: usize>(
    m: nalgebra::SMatrix<f64, R, C>,
) -> nalgebra::SMatrix<f64, R, C> {
    let norm = m.norm();
    if norm <= f64::EPSILON {
        return m;
    }
    let pivot = m.iter().copied().fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
    let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
    m * (sign / norm)
}
