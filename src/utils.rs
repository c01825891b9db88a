//! Miscellaneous utilities: a seedable uniform integer generator used by the
//! samplers, and small linear-algebra helpers shared by the estimators.

use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Point2, Point3};
use rand::distributions::Uniform;
use rand::prelude::*;

/// Uniform integer random-number generator.
///
/// By default this uses a randomly seeded RNG, but test code can construct
/// it from a fixed seed for reproducible behavior.
pub struct UniformRandomGenerator<T>
where
    T: Copy + rand::distributions::uniform::SampleUniform + PartialOrd,
{
    rng: StdRng,
    dist: Option<Uniform<T>>,
}

impl<T> Default for UniformRandomGenerator<T>
where
    T: Copy + rand::distributions::uniform::SampleUniform + PartialOrd,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UniformRandomGenerator<T>
where
    T: Copy + rand::distributions::uniform::SampleUniform + PartialOrd,
{
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            dist: None,
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            dist: None,
        }
    }

    /// Seeded when `seed` is given, entropy-seeded otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::new, Self::from_seed)
    }

    /// Reset the distribution range to `[min, max]`.
    pub fn reset(&mut self, min: T, max: T) {
        self.dist = Some(Uniform::new_inclusive(min, max));
    }

    /// Draw a single value from the current range, or `None` before the first
    /// [`reset`](Self::reset).
    pub fn next(&mut self) -> Option<T> {
        let dist = self.dist.as_ref()?;
        Some(self.rng.sample(dist))
    }

    /// Fill `out` with distinct values drawn from `[min, max]`.
    ///
    /// The caller guarantees the range holds at least `out.len()` values.
    pub fn gen_unique(&mut self, out: &mut [T], min: T, max: T)
    where
        T: Eq,
    {
        self.reset(min, max);
        self.gen_unique_current(out);
    }

    /// Fill `out` with distinct values using the current range.
    pub fn gen_unique_current(&mut self, out: &mut [T])
    where
        T: Eq,
    {
        for i in 0..out.len() {
            while let Some(candidate) = self.next() {
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }
}

/// Unit-norm right singular vector for the smallest singular value of `a`,
/// i.e. the least-squares solution of `a x = 0` with `|x| = 1`.
///
/// Rows are padded with zeros when `a` has fewer rows than columns so that the
/// SVD exposes the full right basis.
pub fn null_vector(a: &DMatrix<f64>) -> Option<DVector<f64>> {
    let ncols = a.ncols();
    let padded;
    let a = if a.nrows() < ncols {
        padded = a.clone().resize_vertically(ncols, 0.0);
        &padded
    } else {
        a
    };
    let svd = a.clone().svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let x = v_t.row(min_idx).transpose();
    let norm = x.norm();
    (norm > f64::EPSILON).then(|| x / norm)
}

/// Similarity that moves the centroid of `points` to the origin with mean
/// distance `sqrt(2)`.
pub fn normalizing_transform_2d<'p>(
    points: impl IntoIterator<Item = &'p Point2<f64>> + Clone,
) -> Option<Matrix3<f64>> {
    let mut n = 0usize;
    let mut centroid = nalgebra::Vector2::zeros();
    for p in points.clone() {
        centroid += p.coords;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    centroid /= n as f64;
    let mean_dist = points
        .into_iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<f64>()
        / n as f64;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

/// 3D counterpart of [`normalizing_transform_2d`] with mean distance `sqrt(3)`.
pub fn normalizing_transform_3d<'p>(
    points: impl IntoIterator<Item = &'p Point3<f64>> + Clone,
) -> Option<Matrix4<f64>> {
    let mut n = 0usize;
    let mut centroid = nalgebra::Vector3::zeros();
    for p in points.clone() {
        centroid += p.coords;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    centroid /= n as f64;
    let mean_dist = points
        .into_iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<f64>()
        / n as f64;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = 3.0_f64.sqrt() / mean_dist;
    let mut t = Matrix4::identity() * s;
    t[(3, 3)] = 1.0;
    t[(0, 3)] = -s * centroid.x;
    t[(1, 3)] = -s * centroid.y;
    t[(2, 3)] = -s * centroid.z;
    Some(t)
}

/// Twice the area of the triangle `a, b, c` relative to its squared longest
/// side; near zero for collinear points.
pub fn collinearity_2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let scale = ab.norm_squared().max(ac.norm_squared()).max((c - b).norm_squared());
    if scale < 1e-24 {
        return 0.0;
    }
    (ab.x * ac.y - ab.y * ac.x).abs() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_draw_over_full_range_is_a_permutation() {
        let mut rng = UniformRandomGenerator::<usize>::from_optional_seed(Some(1234));
        let mut buf = [0usize; 6];
        rng.gen_unique(&mut buf, 3, 8);
        let mut sorted = buf;
        sorted.sort_unstable();
        assert_eq!(sorted, [3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn optional_seed_reproduces_draws() {
        let draws = |seed| {
            let mut rng = UniformRandomGenerator::<usize>::from_optional_seed(seed);
            rng.reset(0, 1000);
            (0..16).map(|_| rng.next()).collect::<Option<Vec<_>>>()
        };
        assert_eq!(draws(Some(42)), draws(Some(42)));
        assert_eq!(draws(None).map(|v| v.len()), Some(16));
    }

    #[test]
    fn next_without_range_is_none() {
        let mut rng = UniformRandomGenerator::<usize>::from_seed(3);
        assert!(rng.next().is_none());
    }

    #[test]
    fn null_vector_solves_homogeneous_system() {
        // x + y - z = 0 and x - y = 0  =>  x = y = z / 2
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, -1.0, 1.0, -1.0, 0.0]);
        let x = null_vector(&a).unwrap();
        assert!((a * &x).norm() < 1e-12);
        assert!((x.norm() - 1.0).abs() < 1e-12);
        assert!((x[2] - 2.0 * x[0]).abs() < 1e-12);
    }

    #[test]
    fn normalization_centres_points() {
        let pts = [Point2::new(10.0, 10.0), Point2::new(12.0, 10.0), Point2::new(11.0, 14.0)];
        let t = normalizing_transform_2d(pts.iter()).unwrap();
        let mapped: Vec<_> = pts
            .iter()
            .map(|p| t * nalgebra::Vector3::new(p.x, p.y, 1.0))
            .collect();
        let cx: f64 = mapped.iter().map(|p| p.x).sum::<f64>() / 3.0;
        let cy: f64 = mapped.iter().map(|p| p.y).sum::<f64>() / 3.0;
        assert!(cx.abs() < 1e-12 && cy.abs() < 1e-12);
        assert!(normalizing_transform_2d([Point2::new(1.0, 1.0); 2].iter()).is_none());
    }

    #[test]
    fn collinear_points_score_zero() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 1.0);
        let c = Point2::new(3.0, 3.0);
        assert!(collinearity_2d(&a, &b, &c) < 1e-12);
        assert!(collinearity_2d(&a, &b, &Point2::new(1.0, 0.0)) > 0.1);
    }
}
