//! Small linear-algebra helpers shared by the slice and curve code.

use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Unit, Vector3, Vector4};

/// Axis-aligned box expressed in some 3D frame (world or slice-local).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for Bounds {
    fn default() -> Self {
        Self::zero()
    }
}

impl Bounds {
    pub fn zero() -> Self {
        Self {
            min: [0.0; 3],
            max: [0.0; 3],
        }
    }

    /// Bounds used when no volume is available to measure.
    pub fn default_extent() -> Self {
        Self {
            min: [-100.0; 3],
            max: [100.0; 3],
        }
    }

    /// Smallest box containing every point. `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vector3<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self {
            min: [first.x, first.y, first.z],
            max: [first.x, first.y, first.z],
        };
        for p in iter {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(p[axis]);
                bounds.max[axis] = bounds.max[axis].max(p[axis]);
            }
        }
        Some(bounds)
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }

    pub fn dimensions(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn center(&self) -> Vector3<f64> {
        Vector3::new(
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        )
    }
}

/// Best-fit plane through a point cloud.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub origin: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl Plane {
    pub fn signed_distance(&self, p: &Vector3<f64>) -> f64 {
        (p - self.origin).dot(&self.normal)
    }

    pub fn project(&self, p: &Vector3<f64>) -> Vector3<f64> {
        p - self.normal * self.signed_distance(p)
    }
}

/// Least-squares plane: the centroid and the eigenvector of the scatter matrix
/// with the smallest eigenvalue. The normal is oriented so that its largest
/// component is positive. Returns `None` for fewer than three points.
pub fn fit_plane(points: &[Vector3<f64>]) -> Option<Plane> {
    if points.len() < 3 {
        return None;
    }
    let centroid = points.iter().sum::<Vector3<f64>>() / points.len() as f64;
    let scatter = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    });
    let eigen = scatter.symmetric_eigen();
    let smallest = eigen.eigenvalues.imin();
    let mut normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();
    if normal.norm() < f64::EPSILON {
        return None;
    }
    normal.normalize_mut();
    let primary = normal.iamax();
    if normal[primary] < 0.0 {
        normal = -normal;
    }
    Some(Plane {
        origin: centroid,
        normal,
    })
}

pub fn transform_point(m: &Matrix4<f64>, p: &Vector3<f64>) -> Vector3<f64> {
    m.transform_point(&Point3::from(*p)).coords
}

pub fn transform_vector(m: &Matrix4<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let h = m * Vector4::new(v.x, v.y, v.z, 0.0);
    Vector3::new(h.x, h.y, h.z)
}

/// Column `index` (0..3) of the upper-left 3x3 block.
pub fn axis(m: &Matrix4<f64>, index: usize) -> Vector3<f64> {
    Vector3::new(m[(0, index)], m[(1, index)], m[(2, index)])
}

pub fn translation(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

pub fn with_translation(m: &Matrix4<f64>, t: &Vector3<f64>) -> Matrix4<f64> {
    let mut out = *m;
    out[(0, 3)] = t.x;
    out[(1, 3)] = t.y;
    out[(2, 3)] = t.z;
    out
}

/// Same matrix with the translation column cleared.
pub fn without_translation(m: &Matrix4<f64>) -> Matrix4<f64> {
    with_translation(m, &Vector3::zeros())
}

/// Homogeneous matrix whose columns are `x`, `y`, `z` and whose translation is `origin`.
pub fn from_axes(
    x: &Vector3<f64>,
    y: &Vector3<f64>,
    z: &Vector3<f64>,
    origin: &Vector3<f64>,
) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    for row in 0..3 {
        m[(row, 0)] = x[row];
        m[(row, 1)] = y[row];
        m[(row, 2)] = z[row];
        m[(row, 3)] = origin[row];
    }
    m
}

/// Upper-left 3x3 block with unit-length columns, plus the original column norms.
pub fn normalize_columns(m: &Matrix4<f64>) -> (Matrix3<f64>, [f64; 3]) {
    let mut out = m.fixed_view::<3, 3>(0, 0).into_owned();
    let mut scale = [0.0; 3];
    for (col, s) in scale.iter_mut().enumerate() {
        let mut column = out.column_mut(col);
        *s = column.norm();
        if *s > 0.0 {
            column /= *s;
        }
    }
    (out, scale)
}

/// Rotates `v` about `axis` by `angle_rad` (right-handed).
pub fn rotate_about(v: &Vector3<f64>, axis: &Vector3<f64>, angle_rad: f64) -> Vector3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle_rad) * v
}

/// Normalizes `v`, returning `None` when it is (numerically) zero.
pub fn try_normalize(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    v.try_normalize(1e-12)
}
