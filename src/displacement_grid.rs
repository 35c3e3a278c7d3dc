//! Oriented displacement-grid transform.
//!
//! A regular lattice placed in world space by a direction matrix, an origin
//! and a per-axis spacing. Every lattice node stores a displacement vector; the
//! transform maps a point `p` to `p + d(p)`, where `d` is the trilinear
//! interpolation of the node displacements.

use crate::math;

use nalgebra::{Matrix3, Matrix4, Vector3};
use ndarray::Array3;

const INVERSE_MAX_ITERATIONS: usize = 50;
const INVERSE_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub struct DisplacementGrid {
    direction: Matrix3<f64>,
    origin: Vector3<f64>,
    spacing: [f64; 3],
    /// Indexed `[k, j, i]`.
    displacements: Array3<Vector3<f64>>,
}

impl DisplacementGrid {
    /// Zero-displacement lattice of `dimensions` (i, j, k) nodes.
    pub fn new(
        direction: Matrix3<f64>,
        origin: Vector3<f64>,
        spacing: [f64; 3],
        dimensions: [usize; 3],
    ) -> Self {
        let [ni, nj, nk] = dimensions;
        Self {
            direction,
            origin,
            spacing,
            displacements: Array3::from_elem((nk, nj, ni), Vector3::zeros()),
        }
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Node counts along i, j and k.
    pub fn dimensions(&self) -> [usize; 3] {
        let (nk, nj, ni) = self.displacements.dim();
        [ni, nj, nk]
    }

    pub fn displacements(&self) -> &Array3<Vector3<f64>> {
        &self.displacements
    }

    pub fn displacement(&self, i: usize, j: usize, k: usize) -> Option<Vector3<f64>> {
        self.displacements.get([k, j, i]).copied()
    }

    /// Overwrites one node. Returns `false` when the index is outside the lattice.
    pub fn set_displacement(&mut self, i: usize, j: usize, k: usize, value: Vector3<f64>) -> bool {
        match self.displacements.get_mut([k, j, i]) {
            Some(node) => {
                *node = value;
                true
            }
            None => false,
        }
    }

    /// Physical size of the lattice: `spacing * (nodes - 1)` per axis.
    pub fn physical_extent(&self) -> [f64; 3] {
        let dims = self.dimensions();
        [0, 1, 2].map(|a| self.spacing[a] * dims[a].saturating_sub(1) as f64)
    }

    /// Lattice index space to world: direction scaled by spacing, then translated to the origin.
    pub fn grid_to_world(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        for col in 0..3 {
            for row in 0..3 {
                m[(row, col)] = self.direction[(row, col)] * self.spacing[col];
            }
        }
        math::with_translation(&m, &self.origin)
    }

    /// World position of a lattice node.
    pub fn node_position(&self, i: usize, j: usize, k: usize) -> Vector3<f64> {
        self.origin
            + self.direction.column(0) * (i as f64 * self.spacing[0])
            + self.direction.column(1) * (j as f64 * self.spacing[1])
            + self.direction.column(2) * (k as f64 * self.spacing[2])
    }

    /// Continuous lattice index of a world point.
    fn continuous_index(&self, world: &Vector3<f64>) -> Option<Vector3<f64>> {
        let local = self.direction.try_inverse()? * (world - self.origin);
        let mut index = Vector3::zeros();
        for axis in 0..3 {
            index[axis] = if self.spacing[axis] != 0.0 {
                local[axis] / self.spacing[axis]
            } else {
                0.0
            };
        }
        Some(index)
    }

    /// Interpolated displacement at a world point; outside the lattice the
    /// border nodes are used.
    pub fn displacement_at(&self, world: &Vector3<f64>) -> Vector3<f64> {
        let dims = self.dimensions();
        if dims.contains(&0) {
            return Vector3::zeros();
        }
        let Some(index) = self.continuous_index(world) else {
            return Vector3::zeros();
        };

        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut t = [0.0f64; 3];
        for axis in 0..3 {
            let max = (dims[axis] - 1) as f64;
            let x = index[axis].clamp(0.0, max);
            lo[axis] = x.floor() as usize;
            hi[axis] = (lo[axis] + 1).min(dims[axis] - 1);
            t[axis] = x - lo[axis] as f64;
        }

        let node = |i: usize, j: usize, k: usize| self.displacements[[k, j, i]];
        let lerp = |a: Vector3<f64>, b: Vector3<f64>, w: f64| a * (1.0 - w) + b * w;

        let c00 = lerp(node(lo[0], lo[1], lo[2]), node(hi[0], lo[1], lo[2]), t[0]);
        let c01 = lerp(node(lo[0], hi[1], lo[2]), node(hi[0], hi[1], lo[2]), t[0]);
        let c10 = lerp(node(lo[0], lo[1], hi[2]), node(hi[0], lo[1], hi[2]), t[0]);
        let c11 = lerp(node(lo[0], hi[1], hi[2]), node(hi[0], hi[1], hi[2]), t[0]);
        let c0 = lerp(c00, c01, t[1]);
        let c1 = lerp(c10, c11, t[1]);
        lerp(c0, c1, t[2])
    }

    /// Forward mapping `p + d(p)`.
    pub fn transform_point(&self, world: &Vector3<f64>) -> Vector3<f64> {
        world + self.displacement_at(world)
    }

    /// Solves `x + d(x) = target` with Newton steps on a finite-difference
    /// Jacobian. `None` if it does not converge, which happens when the field
    /// folds over itself.
    pub fn inverse_transform_point(&self, target: &Vector3<f64>) -> Option<Vector3<f64>> {
        let shortest = self
            .spacing
            .iter()
            .copied()
            .filter(|s| *s > 0.0)
            .fold(f64::INFINITY, f64::min);
        let h = if shortest.is_finite() { shortest * 1e-4 } else { 1e-4 };

        let mut x = target - self.displacement_at(target);
        for _ in 0..INVERSE_MAX_ITERATIONS {
            let residual = x + self.displacement_at(&x) - target;
            if residual.norm() < INVERSE_TOLERANCE {
                return Some(x);
            }
            let mut jacobian = Matrix3::identity();
            for axis in 0..3 {
                let mut offset = Vector3::zeros();
                offset[axis] = h;
                let derivative =
                    (self.displacement_at(&(x + offset)) - self.displacement_at(&(x - offset))) / (2.0 * h);
                for row in 0..3 {
                    jacobian[(row, axis)] += derivative[row];
                }
            }
            x -= jacobian.lu().solve(&residual)?;
        }
        None
    }
}

/// Geometric transform handed to a resampler, mapping output space to input space.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    Linear(Matrix4<f64>),
    DisplacementGrid(DisplacementGrid),
}

impl Transform {
    pub fn transform_point(&self, world: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Linear(m) => math::transform_point(m, world),
            Self::DisplacementGrid(grid) => grid.transform_point(world),
        }
    }

    pub fn as_displacement_grid(&self) -> Option<&DisplacementGrid> {
        match self {
            Self::DisplacementGrid(grid) => Some(grid),
            Self::Linear(_) => None,
        }
    }
}
