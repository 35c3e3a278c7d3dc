//! Curved planar reformation.
//!
//! [`CurveStraightener::compute_straightening_transform`] turns a curve into a
//! displacement grid that maps a straight, box-shaped volume onto the curved
//! structure. [`CurveStraightener::straighten_volume`] samples an input volume
//! through that grid and [`project_volume`] collapses the result into a
//! panoramic mean-intensity image.

use crate::curve::Curve;
use crate::displacement_grid::{DisplacementGrid, Transform};
use crate::enums::InterpolationKind;
use crate::math;
use crate::resampler::{ReferenceGeometry, ResampleError, ResampleParams, VolumeResampler};
use crate::volume::Volume;

use log::{debug, error, info};
use nalgebra::{Matrix3, Matrix4, Vector3};
use ndarray::Axis;
use thiserror::Error;
use web_time::Instant;

/// Ratio between the curve resampling distance and the output voxel spacing.
pub const DEFAULT_SAMPLING_FACTOR: f64 = 5.0;

#[derive(Debug, Error)]
pub enum StraighteningError {
    #[error("Invalid resampling spacing: {0}")]
    InvalidSpacing(f64),

    #[error("Not enough resampled curve points: {0}")]
    NotEnoughPoints(usize),

    #[error("Curve start and end points coincide")]
    DegenerateCurve,

    #[error("Could not fit a plane to the curve points")]
    PlaneFit,

    #[error("Straightening transform must be a displacement grid")]
    NotDisplacementGrid,

    #[error("No volume resampler available")]
    MissingResampler,

    #[error("Invalid output spacing: {0:?}")]
    InvalidOutputSpacing([f64; 3]),

    #[error("Projection axis must be 0, 1 or 2, got {0}")]
    InvalidAxis(usize),

    #[error("Volume has no voxels")]
    EmptyVolume,

    #[error("Resampling failed: {0}")]
    Resample(#[from] ResampleError),
}

/// Result of [`CurveStraightener::compute_straightening_transform`].
#[derive(Clone, Debug)]
pub struct Straightening {
    /// Maps straightened space to input space.
    pub transform: Transform,
    /// The four input-space corners of every reslicing plane, when requested.
    pub reslicing_planes: Option<Vec<[Vector3<f64>; 4]>>,
    pub resample_spacing: f64,
}

pub struct CurveStraightener {
    pub sampling_factor: f64,
    resampler: Option<Box<dyn VolumeResampler>>,
}

impl Default for CurveStraightener {
    fn default() -> Self {
        Self {
            sampling_factor: DEFAULT_SAMPLING_FACTOR,
            resampler: None,
        }
    }
}

impl CurveStraightener {
    pub fn new(resampler: Box<dyn VolumeResampler>) -> Self {
        Self {
            resampler: Some(resampler),
            ..Self::default()
        }
    }

    pub fn with_sampling_factor(mut self, sampling_factor: f64) -> Self {
        self.sampling_factor = sampling_factor;
        self
    }

    pub fn set_resampler(&mut self, resampler: Option<Box<dyn VolumeResampler>>) {
        self.resampler = resampler;
    }

    fn resample_curve(curve: &Curve, spacing: f64) -> Result<Curve, StraighteningError> {
        let resampled = curve.resample(spacing).ok_or_else(|| {
            error!("Resampling curve failed: spacing {spacing}");
            StraighteningError::InvalidSpacing(spacing)
        })?;
        if resampled.len() < 3 {
            error!("Not enough resampled curve points: {}", resampled.len());
            return Err(StraighteningError::NotEnoughPoints(resampled.len()));
        }
        Ok(resampled)
    }

    /// Y is the curve plane normal and X lies in that plane; Z is made
    /// orthogonal to both while keeping the curve's running direction.
    fn stretching_axes(
        plane_normal: &Vector3<f64>,
        z: &Vector3<f64>,
    ) -> Result<(Vector3<f64>, Vector3<f64>, Vector3<f64>), StraighteningError> {
        let y = *plane_normal;
        let x = math::try_normalize(&z.cross(&y)).ok_or(StraighteningError::DegenerateCurve)?;
        let orthogonal_z =
            math::try_normalize(&x.cross(&y)).ok_or(StraighteningError::DegenerateCurve)?;
        if z.dot(&orthogonal_z) > 0.0 {
            Ok((x, y, orthogonal_z))
        } else {
            Ok((-x, y, -orthogonal_z))
        }
    }

    /// X is the mean transport normal of the curve, which keeps the torsion of
    /// the field low.
    fn straightening_axes(
        resampled: &Curve,
        z: &Vector3<f64>,
    ) -> Result<(Vector3<f64>, Vector3<f64>, Vector3<f64>), StraighteningError> {
        let sum = resampled
            .default_frames()
            .iter()
            .fold(Vector3::zeros(), |acc, frame| acc + frame.normal);
        let x = math::try_normalize(&sum).ok_or(StraighteningError::DegenerateCurve)?;
        let y = math::try_normalize(&z.cross(&x)).ok_or(StraighteningError::DegenerateCurve)?;
        let x = math::try_normalize(&y.cross(z)).ok_or(StraighteningError::DegenerateCurve)?;
        Ok((x, y, *z))
    }

    /// Builds the displacement grid that straightens (or, with `stretching`,
    /// stretches) `curve`.
    ///
    /// The grid has 2 x 2 nodes in-plane, one per slab corner, and one slab per
    /// curve sample taken every `output_spacing * sampling_factor` mm.
    /// `slice_size` is the in-plane size of the straightened volume in mm and
    /// `rotation_deg` spins the in-plane axes about the curve axis.
    ///
    /// # Errors
    ///
    /// Fails without producing a partial transform when the curve yields fewer
    /// than three samples or its geometry is degenerate.
    pub fn compute_straightening_transform(
        &self,
        curve: &Curve,
        slice_size: [f64; 2],
        output_spacing: f64,
        stretching: bool,
        rotation_deg: f64,
        collect_planes: bool,
    ) -> Result<Straightening, StraighteningError> {
        let start = Instant::now();
        let spacing = output_spacing * self.sampling_factor;
        let mut resampled = Self::resample_curve(curve, spacing)?;
        let plane = math::fit_plane(resampled.points()).ok_or(StraighteningError::PlaneFit)?;

        let (Some(first), Some(last)) = (resampled.first(), resampled.last()) else {
            return Err(StraighteningError::NotEnoughPoints(0));
        };
        let z = math::try_normalize(&(last - first)).ok_or_else(|| {
            error!("Curve start and end points coincide");
            StraighteningError::DegenerateCurve
        })?;

        let (mut x, mut y, z) = if stretching {
            Self::stretching_axes(&plane.normal, &z)?
        } else {
            Self::straightening_axes(&resampled, &z)?
        };

        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        (x, y) = (x * cos + y * sin, y * cos - x * sin);

        if stretching {
            let yz_plane = math::Plane {
                origin: plane.origin,
                normal: x,
            };
            resampled = Self::resample_curve(&curve.project_to_plane(&yz_plane), spacing)?;
        }

        let curve_length = resampled.length();
        let grid_origin = plane.origin
            - x * (slice_size[0] / 2.0)
            - y * (slice_size[1] / 2.0)
            - z * (curve_length / 2.0);

        let slice_count = resampled.len();
        let direction = Matrix3::from_columns(&[x, y, z]);
        let grid_spacing = [slice_size[0], slice_size[1], spacing];
        let mut grid = DisplacementGrid::new(direction, grid_origin, grid_spacing, [2, 2, slice_count]);

        let frames = resampled.parallel_transport_frames(&x);
        let mut planes = collect_planes.then(|| Vec::with_capacity(slice_count));
        for (k, frame) in frames.iter().enumerate() {
            let mut corners = [Vector3::zeros(); 4];
            for j in 0..2 {
                for i in 0..2 {
                    let straightened = grid.node_position(i, j, k);
                    let input = frame.point
                        + frame.normal * ((i as f64 - 0.5) * slice_size[0])
                        + frame.binormal * ((j as f64 - 0.5) * slice_size[1]);
                    grid.set_displacement(i, j, k, input - straightened);
                    corners[j * 2 + i] = input;
                }
            }
            if let Some(planes) = planes.as_mut() {
                // counter-clockwise: (0,0) (1,0) (1,1) (0,1)
                planes.push([corners[0], corners[1], corners[3], corners[2]]);
            }
        }

        info!(
            "Computed {} transform: {} slabs, {:.1} mm curve, in {:?}",
            if stretching { "stretching" } else { "straightening" },
            slice_count,
            curve_length,
            start.elapsed()
        );
        Ok(Straightening {
            transform: Transform::DisplacementGrid(grid),
            reslicing_planes: planes,
            resample_spacing: spacing,
        })
    }

    /// Samples `input` on the box spanned by the straightening grid.
    ///
    /// The output IJK axes follow the grid direction, scaled by
    /// `output_spacing` and anchored at the grid origin. Label volumes are
    /// sampled with nearest-neighbour interpolation, scalars trilinearly.
    pub fn straighten_volume(
        &self,
        input: &Volume,
        output_spacing: [f64; 3],
        transform: &Transform,
    ) -> Result<Volume, StraighteningError> {
        let grid = transform.as_displacement_grid().ok_or_else(|| {
            error!("Straightening transform must contain a displacement grid");
            StraighteningError::NotDisplacementGrid
        })?;
        let resampler = self.resampler.as_deref().ok_or_else(|| {
            error!("Straightening volume failed: no resampler");
            StraighteningError::MissingResampler
        })?;
        if output_spacing.iter().any(|s| s.is_nan() || *s <= 0.0) {
            return Err(StraighteningError::InvalidOutputSpacing(output_spacing));
        }

        let mut ijk_to_world = Matrix4::identity();
        for col in 0..3 {
            for row in 0..3 {
                ijk_to_world[(row, col)] = grid.direction()[(row, col)] * output_spacing[col];
            }
        }
        let ijk_to_world = math::with_translation(&ijk_to_world, grid.origin());

        let extent = grid.physical_extent();
        let dimensions = [0, 1, 2].map(|a| (extent[a] / output_spacing[a]) as usize);
        let reference = ReferenceGeometry {
            ijk_to_world,
            dimensions,
        };
        let interpolation = if input.is_label() {
            InterpolationKind::NearestNeighbor
        } else {
            InterpolationKind::Linear
        };
        debug!("Straightened volume dimensions {dimensions:?}, interpolation {interpolation:?}");

        let data = resampler.resample(
            input,
            &reference,
            transform,
            interpolation,
            &ResampleParams::default(),
        )?;

        let mut output = Volume::with_ijk_to_world(data, ijk_to_world);
        output.kind = input.kind;
        output.display = input.display;
        Ok(output)
    }
}

/// Mean-intensity projection of a straightened volume along IJK `axis`.
///
/// The projected axis keeps a single voxel and the origin moves by the full
/// extent of that axis along its direction.
pub fn project_volume(input: &Volume, axis: usize) -> Result<Volume, StraighteningError> {
    if axis > 2 {
        error!("Projection axis must be 0, 1 or 2, got {axis}");
        return Err(StraighteningError::InvalidAxis(axis));
    }
    // data is [k, j, i]
    let array_axis = Axis(2 - axis);
    let projected = input
        .data
        .mean_axis(array_axis)
        .ok_or(StraighteningError::EmptyVolume)?
        .insert_axis(array_axis);

    let direction = math::axis(&input.ijk_to_world, axis);
    let length = input.extent()[axis] as f64 * input.spacing()[axis];
    let shift = math::try_normalize(&direction).unwrap_or_else(Vector3::zeros) * length;
    let ijk_to_world =
        math::with_translation(&input.ijk_to_world, &(input.origin() + shift));

    let mut output = Volume::with_ijk_to_world(projected, ijk_to_world);
    output.kind = input.kind;
    output.display = input.display;
    output.parent_transform = input.parent_transform;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resampler::CpuResampler;
    use ndarray::Array3;

    fn approx_vec(a: &Vector3<f64>, b: &Vector3<f64>, tolerance: f64) -> bool {
        (a - b).norm() < tolerance
    }

    fn straight_curve() -> Curve {
        Curve::from_arrays(&[
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 10.0],
            [0.0, 0.0, 20.0],
            [0.0, 0.0, 30.0],
            [0.0, 0.0, 40.0],
        ])
    }

    #[test]
    fn straight_line_produces_zero_displacement() {
        let straightening = CurveStraightener::default()
            .compute_straightening_transform(&straight_curve(), [20.0, 30.0], 2.0, false, 0.0, true)
            .expect("straight curve is valid");
        assert_eq!(straightening.resample_spacing, 10.0);

        let grid = straightening
            .transform
            .as_displacement_grid()
            .expect("grid transform");
        assert_eq!(grid.dimensions(), [2, 2, 5]);
        assert_eq!(grid.spacing(), [20.0, 30.0, 10.0]);
        assert!(approx_vec(&grid.direction().column(2).into_owned(), &Vector3::z(), 1e-9));
        for d in grid.displacements() {
            assert!(d.norm() < 1e-9, "displacement {d:?}");
        }
        let planes = straightening.reslicing_planes.expect("planes requested");
        assert_eq!(planes.len(), 5);
    }

    #[test]
    fn short_curve_is_rejected() {
        let curve = Curve::from_arrays(&[[0.0, 0.0, 0.0], [0.0, 0.0, 4.0]]);
        let result = CurveStraightener::default()
            .compute_straightening_transform(&curve, [10.0, 10.0], 2.0, false, 0.0, false);
        assert!(matches!(result, Err(StraighteningError::NotEnoughPoints(2))));
    }

    #[test]
    fn rotation_spins_in_plane_axes() {
        let straightener = CurveStraightener::default();
        let plain = straightener
            .compute_straightening_transform(&straight_curve(), [10.0, 10.0], 2.0, false, 0.0, false)
            .expect("valid");
        let rotated = straightener
            .compute_straightening_transform(&straight_curve(), [10.0, 10.0], 2.0, false, 90.0, false)
            .expect("valid");
        let a = plain.transform.as_displacement_grid().expect("grid").direction();
        let b = rotated.transform.as_displacement_grid().expect("grid").direction();
        assert!(approx_vec(&b.column(0).into_owned(), &a.column(1).into_owned(), 1e-9));
        assert!(approx_vec(&b.column(1).into_owned(), &(-a.column(0)), 1e-9));
    }

    #[test]
    fn bent_curve_maps_grid_corners_onto_curve_frames() {
        let curve = Curve::new(
            (0..=40)
                .map(|i| {
                    let t = i as f64;
                    Vector3::new(0.02 * (t - 20.0).powi(2), 0.0, t)
                })
                .collect(),
        );
        let straightening = CurveStraightener::default()
            .compute_straightening_transform(&curve, [10.0, 10.0], 1.0, true, 0.0, false)
            .expect("valid curve");
        let grid = straightening.transform.as_displacement_grid().expect("grid");
        // Every node maps onto its input-space corner and back again.
        let node = grid.node_position(1, 0, 3);
        let mapped = grid.transform_point(&node);
        let back = grid.inverse_transform_point(&mapped).expect("invertible");
        assert!(approx_vec(&back, &node, 1e-4));
    }

    #[test]
    fn straighten_requires_grid_and_resampler() {
        let volume = Volume::new(Array3::zeros((4, 4, 4)), [1.0; 3], [0.0; 3]);
        let linear = Transform::Linear(Matrix4::identity());
        let with_resampler = CurveStraightener::new(Box::new(CpuResampler));
        assert!(matches!(
            with_resampler.straighten_volume(&volume, [1.0; 3], &linear),
            Err(StraighteningError::NotDisplacementGrid)
        ));

        let straightening = with_resampler
            .compute_straightening_transform(&straight_curve(), [4.0, 4.0], 2.0, false, 0.0, false)
            .expect("valid");
        assert!(matches!(
            CurveStraightener::default().straighten_volume(&volume, [1.0; 3], &straightening.transform),
            Err(StraighteningError::MissingResampler)
        ));
    }

    #[test]
    fn straighten_then_project_collapses_one_axis() {
        let data = Array3::from_shape_fn((50, 10, 10), |(k, _, _)| k as f32);
        let volume = Volume::new(data, [1.0; 3], [-4.5, -4.5, 0.0]);
        let curve = Curve::from_arrays(&[[0.0, 0.0, 2.0], [0.0, 0.0, 22.0], [0.0, 0.0, 42.0]]);
        let straightener = CurveStraightener::new(Box::new(CpuResampler));
        let straightening = straightener
            .compute_straightening_transform(&curve, [6.0, 6.0], 1.0, false, 0.0, false)
            .expect("valid");
        let straightened = straightener
            .straighten_volume(&volume, [1.0, 1.0, 1.0], &straightening.transform)
            .expect("straightened");
        assert_eq!(straightened.extent(), [6, 6, 40]);
        // Along the straight curve the output slab k sits at z = 2 + k.
        assert!((straightened.data[[10, 3, 3]] - 12.0).abs() < 1e-3);

        let projected = project_volume(&straightened, 0).expect("axis 0");
        assert_eq!(projected.extent(), [1, 6, 40]);
        assert!((projected.data[[10, 2, 0]] - 12.0).abs() < 1e-3);
        let shift = projected.origin() - straightened.origin();
        assert!((shift.norm() - 6.0).abs() < 1e-9);

        assert!(matches!(
            project_volume(&straightened, 3),
            Err(StraighteningError::InvalidAxis(3))
        ));
    }
}
