use crate::enums::{Orientation, SlabMode, SliceResolutionMode};
use crate::math;

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Whether slice spacing is measured from the displayed volumes or fixed by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum SliceSpacingMode {
    #[default]
    Automatic,
    Prescribed([f64; 3]),
}

/// Thick-slab reconstruction settings of a slice view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlabReconstruction {
    pub enabled: bool,
    /// Slab thickness in mm.
    pub thickness: f64,
    pub mode: SlabMode,
    pub oversampling_factor: f64,
}

impl Default for SlabReconstruction {
    fn default() -> Self {
        Self {
            enabled: false,
            thickness: 1.0,
            mode: SlabMode::Max,
            oversampling_factor: 2.0,
        }
    }
}

/// Outcome of resolving a slice offset to a voxel slice number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceIndex {
    /// 1-based slice number along the volume axis aligned with the slice normal.
    Index(i32),
    /// No volume axis is aligned with the slice normal.
    Rotated,
    /// The offset lies outside the volume.
    OutOfVolume,
    NoVolume,
}

impl SliceIndex {
    pub const ROTATED: i32 = -1;
    pub const OUT_OF_VOLUME: i32 = -2;
    pub const NO_VOLUME: i32 = -3;

    /// Integer form where the failure outcomes are negative sentinels.
    pub fn as_sentinel(self) -> i32 {
        match self {
            Self::Index(index) => index,
            Self::Rotated => Self::ROTATED,
            Self::OutOfVolume => Self::OUT_OF_VOLUME,
            Self::NoVolume => Self::NO_VOLUME,
        }
    }
}

/// Placement and sampling of one slice view.
///
/// `slice_to_world` maps slice millimetres (in-plane X, Y and the normal Z)
/// to world space. `field_of_view` and `dimensions` describe the screen
/// raster (width, height, number of slices); `uvw_extents` and
/// `uvw_dimensions` the texture raster used when the resolution mode does not
/// follow the 2D view. `spacing` holds the last computed slice spacing.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceGeometry {
    pub slice_to_world: Matrix4<f64>,
    pub field_of_view: [f64; 3],
    pub dimensions: [usize; 3],
    pub xyz_origin: [f64; 3],
    pub spacing: [f64; 3],
    pub uvw_extents: [f64; 3],
    pub uvw_dimensions: [usize; 3],
    pub resolution_mode: SliceResolutionMode,
    pub spacing_mode: SliceSpacingMode,
    /// Lightbox slice the view is centred on.
    pub active_slice: usize,
    /// Lightbox layout as (rows, columns).
    pub layout_grid: [usize; 2],
    pub slab: SlabReconstruction,
}

impl Default for SliceGeometry {
    fn default() -> Self {
        Self::new(Orientation::Axial)
    }
}

impl SliceGeometry {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            slice_to_world: Self::orientation_matrix(orientation),
            field_of_view: [250.0, 250.0, 1.0],
            dimensions: [256, 256, 1],
            xyz_origin: [0.0; 3],
            spacing: [1.0; 3],
            uvw_extents: [250.0, 250.0, 1.0],
            uvw_dimensions: [256, 256, 1],
            resolution_mode: SliceResolutionMode::default(),
            spacing_mode: SliceSpacingMode::default(),
            active_slice: 0,
            layout_grid: [1, 1],
            slab: SlabReconstruction::default(),
        }
    }

    /// Radiological slice-to-world rotation of the standard views.
    pub fn orientation_matrix(orientation: Orientation) -> Matrix4<f64> {
        let rotation = match orientation {
            Orientation::Axial => Matrix3::new(
                -1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, 1.0,
            ),
            Orientation::Sagittal => Matrix3::new(
                0.0, 0.0, 1.0, //
                -1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0,
            ),
            Orientation::Coronal => Matrix3::new(
                -1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, //
                0.0, 1.0, 0.0,
            ),
        };
        rotation.to_homogeneous()
    }

    pub fn with_slice_to_world(mut self, slice_to_world: Matrix4<f64>) -> Self {
        self.slice_to_world = slice_to_world;
        self
    }

    pub fn with_dimensions(mut self, width: usize, height: usize, slices: usize) -> Self {
        self.dimensions = [width, height, slices];
        self
    }

    pub fn with_field_of_view(mut self, fov: [f64; 3]) -> Self {
        self.field_of_view = fov;
        self
    }

    pub fn with_resolution_mode(mut self, mode: SliceResolutionMode) -> Self {
        self.resolution_mode = mode;
        self
    }

    pub fn with_spacing_mode(mut self, mode: SliceSpacingMode) -> Self {
        self.spacing_mode = mode;
        self
    }

    pub fn prescribed_spacing(&self) -> Option<[f64; 3]> {
        match self.spacing_mode {
            SliceSpacingMode::Prescribed(spacing) => Some(spacing),
            SliceSpacingMode::Automatic => None,
        }
    }

    /// World to slice-local rotation: the inverse of `slice_to_world` with its
    /// translation removed. `None` when the orientation is singular.
    pub fn world_to_slice_rotation(&self) -> Option<Matrix4<f64>> {
        math::without_translation(&self.slice_to_world).try_inverse()
    }

    /// Unit slice normal in world space.
    pub fn normal(&self) -> Vector3<f64> {
        math::try_normalize(&math::axis(&self.slice_to_world, 2)).unwrap_or_else(Vector3::z)
    }

    /// Distance of the slice plane from the origin along the slice normal.
    pub fn slice_offset(&self) -> f64 {
        self.world_to_slice_rotation()
            .map(|inverse| math::transform_vector(&inverse, &math::translation(&self.slice_to_world)).z)
            .unwrap_or(0.0)
    }

    /// Same geometry with the plane moved along its normal to `offset`.
    pub fn with_slice_offset(mut self, offset: f64) -> Self {
        let delta = offset - self.slice_offset();
        let shift = math::axis(&self.slice_to_world, 2) * delta;
        let translation = math::translation(&self.slice_to_world) + shift;
        self.slice_to_world = math::with_translation(&self.slice_to_world, &translation);
        self
    }

    /// Same orientation with the plane centred on `center`.
    pub fn with_center(mut self, center: &Vector3<f64>) -> Self {
        self.slice_to_world = math::with_translation(&self.slice_to_world, center);
        self.xyz_origin = [0.0; 3];
        self
    }

    /// Screen pixel (x, y, lightbox slice) to slice millimetres.
    pub fn xy_to_slice(&self) -> Matrix4<f64> {
        let pixel = |axis: usize| {
            if self.dimensions[axis] > 0 {
                self.field_of_view[axis] / self.dimensions[axis] as f64
            } else {
                0.0
            }
        };
        let mut m = Matrix4::new_nonuniform_scaling(&Vector3::new(pixel(0), pixel(1), pixel(2)));
        m[(0, 3)] = -self.field_of_view[0] / 2.0 + self.xyz_origin[0];
        m[(1, 3)] = -self.field_of_view[1] / 2.0 + self.xyz_origin[1];
        m[(2, 3)] = self.xyz_origin[2];
        m
    }

    /// Screen pixel (x, y, lightbox slice) to world.
    pub fn xy_to_world(&self) -> Matrix4<f64> {
        self.slice_to_world * self.xy_to_slice()
    }

    pub fn set_uvw_extents_and_dimensions(&mut self, extents: [f64; 3], dimensions: [usize; 3]) {
        self.uvw_extents = extents;
        self.uvw_dimensions = dimensions;
    }
}
