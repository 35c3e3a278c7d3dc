use crate::enums::{Orientation, VolumeKind};
use crate::math::{self, Bounds};

use image::{GrayImage, ImageBuffer};
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array3, ArrayView2, s};
use rayon::prelude::*;

/// Window/level used when mapping voxel values to display intensities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayProperties {
    pub window: f32,
    pub level: f32,
}

impl Default for DisplayProperties {
    fn default() -> Self {
        Self {
            window: 65535.0,
            level: 32767.5,
        }
    }
}

/// Voxel raster with its placement in world space.
///
/// `data` is indexed `[k, j, i]` (depth, height, width). `ijk_to_world` maps a
/// voxel index `(i, j, k)` to world millimetres; `parent_transform`, when set,
/// is an additional linear transform applied on top of it.
#[derive(Clone, Debug)]
pub struct Volume {
    pub data: Array3<f32>,
    pub ijk_to_world: Matrix4<f64>,
    pub parent_transform: Option<Matrix4<f64>>,
    pub kind: VolumeKind,
    pub display: DisplayProperties,
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(Array3::zeros((0, 0, 0)), [1.0; 3], [0.0; 3])
    }
}

impl Volume {
    /// Axis-aligned volume with the given voxel spacing `(i, j, k)` and origin.
    pub fn new(data: Array3<f32>, spacing: [f64; 3], origin: [f64; 3]) -> Self {
        let mut ijk_to_world = Matrix4::new_nonuniform_scaling(&Vector3::from(spacing));
        ijk_to_world[(0, 3)] = origin[0];
        ijk_to_world[(1, 3)] = origin[1];
        ijk_to_world[(2, 3)] = origin[2];
        Self::with_ijk_to_world(data, ijk_to_world)
    }

    pub fn with_ijk_to_world(data: Array3<f32>, ijk_to_world: Matrix4<f64>) -> Self {
        Self {
            data,
            ijk_to_world,
            parent_transform: None,
            kind: VolumeKind::Scalar,
            display: DisplayProperties::default(),
        }
    }

    pub fn as_label(mut self) -> Self {
        self.kind = VolumeKind::Label;
        self
    }

    pub fn with_parent_transform(mut self, transform: Matrix4<f64>) -> Self {
        self.parent_transform = Some(transform);
        self
    }

    /// Number of voxels along I, J and K.
    pub fn extent(&self) -> [usize; 3] {
        let (depth, height, width) = self.data.dim();
        [width, height, depth]
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn is_label(&self) -> bool {
        self.kind == VolumeKind::Label
    }

    /// Voxel spacing along I, J and K (length of the IJK axes in world space).
    pub fn spacing(&self) -> [f64; 3] {
        let (_, scale) = math::normalize_columns(&self.ijk_to_world);
        scale
    }

    pub fn origin(&self) -> Vector3<f64> {
        math::translation(&self.ijk_to_world)
    }

    /// IJK to world including the parent transform.
    pub fn ijk_to_world_transformed(&self) -> Matrix4<f64> {
        match &self.parent_transform {
            Some(parent) => parent * self.ijk_to_world,
            None => self.ijk_to_world,
        }
    }

    /// Corners of the voxel box in IJK coordinates. Voxel coordinates refer to
    /// voxel centres, so the full box reaches half a voxel past the first and
    /// last index unless `use_voxel_center` is set.
    fn ijk_corners(&self, use_voxel_center: bool) -> Vec<Vector3<f64>> {
        let extent = self.extent();
        let margin = if use_voxel_center { 0.0 } else { 0.5 };
        let hi = extent.map(|n| n.saturating_sub(1) as f64 + margin);
        (0..8)
            .map(|corner| {
                Vector3::new(
                    if corner & 1 == 0 { -margin } else { hi[0] },
                    if corner & 2 == 0 { -margin } else { hi[1] },
                    if corner & 4 == 0 { -margin } else { hi[2] },
                )
            })
            .collect()
    }

    /// Bounding box of the voxel extent mapped through `ijk_to_frame`.
    fn bounds_in_frame(&self, ijk_to_frame: &Matrix4<f64>, use_voxel_center: bool) -> Bounds {
        if self.is_empty() {
            return Bounds::zero();
        }
        Bounds::from_points(
            self.ijk_corners(use_voxel_center)
                .iter()
                .map(|c| math::transform_point(ijk_to_frame, c)),
        )
        .unwrap_or_default()
    }

    /// World-space bounding box of the voxel extent.
    pub fn world_bounds(&self) -> Bounds {
        self.bounds_in_frame(&self.ijk_to_world_transformed(), false)
    }

    /// Bounding box of the voxel extent expressed in the frame given by `world_to_slice`.
    pub fn slice_bounds(&self, world_to_slice: &Matrix4<f64>, use_voxel_center: bool) -> Bounds {
        self.bounds_in_frame(
            &(world_to_slice * self.ijk_to_world_transformed()),
            use_voxel_center,
        )
    }

    /// True when `world` lies inside the voxel extent, half-voxel margin included.
    pub fn contains_world_point(&self, world: &Vector3<f64>) -> bool {
        if self.is_empty() {
            return false;
        }
        let Some(world_to_ijk) = self.ijk_to_world_transformed().try_inverse() else {
            return false;
        };
        let ijk = math::transform_point(&world_to_ijk, world);
        let extent = self.extent();
        (0..3).all(|axis| ijk[axis] >= -0.5 && ijk[axis] <= extent[axis] as f64 - 0.5)
    }

    #[inline]
    fn normalize_to_u8(&self, value: f32) -> u8 {
        let DisplayProperties { window, level } = self.display;
        let low = level - 0.5 * window;
        let scaled = if window > 0.0 {
            (value - low) / window * 255.0
        } else if value >= level {
            255.0
        } else {
            0.0
        };
        scaled.clamp(0.0, 255.0) as u8
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: &Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice_result = match orientation {
            Orientation::Axial => self.data().slice(s![index, .., ..]),
            Orientation::Coronal => self.data().slice(s![.., index, ..]),
            Orientation::Sagittal => self.data().slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    /// Maps a 2D slice through the volume's window/level into an 8-bit image.
    pub fn slice_to_image(&self, slice: &ArrayView2<'_, f32>) -> Option<GrayImage> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| self.normalize_to_u8(v))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    pub fn get_image_from_axis(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        let slice = self.get_slice_from_axis(index, &orientation)?;
        self.slice_to_image(&slice)
    }

    fn is_valid_index(&self, index: usize, orientation: &Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn spacing_and_extent_follow_ijk_order() {
        let volume = Volume::new(Array3::zeros((4, 3, 2)), [0.5, 0.7, 2.0], [1.0, 2.0, 3.0]);
        assert_eq!(volume.extent(), [2, 3, 4]);
        let spacing = volume.spacing();
        assert!(approx_eq(spacing[0], 0.5));
        assert!(approx_eq(spacing[1], 0.7));
        assert!(approx_eq(spacing[2], 2.0));
    }

    #[test]
    fn world_bounds_include_half_voxel() {
        let volume = Volume::new(Array3::zeros((10, 10, 10)), [1.0, 1.0, 2.0], [0.0; 3]);
        let bounds = volume.world_bounds();
        assert!(approx_eq(bounds.min[0], -0.5));
        assert!(approx_eq(bounds.max[0], 9.5));
        assert!(approx_eq(bounds.min[2], -1.0));
        assert!(approx_eq(bounds.max[2], 19.0));

        let centers = volume.slice_bounds(&Matrix4::identity(), true);
        assert!(approx_eq(centers.min[2], 0.0));
        assert!(approx_eq(centers.max[2], 18.0));
    }

    #[test]
    fn parent_transform_moves_bounds() {
        let shift = Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0));
        let volume = Volume::new(Array3::zeros((2, 2, 2)), [1.0; 3], [0.0; 3]).with_parent_transform(shift);
        let bounds = volume.world_bounds();
        assert!(approx_eq(bounds.min[0], 9.5));
        assert!(volume.contains_world_point(&Vector3::new(10.2, 0.0, 0.0)));
        assert!(!volume.contains_world_point(&Vector3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn slice_image_uses_window_level() {
        let mut volume = Volume::new(Array3::zeros((1, 1, 3)), [1.0; 3], [0.0; 3]);
        volume.data[[0, 0, 0]] = -100.0;
        volume.data[[0, 0, 1]] = 50.0;
        volume.data[[0, 0, 2]] = 500.0;
        volume.display = DisplayProperties {
            window: 100.0,
            level: 50.0,
        };
        let image = volume
            .get_image_from_axis(0, Orientation::Axial)
            .expect("axial slice 0 exists");
        assert_eq!(image.dimensions(), (3, 1));
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(1, 0).0[0], 127);
        assert_eq!(image.get_pixel(2, 0).0[0], 255);
        assert!(volume.get_image_from_axis(1, Orientation::Axial).is_none());
    }
}
