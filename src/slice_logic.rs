//! Slice geometry over the background, foreground and label volumes of a
//! slice view: spacing and bounds in slice space, field-of-view fitting,
//! offset snapping, slice-number lookup and texture raster sizing.
//!
//! Nothing here fails hard. Missing volumes and singular matrices fall back
//! to the documented defaults (zero bounds, +-100 mm view bounds, unit
//! spacing, 200 texture samples per axis).

use crate::enums::{LayerRole, SlabMode, SliceResolutionMode};
use crate::math::{self, Bounds};
use crate::slice_geometry::{SliceGeometry, SliceIndex};
use crate::volume::Volume;

use log::{debug, warn};
use nalgebra::{Matrix4, Vector3};

/// Largest angle, in degrees, between the slice normal and a volume axis that
/// still counts as aligned.
const ALIGNMENT_TOLERANCE_DEG: f64 = 0.1;
/// Margin added around the union of several volumes when fitting the view.
const MULTI_VOLUME_MARGIN: f64 = 1.05;
/// Texture resolution used when no volume spacing is known.
const DEFAULT_SLICE_RESOLUTION: usize = 200;

/// Volumes shown in a slice view, referenced for the duration of a call.
#[derive(Clone, Copy, Debug, Default)]
pub struct SliceLayers<'a> {
    pub background: Option<&'a Volume>,
    pub foreground: Option<&'a Volume>,
    pub label: Option<&'a Volume>,
}

impl<'a> SliceLayers<'a> {
    pub fn new(background: Option<&'a Volume>) -> Self {
        Self {
            background,
            ..Self::default()
        }
    }

    pub fn get(&self, role: LayerRole) -> Option<&'a Volume> {
        match role {
            LayerRole::Background => self.background,
            LayerRole::Foreground => self.foreground,
            LayerRole::Label => self.label,
        }
    }

    /// Present volumes in background, foreground, label order.
    pub fn volumes(&self) -> impl Iterator<Item = &'a Volume> {
        [self.background, self.foreground, self.label].into_iter().flatten()
    }

    /// First present volume in background, foreground, label order.
    pub fn first(&self) -> Option<&'a Volume> {
        self.volumes().next()
    }
}

/// Slider range for the slice offset and its step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceOffsetRange {
    pub range: [f64; 2],
    pub resolution: f64,
}

/// Thick-slab parameters handed to the reslicer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlabSettings {
    pub slice_count: usize,
    pub mode: SlabMode,
    pub slice_spacing_fraction: f64,
}

/// Spacing of `volume` measured along the axes of the slice plane.
///
/// For every slice axis the volume IJK axis with the most similar direction
/// is chosen and its length projected onto that slice axis is used. Returns
/// `None` when either matrix is singular.
pub fn compute_slice_spacing(volume: &Volume, slice_to_world: &Matrix4<f64>) -> Option<[f64; 3]> {
    let world_to_ijk = volume.ijk_to_world_transformed().try_inverse()?;
    let slice_to_ijk = world_to_ijk * slice_to_world;
    let ijk_to_slice = slice_to_ijk.try_inverse()?;

    let (directions, _) = math::normalize_columns(&slice_to_ijk);
    let mut spacing = [0.0; 3];
    for (slice_axis, value) in spacing.iter_mut().enumerate() {
        let i = directions[(0, slice_axis)].abs();
        let j = directions[(1, slice_axis)].abs();
        let k = directions[(2, slice_axis)].abs();
        let closest = if i > j {
            if i > k { 0 } else { 2 }
        } else if j > k {
            1
        } else {
            2
        };
        *value = ijk_to_slice[(slice_axis, closest)].abs();
    }
    Some(spacing)
}

/// Bounds of `volume` in the slice frame of `geometry`, with the slice
/// translation ignored. Zero bounds without a volume.
pub fn compute_slice_bounds(
    volume: Option<&Volume>,
    geometry: &SliceGeometry,
    use_voxel_center: bool,
) -> Bounds {
    let Some(volume) = volume else {
        return Bounds::zero();
    };
    let Some(world_to_slice) = geometry.world_to_slice_rotation() else {
        warn!("Slice orientation is singular, using zero bounds");
        return Bounds::zero();
    };
    volume.slice_bounds(&world_to_slice, use_voxel_center)
}

/// Pixels of a viewport. Fitting needs both to be non-zero.
fn valid_viewport(width: usize, height: usize) -> bool {
    if width == 0 || height == 0 {
        warn!("Invalid viewport size: {width}x{height}");
        return false;
    }
    true
}

/// Grows the raw in-plane extent to the viewport aspect, fitting the limiting
/// dimension, then grows again if the volume still does not fit.
fn fit_extent_to_viewport(display: [f64; 2], width: usize, height: usize) -> [f64; 2] {
    let [display_x, display_y] = display;
    let (mut fit_x, mut fit_y) = (display_x, display_y);
    if height > width {
        let pixel_size = fit_x / width as f64;
        fit_y = pixel_size * height as f64;
    } else {
        let pixel_size = fit_y / height as f64;
        fit_x = pixel_size * width as f64;
    }

    if display_x > fit_x {
        fit_y /= fit_x / display_x;
        fit_x = display_x;
    }
    if display_y > fit_y {
        fit_x /= fit_y / display_y;
        fit_y = display_y;
    }
    [fit_x, fit_y]
}

/// Geometry engine of one slice view. Owns the view's [`SliceGeometry`] and
/// updates it in response to the calls below.
#[derive(Clone, Debug, Default)]
pub struct SliceLogic {
    geometry: SliceGeometry,
}

impl SliceLogic {
    pub fn new(geometry: SliceGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &SliceGeometry {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut SliceGeometry {
        &mut self.geometry
    }

    pub fn into_geometry(self) -> SliceGeometry {
        self.geometry
    }

    pub fn slice_offset(&self) -> f64 {
        self.geometry.slice_offset()
    }

    pub fn set_slice_offset(&mut self, offset: f64) {
        self.geometry = self.geometry.clone().with_slice_offset(offset);
    }

    /// Slice spacing for `volume`. A prescribed spacing always wins; without a
    /// volume the last computed spacing is returned. The result is cached in
    /// the geometry.
    pub fn volume_slice_spacing(&mut self, volume: Option<&Volume>) -> [f64; 3] {
        if let Some(prescribed) = self.geometry.prescribed_spacing() {
            self.geometry.spacing = prescribed;
            return prescribed;
        }
        let Some(volume) = volume.filter(|v| !v.is_empty()) else {
            return self.geometry.spacing;
        };
        match compute_slice_spacing(volume, &self.geometry.slice_to_world) {
            Some(spacing) => self.geometry.spacing = spacing,
            None => warn!("Volume or slice matrix is singular, keeping slice spacing"),
        }
        self.geometry.spacing
    }

    pub fn volume_slice_bounds(&self, volume: Option<&Volume>, use_voxel_center: bool) -> Bounds {
        compute_slice_bounds(volume, &self.geometry, use_voxel_center)
    }

    /// Size and centre of the volume's world-space bounding box.
    pub fn volume_world_box(volume: Option<&Volume>) -> ([f64; 3], Vector3<f64>) {
        match volume.filter(|v| !v.is_empty()) {
            Some(volume) => {
                let bounds = volume.world_bounds();
                (bounds.dimensions(), bounds.center())
            }
            None => ([0.0; 3], Vector3::zeros()),
        }
    }

    /// Size and centre of the volume's bounds in slice space.
    pub fn volume_slice_dimensions(&self, volume: Option<&Volume>) -> ([f64; 3], Vector3<f64>) {
        let bounds = self.volume_slice_bounds(volume, false);
        (bounds.dimensions(), bounds.center())
    }

    /// Spacing of the first available layer volume.
    pub fn lowest_volume_slice_spacing(&mut self, layers: &SliceLayers<'_>) -> [f64; 3] {
        self.volume_slice_spacing(layers.first())
    }

    /// Slice bounds of the first available layer volume, zero without one.
    pub fn lowest_volume_slice_bounds(&self, layers: &SliceLayers<'_>, use_voxel_center: bool) -> Bounds {
        self.volume_slice_bounds(layers.first(), use_voxel_center)
    }

    /// Union of the slice bounds of all layers. Axes no volume contributes to
    /// default to +-100 mm.
    pub fn slice_bounds(&self, layers: &SliceLayers<'_>) -> Bounds {
        layers
            .volumes()
            .map(|volume| self.volume_slice_bounds(Some(volume), false))
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(Bounds::default_extent)
    }

    /// Fits the field of view to one volume and centres the plane on it.
    pub fn fit_slice_to_volume(
        &mut self,
        layers: &SliceLayers<'_>,
        volume: Option<&Volume>,
        width: usize,
        height: usize,
    ) {
        let Some(volume) = volume.filter(|v| !v.is_empty()) else {
            return;
        };
        if !valid_viewport(width, height) {
            return;
        }
        let (_, world_center) = Self::volume_world_box(Some(volume));
        let (slice_dimensions, _) = self.volume_slice_dimensions(Some(volume));
        let display = [slice_dimensions[0].abs(), slice_dimensions[1].abs()];
        let fit_z = self.volume_slice_spacing(Some(volume))[2] * self.geometry.dimensions[2] as f64;
        let [fit_x, fit_y] = fit_extent_to_viewport(display, width, height);

        self.geometry.field_of_view = [fit_x, fit_y, fit_z];
        self.geometry = self.geometry.clone().with_center(&world_center);
        debug!("Fitted field of view {:?}", self.geometry.field_of_view);
        self.snap_slice_offset_to_ijk(layers);
    }

    /// Fits the field of view to the union of several volumes with a 5 %
    /// margin, centred on the mean of their centres.
    pub fn fit_slice_to_volumes(
        &mut self,
        layers: &SliceLayers<'_>,
        volumes: &[&Volume],
        width: usize,
        height: usize,
    ) {
        let volumes: Vec<&Volume> = volumes.iter().copied().filter(|v| !v.is_empty()).collect();
        let Some(&first) = volumes.first() else {
            return;
        };
        if !valid_viewport(width, height) {
            return;
        }

        let spacing_z = self.volume_slice_spacing(Some(first))[2];
        let mut center = Vector3::zeros();
        let mut bounds: Option<Bounds> = None;
        for &volume in &volumes {
            let (_, volume_center) = Self::volume_world_box(Some(volume));
            center += volume_center;
            let volume_bounds = self.volume_slice_bounds(Some(volume), false);
            bounds = Some(bounds.map_or(volume_bounds, |b| b.union(&volume_bounds)));
        }
        center /= volumes.len() as f64;
        let dimensions = bounds.unwrap_or_default().dimensions().map(|d| d * MULTI_VOLUME_MARGIN);

        let display = [dimensions[0].abs(), dimensions[1].abs()];
        let fit_z = spacing_z * self.geometry.dimensions[2] as f64;
        let [fit_x, fit_y] = fit_extent_to_viewport(display, width, height);

        self.geometry.field_of_view = [fit_x, fit_y, fit_z];
        self.geometry = self.geometry.clone().with_center(&center);
        debug!("Fitted field of view {:?} to {} volumes", self.geometry.field_of_view, volumes.len());
        self.snap_slice_offset_to_ijk(layers);
    }

    fn viewport_or_dimensions(&self, viewport: Option<[usize; 2]>) -> [usize; 2] {
        viewport.unwrap_or([self.geometry.dimensions[0], self.geometry.dimensions[1]])
    }

    /// Fits to the first available layer. `viewport` defaults to the slice dimensions.
    pub fn fit_slice_to_first(&mut self, layers: &SliceLayers<'_>, viewport: Option<[usize; 2]>) {
        let [width, height] = self.viewport_or_dimensions(viewport);
        self.fit_slice_to_volume(layers, layers.first(), width, height);
    }

    pub fn fit_slice_to_background(&mut self, layers: &SliceLayers<'_>, viewport: Option<[usize; 2]>) {
        let [width, height] = self.viewport_or_dimensions(viewport);
        self.fit_slice_to_volume(layers, layers.background, width, height);
    }

    pub fn fit_slice_to_all(&mut self, layers: &SliceLayers<'_>, viewport: Option<[usize; 2]>) {
        let [width, height] = self.viewport_or_dimensions(viewport);
        let volumes: Vec<&Volume> = layers.volumes().collect();
        self.fit_slice_to_volumes(layers, &volumes, width, height);
    }

    /// Sets the field of view of the smaller viewport dimension to `fov` and
    /// scales the other one by the viewport aspect. The through-plane field
    /// of view is kept. Requires a background volume.
    pub fn fit_fov_to_background(&mut self, layers: &SliceLayers<'_>, fov: f64) {
        if layers.background.is_none_or(Volume::is_empty) {
            return;
        }
        let [width, height, _] = self.geometry.dimensions;
        if !valid_viewport(width, height) {
            return;
        }
        let (width, height) = (width as f64, height as f64);
        let (horizontal, vertical) = if width < height {
            (fov, fov * height / width)
        } else {
            (fov * width / height, fov)
        };
        self.geometry.field_of_view = [horizontal, vertical, self.geometry.field_of_view[2]];
    }

    /// Adapts the view to a new window size. The window is shared by the
    /// lightbox grid; the vertical field of view is kept and the horizontal
    /// one follows the new aspect.
    pub fn resize_slice_view(&mut self, new_width: f64, new_height: f64) {
        let [rows, columns] = self.geometry.layout_grid;
        let new_width = new_width / columns.max(1) as f64;
        let new_height = new_height / rows.max(1) as f64;

        let old_dimensions = self.geometry.dimensions;
        let old_fov = self.geometry.field_of_view;
        let mut fov = [
            old_fov[0],
            old_fov[1],
            self.geometry.spacing[2] * old_dimensions[2] as f64,
        ];
        let window_aspect = if new_width != 0.0 { new_height / new_width } else { 1.0 };
        let plane_aspect = if fov[0] != 0.0 { fov[1] / fov[0] } else { 1.0 };
        if window_aspect != plane_aspect && window_aspect != 0.0 {
            fov[0] = fov[1] / window_aspect;
        }
        self.geometry.dimensions = [new_width as usize, new_height as usize, old_dimensions[2]];
        self.geometry.field_of_view = fov;
    }

    /// Moves the slice offset to the centre of the voxel slab it falls in,
    /// measured on the first available layer.
    pub fn snap_slice_offset_to_ijk(&mut self, layers: &SliceLayers<'_>) {
        let old_offset = self.slice_offset();
        let spacing = self.lowest_volume_slice_spacing(layers)[2];
        if spacing <= 0.0 || spacing.is_nan() {
            warn!("Cannot snap slice offset with spacing {spacing}");
            return;
        }
        let bounds = self.lowest_volume_slice_bounds(layers, false);
        let slice = ((old_offset - bounds.min[2]) / spacing).trunc();
        let offset = (slice + 0.5) * spacing + bounds.min[2];
        debug!("Snapped slice offset {old_offset} to {offset}");
        self.set_slice_offset(offset);
    }

    /// Turns the slice plane onto the IJK axes of the first available layer.
    ///
    /// Every slice axis moves to the unused volume axis closest to it, keeping
    /// its sign; the axes are then made orthonormal. The plane keeps its
    /// centre and the offset is snapped onto a voxel centre afterwards.
    pub fn rotate_slice_to_lowest_volume_axes(&mut self, layers: &SliceLayers<'_>) {
        let Some(volume) = layers.first() else {
            return;
        };
        let (volume_axes, _) = math::normalize_columns(&volume.ijk_to_world_transformed());
        let (slice_axes, _) = math::normalize_columns(&self.geometry.slice_to_world);

        let mut used = [false; 3];
        let mut axes = [Vector3::zeros(); 3];
        for (slice_axis, target) in axes.iter_mut().enumerate() {
            let current: Vector3<f64> = slice_axes.column(slice_axis).into_owned();
            let alignment = |axis: usize| current.dot(&volume_axes.column(axis)).abs();
            let Some(closest) = (0..3)
                .filter(|&axis| !used[axis])
                .max_by(|&a, &b| alignment(a).total_cmp(&alignment(b)))
            else {
                return;
            };
            used[closest] = true;
            let direction: Vector3<f64> = volume_axes.column(closest).into_owned();
            *target = if current.dot(&direction) < 0.0 { -direction } else { direction };
        }

        let [x, y, z] = axes;
        let Some(x) = math::try_normalize(&x) else {
            warn!("Volume axes are degenerate, slice orientation unchanged");
            return;
        };
        let Some(y) = math::try_normalize(&(y - x * y.dot(&x))) else {
            warn!("Volume axes are degenerate, slice orientation unchanged");
            return;
        };
        let Some(z) = math::try_normalize(&(z - x * z.dot(&x) - y * z.dot(&y))) else {
            warn!("Volume axes are degenerate, slice orientation unchanged");
            return;
        };
        let center = math::translation(&self.geometry.slice_to_world);
        self.geometry.slice_to_world = math::from_axes(&x, &y, &z, &center);
        debug!("Rotated slice to volume axes, normal {:?}", z.as_slice());
        self.snap_slice_offset_to_ijk(layers);
    }

    /// 1-based number of the voxel slice of `volume` at `offset`.
    pub fn resolve_slice_index(&self, offset: f64, volume: Option<&Volume>) -> SliceIndex {
        let Some(volume) = volume.filter(|v| !v.is_empty()) else {
            return SliceIndex::NoVolume;
        };
        let ijk_to_world = volume.ijk_to_world_transformed();
        let Some(world_to_slice) = self.geometry.slice_to_world.try_inverse() else {
            warn!("Slice matrix is singular");
            return SliceIndex::Rotated;
        };
        let normal = math::transform_vector(&self.geometry.slice_to_world, &Vector3::z());
        let Some(normal) = math::try_normalize(&normal) else {
            return SliceIndex::Rotated;
        };

        let aligned = (0..3).find_map(|axis| {
            let direction = math::axis(&ijk_to_world, axis);
            let spacing = direction.norm();
            let direction = math::try_normalize(&direction)?;
            let angle = normal.dot(&direction).clamp(-1.0, 1.0).acos().to_degrees();
            if angle.abs() < ALIGNMENT_TOLERANCE_DEG {
                Some((axis, spacing))
            } else if (angle - 180.0).abs() < ALIGNMENT_TOLERANCE_DEG {
                Some((axis, -spacing))
            } else {
                None
            }
        });
        let Some((axis, spacing)) = aligned else {
            return SliceIndex::Rotated;
        };

        let origin = math::translation(&ijk_to_world);
        let origin_offset = math::transform_vector(&world_to_slice, &origin).z;
        let index = ((offset - origin_offset) / spacing).round() as i32 + 1;
        let count = volume.extent()[axis] as i32;
        if index < 1 || index > count {
            return SliceIndex::OutOfVolume;
        }
        SliceIndex::Index(index)
    }

    /// [`Self::resolve_slice_index`] on the first available layer.
    pub fn resolve_slice_index_for_layers(&self, offset: f64, layers: &SliceLayers<'_>) -> SliceIndex {
        match layers.first() {
            Some(volume) => self.resolve_slice_index(offset, Some(volume)),
            None => SliceIndex::NoVolume,
        }
    }

    /// Sizes the UVW texture raster according to the resolution mode and
    /// stores it in the geometry. Returns the new extents and dimensions.
    pub fn compute_uvw_extent(&mut self, layers: &SliceLayers<'_>) -> ([f64; 3], [usize; 3]) {
        let extents = self.slice_bounds(layers).dimensions();
        let min_spacing = |spacing: [f64; 3]| spacing[0].min(spacing[1]).min(spacing[2]);

        let mode = self.geometry.resolution_mode;
        let (extents, dimensions) = match mode {
            SliceResolutionMode::Match2DView => {
                (self.geometry.field_of_view, self.geometry.uvw_dimensions)
            }
            SliceResolutionMode::MatchVolumes => {
                let min = min_spacing(self.lowest_volume_slice_spacing(layers));
                let resolution = if min > 0.0 {
                    let max_extent = extents[0].max(extents[1]).max(extents[2]);
                    (max_extent / min) as usize
                } else {
                    DEFAULT_SLICE_RESOLUTION
                };
                (extents, [resolution, resolution, 1])
            }
            SliceResolutionMode::FOVMatch2DViewSpacingMatchVolumes => {
                let min = min_spacing(self.lowest_volume_slice_spacing(layers));
                let fov = self.geometry.field_of_view;
                let samples = |axis: usize| {
                    if min > 0.0 {
                        (fov[axis] / min + 0.5).ceil() as usize
                    } else {
                        DEFAULT_SLICE_RESOLUTION
                    }
                };
                (fov, [samples(0), samples(1), 1])
            }
            SliceResolutionMode::FOVMatchVolumesSpacingMatch2DView => {
                let xy_to_world = self.geometry.xy_to_world();
                let z = self.geometry.active_slice as f64;
                let p0 = math::transform_point(&xy_to_world, &Vector3::new(0.0, 0.0, z));
                let p1 = math::transform_point(&xy_to_world, &Vector3::new(1.0, 0.0, z));
                let p2 = math::transform_point(&xy_to_world, &Vector3::new(0.0, 1.0, z));
                let samples = |extent: f64, pixel: f64| {
                    if pixel > 0.0 { (extent / pixel + 1.0) as usize } else { 1 }
                };
                let dims = [
                    samples(extents[0], (p1 - p0).norm()),
                    samples(extents[1], (p2 - p0).norm()),
                    1,
                ];
                (extents, dims)
            }
        };
        self.geometry.set_uvw_extents_and_dimensions(extents, dimensions);
        (extents, dimensions)
    }

    /// Range of slice offsets between the outermost voxel centres of the
    /// first available layer, stepping by the through-plane spacing.
    pub fn slice_offset_range_resolution(&mut self, layers: &SliceLayers<'_>) -> SliceOffsetRange {
        let bounds = self.lowest_volume_slice_bounds(layers, true);
        let resolution = self.lowest_volume_slice_spacing(layers)[2];
        let range = if bounds.max[2] - bounds.min[2] < resolution {
            // pad a single slice so the slider sits in the middle
            let center = 0.5 * (bounds.min[2] + bounds.max[2]);
            [center - resolution, center + resolution]
        } else {
            [bounds.min[2], bounds.max[2]]
        };
        SliceOffsetRange { range, resolution }
    }

    /// True when `world` lies inside the background (or foreground) volume.
    pub fn is_event_inside_volume(layers: &SliceLayers<'_>, background: bool, world: &Vector3<f64>) -> bool {
        let volume = if background {
            layers.background
        } else {
            layers.foreground
        };
        volume.is_some_and(|v| v.contains_world_point(world))
    }

    /// Layer whose window/level an interaction at `world` should adjust.
    ///
    /// The background is preferred. The foreground is chosen when the
    /// background is missing or not editable, or when both are editable,
    /// the foreground is visible and the point lies inside both volumes.
    pub fn editable_layer_at_world_position(
        layers: &SliceLayers<'_>,
        world: &Vector3<f64>,
        foreground_opacity: f64,
        background_editable: bool,
        foreground_editable: bool,
    ) -> Option<LayerRole> {
        if !background_editable && !foreground_editable {
            return None;
        }
        let mut adjust_foreground = !background_editable || layers.background.is_none();
        if layers.background.is_some()
            && layers.foreground.is_some()
            && background_editable
            && foreground_editable
        {
            adjust_foreground = foreground_opacity >= 0.01
                && Self::is_event_inside_volume(layers, true, world)
                && Self::is_event_inside_volume(layers, false, world);
        }
        Some(if adjust_foreground {
            LayerRole::Foreground
        } else {
            LayerRole::Background
        })
    }

    /// Number of slices combined into a thick slab and their spacing fraction.
    pub fn reconstruction_slab(&mut self, layers: &SliceLayers<'_>) -> SlabSettings {
        let spacing = match self.geometry.prescribed_spacing() {
            Some(prescribed) => prescribed[2],
            None => self.lowest_volume_slice_spacing(layers)[2],
        };
        let slab = self.geometry.slab;
        let slice_count = if slab.enabled && spacing > 0.0 && slab.thickness > spacing {
            (slab.thickness / spacing) as usize
        } else {
            1
        };
        SlabSettings {
            slice_count,
            mode: slab.mode,
            slice_spacing_fraction: spacing / slab.oversampling_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Orientation;
    use crate::slice_geometry::SliceSpacingMode;
    use ndarray::Array3;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn volume() -> Volume {
        Volume::new(Array3::zeros((10, 20, 40)), [0.5, 0.7, 2.0], [0.0, 0.0, 5.0])
    }

    #[test]
    fn spacing_follows_closest_volume_axis() {
        let v = volume();
        let axial = compute_slice_spacing(&v, &SliceGeometry::orientation_matrix(Orientation::Axial))
            .expect("invertible");
        assert!(approx_eq(axial[0], 0.5) && approx_eq(axial[1], 0.7) && approx_eq(axial[2], 2.0));

        let sagittal =
            compute_slice_spacing(&v, &SliceGeometry::orientation_matrix(Orientation::Sagittal))
                .expect("invertible");
        assert!(approx_eq(sagittal[0], 0.7));
        assert!(approx_eq(sagittal[1], 2.0));
        assert!(approx_eq(sagittal[2], 0.5));
    }

    #[test]
    fn prescribed_spacing_overrides_volume() {
        let v = volume();
        let mut logic = SliceLogic::new(
            SliceGeometry::new(Orientation::Axial)
                .with_spacing_mode(SliceSpacingMode::Prescribed([3.0, 3.0, 3.0])),
        );
        assert_eq!(logic.volume_slice_spacing(Some(&v)), [3.0, 3.0, 3.0]);
        assert_eq!(logic.geometry().spacing, [3.0, 3.0, 3.0]);
    }

    #[test]
    fn slice_bounds_default_without_volumes() {
        let logic = SliceLogic::default();
        let layers = SliceLayers::default();
        assert_eq!(logic.slice_bounds(&layers), Bounds::default_extent());
        assert_eq!(logic.lowest_volume_slice_bounds(&layers, false), Bounds::zero());
        assert_eq!(
            logic.resolve_slice_index_for_layers(0.0, &layers),
            SliceIndex::NoVolume
        );
    }

    #[test]
    fn snapped_offset_resolves_to_its_slab() {
        let v = volume();
        let layers = SliceLayers::new(Some(&v));
        let mut logic = SliceLogic::default();
        for slab in 0..10 {
            logic.set_slice_offset(5.0 + 2.0 * slab as f64 + 0.3);
            logic.snap_slice_offset_to_ijk(&layers);
            assert!(approx_eq(logic.slice_offset(), 5.0 + 2.0 * slab as f64));
            assert_eq!(
                logic.resolve_slice_index(logic.slice_offset(), Some(&v)),
                SliceIndex::Index(slab + 1)
            );
        }
        assert_eq!(logic.resolve_slice_index(100.0, Some(&v)), SliceIndex::OutOfVolume);
    }

    #[test]
    fn tilted_plane_is_rotated() {
        let v = volume();
        let tilt = nalgebra::Rotation3::from_axis_angle(&Vector3::x_axis(), 0.5_f64.to_radians());
        let slice_to_world = SliceGeometry::orientation_matrix(Orientation::Axial) * tilt.to_homogeneous();
        let logic = SliceLogic::new(SliceGeometry::default().with_slice_to_world(slice_to_world));
        assert_eq!(logic.resolve_slice_index(10.0, Some(&v)), SliceIndex::Rotated);
    }

    #[test]
    fn rotating_to_volume_axes_resolves_slice_numbers() {
        let v = volume();
        let layers = SliceLayers::new(Some(&v));
        let tilt = nalgebra::Rotation3::from_axis_angle(&Vector3::x_axis(), 0.5_f64.to_radians());
        let axial = SliceGeometry::orientation_matrix(Orientation::Axial);
        let mut logic = SliceLogic::new(SliceGeometry::default().with_slice_to_world(axial * tilt.to_homogeneous()));
        logic.set_slice_offset(10.3);
        assert_eq!(logic.resolve_slice_index(logic.slice_offset(), Some(&v)), SliceIndex::Rotated);

        logic.rotate_slice_to_lowest_volume_axes(&layers);
        let rotation = math::without_translation(&logic.geometry().slice_to_world);
        assert!((rotation - axial).norm() < 1e-12);
        // 10.3 * cos(0.5°) lies in the slab [10, 12)
        assert!(approx_eq(logic.slice_offset(), 11.0));
        assert_eq!(logic.resolve_slice_index(logic.slice_offset(), Some(&v)), SliceIndex::Index(4));

        let mut empty = SliceLogic::default();
        let before = empty.geometry().clone();
        empty.rotate_slice_to_lowest_volume_axes(&SliceLayers::default());
        assert_eq!(empty.geometry(), &before);
    }

    #[test]
    fn anti_parallel_axis_counts_from_the_other_side() {
        let v = volume();
        let flipped = SliceGeometry::orientation_matrix(Orientation::Axial)
            * Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, -1.0));
        let logic = SliceLogic::new(SliceGeometry::default().with_slice_to_world(flipped));
        // The slice normal is world -Z, so offsets are negated heights.
        assert_eq!(logic.resolve_slice_index(-7.0, Some(&v)), SliceIndex::Index(2));
    }

    #[test]
    fn fit_to_volume_matches_viewport_aspect() {
        let v = volume();
        let layers = SliceLayers::new(Some(&v));
        let mut logic = SliceLogic::default();
        logic.fit_slice_to_background(&layers, Some([200, 100]));
        let fov = logic.geometry().field_of_view;
        // slice extent is 20 x 14 mm; the wide viewport is limited by height
        assert!(approx_eq(fov[1], 14.0));
        assert!(approx_eq(fov[0], 28.0));
        assert!(approx_eq(fov[2], 2.0));
        // centred on the volume and snapped onto a voxel centre
        let index = logic.resolve_slice_index(logic.slice_offset(), Some(&v));
        assert!(matches!(index, SliceIndex::Index(_)));
    }

    #[test]
    fn fov_to_background_uses_smaller_dimension() {
        let v = volume();
        let layers = SliceLayers::new(Some(&v));
        let mut logic = SliceLogic::new(SliceGeometry::default().with_dimensions(100, 300, 1));
        logic.fit_fov_to_background(&layers, 50.0);
        assert_eq!(logic.geometry().field_of_view, [50.0, 150.0, 1.0]);
    }

    #[test]
    fn resize_keeps_vertical_field_of_view() {
        let mut logic = SliceLogic::new(
            SliceGeometry::default()
                .with_field_of_view([100.0, 100.0, 1.0])
                .with_dimensions(100, 100, 1),
        );
        logic.resize_slice_view(200.0, 100.0);
        assert_eq!(logic.geometry().dimensions, [200, 100, 1]);
        assert_eq!(logic.geometry().field_of_view, [200.0, 100.0, 1.0]);
    }

    #[test]
    fn uvw_extent_modes() {
        let v = volume();
        let layers = SliceLayers::new(Some(&v));
        let mut logic = SliceLogic::new(
            SliceGeometry::default().with_resolution_mode(SliceResolutionMode::MatchVolumes),
        );
        let (extents, dims) = logic.compute_uvw_extent(&layers);
        assert!(approx_eq(extents[0], 20.0));
        assert!(approx_eq(extents[2], 20.0));
        assert_eq!(dims, [40, 40, 1]);

        logic.geometry_mut().resolution_mode = SliceResolutionMode::FOVMatch2DViewSpacingMatchVolumes;
        logic.geometry_mut().field_of_view = [10.0, 5.0, 1.0];
        let (_, dims) = logic.compute_uvw_extent(&layers);
        assert_eq!(dims, [21, 11, 1]);

        let mut empty = SliceLogic::new(
            SliceGeometry::default().with_resolution_mode(SliceResolutionMode::MatchVolumes),
        );
        empty.geometry_mut().spacing = [0.0; 3];
        let (_, dims) = empty.compute_uvw_extent(&SliceLayers::default());
        assert_eq!(dims, [200, 200, 1]);
    }

    #[test]
    fn offset_range_pads_single_slice() {
        let thin = Volume::new(Array3::zeros((1, 4, 4)), [1.0, 1.0, 3.0], [0.0, 0.0, 9.0]);
        let mut logic = SliceLogic::default();
        let range = logic.slice_offset_range_resolution(&SliceLayers::new(Some(&thin)));
        assert!(approx_eq(range.resolution, 3.0));
        assert!(approx_eq(range.range[0], 6.0));
        assert!(approx_eq(range.range[1], 12.0));
    }

    #[test]
    fn editable_layer_prefers_visible_foreground() {
        let bg = volume();
        let fg = Volume::new(Array3::zeros((4, 4, 4)), [1.0; 3], [0.0, 0.0, 4.0]);
        let layers = SliceLayers {
            background: Some(&bg),
            foreground: Some(&fg),
            label: None,
        };
        let inside_both = Vector3::new(1.0, 1.0, 5.0);
        let only_bg = Vector3::new(15.0, 1.0, 5.0);
        assert_eq!(
            SliceLogic::editable_layer_at_world_position(&layers, &inside_both, 0.5, true, true),
            Some(LayerRole::Foreground)
        );
        assert_eq!(
            SliceLogic::editable_layer_at_world_position(&layers, &only_bg, 0.5, true, true),
            Some(LayerRole::Background)
        );
        assert_eq!(
            SliceLogic::editable_layer_at_world_position(&layers, &inside_both, 0.0, true, true),
            Some(LayerRole::Background)
        );
        assert_eq!(
            SliceLogic::editable_layer_at_world_position(&layers, &only_bg, 0.5, false, true),
            Some(LayerRole::Foreground)
        );
        assert_eq!(
            SliceLogic::editable_layer_at_world_position(&layers, &only_bg, 0.5, false, false),
            None
        );
    }

    #[test]
    fn slab_counts_whole_slices() {
        let v = volume();
        let layers = SliceLayers::new(Some(&v));
        let mut logic = SliceLogic::default();
        logic.geometry_mut().slab.enabled = true;
        logic.geometry_mut().slab.thickness = 7.0;
        let slab = logic.reconstruction_slab(&layers);
        assert_eq!(slab.slice_count, 3);
        assert!(approx_eq(slab.slice_spacing_fraction, 1.0));

        logic.geometry_mut().slab.thickness = 1.5;
        assert_eq!(logic.reconstruction_slab(&layers).slice_count, 1);
    }
}
