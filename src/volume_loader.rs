use crate::{
    enums::SortBy,
    math,
    volume::{DisplayProperties, Volume},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::{debug, info, warn};
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Image orientation has parallel or zero row and column directions")]
    InvalidOrientation,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

type DicomObject = FileDicomObject<InMemDicomObject>;

/// One decoded frame with the attributes needed to stack and place it.
struct DecodedSlice {
    order: Option<f32>,
    position: Option<Vector3<f64>>,
    image: Array2<f32>,
}

/// In-plane geometry shared by every slice of a series.
struct PlaneGeometry {
    row_direction: Vector3<f64>,
    column_direction: Vector3<f64>,
    /// Distance between columns (I) and between rows (J).
    pixel_spacing: [f64; 2],
    slice_thickness: Option<f64>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// Voxel values are rescaled to modality units (Rescale Slope/Intercept)
    /// and the IJK to world matrix is derived from Image Orientation
    /// (Patient), the position of the first slice, Pixel Spacing and the
    /// distance between slices. World coordinates are the patient coordinates
    /// of the DICOM files.
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent or
    /// no pixel spacing is present
    pub fn load_from_dicom_objects(
        dicom_objects: &[DicomObject],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let mut slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::decode_slice(dicom_object, &sort_by))
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::validate_dimensions(&slices)?;

        let plane = Self::get_plane_geometry(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        let ijk_to_world = Self::build_ijk_to_world(&slices, &plane)?;
        let volume_array = Self::build_volume_array(&slices);

        let display = dicom_objects
            .iter()
            .find_map(Self::get_window)
            .unwrap_or_else(|| Self::window_from_range(&volume_array));

        let mut volume = Volume::with_ijk_to_world(volume_array, ijk_to_world);
        volume.display = display;
        info!("Loaded volume with extent {:?} and spacing {:?}", volume.extent(), volume.spacing());
        Ok(volume)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        debug!("Found {} DICOM files in {}", paths.len(), path.as_ref().display());

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn decode_slice(dicom_object: &DicomObject, sort_by: &SortBy) -> Option<DecodedSlice> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image = Self::decode_image(dicom_object)?;
        Some(DecodedSlice {
            order,
            position: Self::get_position(dicom_object),
            image,
        })
    }

    fn get_sort_order(dicom_object: &DicomObject, sort_by: &SortBy) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn get_position(dicom_object: &DicomObject) -> Option<Vector3<f64>> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        (pos.len() >= 3).then(|| Vector3::new(pos[0], pos[1], pos[2]))
    }

    /// First frame in modality units.
    fn decode_image(dicom_object: &DicomObject) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::Default)
            .with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_slices(slices: &mut [DecodedSlice], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            slices.reverse();
        }
    }

    fn validate_dimensions(slices: &[DecodedSlice]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[DecodedSlice]) -> Array3<f32> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.image);
        }

        volume
    }

    fn get_plane_geometry(dicom_objects: &[DicomObject]) -> Option<PlaneGeometry> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;
            if pixel_spacing.len() < 2 {
                return None;
            }

            let orientation = dicom_object
                .element(tags::IMAGE_ORIENTATION_PATIENT)
                .ok()
                .and_then(|e| e.to_multi_float64().ok())
                .filter(|values| values.len() >= 6);
            let (row_direction, column_direction) = match orientation {
                Some(o) => (Vector3::new(o[0], o[1], o[2]), Vector3::new(o[3], o[4], o[5])),
                None => {
                    warn!("Image orientation missing, assuming axial slices");
                    (Vector3::x(), Vector3::y())
                }
            };

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()
                .and_then(|e| e.to_float64().ok());

            // Pixel Spacing is (row spacing, column spacing)
            Some(PlaneGeometry {
                row_direction,
                column_direction,
                pixel_spacing: [pixel_spacing[1], pixel_spacing[0]],
                slice_thickness,
            })
        })
    }

    /// Slice step from the first to the last slice position, or the normal
    /// scaled by the slice thickness when positions are missing or coincide.
    fn slice_step(slices: &[DecodedSlice], plane: &PlaneGeometry, normal: &Vector3<f64>) -> Vector3<f64> {
        let first = slices.first().and_then(|s| s.position);
        let last = slices.last().and_then(|s| s.position);
        if let (Some(first), Some(last)) = (first, last)
            && slices.len() > 1
        {
            let step = (last - first) / (slices.len() - 1) as f64;
            if step.norm() > f64::EPSILON {
                return step;
            }
        }
        let thickness = plane.slice_thickness.filter(|t| *t > 0.0).unwrap_or_else(|| {
            warn!("Slice distance unknown, using 1 mm");
            1.0
        });
        normal * thickness
    }

    fn build_ijk_to_world(
        slices: &[DecodedSlice],
        plane: &PlaneGeometry,
    ) -> Result<Matrix4<f64>, VolumeLoaderError> {
        let row = math::try_normalize(&plane.row_direction).ok_or(VolumeLoaderError::InvalidOrientation)?;
        let column =
            math::try_normalize(&plane.column_direction).ok_or(VolumeLoaderError::InvalidOrientation)?;
        let normal = math::try_normalize(&row.cross(&column)).ok_or(VolumeLoaderError::InvalidOrientation)?;

        let origin = slices.first().and_then(|s| s.position).unwrap_or_else(Vector3::zeros);
        let step = Self::slice_step(slices, plane, &normal);
        Ok(math::from_axes(
            &(row * plane.pixel_spacing[0]),
            &(column * plane.pixel_spacing[1]),
            &step,
            &origin,
        ))
    }

    fn get_window(dicom_object: &DicomObject) -> Option<DisplayProperties> {
        let level = dicom_object
            .element(tags::WINDOW_CENTER)
            .ok()?
            .to_multi_float32()
            .ok()?
            .first()
            .copied()?;
        let window = dicom_object
            .element(tags::WINDOW_WIDTH)
            .ok()?
            .to_multi_float32()
            .ok()?
            .first()
            .copied()?;
        Some(DisplayProperties { window, level })
    }

    /// Window covering the full value range of the raster.
    fn window_from_range(data: &Array3<f32>) -> DisplayProperties {
        let (min, max) = data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !min.is_finite() || !max.is_finite() {
            return DisplayProperties::default();
        }
        DisplayProperties {
            window: (max - min).max(1.0),
            level: 0.5 * (max + min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(position: Option<Vector3<f64>>) -> DecodedSlice {
        DecodedSlice {
            order: None,
            position,
            image: Array2::zeros((2, 3)),
        }
    }

    fn axial_plane() -> PlaneGeometry {
        PlaneGeometry {
            row_direction: Vector3::x(),
            column_direction: Vector3::y(),
            pixel_spacing: [0.5, 0.8],
            slice_thickness: Some(3.0),
        }
    }

    #[test]
    fn geometry_uses_slice_positions() {
        let slices = vec![
            slice(Some(Vector3::new(-10.0, -20.0, 40.0))),
            slice(Some(Vector3::new(-10.0, -20.0, 42.5))),
            slice(Some(Vector3::new(-10.0, -20.0, 45.0))),
        ];
        let m = VolumeLoader::build_ijk_to_world(&slices, &axial_plane()).expect("valid orientation");
        assert_eq!(math::axis(&m, 0), Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(math::axis(&m, 1), Vector3::new(0.0, 0.8, 0.0));
        assert_eq!(math::axis(&m, 2), Vector3::new(0.0, 0.0, 2.5));
        assert_eq!(math::translation(&m), Vector3::new(-10.0, -20.0, 40.0));
    }

    #[test]
    fn geometry_falls_back_to_thickness() {
        let slices = vec![slice(None), slice(None)];
        let m = VolumeLoader::build_ijk_to_world(&slices, &axial_plane()).expect("valid orientation");
        assert_eq!(math::axis(&m, 2), Vector3::new(0.0, 0.0, 3.0));
        assert_eq!(math::translation(&m), Vector3::zeros());
    }

    #[test]
    fn parallel_orientation_is_rejected() {
        let plane = PlaneGeometry {
            column_direction: Vector3::x(),
            ..axial_plane()
        };
        let result = VolumeLoader::build_ijk_to_world(&[slice(None)], &plane);
        assert!(matches!(result, Err(VolumeLoaderError::InvalidOrientation)));
    }

    #[test]
    fn inconsistent_slices_are_rejected() {
        let mut slices = vec![slice(None), slice(None)];
        slices[1].image = Array2::zeros((3, 3));
        assert!(matches!(
            VolumeLoader::validate_dimensions(&slices),
            Err(VolumeLoaderError::InconsistentDimensions)
        ));
    }

    #[test]
    fn window_spans_value_range() {
        let data = Array3::from_shape_vec((1, 1, 3), vec![-1000.0, 0.0, 1000.0]).expect("shape");
        let display = VolumeLoader::window_from_range(&data);
        assert_eq!(display.window, 2000.0);
        assert_eq!(display.level, 0.0);
    }

    #[test]
    fn empty_object_list_has_no_images() {
        let result = VolumeLoader::load_from_dicom_objects(&[], SortBy::InstanceNumber);
        assert!(matches!(result, Err(VolumeLoaderError::NoValidImages)));
    }
}
