use crate::displacement_grid::Transform;
use crate::enums::InterpolationKind;
use crate::interpolator::Interpolator;
use crate::math;
use crate::volume::Volume;

use log::debug;
use nalgebra::{Matrix4, Vector3};
use ndarray::Array3;
use rayon::prelude::*;
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("Input volume is empty")]
    EmptyInput,

    #[error("Reference geometry has an empty dimension: {0:?}")]
    EmptyReference([usize; 3]),

    #[error("Input IJK to world matrix is not invertible")]
    SingularInputGeometry,

    #[error("Output raster could not be assembled: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Voxel lattice the resampled raster is defined on.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceGeometry {
    pub ijk_to_world: Matrix4<f64>,
    /// Voxel counts along I, J and K.
    pub dimensions: [usize; 3],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResampleParams {
    /// Value written where the mapped point falls outside the input.
    pub default_value: f32,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self { default_value: 0.0 }
    }
}

/// Samples `input` on the `reference` lattice. `transform` maps reference
/// world points into input world space.
pub trait VolumeResampler: Send + Sync {
    fn resample(
        &self,
        input: &Volume,
        reference: &ReferenceGeometry,
        transform: &Transform,
        interpolation: InterpolationKind,
        params: &ResampleParams,
    ) -> Result<Array3<f32>, ResampleError>;
}

/// Reference resampler running on the CPU, one output slice per rayon task.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuResampler;

impl CpuResampler {
    #[inline]
    fn sample(
        input: &ndarray::ArrayView3<'_, f32>,
        ijk: &Vector3<f64>,
        interpolation: InterpolationKind,
    ) -> Option<f32> {
        match interpolation {
            InterpolationKind::NearestNeighbor => Interpolator::nearest(input, ijk.x, ijk.y, ijk.z),
            InterpolationKind::Linear => Interpolator::trilinear(input, ijk.x, ijk.y, ijk.z),
        }
    }
}

impl VolumeResampler for CpuResampler {
    fn resample(
        &self,
        input: &Volume,
        reference: &ReferenceGeometry,
        transform: &Transform,
        interpolation: InterpolationKind,
        params: &ResampleParams,
    ) -> Result<Array3<f32>, ResampleError> {
        if input.is_empty() {
            return Err(ResampleError::EmptyInput);
        }
        let [width, height, depth] = reference.dimensions;
        if width == 0 || height == 0 || depth == 0 {
            return Err(ResampleError::EmptyReference(reference.dimensions));
        }
        let world_to_input = input
            .ijk_to_world_transformed()
            .try_inverse()
            .ok_or(ResampleError::SingularInputGeometry)?;

        let start = Instant::now();
        let source = input.data.view();
        let voxels: Vec<f32> = (0..depth)
            .into_par_iter()
            .flat_map_iter(|k| {
                let source = &source;
                (0..height).flat_map(move |j| {
                    (0..width).map(move |i| {
                        let output_world = math::transform_point(
                            &reference.ijk_to_world,
                            &Vector3::new(i as f64, j as f64, k as f64),
                        );
                        let input_world = transform.transform_point(&output_world);
                        let ijk = math::transform_point(&world_to_input, &input_world);
                        Self::sample(source, &ijk, interpolation).unwrap_or(params.default_value)
                    })
                })
            })
            .collect();

        let output = Array3::from_shape_vec((depth, height, width), voxels)?;
        debug!(
            "Resampled {}x{}x{} voxels ({:?}) in {:?}",
            width,
            height,
            depth,
            interpolation,
            start.elapsed()
        );
        Ok(output)
    }
}
