use dicom_reslice::curve::Curve;
use dicom_reslice::volume::Volume;
use nalgebra::Vector3;
use ndarray::Array3;

/// Volume whose voxel value is the K index, so resampled values reveal the
/// world height they were taken from.
pub fn k_ramp_volume(width: usize, height: usize, depth: usize, spacing: [f64; 3], origin: [f64; 3]) -> Volume {
    let data = Array3::from_shape_fn((depth, height, width), |(k, _, _)| k as f32);
    Volume::new(data, spacing, origin)
}

/// Evenly spaced collinear points from `start` towards `direction`.
pub fn straight_curve(start: Vector3<f64>, direction: Vector3<f64>, step: f64, count: usize) -> Curve {
    let direction = direction.normalize();
    Curve::new((0..count).map(|i| start + direction * (step * i as f64)).collect())
}

/// Parabolic arc in the XZ plane.
pub fn arc_curve(samples: usize, sag: f64) -> Curve {
    let half = (samples - 1) as f64 / 2.0;
    Curve::new(
        (0..samples)
            .map(|i| {
                let t = i as f64 - half;
                Vector3::new(sag * (1.0 - (t / half).powi(2)), 0.0, i as f64)
            })
            .collect(),
    )
}
